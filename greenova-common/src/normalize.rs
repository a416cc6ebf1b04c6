//! Normalization of free-text values
//!
//! Canonicalizes the loosely formatted values found in spreadsheet exports:
//! recurring frequencies, statuses, booleans, dates and environmental aspects.
//! The lookup tables live in [`Vocabulary`], which is loaded from configuration
//! and passed in by callers rather than read from globals.
//!
//! Import is lenient: unknown statuses fall back to `not started`, bad dates
//! become `None`. Interactive validation ([`crate::validate`]) is strict and
//! reports the same values as field errors instead.

use crate::models::Status;
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Canonical recurring frequencies
pub const FREQUENCIES: [&str; 7] = [
    "daily",
    "weekly",
    "fortnightly",
    "monthly",
    "quarterly",
    "biannual",
    "annual",
];

/// Aspect used for empty input and for custom aspects
pub const ASPECT_OTHER: &str = "Other";

/// Tokens accepted as `true` (compared case-insensitively)
pub const TRUTHY_TOKENS: [&str; 6] = ["true", "yes", "y", "1", "on", "t"];

/// Date layouts accepted by [`parse_date_lenient`], tried in order
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];

/// Lookup tables for normalization
///
/// Keys are matched case-insensitively with surrounding and repeated internal
/// whitespace ignored, so `"  Air   quality "` finds the `"air quality"` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    /// Alternative frequency spellings → canonical frequency
    pub frequency_aliases: BTreeMap<String, String>,
    /// Free-text aspect → canonical aspect name
    pub aspects: BTreeMap<String, String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        let frequency_aliases = [
            ("semi-annual", "biannual"),
            ("semi-annually", "biannual"),
            ("bi-annual", "biannual"),
            ("bi-annually", "biannual"),
            ("yearly", "annual"),
            ("annually", "annual"),
        ];

        let aspects = [
            ("air", "Air Quality"),
            ("air quality", "Air Quality"),
            ("dust", "Air Quality"),
            ("emissions", "Air Quality"),
            ("water", "Water"),
            ("water quality", "Water"),
            ("stormwater", "Water"),
            ("groundwater", "Water"),
            ("waste", "Waste"),
            ("waste management", "Waste"),
            ("noise", "Noise and Vibration"),
            ("vibration", "Noise and Vibration"),
            ("noise and vibration", "Noise and Vibration"),
            ("noise & vibration", "Noise and Vibration"),
            ("flora", "Flora and Fauna"),
            ("fauna", "Flora and Fauna"),
            ("flora and fauna", "Flora and Fauna"),
            ("biodiversity", "Flora and Fauna"),
            ("heritage", "Heritage"),
            ("cultural heritage", "Heritage"),
            ("aboriginal heritage", "Heritage"),
            ("soil", "Soil and Land"),
            ("land", "Soil and Land"),
            ("contamination", "Soil and Land"),
            ("erosion", "Soil and Land"),
            ("hazardous materials", "Hazardous Materials"),
            ("dangerous goods", "Hazardous Materials"),
            ("chemicals", "Hazardous Materials"),
            ("community", "Community"),
            ("stakeholder", "Community"),
            ("energy", "Energy"),
            ("other", ASPECT_OTHER),
        ];

        Self {
            frequency_aliases: frequency_aliases
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            aspects: aspects
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl Vocabulary {
    /// Reject alias tables that would make frequency normalization non-idempotent
    pub fn validate(&self) -> Result<()> {
        for (alias, target) in &self.frequency_aliases {
            if !FREQUENCIES.contains(&target.as_str()) {
                return Err(Error::Config(format!(
                    "frequency alias '{}' maps to '{}', which is not a canonical frequency",
                    alias, target
                )));
            }
        }
        Ok(())
    }

    /// Map a free-text frequency to its canonical form
    ///
    /// Unknown input is returned unchanged so that callers can report it.
    pub fn normalize_frequency(&self, raw: &str) -> String {
        match self.canonical_frequency(raw) {
            Some(canonical) => canonical.to_string(),
            None => raw.to_string(),
        }
    }

    /// Canonical frequency for `raw`, or `None` if it is not recognised
    pub fn canonical_frequency(&self, raw: &str) -> Option<&'static str> {
        let key = lookup_key(raw);
        if let Some(canonical) = FREQUENCIES.iter().copied().find(|f| *f == key) {
            return Some(canonical);
        }
        self.frequency_aliases
            .iter()
            .find(|(alias, _)| lookup_key(alias) == key)
            .and_then(|(_, target)| FREQUENCIES.iter().copied().find(|f| *f == target.as_str()))
    }

    /// True if `aspect` is one of the canonical aspect names (a table value)
    pub fn is_canonical_aspect(&self, aspect: &str) -> bool {
        aspect == ASPECT_OTHER || self.aspects.values().any(|v| v == aspect)
    }

    /// Map a free-text environmental aspect through the lookup table
    ///
    /// Empty input becomes `Other`; unmapped input is passed through trimmed.
    pub fn map_aspect(&self, raw: Option<&str>) -> String {
        let trimmed = raw.map(str::trim).unwrap_or_default();
        if trimmed.is_empty() {
            return ASPECT_OTHER.to_string();
        }

        let key = lookup_key(trimmed);
        self.aspects
            .iter()
            .find(|(alias, _)| lookup_key(alias) == key)
            .map(|(_, canonical)| canonical.clone())
            .unwrap_or_else(|| trimmed.to_string())
    }
}

/// Lower-case, trim and collapse internal whitespace
fn lookup_key(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Trimmed text, or `None` for empty and literal `null` values
pub fn clean_text(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Import-time status parsing: anything non-canonical becomes `not started`
pub fn parse_status_lenient(raw: Option<&str>) -> Status {
    let Some(text) = clean_text(raw) else {
        return Status::NotStarted;
    };

    match text.parse::<Status>() {
        Ok(status) => status,
        Err(_) => {
            warn!("Unrecognised status '{}', using 'not started'", text);
            Status::NotStarted
        }
    }
}

/// Boolean from any of the [`TRUTHY_TOKENS`]; everything else is false
pub fn parse_bool(raw: Option<&str>) -> bool {
    raw.map(|v| {
        let v = v.trim();
        TRUTHY_TOKENS.iter().any(|t| t.eq_ignore_ascii_case(v))
    })
    .unwrap_or(false)
}

/// Parse a date, substituting `None` for empty or unparseable input
///
/// Unparseable non-empty input is logged as a warning naming `field`.
pub fn parse_date_lenient(field: &str, raw: Option<&str>) -> Option<NaiveDate> {
    let text = clean_text(raw)?;

    let parsed = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&text, fmt).ok());

    if parsed.is_none() {
        warn!("Could not parse {} '{}', leaving it empty", field, text);
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_frequencies_map_to_themselves() {
        let vocab = Vocabulary::default();
        for f in FREQUENCIES {
            assert_eq!(vocab.normalize_frequency(f), f);
        }
    }

    #[test]
    fn test_frequency_aliases() {
        let vocab = Vocabulary::default();
        assert_eq!(vocab.normalize_frequency("semi-annual"), "biannual");
        assert_eq!(vocab.normalize_frequency("Bi-Annually"), "biannual");
        assert_eq!(vocab.normalize_frequency(" yearly "), "annual");
        assert_eq!(vocab.normalize_frequency("ANNUALLY"), "annual");
        assert_eq!(vocab.normalize_frequency("Monthly"), "monthly");
    }

    #[test]
    fn test_unknown_frequency_returned_unchanged() {
        let vocab = Vocabulary::default();
        assert_eq!(vocab.normalize_frequency("Every full moon"), "Every full moon");
        assert_eq!(vocab.canonical_frequency("Every full moon"), None);
    }

    #[test]
    fn test_frequency_normalization_is_idempotent() {
        let vocab = Vocabulary::default();
        let inputs = [
            "daily", "Weekly", "semi-annual", "yearly", "", "  ", "hourly", "As Required", "bi-annually",
        ];
        for input in inputs {
            let once = vocab.normalize_frequency(input);
            let twice = vocab.normalize_frequency(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_vocabulary_rejects_alias_to_unknown_frequency() {
        let mut vocab = Vocabulary::default();
        vocab
            .frequency_aliases
            .insert("hourly".into(), "every hour".into());
        assert!(matches!(vocab.validate(), Err(Error::Config(_))));
        assert!(Vocabulary::default().validate().is_ok());
    }

    #[test]
    fn test_status_lenient_defaults_to_not_started() {
        assert_eq!(parse_status_lenient(None), Status::NotStarted);
        assert_eq!(parse_status_lenient(Some("")), Status::NotStarted);
        assert_eq!(parse_status_lenient(Some("NULL")), Status::NotStarted);
        assert_eq!(parse_status_lenient(Some("overdue")), Status::NotStarted);
        assert_eq!(parse_status_lenient(Some("Completed")), Status::Completed);
        assert_eq!(parse_status_lenient(Some(" in progress ")), Status::InProgress);
    }

    #[test]
    fn test_parse_bool_truthy_tokens() {
        for token in ["true", "YES", "y", "1", "On", "t", " yes "] {
            assert!(parse_bool(Some(token)), "{} should be truthy", token);
        }
        for token in ["false", "no", "0", "", "2", "nope"] {
            assert!(!parse_bool(Some(token)), "{} should be falsy", token);
        }
        assert!(!parse_bool(None));
    }

    #[test]
    fn test_parse_date_lenient() {
        let expected = NaiveDate::from_ymd_opt(2024, 6, 30);
        assert_eq!(parse_date_lenient("due", Some("2024-06-30")), expected);
        assert_eq!(parse_date_lenient("due", Some("30/06/2024")), expected);
        assert_eq!(parse_date_lenient("due", Some("2024/06/30")), expected);
        assert_eq!(parse_date_lenient("due", Some("next tuesday")), None);
        assert_eq!(parse_date_lenient("due", Some("2024-02-30")), None);
        assert_eq!(parse_date_lenient("due", Some("")), None);
        assert_eq!(parse_date_lenient("due", None), None);
    }

    #[test]
    fn test_map_aspect() {
        let vocab = Vocabulary::default();
        assert_eq!(vocab.map_aspect(Some("  AIR   quality ")), "Air Quality");
        assert_eq!(vocab.map_aspect(Some("dust")), "Air Quality");
        assert_eq!(vocab.map_aspect(Some("Stormwater")), "Water");
        assert_eq!(vocab.map_aspect(Some("  Light spill ")), "Light spill");
        assert_eq!(vocab.map_aspect(Some("   ")), ASPECT_OTHER);
        assert_eq!(vocab.map_aspect(None), ASPECT_OTHER);
    }

    #[test]
    fn test_canonical_aspects() {
        let vocab = Vocabulary::default();
        assert!(vocab.is_canonical_aspect("Water"));
        assert!(vocab.is_canonical_aspect(ASPECT_OTHER));
        assert!(!vocab.is_canonical_aspect("water"));
        assert!(!vocab.is_canonical_aspect("Light spill"));
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text(Some("  abc ")), Some("abc".to_string()));
        assert_eq!(clean_text(Some("null")), None);
        assert_eq!(clean_text(Some("")), None);
        assert_eq!(clean_text(None), None);
    }
}
