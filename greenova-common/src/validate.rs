//! Obligation validation
//!
//! Field-level and cross-field rules for obligations entered interactively,
//! plus the identifier repair rules shared with the CSV import.
//!
//! Every rule is evaluated on every submission; all violations are collected
//! into [`FieldErrors`] so the caller can show them together.

use crate::models::{Obligation, Status};
use crate::normalize::{Vocabulary, ASPECT_OTHER};
use crate::{Error, Result};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

static NUMERIC_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid regex"));

static PREFIXED_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<prefix>[A-Za-z][A-Za-z0-9]*)\s*-\s*(?P<number>\d+)$").expect("valid regex")
});

const REQUIRED: &str = "This field is required.";

/// Field name → messages, in the order the fields were first reported
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors {
    errors: Vec<(String, String)>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push((field.to_string(), message.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// True if at least one message was recorded for `field`
    pub fn has(&self, field: &str) -> bool {
        self.errors.iter().any(|(f, _)| f == field)
    }

    /// Messages recorded for `field`
    pub fn messages(&self, field: &str) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|(f, _)| f == field)
            .map(|(_, m)| m.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.errors.iter().map(|(f, m)| (f.as_str(), m.as_str()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|(field, message)| format!("{}: {}", field, message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// Identifier format and repair rules
///
/// A valid identifier is `<PREFIX>-<digits>` where `PREFIX` is one of
/// `prefixes`, e.g. `PCEMP-12` or `MS1180-5`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierRules {
    pub prefixes: Vec<String>,
    /// Prefix prepended to bare numbers
    pub default_prefix: String,
    /// Alternative prefix → canonical prefix (matched case-insensitively)
    pub prefix_aliases: BTreeMap<String, String>,
}

impl Default for IdentifierRules {
    fn default() -> Self {
        Self {
            prefixes: vec!["PCEMP".into(), "MS1180".into(), "W6946".into()],
            default_prefix: "PCEMP".into(),
            prefix_aliases: [("condition".to_string(), "MS1180".to_string())]
                .into_iter()
                .collect(),
        }
    }
}

impl IdentifierRules {
    /// Check that default prefix and alias targets are known prefixes
    pub fn validate(&self) -> Result<()> {
        if !self.prefixes.contains(&self.default_prefix) {
            return Err(Error::Config(format!(
                "default identifier prefix '{}' is not in the prefix list",
                self.default_prefix
            )));
        }
        for (alias, target) in &self.prefix_aliases {
            if !self.prefixes.contains(target) {
                return Err(Error::Config(format!(
                    "identifier alias '{}' maps to unknown prefix '{}'",
                    alias, target
                )));
            }
        }
        Ok(())
    }

    /// True if `id` already has the exact canonical form
    pub fn is_valid(&self, id: &str) -> bool {
        match PREFIXED_ID.captures(id) {
            Some(caps) => {
                let prefix = &caps["prefix"];
                let number = &caps["number"];
                self.prefixes.iter().any(|p| p == prefix) && id == format!("{}-{}", prefix, number)
            }
            None => false,
        }
    }

    /// Best-effort repair of an identifier
    ///
    /// - already valid: returned as is
    /// - digits only: default prefix prepended (`123` → `PCEMP-123`)
    /// - known prefix in other case or spacing: canonical prefix (`pcemp - 4` → `PCEMP-4`)
    /// - alias prefix: replaced (`Condition-5` → `MS1180-5`)
    ///
    /// Returns `None` when no rule applies.
    pub fn repair(&self, raw: &str) -> Option<String> {
        let id = raw.trim();
        if id.is_empty() {
            return None;
        }
        if self.is_valid(id) {
            return Some(id.to_string());
        }
        if NUMERIC_ID.is_match(id) {
            return Some(format!("{}-{}", self.default_prefix, id));
        }

        let caps = PREFIXED_ID.captures(id)?;
        let prefix = &caps["prefix"];
        let number = &caps["number"];

        if let Some(canonical) = self.prefixes.iter().find(|p| p.eq_ignore_ascii_case(prefix)) {
            return Some(format!("{}-{}", canonical, number));
        }

        self.prefix_aliases
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(prefix))
            .map(|(_, canonical)| format!("{}-{}", canonical, number))
    }
}

/// Obligation as submitted through an interactive form
///
/// Values are raw: the status and frequency are free text and the identifier
/// may still need repair. [`ObligationValidator::validate`] turns a form into a
/// cleaned form whose values are canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObligationForm {
    pub obligation_number: String,
    pub project_name: String,
    pub mechanism_name: Option<String>,
    pub obligation: String,
    pub environmental_aspect: String,
    pub environmental_aspect_other: Option<String>,
    pub status: String,
    pub action_due_date: Option<NaiveDate>,
    pub close_out_date: Option<NaiveDate>,
    pub recurring_obligation: bool,
    pub recurring_frequency: Option<String>,
    pub recurring_forecasted_date: Option<NaiveDate>,
    pub inspection: bool,
    pub inspection_frequency: Option<String>,
    pub procedure: Option<String>,
    pub project_phase: Option<String>,
    pub accountability: Option<String>,
    pub responsibility: Option<String>,
    pub site_or_desktop: Option<String>,
    pub new_control_action_required: bool,
    pub obligation_type: Option<String>,
    pub supporting_information: Option<String>,
    pub general_comments: Option<String>,
    pub compliance_comments: Option<String>,
    pub non_conformance_comments: Option<String>,
    pub person_email: Option<String>,
}

impl ObligationForm {
    /// Build the stored record from a cleaned form
    pub fn into_obligation(self, project_id: i64, mechanism_id: Option<i64>) -> Result<Obligation> {
        let status = self.status.parse::<Status>().map_err(|msg| {
            let mut errors = FieldErrors::new();
            errors.add("status", msg);
            Error::Validation(errors)
        })?;

        Ok(Obligation {
            obligation_number: self.obligation_number,
            project_id,
            mechanism_id,
            obligation: self.obligation,
            environmental_aspect: self.environmental_aspect,
            environmental_aspect_other: self.environmental_aspect_other,
            procedure: self.procedure,
            project_phase: self.project_phase,
            accountability: self.accountability,
            responsibility: self.responsibility,
            status,
            action_due_date: self.action_due_date,
            close_out_date: self.close_out_date,
            recurring_obligation: self.recurring_obligation,
            recurring_frequency: self.recurring_frequency,
            recurring_forecasted_date: self.recurring_forecasted_date,
            inspection: self.inspection,
            inspection_frequency: self.inspection_frequency,
            site_or_desktop: self.site_or_desktop,
            new_control_action_required: self.new_control_action_required,
            obligation_type: self.obligation_type,
            supporting_information: self.supporting_information,
            general_comments: self.general_comments,
            compliance_comments: self.compliance_comments,
            non_conformance_comments: self.non_conformance_comments,
            person_email: self.person_email,
        })
    }
}

/// Strict validator for interactive submissions
pub struct ObligationValidator<'a> {
    vocabulary: &'a Vocabulary,
    identifiers: &'a IdentifierRules,
}

impl<'a> ObligationValidator<'a> {
    pub fn new(vocabulary: &'a Vocabulary, identifiers: &'a IdentifierRules) -> Self {
        Self {
            vocabulary,
            identifiers,
        }
    }

    /// Validate a form, returning a cleaned copy or every field error found
    pub fn validate(&self, form: &ObligationForm) -> std::result::Result<ObligationForm, FieldErrors> {
        let mut errors = FieldErrors::new();
        let mut clean = form.clone();

        // Identifier
        let raw_id = form.obligation_number.trim();
        if raw_id.is_empty() {
            errors.add("obligation_number", REQUIRED);
        } else {
            match self.identifiers.repair(raw_id) {
                Some(id) => clean.obligation_number = id,
                None => errors.add(
                    "obligation_number",
                    format!(
                        "'{}' is not a valid obligation number (expected e.g. {}-1)",
                        raw_id, self.identifiers.default_prefix
                    ),
                ),
            }
        }

        clean.project_name = form.project_name.trim().to_string();
        if clean.project_name.is_empty() {
            errors.add("project_name", REQUIRED);
        }

        clean.mechanism_name = crate::normalize::clean_text(form.mechanism_name.as_deref());

        clean.obligation = form.obligation.trim().to_string();
        if clean.obligation.is_empty() {
            errors.add("obligation", REQUIRED);
        }

        // Status is rejected rather than defaulted
        let status = match form.status.parse::<Status>() {
            Ok(status) => {
                clean.status = status.as_str().to_string();
                Some(status)
            }
            Err(msg) => {
                errors.add("status", msg);
                None
            }
        };

        // Dates
        if let (Some(due), Some(closed)) = (form.action_due_date, form.close_out_date) {
            if closed < due {
                errors.add(
                    "close_out_date",
                    "Close-out date cannot be before the action due date.",
                );
            }
        }
        if status == Some(Status::Completed) && form.close_out_date.is_none() {
            errors.add(
                "close_out_date",
                "A close-out date is required when the status is completed.",
            );
        }

        // Recurrence
        let frequency = crate::normalize::clean_text(form.recurring_frequency.as_deref());
        clean.recurring_frequency = match frequency {
            Some(raw) => match self.vocabulary.canonical_frequency(&raw) {
                Some(canonical) => Some(canonical.to_string()),
                None => {
                    if form.recurring_obligation {
                        errors.add(
                            "recurring_frequency",
                            format!("'{}' is not a recognised frequency.", raw),
                        );
                    }
                    Some(raw)
                }
            },
            None => {
                if form.recurring_obligation {
                    errors.add(
                        "recurring_frequency",
                        "A frequency is required for recurring obligations.",
                    );
                }
                None
            }
        };

        // Aspect
        clean.environmental_aspect = self.vocabulary.map_aspect(Some(&form.environmental_aspect));
        clean.environmental_aspect_other =
            crate::normalize::clean_text(form.environmental_aspect_other.as_deref());
        if clean.environmental_aspect == ASPECT_OTHER {
            if clean.environmental_aspect_other.is_none() {
                errors.add(
                    "environmental_aspect_other",
                    "Describe the aspect when 'Other' is selected.",
                );
            }
        } else if !self.vocabulary.is_canonical_aspect(&clean.environmental_aspect) {
            errors.add(
                "environmental_aspect",
                format!(
                    "'{}' is not a known aspect; choose one from the list or 'Other'.",
                    clean.environmental_aspect
                ),
            );
        }

        clean.person_email = crate::normalize::clean_text(form.person_email.as_deref());
        if let Some(email) = &clean.person_email {
            if !email.contains('@') {
                errors.add("person_email", "Enter a valid email address.");
            }
        }

        if errors.is_empty() {
            Ok(clean)
        } else {
            Err(errors)
        }
    }
}
