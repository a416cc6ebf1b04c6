//! CSV row schema shared by import and export

use crate::models::Obligation;
use crate::normalize::{
    clean_text, parse_bool, parse_date_lenient, parse_status_lenient, Vocabulary,
};
use crate::time::{is_placeholder_identifier, placeholder_identifier};
use crate::validate::IdentifierRules;
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const COL_PROJECT: &str = "project__name";
pub const COL_OBLIGATION_NUMBER: &str = "obligation__number";

/// Column names in [`CsvRow`] field order
pub const CSV_COLUMNS: [&str; 25] = [
    "project__name",
    "primary__environmental__mechanism",
    "obligation__number",
    "environmental__aspect",
    "obligation",
    "status",
    "action__due_date",
    "close__out__date",
    "recurring__obligation",
    "recurring__frequency",
    "recurring__forcasted__date",
    "inspection",
    "inspection__frequency",
    "accountability",
    "responsibility",
    "procedure",
    "project_phase",
    "supporting__information",
    "general__comments",
    "compliance__comments",
    "non_conformance__comments",
    "person_email",
    "site_or__desktop",
    "new__control__action_required",
    "obligation_type",
];

/// One spreadsheet row
///
/// Every column is optional on input; missing columns read as empty. Field
/// order is the export column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvRow {
    #[serde(rename = "project__name")]
    pub project_name: Option<String>,
    #[serde(rename = "primary__environmental__mechanism")]
    pub mechanism: Option<String>,
    #[serde(rename = "obligation__number")]
    pub obligation_number: Option<String>,
    #[serde(rename = "environmental__aspect")]
    pub environmental_aspect: Option<String>,
    pub obligation: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "action__due_date")]
    pub action_due_date: Option<String>,
    #[serde(rename = "close__out__date")]
    pub close_out_date: Option<String>,
    #[serde(rename = "recurring__obligation")]
    pub recurring_obligation: Option<String>,
    #[serde(rename = "recurring__frequency")]
    pub recurring_frequency: Option<String>,
    #[serde(rename = "recurring__forcasted__date")]
    pub recurring_forecasted_date: Option<String>,
    pub inspection: Option<String>,
    #[serde(rename = "inspection__frequency")]
    pub inspection_frequency: Option<String>,
    pub accountability: Option<String>,
    pub responsibility: Option<String>,
    pub procedure: Option<String>,
    pub project_phase: Option<String>,
    #[serde(rename = "supporting__information")]
    pub supporting_information: Option<String>,
    #[serde(rename = "general__comments")]
    pub general_comments: Option<String>,
    #[serde(rename = "compliance__comments")]
    pub compliance_comments: Option<String>,
    #[serde(rename = "non_conformance__comments")]
    pub non_conformance_comments: Option<String>,
    pub person_email: Option<String>,
    #[serde(rename = "site_or__desktop")]
    pub site_or_desktop: Option<String>,
    #[serde(rename = "new__control__action_required")]
    pub new_control_action_required: Option<String>,
    pub obligation_type: Option<String>,
}

/// A row after normalization, not yet bound to stored project/mechanism ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRow {
    pub project_name: String,
    pub mechanism_name: Option<String>,
    /// `project_id` and `mechanism_id` are unset until the row is resolved
    pub obligation: Obligation,
}

fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn format_bool(value: bool) -> Option<String> {
    Some(value.to_string())
}

impl CsvRow {
    /// Export form of a stored obligation
    pub fn from_obligation(ob: &Obligation, project_name: &str, mechanism_name: Option<&str>) -> Self {
        Self {
            project_name: Some(project_name.to_string()),
            mechanism: mechanism_name.map(str::to_string),
            obligation_number: Some(ob.obligation_number.clone()),
            environmental_aspect: Some(ob.environmental_aspect.clone()),
            obligation: Some(ob.obligation.clone()),
            status: Some(ob.status.as_str().to_string()),
            action_due_date: format_date(ob.action_due_date),
            close_out_date: format_date(ob.close_out_date),
            recurring_obligation: format_bool(ob.recurring_obligation),
            recurring_frequency: ob.recurring_frequency.clone(),
            recurring_forecasted_date: format_date(ob.recurring_forecasted_date),
            inspection: format_bool(ob.inspection),
            inspection_frequency: ob.inspection_frequency.clone(),
            accountability: ob.accountability.clone(),
            responsibility: ob.responsibility.clone(),
            procedure: ob.procedure.clone(),
            project_phase: ob.project_phase.clone(),
            supporting_information: ob.supporting_information.clone(),
            general_comments: ob.general_comments.clone(),
            compliance_comments: ob.compliance_comments.clone(),
            non_conformance_comments: ob.non_conformance_comments.clone(),
            person_email: ob.person_email.clone(),
            site_or_desktop: ob.site_or_desktop.clone(),
            new_control_action_required: format_bool(ob.new_control_action_required),
            obligation_type: ob.obligation_type.clone(),
        }
    }

    /// Normalize a row leniently
    ///
    /// Only a missing project name (with no default) is an error. Bad dates
    /// and unknown statuses are logged and replaced; an unrepairable
    /// identifier gets a placeholder.
    pub fn prepare(
        &self,
        default_project: Option<&str>,
        vocabulary: &Vocabulary,
        identifiers: &IdentifierRules,
    ) -> Result<PreparedRow> {
        let project_name = clean_text(self.project_name.as_deref())
            .or_else(|| clean_text(default_project))
            .ok_or_else(|| {
                Error::InvalidInput("row has no project__name and no default project".to_string())
            })?;

        let raw_id = clean_text(self.obligation_number.as_deref());
        // Placeholders from an earlier import are kept so re-imports match them
        let repaired = match raw_id.as_deref() {
            Some(id) if is_placeholder_identifier(id) => Some(id.to_string()),
            Some(id) => identifiers.repair(id),
            None => None,
        };
        let obligation_number = match repaired {
            Some(id) => {
                if raw_id.as_deref() != Some(id.as_str()) {
                    debug!("Repaired obligation number {:?} -> {}", raw_id, id);
                }
                id
            }
            None => {
                let placeholder = placeholder_identifier();
                warn!(
                    "Invalid obligation number {:?}, using placeholder {}",
                    raw_id.unwrap_or_default(),
                    placeholder
                );
                placeholder
            }
        };

        let text = clean_text(self.obligation.as_deref()).unwrap_or_default();
        if text.is_empty() {
            warn!("Obligation {} has no obligation text", obligation_number);
        }

        let recurring_obligation = parse_bool(self.recurring_obligation.as_deref());
        let recurring_frequency = clean_text(self.recurring_frequency.as_deref())
            .map(|f| vocabulary.normalize_frequency(&f));
        if let Some(freq) = &recurring_frequency {
            if vocabulary.canonical_frequency(freq).is_none() {
                warn!(
                    "Obligation {} has unrecognised recurring frequency '{}'",
                    obligation_number, freq
                );
            }
        }

        let mut obligation = Obligation::new(obligation_number, 0, text);
        obligation.environmental_aspect =
            vocabulary.map_aspect(self.environmental_aspect.as_deref());
        obligation.status = parse_status_lenient(self.status.as_deref());
        obligation.action_due_date =
            parse_date_lenient("action__due_date", self.action_due_date.as_deref());
        obligation.close_out_date =
            parse_date_lenient("close__out__date", self.close_out_date.as_deref());
        obligation.recurring_obligation = recurring_obligation;
        obligation.recurring_frequency = recurring_frequency;
        obligation.recurring_forecasted_date = parse_date_lenient(
            "recurring__forcasted__date",
            self.recurring_forecasted_date.as_deref(),
        );
        obligation.inspection = parse_bool(self.inspection.as_deref());
        obligation.inspection_frequency = clean_text(self.inspection_frequency.as_deref())
            .map(|f| vocabulary.normalize_frequency(&f));
        obligation.accountability = clean_text(self.accountability.as_deref());
        obligation.responsibility = clean_text(self.responsibility.as_deref());
        obligation.procedure = clean_text(self.procedure.as_deref());
        obligation.project_phase = clean_text(self.project_phase.as_deref());
        obligation.supporting_information = clean_text(self.supporting_information.as_deref());
        obligation.general_comments = clean_text(self.general_comments.as_deref());
        obligation.compliance_comments = clean_text(self.compliance_comments.as_deref());
        obligation.non_conformance_comments =
            clean_text(self.non_conformance_comments.as_deref());
        obligation.person_email = clean_text(self.person_email.as_deref());
        obligation.site_or_desktop = clean_text(self.site_or_desktop.as_deref());
        obligation.new_control_action_required =
            parse_bool(self.new_control_action_required.as_deref());
        obligation.obligation_type = clean_text(self.obligation_type.as_deref());

        Ok(PreparedRow {
            project_name,
            mechanism_name: clean_text(self.mechanism.as_deref()),
            obligation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Status;
    use crate::normalize::ASPECT_OTHER;

    fn prepare(row: &CsvRow, default_project: Option<&str>) -> Result<PreparedRow> {
        row.prepare(
            default_project,
            &Vocabulary::default(),
            &IdentifierRules::default(),
        )
    }

    fn row() -> CsvRow {
        CsvRow {
            project_name: Some("Portside".into()),
            mechanism: Some("Portside CEMP".into()),
            obligation_number: Some("12".into()),
            environmental_aspect: Some("dust".into()),
            obligation: Some("Water haul roads daily".into()),
            status: Some("In Progress".into()),
            action_due_date: Some("30/06/2025".into()),
            recurring_obligation: Some("Yes".into()),
            recurring_frequency: Some("Semi-Annual".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_prepare_normalizes_values() {
        let prepared = prepare(&row(), None).unwrap();
        let ob = &prepared.obligation;
        assert_eq!(prepared.project_name, "Portside");
        assert_eq!(prepared.mechanism_name.as_deref(), Some("Portside CEMP"));
        assert_eq!(ob.obligation_number, "PCEMP-12");
        assert_eq!(ob.environmental_aspect, "Air Quality");
        assert_eq!(ob.status, Status::InProgress);
        assert_eq!(ob.action_due_date, NaiveDate::from_ymd_opt(2025, 6, 30));
        assert!(ob.recurring_obligation);
        assert_eq!(ob.recurring_frequency.as_deref(), Some("biannual"));
    }

    #[test]
    fn test_empty_status_imports_as_not_started() {
        let mut r = row();
        r.status = Some(String::new());
        assert_eq!(prepare(&r, None).unwrap().obligation.status, Status::NotStarted);
    }

    #[test]
    fn test_default_project_used_when_column_empty() {
        let mut r = row();
        r.project_name = None;
        let prepared = prepare(&r, Some("Harbour Works")).unwrap();
        assert_eq!(prepared.project_name, "Harbour Works");
    }

    #[test]
    fn test_missing_project_is_row_error() {
        let mut r = row();
        r.project_name = Some("  ".into());
        assert!(matches!(prepare(&r, None), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_unrepairable_identifier_gets_placeholder() {
        let mut r = row();
        r.obligation_number = Some("FOO-3".into());
        let prepared = prepare(&r, None).unwrap();
        assert!(prepared.obligation.obligation_number.starts_with("UNKNOWN-"));

        r.obligation_number = None;
        let prepared = prepare(&r, None).unwrap();
        assert!(prepared.obligation.obligation_number.starts_with("UNKNOWN-"));
    }

    #[test]
    fn test_existing_placeholder_identifier_kept() {
        let mut r = row();
        r.obligation_number = Some("UNKNOWN-20250101120000000001".into());
        let prepared = prepare(&r, None).unwrap();
        assert_eq!(
            prepared.obligation.obligation_number,
            "UNKNOWN-20250101120000000001"
        );
    }

    #[test]
    fn test_import_is_lenient_about_business_rules() {
        let r = CsvRow {
            project_name: Some("Portside".into()),
            obligation_number: Some("PCEMP-1".into()),
            status: Some("completed".into()),
            recurring_obligation: Some("true".into()),
            recurring_frequency: Some("every full moon".into()),
            action_due_date: Some("not a date".into()),
            ..Default::default()
        };
        let ob = prepare(&r, None).unwrap().obligation;
        assert_eq!(ob.status, Status::Completed);
        assert_eq!(ob.close_out_date, None);
        assert_eq!(ob.recurring_frequency.as_deref(), Some("every full moon"));
        assert_eq!(ob.action_due_date, None);
        assert_eq!(ob.environmental_aspect, ASPECT_OTHER);
        assert_eq!(prepare(&r, None).unwrap().mechanism_name, None);
    }

    #[test]
    fn test_serialized_header_matches_column_list() {
        let mut writer = csv::Writer::from_writer(vec![]);
        writer.serialize(row()).unwrap();
        let data = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let header = data.lines().next().unwrap();
        assert_eq!(header, CSV_COLUMNS.join(","));
    }

    #[test]
    fn test_export_row_prepares_back_to_same_obligation() {
        let original = prepare(&row(), None).unwrap().obligation;
        let exported = CsvRow::from_obligation(&original, "Portside", Some("Portside CEMP"));
        let again = prepare(&exported, None).unwrap();
        assert_eq!(again.obligation, original);
        assert_eq!(again.mechanism_name.as_deref(), Some("Portside CEMP"));
    }
}
