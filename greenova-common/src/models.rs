//! Domain models
//!
//! Obligations, environmental mechanisms and projects as stored in the
//! database. Status and role values are stored as their lower-case text form.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Progress state of an obligation, and the derived state of a mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Status {
    #[default]
    #[serde(rename = "not started")]
    NotStarted,
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
}

impl Status {
    /// All statuses in display order
    pub const ALL: [Status; 3] = [Status::NotStarted, Status::InProgress, Status::Completed];

    /// Canonical stored form
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NotStarted => "not started",
            Status::InProgress => "in progress",
            Status::Completed => "completed",
        }
    }

    /// Human-readable label used in reports and chart data
    pub fn label(&self) -> &'static str {
        match self {
            Status::NotStarted => "Not Started",
            Status::InProgress => "In Progress",
            Status::Completed => "Completed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    /// Strict parse: only the three canonical values are accepted
    /// (case-insensitive, surrounding whitespace ignored).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "not started" => Ok(Status::NotStarted),
            "in progress" => Ok(Status::InProgress),
            "completed" => Ok(Status::Completed),
            other => Err(format!(
                "'{}' is not a valid status (expected one of: not started, in progress, completed)",
                other
            )),
        }
    }
}

/// Role of a user within a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectRole {
    Owner,
    Manager,
    #[default]
    Member,
    Viewer,
}

impl ProjectRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectRole::Owner => "owner",
            ProjectRole::Manager => "manager",
            ProjectRole::Member => "member",
            ProjectRole::Viewer => "viewer",
        }
    }
}

impl fmt::Display for ProjectRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ProjectRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "owner" => Ok(ProjectRole::Owner),
            "manager" => Ok(ProjectRole::Manager),
            "member" => Ok(ProjectRole::Member),
            "viewer" => Ok(ProjectRole::Viewer),
            other => Err(format!("unknown project role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMembership {
    pub project_id: i64,
    pub user_name: String,
    pub role: ProjectRole,
}

/// Environmental mechanism (permit or approval) grouping obligations
///
/// The three counts and `status` are maintained by
/// [`crate::aggregate::recount_mechanism`]; they are never edited directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mechanism {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub status: Status,
    pub not_started_count: i64,
    pub in_progress_count: i64,
    pub completed_count: i64,
}

impl Mechanism {
    /// Total number of obligations recorded by the last recount
    pub fn total_obligations(&self) -> i64 {
        self.not_started_count + self.in_progress_count + self.completed_count
    }
}

/// A single tracked compliance requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obligation {
    /// Unique identifier, e.g. `PCEMP-12`. Immutable once stored.
    pub obligation_number: String,
    pub project_id: i64,
    pub mechanism_id: Option<i64>,
    pub obligation: String,
    pub environmental_aspect: String,
    /// Free text describing the aspect when `environmental_aspect` is `Other`
    pub environmental_aspect_other: Option<String>,
    pub procedure: Option<String>,
    pub project_phase: Option<String>,
    pub accountability: Option<String>,
    pub responsibility: Option<String>,
    pub status: Status,
    pub action_due_date: Option<NaiveDate>,
    pub close_out_date: Option<NaiveDate>,
    pub recurring_obligation: bool,
    pub recurring_frequency: Option<String>,
    pub recurring_forecasted_date: Option<NaiveDate>,
    pub inspection: bool,
    pub inspection_frequency: Option<String>,
    pub site_or_desktop: Option<String>,
    pub new_control_action_required: bool,
    pub obligation_type: Option<String>,
    pub supporting_information: Option<String>,
    pub general_comments: Option<String>,
    pub compliance_comments: Option<String>,
    pub non_conformance_comments: Option<String>,
    pub person_email: Option<String>,
}

impl Obligation {
    /// Create an obligation with every optional field empty
    pub fn new(obligation_number: impl Into<String>, project_id: i64, text: impl Into<String>) -> Self {
        Self {
            obligation_number: obligation_number.into(),
            project_id,
            mechanism_id: None,
            obligation: text.into(),
            environmental_aspect: crate::normalize::ASPECT_OTHER.to_string(),
            environmental_aspect_other: None,
            procedure: None,
            project_phase: None,
            accountability: None,
            responsibility: None,
            status: Status::NotStarted,
            action_due_date: None,
            close_out_date: None,
            recurring_obligation: false,
            recurring_frequency: None,
            recurring_forecasted_date: None,
            inspection: false,
            inspection_frequency: None,
            site_or_desktop: None,
            new_control_action_required: false,
            obligation_type: None,
            supporting_information: None,
            general_comments: None,
            compliance_comments: None,
            non_conformance_comments: None,
            person_email: None,
        }
    }

    /// An obligation is overdue when its due date has passed and it is not completed
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        match self.action_due_date {
            Some(due) => self.status != Status::Completed && due < today,
            None => false,
        }
    }
}
