//! Date and timestamp utilities

use chrono::{DateTime, Local, NaiveDate, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Today's date in local time, used for overdue and upcoming checks
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

const PLACEHOLDER_PREFIX: &str = "UNKNOWN-";

/// Placeholder identifier for import rows whose identifier cannot be repaired
///
/// Microsecond resolution keeps placeholders from one run distinct.
pub fn placeholder_identifier() -> String {
    format!("{}{}", PLACEHOLDER_PREFIX, now().format("%Y%m%d%H%M%S%6f"))
}

/// True for identifiers produced by [`placeholder_identifier`]
pub fn is_placeholder_identifier(id: &str) -> bool {
    id.strip_prefix(PLACEHOLDER_PREFIX)
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}
