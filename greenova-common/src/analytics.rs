//! Dashboard analytics
//!
//! Pure functions over obligation lists, plus [`build_dashboard`] which loads
//! the data through the repository.

use crate::aggregate::StatusCounts;
use crate::models::{Mechanism, Obligation, Status};
use crate::repository::{ObligationFilter, ObligationRepository};
use crate::Result;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default look-ahead for upcoming obligations
pub const UPCOMING_DAYS: i64 = 14;

/// Chart colour for a status
pub fn status_color(status: Status) -> &'static str {
    match status {
        Status::NotStarted => "#6c757d",
        Status::InProgress => "#007bff",
        Status::Completed => "#28a745",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMetrics {
    pub total: i64,
    pub not_started: i64,
    pub in_progress: i64,
    pub completed: i64,
    /// Percentage of obligations completed; 0.0 when there are none
    pub completion_rate: f64,
}

impl CompletionMetrics {
    pub fn from_counts(counts: StatusCounts) -> Self {
        let total = counts.total();
        let completion_rate = if total == 0 {
            0.0
        } else {
            counts.completed as f64 / total as f64 * 100.0
        };
        Self {
            total,
            not_started: counts.not_started,
            in_progress: counts.in_progress,
            completed: counts.completed,
            completion_rate,
        }
    }
}

pub fn completion_metrics(obligations: &[Obligation]) -> CompletionMetrics {
    CompletionMetrics::from_counts(StatusCounts::from_obligations(obligations))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartDataPoint {
    pub label: String,
    pub value: i64,
    pub color: String,
}

/// Status distribution as chart points, always in not started / in progress /
/// completed order
pub fn status_distribution(counts: StatusCounts) -> Vec<ChartDataPoint> {
    Status::ALL
        .iter()
        .map(|&status| ChartDataPoint {
            label: status.label().to_string(),
            value: counts.get(status),
            color: status_color(status).to_string(),
        })
        .collect()
}

/// Obligation count per environmental aspect, largest first then by name
pub fn aspect_distribution(obligations: &[Obligation]) -> Vec<(String, i64)> {
    let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
    for ob in obligations {
        *counts.entry(ob.environmental_aspect.as_str()).or_default() += 1;
    }

    let mut result: Vec<(String, i64)> = counts
        .into_iter()
        .map(|(aspect, count)| (aspect.to_string(), count))
        .collect();
    result.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    result
}

/// Obligations past their due date and not completed, oldest first
pub fn overdue(obligations: &[Obligation], today: NaiveDate) -> Vec<Obligation> {
    let mut result: Vec<Obligation> = obligations
        .iter()
        .filter(|ob| ob.is_overdue(today))
        .cloned()
        .collect();
    sort_by_due_date(&mut result);
    result
}

/// Open obligations due between today and `today + days`, both inclusive
pub fn upcoming(obligations: &[Obligation], today: NaiveDate, days: i64) -> Vec<Obligation> {
    let until = today + Duration::days(days);
    let mut result: Vec<Obligation> = obligations
        .iter()
        .filter(|ob| ob.status != Status::Completed)
        .filter(|ob| matches!(ob.action_due_date, Some(due) if due >= today && due <= until))
        .cloned()
        .collect();
    sort_by_due_date(&mut result);
    result
}

fn sort_by_due_date(obligations: &mut [Obligation]) {
    obligations.sort_by(|a, b| {
        a.action_due_date
            .cmp(&b.action_due_date)
            .then_with(|| a.obligation_number.cmp(&b.obligation_number))
    });
}

/// One mechanism row of the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MechanismSummary {
    pub mechanism: Mechanism,
    pub overdue: usize,
    pub chart: Vec<ChartDataPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub project: Option<String>,
    pub today: NaiveDate,
    pub metrics: CompletionMetrics,
    pub mechanisms: Vec<MechanismSummary>,
    pub aspects: Vec<(String, i64)>,
    pub overdue: usize,
    pub upcoming: usize,
}

/// Load and summarize obligations for one project or for all projects
pub async fn build_dashboard<R>(
    repo: &mut R,
    project: Option<(i64, String)>,
    today: NaiveDate,
) -> Result<Dashboard>
where
    R: ObligationRepository + ?Sized,
{
    let project_id = project.as_ref().map(|(id, _)| *id);
    let filter = ObligationFilter {
        project_id,
        ..Default::default()
    };
    let obligations = repo.list_obligations(&filter).await?;

    let mechanisms = repo
        .list_mechanisms(project_id)
        .await?
        .into_iter()
        .map(|mechanism| {
            let overdue = obligations
                .iter()
                .filter(|ob| ob.mechanism_id == Some(mechanism.id) && ob.is_overdue(today))
                .count();
            MechanismSummary {
                chart: status_distribution(mechanism.counts()),
                overdue,
                mechanism,
            }
        })
        .collect();

    Ok(Dashboard {
        project: project.map(|(_, name)| name),
        today,
        metrics: completion_metrics(&obligations),
        mechanisms,
        aspects: aspect_distribution(&obligations),
        overdue: overdue(&obligations, today).len(),
        upcoming: upcoming(&obligations, today, UPCOMING_DAYS).len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ob(id: &str, status: Status, due: Option<NaiveDate>, aspect: &str) -> Obligation {
        let mut ob = Obligation::new(id, 1, "text");
        ob.status = status;
        ob.action_due_date = due;
        ob.environmental_aspect = aspect.to_string();
        ob
    }

    #[test]
    fn test_completion_rate_zero_when_empty() {
        let metrics = completion_metrics(&[]);
        assert_eq!(metrics.total, 0);
        assert_eq!(metrics.completion_rate, 0.0);
    }

    #[test]
    fn test_completion_rate_percentage() {
        let obs = vec![
            ob("PCEMP-1", Status::Completed, None, "Water"),
            ob("PCEMP-2", Status::NotStarted, None, "Water"),
            ob("PCEMP-3", Status::InProgress, None, "Waste"),
            ob("PCEMP-4", Status::Completed, None, "Waste"),
        ];
        let metrics = completion_metrics(&obs);
        assert_eq!(metrics.total, 4);
        assert_eq!(metrics.completed, 2);
        assert!((metrics.completion_rate - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_status_distribution_order_and_colours() {
        let counts = StatusCounts {
            not_started: 3,
            in_progress: 1,
            completed: 2,
        };
        let chart = status_distribution(counts);
        let labels: Vec<&str> = chart.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, ["Not Started", "In Progress", "Completed"]);
        assert_eq!(chart[0].value, 3);
        assert_eq!(chart[2].color, "#28a745");
    }

    #[test]
    fn test_aspect_distribution_sorted() {
        let obs = vec![
            ob("PCEMP-1", Status::NotStarted, None, "Water"),
            ob("PCEMP-2", Status::NotStarted, None, "Air Quality"),
            ob("PCEMP-3", Status::NotStarted, None, "Water"),
            ob("PCEMP-4", Status::NotStarted, None, "Noise and Vibration"),
        ];
        let dist = aspect_distribution(&obs);
        assert_eq!(dist[0], ("Water".to_string(), 2));
        assert_eq!(dist[1], ("Air Quality".to_string(), 1));
        assert_eq!(dist[2], ("Noise and Vibration".to_string(), 1));
    }

    #[test]
    fn test_overdue_excludes_completed_and_today() {
        let today = date(2025, 5, 1);
        let obs = vec![
            ob("PCEMP-1", Status::NotStarted, Some(date(2025, 4, 1)), "Water"),
            ob("PCEMP-2", Status::Completed, Some(date(2025, 4, 1)), "Water"),
            ob("PCEMP-3", Status::InProgress, Some(today), "Water"),
            ob("PCEMP-4", Status::InProgress, Some(date(2025, 3, 1)), "Water"),
            ob("PCEMP-5", Status::InProgress, None, "Water"),
        ];
        let ids: Vec<String> = overdue(&obs, today)
            .into_iter()
            .map(|o| o.obligation_number)
            .collect();
        assert_eq!(ids, ["PCEMP-4", "PCEMP-1"]);
    }

    #[test]
    fn test_upcoming_window_is_inclusive() {
        let today = date(2025, 5, 1);
        let obs = vec![
            ob("PCEMP-1", Status::NotStarted, Some(date(2025, 5, 15)), "Water"),
            ob("PCEMP-2", Status::NotStarted, Some(date(2025, 5, 16)), "Water"),
            ob("PCEMP-3", Status::InProgress, Some(today), "Water"),
            ob("PCEMP-4", Status::Completed, Some(date(2025, 5, 3)), "Water"),
            ob("PCEMP-5", Status::NotStarted, Some(date(2025, 4, 30)), "Water"),
        ];
        let ids: Vec<String> = upcoming(&obs, today, UPCOMING_DAYS)
            .into_iter()
            .map(|o| o.obligation_number)
            .collect();
        assert_eq!(ids, ["PCEMP-3", "PCEMP-1"]);
    }
}
