//! Mechanism status aggregation
//!
//! A mechanism's counts and overall status are derived from the obligations
//! that reference it. Callers that create, delete, re-status or reassign an
//! obligation call [`recount_affected`] in the same transaction as the write,
//! passing both the previous and the new mechanism.

use crate::models::{Mechanism, Obligation, Status};
use crate::repository::ObligationRepository;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Per-status obligation counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub not_started: i64,
    pub in_progress: i64,
    pub completed: i64,
}

impl StatusCounts {
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = Status>,
    {
        let mut counts = Self::default();
        for status in statuses {
            match status {
                Status::NotStarted => counts.not_started += 1,
                Status::InProgress => counts.in_progress += 1,
                Status::Completed => counts.completed += 1,
            }
        }
        counts
    }

    pub fn from_obligations(obligations: &[Obligation]) -> Self {
        Self::from_statuses(obligations.iter().map(|o| o.status))
    }

    pub fn total(&self) -> i64 {
        self.not_started + self.in_progress + self.completed
    }

    pub fn get(&self, status: Status) -> i64 {
        match status {
            Status::NotStarted => self.not_started,
            Status::InProgress => self.in_progress,
            Status::Completed => self.completed,
        }
    }

    /// Overall status derived from the counts
    ///
    /// Any started or completed obligation moves the mechanism to
    /// `in progress` until every obligation is completed, so a mix of
    /// `not started` and `completed` with nothing in progress still reads as
    /// `in progress`.
    pub fn overall_status(&self) -> Status {
        let total = self.total();
        if total == 0 {
            Status::NotStarted
        } else if self.completed == total {
            Status::Completed
        } else if self.in_progress > 0 || self.completed > 0 {
            Status::InProgress
        } else {
            Status::NotStarted
        }
    }
}

impl Mechanism {
    /// Current stored counts
    pub fn counts(&self) -> StatusCounts {
        StatusCounts {
            not_started: self.not_started_count,
            in_progress: self.in_progress_count,
            completed: self.completed_count,
        }
    }

    /// Replace counts and derived status
    pub fn apply_counts(&mut self, counts: StatusCounts) {
        self.not_started_count = counts.not_started;
        self.in_progress_count = counts.in_progress;
        self.completed_count = counts.completed;
        self.status = counts.overall_status();
    }
}

/// Recompute and persist one mechanism from its current obligations
pub async fn recount_mechanism<R>(repo: &mut R, mechanism_id: i64) -> Result<Mechanism>
where
    R: ObligationRepository + ?Sized,
{
    let mut mechanism = repo
        .get_mechanism(mechanism_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("mechanism {}", mechanism_id)))?;

    let obligations = repo.list_by_mechanism(mechanism_id).await?;
    let counts = StatusCounts::from_obligations(&obligations);
    mechanism.apply_counts(counts);
    repo.save_mechanism_counts(&mechanism).await?;

    debug!(
        "Recounted mechanism '{}': {} not started, {} in progress, {} completed -> {}",
        mechanism.name,
        counts.not_started,
        counts.in_progress,
        counts.completed,
        mechanism.status
    );
    Ok(mechanism)
}

/// Recount the previous and the new mechanism of an obligation
///
/// Either side may be `None`; a mechanism appearing on both sides is
/// recounted once.
pub async fn recount_affected<R>(
    repo: &mut R,
    previous: Option<i64>,
    current: Option<i64>,
) -> Result<()>
where
    R: ObligationRepository + ?Sized,
{
    if let Some(id) = previous {
        recount_mechanism(repo, id).await?;
    }
    if let Some(id) = current {
        if previous != Some(id) {
            recount_mechanism(repo, id).await?;
        }
    }
    Ok(())
}

/// Outcome of [`sync_all_mechanisms`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Obligations whose stored status was reset to `not started`
    pub statuses_reset: usize,
    pub mechanisms_updated: usize,
    pub mechanisms_failed: usize,
}

/// Repair stored statuses, then recount every mechanism
///
/// A failure recounting one mechanism is logged and counted; the rest are
/// still processed.
pub async fn sync_all_mechanisms<R>(repo: &mut R) -> Result<SyncReport>
where
    R: ObligationRepository + ?Sized,
{
    let mut report = SyncReport::default();

    let reset = repo.reset_unknown_statuses().await?;
    for (number, previous) in &reset {
        match previous {
            None => info!("Fixed NULL status to 'not started' for obligation {}", number),
            Some(value) => warn!(
                "Invalid status '{}' for obligation {} reset to 'not started'",
                value, number
            ),
        }
    }
    report.statuses_reset = reset.len();

    let mechanisms = repo.list_mechanisms(None).await?;
    let count = mechanisms.len();
    info!("Updating counts for {} mechanisms", count);

    for (i, mechanism) in mechanisms.iter().enumerate() {
        match recount_mechanism(repo, mechanism.id).await {
            Ok(_) => report.mechanisms_updated += 1,
            Err(e) => {
                report.mechanisms_failed += 1;
                warn!("Error updating counts for {}: {}", mechanism.name, e);
            }
        }
        if (i + 1) % 10 == 0 || i + 1 == count {
            debug!("Processed {}/{} mechanisms", i + 1, count);
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(not_started: i64, in_progress: i64, completed: i64) -> StatusCounts {
        StatusCounts {
            not_started,
            in_progress,
            completed,
        }
    }

    #[test]
    fn test_empty_mechanism_is_not_started() {
        assert_eq!(counts(0, 0, 0).overall_status(), Status::NotStarted);
    }

    #[test]
    fn test_all_completed_is_completed() {
        assert_eq!(counts(0, 0, 4).overall_status(), Status::Completed);
    }

    #[test]
    fn test_only_not_started_stays_not_started() {
        assert_eq!(counts(5, 0, 0).overall_status(), Status::NotStarted);
    }

    #[test]
    fn test_any_in_progress_is_in_progress() {
        assert_eq!(counts(3, 1, 0).overall_status(), Status::InProgress);
        assert_eq!(counts(0, 1, 7).overall_status(), Status::InProgress);
    }

    #[test]
    fn test_mixed_not_started_and_completed_is_in_progress() {
        // 2 completed, 0 in progress, 3 not started
        assert_eq!(counts(3, 0, 2).overall_status(), Status::InProgress);
    }

    #[test]
    fn test_counts_sum_to_obligation_count() {
        let statuses = [
            Status::NotStarted,
            Status::Completed,
            Status::InProgress,
            Status::Completed,
            Status::NotStarted,
            Status::NotStarted,
        ];
        let c = StatusCounts::from_statuses(statuses);
        assert_eq!(c.total(), statuses.len() as i64);
        assert_eq!(c, counts(3, 1, 2));
        assert_eq!(c.get(Status::Completed), 2);
    }

    #[test]
    fn test_completed_iff_all_completed_and_nonempty() {
        for ns in 0..4 {
            for ip in 0..4 {
                for c in 0..4 {
                    let counts = counts(ns, ip, c);
                    let completed = counts.overall_status() == Status::Completed;
                    assert_eq!(
                        completed,
                        c == counts.total() && counts.total() > 0,
                        "{:?}",
                        counts
                    );
                }
            }
        }
    }

    #[test]
    fn test_apply_counts_updates_mechanism() {
        let mut m = Mechanism {
            id: 1,
            project_id: 1,
            name: "MS1180".into(),
            status: Status::NotStarted,
            not_started_count: 0,
            in_progress_count: 0,
            completed_count: 0,
        };
        m.apply_counts(counts(3, 0, 2));
        assert_eq!(m.status, Status::InProgress);
        assert_eq!(m.total_obligations(), 5);
        assert_eq!(m.counts(), counts(3, 0, 2));
    }
}
