//! Storage interface for obligations, mechanisms and projects
//!
//! The rules in [`crate::aggregate`], [`crate::import`] and [`crate::service`]
//! only talk to storage through [`ObligationRepository`]. The SQLite
//! implementation borrows a single connection, so the same code runs inside a
//! transaction (`&mut *tx`) or directly on a pooled connection.

mod sqlite;

pub use sqlite::SqliteRepository;

use crate::models::{Mechanism, Obligation, Project, ProjectMembership, Status};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::info;

/// Result of [`ObligationRepository::upsert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Query parameters for [`ObligationRepository::list_obligations`]
///
/// Unset fields do not filter. Due-date bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObligationFilter {
    pub project_id: Option<i64>,
    pub mechanism_id: Option<i64>,
    pub status: Option<Status>,
    pub environmental_aspect: Option<String>,
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
}

impl ObligationFilter {
    /// Reject an inverted due-date range
    pub fn validate(&self) -> Result<()> {
        if let (Some(from), Some(to)) = (self.due_from, self.due_to) {
            if from > to {
                return Err(Error::InvalidInput(
                    "Start date must be before end date".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Obligation/mechanism/project storage
#[async_trait]
pub trait ObligationRepository: Send {
    async fn find_by_id(&mut self, obligation_number: &str) -> Result<Option<Obligation>>;

    /// Insert, or replace every field except the identifier
    async fn upsert(&mut self, obligation: &Obligation) -> Result<UpsertOutcome>;

    /// Delete and return the removed obligation, if it existed
    async fn delete(&mut self, obligation_number: &str) -> Result<Option<Obligation>>;

    async fn list_by_mechanism(&mut self, mechanism_id: i64) -> Result<Vec<Obligation>>;

    async fn list_obligations(&mut self, filter: &ObligationFilter) -> Result<Vec<Obligation>>;

    /// Reset NULL, empty or unknown stored statuses to `not started`
    ///
    /// Returns `(obligation_number, previous value)` for every row changed.
    async fn reset_unknown_statuses(&mut self) -> Result<Vec<(String, Option<String>)>>;

    async fn find_project(&mut self, name: &str) -> Result<Option<Project>>;

    async fn get_project(&mut self, id: i64) -> Result<Option<Project>>;

    async fn create_project(&mut self, name: &str, description: Option<&str>) -> Result<Project>;

    async fn list_projects(&mut self) -> Result<Vec<Project>>;

    async fn set_membership(&mut self, membership: &ProjectMembership) -> Result<()>;

    async fn list_memberships(&mut self, project_id: i64) -> Result<Vec<ProjectMembership>>;

    async fn find_mechanism(&mut self, project_id: i64, name: &str) -> Result<Option<Mechanism>>;

    async fn get_mechanism(&mut self, id: i64) -> Result<Option<Mechanism>>;

    async fn create_mechanism(&mut self, project_id: i64, name: &str) -> Result<Mechanism>;

    async fn list_mechanisms(&mut self, project_id: Option<i64>) -> Result<Vec<Mechanism>>;

    /// Persist the counts and status of a mechanism
    async fn save_mechanism_counts(&mut self, mechanism: &Mechanism) -> Result<()>;

    async fn get_or_create_project(&mut self, name: &str) -> Result<Project> {
        if let Some(project) = self.find_project(name).await? {
            return Ok(project);
        }
        let description = format!("Imported project {}", name);
        let project = self.create_project(name, Some(&description)).await?;
        info!("Created project '{}' (id {})", project.name, project.id);
        Ok(project)
    }

    async fn get_or_create_mechanism(&mut self, project_id: i64, name: &str) -> Result<Mechanism> {
        if let Some(mechanism) = self.find_mechanism(project_id, name).await? {
            return Ok(mechanism);
        }
        let mechanism = self.create_mechanism(project_id, name).await?;
        info!(
            "Created mechanism '{}' (id {}) in project {}",
            mechanism.name, mechanism.id, project_id
        );
        Ok(mechanism)
    }
}
