//! Interactive obligation operations
//!
//! Each operation validates strictly, writes, and recounts the affected
//! mechanisms in a single transaction.

use crate::aggregate::recount_affected;
use crate::models::{Mechanism, Obligation, Project, ProjectMembership, ProjectRole, Status};
use crate::normalize::Vocabulary;
use crate::repository::{ObligationRepository, SqliteRepository, UpsertOutcome};
use crate::validate::{FieldErrors, IdentifierRules, ObligationForm, ObligationValidator};
use crate::{Error, Result};
use chrono::NaiveDate;
use sqlx::SqlitePool;
use tracing::info;

pub struct ObligationService<'a> {
    pool: &'a SqlitePool,
    vocabulary: &'a Vocabulary,
    identifiers: &'a IdentifierRules,
}

fn field_error(field: &str, message: impl Into<String>) -> Error {
    let mut errors = FieldErrors::new();
    errors.add(field, message);
    Error::Validation(errors)
}

async fn require_obligation<R>(repo: &mut R, obligation_number: &str) -> Result<Obligation>
where
    R: ObligationRepository + ?Sized,
{
    repo.find_by_id(obligation_number)
        .await?
        .ok_or_else(|| Error::NotFound(format!("obligation {}", obligation_number)))
}

impl<'a> ObligationService<'a> {
    pub fn new(
        pool: &'a SqlitePool,
        vocabulary: &'a Vocabulary,
        identifiers: &'a IdentifierRules,
    ) -> Self {
        Self {
            pool,
            vocabulary,
            identifiers,
        }
    }

    /// Create or edit an obligation from a form
    ///
    /// The project and mechanism named on the form must already exist.
    pub async fn submit(&self, form: &ObligationForm) -> Result<(Obligation, UpsertOutcome)> {
        let clean = ObligationValidator::new(self.vocabulary, self.identifiers)
            .validate(form)
            .map_err(Error::Validation)?;

        let mut tx = self.pool.begin().await?;
        let mut repo = SqliteRepository::new(&mut *tx);

        let project = repo
            .find_project(&clean.project_name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("project '{}'", clean.project_name)))?;

        let mechanism_id = match &clean.mechanism_name {
            Some(name) => Some(
                repo.find_mechanism(project.id, name)
                    .await?
                    .ok_or_else(|| {
                        Error::NotFound(format!(
                            "mechanism '{}' in project '{}'",
                            name, project.name
                        ))
                    })?
                    .id,
            ),
            None => None,
        };

        let previous = repo.find_by_id(&clean.obligation_number).await?;
        let obligation = clean.into_obligation(project.id, mechanism_id)?;
        let outcome = repo.upsert(&obligation).await?;
        recount_affected(
            &mut repo,
            previous.and_then(|p| p.mechanism_id),
            obligation.mechanism_id,
        )
        .await?;

        tx.commit().await?;
        info!("Obligation {} {:?}", obligation.obligation_number, outcome);
        Ok((obligation, outcome))
    }

    /// Change an obligation's status
    ///
    /// `close_out_date` replaces the stored close-out date when given. A
    /// completed obligation must end up with a close-out date.
    pub async fn set_status(
        &self,
        obligation_number: &str,
        status: &str,
        close_out_date: Option<NaiveDate>,
    ) -> Result<Obligation> {
        let status = status
            .parse::<Status>()
            .map_err(|msg| field_error("status", msg))?;

        let mut tx = self.pool.begin().await?;
        let mut repo = SqliteRepository::new(&mut *tx);

        let mut obligation = require_obligation(&mut repo, obligation_number).await?;
        let previous_status = obligation.status;
        obligation.status = status;
        if close_out_date.is_some() {
            obligation.close_out_date = close_out_date;
        }

        let mut errors = FieldErrors::new();
        if status == Status::Completed && obligation.close_out_date.is_none() {
            errors.add(
                "close_out_date",
                "A close-out date is required when the status is completed.",
            );
        }
        if let (Some(due), Some(closed)) = (obligation.action_due_date, obligation.close_out_date) {
            if closed < due {
                errors.add(
                    "close_out_date",
                    "Close-out date cannot be before the action due date.",
                );
            }
        }
        if !errors.is_empty() {
            return Err(Error::Validation(errors));
        }

        repo.upsert(&obligation).await?;
        recount_affected(&mut repo, obligation.mechanism_id, None).await?;

        tx.commit().await?;
        info!(
            "Obligation {} status {} -> {}",
            obligation.obligation_number, previous_status, obligation.status
        );
        Ok(obligation)
    }

    /// Move an obligation to another mechanism of its project, or detach it
    pub async fn reassign(
        &self,
        obligation_number: &str,
        mechanism_name: Option<&str>,
    ) -> Result<Obligation> {
        let mut tx = self.pool.begin().await?;
        let mut repo = SqliteRepository::new(&mut *tx);

        let mut obligation = require_obligation(&mut repo, obligation_number).await?;
        let previous = obligation.mechanism_id;

        obligation.mechanism_id = match mechanism_name {
            Some(name) => Some(
                repo.find_mechanism(obligation.project_id, name)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("mechanism '{}'", name)))?
                    .id,
            ),
            None => None,
        };

        repo.upsert(&obligation).await?;
        recount_affected(&mut repo, previous, obligation.mechanism_id).await?;

        tx.commit().await?;
        info!(
            "Obligation {} reassigned to {}",
            obligation.obligation_number,
            mechanism_name.unwrap_or("no mechanism")
        );
        Ok(obligation)
    }

    /// Delete an obligation and recount its mechanism
    pub async fn delete(&self, obligation_number: &str) -> Result<Obligation> {
        let mut tx = self.pool.begin().await?;
        let mut repo = SqliteRepository::new(&mut *tx);

        let removed = repo
            .delete(obligation_number)
            .await?
            .ok_or_else(|| Error::NotFound(format!("obligation {}", obligation_number)))?;
        recount_affected(&mut repo, removed.mechanism_id, None).await?;

        tx.commit().await?;
        info!("Deleted obligation {}", removed.obligation_number);
        Ok(removed)
    }

    /// Create a project; names are unique
    pub async fn create_project(&self, name: &str, description: Option<&str>) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("project name must not be empty".to_string()));
        }

        let mut conn = self.pool.acquire().await?;
        let mut repo = SqliteRepository::new(&mut *conn);
        if repo.find_project(name).await?.is_some() {
            return Err(Error::InvalidInput(format!("project '{}' already exists", name)));
        }
        let project = repo.create_project(name, description).await?;
        info!("Created project '{}' (id {})", project.name, project.id);
        Ok(project)
    }

    /// Create a mechanism in an existing project
    pub async fn create_mechanism(&self, project_name: &str, name: &str) -> Result<Mechanism> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("mechanism name must not be empty".to_string()));
        }

        let mut conn = self.pool.acquire().await?;
        let mut repo = SqliteRepository::new(&mut *conn);
        let project = repo
            .find_project(project_name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("project '{}'", project_name)))?;
        if repo.find_mechanism(project.id, name).await?.is_some() {
            return Err(Error::InvalidInput(format!(
                "mechanism '{}' already exists in project '{}'",
                name, project.name
            )));
        }
        let mechanism = repo.create_mechanism(project.id, name).await?;
        info!("Created mechanism '{}' in project '{}'", mechanism.name, project.name);
        Ok(mechanism)
    }

    /// Add a user to a project, or change their role
    pub async fn add_member(
        &self,
        project_name: &str,
        user_name: &str,
        role: ProjectRole,
    ) -> Result<ProjectMembership> {
        let user_name = user_name.trim();
        if user_name.is_empty() {
            return Err(Error::InvalidInput("user name must not be empty".to_string()));
        }

        let mut conn = self.pool.acquire().await?;
        let mut repo = SqliteRepository::new(&mut *conn);

        let project = repo
            .find_project(project_name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("project '{}'", project_name)))?;

        let membership = ProjectMembership {
            project_id: project.id,
            user_name: user_name.to_string(),
            role,
        };
        repo.set_membership(&membership).await?;
        info!("{} is now {} of project '{}'", user_name, role, project.name);
        Ok(membership)
    }
}
