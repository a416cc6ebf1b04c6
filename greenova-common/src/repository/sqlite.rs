//! SQLite implementation of [`ObligationRepository`]

use super::{ObligationFilter, ObligationRepository, UpsertOutcome};
use crate::models::{Mechanism, Obligation, Project, ProjectMembership, ProjectRole, Status};
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

const OBLIGATION_COLUMNS: &str = "obligation_number, project_id, mechanism_id, obligation, \
     environmental_aspect, environmental_aspect_other, procedure, project_phase, \
     accountability, responsibility, status, action_due_date, close_out_date, \
     recurring_obligation, recurring_frequency, recurring_forecasted_date, inspection, \
     inspection_frequency, site_or_desktop, new_control_action_required, obligation_type, \
     supporting_information, general_comments, compliance_comments, \
     non_conformance_comments, person_email";

const MECHANISM_COLUMNS: &str =
    "id, project_id, name, status, not_started_count, in_progress_count, completed_count";

/// Repository over one borrowed SQLite connection
///
/// ```rust,ignore
/// let mut tx = pool.begin().await?;
/// let mut repo = SqliteRepository::new(&mut tx);
/// repo.upsert(&obligation).await?;
/// tx.commit().await?;
/// ```
pub struct SqliteRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SqliteRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }
}

fn parse_status(value: Option<String>, context: &str) -> Result<Status> {
    let value = value.unwrap_or_default();
    value.parse::<Status>().map_err(|_| {
        Error::Internal(format!(
            "{} has stored status '{}'; run sync-mechanisms to repair it",
            context, value
        ))
    })
}

fn obligation_from_row(row: &SqliteRow) -> Result<Obligation> {
    let obligation_number: String = row.try_get("obligation_number")?;
    let status = parse_status(row.try_get("status")?, &obligation_number)?;

    Ok(Obligation {
        project_id: row.try_get("project_id")?,
        mechanism_id: row.try_get("mechanism_id")?,
        obligation: row.try_get("obligation")?,
        environmental_aspect: row.try_get("environmental_aspect")?,
        environmental_aspect_other: row.try_get("environmental_aspect_other")?,
        procedure: row.try_get("procedure")?,
        project_phase: row.try_get("project_phase")?,
        accountability: row.try_get("accountability")?,
        responsibility: row.try_get("responsibility")?,
        status,
        action_due_date: row.try_get("action_due_date")?,
        close_out_date: row.try_get("close_out_date")?,
        recurring_obligation: row.try_get("recurring_obligation")?,
        recurring_frequency: row.try_get("recurring_frequency")?,
        recurring_forecasted_date: row.try_get("recurring_forecasted_date")?,
        inspection: row.try_get("inspection")?,
        inspection_frequency: row.try_get("inspection_frequency")?,
        site_or_desktop: row.try_get("site_or_desktop")?,
        new_control_action_required: row.try_get("new_control_action_required")?,
        obligation_type: row.try_get("obligation_type")?,
        supporting_information: row.try_get("supporting_information")?,
        general_comments: row.try_get("general_comments")?,
        compliance_comments: row.try_get("compliance_comments")?,
        non_conformance_comments: row.try_get("non_conformance_comments")?,
        person_email: row.try_get("person_email")?,
        obligation_number,
    })
}

fn mechanism_from_row(row: &SqliteRow) -> Result<Mechanism> {
    let name: String = row.try_get("name")?;
    let status = parse_status(row.try_get("status")?, &format!("mechanism '{}'", name))?;

    Ok(Mechanism {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        name,
        status,
        not_started_count: row.try_get("not_started_count")?,
        in_progress_count: row.try_get("in_progress_count")?,
        completed_count: row.try_get("completed_count")?,
    })
}

fn project_from_row(row: &SqliteRow) -> Result<Project> {
    Ok(Project {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
    })
}

#[async_trait]
impl<'c> ObligationRepository for SqliteRepository<'c> {
    async fn find_by_id(&mut self, obligation_number: &str) -> Result<Option<Obligation>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM obligations WHERE obligation_number = ?",
            OBLIGATION_COLUMNS
        ))
        .bind(obligation_number)
        .fetch_optional(&mut *self.conn)
        .await?;

        row.as_ref().map(obligation_from_row).transpose()
    }

    async fn upsert(&mut self, ob: &Obligation) -> Result<UpsertOutcome> {
        let exists: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM obligations WHERE obligation_number = ?")
                .bind(&ob.obligation_number)
                .fetch_optional(&mut *self.conn)
                .await?;

        let (sql, outcome) = if exists.is_some() {
            (
                r#"
                UPDATE obligations SET
                    project_id = ?, mechanism_id = ?, obligation = ?,
                    environmental_aspect = ?, environmental_aspect_other = ?,
                    procedure = ?, project_phase = ?, accountability = ?, responsibility = ?,
                    status = ?, action_due_date = ?, close_out_date = ?,
                    recurring_obligation = ?, recurring_frequency = ?, recurring_forecasted_date = ?,
                    inspection = ?, inspection_frequency = ?, site_or_desktop = ?,
                    new_control_action_required = ?, obligation_type = ?,
                    supporting_information = ?, general_comments = ?, compliance_comments = ?,
                    non_conformance_comments = ?, person_email = ?,
                    updated_at = CURRENT_TIMESTAMP
                WHERE obligation_number = ?
                "#,
                UpsertOutcome::Updated,
            )
        } else {
            (
                r#"
                INSERT INTO obligations (
                    project_id, mechanism_id, obligation,
                    environmental_aspect, environmental_aspect_other,
                    procedure, project_phase, accountability, responsibility,
                    status, action_due_date, close_out_date,
                    recurring_obligation, recurring_frequency, recurring_forecasted_date,
                    inspection, inspection_frequency, site_or_desktop,
                    new_control_action_required, obligation_type,
                    supporting_information, general_comments, compliance_comments,
                    non_conformance_comments, person_email,
                    obligation_number
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                UpsertOutcome::Created,
            )
        };

        // Both statements bind the identifier last
        sqlx::query(sql)
            .bind(ob.project_id)
            .bind(ob.mechanism_id)
            .bind(&ob.obligation)
            .bind(&ob.environmental_aspect)
            .bind(&ob.environmental_aspect_other)
            .bind(&ob.procedure)
            .bind(&ob.project_phase)
            .bind(&ob.accountability)
            .bind(&ob.responsibility)
            .bind(ob.status.as_str())
            .bind(ob.action_due_date)
            .bind(ob.close_out_date)
            .bind(ob.recurring_obligation)
            .bind(&ob.recurring_frequency)
            .bind(ob.recurring_forecasted_date)
            .bind(ob.inspection)
            .bind(&ob.inspection_frequency)
            .bind(&ob.site_or_desktop)
            .bind(ob.new_control_action_required)
            .bind(&ob.obligation_type)
            .bind(&ob.supporting_information)
            .bind(&ob.general_comments)
            .bind(&ob.compliance_comments)
            .bind(&ob.non_conformance_comments)
            .bind(&ob.person_email)
            .bind(&ob.obligation_number)
            .execute(&mut *self.conn)
            .await?;

        Ok(outcome)
    }

    async fn delete(&mut self, obligation_number: &str) -> Result<Option<Obligation>> {
        let existing = self.find_by_id(obligation_number).await?;
        if existing.is_some() {
            sqlx::query("DELETE FROM obligations WHERE obligation_number = ?")
                .bind(obligation_number)
                .execute(&mut *self.conn)
                .await?;
        }
        Ok(existing)
    }

    async fn list_by_mechanism(&mut self, mechanism_id: i64) -> Result<Vec<Obligation>> {
        let filter = ObligationFilter {
            mechanism_id: Some(mechanism_id),
            ..Default::default()
        };
        self.list_obligations(&filter).await
    }

    async fn list_obligations(&mut self, filter: &ObligationFilter) -> Result<Vec<Obligation>> {
        filter.validate()?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM obligations WHERE 1 = 1",
            OBLIGATION_COLUMNS
        ));
        if let Some(project_id) = filter.project_id {
            qb.push(" AND project_id = ").push_bind(project_id);
        }
        if let Some(mechanism_id) = filter.mechanism_id {
            qb.push(" AND mechanism_id = ").push_bind(mechanism_id);
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(aspect) = &filter.environmental_aspect {
            qb.push(" AND environmental_aspect = ").push_bind(aspect.clone());
        }
        if let Some(from) = filter.due_from {
            qb.push(" AND action_due_date >= ").push_bind(from);
        }
        if let Some(to) = filter.due_to {
            qb.push(" AND action_due_date <= ").push_bind(to);
        }
        qb.push(" ORDER BY obligation_number");

        let rows = qb.build().fetch_all(&mut *self.conn).await?;
        rows.iter().map(obligation_from_row).collect()
    }

    async fn reset_unknown_statuses(&mut self) -> Result<Vec<(String, Option<String>)>> {
        let invalid: Vec<(String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT obligation_number, status FROM obligations
            WHERE status IS NULL
               OR status NOT IN ('not started', 'in progress', 'completed')
            ORDER BY obligation_number
            "#,
        )
        .fetch_all(&mut *self.conn)
        .await?;

        if !invalid.is_empty() {
            sqlx::query(
                r#"
                UPDATE obligations SET status = 'not started', updated_at = CURRENT_TIMESTAMP
                WHERE status IS NULL
                   OR status NOT IN ('not started', 'in progress', 'completed')
                "#,
            )
            .execute(&mut *self.conn)
            .await?;
        }

        Ok(invalid)
    }

    async fn find_project(&mut self, name: &str) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT id, name, description FROM projects WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *self.conn)
            .await?;
        row.as_ref().map(project_from_row).transpose()
    }

    async fn get_project(&mut self, id: i64) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT id, name, description FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        row.as_ref().map(project_from_row).transpose()
    }

    async fn create_project(&mut self, name: &str, description: Option<&str>) -> Result<Project> {
        let result = sqlx::query("INSERT INTO projects (name, description) VALUES (?, ?)")
            .bind(name)
            .bind(description)
            .execute(&mut *self.conn)
            .await?;

        Ok(Project {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            description: description.map(str::to_string),
        })
    }

    async fn list_projects(&mut self) -> Result<Vec<Project>> {
        let rows = sqlx::query("SELECT id, name, description FROM projects ORDER BY name")
            .fetch_all(&mut *self.conn)
            .await?;
        rows.iter().map(project_from_row).collect()
    }

    async fn set_membership(&mut self, membership: &ProjectMembership) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO project_memberships (project_id, user_name, role)
            VALUES (?, ?, ?)
            ON CONFLICT(project_id, user_name) DO UPDATE SET role = excluded.role
            "#,
        )
        .bind(membership.project_id)
        .bind(&membership.user_name)
        .bind(membership.role.as_str())
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    async fn list_memberships(&mut self, project_id: i64) -> Result<Vec<ProjectMembership>> {
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT project_id, user_name, role FROM project_memberships WHERE project_id = ? ORDER BY user_name",
        )
        .bind(project_id)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter()
            .map(|(project_id, user_name, role)| {
                let role = role.parse::<ProjectRole>().map_err(Error::Internal)?;
                Ok(ProjectMembership {
                    project_id,
                    user_name,
                    role,
                })
            })
            .collect()
    }

    async fn find_mechanism(&mut self, project_id: i64, name: &str) -> Result<Option<Mechanism>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM mechanisms WHERE project_id = ? AND name = ?",
            MECHANISM_COLUMNS
        ))
        .bind(project_id)
        .bind(name)
        .fetch_optional(&mut *self.conn)
        .await?;
        row.as_ref().map(mechanism_from_row).transpose()
    }

    async fn get_mechanism(&mut self, id: i64) -> Result<Option<Mechanism>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM mechanisms WHERE id = ?",
            MECHANISM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;
        row.as_ref().map(mechanism_from_row).transpose()
    }

    async fn create_mechanism(&mut self, project_id: i64, name: &str) -> Result<Mechanism> {
        let result = sqlx::query("INSERT INTO mechanisms (project_id, name) VALUES (?, ?)")
            .bind(project_id)
            .bind(name)
            .execute(&mut *self.conn)
            .await?;

        Ok(Mechanism {
            id: result.last_insert_rowid(),
            project_id,
            name: name.to_string(),
            status: Status::NotStarted,
            not_started_count: 0,
            in_progress_count: 0,
            completed_count: 0,
        })
    }

    async fn list_mechanisms(&mut self, project_id: Option<i64>) -> Result<Vec<Mechanism>> {
        let rows = match project_id {
            Some(project_id) => {
                sqlx::query(&format!(
                    "SELECT {} FROM mechanisms WHERE project_id = ? ORDER BY name",
                    MECHANISM_COLUMNS
                ))
                .bind(project_id)
                .fetch_all(&mut *self.conn)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM mechanisms ORDER BY name, project_id",
                    MECHANISM_COLUMNS
                ))
                .fetch_all(&mut *self.conn)
                .await?
            }
        };
        rows.iter().map(mechanism_from_row).collect()
    }

    async fn save_mechanism_counts(&mut self, mechanism: &Mechanism) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE mechanisms SET
                status = ?, not_started_count = ?, in_progress_count = ?, completed_count = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(mechanism.status.as_str())
        .bind(mechanism.not_started_count)
        .bind(mechanism.in_progress_count)
        .bind(mechanism.completed_count)
        .bind(mechanism.id)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("mechanism {}", mechanism.id)));
        }
        Ok(())
    }
}
