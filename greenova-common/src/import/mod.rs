//! CSV obligation import
//!
//! Rows are processed in file order. Each row is normalized leniently
//! ([`CsvRow::prepare`]), its project and mechanism are resolved or created,
//! and the obligation is created, skipped or (with `update`) overwritten. The
//! row's writes and the mechanism recount share one transaction unless
//! `use_transaction` is off.

mod row;

pub use row::{CsvRow, PreparedRow, COL_OBLIGATION_NUMBER, COL_PROJECT, CSV_COLUMNS};

use crate::aggregate::recount_affected;
use crate::normalize::Vocabulary;
use crate::repository::{ObligationRepository, SqliteRepository};
use crate::validate::IdentifierRules;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Import behaviour switches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Project used for rows with an empty `project__name`
    pub default_project: Option<String>,
    /// Overwrite existing obligations instead of skipping them
    pub update: bool,
    /// Resolve and report without writing anything
    pub dry_run: bool,
    /// Keep going after a failed row
    pub continue_on_error: bool,
    /// Run each row in its own transaction
    pub use_transaction: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            default_project: None,
            update: false,
            dry_run: false,
            continue_on_error: true,
            use_transaction: true,
        }
    }
}

/// What happened (or would happen, in a dry run) to one row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    Created,
    Updated,
    Skipped,
    WouldCreate,
    WouldUpdate,
    WouldSkip,
}

impl RowOutcome {
    pub fn describe(&self) -> &'static str {
        match self {
            RowOutcome::Created => "created",
            RowOutcome::Updated => "updated",
            RowOutcome::Skipped => "skipped",
            RowOutcome::WouldCreate => "would create",
            RowOutcome::WouldUpdate => "would update",
            RowOutcome::WouldSkip => "would skip",
        }
    }
}

/// Per-run counters
///
/// In a dry run the would-be outcomes are counted under the matching
/// created/updated/skipped counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
    pub dry_run: bool,
}

impl ImportSummary {
    fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Created | RowOutcome::WouldCreate => self.created += 1,
            RowOutcome::Updated | RowOutcome::WouldUpdate => self.updated += 1,
            RowOutcome::Skipped | RowOutcome::WouldSkip => self.skipped += 1,
        }
    }
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (created, updated, skipped) = if self.dry_run {
            ("Would create", "Would update", "Would skip")
        } else {
            ("Created", "Updated", "Skipped")
        };
        writeln!(f, "Import summary{}:", if self.dry_run { " (dry run)" } else { "" })?;
        writeln!(f, "  Total rows: {}", self.total)?;
        writeln!(f, "  {}: {}", created, self.created)?;
        writeln!(f, "  {}: {}", updated, self.updated)?;
        writeln!(f, "  {}: {}", skipped, self.skipped)?;
        write!(f, "  Errors: {}", self.errors)
    }
}

/// Header names the run requires
fn required_columns(options: &ImportOptions) -> Vec<&'static str> {
    if options.default_project.is_some() {
        vec![COL_OBLIGATION_NUMBER]
    } else {
        vec![COL_OBLIGATION_NUMBER, COL_PROJECT]
    }
}

/// Check the header row, returning an error naming every missing column
pub fn check_header(header: &csv::StringRecord, options: &ImportOptions) -> Result<()> {
    if header.is_empty() {
        return Err(Error::InvalidInput("CSV file has no header row".to_string()));
    }

    let missing: Vec<&str> = required_columns(options)
        .into_iter()
        .filter(|col| !header.iter().any(|h| h.trim() == *col))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "CSV header is missing required column(s): {}",
            missing.join(", ")
        )))
    }
}

/// CSV obligation importer
pub struct Importer<'a> {
    pool: &'a SqlitePool,
    vocabulary: &'a Vocabulary,
    identifiers: &'a IdentifierRules,
    options: ImportOptions,
}

impl<'a> Importer<'a> {
    pub fn new(
        pool: &'a SqlitePool,
        vocabulary: &'a Vocabulary,
        identifiers: &'a IdentifierRules,
        options: ImportOptions,
    ) -> Self {
        Self {
            pool,
            vocabulary,
            identifiers,
            options,
        }
    }

    /// Import a CSV file
    ///
    /// File-level problems (missing file, bad header) are returned as errors;
    /// row problems are logged and counted in the summary.
    pub async fn import_file(&self, path: &Path) -> Result<ImportSummary> {
        if !path.is_file() {
            return Err(Error::NotFound(format!("CSV file {}", path.display())));
        }
        info!("Importing obligations from {}", path.display());
        let file = std::fs::File::open(path)?;
        self.import_reader(file).await
    }

    /// Import CSV data from any reader
    pub async fn import_reader<R: io::Read>(&self, reader: R) -> Result<ImportSummary> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .flexible(true)
            .from_reader(reader);

        let header = reader.headers()?.clone();
        check_header(&header, &self.options)?;

        let mut summary = ImportSummary {
            dry_run: self.options.dry_run,
            ..Default::default()
        };
        if self.options.dry_run {
            info!("Dry run: no changes will be written");
        }
        let mut planned = HashSet::new();

        for (index, record) in reader.deserialize::<CsvRow>().enumerate() {
            // Header is line 1
            let line = index + 2;
            summary.total += 1;

            let result = match record {
                Ok(row) => self.import_row(&row, &mut planned).await,
                Err(e) => Err(Error::from(e)),
            };

            match result {
                Ok((id, outcome)) => {
                    debug!("Row {}: {} {}", line, id, outcome.describe());
                    summary.record(outcome);
                }
                Err(e) => {
                    summary.errors += 1;
                    error!("Row {}: {}", line, e);
                    if !self.options.continue_on_error {
                        warn!("Stopping at first error (row {})", line);
                        break;
                    }
                }
            }
        }

        info!(
            "Import finished: {} rows, {} created, {} updated, {} skipped, {} errors",
            summary.total, summary.created, summary.updated, summary.skipped, summary.errors
        );
        Ok(summary)
    }

    /// Process one row, returning its final identifier and outcome
    ///
    /// `planned` collects identifiers seen earlier in a dry run.
    async fn import_row(
        &self,
        row: &CsvRow,
        planned: &mut HashSet<String>,
    ) -> Result<(String, RowOutcome)> {
        let prepared = row.prepare(
            self.options.default_project.as_deref(),
            self.vocabulary,
            self.identifiers,
        )?;
        let id = prepared.obligation.obligation_number.clone();

        let outcome = if self.options.dry_run {
            let mut conn = self.pool.acquire().await?;
            plan_row(
                &mut SqliteRepository::new(&mut *conn),
                &prepared,
                self.options.update,
                planned,
            )
            .await?
        } else if self.options.use_transaction {
            let mut tx = self.pool.begin().await?;
            let outcome =
                write_row(&mut SqliteRepository::new(&mut *tx), prepared, self.options.update)
                    .await?;
            tx.commit().await?;
            outcome
        } else {
            let mut conn = self.pool.acquire().await?;
            write_row(&mut SqliteRepository::new(&mut *conn), prepared, self.options.update)
                .await?
        };

        Ok((id, outcome))
    }
}

/// Resolve project and mechanism, write the obligation, recount
pub async fn write_row<R>(repo: &mut R, row: PreparedRow, update: bool) -> Result<RowOutcome>
where
    R: ObligationRepository + ?Sized,
{
    let project = repo.get_or_create_project(&row.project_name).await?;
    let mechanism_id = match &row.mechanism_name {
        Some(name) => Some(repo.get_or_create_mechanism(project.id, name).await?.id),
        None => None,
    };

    let mut obligation = row.obligation;
    obligation.project_id = project.id;
    obligation.mechanism_id = mechanism_id;

    match repo.find_by_id(&obligation.obligation_number).await? {
        Some(_) if !update => Ok(RowOutcome::Skipped),
        Some(existing) => {
            repo.upsert(&obligation).await?;
            recount_affected(repo, existing.mechanism_id, obligation.mechanism_id).await?;
            Ok(RowOutcome::Updated)
        }
        None => {
            repo.upsert(&obligation).await?;
            recount_affected(repo, None, obligation.mechanism_id).await?;
            Ok(RowOutcome::Created)
        }
    }
}

/// Read-only counterpart of [`write_row`] for dry runs
///
/// Identifiers in `planned` count as existing, as an earlier row of the same
/// file would have created them; this row's identifier is added.
pub async fn plan_row<R>(
    repo: &mut R,
    row: &PreparedRow,
    update: bool,
    planned: &mut HashSet<String>,
) -> Result<RowOutcome>
where
    R: ObligationRepository + ?Sized,
{
    match repo.find_project(&row.project_name).await? {
        Some(project) => {
            if let Some(name) = &row.mechanism_name {
                if repo.find_mechanism(project.id, name).await?.is_none() {
                    debug!("Would create mechanism '{}' in project '{}'", name, project.name);
                }
            }
        }
        None => debug!("Would create project '{}'", row.project_name),
    }

    let id = &row.obligation.obligation_number;
    let exists = planned.contains(id) || repo.find_by_id(id).await?.is_some();
    planned.insert(id.clone());

    Ok(match (exists, update) {
        (false, _) => RowOutcome::WouldCreate,
        (true, true) => RowOutcome::WouldUpdate,
        (true, false) => RowOutcome::WouldSkip,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(cols: &[&str]) -> csv::StringRecord {
        csv::StringRecord::from(cols.to_vec())
    }

    #[test]
    fn test_header_requires_project_column_without_default() {
        let options = ImportOptions::default();
        let err = check_header(&header(&["obligation__number", "status"]), &options).unwrap_err();
        assert!(err.to_string().contains("project__name"));

        assert!(check_header(&header(&["project__name", "obligation__number"]), &options).is_ok());
    }

    #[test]
    fn test_header_with_default_project_needs_only_identifier() {
        let options = ImportOptions {
            default_project: Some("Portside".into()),
            ..Default::default()
        };
        assert!(check_header(&header(&["obligation__number"]), &options).is_ok());
        assert!(check_header(&header(&["obligation"]), &options).is_err());
    }

    #[test]
    fn test_empty_header_rejected() {
        let options = ImportOptions::default();
        let err = check_header(&csv::StringRecord::new(), &options).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_summary_display_dry_run() {
        let summary = ImportSummary {
            total: 2,
            created: 2,
            dry_run: true,
            ..Default::default()
        };
        let text = summary.to_string();
        assert!(text.contains("(dry run)"));
        assert!(text.contains("Would create: 2"));
    }

    #[test]
    fn test_default_options_continue_in_transactions() {
        let options = ImportOptions::default();
        assert!(options.continue_on_error);
        assert!(options.use_transaction);
        assert!(!options.update);
        assert!(!options.dry_run);
    }
}
