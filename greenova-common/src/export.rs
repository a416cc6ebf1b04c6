//! CSV export in the import column layout

use crate::import::{CsvRow, CSV_COLUMNS};
use crate::repository::{ObligationFilter, ObligationRepository};
use crate::Result;
use std::collections::HashMap;
use std::io;
use tracing::info;

/// Write every obligation matching `filter` as CSV, returning the row count
///
/// The output can be fed back to the importer unchanged.
pub async fn export_obligations<R, W>(
    repo: &mut R,
    filter: &ObligationFilter,
    writer: W,
) -> Result<usize>
where
    R: ObligationRepository + ?Sized,
    W: io::Write,
{
    let obligations = repo.list_obligations(filter).await?;

    let project_names: HashMap<i64, String> = repo
        .list_projects()
        .await?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();
    let mechanism_names: HashMap<i64, String> = repo
        .list_mechanisms(filter.project_id)
        .await?
        .into_iter()
        .map(|m| (m.id, m.name))
        .collect();

    // Header written explicitly so an empty export still has one
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv_writer.write_record(CSV_COLUMNS)?;
    for ob in &obligations {
        let project = project_names
            .get(&ob.project_id)
            .map(String::as_str)
            .unwrap_or_default();
        let mechanism = ob
            .mechanism_id
            .and_then(|id| mechanism_names.get(&id))
            .map(String::as_str);
        csv_writer.serialize(CsvRow::from_obligation(ob, project, mechanism))?;
    }
    csv_writer.flush()?;

    info!("Exported {} obligations", obligations.len());
    Ok(obligations.len())
}
