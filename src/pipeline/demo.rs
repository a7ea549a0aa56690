use std::collections::HashSet;
use std::path::Path;

use crate::config;
use crate::error::{PipelineError, Result};
use crate::models::EmailRecord;
use crate::store::emails::EmailStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemoImportSummary {
    pub rows: usize,
    pub skipped_missing: usize,
    pub duplicate_bodies: usize,
    pub inserted: usize,
}

/// Load the body column of a public phishing-email CSV into the email database at `database`.
///
/// Rows with an empty or NA body are skipped and repeated bodies are kept once.
/// Imported rows carry only a body; every other column is NULL. The database is only
/// opened (and created) once the CSV has been read successfully.
pub fn import_demo_emails(csv_path: &Path, database: &Path) -> Result<DemoImportSummary> {
    if !csv_path.exists() {
        return Err(PipelineError::Configuration(format!(
            "CSV file not found at {}",
            csv_path.display()
        )));
    }
    let malformed = |e: csv::Error| {
        PipelineError::Configuration(format!("malformed CSV {}: {e}", csv_path.display()))
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(csv_path)
        .map_err(malformed)?;
    let column = reader
        .headers()
        .map_err(malformed)?
        .iter()
        .position(|h| h == config::demo::BODY_COLUMN)
        .ok_or_else(|| {
            PipelineError::Configuration(format!(
                "{} has no '{}' column",
                csv_path.display(),
                config::demo::BODY_COLUMN
            ))
        })?;

    let mut summary = DemoImportSummary::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(malformed)?;
        summary.rows += 1;

        let body = row.get(column).unwrap_or("");
        if is_missing(body) {
            summary.skipped_missing += 1;
            continue;
        }
        if !seen.insert(body.to_string()) {
            summary.duplicate_bodies += 1;
            continue;
        }
        records.push(EmailRecord::body_only(body.to_string()));
    }

    log::info!(
        "Read {} rows from {} ({} missing, {} duplicate bodies)",
        summary.rows,
        csv_path.display(),
        summary.skipped_missing,
        summary.duplicate_bodies
    );
    let mut store = EmailStore::open_or_create(database)?;
    summary.inserted = store.insert_batch_if_new(&records)?;
    Ok(summary)
}

fn is_missing(cell: &str) -> bool {
    config::demo::NA_VALUES.contains(&cell)
}
