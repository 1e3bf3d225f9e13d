//! Structural dataset cleaning.
//!
//! Removes rows that cannot serve as training examples: empty fields,
//! duplicate bodies, bodies outside the configured length window and posts
//! whose labels were annotated as abusive.

use crate::config::CleanConfig;
use crate::dataset::read_tsv;
use crate::error::Result;
use crate::models::DatasetRecord;
use itertools::Itertools;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, instrument};

/// A row of the manual label annotation file. `OK` is `y` for acceptable labels.
#[derive(Debug, Deserialize)]
struct Annotation {
    id: String,
    #[serde(rename = "OK", default)]
    ok: String,
}

/// IDs whose label was not marked acceptable.
pub fn read_rejected_ids(path: &Path) -> Result<HashSet<String>> {
    let annotations: Vec<Annotation> = read_tsv(path)?;
    Ok(annotations
        .into_iter()
        .filter(|a| a.ok.trim() != "y")
        .map(|a| a.id)
        .collect())
}

fn has_missing_field(row: &DatasetRecord) -> bool {
    [&row.id, &row.title, &row.body, &row.target]
        .iter()
        .any(|field| field.trim().is_empty())
}

fn trimmed(row: DatasetRecord) -> DatasetRecord {
    DatasetRecord {
        id: row.id.trim().to_string(),
        title: row.title.trim().to_string(),
        body: row.body.trim().to_string(),
        target: row.target.trim().to_string(),
    }
}

/// Apply every cleaning rule in order.
#[instrument(level = "info", skip_all, fields(rows = rows.len()))]
pub fn clean_dataset(
    rows: Vec<DatasetRecord>,
    config: &CleanConfig,
    rejected: &HashSet<String>,
) -> Vec<DatasetRecord> {
    let before = rows.len();

    let rows: Vec<DatasetRecord> = rows
        .into_iter()
        .filter(|row| !has_missing_field(row))
        .map(trimmed)
        .unique_by(|row| row.body.clone())
        .filter(|row| {
            let len = row.body.chars().count();
            len >= config.min_len_chars && len < config.max_len_chars
        })
        .filter(|row| !rejected.contains(&row.id))
        .map(trimmed)
        .filter(|row| !has_missing_field(row))
        .collect();

    info!(
        removed = before - rows.len(),
        retained = rows.len(),
        "Cleaned dataset"
    );
    rows
}
