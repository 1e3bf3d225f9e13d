//! Tab-separated table I/O.
//!
//! Tables follow the dataframe convention used by the published dataset: the
//! first column is the row index (the post ID) and its header may be blank.
//! Readers always expose that column as `id`.

use crate::error::{CorpusError, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tracing::{debug, instrument};

/// Read a TSV table whose first column is the ID index.
#[instrument(level = "debug", fields(path = %path.display()))]
pub fn read_tsv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(|e| CorpusError::dataset(format!("{}: {e}", path.display())))?;

    let headers = index_headers(reader.headers()?);
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: T = record
            .deserialize(Some(&headers))
            .map_err(|e| CorpusError::dataset(format!("{}: {e}", path.display())))?;
        rows.push(row);
    }
    debug!(rows = rows.len(), "Read table");
    Ok(rows)
}

/// Write rows as a TSV table, creating parent directories as needed.
#[instrument(level = "debug", skip(rows), fields(path = %path.display(), rows = rows.len()))]
pub fn write_tsv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CorpusError::io(parent, e))?;
    }
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(|e| CorpusError::dataset(format!("{}: {e}", path.display())))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|e| CorpusError::io(path, e))?;
    Ok(())
}

fn index_headers(headers: &StringRecord) -> StringRecord {
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| if i == 0 { "id" } else { h })
        .collect()
}
