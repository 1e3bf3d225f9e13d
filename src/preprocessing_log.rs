//! Per-stage sample counts.
//!
//! A small CSV (`stage,Samples`) recording how many items survived each
//! pipeline stage. Stages overwrite their own row, so reruns keep it current.

use crate::error::{CorpusError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, instrument};

pub const DOWNLOAD_URLS: &str = "download_urls";
pub const FILTER_URLS: &str = "filter_urls";
pub const DOWNLOAD_DOCUMENTS: &str = "download_documents";
pub const EXTRACT_DOCUMENTS: &str = "extract_documents";

const STAGES: [&str; 4] = [DOWNLOAD_URLS, FILTER_URLS, DOWNLOAD_DOCUMENTS, EXTRACT_DOCUMENTS];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StageCount {
    pub stage: String,
    #[serde(rename = "Samples")]
    pub samples: usize,
}

/// Read the log, or the zeroed default when the file does not exist yet.
pub fn read(path: &Path) -> Result<Vec<StageCount>> {
    if !path.exists() {
        return Ok(STAGES
            .iter()
            .map(|stage| StageCount {
                stage: stage.to_string(),
                samples: 0,
            })
            .collect());
    }
    let mut reader = csv::Reader::from_path(path)?;
    reader
        .deserialize()
        .map(|row| row.map_err(CorpusError::from))
        .collect()
}

/// Set `stage` to `samples`, appending the row if the stage is new.
#[instrument(level = "debug", fields(path = %path.display()))]
pub fn record(path: &Path, stage: &str, samples: usize) -> Result<()> {
    let mut rows = read(path)?;
    match rows.iter_mut().find(|row| row.stage == stage) {
        Some(row) => row.samples = samples,
        None => rows.push(StageCount {
            stage: stage.to_string(),
            samples,
        }),
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CorpusError::io(parent, e))?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|e| CorpusError::io(path, e))?;
    debug!(stage, samples, "Recorded stage count");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_creates_zeroed_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intermediate").join("preprocessing_log.csv");

        record(&path, FILTER_URLS, 1234).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "stage,Samples\ndownload_urls,0\nfilter_urls,1234\ndownload_documents,0\nextract_documents,0\n"
        );
    }

    #[test]
    fn test_record_overwrites_stage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");

        record(&path, EXTRACT_DOCUMENTS, 10).unwrap();
        record(&path, EXTRACT_DOCUMENTS, 7).unwrap();
        record(&path, "custom", 3).unwrap();

        let rows = read(&path).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[3].samples, 7);
        assert_eq!(rows[4].stage, "custom");
    }
}
