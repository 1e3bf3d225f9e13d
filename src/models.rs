//! Data models shared by the pipeline stages.
//!
//! - [`WorkItem`]: one `(id, url)` pair to acquire
//! - [`Source`]: which archive (and therefore which fetch strategy) a document comes from
//! - [`UrlRow`]: a row of a URL listing table
//! - [`ExtractedRecord`]: article text before dataset assembly
//! - [`DatasetRecord`]: a row of the final dataset

use serde::{Deserialize, Serialize};
use std::fmt;

/// One document to acquire. Unique by `id` within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: String,
    pub url: String,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

impl From<&UrlRow> for WorkItem {
    fn from(row: &UrlRow) -> Self {
        Self::new(row.id.clone(), row.url.clone())
    }
}

/// Archive a snapshot was retrieved from.
///
/// archive.today serves its snapshots behind a bot challenge and needs a
/// browser; web.archive.org answers plain HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Source {
    /// archive.today, fetched through a browser session.
    Rendered,
    /// web.archive.org, fetched over plain HTTP.
    Http,
}

impl Source {
    /// Store subdirectory name.
    pub fn dir_name(self) -> &'static str {
        match self {
            Source::Rendered => "rendered",
            Source::Http => "http",
        }
    }

    pub fn all() -> [Source; 2] {
        [Source::Rendered, Source::Http]
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A row of a URL listing. Extra columns in the file are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UrlRow {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// Article text extracted from a stored snapshot, keyed back to its post.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRecord {
    pub id: String,
    pub title: String,
    pub url: String,
    pub body: String,
}

/// A row of the assembled dataset. `target` is the spoiler half of the post title.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DatasetRecord {
    pub id: String,
    pub title: String,
    pub body: String,
    pub target: String,
}
