//! Document store: the single source of truth for "already acquired".
//!
//! One file per document ID under a fixed directory. The presence of
//! `<id>.html` is the only existence signal, there is no manifest. Distinct
//! IDs map to distinct paths, so concurrent writers to different IDs never
//! conflict.

use crate::error::{CorpusError, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// File extension of stored documents.
pub const DOCUMENT_EXTENSION: &str = "html";

/// Suffix of a document still being written. Never counted as known.
const PARTIAL_SUFFIX: &str = "part";

/// Storage backend for fetched raw documents.
pub trait DocumentStore {
    fn exists(&self, id: &str) -> bool;
    /// Persist `content` for `id`, replacing any previous version.
    fn write(&self, id: &str, content: &[u8]) -> Result<()>;
    fn list_known_ids(&self) -> Result<BTreeSet<String>>;
}

/// Filesystem-backed [`DocumentStore`].
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    dir: PathBuf,
}

impl FsDocumentStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CorpusError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{DOCUMENT_EXTENSION}"))
    }

    fn partial_path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{DOCUMENT_EXTENSION}.{PARTIAL_SUFFIX}"))
    }

    #[cfg(test)]
    pub fn read(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.path_for(id);
        fs::read(&path).map_err(|e| CorpusError::io(path, e))
    }
}

impl DocumentStore for FsDocumentStore {
    fn exists(&self, id: &str) -> bool {
        self.path_for(id).is_file()
    }

    /// The bytes go to `<id>.html.part` first and are renamed into place, so
    /// an interrupted write never leaves a truncated `<id>.html` behind.
    #[instrument(level = "debug", skip(self, content), fields(bytes = content.len()))]
    fn write(&self, id: &str, content: &[u8]) -> Result<()> {
        let path = self.path_for(id);
        let partial = self.partial_path_for(id);
        let storage_error = |path: &Path, source| CorpusError::StorageWrite {
            id: id.to_string(),
            path: path.to_path_buf(),
            source,
        };

        fs::write(&partial, content).map_err(|e| storage_error(&partial, e))?;
        if let Err(e) = fs::rename(&partial, &path) {
            let _ = fs::remove_file(&partial);
            return Err(storage_error(&path, e));
        }
        debug!(path = %path.display(), "Stored document");
        Ok(())
    }

    fn list_known_ids(&self) -> Result<BTreeSet<String>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| CorpusError::io(&self.dir, e))?;
        let mut ids = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| CorpusError::io(&self.dir, e))?;
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.insert(stem.to_string());
            }
        }
        Ok(ids)
    }
}
