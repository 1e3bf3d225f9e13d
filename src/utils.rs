//! Small helpers shared by the stages.
//!
//! - Message truncation for console and error-log output
//! - The append-only per-item error log
//! - Output directory validation
//! - The interactive yes/no gate

use crate::error::{CorpusError, Result};
use crate::models::Source;
use chrono::{SecondsFormat, Utc};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Characters of an error message kept in logs.
pub const ERROR_MESSAGE_LIMIT: usize = 500;

/// Truncate a string for logging purposes.
///
/// Keeps the first `max` characters and appends an ellipsis with the number of
/// bytes cut.
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Append-only log of per-item failures.
///
/// One line per failure: `timestamp<TAB>source<TAB>id<TAB>message`, with the
/// message truncated and flattened to a single line.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, source: Source, id: &str, message: &str) -> Result<()> {
        let message = truncate_for_log(message, ERROR_MESSAGE_LIMIT)
            .replace(['\n', '\r', '\t'], " ");
        let line = format!(
            "{}\t{}\t{}\t{}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            source,
            id,
            message
        );
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| CorpusError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| CorpusError::io(&self.path, e))
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then creates and deletes a probe file.
///
/// # Arguments
///
/// * `path` - The directory to validate
///
/// # Returns
///
/// `Ok(())` if the directory exists and a file can be created in it.
///
/// # Errors
///
/// Returns [`CorpusError::Io`] if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", fields(path = %path.display()))]
pub fn ensure_writable_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| CorpusError::io(path, e))?;
    let probe_path = path.join("..__probe_write__");
    fs::File::create(&probe_path).map_err(|e| CorpusError::io(&probe_path, e))?;
    let _ = fs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}

/// Ask a yes/no question until the answer is one of `y`, `Y`, `n`, `N` or empty (yes).
pub fn confirm(prompt: &str, input: &mut impl BufRead, output: &mut impl Write) -> Result<bool> {
    let stdio = |e| CorpusError::io("<stdio>", e);
    loop {
        writeln!(output, "{prompt} [Y/n]").map_err(stdio)?;
        write!(output, ">").map_err(stdio)?;
        output.flush().map_err(stdio)?;

        let mut answer = String::new();
        if input.read_line(&mut answer).map_err(stdio)? == 0 {
            return Ok(false);
        }
        match answer.trim() {
            "" | "y" | "Y" => return Ok(true),
            "n" | "N" => return Ok(false),
            _ => continue,
        }
    }
}
