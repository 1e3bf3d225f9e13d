//! Pipeline configuration.
//!
//! One YAML file, loaded once per invocation. Each pipeline stage owns a
//! section; file paths shared across stages live under `datapaths`.
//!
//! ```yaml
//! datapaths:
//!   raw_urls_path: data/intermediate/syac_urls_raw.tsv
//!   rendered_urls_path: data/intermediate/archivetoday_urls.tsv
//!   http_urls_path: data/intermediate/webarchive_urls.tsv
//!   raw_documents_dir: dataset_raw
//!   dirty_dataset_path: data/syac_dataset_raw.tsv
//!   dataset_path: data/syac_dataset.tsv
//!   preprocessing_log_path: data/intermediate/preprocessing_log.csv
//!   error_log_path: error.log
//! clean_dataset:
//!   profanity_annotations_path: data/profanity_annotations.tsv
//! split_dataset:
//!   train_val_test_id_path: data/public/train_val_test_ids.txt
//!   train_val_test_id_local_path: data/train_val_test_ids.txt
//!   train_path: data/train.tsv
//!   val_path: data/validation.tsv
//!   test_path: data/test.tsv
//! ```

use crate::error::{CorpusError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

/// Default page body marker of the archive.today bot challenge.
pub const DEFAULT_CHALLENGE_MARKER: &str = "Completing the CAPTCHA proves you are a human";

/// Top-level configuration, deserialized from YAML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub datapaths: DataPaths,
    #[serde(default)]
    pub filter_urls: FilterUrlsConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub extract_documents: ExtractConfig,
    pub clean_dataset: CleanConfig,
    pub split_dataset: SplitConfig,
}

/// `[datapaths]` section. Every key is required.
#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    /// Raw listing of posts: `id`, `title`, `url`.
    pub raw_urls_path: PathBuf,
    /// Listing routed to the rendered (archive.today) strategy.
    pub rendered_urls_path: PathBuf,
    /// Listing routed to the HTTP (web.archive.org) strategy.
    pub http_urls_path: PathBuf,
    /// Parent of the per-source document store directories.
    pub raw_documents_dir: PathBuf,
    /// Output of the extraction stage, input of cleaning.
    pub dirty_dataset_path: PathBuf,
    /// Output of cleaning, input of splitting.
    pub dataset_path: PathBuf,
    pub preprocessing_log_path: PathBuf,
    pub error_log_path: PathBuf,
}

/// `[filter_urls]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct FilterUrlsConfig {
    /// Domains with fewer posts than this are dropped.
    #[serde(default = "default_min_domain_count")]
    pub min_domain_count: usize,
    /// Video, image, meta and otherwise unusable hosts.
    #[serde(default = "default_blacklist")]
    pub blacklist: Vec<String>,
}

impl Default for FilterUrlsConfig {
    fn default() -> Self {
        Self {
            min_domain_count: default_min_domain_count(),
            blacklist: default_blacklist(),
        }
    }
}

fn default_min_domain_count() -> usize {
    100
}

fn default_blacklist() -> Vec<String> {
    [
        "streamable.com",
        "youtube.com",
        "i.redd.it",
        "reddit.com",
        "unv.is",
        "unvis.it",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// `[acquisition]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AcquisitionConfig {
    /// Retry rounds before a batch is reported as exhausted.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Consecutive HTTP 429 responses that abort a batch.
    #[serde(default = "default_rate_limit_threshold")]
    pub rate_limit_threshold: u32,
    /// Pause after every rendered fetch attempt.
    #[serde(default = "default_rendered_delay_ms")]
    pub rendered_delay_ms: u64,
    /// Pause after every HTTP fetch attempt.
    #[serde(default)]
    pub http_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Chromium binary; searched on `PATH` when unset.
    #[serde(default)]
    pub chromium_path: Option<PathBuf>,
    #[serde(default = "default_challenge_marker")]
    pub challenge_marker: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            rate_limit_threshold: default_rate_limit_threshold(),
            rendered_delay_ms: default_rendered_delay_ms(),
            http_delay_ms: 0,
            request_timeout_secs: default_request_timeout_secs(),
            chromium_path: None,
            challenge_marker: default_challenge_marker(),
        }
    }
}

impl AcquisitionConfig {
    pub fn rendered_delay(&self) -> Duration {
        Duration::from_millis(self.rendered_delay_ms)
    }

    pub fn http_delay(&self) -> Duration {
        Duration::from_millis(self.http_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_max_rounds() -> usize {
    5
}
fn default_rate_limit_threshold() -> u32 {
    12
}
fn default_rendered_delay_ms() -> u64 {
    1000
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_challenge_marker() -> String {
    DEFAULT_CHALLENGE_MARKER.into()
}

/// `[extract_documents]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractConfig {
    /// Parallel extraction workers; one per available core when unset.
    #[serde(default)]
    pub workers: Option<usize>,
}

impl ExtractConfig {
    pub fn worker_count(&self) -> usize {
        self.workers
            .filter(|&n| n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
    }
}

/// `[clean_dataset]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CleanConfig {
    #[serde(default = "default_min_len_chars")]
    pub min_len_chars: usize,
    /// Bodies at least this long are parse debris and get dropped.
    #[serde(default = "default_max_len_chars")]
    pub max_len_chars: usize,
    /// Manually annotated labels; rows whose `OK` column is not `y` are removed.
    pub profanity_annotations_path: PathBuf,
}

fn default_min_len_chars() -> usize {
    100
}
fn default_max_len_chars() -> usize {
    50_000
}

/// `[split_dataset]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SplitConfig {
    /// Published assignment; authoritative when it exists.
    pub train_val_test_id_path: PathBuf,
    /// Where a regenerated assignment is written.
    pub train_val_test_id_local_path: PathBuf,
    pub train_path: PathBuf,
    pub val_path: PathBuf,
    pub test_path: PathBuf,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    42
}

impl Config {
    /// Parse a configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| CorpusError::config(e.to_string()))
    }

    /// Load the configuration file. A missing file is a fatal configuration error.
    #[instrument(level = "info", fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CorpusError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::from_yaml(&text)?;
        info!("Loaded configuration");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
datapaths:
  raw_urls_path: raw.tsv
  rendered_urls_path: rendered.tsv
  http_urls_path: http.tsv
  raw_documents_dir: dataset_raw
  dirty_dataset_path: dirty.tsv
  dataset_path: clean.tsv
  preprocessing_log_path: log.csv
  error_log_path: error.log
clean_dataset:
  profanity_annotations_path: profanity.tsv
split_dataset:
  train_val_test_id_path: ids.txt
  train_val_test_id_local_path: ids_local.txt
  train_path: train.tsv
  val_path: val.tsv
  test_path: test.tsv
"#;

    #[test]
    fn test_defaults_fill_optional_sections() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.acquisition.max_rounds, 5);
        assert_eq!(config.acquisition.rate_limit_threshold, 12);
        assert_eq!(config.acquisition.rendered_delay(), Duration::from_secs(1));
        assert_eq!(config.acquisition.http_delay(), Duration::ZERO);
        assert_eq!(config.acquisition.challenge_marker, DEFAULT_CHALLENGE_MARKER);
        assert_eq!(config.filter_urls.min_domain_count, 100);
        assert!(config.filter_urls.blacklist.contains(&"youtube.com".to_string()));
        assert_eq!(config.clean_dataset.min_len_chars, 100);
        assert_eq!(config.clean_dataset.max_len_chars, 50_000);
        assert_eq!(config.split_dataset.seed, 42);
        assert!(config.extract_documents.worker_count() >= 1);
    }

    #[test]
    fn test_missing_required_key_is_configuration_error() {
        let broken = MINIMAL.replace("  dataset_path: clean.tsv\n", "");
        let err = Config::from_yaml(&broken).unwrap_err();
        assert!(matches!(err, CorpusError::ConfigurationMissing { .. }));
        assert!(err.to_string().contains("dataset_path"));
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = Config::load(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(matches!(err, CorpusError::ConfigurationMissing { .. }));
    }

    #[test]
    fn test_explicit_workers() {
        let config = ExtractConfig { workers: Some(3) };
        assert_eq!(config.worker_count(), 3);
    }
}
