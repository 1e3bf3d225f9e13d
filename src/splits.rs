//! Reproducible train/validation/test assignment.
//!
//! The assignment file is plain text with three lines (train, validation,
//! test), each a comma-joined list of IDs. A published assignment is
//! authoritative: splitting is then a pure lookup, so every environment gets
//! byte-identical splits. Only when no assignment exists is a new one drawn
//! with a fixed seed, and only after the operator agrees.

use crate::error::{CorpusError, Result};
use crate::models::DatasetRecord;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, instrument, warn};

/// Share of the corpus held out from training, rounded up; it is then halved
/// into validation and test.
const HELD_OUT_FRACTION: f64 = 0.2;

/// Document IDs per split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitAssignment {
    pub train: Vec<String>,
    pub validation: Vec<String>,
    pub test: Vec<String>,
}

/// Dataset rows per split.
#[derive(Debug, Clone, PartialEq)]
pub struct Splits {
    pub train: Vec<DatasetRecord>,
    pub validation: Vec<DatasetRecord>,
    pub test: Vec<DatasetRecord>,
}

impl SplitAssignment {
    /// Parse the three-line assignment format.
    pub fn parse(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text.lines().collect();
        let [train, validation, test] = lines.as_slice() else {
            return Err(CorpusError::dataset(format!(
                "split assignment must have 3 lines, found {}",
                lines.len()
            )));
        };
        let ids = |line: &str| -> Vec<String> {
            line.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(String::from)
                .collect()
        };
        Ok(Self {
            train: ids(train),
            validation: ids(validation),
            test: ids(test),
        })
    }

    pub fn to_text(&self) -> String {
        format!(
            "{}\n{}\n{}\n",
            self.train.join(","),
            self.validation.join(","),
            self.test.join(",")
        )
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| CorpusError::io(path, e))?;
        Self::parse(&text)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CorpusError::io(parent, e))?;
        }
        fs::write(path, self.to_text()).map_err(|e| CorpusError::io(path, e))
    }

    /// Draw a fresh 80/10/10 assignment. Deterministic for a given ID set and seed.
    pub fn generate(ids: impl IntoIterator<Item = String>, seed: u64) -> Self {
        let mut ids: Vec<String> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();
        ids.shuffle(&mut StdRng::seed_from_u64(seed));

        let n_held_out = (ids.len() as f64 * HELD_OUT_FRACTION).ceil() as usize;
        let n_train = ids.len() - n_held_out.min(ids.len());
        let held_out = ids.split_off(n_train);
        let n_validation = held_out.len() / 2;
        let (validation, test) = held_out.split_at(n_validation);
        Self {
            train: ids,
            validation: validation.to_vec(),
            test: test.to_vec(),
        }
    }
}

/// Partition `corpus` by a committed assignment.
///
/// Every assigned ID must exist in the corpus; corpus rows the assignment does
/// not mention are left out.
#[instrument(level = "info", skip_all, fields(rows = corpus.len()))]
pub fn split(corpus: Vec<DatasetRecord>, assignment: &SplitAssignment) -> Result<Splits> {
    let total = corpus.len();
    let mut by_id: HashMap<String, DatasetRecord> =
        corpus.into_iter().map(|row| (row.id.clone(), row)).collect();

    let mut take = |ids: &[String], name: &str| -> Result<Vec<DatasetRecord>> {
        ids.iter()
            .map(|id| {
                by_id.remove(id).ok_or_else(|| {
                    CorpusError::dataset(format!("{name} id {id} is not in the dataset"))
                })
            })
            .collect()
    };
    let splits = Splits {
        train: take(&assignment.train, "train")?,
        validation: take(&assignment.validation, "validation")?,
        test: take(&assignment.test, "test")?,
    };

    if !by_id.is_empty() {
        warn!(unassigned = by_id.len(), "Dataset rows missing from the split assignment");
    }
    info!(
        total,
        train = splits.train.len(),
        validation = splits.validation.len(),
        test = splits.test.len(),
        "Split dataset"
    );
    Ok(splits)
}

/// Load the published assignment, or generate and persist a local one.
///
/// # Arguments
///
/// * `published` - Authoritative assignment; used as-is when it exists
/// * `local` - Where a regenerated assignment is written and read back from
/// * `ids` - Corpus IDs to draw a new assignment from
/// * `seed` - Shuffle seed for the new assignment
/// * `confirm` - Asked once before generating; never called when `published` exists
///
/// # Returns
///
/// The assignment to split by.
///
/// # Errors
///
/// Returns an error if:
/// - `confirm` answers `false` ([`CorpusError::Declined`])
/// - An assignment file cannot be read, parsed or written
pub fn resolve_assignment(
    published: &Path,
    local: &Path,
    ids: impl IntoIterator<Item = String>,
    seed: u64,
    confirm: impl FnOnce() -> Result<bool>,
) -> Result<SplitAssignment> {
    if published.is_file() {
        info!(path = %published.display(), "Using published split assignment");
        return SplitAssignment::read(published);
    }

    warn!(
        path = %published.display(),
        "Split assignment not found; a new one may differ from the published splits"
    );
    if !confirm()? {
        return Err(CorpusError::Declined);
    }

    info!(path = %local.display(), "Writing new split assignment");
    SplitAssignment::generate(ids, seed).write(local)?;
    SplitAssignment::read(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn record(id: &str) -> DatasetRecord {
        DatasetRecord {
            id: id.into(),
            title: format!("title {id}"),
            body: format!("body {id}"),
            target: format!("target {id}"),
        }
    }

    fn ids(rows: &[DatasetRecord]) -> Vec<&str> {
        rows.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_split_from_fixed_assignment() {
        let assignment = SplitAssignment::parse("a,b,c\nd\ne\n").unwrap();
        let corpus = ["e", "d", "c", "b", "a"].map(record).to_vec();

        let splits = split(corpus.clone(), &assignment).unwrap();
        assert_eq!(ids(&splits.train), vec!["a", "b", "c"]);
        assert_eq!(ids(&splits.validation), vec!["d"]);
        assert_eq!(ids(&splits.test), vec!["e"]);

        let mut union: Vec<&str> = [&splits.train, &splits.validation, &splits.test]
            .into_iter()
            .flat_map(|rows| ids(rows))
            .collect();
        union.sort();
        assert_eq!(union, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(splits.train[0], corpus[4]);
    }

    #[test]
    fn test_split_rejects_unknown_id() {
        let assignment = SplitAssignment::parse("a,z\n\n\n").unwrap();
        let err = split(vec![record("a")], &assignment).unwrap_err();
        assert!(err.to_string().contains("train id z"));
    }

    #[test]
    fn test_parse_requires_three_lines() {
        assert!(SplitAssignment::parse("a,b\nc\n").is_err());
    }

    #[test]
    fn test_generate_is_reproducible_and_disjoint() {
        let all: Vec<String> = (0..100).map(|i| format!("id{i:03}")).collect();
        let first = SplitAssignment::generate(all.clone(), 42);
        let mut reversed = all.clone();
        reversed.reverse();
        let second = SplitAssignment::generate(reversed, 42);

        assert_eq!(first, second);
        assert_eq!(first.train.len(), 80);
        assert_eq!(first.validation.len(), 10);
        assert_eq!(first.test.len(), 10);

        let union: HashSet<&String> = first
            .train
            .iter()
            .chain(&first.validation)
            .chain(&first.test)
            .collect();
        assert_eq!(union.len(), 100);
    }

    #[test]
    fn test_generate_rounds_held_out_share_up() {
        let sizes = |n: usize| {
            let a = SplitAssignment::generate((0..n).map(|i| i.to_string()), 42);
            (a.train.len(), a.validation.len(), a.test.len())
        };
        assert_eq!(sizes(7), (5, 1, 1));
        assert_eq!(sizes(5), (4, 0, 1));
        assert_eq!(sizes(11), (8, 1, 2));
        assert_eq!(sizes(0), (0, 0, 0));
    }

    #[test]
    fn test_resolve_prefers_published_assignment() {
        let dir = tempfile::tempdir().unwrap();
        let published = dir.path().join("ids.txt");
        let local = dir.path().join("ids_local.txt");
        fs::write(&published, "a,b,c\nd\ne\n").unwrap();

        let assignment = resolve_assignment(&published, &local, Vec::new(), 42, || {
            panic!("must not prompt when the published assignment exists")
        })
        .unwrap();
        assert_eq!(assignment.train, vec!["a", "b", "c"]);
        assert!(!local.exists());
    }

    #[test]
    fn test_resolve_generates_after_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let published = dir.path().join("missing.txt");
        let local = dir.path().join("out").join("ids_local.txt");
        let all: Vec<String> = (0..10).map(|i| i.to_string()).collect();

        let declined = resolve_assignment(&published, &local, all.clone(), 42, || Ok(false));
        assert!(matches!(declined, Err(CorpusError::Declined)));
        assert!(!local.exists());

        let assignment = resolve_assignment(&published, &local, all.clone(), 42, || Ok(true)).unwrap();
        assert_eq!(assignment, SplitAssignment::generate(all, 42));
        assert_eq!(SplitAssignment::read(&local).unwrap(), assignment);
    }
}
