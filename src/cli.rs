//! Command-line interface definitions for the corpus builder.
//!
//! Each pipeline stage is a subcommand and a standalone run-to-completion
//! invocation. Everything else comes from the YAML configuration file.

use crate::models::Source;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Route the raw URL listing to the two archive listings
/// syac_corpus filter-urls
///
/// # Fetch archive.today snapshots (rerun until it reports `done`)
/// syac_corpus download --source rendered
///
/// # Extract, clean and split with a non-default config
/// syac_corpus -c configs/local.yaml extract
/// syac_corpus -c configs/local.yaml clean
/// syac_corpus -c configs/local.yaml split --yes
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "SYAC_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Drop rare and blacklisted domains and route URLs by archive
    FilterUrls,

    /// Fetch every pending document of one source into the document store
    Download {
        /// Archive to fetch from
        #[arg(long, value_enum)]
        source: Source,
    },

    /// Extract article text from stored documents and assemble the dataset
    Extract,

    /// Remove empty, duplicate, out-of-range and rejected rows
    Clean,

    /// Write train/validation/test splits
    Split {
        /// Generate a new assignment without asking when none is published
        #[arg(long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["syac_corpus", "--config", "local.yaml", "download", "--source", "http"]);

        assert_eq!(cli.config, PathBuf::from("local.yaml"));
        assert_eq!(cli.command, Command::Download { source: Source::Http });
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(["syac_corpus", "-c", "/tmp/c.yaml", "split", "--yes"]);

        assert_eq!(cli.config, PathBuf::from("/tmp/c.yaml"));
        assert_eq!(cli.command, Command::Split { yes: true });
    }

    #[test]
    fn test_cli_rejects_unknown_source() {
        let err = Cli::try_parse_from(["syac_corpus", "download", "--source", "ftp"]);
        assert!(err.is_err());
    }

    #[test]
    fn test_cli_stage_names() {
        for (arg, expected) in [
            ("filter-urls", Command::FilterUrls),
            ("extract", Command::Extract),
            ("clean", Command::Clean),
            ("split", Command::Split { yes: false }),
        ] {
            let cli = Cli::parse_from(["syac_corpus", "-c", "c.yaml", arg]);
            assert_eq!(cli.command, expected);
        }
    }
}
