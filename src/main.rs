//! # SYAC Corpus
//!
//! Builds the SavedYouAClick dataset: Reddit posts pairing a clickbait
//! headline with the spoiler that answers it, joined to the text of the
//! linked article as preserved by web archives.
//!
//! ## Usage
//!
//! ```sh
//! syac_corpus filter-urls
//! syac_corpus download --source rendered
//! syac_corpus download --source http
//! syac_corpus extract
//! syac_corpus clean
//! syac_corpus split
//! ```
//!
//! ## Architecture
//!
//! Every stage reads the previous stage's files and is safe to rerun:
//! 1. **Filter**: keep frequent, usable domains and route by archive
//! 2. **Download**: resumable acquisition into one document store per archive
//! 3. **Extract**: parallel article text extraction and dataset assembly
//! 4. **Clean**: structural cleaning of the assembled dataset
//! 5. **Split**: reproducible train/validation/test partitioning

use clap::Parser;
use std::error::Error;
use std::io;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod clean;
mod cli;
mod config;
mod dataset;
mod driver;
mod error;
mod extract;
mod fetch;
mod filter;
mod models;
mod preprocessing_log;
mod splits;
mod store;
mod utils;

use cli::{Cli, Command};
use config::Config;
use driver::{AcquisitionDriver, AcquisitionReport};
use extract::PendingDocument;
use fetch::FetchStrategy;
use fetch::chromium::ChromiumLauncher;
use fetch::http::HttpFetcher;
use fetch::rendered::RenderedFetcher;
use models::{DatasetRecord, Source, UrlRow, WorkItem};
use store::{DocumentStore, FsDocumentStore};
use utils::{ErrorLog, ensure_writable_dir};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();

    let args = Cli::parse();
    debug!(config = %args.config.display(), command = ?args.command, "Parsed CLI arguments");

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Cannot start without a configuration");
            return Err(e.into());
        }
    };

    let result = match args.command {
        Command::FilterUrls => filter_urls(&config),
        Command::Download { source } => download(&config, source).await,
        Command::Extract => extract(&config).await,
        Command::Clean => clean(&config),
        Command::Split { yes } => split(&config, yes),
    };
    if let Err(e) = &result {
        error!(error = %e, "Stage failed");
    }
    result?;

    info!(
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "syac_corpus finished"
    );
    Ok(())
}

fn listing_path(config: &Config, source: Source) -> &std::path::Path {
    match source {
        Source::Rendered => &config.datapaths.rendered_urls_path,
        Source::Http => &config.datapaths.http_urls_path,
    }
}

fn open_store(config: &Config, source: Source) -> error::Result<FsDocumentStore> {
    FsDocumentStore::open(config.datapaths.raw_documents_dir.join(source.dir_name()))
}

/// Documents acquired so far across every source's store.
fn stored_document_total(config: &Config) -> error::Result<usize> {
    Source::all().into_iter().try_fold(0, |total, source| {
        Ok(total + open_store(config, source)?.list_known_ids()?.len())
    })
}

#[instrument(level = "info", skip_all)]
fn filter_urls(config: &Config) -> error::Result<()> {
    let paths = &config.datapaths;
    let rows: Vec<UrlRow> = dataset::read_tsv(&paths.raw_urls_path)?;
    let total = rows.len();

    let routed = filter::filter_urls(rows, &config.filter_urls);
    dataset::write_tsv(&paths.rendered_urls_path, &routed.rendered)?;
    dataset::write_tsv(&paths.http_urls_path, &routed.http)?;

    preprocessing_log::record(&paths.preprocessing_log_path, preprocessing_log::DOWNLOAD_URLS, total)?;
    preprocessing_log::record(&paths.preprocessing_log_path, preprocessing_log::FILTER_URLS, routed.len())?;
    println!(
        "Kept {} of {} URLs ({} rendered, {} http)",
        routed.len(),
        total,
        routed.rendered.len(),
        routed.http.len()
    );
    Ok(())
}

#[instrument(level = "info", skip(config))]
async fn download(config: &Config, source: Source) -> error::Result<()> {
    let paths = &config.datapaths;
    let acquisition = &config.acquisition;

    let rows: Vec<UrlRow> = dataset::read_tsv(listing_path(config, source))?;
    let items: Vec<WorkItem> = rows.iter().map(WorkItem::from).collect();

    ensure_writable_dir(&paths.raw_documents_dir.join(source.dir_name()))?;
    let store = open_store(config, source)?;
    info!(store = %store.dir().display(), items = items.len(), "Opened document store");
    let error_log = ErrorLog::new(&paths.error_log_path);

    let report = match source {
        Source::Rendered => {
            let launcher = ChromiumLauncher::new(
                acquisition.chromium_path.clone(),
                acquisition.request_timeout(),
            );
            let strategy = RenderedFetcher::new(
                launcher,
                acquisition.challenge_marker.clone(),
                acquisition.rendered_delay(),
            );
            run_driver(strategy, &store, &error_log, config, &items).await?
        }
        Source::Http => {
            let strategy = HttpFetcher::new(acquisition.request_timeout(), acquisition.http_delay())?;
            run_driver(strategy, &store, &error_log, config, &items).await?
        }
    };

    let stored_total = store.list_known_ids()?.len();
    preprocessing_log::record(
        &paths.preprocessing_log_path,
        preprocessing_log::DOWNLOAD_DOCUMENTS,
        stored_document_total(config)?,
    )?;

    println!(
        "{source}: {} after {} round(s); stored {} this run, {} in store, {} pending, {} permanent failures",
        report.termination,
        report.rounds,
        report.stored,
        stored_total,
        report.pending.len(),
        report.permanent_failures.len()
    );
    if !report.pending.is_empty() {
        warn!(pending = report.pending.len(), "Rerun the download stage to retry pending items");
    }
    Ok(())
}

async fn run_driver<S: FetchStrategy>(
    strategy: S,
    store: &FsDocumentStore,
    error_log: &ErrorLog,
    config: &Config,
    items: &[WorkItem],
) -> error::Result<AcquisitionReport> {
    let mut driver = AcquisitionDriver::new(
        strategy,
        store,
        config.acquisition.max_rounds,
        config.acquisition.rate_limit_threshold,
    )
    .with_error_log(error_log);
    driver.run(items).await
}

#[instrument(level = "info", skip_all)]
async fn extract(config: &Config) -> error::Result<()> {
    let paths = &config.datapaths;

    let mut docs = Vec::new();
    for source in Source::all() {
        let listing = listing_path(config, source);
        if !listing.exists() {
            warn!(%source, path = %listing.display(), "Listing missing; source skipped");
            continue;
        }
        let rows: Vec<UrlRow> = dataset::read_tsv(listing)?;
        let store = open_store(config, source)?;
        let known = store.list_known_ids()?;
        let before = docs.len();
        docs.extend(
            rows.into_iter()
                .filter(|row| known.contains(&row.id))
                .map(|row| PendingDocument {
                    path: store.path_for(&row.id),
                    row,
                }),
        );
        info!(%source, documents = docs.len() - before, "Collected stored documents");
    }

    let records = extract::extract_corpus(docs, config.extract_documents.worker_count()).await;
    let extracted = records.len();
    let rows = extract::assemble_dataset(records);
    dataset::write_tsv(&paths.dirty_dataset_path, &rows)?;

    preprocessing_log::record(
        &paths.preprocessing_log_path,
        preprocessing_log::EXTRACT_DOCUMENTS,
        rows.len(),
    )?;
    println!("Extracted {extracted} documents; {} labelled rows written", rows.len());
    Ok(())
}

#[instrument(level = "info", skip_all)]
fn clean(config: &Config) -> error::Result<()> {
    let paths = &config.datapaths;
    let rows: Vec<DatasetRecord> = dataset::read_tsv(&paths.dirty_dataset_path)?;
    let before = rows.len();

    let rejected = clean::read_rejected_ids(&config.clean_dataset.profanity_annotations_path)?;
    let rows = clean::clean_dataset(rows, &config.clean_dataset, &rejected);
    dataset::write_tsv(&paths.dataset_path, &rows)?;

    println!("Removed {} rows, retained {}", before - rows.len(), rows.len());
    Ok(())
}

#[instrument(level = "info", skip(config))]
fn split(config: &Config, yes: bool) -> error::Result<()> {
    let settings = &config.split_dataset;
    let rows: Vec<DatasetRecord> = dataset::read_tsv(&config.datapaths.dataset_path)?;

    let assignment = splits::resolve_assignment(
        &settings.train_val_test_id_path,
        &settings.train_val_test_id_local_path,
        rows.iter().map(|row| row.id.clone()),
        settings.seed,
        || {
            if yes {
                return Ok(true);
            }
            let prompt = format!(
                "{} not found. Generate a new split assignment? It may differ from the published one.",
                settings.train_val_test_id_path.display()
            );
            utils::confirm(&prompt, &mut io::stdin().lock(), &mut io::stdout())
        },
    )?;

    let splits = splits::split(rows, &assignment)?;
    dataset::write_tsv(&settings.train_path, &splits.train)?;
    dataset::write_tsv(&settings.val_path, &splits.validation)?;
    dataset::write_tsv(&settings.test_path, &splits.test)?;

    println!(
        "Wrote {} train, {} validation, {} test rows",
        splits.train.len(),
        splits.validation.len(),
        splits.test.len()
    );
    Ok(())
}
