//! Article text extraction and dataset assembly.
//!
//! Stored snapshots are turned into plain article text with a full-text
//! heuristic: archive chrome and page furniture are dropped, and the article
//! container (`article`, `main`, `[itemprop=articleBody]`...) holding the most
//! paragraph text wins. Only when no such container has text does the page
//! body (or archive.today's `#CONTENT` wrapper) stand in for it. Paragraphs
//! are joined with blank lines.
//!
//! A document that is not valid UTF-8 or yields no text is dropped, not
//! retried: the snapshot in hand will not parse any better next time.
//!
//! Extraction is CPU bound. Documents are split into disjoint shards, each
//! shard runs on a blocking worker, and at most `workers` shards are in flight.

use crate::error::{CorpusError, Result};
use crate::models::{DatasetRecord, ExtractedRecord, UrlRow};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// Shards per worker; smaller shards even out slow documents.
const SHARDS_PER_WORKER: usize = 4;

/// Paragraphs shorter than this (in characters) are treated as furniture.
const MIN_PARAGRAPH_CHARS: usize = 20;

static ARTICLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("article, main, [itemprop=articleBody], .article-body, .story-body").unwrap()
});

static FALLBACK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("#CONTENT, body").unwrap());

static PARAGRAPH_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p, h2, h3, li, blockquote").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Elements whose text never belongs to the article, including the
/// web.archive.org toolbar and the archive.today header.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "form", "iframe", "svg",
    "button", "figcaption",
];
const SKIPPED_IDS: &[&str] = &["wm-ipp-base", "wm-ipp", "wm-ipp-print", "HEADER", "donato"];

/// Class or id fragments of blocks nested in a container that are not the story.
const BOILERPLATE_HINTS: &[&str] = &[
    "related", "comment", "sidebar", "share", "promo", "newsletter", "recommend",
];

/// A stored document waiting for extraction.
#[derive(Debug, Clone)]
pub struct PendingDocument {
    pub row: UrlRow,
    pub path: PathBuf,
}

/// Extract the article body of an HTML document.
///
/// # Errors
///
/// [`CorpusError::Extraction`] when neither an article container nor the
/// page body yields any paragraph text.
pub fn extract_body(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    best_candidate(&document, &ARTICLE_SELECTOR)
        .or_else(|| best_candidate(&document, &FALLBACK_SELECTOR))
        .map(|paragraphs| paragraphs.join("\n\n"))
        .ok_or_else(|| CorpusError::Extraction("no extractable text".into()))
}

/// Paragraphs of the matching container with the most text, if any has text.
fn best_candidate(document: &Html, selector: &Selector) -> Option<Vec<String>> {
    document
        .select(selector)
        .map(|candidate| {
            let paragraphs = paragraphs(candidate);
            let weight: usize = paragraphs.iter().map(|p| p.chars().count()).sum();
            (weight, paragraphs)
        })
        .filter(|(weight, _)| *weight > 0)
        .max_by_key(|(weight, _)| *weight)
        .map(|(_, paragraphs)| paragraphs)
}

fn paragraphs(container: ElementRef<'_>) -> Vec<String> {
    let mut out = Vec::new();
    for element in container.select(&PARAGRAPH_SELECTOR) {
        if is_skipped(element, container) {
            continue;
        }
        // nested matches (p inside li, li inside li) are covered by the outer element
        if element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .take_while(|a| a.id() != container.id())
            .any(|a| PARAGRAPH_SELECTOR.matches(&a))
        {
            continue;
        }
        let text = normalized_text(element);
        if text.chars().count() >= MIN_PARAGRAPH_CHARS {
            out.push(text);
        }
    }
    out
}

fn is_skipped(element: ElementRef<'_>, container: ElementRef<'_>) -> bool {
    let mut inside = true;
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .any(|e| {
            if e.id() == container.id() {
                inside = false;
            }
            let value = e.value();
            SKIPPED_TAGS.contains(&value.name())
                || value.id().is_some_and(|id| SKIPPED_IDS.contains(&id))
                || (inside && has_boilerplate_hint(e))
        })
}

fn has_boilerplate_hint(element: ElementRef<'_>) -> bool {
    let value = element.value();
    value
        .id()
        .into_iter()
        .chain(value.classes())
        .map(str::to_ascii_lowercase)
        .any(|name| BOILERPLATE_HINTS.iter().any(|hint| name.contains(hint)))
}

fn normalized_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    for node in element.descendants() {
        if let Node::Text(text) = node.value() {
            let inside_skipped = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|e| SKIPPED_TAGS.contains(&e.value().name()));
            if !inside_skipped {
                raw.push_str(text);
                raw.push(' ');
            }
        }
    }
    WHITESPACE.replace_all(raw.trim(), " ").into_owned()
}

/// Read and extract one stored document. `Ok(None)` means the document is dropped.
pub fn extract_document(doc: &PendingDocument) -> Result<Option<ExtractedRecord>> {
    let bytes = std::fs::read(&doc.path).map_err(|e| CorpusError::io(&doc.path, e))?;
    let html = match String::from_utf8(bytes) {
        Ok(html) => html,
        Err(e) => {
            debug!(id = %doc.row.id, error = %e, "Undecodable document dropped");
            return Ok(None);
        }
    };
    match extract_body(&html) {
        Ok(body) => Ok(Some(ExtractedRecord {
            id: doc.row.id.clone(),
            title: doc.row.title.clone(),
            url: doc.row.url.clone(),
            body,
        })),
        Err(e) => {
            debug!(id = %doc.row.id, error = %e, "Document dropped");
            Ok(None)
        }
    }
}

fn extract_shard(shard: Vec<PendingDocument>) -> Vec<ExtractedRecord> {
    shard
        .iter()
        .filter_map(|doc| match extract_document(doc) {
            Ok(record) => record,
            Err(e) => {
                warn!(id = %doc.row.id, error = %e, "Unreadable document dropped");
                None
            }
        })
        .collect()
}

/// Extract every document across `workers` parallel workers.
///
/// Documents are cut into disjoint shards, each run on a blocking worker with
/// at most `workers` in flight.
///
/// # Arguments
///
/// * `docs` - Stored documents with the listing row they belong to
/// * `workers` - Maximum shards extracted at once (at least one is used)
///
/// # Returns
///
/// One record per document that yielded text. Undecodable, unreadable or
/// empty documents are logged and dropped, never returned as errors. Output
/// order is unspecified; downstream steps key by ID.
#[instrument(level = "info", skip(docs), fields(documents = docs.len()))]
pub async fn extract_corpus(docs: Vec<PendingDocument>, workers: usize) -> Vec<ExtractedRecord> {
    let workers = workers.max(1);
    let total = docs.len();
    let shard_size = total.div_ceil(workers * SHARDS_PER_WORKER).max(1);

    let mut shards = Vec::new();
    let mut docs = docs.into_iter().peekable();
    while docs.peek().is_some() {
        shards.push(docs.by_ref().take(shard_size).collect::<Vec<_>>());
    }

    let fragments: Vec<Vec<ExtractedRecord>> = stream::iter(shards)
        .map(|shard| async move {
            match tokio::task::spawn_blocking(move || extract_shard(shard)).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, "Extraction worker failed; shard dropped");
                    Vec::new()
                }
            }
        })
        .buffer_unordered(workers)
        .collect()
        .await;

    let records: Vec<ExtractedRecord> = fragments.into_iter().flatten().collect();
    info!(
        extracted = records.len(),
        dropped = total - records.len(),
        workers,
        "Extraction complete"
    );
    records
}

/// Split a post title `headline | spoiler [| clicks saved]` into its halves.
pub fn split_title(title: &str) -> Option<(String, String)> {
    let mut parts = title.split('|');
    let headline = parts.next()?.trim().to_string();
    let target = parts.next()?.trim().to_string();
    Some((headline, target))
}

/// Turn extracted records into dataset rows.
///
/// Rows whose title has no `|` separator carry no label and are dropped;
/// anything after a second `|` is usually a click count and is discarded.
pub fn assemble_dataset(records: Vec<ExtractedRecord>) -> Vec<DatasetRecord> {
    let mut rows: Vec<DatasetRecord> = records
        .into_iter()
        .filter_map(|record| {
            let (title, target) = split_title(&record.title)?;
            Some(DatasetRecord {
                id: record.id,
                title,
                body: record.body,
                target,
            })
        })
        .collect();
    rows.sort_by(|a, b| a.id.cmp(&b.id));
    rows
}
