//! URL listing filter and source routing.
//!
//! Keeps posts that link to a frequently used, text-bearing domain, then
//! routes them by archive: archive.today mirrors need the rendered strategy,
//! everything else is fetched over plain HTTP.

use crate::config::FilterUrlsConfig;
use crate::models::{Source, UrlRow};
use itertools::Itertools;
use tracing::{debug, info, instrument};

/// Host part of a URL without a leading `www.`.
///
/// Listings contain the odd scheme-less or malformed URL; those fall back to
/// everything before the first `/`.
pub fn domain_of(url: &str) -> String {
    let host = match url::Url::parse(url) {
        Ok(parsed) => parsed.host_str().map(str::to_string),
        Err(_) => None,
    }
    .unwrap_or_else(|| {
        let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
        rest.split('/').next().unwrap_or(rest).to_lowercase()
    });
    match host.strip_prefix("www.") {
        Some(stripped) => stripped.to_string(),
        None => host,
    }
}

/// Which strategy a URL's snapshot has to be fetched with.
pub fn route(url: &str) -> Source {
    if domain_of(url).starts_with("archive") {
        Source::Rendered
    } else {
        Source::Http
    }
}

/// Rows kept by the filter, split by source.
#[derive(Debug, Default)]
pub struct RoutedUrls {
    pub rendered: Vec<UrlRow>,
    pub http: Vec<UrlRow>,
}

impl RoutedUrls {
    pub fn len(&self) -> usize {
        self.rendered.len() + self.http.len()
    }
}

/// Drop rare and blacklisted domains, then route the survivors.
#[instrument(level = "info", skip_all, fields(rows = rows.len()))]
pub fn filter_urls(rows: Vec<UrlRow>, config: &FilterUrlsConfig) -> RoutedUrls {
    let counts = rows.iter().map(|row| domain_of(&row.url)).counts();
    let valid: Vec<String> = counts
        .into_iter()
        .filter(|(domain, count)| {
            *count >= config.min_domain_count && !config.blacklist.contains(domain)
        })
        .map(|(domain, _)| domain)
        .sorted()
        .collect();
    debug!(domains = ?valid, "Valid domains");

    let mut routed = RoutedUrls::default();
    for row in &rows {
        if valid.binary_search(&domain_of(&row.url)).is_err() {
            continue;
        }
        match route(&row.url) {
            Source::Rendered => routed.rendered.push(row.clone()),
            Source::Http => routed.http.push(row.clone()),
        }
    }

    info!(
        domains = valid.len(),
        rendered = routed.rendered.len(),
        http = routed.http.len(),
        dropped = rows.len() - routed.len(),
        "Filtered URL listing"
    );
    routed
}
