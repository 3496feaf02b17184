use crate::audit::AuditTable;
use crate::normalize::NormalizedUrl;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happened to one dequeued page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageVisit {
    pub url: NormalizedUrl,
    /// Where the renderer actually ended up, after redirects.
    pub landed_on: Option<String>,
    pub links_found: usize,
    pub links_admitted: usize,
    /// Pages discovered by hovering or clicking rather than by static links.
    pub probe_discoveries: Vec<NormalizedUrl>,
    pub third_party_requests: usize,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl PageVisit {
    pub fn new(url: NormalizedUrl) -> Self {
        Self {
            url,
            landed_on: None,
            links_found: 0,
            links_admitted: 0,
            probe_discoveries: Vec::new(),
            third_party_requests: 0,
            elapsed: Duration::from_secs(0),
            error: None,
        }
    }

    pub fn with_error(url: NormalizedUrl, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::new(url)
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Everything a crawl produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlOutcome {
    pub site_domain: String,
    pub seed: NormalizedUrl,
    /// One entry per processed page, in processing order.
    pub visits: Vec<PageVisit>,
    pub audit: AuditTable,
    /// Set when a fatal renderer failure stopped the crawl early.
    pub aborted: Option<String>,
}

impl CrawlOutcome {
    pub fn visited_count(&self) -> usize {
        self.visits.len()
    }

    pub fn failed_pages(&self) -> impl Iterator<Item = &PageVisit> {
        self.visits.iter().filter(|v| v.failed())
    }

    pub fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }
}
