use crate::classify::third_party_authority;
use crate::normalize::NormalizedUrl;
use crate::renderer::{InterceptedRequest, ListenerId, PageRenderer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Longest request target kept verbatim in a provenance record.
pub const MAX_TARGET_LEN: usize = 100;

/// Distinct provenance records kept per domain unless configured otherwise.
pub const DEFAULT_RECORD_CAP: usize = 25;

/// Why a domain was flagged: which page asked for what.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub page: NormalizedUrl,
    pub target: String,
}

impl ProvenanceRecord {
    pub fn new(page: NormalizedUrl, target: &str) -> Self {
        Self {
            page,
            target: truncate_target(target),
        }
    }
}

fn truncate_target(target: &str) -> String {
    match target.char_indices().nth(MAX_TARGET_LEN) {
        Some((cut, _)) => format!("{}...", &target[..cut]),
        None => target.to_string(),
    }
}

/// Everything known about one third-party domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainEntry {
    /// Distinct records in the order they were first seen, at most the table's cap.
    pub records: Vec<ProvenanceRecord>,
    /// Pages that contacted the domain at least once.
    pub pages: BTreeSet<NormalizedUrl>,
    /// Every observed request, duplicates included.
    pub total_requests: usize,
    #[serde(skip)]
    seen: HashSet<ProvenanceRecord>,
}

impl DomainEntry {
    /// The first `n` distinct records.
    pub fn sample(&self, n: usize) -> &[ProvenanceRecord] {
        &self.records[..self.records.len().min(n)]
    }
}

/// Third-party domain -> provenance, for one crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditTable {
    entries: BTreeMap<String, DomainEntry>,
    hidden_routes: BTreeSet<String>,
    record_cap: usize,
}

impl Default for AuditTable {
    fn default() -> Self {
        Self::with_record_cap(DEFAULT_RECORD_CAP)
    }
}

impl AuditTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record_cap(record_cap: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            hidden_routes: BTreeSet::new(),
            record_cap: record_cap.max(1),
        }
    }

    /// File one observation under `domain`, creating the entry if needed.
    ///
    /// Identical `(page, target)` pairs are stored once; past the record cap
    /// only the counters grow.
    pub fn record(&mut self, domain: &str, page: &NormalizedUrl, target: &str) {
        let record = ProvenanceRecord::new(page.clone(), target);
        let entry = self.entries.entry(domain.to_string()).or_default();

        entry.total_requests += 1;
        entry.pages.insert(page.clone());

        if entry.records.len() < self.record_cap && entry.seen.insert(record.clone()) {
            entry.records.push(record);
        }
    }

    pub fn record_hidden_route(&mut self, url: &str) -> bool {
        self.hidden_routes.insert(url.to_string())
    }

    /// Domains in lexicographic order.
    pub fn domains(&self) -> impl Iterator<Item = (&str, &DomainEntry)> {
        self.entries.iter().map(|(domain, entry)| (domain.as_str(), entry))
    }

    pub fn entry(&self, domain: &str) -> Option<&DomainEntry> {
        self.entries.get(domain)
    }

    pub fn hidden_routes(&self) -> &BTreeSet<String> {
        &self.hidden_routes
    }

    pub fn record_cap(&self) -> usize {
        self.record_cap
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Next.js client-side data fetches reveal routes that have no anchor.
fn is_hidden_data_route(url: &str) -> bool {
    url.contains("_next/data") && url.contains(".json")
}

/// Classifies observed requests and files the third-party ones.
#[derive(Clone)]
pub struct RequestAuditor {
    site_domain: String,
    table: Arc<Mutex<AuditTable>>,
}

impl RequestAuditor {
    pub fn new(site_domain: impl Into<String>, record_cap: usize) -> Self {
        Self {
            site_domain: site_domain.into(),
            table: Arc::new(Mutex::new(AuditTable::with_record_cap(record_cap))),
        }
    }

    pub fn site_domain(&self) -> &str {
        &self.site_domain
    }

    pub fn record(&self, domain: &str, page: &NormalizedUrl, target: &str) {
        self.lock().record(domain, page, target);
    }

    /// Handle one request seen while `page` was the active page.
    /// Returns whether it was filed as third-party.
    pub fn observe(&self, page: &NormalizedUrl, request: &InterceptedRequest) -> bool {
        if is_hidden_data_route(&request.url) && self.lock().record_hidden_route(&request.url) {
            info!("Hidden data route requested by {}: {}", page, request.url);
        }

        match third_party_authority(&self.site_domain, &request.url) {
            Some(domain) => {
                debug!("Third-party request from {} -> {} ({})", page, domain, request.url);
                self.record(&domain, page, &request.url);
                true
            }
            None => false,
        }
    }

    /// Copy of the table as it stands.
    pub fn snapshot(&self) -> AuditTable {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AuditTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A request listener attached to the renderer for exactly one page.
///
/// Every request the renderer reports while the scope is alive is attributed
/// to `page`. The listener is removed by [`ListenerScope::detach`] or, on any
/// early exit, when the scope is dropped.
pub struct ListenerScope<'r, R: PageRenderer + ?Sized> {
    renderer: &'r R,
    id: Option<ListenerId>,
    page: NormalizedUrl,
    third_party_hits: Arc<AtomicUsize>,
}

impl<'r, R: PageRenderer + ?Sized> ListenerScope<'r, R> {
    pub fn attach(renderer: &'r R, auditor: &RequestAuditor, page: NormalizedUrl) -> Self {
        let auditor = auditor.clone();
        let attributed_to = page.clone();
        let third_party_hits = Arc::new(AtomicUsize::new(0));
        let hits = third_party_hits.clone();
        let id = renderer.on_request(Arc::new(move |request: &InterceptedRequest| {
            if auditor.observe(&attributed_to, request) {
                hits.fetch_add(1, Ordering::Relaxed);
            }
        }));
        debug!("Request listener attached for {}", page);

        Self {
            renderer,
            id: Some(id),
            page,
            third_party_hits,
        }
    }

    pub fn page(&self) -> &NormalizedUrl {
        &self.page
    }

    /// Third-party requests attributed to this page so far.
    pub fn third_party_hits(&self) -> usize {
        self.third_party_hits.load(Ordering::Relaxed)
    }

    pub fn detach(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(id) = self.id.take() {
            self.renderer.off_request(id);
            debug!("Request listener detached for {}", self.page);
        }
    }
}

impl<R: PageRenderer + ?Sized> Drop for ListenerScope<'_, R> {
    fn drop(&mut self) {
        self.release();
    }
}
