use crate::audit::{DEFAULT_RECORD_CAP, ListenerScope, RequestAuditor};
use crate::error::{Result, ScanError};
use crate::frontier::{AdmissionPolicy, Frontier};
use crate::normalize::{NormalizedUrl, normalize_absolute};
use crate::probe::{InteractionProber, ProbeConfig};
use crate::renderer::{PageRenderer, WaitMode};
use crate::result::{CrawlOutcome, PageVisit};
use crate::settle::{SettlePhase, SettlePolicy};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Called with (pages visited so far, page being processed).
pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

/// Where a page is in its processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageState {
    Dequeued,
    Navigating,
    Settling,
    LinkExtraction,
    Probing,
    Done,
}

fn enter(url: &NormalizedUrl, state: PageState) {
    debug!("{} -> {:?}", url, state);
}

/// Drives one rendering session through the site, one page at a time,
/// auditing the requests each page makes.
pub struct Crawler {
    max_pages: usize,
    site_domain: Option<String>,
    include_pattern: Option<String>,
    navigation_timeout: Duration,
    wait_mode: WaitMode,
    settle: SettlePolicy,
    probe: Option<ProbeConfig>,
    record_cap: usize,
    progress_callback: Option<ProgressCallback>,
}

impl Crawler {
    pub fn new() -> Self {
        Self::with_timeout(30)
    }

    pub fn with_timeout(timeout_secs: u64) -> Self {
        Self {
            max_pages: 9999,
            site_domain: None,
            include_pattern: None,
            navigation_timeout: Duration::from_secs(timeout_secs),
            wait_mode: WaitMode::Load,
            settle: SettlePolicy::default(),
            probe: None,
            record_cap: DEFAULT_RECORD_CAP,
            progress_callback: None,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Domain that counts as first-party. Defaults to the seed's host.
    pub fn with_site_domain(mut self, domain: String) -> Self {
        self.site_domain = Some(domain);
        self
    }

    pub fn with_include_pattern(mut self, pattern: String) -> Self {
        self.include_pattern = Some(pattern);
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn with_wait_mode(mut self, wait_mode: WaitMode) -> Self {
        self.wait_mode = wait_mode;
        self
    }

    pub fn with_settle_policy(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    /// Enable hover and click probing on every page.
    pub fn with_probing(mut self, config: ProbeConfig) -> Self {
        self.probe = Some(config);
        self
    }

    pub fn with_record_cap(mut self, record_cap: usize) -> Self {
        self.record_cap = record_cap;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Crawl from `seed` until the frontier is empty or `max_pages` pages were visited.
    ///
    /// Pages that fail to load are recorded and skipped. Only a fatal renderer
    /// failure stops the loop early; the outcome then carries `aborted` along
    /// with everything gathered up to that point.
    pub async fn crawl<R: PageRenderer + ?Sized>(
        &self,
        renderer: &R,
        seed: &str,
    ) -> Result<CrawlOutcome> {
        info!("Starting audit of {} (max {} pages)", seed, self.max_pages);

        let seed_url =
            Url::parse(seed).map_err(|e| ScanError::InvalidUrl(format!("Invalid URL: {}", e)))?;

        let site_domain = self
            .site_domain
            .clone()
            .unwrap_or_else(|| seed_url.host_str().unwrap_or("unknown").to_string());

        let mut policy = AdmissionPolicy::new(site_domain.clone());
        if let Some(pattern) = &self.include_pattern {
            policy = policy.with_include_pattern(pattern.clone());
        }

        let mut frontier = Frontier::new(policy);
        let seed_key = normalize_absolute(seed_url.as_str());
        frontier.seed(seed_key.clone());

        let auditor = RequestAuditor::new(site_domain.clone(), self.record_cap);
        let prober = self
            .probe
            .clone()
            .map(|config| InteractionProber::new(config, self.settle.clone()));

        let mut visits = Vec::new();
        let mut aborted = None;

        while frontier.visited_count() < self.max_pages {
            let Some(url) = frontier.dequeue() else {
                break;
            };
            frontier.mark_visited(&url);
            enter(&url, PageState::Dequeued);
            info!("[{}] Processing {}", frontier.visited_count(), url);

            if let Some(ref callback) = self.progress_callback {
                callback(frontier.visited_count(), url.to_string());
            }

            match self
                .visit_page(renderer, &url, &mut frontier, &auditor, prober.as_ref())
                .await
            {
                Ok(visit) => visits.push(visit),
                Err(e) => {
                    warn!("Renderer failed while processing {}: {}", url, e);
                    visits.push(PageVisit::with_error(url, e.to_string()));
                    aborted = Some(e.to_string());
                    break;
                }
            }
        }

        let audit = auditor.snapshot();
        info!(
            "Audit complete. Visited {} pages, found {} third-party domains",
            visits.len(),
            audit.len()
        );

        Ok(CrawlOutcome {
            site_domain,
            seed: seed_key,
            visits,
            audit,
            aborted,
        })
    }

    /// Process one page. Returns `Err` only for fatal renderer failures.
    async fn visit_page<R: PageRenderer + ?Sized>(
        &self,
        renderer: &R,
        url: &NormalizedUrl,
        frontier: &mut Frontier,
        auditor: &RequestAuditor,
        prober: Option<&InteractionProber>,
    ) -> Result<PageVisit> {
        let started = Instant::now();
        let mut visit = PageVisit::new(url.clone());

        // The previous document has to be gone before this page's listener
        // attaches, or its unload beacons and timers land on this page.
        match renderer.unload().await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("Could not leave the previous page before {}: {}", url, e),
        }

        let listener = ListenerScope::attach(renderer, auditor, url.clone());

        enter(url, PageState::Navigating);
        if let Err(e) = renderer
            .navigate(url.as_str(), self.wait_mode, self.navigation_timeout)
            .await
        {
            visit.third_party_requests = listener.third_party_hits();
            listener.detach();
            if e.is_fatal() {
                return Err(e);
            }
            warn!("Could not load {}: {}", url, e);
            visit.error = Some(e.to_string());
            visit.elapsed = started.elapsed();
            enter(url, PageState::Done);
            return Ok(visit);
        }

        enter(url, PageState::Settling);
        self.settle.settle(SettlePhase::Navigation).await;

        enter(url, PageState::LinkExtraction);
        let landed = match renderer.current_url().await {
            Ok(current) => current,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!("Current URL unavailable on {}: {}", url, e);
                url.to_string()
            }
        };
        // Links resolve against where the page actually ended up.
        let base = Url::parse(&landed)
            .ok()
            .or_else(|| url.to_url())
            .ok_or_else(|| ScanError::InvalidUrl(url.to_string()));

        match (base, renderer.extract_links().await) {
            (Ok(base), Ok(links)) => {
                visit.links_found = links.len();
                visit.links_admitted = frontier.admit_links(&base, &links).len();
                debug!(
                    "Found {} links on {}, {} new",
                    visit.links_found, url, visit.links_admitted
                );
            }
            (_, Err(e)) if e.is_fatal() => return Err(e),
            (Err(e), _) | (_, Err(e)) => warn!("Link extraction failed on {}: {}", url, e),
        }
        visit.landed_on = Some(landed.clone());

        if let Some(prober) = prober {
            enter(url, PageState::Probing);
            let hover = prober.hover_pass(renderer, frontier).await?;
            visit.probe_discoveries.extend(hover.admitted);
        }

        visit.third_party_requests = listener.third_party_hits();
        listener.detach();

        // Clicking moves the renderer to other pages, so it runs unobserved.
        if let Some(prober) = prober {
            let origin = normalize_absolute(&landed);
            let clicks = prober.click_pass(renderer, &origin, frontier).await?;
            if clicks.abandoned {
                warn!("Click probing on {} stopped early", url);
            }
            visit.probe_discoveries.extend(clicks.admitted);
        }

        visit.elapsed = started.elapsed();
        enter(url, PageState::Done);
        Ok(visit)
    }
}

impl Default for Crawler {
    fn default() -> Self {
        Self::new()
    }
}
