use crate::config::AuditProfile;
use anyhow::Result;
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use outbound_scanner::renderer::PageRenderer;
use outbound_scanner::result::CrawlOutcome;
use outbound_scanner::Crawler;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// Options for one audit run
pub struct AuditOptions {
    pub seed: String,
    pub profile: AuditProfile,
    /// Hover and click probing on every page.
    pub probe: bool,
    /// Whether the crawl ran inside a logged-in session.
    pub authenticated: bool,
    pub show_progress_bars: bool,
}

/// Callback for reporting audit progress
pub type AuditProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// A finished (or aborted) audit and its bookkeeping.
#[derive(Debug, Clone)]
pub struct AuditRun {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub authenticated: bool,
    pub outcome: CrawlOutcome,
}

impl AuditRun {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Extract the path component from a URL
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() || path == "/" {
                "/".to_string()
            } else {
                path
            }
        })
        .unwrap_or_else(|| url.to_string())
}

/// Configure a crawler from a profile.
pub fn crawler_from_profile(profile: &AuditProfile, probe: bool) -> Crawler {
    let mut crawler = Crawler::new()
        .with_max_pages(profile.site.max_pages)
        .with_navigation_timeout(profile.timing.navigation_timeout())
        .with_wait_mode(profile.timing.wait_mode)
        .with_settle_policy(profile.timing.settle_policy())
        .with_record_cap(profile.report.record_cap);

    if let Some(domain) = &profile.site.domain {
        crawler = crawler.with_site_domain(domain.clone());
    }
    if !profile.site.include_pattern.is_empty() {
        crawler = crawler.with_include_pattern(profile.site.include_pattern.clone());
    }
    if probe || profile.probe.enabled {
        crawler = crawler.with_probing(profile.probe.probe_config(&profile.timing));
    }
    crawler
}

/// Execute an audit with the given options.
///
/// Errors only when the crawl could not start at all. A crawl cut short by a
/// renderer failure still returns a run, with `outcome.aborted` set.
pub async fn execute_audit<R: PageRenderer + ?Sized>(
    renderer: &R,
    options: AuditOptions,
    progress_callback: Option<AuditProgressCallback>,
) -> Result<AuditRun> {
    let AuditOptions {
        seed,
        profile,
        probe,
        authenticated,
        show_progress_bars,
    } = options;

    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Starting audit...");
        Some(Arc::new(pb))
    } else {
        None
    };

    let processed_count = Arc::new(AtomicUsize::new(0));
    let pb_clone = progress_bar.clone();
    let count_clone = processed_count.clone();
    let forward = progress_callback.clone();
    let crawler = crawler_from_profile(&profile, probe).with_progress_callback(Arc::new(
        move |visited: usize, url: String| {
            count_clone.store(visited, Ordering::Relaxed);
            if let Some(ref pb) = pb_clone {
                pb.set_message(format!(
                    "Auditing... {} pages visited ({})",
                    visited,
                    extract_url_path(&url)
                ));
            }
            if let Some(ref callback) = forward {
                callback(url);
            }
        },
    ));

    let started_at = Utc::now();
    let result = crawler.crawl(renderer, &seed).await;
    let finished_at = Utc::now();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(ref pb) = progress_bar {
                pb.finish_and_clear();
            }
            return Err(anyhow::anyhow!("Audit of {} failed: {}", seed, e));
        }
    };

    if let Some(ref pb) = progress_bar {
        let total = processed_count.load(Ordering::Relaxed);
        match &outcome.aborted {
            Some(reason) => pb.finish_with_message(format!(
                "Audit stopped after {} pages: {}",
                total, reason
            )),
            None => pb.finish_with_message(format!(
                "Audit complete! {} pages visited, {} third-party domains",
                total,
                outcome.audit.len()
            )),
        }
    }

    if let (Some(callback), Some(reason)) = (&progress_callback, &outcome.aborted) {
        callback(format!("[!] Audit aborted: {}", reason));
    }

    Ok(AuditRun {
        session_id: Uuid::new_v4(),
        started_at,
        finished_at,
        authenticated,
        outcome,
    })
}
