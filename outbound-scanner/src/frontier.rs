use crate::classify::authority_matches;
use crate::normalize::{NormalizedUrl, normalize};
use std::collections::{HashSet, VecDeque};
use tracing::debug;
use url::Url;

/// Which URLs may enter the frontier at all.
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    site_domain: String,
    include_pattern: Option<String>,
}

impl AdmissionPolicy {
    pub fn new(site_domain: impl Into<String>) -> Self {
        Self {
            site_domain: site_domain.into(),
            include_pattern: None,
        }
    }

    /// Only admit URLs whose path contains `pattern`. Empty means no filter.
    pub fn with_include_pattern(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        self.include_pattern = if pattern.is_empty() { None } else { Some(pattern) };
        self
    }

    pub fn site_domain(&self) -> &str {
        &self.site_domain
    }

    pub fn include_pattern(&self) -> Option<&str> {
        self.include_pattern.as_deref()
    }

    /// On-site, http(s), and matching the inclusion pattern.
    pub fn admits(&self, url: &NormalizedUrl) -> bool {
        let Ok(parsed) = Url::parse(url.as_str()) else {
            return false;
        };

        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }

        let Some(host) = parsed.host_str() else {
            return false;
        };
        let authority = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        if !authority_matches(&self.site_domain, &authority) {
            return false;
        }

        match &self.include_pattern {
            Some(pattern) => parsed.path().contains(pattern.as_str()),
            None => true,
        }
    }
}

/// FIFO of pages still to visit, plus everything ever queued.
///
/// A key enters the queue at most once per crawl, so every page is processed
/// at most once no matter how often it is rediscovered.
#[derive(Debug)]
pub struct Frontier {
    policy: AdmissionPolicy,
    pending: VecDeque<NormalizedUrl>,
    seen: HashSet<NormalizedUrl>,
    visited: Vec<NormalizedUrl>,
    visited_set: HashSet<NormalizedUrl>,
}

impl Frontier {
    pub fn new(policy: AdmissionPolicy) -> Self {
        Self {
            policy,
            pending: VecDeque::new(),
            seen: HashSet::new(),
            visited: Vec::new(),
            visited_set: HashSet::new(),
        }
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    pub fn admits(&self, url: &NormalizedUrl) -> bool {
        self.policy.admits(url)
    }

    /// Queue the crawl's starting point. Deduplicated, but not filtered:
    /// whatever the operator or the login flow hands over is crawled.
    pub fn seed(&mut self, url: NormalizedUrl) -> bool {
        if !self.seen.insert(url.clone()) {
            return false;
        }
        debug!("Seeded frontier with {}", url);
        self.pending.push_back(url);
        true
    }

    /// Append `url` unless it is already queued or visited, or not admissible.
    pub fn enqueue(&mut self, url: NormalizedUrl) -> bool {
        if self.seen.contains(&url) || !self.policy.admits(&url) {
            return false;
        }
        self.seen.insert(url.clone());
        self.pending.push_back(url);
        true
    }

    /// Normalize raw links found on a page at `base` and enqueue the admissible ones.
    /// Returns the keys that were actually added.
    pub fn admit_links<S: AsRef<str>>(&mut self, base: &Url, links: &[S]) -> Vec<NormalizedUrl> {
        links
            .iter()
            .filter_map(|link| {
                let key = normalize(base, link.as_ref());
                self.enqueue(key.clone()).then_some(key)
            })
            .collect()
    }

    /// Oldest pending URL.
    pub fn dequeue(&mut self) -> Option<NormalizedUrl> {
        self.pending.pop_front()
    }

    /// Called once per dequeued URL, before any processing.
    pub fn mark_visited(&mut self, url: &NormalizedUrl) {
        self.seen.insert(url.clone());
        if self.visited_set.insert(url.clone()) {
            self.visited.push(url.clone());
        }
    }

    pub fn is_visited(&self, url: &NormalizedUrl) -> bool {
        self.visited_set.contains(url)
    }

    /// Visited pages in visiting order.
    pub fn visited(&self) -> &[NormalizedUrl] {
        &self.visited
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
