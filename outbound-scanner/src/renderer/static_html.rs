//! HTTP-only renderer.
//!
//! Fetches documents with reqwest and reads them with scraper. No script runs,
//! so the request stream is approximated from the subresources the markup
//! declares and nothing is interactive. Useful for plain sites and for tests.

use super::{
    ElementHandle, InterceptedRequest, ListenerId, PageRenderer, RequestCallback,
    RequestListeners, WaitMode,
};
use crate::error::{Result, ScanError};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Subresources a browser would fetch: (selector, attribute, resource type).
const SUBRESOURCES: &[(&str, &str, &str)] = &[
    ("script[src]", "src", "Script"),
    ("link[rel~=\"stylesheet\"][href]", "href", "Stylesheet"),
    ("link[rel~=\"icon\"][href]", "href", "Image"),
    ("link[rel=\"preload\"][href]", "href", "Other"),
    ("img[src]", "src", "Image"),
    ("iframe[src]", "src", "Document"),
    ("source[src]", "src", "Media"),
    ("video[src]", "src", "Media"),
    ("audio[src]", "src", "Media"),
    ("embed[src]", "src", "Other"),
];

struct LoadedPage {
    url: String,
    html: String,
}

#[derive(Default)]
struct Session {
    current: Option<LoadedPage>,
    history: Vec<String>,
}

pub struct StaticRenderer {
    client: Client,
    listeners: RequestListeners,
    session: Mutex<Session>,
}

impl StaticRenderer {
    pub fn new() -> Result<Self> {
        Self::with_user_agent(concat!("Outbound/", env!("CARGO_PKG_VERSION")))
    }

    pub fn with_user_agent(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .cookie_store(true)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            listeners: RequestListeners::new(),
            session: Mutex::new(Session::default()),
        })
    }

    fn session(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn load(&self, url: &str, timeout: Duration, push_history: bool) -> Result<()> {
        self.listeners
            .dispatch(&InterceptedRequest::get(url).with_resource_type("Document"));

        let fetch = async {
            let response = self.client.get(url).send().await?;
            let status = response.status();
            let final_url = response.url().to_string();
            let html = response.text().await?;
            Ok::<_, reqwest::Error>((status, final_url, html))
        };

        let (status, final_url, html) = match tokio::time::timeout(timeout, fetch).await {
            Ok(Ok(fetched)) => fetched,
            Ok(Err(e)) => {
                return Err(ScanError::Navigation {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ScanError::NavigationTimeout {
                    url: url.to_string(),
                    timeout,
                });
            }
        };

        if !status.is_success() {
            debug!("{} answered {}", final_url, status);
        }

        for request in subresource_requests(&final_url, &html) {
            self.listeners.dispatch(&request);
        }

        let mut session = self.session();
        if push_history && let Some(previous) = session.current.take() {
            session.history.push(previous.url);
        }
        session.current = Some(LoadedPage {
            url: final_url,
            html,
        });
        Ok(())
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScanError::Interaction(format!("bad selector {css}: {e}")))
}

/// Requests the markup would trigger, resolved against `page_url`.
fn subresource_requests(page_url: &str, html: &str) -> Vec<InterceptedRequest> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let mut requests = Vec::new();

    for (css, attr, kind) in SUBRESOURCES {
        let Ok(sel) = Selector::parse(css) else {
            continue;
        };
        for element in document.select(&sel) {
            if let Some(value) = element.value().attr(attr)
                && let Ok(resolved) = base.join(value.trim())
            {
                requests.push(InterceptedRequest::get(resolved.to_string()).with_resource_type(*kind));
            }
        }
    }
    requests
}

/// Absolute `href` of every anchor, the way a browser reports `a.href`.
fn anchor_hrefs(page_url: &str, html: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    Html::parse_document(html)
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .map(|url| url.to_string())
        .collect()
}

#[async_trait]
impl PageRenderer for StaticRenderer {
    async fn navigate(&self, url: &str, _wait: WaitMode, timeout: Duration) -> Result<()> {
        self.load(url, timeout, true).await
    }

    fn on_request(&self, callback: RequestCallback) -> ListenerId {
        self.listeners.register(callback)
    }

    fn off_request(&self, id: ListenerId) {
        self.listeners.remove(id);
    }

    async fn extract_links(&self) -> Result<Vec<String>> {
        let session = self.session();
        Ok(session
            .current
            .as_ref()
            .map(|page| anchor_hrefs(&page.url, &page.html))
            .unwrap_or_default())
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>> {
        debug!("Static documents have no interactive elements ({})", selector);
        Ok(Vec::new())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self
            .session()
            .current
            .as_ref()
            .map(|page| page.url.clone())
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn go_back(&self, timeout: Duration) -> Result<()> {
        let previous = self
            .session()
            .history
            .pop()
            .ok_or_else(|| ScanError::Interaction("no history entry to go back to".into()))?;
        self.load(&previous, timeout, false).await
    }

    async fn wait_for_selector(&self, css: &str, _timeout: Duration) -> Result<bool> {
        let sel = selector(css)?;
        let session = self.session();
        Ok(session
            .current
            .as_ref()
            .is_some_and(|page| Html::parse_document(&page.html).select(&sel).next().is_some()))
    }
}
