//! Chromium-backed renderer using chromiumoxide.
//!
//! One browser, one tab. Outgoing requests are observed through the CDP
//! Network domain and fanned out to the registered listeners by a background
//! task.

use super::{
    ElementHandle, InterceptedRequest, ListenerId, PageRenderer, RequestCallback,
    RequestListeners, WaitMode,
};
use crate::error::{Result, ScanError};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventRequestWillBeSent, EventWebSocketCreated,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventDomContentEventFired, GetNavigationHistoryParams, NavigateParams,
    NavigateToHistoryEntryParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const LINKS_SCRIPT: &str =
    "Array.from(document.querySelectorAll('a[href]')).map(a => a.href)";

/// Resolves once the resource timeline has stopped growing for half a second.
const NETWORK_QUIET_SCRIPT: &str = r#"new Promise(resolve => {
    let last = -1, quiet = 0;
    const tick = () => {
        const n = performance.getEntriesByType('resource').length;
        if (n === last) { quiet += 1; } else { quiet = 0; last = n; }
        if (quiet >= 5) { resolve(n); } else { setTimeout(tick, 100); }
    };
    tick();
})"#;

const VISIBLE_FN: &str = r#"function() {
    const rect = this.getBoundingClientRect();
    const style = window.getComputedStyle(this);
    return rect.width > 0 && rect.height > 0
        && style.visibility !== 'hidden' && style.display !== 'none';
}"#;

const SELECTOR_POLL: Duration = Duration::from_millis(250);

/// Time given to the event tasks to hand over requests the old document made.
const UNLOAD_DRAIN: Duration = Duration::from_millis(150);
const UNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Browser launch options.
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    pub headless: bool,
    /// Browser binary. chromiumoxide's own detection is used when unset.
    pub executable: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub window_size: (u32, u32),
}

impl Default for ChromiumOptions {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            user_agent: None,
            window_size: (1366, 900),
        }
    }
}

/// Navigation failures are per page, unless the browser itself is gone.
fn navigation_error(url: &str, err: CdpError) -> ScanError {
    match err {
        CdpError::Ws(_) | CdpError::ChannelSendError(_) => {
            ScanError::Renderer(format!("browser connection lost: {err}"))
        }
        other => ScanError::Navigation {
            url: url.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Lost connection to the browser means nothing further can work.
fn cdp_error(context: &str, err: CdpError) -> ScanError {
    match err {
        CdpError::Ws(_) | CdpError::ChannelSendError(_) => {
            ScanError::Renderer(format!("{}: {}", context, err))
        }
        other => ScanError::Interaction(format!("{}: {}", context, other)),
    }
}

pub struct ChromiumRenderer {
    browser: Browser,
    page: Page,
    listeners: Arc<RequestListeners>,
    tasks: Vec<JoinHandle<()>>,
}

impl ChromiumRenderer {
    /// Launch a browser and open the tab every navigation happens in.
    ///
    /// Failure here is always fatal to the run.
    pub async fn launch(options: &ChromiumOptions) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .window_size(options.window_size.0, options.window_size.1);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &options.executable {
            builder = builder.chrome_executable(path);
        }

        let config = builder
            .build()
            .map_err(|e| ScanError::Renderer(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScanError::Renderer(format!("failed to launch Chromium: {e}")))?;

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
        }));

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScanError::Renderer(format!("failed to open page: {e}")))?;

        if let Some(user_agent) = &options.user_agent {
            page.set_user_agent(user_agent.as_str())
                .await
                .map_err(|e| ScanError::Renderer(format!("failed to set user agent: {e}")))?;
        }

        page.execute(EnableParams::default())
            .await
            .map_err(|e| ScanError::Renderer(format!("failed to enable network events: {e}")))?;

        let listeners = Arc::new(RequestListeners::new());

        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| ScanError::Renderer(format!("failed to subscribe to requests: {e}")))?;
        let sink = listeners.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                let request = InterceptedRequest {
                    url: event.request.url.clone(),
                    method: event.request.method.clone(),
                    resource_type: event.r#type.as_ref().map(|t| format!("{:?}", t)),
                };
                sink.dispatch(&request);
            }
        }));

        let mut sockets = page
            .event_listener::<EventWebSocketCreated>()
            .await
            .map_err(|e| ScanError::Renderer(format!("failed to subscribe to websockets: {e}")))?;
        let sink = listeners.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = sockets.next().await {
                let request =
                    InterceptedRequest::get(event.url.clone()).with_resource_type("WebSocket");
                sink.dispatch(&request);
            }
        }));

        info!("Chromium started (headless: {})", options.headless);

        Ok(Self {
            browser,
            page,
            listeners,
            tasks,
        })
    }

    /// Close the browser and stop the event tasks.
    pub async fn close(mut self) -> Result<()> {
        let closed = self.browser.close().await;
        let _ = self.browser.wait().await;
        for task in &self.tasks {
            task.abort();
        }
        closed
            .map(|_| ())
            .map_err(|e| ScanError::Renderer(format!("failed to close browser: {e}")))
    }

    /// Start a navigation and return once the new document fired `DOMContentLoaded`.
    async fn goto_dom_ready(&self, url: &str) -> Result<()> {
        // Subscribe first so the event cannot slip past between navigate and listen.
        let mut dom_ready = self
            .page
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(|e| navigation_error(url, e))?;

        let navigated = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .map_err(|e| navigation_error(url, e))?;
        if let Some(reason) = navigated.result.error_text.clone() {
            return Err(ScanError::Navigation {
                url: url.to_string(),
                reason,
            });
        }

        match dom_ready.next().await {
            Some(_) => Ok(()),
            None => Err(ScanError::Renderer(
                "browser closed while waiting for DOMContentLoaded".into(),
            )),
        }
    }

    async fn wait_for_network_quiet(&self) -> Result<()> {
        let params = EvaluateParams::builder()
            .expression(NETWORK_QUIET_SCRIPT)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(ScanError::Other)?;
        self.page
            .evaluate_expression(params)
            .await
            .map_err(|e| cdp_error("network idle wait failed", e))?;
        Ok(())
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn navigate(&self, url: &str, wait: WaitMode, timeout: Duration) -> Result<()> {
        let load = async {
            match wait {
                WaitMode::DomContentLoaded => self.goto_dom_ready(url).await,
                WaitMode::Load => self
                    .page
                    .goto(url)
                    .await
                    .map(|_| ())
                    .map_err(|e| navigation_error(url, e)),
                WaitMode::NetworkIdle => {
                    self.page
                        .goto(url)
                        .await
                        .map_err(|e| navigation_error(url, e))?;
                    self.wait_for_network_quiet().await
                }
            }
        };

        match tokio::time::timeout(timeout, load).await {
            Ok(result) => result,
            Err(_) => Err(ScanError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            }),
        }
    }

    async fn unload(&self) -> Result<()> {
        match tokio::time::timeout(UNLOAD_TIMEOUT, self.page.goto("about:blank")).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(cdp_error("failed to leave page", e)),
            Err(_) => return Err(ScanError::Interaction("leaving page timed out".into())),
        }
        tokio::time::sleep(UNLOAD_DRAIN).await;
        Ok(())
    }

    fn on_request(&self, callback: RequestCallback) -> ListenerId {
        self.listeners.register(callback)
    }

    fn off_request(&self, id: ListenerId) {
        self.listeners.remove(id);
    }

    async fn extract_links(&self) -> Result<Vec<String>> {
        self.page
            .evaluate(LINKS_SCRIPT)
            .await
            .map_err(|e| cdp_error("link extraction failed", e))?
            .into_value::<Vec<String>>()
            .map_err(|e| ScanError::Other(format!("unexpected link list: {e}")))
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| cdp_error("element lookup failed", e))?;

        Ok(elements
            .into_iter()
            .map(|element| Box::new(ChromiumElement { element }) as Box<dyn ElementHandle>)
            .collect())
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| cdp_error("failed to read current URL", e))?;
        Ok(url.unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn go_back(&self, timeout: Duration) -> Result<()> {
        let step_back = async {
            let history = self
                .page
                .execute(GetNavigationHistoryParams::default())
                .await
                .map_err(|e| cdp_error("failed to read history", e))?;

            let current = history.result.current_index;
            let previous = usize::try_from(current - 1)
                .ok()
                .and_then(|index| history.result.entries.get(index))
                .ok_or_else(|| ScanError::Interaction("no history entry to go back to".into()))?;

            self.page
                .execute(NavigateToHistoryEntryParams::new(previous.id))
                .await
                .map_err(|e| cdp_error("history navigation failed", e))?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|e| cdp_error("history navigation failed", e))?;
            Ok(())
        };

        tokio::time::timeout(timeout, step_back)
            .await
            .unwrap_or_else(|_| Err(ScanError::Interaction("going back timed out".into())))
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.page.find_element(selector).await {
                Ok(_) => return Ok(true),
                Err(e @ (CdpError::Ws(_) | CdpError::ChannelSendError(_))) => {
                    return Err(cdp_error("selector wait failed", e));
                }
                Err(_) => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }
}

struct ChromiumElement {
    element: Element,
}

#[async_trait]
impl ElementHandle for ChromiumElement {
    async fn hover(&self) -> Result<()> {
        self.element
            .hover()
            .await
            .map(|_| ())
            .map_err(|e| cdp_error("hover failed", e))
    }

    async fn click(&self, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.element.click()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(cdp_error("click failed", e)),
            Err(_) => Err(ScanError::Interaction("click timed out".into())),
        }
    }

    async fn is_visible(&self) -> Result<bool> {
        let returns = self
            .element
            .call_js_fn(VISIBLE_FN, false)
            .await
            .map_err(|e| cdp_error("visibility check failed", e))?;
        Ok(returns
            .result
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn fill(&self, value: &str) -> Result<()> {
        // Controlled inputs only pick up the value once they see an input event.
        let literal = serde_json::to_string(value)
            .map_err(|e| ScanError::Other(format!("cannot encode value: {e}")))?;
        let function = format!(
            "function() {{ this.focus(); this.value = {literal}; \
             this.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             this.dispatchEvent(new Event('change', {{ bubbles: true }})); }}"
        );
        self.element
            .call_js_fn(function, false)
            .await
            .map(|_| ())
            .map_err(|e| cdp_error("fill failed", e))
    }
}
