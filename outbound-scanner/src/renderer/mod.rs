//! Page rendering capability.
//!
//! The crawl engine never talks to a browser directly. It drives a
//! [`PageRenderer`]: navigate, watch outgoing requests, read links, poke at
//! elements, go back. [`chromium::ChromiumRenderer`] fulfils it with a real
//! browser, [`static_html::StaticRenderer`] with plain HTTP fetches.

pub mod chromium;
pub mod static_html;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// When a navigation counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitMode {
    /// The `load` event fired.
    #[default]
    Load,
    /// The `DOMContentLoaded` event fired.
    DomContentLoaded,
    /// Load fired and the network went quiet.
    NetworkIdle,
}

impl WaitMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "load" => Some(WaitMode::Load),
            "domcontentloaded" | "dom" => Some(WaitMode::DomContentLoaded),
            "networkidle" | "idle" => Some(WaitMode::NetworkIdle),
            _ => None,
        }
    }
}

/// One outgoing request observed while a page renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedRequest {
    pub url: String,
    pub method: String,
    /// Renderer-specific resource kind (`Script`, `Image`, `XHR`...), when known.
    pub resource_type: Option<String>,
}

impl InterceptedRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            resource_type: None,
        }
    }

    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }
}

pub type RequestCallback = Arc<dyn Fn(&InterceptedRequest) + Send + Sync>;

/// Handle returned by [`PageRenderer::on_request`], used to detach the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registry of request listeners shared by renderer implementations.
#[derive(Default)]
pub struct RequestListeners {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, RequestCallback)>>,
}

impl RequestListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, callback: RequestCallback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        id
    }

    pub fn remove(&self, id: ListenerId) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(listener_id, _)| *listener_id != id);
    }

    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand `request` to every registered listener.
    pub fn dispatch(&self, request: &InterceptedRequest) {
        // Callbacks run outside the lock so a listener may detach itself.
        let callbacks: Vec<RequestCallback> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();

        for callback in callbacks {
            callback(request);
        }
    }
}

/// An element found on the current page.
#[async_trait]
pub trait ElementHandle: Send + Sync {
    async fn hover(&self) -> Result<()>;
    async fn click(&self, timeout: Duration) -> Result<()>;
    async fn is_visible(&self) -> Result<bool>;
    /// Replace the element's value and fire an `input` event.
    async fn fill(&self, value: &str) -> Result<()>;
}

/// A single rendering session (one browser tab), driven one page at a time.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Navigate to `url` and wait according to `wait`, failing after `timeout`.
    async fn navigate(&self, url: &str, wait: WaitMode, timeout: Duration) -> Result<()>;

    /// Leave the current document so nothing it still does can reach a
    /// listener attached afterwards. Renderers without live documents have
    /// nothing to do.
    async fn unload(&self) -> Result<()> {
        Ok(())
    }

    /// Start delivering outgoing requests to `callback`.
    fn on_request(&self, callback: RequestCallback) -> ListenerId;

    /// Stop delivering requests to a listener. Unknown ids are ignored.
    fn off_request(&self, id: ListenerId);

    /// Absolute `href` of every anchor in the rendered DOM.
    async fn extract_links(&self) -> Result<Vec<String>>;

    /// Elements matching a CSS selector, in document order.
    async fn find_elements(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>>;

    async fn current_url(&self) -> Result<String>;

    /// Step back one entry in the session history.
    async fn go_back(&self, timeout: Duration) -> Result<()>;

    /// Wait until `selector` matches something; `Ok(false)` on timeout.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool>;
}
