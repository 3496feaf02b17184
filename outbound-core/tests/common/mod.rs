// Scripted renderer for login and audit tests: a handful of pages plus a
// login form whose success marker shows up on a schedule.

#![allow(dead_code)]

use async_trait::async_trait;
use outbound_scanner::error::{Result, ScanError};
use outbound_scanner::renderer::{
    ElementHandle, InterceptedRequest, ListenerId, PageRenderer, RequestCallback,
    RequestListeners, WaitMode,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// When the success marker becomes visible after the form was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// On the first check.
    Immediately,
    /// Only once it was checked this many times already.
    AfterChecks(usize),
    Never,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    pub links: Vec<String>,
    pub requests: Vec<String>,
}

#[derive(Default)]
struct FormState {
    current: String,
    filled: Vec<(String, String)>,
    submitted: bool,
    marker_checks: usize,
    navigations: Vec<String>,
}

pub struct ScriptedSite {
    listeners: RequestListeners,
    pages: HashMap<String, ScriptedPage>,
    form_fields: Vec<String>,
    submit: String,
    marker_selector: String,
    marker: Marker,
    landing_url: Option<String>,
    state: Arc<Mutex<FormState>>,
}

impl ScriptedSite {
    pub fn new() -> Self {
        Self {
            listeners: RequestListeners::new(),
            pages: HashMap::new(),
            form_fields: Vec::new(),
            submit: "button[type=submit]".to_string(),
            marker_selector: "header.account".to_string(),
            marker: Marker::Immediately,
            landing_url: None,
            state: Arc::new(Mutex::new(FormState {
                current: "about:blank".to_string(),
                ..Default::default()
            })),
        }
    }

    pub fn page(mut self, url: &str, links: &[&str], requests: &[&str]) -> Self {
        self.pages.insert(
            url.to_string(),
            ScriptedPage {
                links: links.iter().map(|s| s.to_string()).collect(),
                requests: requests.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    pub fn login_form(mut self, fields: &[&str], marker: Marker) -> Self {
        self.form_fields = fields.iter().map(|s| s.to_string()).collect();
        self.marker = marker;
        self
    }

    /// Where a successful submit takes the browser.
    pub fn landing(mut self, url: &str) -> Self {
        self.landing_url = Some(url.to_string());
        self
    }

    pub fn filled(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().filled.clone()
    }

    pub fn submitted(&self) -> bool {
        self.state.lock().unwrap().submitted
    }

    pub fn marker_checks(&self) -> usize {
        self.state.lock().unwrap().marker_checks
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }
}

enum FormElementKind {
    Field(String),
    Submit(Option<String>),
}

struct FormElement {
    kind: FormElementKind,
    state: Arc<Mutex<FormState>>,
}

#[async_trait]
impl ElementHandle for FormElement {
    async fn hover(&self) -> Result<()> {
        Ok(())
    }

    async fn click(&self, _timeout: Duration) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let FormElementKind::Submit(landing) = &self.kind {
            state.submitted = true;
            if let Some(url) = landing {
                state.current = url.clone();
            }
        }
        Ok(())
    }

    async fn is_visible(&self) -> Result<bool> {
        Ok(true)
    }

    async fn fill(&self, value: &str) -> Result<()> {
        match &self.kind {
            FormElementKind::Field(selector) => {
                self.state
                    .lock()
                    .unwrap()
                    .filled
                    .push((selector.clone(), value.to_string()));
                Ok(())
            }
            FormElementKind::Submit(_) => {
                Err(ScanError::Interaction("cannot fill a button".to_string()))
            }
        }
    }
}

#[async_trait]
impl PageRenderer for ScriptedSite {
    async fn navigate(&self, url: &str, _wait: WaitMode, _timeout: Duration) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            state.current = url.to_string();
            state.navigations.push(url.to_string());
        }
        let key = url.trim_end_matches('/');
        if let Some(page) = self.pages.get(key) {
            for request in &page.requests {
                self.listeners.dispatch(&InterceptedRequest::get(request.clone()));
            }
        }
        Ok(())
    }

    fn on_request(&self, callback: RequestCallback) -> ListenerId {
        self.listeners.register(callback)
    }

    fn off_request(&self, id: ListenerId) {
        self.listeners.remove(id);
    }

    async fn extract_links(&self) -> Result<Vec<String>> {
        let current = self.state.lock().unwrap().current.clone();
        Ok(self
            .pages
            .get(current.trim_end_matches('/'))
            .map(|p| p.links.clone())
            .unwrap_or_default())
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>> {
        let kind = if self.form_fields.iter().any(|f| f == selector) {
            FormElementKind::Field(selector.to_string())
        } else if selector == self.submit && !self.form_fields.is_empty() {
            FormElementKind::Submit(self.landing_url.clone())
        } else {
            return Ok(Vec::new());
        };
        Ok(vec![Box::new(FormElement {
            kind,
            state: self.state.clone(),
        })])
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().current.clone())
    }

    async fn go_back(&self, _timeout: Duration) -> Result<()> {
        Err(ScanError::Unsupported("history"))
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> Result<bool> {
        if selector != self.marker_selector {
            return Ok(false);
        }
        let mut state = self.state.lock().unwrap();
        let earlier_checks = state.marker_checks;
        state.marker_checks += 1;
        if !state.submitted {
            return Ok(false);
        }
        Ok(match self.marker {
            Marker::Immediately => true,
            Marker::AfterChecks(n) => earlier_checks >= n,
            Marker::Never => false,
        })
    }
}
