// Scripted renderer for crawl tests: a fixed set of pages, each with the
// links, requests and interactive elements it exposes.

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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Timeout,
    EngineCrash,
}

#[derive(Debug, Clone)]
pub struct Clickable {
    pub visible: bool,
    pub navigates_to: Option<String>,
    /// The click starts navigating, then reports an error anyway.
    pub errors: bool,
}

/// A header menu, mounted only while its trigger is hovered.
#[derive(Debug, Clone, Default)]
pub struct Menu {
    pub links: Vec<String>,
    pub hover_fails: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SimPage {
    pub links: Vec<String>,
    pub requests: Vec<String>,
    /// Requests the page sends while it is being left (beacons, unload handlers).
    pub leave_requests: Vec<String>,
    pub menus: Vec<Menu>,
    pub clickables: Vec<Clickable>,
    pub failure: Option<Failure>,
}

impl SimPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(mut self, href: &str) -> Self {
        self.links.push(href.to_string());
        self
    }

    pub fn request(mut self, url: &str) -> Self {
        self.requests.push(url.to_string());
        self
    }

    pub fn on_leave(mut self, url: &str) -> Self {
        self.leave_requests.push(url.to_string());
        self
    }

    pub fn menu(mut self, hrefs: &[&str]) -> Self {
        self.menus.push(Menu {
            links: hrefs.iter().map(|h| h.to_string()).collect(),
            hover_fails: false,
        });
        self
    }

    /// A menu whose trigger errors when hovered.
    pub fn broken_menu(mut self, hrefs: &[&str]) -> Self {
        self.menus.push(Menu {
            links: hrefs.iter().map(|h| h.to_string()).collect(),
            hover_fails: true,
        });
        self
    }

    pub fn clickable(mut self, navigates_to: Option<&str>) -> Self {
        self.clickables.push(Clickable {
            visible: true,
            navigates_to: navigates_to.map(str::to_string),
            errors: false,
        });
        self
    }

    pub fn hidden_clickable(mut self, navigates_to: &str) -> Self {
        self.clickables.push(Clickable {
            visible: false,
            navigates_to: Some(navigates_to.to_string()),
            errors: false,
        });
        self
    }

    /// Navigates to `navigates_to`, then the click still returns an error.
    pub fn erroring_clickable(mut self, navigates_to: &str) -> Self {
        self.clickables.push(Clickable {
            visible: true,
            navigates_to: Some(navigates_to.to_string()),
            errors: true,
        });
        self
    }

    pub fn failing(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }
}

#[derive(Default)]
struct SimState {
    current: Option<String>,
    history: Vec<String>,
    /// Index of the menu currently open.
    hovered: Option<usize>,
    /// Every `navigate` call, in order.
    navigations: Vec<String>,
    /// The page shown each time an element was clicked.
    clicked_from: Vec<String>,
    /// Times the renderer was asked to leave its document.
    unloads: usize,
}

struct Shared {
    pages: HashMap<String, SimPage>,
    listeners: RequestListeners,
    state: Mutex<SimState>,
    history_broken: bool,
}

impl Shared {
    /// Replace the current document, letting the old one send its leave requests.
    fn show(&self, url: &str) {
        self.leave();
        {
            let mut state = self.state.lock().unwrap();
            if let Some(previous) = state.current.replace(url.to_string()) {
                state.history.push(previous);
            }
            state.hovered = None;
        }
        self.emit(url);
    }

    fn leave(&self) {
        let Some(page) = self.current_page() else {
            return;
        };
        for request in &page.leave_requests {
            self.listeners.dispatch(&InterceptedRequest::get(request.as_str()));
        }
    }

    fn emit(&self, url: &str) {
        self.listeners
            .dispatch(&InterceptedRequest::get(url).with_resource_type("Document"));
        if let Some(page) = self.pages.get(url) {
            for request in &page.requests {
                self.listeners.dispatch(&InterceptedRequest::get(request.as_str()));
            }
        }
    }

    fn current_page(&self) -> Option<SimPage> {
        let state = self.state.lock().unwrap();
        state
            .current
            .as_ref()
            .and_then(|url| self.pages.get(url))
            .cloned()
    }
}

pub struct SimulatedSite {
    shared: Arc<Shared>,
}

impl SimulatedSite {
    pub fn new(pages: Vec<(&str, SimPage)>) -> Self {
        Self::build(pages, false)
    }

    /// `go_back` always fails, so the prober has to navigate back itself.
    pub fn with_broken_history(pages: Vec<(&str, SimPage)>) -> Self {
        Self::build(pages, true)
    }

    fn build(pages: Vec<(&str, SimPage)>, history_broken: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                pages: pages
                    .into_iter()
                    .map(|(url, page)| (url.to_string(), page))
                    .collect(),
                listeners: RequestListeners::new(),
                state: Mutex::new(SimState::default()),
                history_broken,
            }),
        }
    }

    pub fn navigations(&self) -> Vec<String> {
        self.shared.state.lock().unwrap().navigations.clone()
    }

    pub fn clicked_from(&self) -> Vec<String> {
        self.shared.state.lock().unwrap().clicked_from.clone()
    }

    pub fn unloads(&self) -> usize {
        self.shared.state.lock().unwrap().unloads
    }

    pub fn attached_listeners(&self) -> usize {
        self.shared.listeners.len()
    }
}

#[async_trait]
impl PageRenderer for SimulatedSite {
    async fn navigate(&self, url: &str, _wait: WaitMode, timeout: Duration) -> Result<()> {
        self.shared
            .state
            .lock()
            .unwrap()
            .navigations
            .push(url.to_string());

        let Some(page) = self.shared.pages.get(url) else {
            return Err(ScanError::Navigation {
                url: url.to_string(),
                reason: "404".to_string(),
            });
        };

        match page.failure {
            Some(Failure::Timeout) => Err(ScanError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            }),
            Some(Failure::EngineCrash) => Err(ScanError::Renderer("target crashed".to_string())),
            None => {
                self.shared.show(url);
                Ok(())
            }
        }
    }

    async fn unload(&self) -> Result<()> {
        self.shared.leave();
        let mut state = self.shared.state.lock().unwrap();
        state.unloads += 1;
        if let Some(previous) = state.current.take() {
            state.history.push(previous);
        }
        state.hovered = None;
        Ok(())
    }

    fn on_request(&self, callback: RequestCallback) -> ListenerId {
        self.shared.listeners.register(callback)
    }

    fn off_request(&self, id: ListenerId) {
        self.shared.listeners.remove(id);
    }

    async fn extract_links(&self) -> Result<Vec<String>> {
        let hovered = self.shared.state.lock().unwrap().hovered;
        Ok(self
            .shared
            .current_page()
            .map(|page| {
                let mut links = page.links.clone();
                if let Some(menu) = hovered.and_then(|i| page.menus.get(i)) {
                    links.extend(menu.links.iter().cloned());
                }
                links
            })
            .unwrap_or_default())
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>> {
        let Some(page) = self.shared.current_page() else {
            return Ok(Vec::new());
        };

        let elements: Vec<Box<dyn ElementHandle>> = if selector.contains("header") {
            page.menus
                .iter()
                .enumerate()
                .map(|(index, menu)| {
                    Box::new(SimElement {
                        shared: self.shared.clone(),
                        kind: ElementKind::MenuTrigger {
                            index,
                            fails: menu.hover_fails,
                        },
                    }) as Box<dyn ElementHandle>
                })
                .collect()
        } else {
            page.clickables
                .into_iter()
                .map(|clickable| {
                    Box::new(SimElement {
                        shared: self.shared.clone(),
                        kind: ElementKind::Clickable(clickable),
                    }) as Box<dyn ElementHandle>
                })
                .collect()
        };
        Ok(elements)
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self
            .shared
            .state
            .lock()
            .unwrap()
            .current
            .clone()
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn go_back(&self, _timeout: Duration) -> Result<()> {
        if self.shared.history_broken {
            return Err(ScanError::Interaction("history unavailable".to_string()));
        }
        let previous = {
            let mut state = self.shared.state.lock().unwrap();
            let previous = state
                .history
                .pop()
                .ok_or_else(|| ScanError::Interaction("no history".to_string()))?;
            state.current = Some(previous.clone());
            state.hovered = None;
            previous
        };
        self.shared.emit(&previous);
        Ok(())
    }

    async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> Result<bool> {
        Ok(self.shared.current_page().is_some())
    }
}

enum ElementKind {
    MenuTrigger { index: usize, fails: bool },
    Clickable(Clickable),
}

struct SimElement {
    shared: Arc<Shared>,
    kind: ElementKind,
}

#[async_trait]
impl ElementHandle for SimElement {
    async fn hover(&self) -> Result<()> {
        if let ElementKind::MenuTrigger { index, fails } = self.kind {
            if fails {
                return Err(ScanError::Interaction("element detached".to_string()));
            }
            self.shared.state.lock().unwrap().hovered = Some(index);
        }
        Ok(())
    }

    async fn click(&self, _timeout: Duration) -> Result<()> {
        let current = self.shared.state.lock().unwrap().current.clone();
        self.shared
            .state
            .lock()
            .unwrap()
            .clicked_from
            .push(current.unwrap_or_default());

        if let ElementKind::Clickable(Clickable {
            navigates_to: Some(target),
            errors,
            ..
        }) = &self.kind
        {
            self.shared.show(target);
            if *errors {
                return Err(ScanError::Interaction("click timed out".to_string()));
            }
        }
        Ok(())
    }

    async fn is_visible(&self) -> Result<bool> {
        Ok(match &self.kind {
            ElementKind::MenuTrigger { .. } => true,
            ElementKind::Clickable(clickable) => clickable.visible,
        })
    }

    async fn fill(&self, _value: &str) -> Result<()> {
        Ok(())
    }
}
