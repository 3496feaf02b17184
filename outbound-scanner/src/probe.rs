//! Interaction probing.
//!
//! Client-rendered sites hide part of their navigation behind event handlers:
//! menus that only appear on hover, cards that navigate on click without ever
//! exposing an `href`. The prober simulates both interactions on a rendered
//! page and feeds whatever they reveal into the frontier. It is a bounded
//! heuristic; interactions it does not trigger simply go unnoticed.

use crate::error::{Result, ScanError};
use crate::frontier::Frontier;
use crate::normalize::{NormalizedUrl, normalize_absolute};
use crate::renderer::{PageRenderer, WaitMode};
use crate::settle::{SettlePhase, SettlePolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// A named CSS selector describing one family of interactive elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementPredicate {
    pub name: String,
    pub selector: String,
}

impl ElementPredicate {
    pub fn new(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
        }
    }
}

/// Join predicates into one selector list, so matches come back in document order.
fn selector_list(predicates: &[ElementPredicate]) -> Option<String> {
    let selectors: Vec<&str> = predicates
        .iter()
        .map(|p| p.selector.trim())
        .filter(|s| !s.is_empty())
        .collect();

    if selectors.is_empty() {
        None
    } else {
        Some(selectors.join(", "))
    }
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Elements that reveal hidden menus when hovered.
    pub hover_triggers: Vec<ElementPredicate>,
    /// Elements that may navigate when clicked.
    pub click_targets: Vec<ElementPredicate>,
    pub max_hover_triggers: usize,
    pub max_click_targets: usize,
    /// Budget for a single hover or click.
    pub interaction_timeout: Duration,
    /// Budget for getting back to the probed page.
    pub restore_timeout: Duration,
    pub wait_mode: WaitMode,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            hover_triggers: vec![ElementPredicate::new(
                "placeholder-anchor",
                r#"header a[href="javascript:void(0);"]"#,
            )],
            click_targets: vec![
                ElementPredicate::new("card", r#"div[class*="card"]"#),
                ElementPredicate::new("item", r#"div[class*="item"]"#),
                // Matched by class; a selector cannot see the button's label.
                ElementPredicate::new("detail-class-button", r#"button[class*="detail" i]"#),
            ],
            max_hover_triggers: 50,
            max_click_targets: 10,
            interaction_timeout: Duration::from_secs(3),
            restore_timeout: Duration::from_secs(40),
            wait_mode: WaitMode::Load,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoverOutcome {
    pub triggered: usize,
    pub failed: usize,
    /// Links admitted by the re-scan after hovering.
    pub admitted: Vec<NormalizedUrl>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClickOutcome {
    /// Visible candidates that were clicked.
    pub attempted: usize,
    pub failed: usize,
    /// Every page a click navigated to.
    pub navigations: Vec<NormalizedUrl>,
    /// The subset of `navigations` that entered the frontier.
    pub admitted: Vec<NormalizedUrl>,
    /// Times the prober had to re-navigate to the origin page.
    pub restores: usize,
    /// The origin could not be restored and the pass stopped early.
    pub abandoned: bool,
}

/// Runs the hover pass and the click-and-detect pass on the current page.
#[derive(Debug, Clone)]
pub struct InteractionProber {
    config: ProbeConfig,
    settle: SettlePolicy,
}

impl InteractionProber {
    pub fn new(config: ProbeConfig, settle: SettlePolicy) -> Self {
        Self { config, settle }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Hover every menu trigger in turn, re-scanning the DOM after each one.
    ///
    /// Menus mounted on hover may unmount when the pointer moves on, so each
    /// trigger's links are collected while its menu is still open. A trigger
    /// that fails is skipped. Only a fatal renderer error is returned.
    pub async fn hover_pass<R: PageRenderer + ?Sized>(
        &self,
        renderer: &R,
        frontier: &mut Frontier,
    ) -> Result<HoverOutcome> {
        let mut outcome = HoverOutcome::default();
        let Some(selector) = selector_list(&self.config.hover_triggers) else {
            return Ok(outcome);
        };

        let triggers = match renderer.find_elements(&selector).await {
            Ok(triggers) => triggers,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!("Hover trigger lookup failed: {}", e);
                return Ok(outcome);
            }
        };
        debug!("Hover pass: {} trigger(s)", triggers.len());

        for trigger in triggers.iter().take(self.config.max_hover_triggers) {
            let hovered = tokio::time::timeout(self.config.interaction_timeout, trigger.hover())
                .await
                .unwrap_or_else(|_| Err(ScanError::Interaction("hover timed out".to_string())));

            match hovered {
                Ok(()) => {
                    outcome.triggered += 1;
                    self.settle.settle(SettlePhase::Hover).await;
                    match rescan_links(renderer, frontier).await {
                        Ok(admitted) => outcome.admitted.extend(admitted),
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => debug!("Link re-scan after hover failed: {}", e),
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    outcome.failed += 1;
                    debug!("Hover trigger skipped: {}", e);
                }
            }
        }

        if !outcome.admitted.is_empty() {
            info!("Hover menus revealed {} new page(s)", outcome.admitted.len());
        }
        Ok(outcome)
    }

    /// Click up to `max_click_targets` candidates, one at a time, and queue
    /// any page a click navigates to.
    ///
    /// Before each candidate the renderer is put back on `origin`, whatever
    /// happened to the previous one. Candidates are looked up again on every
    /// iteration because going back replaces the DOM.
    pub async fn click_pass<R: PageRenderer + ?Sized>(
        &self,
        renderer: &R,
        origin: &NormalizedUrl,
        frontier: &mut Frontier,
    ) -> Result<ClickOutcome> {
        let mut outcome = ClickOutcome::default();
        let Some(selector) = selector_list(&self.config.click_targets) else {
            return Ok(outcome);
        };

        let limit = match renderer.find_elements(&selector).await {
            Ok(candidates) => candidates.len().min(self.config.max_click_targets),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!("Click candidate lookup failed: {}", e);
                return Ok(outcome);
            }
        };
        debug!("Click pass on {}: {} candidate(s)", origin, limit);

        for index in 0..limit {
            if !self.restore_origin(renderer, origin, &mut outcome).await? {
                outcome.abandoned = true;
                break;
            }

            match self
                .probe_candidate(renderer, &selector, index, frontier, &mut outcome)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    outcome.failed += 1;
                    debug!("Click probe #{} on {} failed: {}", index, origin, e);
                }
            }
        }

        Ok(outcome)
    }

    /// Make sure the renderer shows `origin`. Returns false if it cannot.
    async fn restore_origin<R: PageRenderer + ?Sized>(
        &self,
        renderer: &R,
        origin: &NormalizedUrl,
        outcome: &mut ClickOutcome,
    ) -> Result<bool> {
        match renderer.current_url().await {
            Ok(current) if normalize_absolute(&current) == *origin => return Ok(true),
            Ok(current) => debug!("Probe left {} (now at {}), restoring", origin, current),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("Current URL unknown ({}), restoring {}", e, origin),
        }

        match renderer
            .navigate(origin.as_str(), self.config.wait_mode, self.config.restore_timeout)
            .await
        {
            Ok(()) => {
                self.settle.settle(SettlePhase::Restore).await;
                outcome.restores += 1;
                Ok(true)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Could not return to {} after probing: {}", origin, e);
                Ok(false)
            }
        }
    }

    async fn probe_candidate<R: PageRenderer + ?Sized>(
        &self,
        renderer: &R,
        selector: &str,
        index: usize,
        frontier: &mut Frontier,
        outcome: &mut ClickOutcome,
    ) -> Result<()> {
        let candidates = renderer.find_elements(selector).await?;
        let Some(candidate) = candidates.get(index) else {
            return Ok(());
        };
        if !candidate.is_visible().await? {
            return Ok(());
        }

        outcome.attempted += 1;
        let before = normalize_absolute(&renderer.current_url().await?);

        candidate.click(self.config.interaction_timeout).await?;
        self.settle.settle(SettlePhase::Click).await;

        let after = normalize_absolute(&renderer.current_url().await?);
        if after == before {
            return Ok(());
        }

        info!("Click on candidate #{} navigated {} -> {}", index, before, after);
        outcome.navigations.push(after.clone());
        if frontier.enqueue(after.clone()) {
            outcome.admitted.push(after);
        }

        renderer.go_back(self.config.restore_timeout).await?;
        self.settle.settle(SettlePhase::Restore).await;
        Ok(())
    }
}

/// Admit every anchor currently in the DOM, resolved against the current URL.
async fn rescan_links<R: PageRenderer + ?Sized>(
    renderer: &R,
    frontier: &mut Frontier,
) -> Result<Vec<NormalizedUrl>> {
    let base = Url::parse(&renderer.current_url().await?)
        .map_err(|e| ScanError::InvalidUrl(e.to_string()))?;
    let links = renderer.extract_links().await?;
    Ok(frontier.admit_links(&base, &links))
}
