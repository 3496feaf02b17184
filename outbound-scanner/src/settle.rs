use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

/// Moments at which client-rendered content is given time to update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlePhase {
    /// After a page navigation completed.
    Navigation,
    /// After hovering a menu trigger.
    Hover,
    /// After clicking a probe candidate.
    Click,
    /// After returning to the page being probed.
    Restore,
}

/// How long to wait for the DOM to stabilise after each kind of action.
///
/// All waiting in the crawl goes through [`SettlePolicy::settle`], so a real
/// stability signal can replace the fixed delays in one place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlePolicy {
    pub after_navigation: Duration,
    pub after_hover: Duration,
    pub after_click: Duration,
    pub after_restore: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            after_navigation: Duration::from_secs(2),
            after_hover: Duration::from_secs(1),
            after_click: Duration::from_secs(3),
            after_restore: Duration::from_secs(2),
        }
    }
}

impl SettlePolicy {
    /// No waiting at all.
    pub fn immediate() -> Self {
        Self {
            after_navigation: Duration::ZERO,
            after_hover: Duration::ZERO,
            after_click: Duration::ZERO,
            after_restore: Duration::ZERO,
        }
    }

    pub fn delay(&self, phase: SettlePhase) -> Duration {
        match phase {
            SettlePhase::Navigation => self.after_navigation,
            SettlePhase::Hover => self.after_hover,
            SettlePhase::Click => self.after_click,
            SettlePhase::Restore => self.after_restore,
        }
    }

    pub async fn settle(&self, phase: SettlePhase) {
        let delay = self.delay(phase);
        if delay.is_zero() {
            return;
        }
        trace!("Settling {:?} for {:?}", phase, delay);
        tokio::time::sleep(delay).await;
    }
}
