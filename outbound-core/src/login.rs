use crate::config::{LoginSection, TimingSection};
use anyhow::{Context, Result};
use outbound_scanner::renderer::PageRenderer;
use outbound_scanner::settle::SettlePhase;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long the marker is looked for once more after the grace period.
const RECHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The success marker appeared. `landing_url` is where the session ended up.
    Confirmed {
        landing_url: String,
        after_grace: bool,
    },
    /// The marker never appeared, not even after the grace period.
    Unconfirmed,
}

impl LoginOutcome {
    pub fn landing_url(&self) -> Option<&str> {
        match self {
            LoginOutcome::Confirmed { landing_url, .. } => Some(landing_url),
            LoginOutcome::Unconfirmed => None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, LoginOutcome::Confirmed { .. })
    }
}

/// Fill the login form, submit it and wait for the success marker.
///
/// Field values are never logged.
pub async fn authenticate<R: PageRenderer + ?Sized>(
    renderer: &R,
    login: &LoginSection,
    timing: &TimingSection,
) -> Result<LoginOutcome> {
    info!("Opening login page {}", login.url);
    renderer
        .navigate(&login.url, timing.wait_mode, timing.navigation_timeout())
        .await
        .with_context(|| format!("could not open login page {}", login.url))?;
    timing.settle_policy().settle(SettlePhase::Navigation).await;

    for field in &login.fields {
        let value = field.resolve()?;
        let elements = renderer
            .find_elements(&field.selector)
            .await
            .with_context(|| format!("looking up login field {}", field.selector))?;
        let input = elements
            .first()
            .with_context(|| format!("login field {} not found", field.selector))?;
        input
            .fill(&value)
            .await
            .with_context(|| format!("filling login field {}", field.selector))?;
        debug!("Filled login field {}", field.selector);
    }

    let buttons = renderer
        .find_elements(&login.submit)
        .await
        .with_context(|| format!("looking up submit button {}", login.submit))?;
    let submit = buttons
        .first()
        .with_context(|| format!("submit button {} not found", login.submit))?;
    submit
        .click(timing.interaction_timeout())
        .await
        .context("submitting the login form")?;
    info!("Login form submitted, waiting for {}", login.success_marker);

    if renderer
        .wait_for_selector(&login.success_marker, login.marker_timeout())
        .await?
    {
        return confirmed(renderer, false).await;
    }

    warn!(
        "Login not confirmed, waiting {}s for manual intervention",
        login.grace_period_secs
    );
    tokio::time::sleep(login.grace_period()).await;

    if renderer
        .wait_for_selector(&login.success_marker, RECHECK_TIMEOUT)
        .await?
    {
        return confirmed(renderer, true).await;
    }

    warn!("Login marker {} never appeared", login.success_marker);
    Ok(LoginOutcome::Unconfirmed)
}

async fn confirmed<R: PageRenderer + ?Sized>(renderer: &R, after_grace: bool) -> Result<LoginOutcome> {
    let landing_url = renderer.current_url().await?;
    info!("Login confirmed, landed on {}", landing_url);
    Ok(LoginOutcome::Confirmed {
        landing_url,
        after_grace,
    })
}
