//! Site profiles.
//!
//! Everything that varies between audited sites lives in one TOML file:
//! where to start, what counts as the site, how long to wait, which elements
//! to probe and how to log in. Every field has a default, so an empty file is
//! a valid profile.

use anyhow::{Context, Result};
use outbound_scanner::probe::{ElementPredicate, ProbeConfig};
use outbound_scanner::renderer::WaitMode;
use outbound_scanner::settle::SettlePolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::report::ReportFormat;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditProfile {
    pub site: SiteSection,
    pub timing: TimingSection,
    pub probe: ProbeSection,
    pub login: Option<LoginSection>,
    pub report: ReportSection,
    pub browser: BrowserSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSection {
    /// Where the crawl starts when no URL is given on the command line.
    pub base_url: Option<String>,
    /// First-party domain. Defaults to the start URL's host.
    pub domain: Option<String>,
    pub max_pages: usize,
    /// Only paths containing this are crawled. Empty means everything on-site.
    pub include_pattern: String,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            base_url: None,
            domain: None,
            max_pages: 9999,
            include_pattern: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    pub navigation_timeout_secs: u64,
    pub wait_mode: WaitMode,
    pub settle_after_navigation_ms: u64,
    pub settle_after_hover_ms: u64,
    pub settle_after_click_ms: u64,
    pub settle_after_restore_ms: u64,
    pub interaction_timeout_ms: u64,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            navigation_timeout_secs: 30,
            wait_mode: WaitMode::Load,
            settle_after_navigation_ms: 2000,
            settle_after_hover_ms: 1000,
            settle_after_click_ms: 3000,
            settle_after_restore_ms: 2000,
            interaction_timeout_ms: 3000,
        }
    }
}

impl TimingSection {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn interaction_timeout(&self) -> Duration {
        Duration::from_millis(self.interaction_timeout_ms)
    }

    pub fn settle_policy(&self) -> SettlePolicy {
        SettlePolicy {
            after_navigation: Duration::from_millis(self.settle_after_navigation_ms),
            after_hover: Duration::from_millis(self.settle_after_hover_ms),
            after_click: Duration::from_millis(self.settle_after_click_ms),
            after_restore: Duration::from_millis(self.settle_after_restore_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSection {
    /// Probe every page. `auth-crawl` turns this on regardless.
    pub enabled: bool,
    pub max_hover_triggers: usize,
    pub max_click_targets: usize,
    pub hover_triggers: Vec<ElementPredicate>,
    pub click_targets: Vec<ElementPredicate>,
}

impl Default for ProbeSection {
    fn default() -> Self {
        let defaults = ProbeConfig::default();
        Self {
            enabled: false,
            max_hover_triggers: defaults.max_hover_triggers,
            max_click_targets: defaults.max_click_targets,
            hover_triggers: defaults.hover_triggers,
            click_targets: defaults.click_targets,
        }
    }
}

impl ProbeSection {
    pub fn probe_config(&self, timing: &TimingSection) -> ProbeConfig {
        ProbeConfig {
            hover_triggers: self.hover_triggers.clone(),
            click_targets: self.click_targets.clone(),
            max_hover_triggers: self.max_hover_triggers,
            max_click_targets: self.max_click_targets,
            interaction_timeout: timing.interaction_timeout(),
            restore_timeout: timing.navigation_timeout(),
            wait_mode: timing.wait_mode,
        }
    }
}

/// One form field to fill before submitting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginField {
    pub selector: String,
    /// Literal value.
    pub value: Option<String>,
    /// Name of an environment variable holding the value.
    pub value_env: Option<String>,
}

impl LoginField {
    pub fn resolve(&self) -> Result<String> {
        match (&self.value, &self.value_env) {
            (Some(value), None) => Ok(value.clone()),
            (None, Some(var)) => std::env::var(var).with_context(|| {
                format!("environment variable {} for login field {} is not set", var, self.selector)
            }),
            _ => anyhow::bail!(
                "login field {} needs exactly one of value or value_env",
                self.selector
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginSection {
    pub url: String,
    pub fields: Vec<LoginField>,
    pub submit: String,
    /// Present only once the session is authenticated.
    pub success_marker: String,
    pub marker_timeout_secs: u64,
    /// Time left for solving a captcha or a second factor by hand.
    pub grace_period_secs: u64,
}

impl Default for LoginSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            fields: Vec::new(),
            submit: String::new(),
            success_marker: String::new(),
            marker_timeout_secs: 60,
            grace_period_secs: 20,
        }
    }
}

impl LoginSection {
    pub fn marker_timeout(&self) -> Duration {
        Duration::from_secs(self.marker_timeout_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    pub title: String,
    pub format: String,
    /// Provenance records shown per domain.
    pub sample_size: usize,
    /// Provenance records kept per domain.
    pub record_cap: usize,
    pub output: Option<String>,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            title: "Third-party request audit".to_string(),
            format: "markdown".to_string(),
            sample_size: 3,
            record_cap: 25,
            output: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    /// `chromium` or `static`.
    pub engine: String,
    pub headless: bool,
    pub user_agent: Option<String>,
    pub executable: Option<String>,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            engine: "chromium".to_string(),
            headless: true,
            user_agent: None,
            executable: None,
        }
    }
}

pub const DEFAULT_PROFILE: &str = r#"# Outbound site profile

[site]
# base_url = "https://www.example.com/eng"
# domain = "www.example.com"
max_pages = 9999
# Only paths containing this are crawled; leave empty for the whole site.
include_pattern = ""

[timing]
navigation_timeout_secs = 30
# load | domcontentloaded | networkidle
wait_mode = "load"
settle_after_navigation_ms = 2000
settle_after_hover_ms = 1000
settle_after_click_ms = 3000
settle_after_restore_ms = 2000
interaction_timeout_ms = 3000

[probe]
enabled = false
max_hover_triggers = 50
max_click_targets = 10

[[probe.hover_triggers]]
name = "placeholder-anchor"
selector = 'header a[href="javascript:void(0);"]'

[[probe.click_targets]]
name = "card"
selector = 'div[class*="card"]'

[[probe.click_targets]]
name = "item"
selector = 'div[class*="item"]'

# Selectors cannot match on text, so "Detail" buttons are found by class.
[[probe.click_targets]]
name = "detail-class-button"
selector = 'button[class*="detail" i]'

# [login]
# url = "https://www.example.com/eng/login"
# submit = "button[type=submit]"
# success_marker = 'header[class*="header"]'
# marker_timeout_secs = 60
# grace_period_secs = 20
#
# [[login.fields]]
# selector = 'input[placeholder*="email"]'
# value_env = "OUTBOUND_LOGIN_EMAIL"
#
# [[login.fields]]
# selector = 'input[type="password"]'
# value_env = "OUTBOUND_LOGIN_PASSWORD"

[report]
title = "Third-party request audit"
# markdown | json | text
format = "markdown"
sample_size = 3
record_cap = 25

[browser]
# chromium | static
engine = "chromium"
headless = true
"#;

impl AuditProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read profile '{}': {}", path.display(), e))?;
        let profile: AuditProfile = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse profile '{}': {}", path.display(), e))?;
        profile.validate()?;
        Ok(profile)
    }

    /// Commented profile written by `outbound init`.
    pub fn default_toml() -> &'static str {
        DEFAULT_PROFILE
    }

    /// Check every field, reporting all problems at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if let Some(base_url) = &self.site.base_url {
            match Url::parse(base_url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                _ => errors.push(format!("site.base_url is not an http(s) URL: {}", base_url)),
            }
        }
        if self.site.domain.as_deref().is_some_and(|d| d.trim().is_empty()) {
            errors.push("site.domain must not be empty when set".to_string());
        }
        if self.site.max_pages == 0 {
            errors.push("site.max_pages must be positive".to_string());
        }

        if self.timing.navigation_timeout_secs == 0 {
            errors.push("timing.navigation_timeout_secs must be positive".to_string());
        }
        if self.timing.interaction_timeout_ms == 0 {
            errors.push("timing.interaction_timeout_ms must be positive".to_string());
        }

        for predicate in self.probe.hover_triggers.iter().chain(&self.probe.click_targets) {
            if predicate.selector.trim().is_empty() {
                errors.push(format!("probe predicate '{}' has an empty selector", predicate.name));
            }
        }

        if let Some(login) = &self.login {
            if Url::parse(&login.url).is_err() {
                errors.push(format!("login.url is not a valid URL: '{}'", login.url));
            }
            if login.fields.is_empty() {
                errors.push("login.fields must list at least one field".to_string());
            }
            for field in &login.fields {
                if field.selector.trim().is_empty() {
                    errors.push("login field selector must not be empty".to_string());
                }
                if field.value.is_some() == field.value_env.is_some() {
                    errors.push(format!(
                        "login field {} needs exactly one of value or value_env",
                        field.selector
                    ));
                }
            }
            if login.submit.trim().is_empty() {
                errors.push("login.submit must not be empty".to_string());
            }
            if login.success_marker.trim().is_empty() {
                errors.push("login.success_marker must not be empty".to_string());
            }
        }

        if ReportFormat::from_str(&self.report.format).is_none() {
            errors.push(format!(
                "report.format must be markdown, json or text (got '{}')",
                self.report.format
            ));
        }
        if self.report.sample_size == 0 {
            errors.push("report.sample_size must be positive".to_string());
        }
        if self.report.record_cap < self.report.sample_size {
            errors.push("report.record_cap must be at least report.sample_size".to_string());
        }

        if !matches!(self.browser.engine.as_str(), "chromium" | "static") {
            errors.push(format!(
                "browser.engine must be chromium or static (got '{}')",
                self.browser.engine
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Invalid profile:\n  - {}",
                errors.join("\n  - ")
            )
        }
    }
}
