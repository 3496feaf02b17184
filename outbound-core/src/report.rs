// Report generation from a finished audit

use crate::audit::AuditRun;
use chrono::{DateTime, Utc};
use outbound_scanner::audit::{AuditTable, ProvenanceRecord};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Markdown,
    Json,
    Text,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Some(ReportFormat::Markdown),
            "json" => Some(ReportFormat::Json),
            "text" | "txt" => Some(ReportFormat::Text),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Markdown => "md",
            ReportFormat::Json => "json",
            ReportFormat::Text => "txt",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainSummary {
    pub domain: String,
    pub total_requests: usize,
    pub page_count: usize,
    pub samples: Vec<ProvenanceRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedPage {
    pub url: String,
    pub error: String,
}

/// Everything about a run's session, absent when a report is built from a bare table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub site_domain: String,
    pub seed: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub authenticated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub title: String,
    pub pages_visited: usize,
    /// Domains in lexicographic order.
    pub domains: Vec<DomainSummary>,
    pub hidden_routes: Vec<String>,
    pub failed_pages: Vec<FailedPage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl AuditReport {
    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    pub fn is_partial(&self) -> bool {
        self.aborted.is_some()
    }

    /// Attach session details and page failures from a run.
    pub fn with_run(mut self, run: &AuditRun) -> Self {
        let outcome = &run.outcome;
        self.session = Some(SessionInfo {
            session_id: run.session_id.to_string(),
            site_domain: outcome.site_domain.clone(),
            seed: outcome.seed.to_string(),
            started_at: run.started_at,
            finished_at: run.finished_at,
            authenticated: run.authenticated,
        });
        self.failed_pages = outcome
            .failed_pages()
            .map(|visit| FailedPage {
                url: visit.url.to_string(),
                error: visit.error.clone().unwrap_or_default(),
            })
            .collect();
        self.aborted = outcome.aborted.clone();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// Project an audit table into a report: domains sorted, each with its first
/// `sample_size` distinct provenance records.
pub fn build_report(table: &AuditTable, visited_count: usize, sample_size: usize) -> AuditReport {
    let domains = table
        .domains()
        .map(|(domain, entry)| DomainSummary {
            domain: domain.to_string(),
            total_requests: entry.total_requests,
            page_count: entry.pages.len(),
            samples: entry.sample(sample_size).to_vec(),
        })
        .collect();

    AuditReport {
        title: "Third-party request audit".to_string(),
        pages_visited: visited_count,
        domains,
        hidden_routes: table.hidden_routes().iter().cloned().collect(),
        failed_pages: Vec::new(),
        session: None,
        aborted: None,
    }
}

/// Build the report for a finished run.
pub fn report_for_run(run: &AuditRun, title: &str, sample_size: usize) -> AuditReport {
    build_report(&run.outcome.audit, run.outcome.visited_count(), sample_size)
        .with_title(title)
        .with_run(run)
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

pub fn render_markdown(report: &AuditReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("# {}\n\n", report.title));

    if let Some(reason) = &report.aborted {
        out.push_str(&format!(
            "> **Incomplete:** the crawl stopped early ({}). Results cover the pages visited before that.\n\n",
            escape_cell(reason)
        ));
    }

    if let Some(session) = &report.session {
        out.push_str(&format!("- Site: `{}`\n", session.site_domain));
        out.push_str(&format!("- Start page: {}\n", session.seed));
        out.push_str(&format!("- Session: `{}`\n", session.session_id));
        out.push_str(&format!(
            "- Run: {} to {}\n",
            session.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            session.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        if session.authenticated {
            out.push_str("- Crawled inside a logged-in session\n");
        }
    }
    out.push_str(&format!("- Pages visited: {}\n", report.pages_visited));
    out.push_str(&format!("- Third-party domains: {}\n\n", report.domain_count()));

    if report.domains.is_empty() {
        out.push_str("No third-party requests were observed.\n");
    } else {
        out.push_str("| Third-party domain | Requests | Pages | Sample requests |\n");
        out.push_str("| --- | ---: | ---: | --- |\n");
        for summary in &report.domains {
            let samples: Vec<String> = summary
                .samples
                .iter()
                .map(|r| format!("{} → {}", escape_cell(r.page.as_str()), escape_cell(&r.target)))
                .collect();
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                escape_cell(&summary.domain),
                summary.total_requests,
                summary.page_count,
                samples.join("<br>")
            ));
        }
    }

    if !report.hidden_routes.is_empty() {
        out.push_str("\n## Hidden data routes\n\n");
        for route in &report.hidden_routes {
            out.push_str(&format!("- {}\n", route));
        }
    }

    if !report.failed_pages.is_empty() {
        out.push_str("\n## Pages that could not be loaded\n\n");
        for page in &report.failed_pages {
            out.push_str(&format!("- {}: {}\n", page.url, page.error));
        }
    }

    out
}

pub fn render_text(report: &AuditReport) -> String {
    let rule = "━".repeat(78);
    let mut out = String::new();

    out.push_str(&format!("{}\n", rule));
    out.push_str(&format!("  {}\n", report.title.to_uppercase()));
    out.push_str(&format!("{}\n\n", rule));

    if let Some(session) = &report.session {
        out.push_str(&format!("Session ID:   {}\n", session.session_id));
        out.push_str(&format!("Site:         {}\n", session.site_domain));
        out.push_str(&format!("Start page:   {}\n", session.seed));
        out.push_str(&format!(
            "Started:      {}\n",
            session.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        out.push_str(&format!(
            "Duration:     {} seconds\n",
            (session.finished_at - session.started_at).num_seconds()
        ));
    }
    out.push_str(&format!("Pages:        {}\n", report.pages_visited));
    out.push_str(&format!("Domains:      {}\n", report.domain_count()));
    if let Some(reason) = &report.aborted {
        out.push_str(&format!("Status:       INCOMPLETE ({})\n", reason));
    }
    out.push('\n');

    for summary in &report.domains {
        out.push_str(&format!(
            "{}  ({} requests from {} pages)\n",
            summary.domain, summary.total_requests, summary.page_count
        ));
        for record in &summary.samples {
            out.push_str(&format!("  {}\n    -> {}\n", record.page, record.target));
        }
        out.push('\n');
    }

    if !report.hidden_routes.is_empty() {
        out.push_str(&format!("{}\nHIDDEN DATA ROUTES\n{}\n", rule, rule));
        for route in &report.hidden_routes {
            out.push_str(&format!("  {}\n", route));
        }
        out.push('\n');
    }

    if !report.failed_pages.is_empty() {
        out.push_str(&format!("{}\nFAILED PAGES\n{}\n", rule, rule));
        for page in &report.failed_pages {
            out.push_str(&format!("  {}\n    {}\n", page.url, page.error));
        }
        out.push('\n');
    }

    out
}

pub fn render_json(report: &AuditReport) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "Outbound",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": Utc::now().to_rfc3339(),
                "format": "json",
            },
            "session": report.session,
            "summary": {
                "pages_visited": report.pages_visited,
                "third_party_domains": report.domain_count(),
                "complete": !report.is_partial(),
                "aborted": report.aborted,
            },
            "domains": report.domains,
            "hidden_routes": report.hidden_routes,
            "failed_pages": report.failed_pages,
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn render(report: &AuditReport, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Markdown => Ok(render_markdown(report)),
        ReportFormat::Text => Ok(render_text(report)),
        ReportFormat::Json => render_json(report),
    }
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
