// Tests for report generation functionality

use chrono::{TimeZone, Utc};
use outbound_core::audit::AuditRun;
use outbound_core::report::{
    ReportFormat, build_report, render, render_json, render_markdown, render_text,
    report_for_run, save_report,
};
use outbound_scanner::audit::AuditTable;
use outbound_scanner::normalize::{NormalizedUrl, normalize_absolute};
use outbound_scanner::result::{CrawlOutcome, PageVisit};
use tempfile::TempDir;
use uuid::Uuid;

fn page(url: &str) -> NormalizedUrl {
    normalize_absolute(url)
}

fn sample_table() -> AuditTable {
    let mut table = AuditTable::new();
    let home = page("https://example.test/eng");
    let about = page("https://example.test/eng/about");

    table.record("zeta.test", &home, "https://zeta.test/z.js");
    table.record("cdn.test", &home, "https://cdn.test/a.js");
    table.record("cdn.test", &about, "https://cdn.test/b.js");
    table.record("cdn.test", &about, "https://cdn.test/c.js");
    table.record("cdn.test", &about, "https://cdn.test/c.js");
    table.record_hidden_route("https://example.test/_next/data/b1/eng/indices.json");
    table
}

fn sample_run(aborted: Option<&str>) -> AuditRun {
    let seed = page("https://example.test/eng");
    let mut visits = vec![PageVisit::new(seed.clone())];
    visits.push(PageVisit::with_error(
        page("https://example.test/eng/broken"),
        "Navigation to https://example.test/eng/broken timed out after 30s".to_string(),
    ));

    AuditRun {
        session_id: Uuid::nil(),
        started_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        finished_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 2, 30).unwrap(),
        authenticated: false,
        outcome: CrawlOutcome {
            site_domain: "example.test".to_string(),
            seed,
            visits,
            audit: sample_table(),
            aborted: aborted.map(str::to_string),
        },
    }
}

// ============================================================================
// Report Format Tests
// ============================================================================

#[test]
fn test_report_format_from_str() {
    assert_eq!(ReportFormat::from_str("markdown"), Some(ReportFormat::Markdown));
    assert_eq!(ReportFormat::from_str("md"), Some(ReportFormat::Markdown));
    assert_eq!(ReportFormat::from_str("json"), Some(ReportFormat::Json));
    assert_eq!(ReportFormat::from_str("text"), Some(ReportFormat::Text));
}

#[test]
fn test_report_format_from_str_case_insensitive() {
    assert_eq!(ReportFormat::from_str("JSON"), Some(ReportFormat::Json));
    assert_eq!(ReportFormat::from_str("Markdown"), Some(ReportFormat::Markdown));
}

#[test]
fn test_report_format_from_str_invalid() {
    assert_eq!(ReportFormat::from_str("csv"), None);
    assert_eq!(ReportFormat::from_str(""), None);
}

#[test]
fn test_report_format_extension() {
    assert_eq!(ReportFormat::Markdown.extension(), "md");
    assert_eq!(ReportFormat::Json.extension(), "json");
}

// ============================================================================
// Report Building Tests
// ============================================================================

#[test]
fn test_build_report_sorts_domains() {
    let report = build_report(&sample_table(), 2, 3);
    let domains: Vec<&str> = report.domains.iter().map(|d| d.domain.as_str()).collect();
    assert_eq!(domains, vec!["cdn.test", "zeta.test"]);
    assert_eq!(report.pages_visited, 2);
    assert_eq!(report.domain_count(), 2);
}

#[test]
fn test_build_report_caps_samples() {
    let report = build_report(&sample_table(), 2, 2);
    let cdn = &report.domains[0];
    assert_eq!(cdn.samples.len(), 2);
    assert_eq!(cdn.samples[0].target, "https://cdn.test/a.js");
    assert_eq!(cdn.total_requests, 4);
    assert_eq!(cdn.page_count, 2);
}

#[test]
fn test_build_report_of_empty_table() {
    let report = build_report(&AuditTable::new(), 5, 3);
    assert!(report.domains.is_empty());
    assert!(report.hidden_routes.is_empty());
    assert_eq!(report.pages_visited, 5);
    assert!(render_markdown(&report).contains("No third-party requests were observed."));
}

#[test]
fn test_report_for_run_carries_session_and_failures() {
    let report = report_for_run(&sample_run(None), "Audit of example.test", 3);

    assert_eq!(report.title, "Audit of example.test");
    let session = report.session.as_ref().unwrap();
    assert_eq!(session.site_domain, "example.test");
    assert_eq!(session.seed, "https://example.test/eng");
    assert_eq!(report.failed_pages.len(), 1);
    assert_eq!(report.failed_pages[0].url, "https://example.test/eng/broken");
    assert!(!report.is_partial());
}

// ============================================================================
// Markdown Rendering Tests
// ============================================================================

#[test]
fn test_markdown_has_table_and_summary() {
    let md = render_markdown(&build_report(&sample_table(), 2, 3));

    assert!(md.starts_with("# Third-party request audit\n"));
    assert!(md.contains("- Pages visited: 2"));
    assert!(md.contains("- Third-party domains: 2"));
    assert!(md.contains("| Third-party domain | Requests | Pages | Sample requests |"));
    assert!(md.contains(
        "| zeta.test | 1 | 1 | https://example.test/eng → https://zeta.test/z.js |"
    ));
    assert!(md.contains("https://example.test/eng → https://cdn.test/a.js<br>"));
}

#[test]
fn test_markdown_domain_rows_are_ordered() {
    let md = render_markdown(&build_report(&sample_table(), 2, 3));
    let cdn = md.find("| cdn.test |").unwrap();
    let zeta = md.find("| zeta.test |").unwrap();
    assert!(cdn < zeta);
}

#[test]
fn test_markdown_lists_hidden_routes_and_failures() {
    let md = render_markdown(&report_for_run(&sample_run(None), "Audit", 3));
    assert!(md.contains("## Hidden data routes"));
    assert!(md.contains("- https://example.test/_next/data/b1/eng/indices.json"));
    assert!(md.contains("## Pages that could not be loaded"));
    assert!(md.contains("- https://example.test/eng/broken: Navigation to"));
    assert!(md.contains("- Run: 2026-03-01 09:00:00 UTC to 2026-03-01 09:02:30 UTC"));
}

#[test]
fn test_markdown_flags_partial_report() {
    let md = render_markdown(&report_for_run(
        &sample_run(Some("Renderer unavailable: browser connection lost")),
        "Audit",
        3,
    ));
    assert!(md.contains("**Incomplete:**"));
    assert!(md.contains("browser connection lost"));
}

#[test]
fn test_markdown_escapes_pipes() {
    let mut table = AuditTable::new();
    table.record("cdn.test", &page("https://example.test/eng"), "https://cdn.test/a|b.js");
    let md = render_markdown(&build_report(&table, 1, 3));
    assert!(md.contains("https://cdn.test/a\\|b.js"));
}

// ============================================================================
// Text and JSON Rendering Tests
// ============================================================================

#[test]
fn test_text_report_summary() {
    let text = render_text(&report_for_run(&sample_run(None), "Audit", 3));
    assert!(text.contains("AUDIT"));
    assert!(text.contains("Duration:     150 seconds"));
    assert!(text.contains("cdn.test  (4 requests from 2 pages)"));
    assert!(text.contains("FAILED PAGES"));
}

#[test]
fn test_json_report_structure() {
    let json = render_json(&report_for_run(&sample_run(None), "Audit", 3)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    let report = &value["report"];
    assert_eq!(report["metadata"]["generator"], "Outbound");
    assert_eq!(report["summary"]["pages_visited"], 2);
    assert_eq!(report["summary"]["third_party_domains"], 2);
    assert_eq!(report["summary"]["complete"], true);
    assert_eq!(report["domains"][0]["domain"], "cdn.test");
    assert_eq!(
        report["domains"][0]["samples"][0]["page"],
        "https://example.test/eng"
    );
    assert_eq!(report["session"]["session_id"], Uuid::nil().to_string());
}

#[test]
fn test_render_dispatches_on_format() {
    let report = build_report(&sample_table(), 2, 3);
    assert!(render(&report, ReportFormat::Markdown).unwrap().starts_with("# "));
    assert!(render(&report, ReportFormat::Json).unwrap().starts_with('{'));
    assert!(render(&report, ReportFormat::Text).unwrap().starts_with('━'));
}

// ============================================================================
// Saving
// ============================================================================

#[test]
fn test_save_report_writes_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audit.md");

    save_report("# Report\n", &path).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Report\n");
}
