// End-to-end crawl over HTTP with the static renderer

use outbound_scanner::settle::SettlePolicy;
use outbound_scanner::{Crawler, StaticRenderer};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_static_crawl_audits_declared_subresources() {
    let server = MockServer::start().await;
    page(
        &server,
        "/eng",
        r#"<html><head><script src="https://cdn.test/x.js"></script></head>
           <body><a href="/eng/about">About</a><a href="/chi/about">Chinese</a></body></html>"#,
    )
    .await;
    page(
        &server,
        "/eng/about",
        r#"<html><body><img src="/eng/logo.png"><a href="/eng">Home</a></body></html>"#,
    )
    .await;

    let seed = format!("{}/eng", server.uri());
    let renderer = StaticRenderer::new().unwrap();
    let outcome = Crawler::new()
        .with_settle_policy(SettlePolicy::immediate())
        .with_include_pattern("/eng".to_string())
        .crawl(&renderer, &seed)
        .await
        .unwrap();

    let visited: Vec<String> = outcome.visits.iter().map(|v| v.url.to_string()).collect();
    assert_eq!(visited, vec![seed.clone(), format!("{}/eng/about", server.uri())]);

    assert_eq!(outcome.audit.len(), 1);
    let entry = outcome.audit.entry("cdn.test").unwrap();
    assert_eq!(entry.records.len(), 1);
    assert_eq!(entry.records[0].page.as_str(), seed);
    assert_eq!(entry.records[0].target, "https://cdn.test/x.js");
}

#[tokio::test]
async fn test_static_crawl_records_error_pages_and_continues() {
    let server = MockServer::start().await;
    page(
        &server,
        "/eng",
        r#"<a href="/eng/gone">Gone</a><a href="/eng/ok">Ok</a>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/eng/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("<p>not here</p>"))
        .mount(&server)
        .await;
    page(&server, "/eng/ok", r#"<script src="https://tags.test/t.js"></script>"#).await;

    let renderer = StaticRenderer::new().unwrap();
    let outcome = Crawler::new()
        .with_settle_policy(SettlePolicy::immediate())
        .crawl(&renderer, &format!("{}/eng", server.uri()))
        .await
        .unwrap();

    // An error page still renders, like it would in a browser.
    assert_eq!(outcome.visited_count(), 3);
    assert!(outcome.is_complete());
    assert!(outcome.audit.entry("tags.test").is_some());
}
