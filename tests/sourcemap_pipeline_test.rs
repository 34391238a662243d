//! Source-map pipeline against a mock HTTP server: discovery order,
//! content-type gating, and size budgets.

use sitereplay::sourcemap::{FetchLimits, SourceFilters, SourceMapPipeline, fetch_map_text};
use sitereplay::SourceMapError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn limits(max_size: usize) -> FetchLimits {
    FetchLimits {
        max_size,
        timeout: Duration::from_secs(10),
    }
}

fn pipeline(max_size: usize) -> SourceMapPipeline {
    SourceMapPipeline::new(reqwest::Client::new(), limits(max_size), SourceFilters::default())
}

const VALID_MAP: &str = r#"{"version":3,"sources":["src/a.ts","src/b.ts"],"sourcesContent":["let a=1;",null],"mappings":"AAAA"}"#;

#[tokio::test]
async fn header_discovery_and_null_content_accounting() {
    let mut server = mockito::Server::new_async().await;
    let bundle = server
        .mock("GET", "/app.js")
        .with_header("SourceMap", "/maps/app.js.map")
        .with_body("console.log(1)")
        .create_async()
        .await;
    let map = server
        .mock("GET", "/maps/app.js.map")
        .with_header("content-type", "application/json")
        .with_body(VALID_MAP)
        .create_async()
        .await;

    let report = pipeline(1 << 20)
        .process_bundle(&format!("{}/app.js", server.url()), &CancellationToken::new())
        .await;

    bundle.assert_async().await;
    map.assert_async().await;

    assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
    assert_eq!(report.stats.extracted_count, 1);
    assert_eq!(report.stats.null_content_count, 1);
    assert_eq!(report.stats.skipped_count, 0);
    assert_eq!(report.sources[0].path, "src/a.ts");
}

#[tokio::test]
async fn html_response_is_a_discovery_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/app.js")
        .with_header("SourceMap", "/maps/app.js.map")
        .with_body("console.log(1)")
        .create_async()
        .await;
    server
        .mock("GET", "/maps/app.js.map")
        .with_header("content-type", "text/html; charset=utf-8")
        .with_body("<html>SPA fallback</html>")
        .create_async()
        .await;

    let report = pipeline(1 << 20)
        .process_bundle(&format!("{}/app.js", server.url()), &CancellationToken::new())
        .await;

    assert_eq!(report.stats.extracted_count, 0);
    assert!(matches!(
        report.errors.as_slice(),
        [SourceMapError::HtmlFallback { .. }]
    ));
}

#[tokio::test]
async fn js_comment_discovery_last_occurrence_wins() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/bundle.js")
        .with_body("//# sourceMappingURL=stale.map\nlet x=1;\n//# sourceMappingURL=real.map\n")
        .create_async()
        .await;
    let stale = server
        .mock("GET", "/stale.map")
        .with_body(VALID_MAP)
        .expect(0)
        .create_async()
        .await;
    server
        .mock("GET", "/real.map")
        .with_header("content-type", "application/json")
        .with_body(VALID_MAP)
        .create_async()
        .await;

    let report = pipeline(1 << 20)
        .process_bundle(&format!("{}/bundle.js", server.url()), &CancellationToken::new())
        .await;

    stale.assert_async().await;
    assert!(report.errors.is_empty());
    assert_eq!(report.stats.extracted_count, 1);
}

#[tokio::test]
async fn probe_fallback_and_missing_map() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/plain.js")
        .with_body("let y=2;")
        .create_async()
        .await;
    server
        .mock("GET", "/plain.js.map")
        .with_status(404)
        .create_async()
        .await;

    let report = pipeline(1 << 20)
        .process_bundle(&format!("{}/plain.js", server.url()), &CancellationToken::new())
        .await;

    assert!(matches!(
        report.errors.as_slice(),
        [SourceMapError::NotFound { .. }]
    ));
}

#[tokio::test]
async fn size_budget_is_exact() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/exact.map")
        .with_header("content-type", "application/json")
        .with_body(VALID_MAP)
        .create_async()
        .await;

    let url = format!("{}/exact.map", server.url());
    let cancel = CancellationToken::new();

    // Exactly at the budget: accepted
    let text = fetch_map_text(
        &reqwest::Client::new(),
        &url,
        limits(VALID_MAP.len()),
        &cancel,
    )
    .await
    .unwrap();
    assert_eq!(text, VALID_MAP);

    // A budget one byte smaller: rejected with a size error
    let err = fetch_map_text(
        &reqwest::Client::new(),
        &url,
        limits(VALID_MAP.len() - 1),
        &cancel,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SourceMapError::TooLarge { .. }));
}

#[tokio::test]
async fn cancellation_aborts_the_fetch() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/slow.map")
        .with_body(VALID_MAP)
        .create_async()
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = fetch_map_text(
        &reqwest::Client::new(),
        &format!("{}/slow.map", server.url()),
        limits(1 << 20),
        &cancel,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SourceMapError::Cancelled));
}
