// tests/web_scan_test.rs

use eternyx_scanner::config::{DatabaseConfig, ScannerSettings};
use eternyx_scanner::core::errors::ScanError;
use eternyx_scanner::core::models::{FindingKind, Severity, WebScanRequest};
use eternyx_scanner::core::persistence::{RetryPolicy, ScanStore, SqliteStore};
use eternyx_scanner::core::scanner::context::CancelToken;
use eternyx_scanner::core::scanner::ScanEngine;
use eternyx_scanner::core::service::ScanService;
use eternyx_scanner::core::validation::validate_web_request;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings() -> ScannerSettings {
    ScannerSettings {
        probe_timeout_secs: 5,
        scan_deadline_secs: 30,
        requests_per_second: 100,
        ..Default::default()
    }
}

fn request(target: &str) -> WebScanRequest {
    WebScanRequest { target_url: target.to_string(), scan_depth: None, user_id: "user-1".to_string() }
}

/// Plain HTTP, no security headers, one cookie without flags.
async fn insecure_site() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "session=abc123; Path=/")
                .set_body_string("<html><body><h1>Welcome</h1></body></html>"),
        )
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn insecure_http_site_yields_expected_findings_and_score() {
    let server = insecure_site().await;
    let engine = ScanEngine::new(settings()).unwrap();
    let target = validate_web_request(&request(&server.uri())).unwrap();

    let result = engine.scan_web(&target, &CancelToken::new()).await.unwrap();

    let count = |kind| result.vulnerabilities.iter().filter(|f| f.kind == kind).count();
    assert_eq!(count(FindingKind::InsecureProtocol), 1);
    assert_eq!(count(FindingKind::MissingSecurityHeader), 6);
    assert_eq!(count(FindingKind::InsecureCookie), 3);
    assert_eq!(result.vulnerabilities.len(), 10, "{:#?}", result.vulnerabilities);
    assert_eq!(result.risk_score, 81);

    assert_eq!(result.stats.pages_scanned, 1);
    assert_eq!(result.stats.cookies_analyzed, 1);
    assert!(result.stats.headers_checked >= 1);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert!(result.vulnerabilities.iter().all(|f| f.category.is_some()));
}

#[tokio::test]
async fn findings_follow_analyzer_registration_order() {
    let server = insecure_site().await;
    let engine = ScanEngine::new(settings()).unwrap();
    let target = validate_web_request(&request(&server.uri())).unwrap();

    let result = engine.scan_web(&target, &CancelToken::new()).await.unwrap();
    let kinds: Vec<FindingKind> = result.vulnerabilities.iter().map(|f| f.kind).collect();
    let first_header = kinds.iter().position(|k| *k == FindingKind::MissingSecurityHeader).unwrap();
    let protocol = kinds.iter().position(|k| *k == FindingKind::InsecureProtocol).unwrap();
    assert_eq!(kinds[0], FindingKind::InsecureCookie);
    assert!(first_header < protocol);
}

#[tokio::test]
async fn active_probes_and_exposed_paths_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/item"))
        .and(query_param("test", "'"))
        .respond_with(ResponseTemplate::new(500).set_body_string("You have an error in your SQL syntax"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item"))
        .and(query_param("file", "../../../etc/passwd"))
        .respond_with(ResponseTemplate::new(200).set_body_string("root:x:0:0:root:/root:/bin/bash"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<form action="/buy"><input name="qty"></form><script>track()</script>"#,
        ))
        .with_priority(10)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/.env"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/admin"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let engine = ScanEngine::new(settings()).unwrap();
    let target = validate_web_request(&request(&format!("{}/item?id=1", server.uri()))).unwrap();
    let result = engine.scan_web(&target, &CancelToken::new()).await.unwrap();

    let find = |kind| result.vulnerabilities.iter().find(|f| f.kind == kind);
    let sql = find(FindingKind::SqlInjection).expect("sql injection finding");
    assert_eq!(sql.severity, Severity::Critical);
    assert!(sql.proof_of_concept.as_deref().unwrap().contains("test=%27"));

    let traversal = find(FindingKind::DirectoryTraversal).expect("traversal finding");
    assert_eq!(traversal.severity, Severity::High);

    let exposures: Vec<_> = result
        .vulnerabilities
        .iter()
        .filter(|f| f.kind == FindingKind::SensitivePathExposure)
        .collect();
    assert_eq!(exposures.len(), 2);
    assert!(exposures.iter().any(|f| f.severity == Severity::Medium && f.location.ends_with("/.env")));
    assert!(exposures.iter().any(|f| f.severity == Severity::Low && f.location.ends_with("/admin")));

    assert!(find(FindingKind::MissingCsrfProtection).is_some());
    assert!(find(FindingKind::PotentialXss).is_some());
    assert_eq!(result.stats.forms_found, 1);
    assert_eq!(result.stats.inputs_tested, 1);
    assert_eq!(result.risk_score, 100);
}

#[tokio::test]
async fn unreachable_target_degrades_with_diagnostics() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let engine = ScanEngine::new(settings()).unwrap();
    let target = validate_web_request(&request(&uri)).unwrap();
    let result = engine.scan_web(&target, &CancelToken::new()).await.unwrap();

    // Only the offline protocol check can still produce a finding.
    assert_eq!(result.vulnerabilities.len(), 1);
    assert_eq!(result.vulnerabilities[0].kind, FindingKind::InsecureProtocol);
    let degraded: Vec<&str> = result.diagnostics.iter().map(|d| d.analyzer.as_str()).collect();
    assert!(degraded.contains(&"http_headers"));
    assert!(degraded.contains(&"cookies"));
    assert!(degraded.contains(&"content"));
}

#[tokio::test]
async fn cancelled_scan_returns_cancelled() {
    let server = insecure_site().await;
    let engine = ScanEngine::new(settings()).unwrap();
    let target = validate_web_request(&request(&server.uri())).unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();

    let outcome = engine.scan_web(&target, &cancel).await;
    assert!(matches!(outcome, Err(ScanError::Cancelled)));
}

#[tokio::test]
async fn slow_target_is_cut_by_the_probe_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let engine = ScanEngine::new(ScannerSettings { probe_timeout_secs: 1, ..settings() }).unwrap();
    let target = validate_web_request(&request(&server.uri())).unwrap();
    let started = std::time::Instant::now();
    let result = engine.scan_web(&target, &CancelToken::new()).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(8));
    assert!(result.diagnostics.iter().any(|d| d.analyzer == "http_headers"));
}

#[tokio::test]
async fn service_persists_every_finding_and_previews_ten() {
    let server = insecure_site().await;
    let dir = tempfile::tempdir().unwrap();
    let database = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("scans.db").display()),
        max_connections: 1,
        ..Default::default()
    };
    let store = Arc::new(SqliteStore::connect(&database).await.unwrap());
    let service = ScanService::new(
        ScanEngine::new(settings()).unwrap(),
        Some(store.clone() as Arc<dyn ScanStore>),
        RetryPolicy::from(&database),
        4,
    );

    let response = service.web_scan(&request(&server.uri()), &CancelToken::new()).await.unwrap();

    assert!(response.success);
    assert!(response.persisted);
    assert_eq!(response.vulnerabilities_found, 10);
    assert_eq!(response.vulnerabilities.len(), 4);
    assert_eq!(response.summary.severities.high, 3);
    assert!(response.recommendations.iter().any(|r| r.contains("security headers")));

    let scan_id = response.scan_id.unwrap().to_string();
    let (stored_count, scan_type): (i64, String) =
        sqlx::query_as("SELECT vulnerabilities_found, scan_type FROM scans WHERE id = ?")
            .bind(&scan_id)
            .fetch_one(store.pool())
            .await
            .unwrap();
    let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM findings WHERE scan_id = ?")
        .bind(&scan_id)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(stored_count, 10);
    assert_eq!(rows, 10);
    assert_eq!(scan_type, "web_application");
}

#[tokio::test]
async fn invalid_requests_never_reach_the_network() {
    let service = ScanService::new(ScanEngine::new(settings()).unwrap(), None, RetryPolicy::from(&DatabaseConfig::default()), 10);
    for target in ["", "ftp://example.com", "not a url"] {
        let outcome = service.web_scan(&request(target), &CancelToken::new()).await;
        assert!(matches!(outcome, Err(ScanError::InvalidInput(_))), "{target}");
    }
}
