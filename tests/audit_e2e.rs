//! End-to-end tests for the audit pipeline.
//!
//! Pages and the Gemini API are served by local mock servers; the database
//! is in-memory and reports go to a temporary directory.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sitesage::config::DEFAULT_USER_AGENT;
use sitesage::domain::models::{AuditRequest, AuditStatus, BatchItem, CrawlerMode, InsightSource};
use sitesage::repository::sqlite::AuditRepository;
use sitesage::service::http::ClientType;
use sitesage::service::{
    AuditService, DocumentFetcher, GeminiInsights, PdfReportRenderer, RenderedFetcher, SeoAnalyzer,
    StaticFetcher,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Creates an in-memory SQLite database with migrations applied for testing.
async fn setup_test_db() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to create test database");
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

fn well_formed_page(title: &str) -> String {
    format!(
        r#"
        <html>
            <head>
                <title>{}</title>
                <meta name="description" content="{}">
            </head>
            <body>
                <h1>Main heading</h1>
                <h2>Details</h2>
                <img src="/a.png" alt="A">
                <img src="/b.png">
                <a href="/docs">Docs</a>
                <a href="https://elsewhere.example.net/">Elsewhere</a>
            </body>
        </html>
        "#,
        title,
        "m".repeat(150)
    )
}

fn gemini_body(summary: &str) -> String {
    serde_json::json!({
        "candidates": [{
            "content": {
                "parts": [{
                    "text": format!(
                        "```json\n{{\"summary\": \"{}\", \"suggestions\": [\"One\", \"Two\", \"Three\"]}}\n```",
                        summary
                    )
                }]
            }
        }]
    })
    .to_string()
}

struct Pipeline {
    service: AuditService,
    _reports: tempfile::TempDir,
    reports_dir: std::path::PathBuf,
}

async fn pipeline(gemini_base: &str, api_key: Option<&str>) -> Pipeline {
    let reports = tempfile::tempdir().unwrap();
    let reports_dir = reports.path().join("reports");

    let static_fetcher =
        StaticFetcher::new(ClientType::Standard, DEFAULT_USER_AGENT, Duration::from_secs(5)).unwrap();
    let rendered_fetcher = RenderedFetcher::new(DEFAULT_USER_AGENT, Duration::from_secs(30), None, 1);
    let narrator = GeminiInsights::new(
        api_key.map(str::to_string),
        "gemini-2.0-flash",
        gemini_base,
        Duration::from_secs(5),
    )
    .unwrap();

    let service = AuditService::new(
        DocumentFetcher::new(Arc::new(static_fetcher), Arc::new(rendered_fetcher)),
        SeoAnalyzer::default(),
        Arc::new(AuditRepository::new(setup_test_db().await)),
        Arc::new(narrator),
        Arc::new(PdfReportRenderer::new(reports_dir.clone())),
    );

    Pipeline {
        service,
        _reports: reports,
        reports_dir,
    }
}

#[tokio::test]
async fn static_audit_with_generated_insights_and_report() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(well_formed_page("A Perfectly Sized Title For The End To End Audit Test"))
        .create_async()
        .await;
    let gemini = server
        .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
        .match_header("x-goog-api-key", "test-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(gemini_body("Strong page overall."))
        .create_async()
        .await;

    let p = pipeline(&server.url(), Some("test-key")).await;
    let url = format!("{}/", server.url());

    let record = p
        .service
        .process_audit("owner-1", &url, CrawlerMode::Static, true, None)
        .await
        .expect("audit should complete");

    gemini.assert_async().await;
    assert_eq!(record.status, AuditStatus::Completed);

    let signals = record.signals.as_ref().unwrap();
    assert_eq!(signals.h1_tags().len(), 1);
    assert_eq!(signals.images_total(), 2);
    assert_eq!(signals.images_without_alt(), 1);
    assert_eq!(signals.internal_links(), 1);
    assert_eq!(signals.external_links(), 1);

    let score = record.score.as_ref().unwrap();
    assert!(score.seo_score <= 100);
    assert!(score.issues.iter().any(|i| i == "1 image(s) missing alt tags"));

    let insight = record.insight.as_ref().unwrap();
    assert_eq!(insight.source, InsightSource::Generated);
    assert_eq!(insight.summary, "Strong page overall.");

    let expected_ref = format!("/reports/{}.pdf", record.id);
    assert_eq!(record.report_url.as_deref(), Some(expected_ref.as_str()));
    let pdf = std::fs::read(p.reports_dir.join(format!("{}.pdf", record.id))).unwrap();
    assert!(pdf.starts_with(b"%PDF-"));

    let stored = p.service.get_audit("owner-1", &record.id).await.unwrap();
    assert_eq!(stored.status, AuditStatus::Completed);
    assert_eq!(stored.score, record.score);
    assert_eq!(stored.report_url, record.report_url);
}

#[tokio::test]
async fn narrative_upstream_failure_still_completes() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/")
        .with_status(200)
        .with_body(well_formed_page("Short"))
        .create_async()
        .await;
    server
        .mock("POST", mockito::Matcher::Any)
        .with_status(500)
        .with_body("internal")
        .create_async()
        .await;

    let p = pipeline(&server.url(), Some("test-key")).await;
    let record = p
        .service
        .process_audit("owner-1", &format!("{}/", server.url()), CrawlerMode::Static, false, None)
        .await
        .expect("narrative failure must not fail the audit");

    let insight = record.insight.unwrap();
    assert_eq!(record.status, AuditStatus::Completed);
    assert_eq!(insight.source, InsightSource::Fallback);
    assert!(!insight.summary.is_empty());
    assert!(insight.suggestions[0].starts_with("Fix: Title is too short"));
}

#[tokio::test]
async fn http_error_marks_audit_failed() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/broken")
        .with_status(503)
        .create_async()
        .await;

    let p = pipeline(&server.url(), None).await;
    let err = p
        .service
        .process_audit(
            "owner-1",
            &format!("{}/broken", server.url()),
            CrawlerMode::Static,
            false,
            None,
        )
        .await
        .unwrap_err();

    let audit_id = err.audit_id.clone().expect("record was created");
    let stored = p.service.get_audit("owner-1", &audit_id).await.unwrap();
    assert_eq!(stored.status, AuditStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some(err.message.as_str()));
    assert!(stored.score.is_none());
}

#[tokio::test]
async fn batch_isolates_unreachable_url() {
    let mut server = mockito::Server::new_async().await;
    for path in ["/one", "/three"] {
        server
            .mock("GET", path)
            .with_status(200)
            .with_body(well_formed_page("Batch page"))
            .create_async()
            .await;
    }

    let p = pipeline(&server.url(), None).await;
    let urls = vec![
        format!("{}/one", server.url()),
        "http://127.0.0.1:1/".to_string(),
        format!("{}/three", server.url()),
    ];
    let request = AuditRequest {
        urls: urls.clone(),
        crawler_mode: CrawlerMode::Static,
        generate_pdf: false,
        custom_prompt: None,
    };

    let items = p.service.process_batch("owner-1", &request).await.unwrap();

    assert_eq!(items.len(), 3);
    let returned: Vec<&str> = items.iter().map(|i| i.url()).collect();
    assert_eq!(returned, urls.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(items.iter().filter(|i| i.is_completed()).count(), 2);

    match &items[1] {
        BatchItem::Failed { error_message, .. } => {
            assert!(error_message.contains("unreachable"), "{error_message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }

    let listed = p.service.list_audits("owner-1", None, None).await.unwrap();
    assert_eq!(listed.len(), 3);
    assert_eq!(
        listed.iter().filter(|a| a.status == AuditStatus::Failed).count(),
        1
    );
    assert_eq!(
        listed.iter().filter(|a| a.seo_score.is_some()).count(),
        2
    );
}

#[tokio::test]
async fn batch_json_is_tagged_by_outcome() {
    let p = pipeline("http://127.0.0.1:1", None).await;
    let request = AuditRequest {
        urls: vec!["http://127.0.0.1:1/".to_string()],
        crawler_mode: CrawlerMode::Static,
        generate_pdf: false,
        custom_prompt: None,
    };

    let items = p.service.process_batch("owner-1", &request).await.unwrap();
    let json = serde_json::to_value(&items).unwrap();

    assert_eq!(json[0]["outcome"], "failed");
    assert_eq!(json[0]["url"], "http://127.0.0.1:1/");
    assert!(json[0]["auditId"].is_string());
    assert!(json[0]["errorMessage"].is_string());
}
