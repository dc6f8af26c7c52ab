//! Application lifecycle: logging and service wiring.

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::db;
use crate::repository::sqlite::AuditRepository;
use crate::service::{
    AuditService, DocumentFetcher, GeminiInsights, PdfReportRenderer, SeoAnalyzer,
};

const DEFAULT_DIRECTIVES: [&str; 3] = ["sqlx=warn", "sitesage=debug", "info"];

/// Initialize logging with tracing_subscriber.
///
/// `filter` replaces the defaults entirely; otherwise `RUST_LOG` is read and
/// the default directives are layered on top. Logs go to stderr so stdout
/// stays machine-readable.
pub fn init_logging(filter: Option<&str>) {
    let env_filter = match filter {
        Some(spec) => EnvFilter::new(spec),
        None => DEFAULT_DIRECTIVES.iter().fold(
            EnvFilter::from_default_env(),
            |filter, directive| match directive.parse() {
                Ok(d) => filter.add_directive(d),
                Err(_) => filter,
            },
        ),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .with_target(false)
        .with_ansi(true)
        .try_init();
}

/// Long-lived services, built once at startup.
pub struct Services {
    pub pool: SqlitePool,
    pub audits: AuditService,
}

impl Services {
    /// Initializes the database, fetchers, insight client and report
    /// renderer, and hands them to the audit service.
    pub async fn setup(config: &AppConfig) -> Result<Self> {
        let pool = db::init_db(&config.database_url).await?;

        if config.gemini_api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY is not set; audits will use offline insights");
        }

        let audits = AuditService::new(
            DocumentFetcher::from_config(config)?,
            SeoAnalyzer::default(),
            Arc::new(AuditRepository::new(pool.clone())),
            Arc::new(GeminiInsights::from_config(config)?),
            Arc::new(PdfReportRenderer::from_config(config)),
        )
        .with_limits(config.max_batch_urls, config.max_concurrent_audits);

        tracing::info!("Services initialized");
        Ok(Self { pool, audits })
    }

    pub async fn shutdown(self) {
        tracing::info!("Shutting down services...");
        self.pool.close().await;
    }
}
