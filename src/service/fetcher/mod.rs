//! Fetch strategies that turn a URL into `PageSignals`.
//!
//! Two strategies are provided:
//! - **Static**: direct HTTP fetch + HTML parse (fast, no JavaScript)
//! - **Rendered**: headless Chromium, reads the DOM after scripts ran
//!
//! Both implement the `PageFetcher` trait and share `PageExtractor`, so the
//! rule engine never needs to know which one produced the signals.

mod rendered;
mod static_html;

pub use rendered::RenderedFetcher;
pub use static_html::StaticFetcher;

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::config::AppConfig;
use crate::domain::models::{CrawlerMode, PageSignals};
use crate::error::FetchError;

/// Strategy trait for page fetching.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch one page and extract its signals.
    async fn fetch(&self, url: &Url) -> Result<PageSignals, FetchError>;

    /// Human-readable name for this fetcher.
    fn name(&self) -> &'static str;
}

/// Parse an audit target. Only absolute http(s) URLs are fetchable.
pub fn parse_target(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw.trim()).map_err(|e| FetchError::ProtocolInvalid {
        url: raw.to_string(),
        message: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        "http" | "https" => Err(FetchError::ProtocolInvalid {
            url: raw.to_string(),
            message: "missing host".to_string(),
        }),
        other => Err(FetchError::ProtocolInvalid {
            url: raw.to_string(),
            message: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// Picks the fetch strategy for a crawler mode.
#[derive(Clone)]
pub struct DocumentFetcher {
    static_fetcher: Arc<dyn PageFetcher>,
    rendered_fetcher: Arc<dyn PageFetcher>,
}

impl DocumentFetcher {
    pub fn new(static_fetcher: Arc<dyn PageFetcher>, rendered_fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            static_fetcher,
            rendered_fetcher,
        }
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            Arc::new(StaticFetcher::from_config(config)?),
            Arc::new(RenderedFetcher::from_config(config)),
        ))
    }

    pub fn select(&self, mode: CrawlerMode) -> Arc<dyn PageFetcher> {
        match mode {
            CrawlerMode::Static => self.static_fetcher.clone(),
            CrawlerMode::Rendered => self.rendered_fetcher.clone(),
        }
    }

    pub async fn fetch(&self, url: &str, mode: CrawlerMode) -> Result<PageSignals, FetchError> {
        let target = parse_target(url)?;
        let fetcher = self.select(mode);
        tracing::debug!("Fetching {} with {}", target, fetcher.name());
        fetcher.fetch(&target).await
    }
}
