//! Static fetcher - direct HTTP fetch and HTML parse.
//!
//! No JavaScript runs, so pages that build their content client-side come
//! back mostly empty. Use the rendered fetcher for those.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rquest::Client;
use scraper::Html;
use url::Url;

use super::PageFetcher;
use crate::config::AppConfig;
use crate::domain::models::PageSignals;
use crate::error::FetchError;
use crate::extractor::PageExtractor;
use crate::service::http::{create_client, ClientType};

pub struct StaticFetcher {
    client: Client,
    user_agent: String,
    timeout: Duration,
}

impl StaticFetcher {
    pub fn new(client_type: ClientType, user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: create_client(client_type, timeout)?,
            user_agent: user_agent.to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Self::new(
            ClientType::from_emulation_enabled(config.emulate_browser),
            &config.user_agent,
            config.static_timeout(),
        )
    }

    async fn download(&self, url: &Url) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url.as_str())
            .header("User-Agent", self.user_agent.as_str())
            .send()
            .await
            .map_err(|e| self.map_request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| self.map_request_error(url, e))
    }

    fn map_request_error(&self, url: &Url, err: rquest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                seconds: self.timeout.as_secs(),
            }
        } else {
            FetchError::Unreachable {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &Url) -> Result<PageSignals, FetchError> {
        tracing::info!("[STATIC] Fetching {}", url);
        let start_time = Instant::now();

        let html = tokio::time::timeout(self.timeout, self.download(url))
            .await
            .map_err(|_| FetchError::Timeout {
                url: url.to_string(),
                seconds: self.timeout.as_secs(),
            })??;

        // Html is not Send; keep it out of any await.
        let content = {
            let document = Html::parse_document(&html);
            PageExtractor::extract(&document, url)
        };
        let load_time_ms = start_time.elapsed().as_millis() as u64;

        tracing::debug!(
            "[STATIC] {} bytes from {} in {}ms",
            html.len(),
            url,
            load_time_ms
        );

        Ok(PageSignals::new(url.as_str(), content, load_time_ms))
    }

    fn name(&self) -> &'static str {
        "Static (HTTP)"
    }
}
