//! Rendered fetcher - headless Chromium over CDP.
//!
//! Every fetch gets its own browser process and throwaway profile
//! directory. The number of live browsers is capped by a semaphore.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{EventLifecycleEvent, FrameId};
use chromiumoxide::error::CdpError;
use futures::{Stream, StreamExt};
use scraper::Html;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use url::Url;

use super::PageFetcher;
use crate::config::AppConfig;
use crate::domain::models::PageSignals;
use crate::error::FetchError;
use crate::extractor::PageExtractor;

/// Lifecycle event Chromium fires once at most two connections have been
/// open for 500ms.
const NETWORK_SETTLED: &str = "networkAlmostIdle";
/// Fired when a navigation commits a new document.
const DOCUMENT_INIT: &str = "init";

pub struct RenderedFetcher {
    user_agent: String,
    timeout: Duration,
    chrome_executable: Option<PathBuf>,
    permits: Arc<Semaphore>,
}

impl RenderedFetcher {
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        chrome_executable: Option<PathBuf>,
        max_browsers: usize,
    ) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            timeout,
            chrome_executable,
            permits: Arc::new(Semaphore::new(max_browsers.max(1))),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.user_agent,
            config.render_timeout(),
            config.chrome_executable.clone(),
            config.max_concurrent_browsers,
        )
    }

    async fn render(&self, session: &BrowserSession, url: &Url) -> Result<RenderedPage, FetchError> {
        let browser = session.browser()?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| map_cdp_error(url, e, self.timeout))?;

        // Subscribe before navigating so no lifecycle event is missed.
        let mut lifecycle = page
            .event_listener::<EventLifecycleEvent>()
            .await
            .map_err(|e| map_cdp_error(url, e, self.timeout))?;
        let main_frame = page
            .mainframe()
            .await
            .map_err(|e| map_cdp_error(url, e, self.timeout))?;

        let start_time = Instant::now();
        let navigation = async {
            page.goto(url.as_str()).await?;
            if !wait_for_network_settled(&mut lifecycle, main_frame.as_ref()).await {
                tracing::debug!("[RENDER] Lifecycle stream ended before {} settled", url);
            }
            Ok::<_, CdpError>(())
        };

        tokio::time::timeout(self.timeout, navigation)
            .await
            .map_err(|_| FetchError::RenderTimeout {
                url: url.to_string(),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| map_cdp_error(url, e, self.timeout))?;
        let load_time_ms = start_time.elapsed().as_millis() as u64;

        let html = page.content().await.map_err(|e| map_cdp_error(url, e, self.timeout))?;

        // Redirects move the page; links are classified against where it landed.
        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .and_then(|u| Url::parse(&u).ok())
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or_else(|| url.clone());

        Ok(RenderedPage {
            html,
            final_url,
            load_time_ms,
        })
    }
}

struct RenderedPage {
    html: String,
    final_url: Url,
    load_time_ms: u64,
}

#[async_trait]
impl PageFetcher for RenderedFetcher {
    async fn fetch(&self, url: &Url) -> Result<PageSignals, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;

        tracing::info!("[RENDER] Launching browser for {}", url);
        let mut session = BrowserSession::launch(
            &self.user_agent,
            self.chrome_executable.as_deref(),
        )
        .await?;

        let rendered = self.render(&session, url).await;
        session.close().await;
        let rendered = rendered?;

        let content = {
            let document = Html::parse_document(&rendered.html);
            PageExtractor::extract(&document, &rendered.final_url)
        };

        tracing::info!(
            "[RENDER] {} settled in {}ms ({} bytes)",
            url,
            rendered.load_time_ms,
            rendered.html.len()
        );

        Ok(PageSignals::new(url.as_str(), content, rendered.load_time_ms))
    }

    fn name(&self) -> &'static str {
        "Rendered (Chromium)"
    }
}

/// One headless browser process plus its profile directory.
///
/// `close` shuts it down gracefully. If the owning future is dropped first,
/// `Drop` aborts the event loop and removes the profile; chromiumoxide kills
/// the child process when `Browser` drops.
struct BrowserSession {
    browser: Option<Browser>,
    handler: JoinHandle<()>,
    profile_dir: PathBuf,
}

impl BrowserSession {
    async fn launch(user_agent: &str, chrome_executable: Option<&Path>) -> Result<Self, FetchError> {
        let profile_dir =
            std::env::temp_dir().join(format!("sitesage-chrome-{}", uuid::Uuid::new_v4()));
        Self::launch_in(profile_dir, user_agent, chrome_executable).await
    }

    async fn launch_in(
        profile_dir: PathBuf,
        user_agent: &str,
        chrome_executable: Option<&Path>,
    ) -> Result<Self, FetchError> {
        let mut builder = BrowserConfig::builder()
            .new_headless_mode()
            .user_data_dir(&profile_dir)
            .args(vec![
                "--no-sandbox".to_string(),
                "--disable-gpu".to_string(),
                "--disable-dev-shm-usage".to_string(),
                format!("--user-agent={}", user_agent),
            ]);
        if let Some(path) = chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(FetchError::Browser)?;

        let (browser, mut handler) = match Browser::launch(config).await {
            Ok(pair) => pair,
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&profile_dir).await;
                return Err(FetchError::Browser(format!("failed to launch browser: {}", e)));
            }
        };

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser: Some(browser),
            handler,
            profile_dir,
        })
    }

    fn browser(&self) -> Result<&Browser, FetchError> {
        self.browser
            .as_ref()
            .ok_or_else(|| FetchError::Browser("browser session already closed".to_string()))
    }

    async fn close(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                tracing::debug!("[RENDER] Browser close failed: {}", e);
            }
            if let Err(e) = browser.wait().await {
                tracing::debug!("[RENDER] Browser wait failed: {}", e);
            }
        }
        self.handler.abort();
        if let Err(e) = tokio::fs::remove_dir_all(&self.profile_dir).await {
            tracing::debug!(
                "[RENDER] Could not remove profile {}: {}",
                self.profile_dir.display(),
                e
            );
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
        if self.browser.take().is_some() {
            let _ = std::fs::remove_dir_all(&self.profile_dir);
        }
    }
}

/// Wait until the main frame's current document reports the network as
/// settled. Events from earlier documents (the blank page) are ignored.
/// Returns `false` if the stream ends first.
async fn wait_for_network_settled<S>(events: &mut S, main_frame: Option<&FrameId>) -> bool
where
    S: Stream<Item = Arc<EventLifecycleEvent>> + Unpin,
{
    let mut document = None;
    while let Some(event) = events.next().await {
        if main_frame.is_some_and(|frame| *frame != event.frame_id) {
            continue;
        }
        match event.name.as_str() {
            DOCUMENT_INIT => document = Some(event.loader_id.clone()),
            NETWORK_SETTLED if document.as_ref() == Some(&event.loader_id) => return true,
            _ => {}
        }
    }
    false
}

fn map_cdp_error(url: &Url, err: CdpError, timeout: Duration) -> FetchError {
    let message = err.to_string();
    if matches!(err, CdpError::Timeout) {
        return FetchError::RenderTimeout {
            url: url.to_string(),
            seconds: timeout.as_secs(),
        };
    }

    const UNREACHABLE: [&str; 5] = [
        "ERR_NAME_NOT_RESOLVED",
        "ERR_CONNECTION_REFUSED",
        "ERR_ADDRESS_UNREACHABLE",
        "ERR_INTERNET_DISCONNECTED",
        "ERR_CONNECTION_RESET",
    ];
    if UNREACHABLE.iter().any(|code| message.contains(code)) {
        FetchError::Unreachable {
            url: url.to_string(),
            message,
        }
    } else if message.contains("ERR_TIMED_OUT") || message.contains("ERR_CONNECTION_TIMED_OUT") {
        FetchError::Timeout {
            url: url.to_string(),
            seconds: timeout.as_secs(),
        }
    } else {
        FetchError::Browser(message)
    }
}
