//! Shared test helpers: fixtures, fakes for the injected services, HTML and
//! Gemini mocks, and assertion macros.

pub mod fixtures {
    use std::str::FromStr;

    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use sqlx::SqlitePool;

    use crate::domain::models::{ImageInfo, PageContent, PageSignals};

    /// Creates an in-memory SQLite database with migrations applied
    pub async fn setup_test_db() -> SqlitePool {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .expect("valid memory url")
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

    /// Builder for `PageSignals` with everything empty by default.
    #[derive(Debug, Clone)]
    pub struct SignalsBuilder {
        url: String,
        content: PageContent,
        load_ms: u64,
    }

    impl Default for SignalsBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl SignalsBuilder {
        pub fn new() -> Self {
            Self {
                url: "https://example.com/".to_string(),
                content: PageContent::default(),
                load_ms: 0,
            }
        }

        /// A page that passes every default rule.
        pub fn optimal() -> Self {
            Self::new()
                .title("Optimal Page Title For Testing The SiteSage Rule Engine")
                .meta(&"d".repeat(155))
                .h1(&["Main heading"])
                .h2(&["Section"])
                .links(3, 1)
                .load_ms(1500)
        }

        pub fn url(mut self, url: &str) -> Self {
            self.url = url.to_string();
            self
        }

        pub fn title(mut self, title: &str) -> Self {
            self.content.title = Some(title.to_string());
            self
        }

        pub fn meta(mut self, meta: &str) -> Self {
            self.content.meta_description = Some(meta.to_string());
            self
        }

        pub fn h1(mut self, tags: &[&str]) -> Self {
            self.content.h1_tags = tags.iter().map(|t| t.to_string()).collect();
            self
        }

        pub fn h2(mut self, tags: &[&str]) -> Self {
            self.content.h2_tags = tags.iter().map(|t| t.to_string()).collect();
            self
        }

        /// `total` images of which the last `without_alt` have no alt text.
        pub fn images(mut self, total: u32, without_alt: u32) -> Self {
            self.content.images = (0..total)
                .map(|i| ImageInfo {
                    src: format!("/img/{}.png", i),
                    alt: (i < total - without_alt.min(total)).then(|| format!("Image {}", i)),
                })
                .collect();
            self
        }

        pub fn links(mut self, internal: u32, external: u32) -> Self {
            self.content.internal_links = internal;
            self.content.external_links = external;
            self
        }

        pub fn load_ms(mut self, ms: u64) -> Self {
            self.load_ms = ms;
            self
        }

        pub fn build(self) -> PageSignals {
            PageSignals::new(self.url, self.content, self.load_ms)
        }
    }

    pub fn optimal_signals() -> PageSignals {
        SignalsBuilder::optimal().build()
    }

    /// Fails every rule: nothing present, 10 images without alt, 6s load.
    pub fn poor_signals() -> PageSignals {
        SignalsBuilder::new()
            .url("https://poor.example.com/")
            .images(10, 10)
            .load_ms(6000)
            .build()
    }
}

pub mod fakes {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use url::Url;

    use crate::domain::models::{InsightSource, NarrativeInsight, PageSignals};
    use crate::error::{FetchError, NarrativeError, ReportError};
    use crate::service::fetcher::PageFetcher;
    use crate::service::insights::{InsightRequest, NarrativeGenerator};
    use crate::service::report::{ReportData, ReportRenderer};

    /// Serves canned signals by URL; anything else is unreachable.
    #[derive(Default)]
    pub struct FakeFetcher {
        pages: HashMap<String, PageSignals>,
    }

    impl FakeFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn page(mut self, url: &str, signals: PageSignals) -> Self {
            self.pages.insert(url.to_string(), signals);
            self
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &Url) -> Result<PageSignals, FetchError> {
            self.pages
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| FetchError::Unreachable {
                    url: url.to_string(),
                    message: "connection refused".to_string(),
                })
        }

        fn name(&self) -> &'static str {
            "Fake"
        }
    }

    pub struct FakeNarrator {
        summary: Option<String>,
        prompts: Arc<Mutex<Vec<Option<String>>>>,
    }

    impl FakeNarrator {
        pub fn succeeding(summary: &str) -> Self {
            Self {
                summary: Some(summary.to_string()),
                prompts: Arc::default(),
            }
        }

        pub fn failing() -> Self {
            Self {
                summary: None,
                prompts: Arc::default(),
            }
        }

        /// Custom prompts seen so far.
        pub fn prompts(&self) -> Arc<Mutex<Vec<Option<String>>>> {
            self.prompts.clone()
        }
    }

    #[async_trait]
    impl NarrativeGenerator for FakeNarrator {
        async fn generate(&self, request: &InsightRequest) -> Result<NarrativeInsight, NarrativeError> {
            self.prompts
                .lock()
                .unwrap()
                .push(request.custom_prompt.clone());
            match &self.summary {
                Some(summary) => Ok(NarrativeInsight {
                    summary: summary.clone(),
                    suggestions: vec!["Do the thing".to_string()],
                    source: InsightSource::Generated,
                }),
                None => Err(NarrativeError::Upstream {
                    status: 503,
                    body: "unavailable".to_string(),
                }),
            }
        }

        fn name(&self) -> &'static str {
            "Fake"
        }
    }

    /// Records audit ids instead of writing files.
    #[derive(Default)]
    pub struct RecordingRenderer {
        rendered: Mutex<Vec<String>>,
    }

    impl RecordingRenderer {
        pub fn rendered(&self) -> Vec<String> {
            self.rendered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReportRenderer for RecordingRenderer {
        async fn render(&self, audit_id: &str, _data: &ReportData) -> Result<String, ReportError> {
            self.rendered.lock().unwrap().push(audit_id.to_string());
            Ok(format!("/reports/{}.pdf", audit_id))
        }
    }

    pub struct FailingRenderer;

    #[async_trait]
    impl ReportRenderer for FailingRenderer {
        async fn render(&self, _audit_id: &str, _data: &ReportData) -> Result<String, ReportError> {
            Err(ReportError::Io(std::io::Error::other("disk full")))
        }
    }
}

/// Helper assertions for tests
pub mod assertions {
    /// Checks if any issue contains `needle`
    pub fn has_issue(issues: &[String], needle: &str) -> bool {
        issues.iter().any(|i| i.contains(needle))
    }

    /// Asserts that an issue list mentions `needle`
    #[macro_export]
    macro_rules! assert_has_issue {
        ($issues:expr, $needle:expr) => {
            assert!(
                $crate::test_utils::assertions::has_issue($issues, $needle),
                "Expected to find issue '{}' in {:?}",
                $needle,
                $issues
            );
        };
    }

    /// Asserts that no issue mentions `needle`
    #[macro_export]
    macro_rules! assert_no_issue {
        ($issues:expr, $needle:expr) => {
            assert!(
                !$crate::test_utils::assertions::has_issue($issues, $needle),
                "Expected NOT to find issue '{}' in {:?}",
                $needle,
                $issues
            );
        };
    }
}

/// HTML and API bodies for mock servers
pub mod mocks {
    use serde_json::json;

    /// A page with every signal the extractor looks at.
    pub fn full_html_page() -> String {
        r##"
        <html>
            <head>
                <title>  Example Domain Services for Testing Pages </title>
                <meta name="description" content="A page used to exercise the extractor.">
            </head>
            <body>
                <h1>Welcome</h1>
                <h2>Services</h2>
                <h2>Pricing</h2>
                <h2>   </h2>
                <img src="/logo.png" alt="Company logo">
                <img src="/banner.png">
                <img alt="no source">
                <a href="/about">About</a>
                <a href="contact#form">Contact</a>
                <a href="https://external.example.org/">Partner</a>
                <a href="">Empty</a>
            </body>
        </html>
        "##
        .to_string()
    }

    /// Content only exists after scripts run.
    pub fn script_built_page() -> String {
        r#"
        <html>
            <head><title>Loading</title></head>
            <body>
                <div id="root"></div>
                <script>
                    const h1 = document.createElement('h1');
                    h1.textContent = 'Built by script';
                    document.getElementById('root').appendChild(h1);
                </script>
            </body>
        </html>
        "#
        .to_string()
    }

    /// Creates a mock Gemini API response body
    pub fn gemini_response(text: &str) -> String {
        json!({
            "candidates": [{
                "content": {
                    "parts": [{ "text": text }]
                }
            }]
        })
        .to_string()
    }
}
