//! Narrative insights: a short summary plus improvement suggestions for one
//! scored page, generated by Google Gemini with a deterministic fallback.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use rquest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::AppConfig;
use crate::domain::models::{InsightSource, NarrativeInsight};
use crate::error::NarrativeError;
use crate::service::http::{create_client, ClientType};

const FALLBACK_SUGGESTION_LIMIT: usize = 5;

/// Everything the generator is allowed to see about an audit.
#[derive(Debug, Clone, PartialEq)]
pub struct InsightRequest {
    pub url: String,
    pub seo_score: u8,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub issues: Vec<String>,
    pub custom_prompt: Option<String>,
}

#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(&self, request: &InsightRequest) -> Result<NarrativeInsight, NarrativeError>;

    fn name(&self) -> &'static str;
}

// ============================================================================
// GEMINI
// ============================================================================

pub struct GeminiInsights {
    client: Client,
    api_key: Option<String>,
    model: String,
    api_base: String,
    timeout: Duration,
}

impl GeminiInsights {
    pub fn new(
        api_key: Option<String>,
        model: &str,
        api_base: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: create_client(ClientType::Standard, timeout)?,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Self::new(
            config.gemini_api_key.clone(),
            &config.gemini_model,
            &config.gemini_api_base,
            config.insights_timeout(),
        )
    }

    async fn request_text(&self, api_key: &str, prompt: &str) -> Result<String, NarrativeError> {
        // Key goes in a header: transport errors echo the URL.
        let api_url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        );

        let request_body = json!({
            "contents": [{
                "parts": [{
                    "text": prompt
                }]
            }]
        });

        let response = self
            .client
            .post(&api_url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", api_key)
            .body(request_body.to_string())
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NarrativeError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| NarrativeError::Malformed(format!("response is not JSON: {}", e)))?;

        response_json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| NarrativeError::Malformed("no text in Gemini response".to_string()))
    }

    fn map_transport(&self, err: rquest::Error) -> NarrativeError {
        if err.is_timeout() {
            NarrativeError::Timeout(self.timeout.as_secs())
        } else {
            NarrativeError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl NarrativeGenerator for GeminiInsights {
    async fn generate(&self, request: &InsightRequest) -> Result<NarrativeInsight, NarrativeError> {
        let api_key = self.api_key.as_deref().ok_or(NarrativeError::MissingApiKey)?;

        tracing::info!("[INSIGHTS] Requesting narrative for {} from {}", request.url, self.model);
        let prompt = build_prompt(request);

        let text = tokio::time::timeout(self.timeout, self.request_text(api_key, &prompt))
            .await
            .map_err(|_| NarrativeError::Timeout(self.timeout.as_secs()))??;

        let (summary, suggestions) = parse_response(&text)?;
        tracing::debug!(
            "[INSIGHTS] Got {} suggestions for {}",
            suggestions.len(),
            request.url
        );

        Ok(NarrativeInsight {
            summary,
            suggestions,
            source: InsightSource::Generated,
        })
    }

    fn name(&self) -> &'static str {
        "Gemini"
    }
}

pub fn build_prompt(request: &InsightRequest) -> String {
    let issues = if request.issues.is_empty() {
        "None".to_string()
    } else {
        request.issues.join(", ")
    };
    let additional = match request.custom_prompt.as_deref().map(str::trim) {
        Some(extra) if !extra.is_empty() => format!("\nAdditional Instructions: {}\n", extra),
        _ => String::new(),
    };

    format!(
        r#"You are an SEO expert analyzing a website. Based on the following data, provide:
1. A 2-3 paragraph summary of the website's SEO quality
2. 3-5 specific, actionable improvement suggestions

Website URL: {url}
SEO Score: {score}/100
Title: {title}
Meta Description: {meta}
Issues Found: {issues}

{additional}

Provide your response in JSON format:
{{
  "summary": "...",
  "suggestions": ["...", "...", "..."]
}}"#,
        url = request.url,
        score = request.seo_score,
        title = request.title.as_deref().unwrap_or("Not found"),
        meta = request.meta_description.as_deref().unwrap_or("Not found"),
        issues = issues,
        additional = additional,
    )
}

#[derive(Deserialize)]
struct RawInsight {
    summary: Option<String>,
    suggestions: Option<serde_json::Value>,
}

fn json_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```json\s*([\s\S]*?)\s*```").expect("static regex must compile"))
}

/// Accepts bare JSON or JSON inside a ```json fence.
pub fn parse_response(text: &str) -> Result<(String, Vec<String>), NarrativeError> {
    let json_text = json_fence()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
        .trim();

    let raw: RawInsight = serde_json::from_str(json_text)
        .map_err(|e| NarrativeError::Malformed(format!("invalid JSON: {}", e)))?;

    let summary = raw
        .summary
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| NarrativeError::Malformed("missing summary".to_string()))?;

    let suggestions = match raw.suggestions {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        _ => return Err(NarrativeError::Malformed("suggestions is not an array".to_string())),
    };

    Ok((summary, suggestions))
}

// ============================================================================
// FALLBACK
// ============================================================================

const SUMMARY_STRONG: &str = "Your website demonstrates strong SEO fundamentals with a high overall score. The site is well-optimized for search engines with proper meta tags and content structure. Continue monitoring performance and staying updated with SEO best practices to maintain your rankings.";
const SUMMARY_DECENT: &str = "Your website has a decent SEO foundation but there's room for improvement. Several key areas need attention to boost search engine visibility. Addressing the identified issues will help improve your rankings and organic traffic.";
const SUMMARY_WEAK: &str = "Your website needs significant SEO improvements. Multiple critical issues are affecting search engine visibility and user experience. Prioritize fixing the most impactful problems first, starting with meta tags and page performance.";

const GENERIC_SUGGESTIONS: [&str; 3] = [
    "Continue monitoring your SEO performance regularly",
    "Keep content fresh and updated",
    "Build quality backlinks from reputable sources",
];

/// Offline narrative derived only from the score and issue list.
pub fn fallback_insights(seo_score: u8, issues: &[String]) -> NarrativeInsight {
    let summary = if seo_score >= 80 {
        SUMMARY_STRONG
    } else if seo_score >= 60 {
        SUMMARY_DECENT
    } else {
        SUMMARY_WEAK
    };

    let mut suggestions: Vec<String> = issues
        .iter()
        .take(FALLBACK_SUGGESTION_LIMIT)
        .map(|issue| format!("Fix: {}", issue))
        .collect();
    if suggestions.is_empty() {
        suggestions = GENERIC_SUGGESTIONS.iter().map(|s| s.to_string()).collect();
    }

    NarrativeInsight {
        summary: summary.to_string(),
        suggestions,
        source: InsightSource::Fallback,
    }
}
