//! Domain entities shared by the fetch → score → audit pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ValidationError};

// ====== Enums ======

/// Fetch strategy tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CrawlerMode {
    /// Plain HTTP fetch + HTML parse
    #[default]
    #[serde(rename = "standard", alias = "static")]
    Static,
    /// Headless browser, post-JavaScript DOM
    #[serde(rename = "js", alias = "rendered")]
    Rendered,
}

impl CrawlerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlerMode::Static => "standard",
            CrawlerMode::Rendered => "js",
        }
    }
}

impl fmt::Display for CrawlerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrawlerMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "static" => Ok(CrawlerMode::Static),
            "js" | "rendered" => Ok(CrawlerMode::Rendered),
            other => Err(ValidationError::InvalidMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Pending,
    Completed,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pending => "pending",
            AuditStatus::Completed => "completed",
            AuditStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightSource {
    Generated,
    Fallback,
}

// ====== Page signals ======

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub src: String,
    pub alt: Option<String>,
}

/// Raw extraction output, before timing is attached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContent {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1_tags: Vec<String>,
    pub h2_tags: Vec<String>,
    pub images: Vec<ImageInfo>,
    pub internal_links: u32,
    pub external_links: u32,
}

/// Structural facts about one fetched page. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSignals {
    url: String,
    title: Option<String>,
    meta_description: Option<String>,
    h1_tags: Vec<String>,
    h2_tags: Vec<String>,
    images: Vec<ImageInfo>,
    images_total: u32,
    images_without_alt: u32,
    internal_links: u32,
    external_links: u32,
    page_load_time_ms: u64,
}

impl PageSignals {
    /// Image counters are derived here so `images_total == images.len()`
    /// always holds.
    pub fn new(url: impl Into<String>, content: PageContent, page_load_time_ms: u64) -> Self {
        let images: Vec<ImageInfo> = content
            .images
            .into_iter()
            .map(|img| ImageInfo {
                src: img.src,
                alt: img.alt.filter(|a| !a.trim().is_empty()),
            })
            .collect();
        let images_without_alt = images.iter().filter(|img| img.alt.is_none()).count() as u32;

        Self {
            url: url.into(),
            title: content.title.filter(|t| !t.is_empty()),
            meta_description: content.meta_description.filter(|d| !d.is_empty()),
            h1_tags: content.h1_tags,
            h2_tags: content.h2_tags,
            images_total: images.len() as u32,
            images,
            images_without_alt,
            internal_links: content.internal_links,
            external_links: content.external_links,
            page_load_time_ms,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn meta_description(&self) -> Option<&str> {
        self.meta_description.as_deref()
    }

    pub fn h1_tags(&self) -> &[String] {
        &self.h1_tags
    }

    pub fn h2_tags(&self) -> &[String] {
        &self.h2_tags
    }

    pub fn images(&self) -> &[ImageInfo] {
        &self.images
    }

    pub fn images_total(&self) -> u32 {
        self.images_total
    }

    pub fn images_without_alt(&self) -> u32 {
        self.images_without_alt
    }

    pub fn internal_links(&self) -> u32 {
        self.internal_links
    }

    pub fn external_links(&self) -> u32 {
        self.external_links
    }

    pub fn page_load_time_ms(&self) -> u64 {
        self.page_load_time_ms
    }
}

// ====== Scoring ======

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResult {
    pub score: u32,
    pub max_score: u32,
    pub issues: Vec<String>,
}

impl RuleResult {
    pub fn new(score: u32, max_score: u32, issues: Vec<String>) -> Self {
        Self {
            score,
            max_score,
            issues,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    pub seo_score: u8,
    pub max_score: u8,
    pub issues: Vec<String>,
    pub rule_results: BTreeMap<String, RuleResult>,
}

impl ScoreResult {
    /// Re-check the invariants the analyzer promises. A violation is a bug
    /// in a rule, never a property of the page.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.seo_score > self.max_score {
            return Err(AppError::scoring(format!(
                "seo score {} exceeds maximum {}",
                self.seo_score, self.max_score
            )));
        }
        for (name, rule) in &self.rule_results {
            if rule.max_score == 0 {
                return Err(AppError::scoring(format!("rule '{}' has no weight", name)));
            }
            if rule.score > rule.max_score {
                return Err(AppError::scoring(format!(
                    "rule '{}' scored {} of {}",
                    name, rule.score, rule.max_score
                )));
            }
        }
        Ok(())
    }
}

// ====== Audit lifecycle ======

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeInsight {
    pub summary: String,
    pub suggestions: Vec<String>,
    pub source: InsightSource,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: String,
    pub owner_id: String,
    pub url: String,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub signals: Option<PageSignals>,
    pub score: Option<ScoreResult>,
    pub insight: Option<NarrativeInsight>,
    pub report_url: Option<String>,
}

impl AuditRecord {
    /// Fresh record for an audit that has just started.
    pub fn pending(owner_id: &str, url: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            url: url.to_string(),
            status: AuditStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
            signals: None,
            score: None,
            insight: None,
            report_url: None,
        }
    }
}

/// Lightweight row for audit listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub id: String,
    pub url: String,
    pub status: AuditStatus,
    pub seo_score: Option<u8>,
    pub created_at: DateTime<Utc>,
}

// ====== Batch boundary ======

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRequest {
    pub urls: Vec<String>,
    pub crawler_mode: CrawlerMode,
    #[serde(default)]
    pub generate_pdf: bool,
    #[serde(default)]
    pub custom_prompt: Option<String>,
}

/// Outcome of one URL within a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum BatchItem {
    Completed(Box<AuditRecord>),
    #[serde(rename_all = "camelCase")]
    Failed {
        url: String,
        audit_id: Option<String>,
        error_message: String,
    },
}

impl BatchItem {
    pub fn url(&self) -> &str {
        match self {
            BatchItem::Completed(record) => &record.url,
            BatchItem::Failed { url, .. } => url,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, BatchItem::Completed(_))
    }
}
