//! PDF audit reports.

pub mod document;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::AppConfig;
use crate::domain::models::{NarrativeInsight, PageSignals, ScoreResult};
use crate::error::ReportError;
use document::{FlowDocument, FontSource, Rgb, TextStyle};

/// Public path prefix for stored reports.
pub const REPORTS_ROUTE: &str = "/reports";

const BLUE: Rgb = Rgb(0x25, 0x63, 0xeb);
const GREEN: Rgb = Rgb(0x05, 0x96, 0x69);
const ORANGE: Rgb = Rgb(0xd9, 0x77, 0x06);
const RED: Rgb = Rgb(0xdc, 0x26, 0x26);
const GRAY: Rgb = Rgb(0x6b, 0x72, 0x80);
const LIGHT_GRAY: Rgb = Rgb(0x9c, 0xa3, 0xaf);
const HEADING: Rgb = Rgb(0x1f, 0x29, 0x37);
const BODY: Rgb = Rgb(0x37, 0x41, 0x51);

/// Flattened view of a finished audit, everything the report prints.
#[derive(Debug, Clone)]
pub struct ReportData {
    pub url: String,
    pub seo_score: u8,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1_count: usize,
    pub h2_count: usize,
    pub images_total: u32,
    pub images_without_alt: u32,
    pub internal_links: u32,
    pub external_links: u32,
    pub page_load_time_ms: u64,
    pub issues: Vec<String>,
    pub summary: Option<String>,
    pub suggestions: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl ReportData {
    pub fn from_audit(
        signals: &PageSignals,
        score: &ScoreResult,
        insight: Option<&NarrativeInsight>,
    ) -> Self {
        Self {
            url: signals.url().to_string(),
            seo_score: score.seo_score,
            title: signals.title().map(str::to_string),
            meta_description: signals.meta_description().map(str::to_string),
            h1_count: signals.h1_tags().len(),
            h2_count: signals.h2_tags().len(),
            images_total: signals.images_total(),
            images_without_alt: signals.images_without_alt(),
            internal_links: signals.internal_links(),
            external_links: signals.external_links(),
            page_load_time_ms: signals.page_load_time_ms(),
            issues: score.issues.clone(),
            summary: insight.map(|i| i.summary.clone()),
            suggestions: insight.map(|i| i.suggestions.clone()).unwrap_or_default(),
            generated_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait ReportRenderer: Send + Sync {
    /// Render the report for `audit_id` and return its stable reference.
    async fn render(&self, audit_id: &str, data: &ReportData) -> Result<String, ReportError>;
}

/// Writes `<reports_dir>/<audit_id>.pdf`.
pub struct PdfReportRenderer {
    reports_dir: PathBuf,
    fonts: FontSource,
}

impl PdfReportRenderer {
    /// Uses the first installed system font, or Helvetica when none is found.
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
            fonts: FontSource::discover(None),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            reports_dir: config.reports_dir.clone(),
            fonts: FontSource::discover(config.report_font.as_deref()),
        }
    }

    pub fn with_fonts(mut self, fonts: FontSource) -> Self {
        self.fonts = fonts;
        self
    }

    pub fn report_path(&self, audit_id: &str) -> PathBuf {
        self.reports_dir.join(format!("{}.pdf", audit_id))
    }
}

#[async_trait]
impl ReportRenderer for PdfReportRenderer {
    async fn render(&self, audit_id: &str, data: &ReportData) -> Result<String, ReportError> {
        let data = data.clone();
        let fonts = self.fonts.clone();
        let bytes = tokio::task::spawn_blocking(move || layout(&data).render(&fonts))
            .await
            .map_err(|e| ReportError::Join(e.to_string()))??;

        tokio::fs::create_dir_all(&self.reports_dir).await?;
        let path = self.report_path(audit_id);
        tokio::fs::write(&path, &bytes).await?;

        tracing::info!("[REPORT] Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(format!("{}/{}.pdf", REPORTS_ROUTE, audit_id))
    }
}

fn score_color(score: u8) -> Rgb {
    if score >= 80 {
        GREEN
    } else if score >= 60 {
        ORANGE
    } else {
        RED
    }
}

fn section(doc: &mut FlowDocument, title: &str) {
    doc.text(title, TextStyle::new(14.0).bold().color(HEADING));
    doc.space(6.0);
}

/// Build the report's sections in print order.
pub fn layout(data: &ReportData) -> FlowDocument {
    let mut doc = FlowDocument::new("SiteSage SEO Report");

    doc.text("SiteSage SEO Report", TextStyle::new(24.0).bold().color(BLUE).centered());
    doc.space(12.0);
    doc.text(
        &format!("Generated: {}", data.generated_at.format("%Y-%m-%d %H:%M:%S UTC")),
        TextStyle::new(10.0).color(GRAY).centered(),
    );
    doc.space(24.0);

    doc.text(&format!("URL: {}", data.url), TextStyle::new(12.0));
    doc.space(6.0);
    doc.text(
        &format!("SEO Score: {}/100", data.seo_score),
        TextStyle::new(16.0).bold().color(score_color(data.seo_score)),
    );
    doc.space(24.0);

    if let Some(summary) = data.summary.as_deref().filter(|s| !s.is_empty()) {
        section(&mut doc, "Summary");
        doc.text(summary, TextStyle::new(10.0).color(BODY));
        doc.space(24.0);
    }

    section(&mut doc, "SEO Metrics");
    let metrics = [
        ("Title", data.title.clone().unwrap_or_else(|| "Not found".to_string())),
        (
            "Meta Description",
            data.meta_description
                .clone()
                .unwrap_or_else(|| "Not found".to_string()),
        ),
        ("H1 Tags", data.h1_count.to_string()),
        ("H2 Tags", data.h2_count.to_string()),
        ("Total Images", data.images_total.to_string()),
        ("Images Without Alt", data.images_without_alt.to_string()),
        ("Internal Links", data.internal_links.to_string()),
        ("External Links", data.external_links.to_string()),
        ("Page Load Time", format!("{}ms", data.page_load_time_ms)),
    ];
    for (label, value) in &metrics {
        doc.text(&format!("{}: {}", label, value), TextStyle::new(10.0));
    }
    doc.space(24.0);

    if !data.issues.is_empty() {
        section(&mut doc, "Issues Found");
        for (i, issue) in data.issues.iter().enumerate() {
            doc.text(&format!("{}. {}", i + 1, issue), TextStyle::new(10.0).color(RED));
        }
        doc.space(24.0);
    }

    if !data.suggestions.is_empty() {
        section(&mut doc, "Recommendations");
        for (i, suggestion) in data.suggestions.iter().enumerate() {
            doc.text(
                &format!("{}. {}", i + 1, suggestion),
                TextStyle::new(10.0).color(GREEN),
            );
        }
    }

    doc.space(36.0);
    doc.text("Powered by SiteSage", TextStyle::new(8.0).color(LIGHT_GRAY).centered());

    doc
}
