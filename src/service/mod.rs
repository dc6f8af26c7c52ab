pub mod analyzer;
pub mod audit;
pub mod fetcher;
pub mod http;
pub mod insights;
pub mod report;

pub use analyzer::{SeoAnalyzer, SeoRule};
pub use audit::AuditService;
pub use fetcher::{DocumentFetcher, PageFetcher, RenderedFetcher, StaticFetcher};
pub use insights::{fallback_insights, GeminiInsights, InsightRequest, NarrativeGenerator};
pub use report::{PdfReportRenderer, ReportData, ReportRenderer};
