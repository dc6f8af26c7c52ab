//! Error types for the SEO auditor.
//!
//! This module provides structured error handling with:
//! - Stage errors (`ValidationError`, `FetchError`, `NarrativeError`,
//!   `ReportError`, `PersistenceError`)
//! - `AppError`: the aggregate used across service boundaries
//! - `AuditError`: what a failed audit hands back to its caller
//! - `Result<T>`: Type alias for Results using AppError

use thiserror::Error;

// ============================================================================
// STAGE ERRORS
// ============================================================================

/// Bad input shape. Always the caller's fault.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// URL could not be parsed or uses a scheme other than http/https
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    /// Unknown crawler mode
    #[error("crawlerMode is required and must be 'standard' or 'js' (got '{0}')")]
    InvalidMode(String),

    #[error("URLs array is required and must not be empty")]
    EmptyBatch,

    #[error("Maximum {max} URLs allowed per request (got {got})")]
    BatchTooLarge { max: usize, got: usize },
}

/// Failure to turn a URL into page signals.
#[derive(Debug, Error)]
pub enum FetchError {
    /// DNS failure, refused connection and friends
    #[error("URL not found or unreachable: {url} ({message})")]
    Unreachable { url: String, message: String },

    #[error("Request timeout after {seconds}s: {url}")]
    Timeout { url: String, seconds: u64 },

    #[error("Unsupported or malformed URL: {url} ({message})")]
    ProtocolInvalid { url: String, message: String },

    #[error("Page load timeout after {seconds}s: {url}")]
    RenderTimeout { url: String, seconds: u64 },

    /// Server answered with a non-success status
    #[error("Request failed with status code {status}: {url}")]
    HttpStatus { url: String, status: u16 },

    /// Browser could not be launched or driven
    #[error("Browser error: {0}")]
    Browser(String),
}

impl FetchError {
    /// Stable reason tag, used in logs and persisted error messages.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Unreachable { .. } => "unreachable",
            Self::Timeout { .. } => "timeout",
            Self::ProtocolInvalid { .. } => "protocolInvalid",
            Self::RenderTimeout { .. } => "renderTimeout",
            Self::HttpStatus { .. } => "httpStatus",
            Self::Browser(_) => "browser",
        }
    }
}

/// Narrative generation failure. Recovered locally with the fallback.
#[derive(Debug, Error)]
pub enum NarrativeError {
    #[error("API_KEY_MISSING: Gemini API key is not configured")]
    MissingApiKey,

    #[error("Gemini API error {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Failed to parse AI response: {0}")]
    Malformed(String),

    #[error("Gemini request timed out after {0}s")]
    Timeout(u64),

    #[error("Failed to send request to Gemini API: {0}")]
    Transport(String),
}

/// Report rendering failure. Recovered locally by omitting the report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report task failed: {0}")]
    Join(String),

    #[error("PDF generation failed: {0}")]
    Pdf(String),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Failed to encode column: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Audit not found: {0}")]
    NotFound(String),
}

// ============================================================================
// DOMAIN ERROR TYPE
// ============================================================================

/// Domain-specific errors for application operations.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The rule engine produced an impossible result. Internal defect.
    #[error("Scoring error: {0}")]
    Scoring(String),

    #[error(transparent)]
    Narrative(#[from] NarrativeError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Generic error with context
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn scoring(msg: impl Into<String>) -> Self {
        Self::Scoring(msg.into())
    }

    /// Whether the caller could fix this by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Fetch(FetchError::ProtocolInvalid { .. })
        )
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        Self::Persistence(PersistenceError::Database(error))
    }
}

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;

// ============================================================================
// AUDIT ERROR
// ============================================================================

/// A mandatory audit stage failed; the record (if any) is marked failed.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AuditError {
    pub audit_id: Option<String>,
    pub url: String,
    pub message: String,
    #[source]
    pub cause: AppError,
}

impl AuditError {
    pub fn new(audit_id: Option<String>, url: &str, cause: AppError) -> Self {
        Self {
            audit_id,
            url: url.to_string(),
            message: cause.to_string(),
            cause,
        }
    }
}
