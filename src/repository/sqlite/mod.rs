use chrono::{DateTime, Utc};

use crate::domain::models::{AuditStatus, InsightSource};

mod audit_repository;

pub use audit_repository::AuditRepository;

pub fn map_audit_status(s: &str) -> AuditStatus {
    match s {
        "pending" => AuditStatus::Pending,
        "completed" => AuditStatus::Completed,
        "failed" => AuditStatus::Failed,
        _ => AuditStatus::Failed,
    }
}

pub fn map_insight_source(s: &str) -> InsightSource {
    match s {
        "generated" => InsightSource::Generated,
        _ => InsightSource::Fallback,
    }
}

pub fn insight_source_str(source: InsightSource) -> &'static str {
    match source {
        InsightSource::Generated => "generated",
        InsightSource::Fallback => "fallback",
    }
}

pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
