pub mod sqlite;

use async_trait::async_trait;

use crate::domain::models::*;
use crate::error::PersistenceError;

type Result<T> = std::result::Result<T, PersistenceError>;

/// Storage for audit records and their stage outputs.
///
/// Status transitions only apply to records that are still `pending`;
/// a terminal record is never re-opened.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn create_audit(&self, owner_id: &str, url: &str) -> Result<AuditRecord>;
    async fn save_metrics(&self, audit_id: &str, signals: &PageSignals, score: &ScoreResult) -> Result<()>;
    async fn save_insight(&self, audit_id: &str, insight: &NarrativeInsight) -> Result<()>;
    async fn save_report(&self, audit_id: &str, report_url: &str) -> Result<()>;
    async fn mark_completed(&self, audit_id: &str) -> Result<()>;
    async fn mark_failed(&self, audit_id: &str, message: &str) -> Result<()>;
    async fn get_audit(&self, owner_id: &str, audit_id: &str) -> Result<AuditRecord>;
    async fn list_audits(&self, owner_id: &str, limit: u32, offset: u32) -> Result<Vec<AuditSummary>>;
}
