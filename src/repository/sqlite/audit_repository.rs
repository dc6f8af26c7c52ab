//! Audit repository.
//!
//! The `audits` table holds lifecycle state; `seo_metrics`, `ai_insights`
//! and `reports` hold one row per audit for each stage output. Writes to a
//! single audit are serialized through a per-record lock.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use super::{insight_source_str, map_audit_status, map_insight_source, parse_datetime};
use crate::domain::models::{
    AuditRecord, AuditStatus, AuditSummary, ImageInfo, NarrativeInsight, PageContent, PageSignals,
    ScoreResult,
};
use crate::error::PersistenceError;
use crate::repository::AuditStore;

type Result<T> = std::result::Result<T, PersistenceError>;

pub struct AuditRepository {
    pool: SqlitePool,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, audit_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(audit_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Move a pending audit to a terminal status.
    async fn finish(&self, audit_id: &str, status: AuditStatus, message: Option<&str>) -> Result<()> {
        let lock = self.lock_for(audit_id);
        let result = {
            let _guard = lock.lock().await;
            sqlx::query(
                r#"
                UPDATE audits
                SET status = ?1, error_message = ?2, updated_at = ?3
                WHERE id = ?4 AND status = 'pending'
                "#,
            )
            .bind(status.as_str())
            .bind(message)
            .bind(Utc::now().to_rfc3339())
            .bind(audit_id)
            .execute(&self.pool)
            .await
        };
        // Removed even when the update failed.
        self.locks.remove(audit_id);
        let result = result?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(format!("pending audit {}", audit_id)));
        }

        tracing::info!("Audit {} marked {}", audit_id, status);
        Ok(())
    }

    async fn touch(&self, audit_id: &str) -> Result<()> {
        sqlx::query("UPDATE audits SET updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now().to_rfc3339())
            .bind(audit_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for AuditRepository {
    async fn create_audit(&self, owner_id: &str, url: &str) -> Result<AuditRecord> {
        let record = AuditRecord::pending(owner_id, url);
        let created_at = record.created_at.to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO audits (id, owner_id, url, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, 'pending', ?4, ?5)
            "#,
        )
        .bind(&record.id)
        .bind(owner_id)
        .bind(url)
        .bind(&created_at)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        tracing::info!("Created audit {} for URL: {}", record.id, url);
        Ok(record)
    }

    async fn save_metrics(&self, audit_id: &str, signals: &PageSignals, score: &ScoreResult) -> Result<()> {
        let h1_tags = serde_json::to_string(signals.h1_tags())?;
        let h2_tags = serde_json::to_string(signals.h2_tags())?;
        let images = serde_json::to_string(signals.images())?;
        let issues = serde_json::to_string(&score.issues)?;
        let rule_results = serde_json::to_string(&score.rule_results)?;

        let lock = self.lock_for(audit_id);
        let _guard = lock.lock().await;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO seo_metrics (
                audit_id, title, meta_description, h1_tags, h2_tags, images,
                images_total, images_without_alt, internal_links, external_links,
                page_load_time_ms, seo_score, max_score, issues, rule_results, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(audit_id)
        .bind(signals.title())
        .bind(signals.meta_description())
        .bind(h1_tags)
        .bind(h2_tags)
        .bind(images)
        .bind(i64::from(signals.images_total()))
        .bind(i64::from(signals.images_without_alt()))
        .bind(i64::from(signals.internal_links()))
        .bind(i64::from(signals.external_links()))
        .bind(signals.page_load_time_ms() as i64)
        .bind(i64::from(score.seo_score))
        .bind(i64::from(score.max_score))
        .bind(issues)
        .bind(rule_results)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.touch(audit_id).await?;
        tracing::debug!("Saved metrics for audit {} (score {})", audit_id, score.seo_score);
        Ok(())
    }

    async fn save_insight(&self, audit_id: &str, insight: &NarrativeInsight) -> Result<()> {
        let suggestions = serde_json::to_string(&insight.suggestions)?;

        let lock = self.lock_for(audit_id);
        let _guard = lock.lock().await;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO ai_insights (audit_id, summary, suggestions, source, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(audit_id)
        .bind(&insight.summary)
        .bind(suggestions)
        .bind(insight_source_str(insight.source))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.touch(audit_id).await
    }

    async fn save_report(&self, audit_id: &str, report_url: &str) -> Result<()> {
        let lock = self.lock_for(audit_id);
        let _guard = lock.lock().await;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO reports (audit_id, report_url, created_at)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(audit_id)
        .bind(report_url)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.touch(audit_id).await
    }

    async fn mark_completed(&self, audit_id: &str) -> Result<()> {
        self.finish(audit_id, AuditStatus::Completed, None).await
    }

    async fn mark_failed(&self, audit_id: &str, message: &str) -> Result<()> {
        self.finish(audit_id, AuditStatus::Failed, Some(message)).await
    }

    async fn get_audit(&self, owner_id: &str, audit_id: &str) -> Result<AuditRecord> {
        let row = sqlx::query(
            r#"
            SELECT
                a.id, a.owner_id, a.url, a.status, a.error_message, a.created_at, a.updated_at,
                m.audit_id AS metrics_id, m.title, m.meta_description, m.h1_tags, m.h2_tags,
                m.images, m.internal_links, m.external_links, m.page_load_time_ms,
                m.seo_score, m.max_score, m.issues, m.rule_results,
                i.summary, i.suggestions, i.source,
                r.report_url
            FROM audits a
            LEFT JOIN seo_metrics m ON m.audit_id = a.id
            LEFT JOIN ai_insights i ON i.audit_id = a.id
            LEFT JOIN reports r ON r.audit_id = a.id
            WHERE a.id = ?1 AND a.owner_id = ?2
            "#,
        )
        .bind(audit_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| PersistenceError::NotFound(audit_id.to_string()))?;

        map_audit_row(&row)
    }

    async fn list_audits(&self, owner_id: &str, limit: u32, offset: u32) -> Result<Vec<AuditSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.url, a.status, a.created_at, m.seo_score
            FROM audits a
            LEFT JOIN seo_metrics m ON m.audit_id = a.id
            WHERE a.owner_id = ?1
            ORDER BY a.created_at DESC, a.rowid DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(owner_id)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let status: String = row.try_get("status")?;
                let created_at: String = row.try_get("created_at")?;
                let seo_score: Option<i64> = row.try_get("seo_score")?;
                Ok(AuditSummary {
                    id: row.try_get("id")?,
                    url: row.try_get("url")?,
                    status: map_audit_status(&status),
                    seo_score: seo_score.map(clamp_score),
                    created_at: parse_datetime(&created_at),
                })
            })
            .collect()
    }
}

fn clamp_score(value: i64) -> u8 {
    value.clamp(0, i64::from(u8::MAX)) as u8
}

fn decode_json<T>(raw: Option<String>) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match raw {
        Some(text) => Ok(serde_json::from_str(&text)?),
        None => Ok(T::default()),
    }
}

fn map_audit_row(row: &SqliteRow) -> Result<AuditRecord> {
    let url: String = row.try_get("url")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    let metrics_id: Option<String> = row.try_get("metrics_id")?;
    let (signals, score) = match metrics_id {
        Some(_) => {
            let images: Vec<ImageInfo> = decode_json(row.try_get("images")?)?;
            let content = PageContent {
                title: row.try_get("title")?,
                meta_description: row.try_get("meta_description")?,
                h1_tags: decode_json(row.try_get("h1_tags")?)?,
                h2_tags: decode_json(row.try_get("h2_tags")?)?,
                images,
                internal_links: row.try_get::<i64, _>("internal_links")?.max(0) as u32,
                external_links: row.try_get::<i64, _>("external_links")?.max(0) as u32,
            };
            let load_ms = row.try_get::<i64, _>("page_load_time_ms")?.max(0) as u64;
            let signals = PageSignals::new(url.clone(), content, load_ms);

            let score = ScoreResult {
                seo_score: clamp_score(row.try_get("seo_score")?),
                max_score: clamp_score(row.try_get("max_score")?),
                issues: decode_json(row.try_get("issues")?)?,
                rule_results: decode_json(row.try_get("rule_results")?)?,
            };
            (Some(signals), Some(score))
        }
        None => (None, None),
    };

    let summary: Option<String> = row.try_get("summary")?;
    let insight = match summary {
        Some(summary) => {
            let source: String = row.try_get("source")?;
            Some(NarrativeInsight {
                summary,
                suggestions: decode_json(row.try_get("suggestions")?)?,
                source: map_insight_source(&source),
            })
        }
        None => None,
    };

    Ok(AuditRecord {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        url,
        status: map_audit_status(&status),
        error_message: row.try_get("error_message")?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
        signals,
        score,
        insight,
        report_url: row.try_get("report_url")?,
    })
}
