//! Audit orchestration.
//!
//! One audit runs these stages in order:
//! 1. Create the pending record
//! 2. Fetch the page (mandatory)
//! 3. Score and validate (mandatory)
//! 4. Persist metrics (mandatory)
//! 5. Narrative insights (optional, falls back offline)
//! 6. PDF report (optional, only when requested)
//! 7. Mark completed
//!
//! A mandatory stage failure marks the record `failed` and returns an
//! `AuditError`. Optional stage failures are logged and skipped.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::config::AppConfig;
use crate::domain::models::{
    AuditRecord, AuditRequest, AuditStatus, AuditSummary, BatchItem, CrawlerMode, NarrativeInsight,
    PageSignals, ScoreResult,
};
use crate::error::{AppError, AuditError, ValidationError};
use crate::repository::AuditStore;
use crate::service::analyzer::SeoAnalyzer;
use crate::service::fetcher::{parse_target, DocumentFetcher};
use crate::service::insights::{fallback_insights, InsightRequest, NarrativeGenerator};
use crate::service::report::{ReportData, ReportRenderer};

pub const DEFAULT_LIST_LIMIT: u32 = 10;

pub struct AuditService {
    fetcher: DocumentFetcher,
    analyzer: SeoAnalyzer,
    store: Arc<dyn AuditStore>,
    narrator: Arc<dyn NarrativeGenerator>,
    renderer: Arc<dyn ReportRenderer>,
    max_batch_urls: usize,
    max_concurrent_audits: usize,
}

impl AuditService {
    pub fn new(
        fetcher: DocumentFetcher,
        analyzer: SeoAnalyzer,
        store: Arc<dyn AuditStore>,
        narrator: Arc<dyn NarrativeGenerator>,
        renderer: Arc<dyn ReportRenderer>,
    ) -> Self {
        let defaults = AppConfig::default();
        Self {
            fetcher,
            analyzer,
            store,
            narrator,
            renderer,
            max_batch_urls: defaults.max_batch_urls,
            max_concurrent_audits: defaults.max_concurrent_audits,
        }
    }

    pub fn with_limits(mut self, max_batch_urls: usize, max_concurrent_audits: usize) -> Self {
        self.max_batch_urls = max_batch_urls.max(1);
        self.max_concurrent_audits = max_concurrent_audits.max(1);
        self
    }

    // ========================================================================
    // SINGLE AUDIT
    // ========================================================================

    pub async fn process_audit(
        &self,
        owner_id: &str,
        url: &str,
        mode: CrawlerMode,
        want_pdf: bool,
        custom_prompt: Option<&str>,
    ) -> Result<AuditRecord, AuditError> {
        let mut record = self
            .store
            .create_audit(owner_id, url)
            .await
            .map_err(|e| AuditError::new(None, url, e.into()))?;
        tracing::info!("[AUDIT] {} started for {} ({})", record.id, url, mode);

        let signals = match self.fetcher.fetch(url, mode).await {
            Ok(signals) => signals,
            Err(e) => return Err(self.fail(&record, e.into()).await),
        };

        let score = self.analyzer.analyze(&signals);
        if let Err(e) = score.validate() {
            return Err(self.fail(&record, e).await);
        }
        tracing::info!(
            "[AUDIT] {} scored {}/{} with {} issue(s)",
            record.id,
            score.seo_score,
            score.max_score,
            score.issues.len()
        );

        if let Err(e) = self.store.save_metrics(&record.id, &signals, &score).await {
            return Err(self.fail(&record, e.into()).await);
        }

        let insight = self
            .narrative(&record.id, &signals, &score, custom_prompt)
            .await;
        if let Err(e) = self.store.save_insight(&record.id, &insight).await {
            tracing::warn!("[AUDIT] {} could not store insights: {}", record.id, e);
        }

        let report_url = if want_pdf {
            self.report(&record.id, &signals, &score, &insight).await
        } else {
            None
        };

        if let Err(e) = self.store.mark_completed(&record.id).await {
            return Err(self.fail(&record, e.into()).await);
        }

        record.status = AuditStatus::Completed;
        record.updated_at = Utc::now();
        record.signals = Some(signals);
        record.score = Some(score);
        record.insight = Some(insight);
        record.report_url = report_url;

        tracing::info!("[AUDIT] {} completed", record.id);
        Ok(record)
    }

    async fn narrative(
        &self,
        audit_id: &str,
        signals: &PageSignals,
        score: &ScoreResult,
        custom_prompt: Option<&str>,
    ) -> NarrativeInsight {
        let request = InsightRequest {
            url: signals.url().to_string(),
            seo_score: score.seo_score,
            title: signals.title().map(str::to_string),
            meta_description: signals.meta_description().map(str::to_string),
            issues: score.issues.clone(),
            custom_prompt: custom_prompt.map(str::to_string),
        };

        match self.narrator.generate(&request).await {
            Ok(insight) => insight,
            Err(e) => {
                tracing::warn!(
                    "[INSIGHTS] {} falling back to offline insights: {}",
                    audit_id,
                    e
                );
                fallback_insights(score.seo_score, &score.issues)
            }
        }
    }

    async fn report(
        &self,
        audit_id: &str,
        signals: &PageSignals,
        score: &ScoreResult,
        insight: &NarrativeInsight,
    ) -> Option<String> {
        let data = ReportData::from_audit(signals, score, Some(insight));
        let reference = match self.renderer.render(audit_id, &data).await {
            Ok(reference) => reference,
            Err(e) => {
                tracing::warn!("[REPORT] {} report generation failed: {}", audit_id, e);
                return None;
            }
        };

        match self.store.save_report(audit_id, &reference).await {
            Ok(()) => Some(reference),
            Err(e) => {
                tracing::warn!("[REPORT] {} could not store report reference: {}", audit_id, e);
                None
            }
        }
    }

    /// Mark the record failed and build the error for the caller.
    async fn fail(&self, record: &AuditRecord, cause: AppError) -> AuditError {
        let error = AuditError::new(Some(record.id.clone()), &record.url, cause);
        tracing::error!("[AUDIT] {} failed: {}", record.id, error.message);

        if let Err(e) = self.store.mark_failed(&record.id, &error.message).await {
            tracing::error!("[AUDIT] {} could not be marked failed: {}", record.id, e);
        }
        error
    }

    // ========================================================================
    // BATCH
    // ========================================================================

    /// Check the batch shape before any audit starts.
    pub fn validate_request(&self, request: &AuditRequest) -> Result<(), ValidationError> {
        if request.urls.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        if request.urls.len() > self.max_batch_urls {
            return Err(ValidationError::BatchTooLarge {
                max: self.max_batch_urls,
                got: request.urls.len(),
            });
        }
        for url in &request.urls {
            parse_target(url).map_err(|_| ValidationError::InvalidUrl(url.clone()))?;
        }
        Ok(())
    }

    /// Audit every URL independently. Output order matches input order.
    pub async fn process_batch(
        &self,
        owner_id: &str,
        request: &AuditRequest,
    ) -> Result<Vec<BatchItem>, ValidationError> {
        self.validate_request(request)?;
        tracing::info!(
            "[AUDIT] Batch of {} URL(s) in {} mode",
            request.urls.len(),
            request.crawler_mode
        );

        let custom_prompt = request.custom_prompt.as_deref();
        let items: Vec<BatchItem> = stream::iter(request.urls.iter())
            .map(|url| async move {
                match self
                    .process_audit(
                        owner_id,
                        url,
                        request.crawler_mode,
                        request.generate_pdf,
                        custom_prompt,
                    )
                    .await
                {
                    Ok(record) => BatchItem::Completed(Box::new(record)),
                    Err(e) => BatchItem::Failed {
                        url: url.clone(),
                        audit_id: e.audit_id,
                        error_message: e.message,
                    },
                }
            })
            .buffered(self.max_concurrent_audits)
            .collect()
            .await;

        let completed = items.iter().filter(|i| i.is_completed()).count();
        tracing::info!(
            "[AUDIT] Batch finished: {} completed, {} failed",
            completed,
            items.len() - completed
        );
        Ok(items)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub async fn get_audit(&self, owner_id: &str, audit_id: &str) -> crate::error::Result<AuditRecord> {
        Ok(self.store.get_audit(owner_id, audit_id).await?)
    }

    pub async fn list_audits(
        &self,
        owner_id: &str,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> crate::error::Result<Vec<AuditSummary>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT);
        let offset = offset.unwrap_or(0);
        Ok(self.store.list_audits(owner_id, limit, offset).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::InsightSource;
    use crate::error::FetchError;
    use crate::test_utils::fakes::{
        FailingRenderer, FakeFetcher, FakeNarrator, RecordingRenderer,
    };
    use crate::test_utils::fixtures::{self, optimal_signals, poor_signals};
    use crate::repository::sqlite::AuditRepository;

    struct Harness {
        service: AuditService,
        store: Arc<AuditRepository>,
    }

    async fn harness(
        fetcher: FakeFetcher,
        narrator: FakeNarrator,
        renderer: Arc<dyn ReportRenderer>,
    ) -> Harness {
        let store = Arc::new(AuditRepository::new(fixtures::setup_test_db().await));
        let fetcher = Arc::new(fetcher);
        let service = AuditService::new(
            DocumentFetcher::new(fetcher.clone(), fetcher),
            SeoAnalyzer::default(),
            store.clone(),
            Arc::new(narrator),
            renderer,
        );
        Harness { service, store }
    }

    #[tokio::test]
    async fn successful_audit_is_completed_and_persisted() {
        let signals = optimal_signals();
        let h = harness(
            FakeFetcher::new().page(signals.url(), signals.clone()),
            FakeNarrator::succeeding("All good"),
            Arc::new(RecordingRenderer::default()),
        )
        .await;

        let record = h
            .service
            .process_audit("owner", signals.url(), CrawlerMode::Static, false, None)
            .await
            .expect("audit should succeed");

        assert_eq!(record.status, AuditStatus::Completed);
        assert_eq!(record.score.as_ref().unwrap().seo_score, 100);
        assert_eq!(record.insight.as_ref().unwrap().source, InsightSource::Generated);
        assert!(record.report_url.is_none());

        let stored = h.store.get_audit("owner", &record.id).await.unwrap();
        assert_eq!(stored.status, AuditStatus::Completed);
        assert_eq!(stored.insight.unwrap().summary, "All good");
    }

    #[tokio::test]
    async fn narrative_failure_falls_back() {
        let signals = poor_signals();
        let h = harness(
            FakeFetcher::new().page(signals.url(), signals.clone()),
            FakeNarrator::failing(),
            Arc::new(RecordingRenderer::default()),
        )
        .await;

        let record = h
            .service
            .process_audit("owner", signals.url(), CrawlerMode::Static, false, None)
            .await
            .unwrap();

        let insight = record.insight.unwrap();
        assert_eq!(record.status, AuditStatus::Completed);
        assert_eq!(insight.source, InsightSource::Fallback);
        assert!(!insight.summary.is_empty());
        assert_eq!(insight.suggestions[0], "Fix: Missing title tag");
    }

    #[tokio::test]
    async fn fetch_failure_marks_record_failed() {
        let h = harness(
            FakeFetcher::new(),
            FakeNarrator::succeeding("unused"),
            Arc::new(RecordingRenderer::default()),
        )
        .await;

        let err = h
            .service
            .process_audit("owner", "https://down.test/", CrawlerMode::Static, false, None)
            .await
            .unwrap_err();

        assert!(matches!(err.cause, AppError::Fetch(FetchError::Unreachable { .. })));
        let audit_id = err.audit_id.expect("record should exist");
        let stored = h.store.get_audit("owner", &audit_id).await.unwrap();
        assert_eq!(stored.status, AuditStatus::Failed);
        assert!(stored.error_message.unwrap().contains("unreachable"));
    }

    #[tokio::test]
    async fn bad_scheme_fails_before_fetching() {
        let h = harness(
            FakeFetcher::new(),
            FakeNarrator::succeeding("unused"),
            Arc::new(RecordingRenderer::default()),
        )
        .await;

        let err = h
            .service
            .process_audit("owner", "ftp://files.test/", CrawlerMode::Rendered, false, None)
            .await
            .unwrap_err();
        assert!(err.cause.is_client_error());
    }

    #[tokio::test]
    async fn pdf_reference_is_recorded_when_requested() {
        let signals = optimal_signals();
        let renderer = Arc::new(RecordingRenderer::default());
        let h = harness(
            FakeFetcher::new().page(signals.url(), signals.clone()),
            FakeNarrator::succeeding("ok"),
            renderer.clone(),
        )
        .await;

        let record = h
            .service
            .process_audit("owner", signals.url(), CrawlerMode::Static, true, None)
            .await
            .unwrap();

        let expected = format!("/reports/{}.pdf", record.id);
        assert_eq!(record.report_url.as_deref(), Some(expected.as_str()));
        assert_eq!(renderer.rendered(), vec![record.id.clone()]);
        let stored = h.store.get_audit("owner", &record.id).await.unwrap();
        assert_eq!(stored.report_url, Some(expected));
    }

    #[tokio::test]
    async fn report_failure_does_not_fail_audit() {
        let signals = optimal_signals();
        let h = harness(
            FakeFetcher::new().page(signals.url(), signals.clone()),
            FakeNarrator::succeeding("ok"),
            Arc::new(FailingRenderer),
        )
        .await;

        let record = h
            .service
            .process_audit("owner", signals.url(), CrawlerMode::Static, true, None)
            .await
            .unwrap();
        assert_eq!(record.status, AuditStatus::Completed);
        assert!(record.report_url.is_none());
    }

    #[tokio::test]
    async fn custom_prompt_reaches_generator() {
        let signals = optimal_signals();
        let narrator = FakeNarrator::succeeding("ok");
        let prompts = narrator.prompts();
        let h = harness(
            FakeFetcher::new().page(signals.url(), signals.clone()),
            narrator,
            Arc::new(RecordingRenderer::default()),
        )
        .await;

        h.service
            .process_audit("owner", signals.url(), CrawlerMode::Static, false, Some("Be brief"))
            .await
            .unwrap();
        assert_eq!(*prompts.lock().unwrap(), vec![Some("Be brief".to_string())]);
    }

    fn request(urls: &[&str]) -> AuditRequest {
        AuditRequest {
            urls: urls.iter().map(|u| u.to_string()).collect(),
            crawler_mode: CrawlerMode::Static,
            generate_pdf: false,
            custom_prompt: None,
        }
    }

    #[tokio::test]
    async fn batch_validation_rejects_whole_request() {
        let h = harness(
            FakeFetcher::new(),
            FakeNarrator::failing(),
            Arc::new(RecordingRenderer::default()),
        )
        .await;

        assert_eq!(
            h.service.process_batch("owner", &request(&[])).await.unwrap_err(),
            ValidationError::EmptyBatch
        );

        let eleven: Vec<String> = (0..11).map(|i| format!("https://s{i}.test/")).collect();
        let refs: Vec<&str> = eleven.iter().map(String::as_str).collect();
        assert_eq!(
            h.service.process_batch("owner", &request(&refs)).await.unwrap_err(),
            ValidationError::BatchTooLarge { max: 10, got: 11 }
        );

        let err = h
            .service
            .process_batch("owner", &request(&["https://ok.test/", "not a url"]))
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidUrl("not a url".into()));

        let listed = h.service.list_audits("owner", None, None).await.unwrap();
        assert!(listed.is_empty(), "no audit may start when validation fails");
    }

    #[tokio::test]
    async fn batch_isolates_failures_and_keeps_order() {
        let a = fixtures::SignalsBuilder::optimal().url("https://a.test/").build();
        let c = fixtures::SignalsBuilder::new().url("https://c.test/").build();
        let h = harness(
            FakeFetcher::new().page(a.url(), a.clone()).page(c.url(), c.clone()),
            FakeNarrator::failing(),
            Arc::new(RecordingRenderer::default()),
        )
        .await;

        let items = h
            .service
            .process_batch(
                "owner",
                &request(&["https://a.test/", "https://b.test/", "https://c.test/"]),
            )
            .await
            .unwrap();

        let urls: Vec<&str> = items.iter().map(|i| i.url()).collect();
        assert_eq!(urls, ["https://a.test/", "https://b.test/", "https://c.test/"]);
        assert!(items[0].is_completed());
        assert!(!items[1].is_completed());
        assert!(items[2].is_completed());

        match &items[1] {
            BatchItem::Failed { audit_id, error_message, .. } => {
                assert!(audit_id.is_some());
                assert!(!error_message.is_empty());
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_defaults_to_ten_newest() {
        let h = harness(
            FakeFetcher::new(),
            FakeNarrator::failing(),
            Arc::new(RecordingRenderer::default()),
        )
        .await;
        for i in 0..12 {
            let _ = h
                .service
                .process_audit("owner", &format!("https://gone{i}.test/"), CrawlerMode::Static, false, None)
                .await;
        }

        let listed = h.service.list_audits("owner", None, None).await.unwrap();
        assert_eq!(listed.len(), 10);
        assert!(listed.iter().all(|a| a.status == AuditStatus::Failed));
        assert_eq!(listed[0].url, "https://gone11.test/");
    }
}
