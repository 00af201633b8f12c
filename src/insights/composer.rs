use super::client::InsightBackend;
use super::types::*;
use crate::anomaly::{derive_recommendations, manual_process_candidates, AnomalyReport, Recommendation};
use crate::config::DashboardConfig;
use crate::error::{DashboardError, Result};
use crate::projections::{department_averages, period_trend};
use crate::schema::{FinancialCloseRecord, ProcessEfficiencyRecord};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Everything the automated insights are built from.
#[derive(Debug, Clone, Copy)]
pub struct InsightContext<'a> {
    /// Filtered financial view.
    pub financial: &'a [FinancialCloseRecord],
    /// Filtered process view.
    pub process: &'a [ProcessEfficiencyRecord],
    /// Unfiltered process history used for the error-rate baseline.
    pub all_process: &'a [ProcessEfficiencyRecord],
    pub avg_close_days: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsightOutcome {
    Generated(String),
    Fallback { text: String, error: String },
}

impl InsightOutcome {
    pub fn text(&self) -> &str {
        match self {
            InsightOutcome::Generated(text) => text,
            InsightOutcome::Fallback { text, .. } => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, InsightOutcome::Fallback { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsightBatch {
    pub close_performance: InsightOutcome,
    pub automation: InsightOutcome,
    pub anomaly: InsightOutcome,
    pub recommendations: Vec<Recommendation>,
}

impl InsightBatch {
    pub fn insight_data(&self) -> InsightData {
        InsightData {
            close_performance: Some(self.close_performance.text().to_string()),
            automation: Some(self.automation.text().to_string()),
            anomaly: Some(self.anomaly.text().to_string()),
        }
    }

    pub fn errors(&self) -> Vec<String> {
        [&self.close_performance, &self.automation, &self.anomaly]
            .into_iter()
            .filter_map(|outcome| match outcome {
                InsightOutcome::Fallback { error, .. } => Some(error.clone()),
                InsightOutcome::Generated(_) => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryAdmission {
    /// Blank input; nothing happens.
    Ignored,
    TooShort,
    RateLimited,
    Accepted,
}

pub fn close_performance_request(ctx: &InsightContext<'_>) -> InsightRequest {
    InsightRequest::new(InsightPayload::ClosePerformance(ClosePerformancePayload {
        avg_close_days: format!("{:.1}", ctx.avg_close_days),
        department_data: department_averages(ctx.financial),
        trend_data: period_trend(ctx.financial, MAX_TREND_PERIODS),
    }))
}

/// `None` when there is nothing worth asking about.
pub fn automation_request(candidates: &[&ProcessEfficiencyRecord]) -> Option<InsightRequest> {
    if candidates.is_empty() {
        return None;
    }
    let manual_processes = candidates
        .iter()
        .map(|p| ManualProcess {
            process_name: p.process_name.clone(),
            error_rate: p.error_rate,
            cost: p.cost,
        })
        .collect();
    Some(InsightRequest::new(InsightPayload::Automation(
        AutomationPayload { manual_processes },
    )))
}

pub fn anomaly_request(report: &AnomalyReport) -> InsightRequest {
    InsightRequest::new(InsightPayload::Anomaly(AnomalyPayload {
        baseline: BaselineStats {
            avg_error_rate: format!("{:.2}", report.baseline_avg),
            std_dev: format!("{:.2}", report.baseline_std_dev),
        },
        current_month: CurrentMonthStats {
            month: report.current_month.clone(),
            avg_error_rate: format!("{:.2}", report.current_month_avg_error),
        },
        outliers: report
            .top_outliers()
            .iter()
            .map(|o| OutlierSummary {
                name: o.process_name.clone(),
                error_rate: o.error_rate,
            })
            .collect(),
    }))
}

/// Most recent rows of each collection, capped for the chat context.
pub fn query_request(
    query: &str,
    financial: &[FinancialCloseRecord],
    process: &[ProcessEfficiencyRecord],
) -> InsightRequest {
    let financial_data = financial
        .iter()
        .take(MAX_QUERY_SAMPLE)
        .map(|m| FinancialSample {
            period: m.period.clone(),
            department: m.department.clone(),
            close_days: m.close_days,
            automation_rate: m.automation_rate,
        })
        .collect();
    let process_data = process
        .iter()
        .take(MAX_QUERY_SAMPLE)
        .map(|p| ProcessSample {
            name: p.process_name.clone(),
            category: p.category.clone(),
            cycle_time: p.cycle_time,
            error_rate: p.error_rate,
            cost: p.cost,
        })
        .collect();

    InsightRequest::query(
        QueryPayload {
            financial_data,
            process_data,
        },
        query,
    )
}

pub struct InsightComposer {
    backend: Arc<dyn InsightBackend>,
    timeout: Duration,
    min_query_interval: Duration,
    min_query_len: usize,
    last_query: Mutex<Option<Instant>>,
    cancel: CancellationToken,
}

impl InsightComposer {
    pub fn new(backend: Arc<dyn InsightBackend>) -> Self {
        Self::from_config(backend, &DashboardConfig::default(), CancellationToken::new())
    }

    pub fn from_config(
        backend: Arc<dyn InsightBackend>,
        config: &DashboardConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend,
            timeout: config.request_timeout(),
            min_query_interval: config.query_min_interval(),
            min_query_len: config.min_query_len,
            last_query: Mutex::new(None),
            cancel,
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// One backend call bounded by the request timeout and the shutdown token.
    pub async fn call(&self, request: &InsightRequest) -> Result<String> {
        request.validate()?;
        if self.cancel.is_cancelled() {
            return Err(DashboardError::Cancelled);
        }

        tokio::select! {
            _ = self.cancel.cancelled() => Err(DashboardError::Cancelled),
            res = tokio::time::timeout(self.timeout, self.backend.generate(request)) => match res {
                Ok(inner) => inner,
                Err(_) => Err(DashboardError::Timeout(self.timeout.as_secs())),
            },
        }
    }

    async fn outcome(&self, request: &InsightRequest) -> InsightOutcome {
        let kind = request.insight_type();
        let result = self.call(request).await.and_then(|text| {
            if text.trim().is_empty() {
                Err(DashboardError::EmptyInsight)
            } else {
                Ok(text)
            }
        });
        match result {
            Ok(text) => InsightOutcome::Generated(text),
            Err(e) => {
                warn!("{} insight failed: {}", kind, e);
                InsightOutcome::Fallback {
                    text: kind.fallback().to_string(),
                    error: format!("{}: {}", kind, e),
                }
            }
        }
    }

    /// Runs the three automated insights concurrently. Each one degrades to its
    /// fallback text on its own; recommendations are derived locally.
    pub async fn generate(&self, ctx: &InsightContext<'_>) -> Option<InsightBatch> {
        if ctx.financial.is_empty() && ctx.process.is_empty() {
            debug!("No records in view, skipping insight generation");
            return None;
        }

        info!(
            "Generating insights for {} financial and {} process rows",
            ctx.financial.len(),
            ctx.process.len()
        );

        let candidates = manual_process_candidates(ctx.process);
        let report = AnomalyReport::from_records(ctx.all_process);

        let close_req = close_performance_request(ctx);
        let automation_req = automation_request(&candidates);
        let anomaly_req = anomaly_request(&report);

        let (close_performance, automation, anomaly) = futures::join!(
            self.outcome(&close_req),
            async {
                match &automation_req {
                    Some(req) => self.outcome(req).await,
                    None => InsightOutcome::Generated(WELL_AUTOMATED_MESSAGE.to_string()),
                }
            },
            self.outcome(&anomaly_req),
        );

        let batch = InsightBatch {
            close_performance,
            automation,
            anomaly,
            recommendations: derive_recommendations(ctx.avg_close_days, &candidates),
        };

        info!(
            "Insights ready ({} fallbacks, {} recommendations)",
            batch.errors().len(),
            batch.recommendations.len()
        );
        Some(batch)
    }

    /// Pre-flight checks for a chat query. Only `Accepted` consumes the rate
    /// limit budget.
    pub fn admit_query(&self, query: &str, now: Instant) -> QueryAdmission {
        if query.trim().is_empty() {
            return QueryAdmission::Ignored;
        }
        if query.chars().count() < self.min_query_len {
            return QueryAdmission::TooShort;
        }

        let mut last = self
            .last_query
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = *last {
            if now.saturating_duration_since(previous) < self.min_query_interval {
                debug!("Query rejected by rate limit");
                return QueryAdmission::RateLimited;
            }
        }
        *last = Some(now);
        QueryAdmission::Accepted
    }

    /// Always produces assistant text; failures become an apology.
    pub async fn answer_query(
        &self,
        query: &str,
        financial: &[FinancialCloseRecord],
        process: &[ProcessEfficiencyRecord],
    ) -> String {
        let request = query_request(query, financial, process);
        match self.call(&request).await {
            Ok(text) if text.trim().is_empty() => EMPTY_ANSWER_REPLY.to_string(),
            Err(DashboardError::EmptyInsight) => EMPTY_ANSWER_REPLY.to_string(),
            Ok(text) => text,
            Err(e) => {
                warn!("Chat query failed: {}", e);
                QUERY_ERROR_REPLY.to_string()
            }
        }
    }

    /// Admission, transcript bookkeeping and answering in one step.
    pub async fn chat(
        &self,
        transcript: &mut Transcript,
        query: &str,
        financial: &[FinancialCloseRecord],
        process: &[ProcessEfficiencyRecord],
    ) -> QueryAdmission {
        let admission = self.admit_query(query, Instant::now());
        match admission {
            QueryAdmission::Ignored | QueryAdmission::RateLimited => {}
            QueryAdmission::TooShort => {
                transcript.push_user(query);
                transcript.push_assistant(TOO_SHORT_REPLY);
            }
            QueryAdmission::Accepted => {
                transcript.push_user(query);
                let answer = self.answer_query(query, financial, process).await;
                transcript.push_assistant(answer);
            }
        }
        admission
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ProcessStatus;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct ScriptedBackend {
        calls: AtomicUsize,
        fail_automation: bool,
        hang: bool,
        blank: bool,
    }

    #[async_trait]
    impl InsightBackend for ScriptedBackend {
        async fn generate(&self, request: &InsightRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.blank {
                return Ok("  ".to_string());
            }
            match request.insight_type() {
                InsightType::Automation if self.fail_automation => Err(DashboardError::Endpoint {
                    status: 500,
                    message: "upstream error".to_string(),
                }),
                kind => Ok(format!("{} narrative", kind)),
            }
        }
    }

    fn financial(department: &str, period: &str, close_days: f64) -> FinancialCloseRecord {
        FinancialCloseRecord {
            id: format!("{}-{}", department, period),
            period: period.to_string(),
            close_days,
            automation_rate: 70.0,
            reconciliation_items: 4,
            region: "North America".to_string(),
            department: department.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
        }
    }

    fn process(name: &str, error_rate: f64) -> ProcessEfficiencyRecord {
        ProcessEfficiencyRecord {
            id: name.to_string(),
            process_name: name.to_string(),
            cycle_time: 20.0,
            error_rate,
            cost: 5000.0,
            date: "2024-03-10".to_string(),
            category: "Accounts Payable".to_string(),
            status: ProcessStatus::Completed,
            created_at: Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap(),
        }
    }

    fn composer(backend: ScriptedBackend) -> (InsightComposer, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        (InsightComposer::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn test_automation_failure_falls_back_alone() {
        let (composer, backend) = composer(ScriptedBackend {
            fail_automation: true,
            ..Default::default()
        });
        let fin = vec![financial("Tax", "2024-03-31", 9.0)];
        let proc = vec![process("Invoice Matching", 6.0), process("Payroll", 1.0)];
        let ctx = InsightContext {
            financial: &fin,
            process: &proc,
            all_process: &proc,
            avg_close_days: 9.0,
        };

        let batch = composer.generate(&ctx).await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert_eq!(batch.close_performance.text(), "close_performance narrative");
        assert_eq!(batch.automation.text(), AUTOMATION_FALLBACK);
        assert_eq!(batch.anomaly.text(), "anomaly narrative");
        assert_eq!(batch.errors().len(), 1);

        assert_eq!(batch.recommendations.len(), 2);
        assert_eq!(batch.recommendations[1].title, "Automate Invoice Matching");
    }

    #[tokio::test]
    async fn test_blank_text_falls_back() {
        let (composer, backend) = composer(ScriptedBackend {
            blank: true,
            ..Default::default()
        });
        let fin = vec![financial("Tax", "2024-03-31", 9.0)];
        let proc = vec![process("Invoice Matching", 6.0)];
        let ctx = InsightContext {
            financial: &fin,
            process: &proc,
            all_process: &proc,
            avg_close_days: 9.0,
        };

        let batch = composer.generate(&ctx).await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            batch.close_performance.text(),
            InsightType::ClosePerformance.fallback()
        );
        assert_eq!(batch.automation.text(), AUTOMATION_FALLBACK);
        assert_eq!(batch.anomaly.text(), InsightType::Anomaly.fallback());
        assert_eq!(batch.errors().len(), 3);

        let answer = composer
            .answer_query("Which department is slowest?", &fin, &proc)
            .await;
        assert_eq!(answer, EMPTY_ANSWER_REPLY);
    }

    #[tokio::test]
    async fn test_well_automated_short_circuit() {
        let (composer, backend) = composer(ScriptedBackend::default());
        let proc = vec![process("Payroll", 1.0)];
        let ctx = InsightContext {
            financial: &[],
            process: &proc,
            all_process: &proc,
            avg_close_days: 0.0,
        };

        let batch = composer.generate(&ctx).await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(batch.automation.text(), WELL_AUTOMATED_MESSAGE);
        assert!(batch.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_empty_context_generates_nothing() {
        let (composer, backend) = composer(ScriptedBackend::default());
        let ctx = InsightContext {
            financial: &[],
            process: &[],
            all_process: &[],
            avg_close_days: 0.0,
        };
        assert!(composer.generate(&ctx).await.is_none());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_times_out() {
        let (composer, _) = composer(ScriptedBackend {
            hang: true,
            ..Default::default()
        });
        let fin = vec![financial("Tax", "2024-03-31", 4.0)];
        let ctx = InsightContext {
            financial: &fin,
            process: &[],
            all_process: &[],
            avg_close_days: 4.0,
        };

        let batch = composer.generate(&ctx).await.unwrap();
        assert_eq!(batch.close_performance.text(), CLOSE_PERFORMANCE_FALLBACK);
        assert_eq!(batch.anomaly.text(), ANOMALY_FALLBACK);
        assert!(batch.errors()[0].contains("timed out") || batch.errors()[0].contains("30"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_calls() {
        let backend = Arc::new(ScriptedBackend {
            hang: true,
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        let composer =
            InsightComposer::from_config(backend, &DashboardConfig::default(), cancel.clone());

        let request = close_performance_request(&InsightContext {
            financial: &[],
            process: &[],
            all_process: &[],
            avg_close_days: 0.0,
        });
        let pending = composer.call(&request);
        tokio::pin!(pending);

        tokio::select! {
            _ = &mut pending => panic!("call finished before cancellation"),
            _ = tokio::time::sleep(Duration::from_millis(10)) => {}
        }
        cancel.cancel();
        assert!(matches!(pending.await, Err(DashboardError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_admission() {
        let (composer, _) = composer(ScriptedBackend::default());
        let start = Instant::now();

        assert_eq!(composer.admit_query("   ", start), QueryAdmission::Ignored);
        assert_eq!(composer.admit_query("why?", start), QueryAdmission::TooShort);
        assert_eq!(
            composer.admit_query("Which region closes fastest?", start),
            QueryAdmission::Accepted
        );
        assert_eq!(
            composer.admit_query("And which is slowest overall?", start + Duration::from_millis(4999)),
            QueryAdmission::RateLimited
        );
        assert_eq!(
            composer.admit_query("And which is slowest overall?", start + Duration::from_millis(5000)),
            QueryAdmission::Accepted
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_transcript_rules() {
        let (composer, backend) = composer(ScriptedBackend::default());
        let mut transcript = Transcript::new();

        let admission = composer.chat(&mut transcript, "trend?", &[], &[]).await;
        assert_eq!(admission, QueryAdmission::TooShort);
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.last().unwrap().content, TOO_SHORT_REPLY);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

        composer
            .chat(&mut transcript, "How is the close trending?", &[], &[])
            .await;
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript.last().unwrap().content, "query narrative");

        let admission = composer
            .chat(&mut transcript, "What about automation rates?", &[], &[])
            .await;
        assert_eq!(admission, QueryAdmission::RateLimited);
        assert_eq!(transcript.len(), 4);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_query_sample_is_capped() {
        let fin: Vec<FinancialCloseRecord> = (0..30)
            .map(|i| financial("Tax", &format!("2024-01-{:02}", i % 28 + 1), 5.0))
            .collect();
        let request = query_request("How many periods do we have?", &fin, &[]);
        match request.payload {
            InsightPayload::Query(ref q) => assert_eq!(q.financial_data.len(), MAX_QUERY_SAMPLE),
            _ => panic!("expected a query payload"),
        }
        request.validate().unwrap();
    }
}
