//! Dashboard session state and the async driver around it.
//!
//! [`DashboardSession`] is plain synchronous state with one entry point per
//! kind of update; every mutation recomputes the filtered views, KPIs and the
//! anomaly baseline. [`Dashboard`] owns a session behind a `tokio` mutex and
//! wires it to the record store, the insight backend and the debouncers.

use crate::anomaly::{AnomalyReport, Recommendation};
use crate::config::DashboardConfig;
use crate::debounce::Debouncer;
use crate::error::Result;
use crate::export::write_export;
use crate::filters::FilterCriteria;
use crate::insights::{
    InsightBackend, InsightBatch, InsightComposer, InsightContext, InsightData, QueryAdmission,
    Transcript, RATE_LIMIT_WARNING, TOO_SHORT_REPLY,
};
use crate::kpi::{compute_kpis, KpiResult};
use crate::schema::RecordSet;
use crate::store::{fetch_all, FetchReport, RecordStore};
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct DashboardSession {
    today: NaiveDate,
    window_months: u32,
    records: RecordSet,
    criteria: FilterCriteria,
    filtered: RecordSet,
    kpis: KpiResult,
    anomaly: AnomalyReport,
    insights: InsightData,
    recommendations: Vec<Recommendation>,
    insight_errors: Vec<String>,
    transcript: Transcript,
    connection_error: Option<String>,
    notice: Option<String>,
    loading: bool,
    last_updated: Option<DateTime<Utc>>,
    view_counts: (usize, usize),
    latest_refresh: u64,
    latest_insights: u64,
}

/// Owned copy of everything a consumer renders.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub criteria: FilterCriteria,
    pub filtered: RecordSet,
    pub kpis: KpiResult,
    pub anomaly: AnomalyReport,
    pub insights: InsightData,
    pub recommendations: Vec<Recommendation>,
    pub insight_errors: Vec<String>,
    pub transcript: Transcript,
    pub connection_error: Option<String>,
    pub notice: Option<String>,
    pub loading: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl DashboardSession {
    pub fn new(today: NaiveDate, window_months: u32) -> Result<Self> {
        let criteria = FilterCriteria::default_for(today, window_months)?;
        Ok(Self {
            today,
            window_months,
            records: RecordSet::default(),
            criteria,
            filtered: RecordSet::default(),
            kpis: KpiResult::default(),
            anomaly: AnomalyReport::default(),
            insights: InsightData::default(),
            recommendations: Vec::new(),
            insight_errors: Vec::new(),
            transcript: Transcript::new(),
            connection_error: None,
            notice: None,
            loading: false,
            last_updated: None,
            view_counts: (0, 0),
            latest_refresh: 0,
            latest_insights: 0,
        })
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Moves the reference day. Takes effect on the next filter, reset or refresh.
    pub fn set_today(&mut self, today: NaiveDate) {
        self.today = today;
    }

    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn filtered(&self) -> &RecordSet {
        &self.filtered
    }

    pub fn kpis(&self) -> &KpiResult {
        &self.kpis
    }

    pub fn anomaly(&self) -> &AnomalyReport {
        &self.anomaly
    }

    pub fn insights(&self) -> &InsightData {
        &self.insights
    }

    pub fn recommendations(&self) -> &[Recommendation] {
        &self.recommendations
    }

    pub fn insight_errors(&self) -> &[String] {
        &self.insight_errors
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn connection_error(&self) -> Option<&str> {
        self.connection_error.as_deref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// When the last refresh was applied.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    fn recompute(&mut self) {
        self.filtered = self.criteria.apply(&self.records, self.today);
        self.kpis = compute_kpis(
            &self.filtered.financial,
            &self.filtered.process,
            &self.records.financial,
            &self.records.process,
        );
        self.anomaly = AnomalyReport::from_records(&self.records.process);
    }

    pub fn apply_filters(&mut self, criteria: FilterCriteria) {
        self.criteria = criteria;
        self.recompute();
    }

    pub fn reset_filters(&mut self) -> Result<()> {
        self.criteria.reset(self.today, self.window_months)?;
        self.recompute();
        Ok(())
    }

    /// Issues a new refresh sequence number; older ones become stale.
    pub fn begin_refresh(&mut self) -> u64 {
        self.latest_refresh += 1;
        self.loading = true;
        self.latest_refresh
    }

    /// Clears the loading flag for a refresh that will never complete.
    pub fn abort_refresh(&mut self, sequence: u64) {
        if sequence == self.latest_refresh {
            self.loading = false;
        }
    }

    /// Applies a fetch result if it belongs to the latest refresh.
    pub fn complete_refresh(&mut self, sequence: u64, report: FetchReport) -> bool {
        if sequence != self.latest_refresh {
            debug!(
                "Discarding stale refresh #{} (latest is #{})",
                sequence, self.latest_refresh
            );
            return false;
        }

        self.connection_error = report.connection_error();
        self.records = report.into_record_set();
        self.loading = false;
        self.last_updated = Some(Utc::now());
        self.recompute();

        let (financial, process) = self.records.counts();
        info!(
            "Loaded {} financial and {} process records ({} in view)",
            financial,
            process,
            self.filtered.financial.len() + self.filtered.process.len()
        );
        true
    }

    /// Records the size of the filtered view. Returns true when it changed
    /// since the last call and the view is not empty.
    pub fn take_view_change(&mut self) -> bool {
        let counts = self.filtered.counts();
        if counts == self.view_counts {
            return false;
        }
        self.view_counts = counts;
        !self.filtered.is_empty()
    }

    pub fn begin_insights(&mut self) -> u64 {
        self.latest_insights += 1;
        self.latest_insights
    }

    pub fn apply_insights(&mut self, sequence: u64, batch: InsightBatch) -> bool {
        if sequence != self.latest_insights {
            debug!("Discarding stale insight batch #{}", sequence);
            return false;
        }
        self.insights = batch.insight_data();
        self.insight_errors = batch.errors();
        self.recommendations = batch.recommendations;
        true
    }

    /// Applies the transcript side of a chat admission; the answer follows via `push_answer`.
    pub fn push_chat(&mut self, query: &str, admission: QueryAdmission) {
        match admission {
            QueryAdmission::Ignored => {}
            QueryAdmission::RateLimited => {
                self.notice = Some(RATE_LIMIT_WARNING.to_string());
            }
            QueryAdmission::TooShort => {
                self.transcript.push_user(query);
                self.transcript.push_assistant(TOO_SHORT_REPLY);
            }
            QueryAdmission::Accepted => {
                self.notice = None;
                self.transcript.push_user(query);
            }
        }
    }

    pub fn push_answer(&mut self, answer: impl Into<String>) {
        self.transcript.push_assistant(answer);
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            criteria: self.criteria.clone(),
            filtered: self.filtered.clone(),
            kpis: self.kpis.clone(),
            anomaly: self.anomaly.clone(),
            insights: self.insights.clone(),
            recommendations: self.recommendations.clone(),
            insight_errors: self.insight_errors.clone(),
            transcript: self.transcript.clone(),
            connection_error: self.connection_error.clone(),
            notice: self.notice.clone(),
            loading: self.loading,
            last_updated: self.last_updated,
        }
    }
}

struct Inner {
    store: Arc<dyn RecordStore>,
    composer: InsightComposer,
    config: DashboardConfig,
    state: Mutex<DashboardSession>,
    filter_debounce: Debouncer,
    insight_debounce: Debouncer,
    shutdown: CancellationToken,
    fixed_today: Option<NaiveDate>,
}

/// Async driver; clones share one session.
#[derive(Clone)]
pub struct Dashboard {
    inner: Arc<Inner>,
}

impl Dashboard {
    pub fn new(
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn InsightBackend>,
        config: DashboardConfig,
    ) -> Result<Self> {
        Self::build(store, backend, config, None)
    }

    /// Pins the reference day instead of following the local clock.
    pub fn with_today(
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn InsightBackend>,
        config: DashboardConfig,
        today: NaiveDate,
    ) -> Result<Self> {
        Self::build(store, backend, config, Some(today))
    }

    fn build(
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn InsightBackend>,
        config: DashboardConfig,
        fixed_today: Option<NaiveDate>,
    ) -> Result<Self> {
        config.validate_timings()?;
        let shutdown = CancellationToken::new();
        let today = fixed_today.unwrap_or_else(|| chrono::Local::now().date_naive());
        let session = DashboardSession::new(today, config.default_window_months)?;

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                composer: InsightComposer::from_config(backend, &config, shutdown.child_token()),
                filter_debounce: Debouncer::with_shutdown(
                    config.filter_debounce(),
                    shutdown.clone(),
                ),
                insight_debounce: Debouncer::with_shutdown(
                    config.insight_debounce(),
                    shutdown.clone(),
                ),
                state: Mutex::new(session),
                config,
                shutdown,
                fixed_today,
            }),
        })
    }

    fn today(&self) -> NaiveDate {
        self.inner
            .fixed_today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Queues a debounced insight batch in the background.
    fn schedule_insights(&self) {
        let dashboard = self.clone();
        tokio::spawn(async move {
            dashboard.auto_insights().await;
        });
    }

    /// Fetches both collections. Returns `false` if the result was superseded
    /// by a newer refresh or the dashboard shut down meanwhile.
    ///
    /// A change in the size of the filtered view queues a debounced insight batch.
    pub async fn refresh(&self) -> bool {
        let sequence = self.inner.state.lock().await.begin_refresh();

        let report = tokio::select! {
            _ = self.inner.shutdown.cancelled() => {
                self.inner.state.lock().await.abort_refresh(sequence);
                return false;
            }
            report = fetch_all(self.inner.store.as_ref(), &self.inner.config.retry) => report,
        };

        let view_changed = {
            let mut state = self.inner.state.lock().await;
            state.set_today(self.today());
            if !state.complete_refresh(sequence, report) {
                return false;
            }
            state.take_view_change()
        };
        if view_changed {
            self.schedule_insights();
        }
        true
    }

    /// Applies `criteria` once no newer call arrives within the filter settle delay.
    pub async fn set_filters(&self, criteria: FilterCriteria) -> bool {
        if !self.inner.filter_debounce.settle().await {
            return false;
        }
        let view_changed = {
            let mut state = self.inner.state.lock().await;
            state.apply_filters(criteria);
            state.take_view_change()
        };
        if view_changed {
            self.schedule_insights();
        }
        true
    }

    pub async fn reset_filters(&self) -> Result<()> {
        self.inner.filter_debounce.cancel();
        let view_changed = {
            let mut state = self.inner.state.lock().await;
            state.set_today(self.today());
            state.reset_filters()?;
            state.take_view_change()
        };
        if view_changed {
            self.schedule_insights();
        }
        Ok(())
    }

    /// Debounced regeneration after a data change.
    pub async fn auto_insights(&self) -> bool {
        if !self.inner.insight_debounce.settle().await {
            return false;
        }
        self.generate_insights().await
    }

    pub async fn generate_insights(&self) -> bool {
        let (sequence, filtered, all_process, avg_close_days) = {
            let mut state = self.inner.state.lock().await;
            if state.records().is_empty() {
                return false;
            }
            (
                state.begin_insights(),
                state.filtered().clone(),
                state.records().process.clone(),
                state.kpis().avg_close_days,
            )
        };

        let ctx = InsightContext {
            financial: &filtered.financial,
            process: &filtered.process,
            all_process: &all_process,
            avg_close_days,
        };

        match self.inner.composer.generate(&ctx).await {
            Some(batch) => self.inner.state.lock().await.apply_insights(sequence, batch),
            None => false,
        }
    }

    pub async fn send_query(&self, query: &str) -> QueryAdmission {
        let admission = self.inner.composer.admit_query(query, Instant::now());

        let filtered = {
            let mut state = self.inner.state.lock().await;
            state.push_chat(query, admission);
            if admission != QueryAdmission::Accepted {
                return admission;
            }
            state.filtered().clone()
        };

        let answer = self
            .inner
            .composer
            .answer_query(query, &filtered.financial, &filtered.process)
            .await;
        self.inner.state.lock().await.push_answer(answer);
        admission
    }

    /// Writes the filtered views into `dir`.
    pub async fn export(&self, dir: &Path) -> Result<PathBuf> {
        let state = self.inner.state.lock().await;
        write_export(
            dir,
            self.today(),
            &state.filtered().financial,
            &state.filtered().process,
        )
    }

    /// Cancels pending debounces and in-flight insight calls.
    pub fn shutdown(&self) {
        info!("Shutting down dashboard");
        self.inner.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub async fn snapshot(&self) -> DashboardSnapshot {
        self.inner.state.lock().await.snapshot()
    }
}
