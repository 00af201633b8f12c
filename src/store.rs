//! Record store client.
//!
//! The store is an opaque row service with two read-only collections. Both are
//! fetched concurrently and a failure in one never discards the other.

use crate::error::{DashboardError, Result};
use crate::schema::{
    FinancialCloseRecord, ProcessEfficiencyRecord, RecordSet, FINANCIAL_CLOSE_TABLE,
    PROCESS_EFFICIENCY_TABLE,
};
use async_trait::async_trait;
use log::{error, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Financial close rows, newest `created_at` first.
    async fn fetch_financial(&self) -> Result<Vec<FinancialCloseRecord>>;

    /// Process efficiency rows, newest `created_at` first.
    async fn fetch_process(&self) -> Result<Vec<ProcessEfficiencyRecord>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Upper bound of random jitter added to each delay.
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
            jitter_ms: 100,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Exponential delay for the given zero-based attempt, capped, without jitter.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let delay_ms =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(delay_ms.min(self.max_delay_ms as f64) as u64)
    }

    fn jittered_delay(&self, attempt: usize) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        self.delay_for_attempt(attempt) + Duration::from_millis(jitter)
    }

    /// Runs `operation` until it succeeds, fails with a non-transient error,
    /// or the retry budget is spent.
    pub async fn retry<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.jittered_delay(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        label,
                        attempt + 1,
                        self.max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Outcome of one fetch round: whatever loaded, plus per-collection failures.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub financial: Option<Vec<FinancialCloseRecord>>,
    pub process: Option<Vec<ProcessEfficiencyRecord>>,
    pub errors: Vec<DashboardError>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// A collection that failed to load counts as empty.
    pub fn into_record_set(self) -> RecordSet {
        RecordSet::new(
            self.financial.unwrap_or_default(),
            self.process.unwrap_or_default(),
        )
    }

    pub fn connection_error(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            let details: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
            Some(format!(
                "Failed to fetch dashboard data: {}",
                details.join("; ")
            ))
        }
    }
}

/// Fetches both collections concurrently, each with its own retry budget.
pub async fn fetch_all<S>(store: &S, policy: &RetryPolicy) -> FetchReport
where
    S: RecordStore + ?Sized,
{
    let (financial, process) = futures::join!(
        policy.retry(FINANCIAL_CLOSE_TABLE, || store.fetch_financial()),
        policy.retry(PROCESS_EFFICIENCY_TABLE, || store.fetch_process()),
    );

    let mut report = FetchReport::default();

    match financial {
        Ok(rows) => report.financial = Some(rows),
        Err(e) => {
            error!("Error fetching {}: {}", FINANCIAL_CLOSE_TABLE, e);
            report.errors.push(e);
        }
    }

    match process {
        Ok(rows) => report.process = Some(rows),
        Err(e) => {
            error!("Error fetching {}: {}", PROCESS_EFFICIENCY_TABLE, e);
            report.errors.push(e);
        }
    }

    report
}

#[cfg(feature = "http")]
pub use rest::RestRecordStore;

#[cfg(feature = "http")]
mod rest {
    use super::*;
    use reqwest::Client;
    use serde::de::DeserializeOwned;

    /// PostgREST-style row service (`/rest/v1/{table}`).
    #[derive(Clone)]
    pub struct RestRecordStore {
        client: Client,
        base_url: String,
        api_key: String,
    }

    impl RestRecordStore {
        pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
            let client = Client::builder().timeout(timeout).build()?;
            Ok(Self {
                client,
                base_url: base_url.into().trim_end_matches('/').to_string(),
                api_key: api_key.into(),
            })
        }

        pub fn from_config(config: &crate::config::DashboardConfig) -> Result<Self> {
            Self::new(
                config.store_url.clone(),
                config.store_api_key.clone(),
                config.request_timeout(),
            )
        }

        fn table_url(&self, table: &str) -> String {
            format!(
                "{}/rest/v1/{}?select=*&order=created_at.desc",
                self.base_url, table
            )
        }

        async fn fetch_table<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>> {
            let res = self
                .client
                .get(self.table_url(table))
                .header("apikey", &self.api_key)
                .bearer_auth(&self.api_key)
                .send()
                .await?;

            let status = res.status();
            if !status.is_success() {
                let body = res.text().await?;
                return Err(DashboardError::Endpoint {
                    status: status.as_u16(),
                    message: format!("{}: {}", table, body),
                });
            }

            let rows: Vec<T> = res.json().await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl RecordStore for RestRecordStore {
        async fn fetch_financial(&self) -> Result<Vec<FinancialCloseRecord>> {
            self.fetch_table(FINANCIAL_CLOSE_TABLE).await
        }

        async fn fetch_process(&self) -> Result<Vec<ProcessEfficiencyRecord>> {
            self.fetch_table(PROCESS_EFFICIENCY_TABLE).await
        }
    }

}
