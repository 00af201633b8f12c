use crate::error::{DashboardError, Result};
use crate::store::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ENV_STORE_URL: &str = "DASHBOARD_STORE_URL";
pub const ENV_STORE_KEY: &str = "DASHBOARD_STORE_KEY";
pub const ENV_INSIGHTS_URL: &str = "DASHBOARD_INSIGHTS_URL";
pub const ENV_INSIGHTS_KEY: &str = "DASHBOARD_INSIGHTS_KEY";

/// Endpoints, credentials and timing knobs for a dashboard session.
///
/// Only presence of the credentials matters to the core; their values are
/// passed through to the transport untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub store_url: String,
    pub store_api_key: String,
    pub insights_url: String,
    pub insights_api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub filter_debounce_ms: u64,
    pub insight_debounce_ms: u64,
    pub query_min_interval_ms: u64,
    pub min_query_len: usize,
    pub default_window_months: u32,
    pub retry: RetryPolicy,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            store_url: String::new(),
            store_api_key: String::new(),
            insights_url: String::new(),
            insights_api_key: None,
            request_timeout_secs: 30,
            filter_debounce_ms: 500,
            insight_debounce_ms: 1000,
            query_min_interval_ms: 5000,
            min_query_len: 10,
            default_window_months: 36,
            retry: RetryPolicy::default(),
        }
    }
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self> {
        let store_url = required_env(ENV_STORE_URL)?;
        let store_api_key = required_env(ENV_STORE_KEY)?;

        // The insight function is hosted next to the store unless told otherwise.
        let insights_url = std::env::var(ENV_INSIGHTS_URL)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| {
                format!("{}/functions/v1/ai-insights", store_url.trim_end_matches('/'))
            });

        let config = Self {
            store_url,
            store_api_key,
            insights_url,
            insights_api_key: std::env::var(ENV_INSIGHTS_KEY).ok(),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.store_url.trim().is_empty() {
            return Err(DashboardError::Config("store_url must be set".to_string()));
        }
        if self.insights_url.trim().is_empty() {
            return Err(DashboardError::Config(
                "insights_url must be set".to_string(),
            ));
        }
        self.validate_timings()
    }

    /// Checks only the settings the session itself uses, not the endpoints.
    pub fn validate_timings(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(DashboardError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.default_window_months == 0 {
            return Err(DashboardError::Config(
                "default_window_months must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn filter_debounce(&self) -> Duration {
        Duration::from_millis(self.filter_debounce_ms)
    }

    pub fn insight_debounce(&self) -> Duration {
        Duration::from_millis(self.insight_debounce_ms)
    }

    pub fn query_min_interval(&self) -> Duration {
        Duration::from_millis(self.query_min_interval_ms)
    }
}

fn required_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(DashboardError::Config(format!("{} must be set", name))),
    }
}
