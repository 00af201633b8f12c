//! # FinOps Dashboard
//!
//! Core of a financial operations dashboard: loads financial close metrics and
//! process efficiency observations from a record store, filters them, derives
//! KPIs and error-rate anomalies, and requests short narrative insights from a
//! text-generation endpoint.
//!
//! ## Core Concepts
//!
//! - **Filtered view**: records inside the date window that match the selected
//!   regions and departments. Process observations carry no region or department.
//! - **KPIs**: averages over the filtered view, with period-over-period trends
//!   computed across the full history.
//! - **Anomalies**: process error rates more than two standard deviations from
//!   the history-wide mean.
//! - **Insights**: three automated narratives (close performance, automation,
//!   anomalies) plus a rate-limited chat. Every failure degrades to fallback text.
//!
//! ## Example
//!
//! ```rust,ignore
//! use finops_dashboard::*;
//! use std::sync::Arc;
//!
//! let config = DashboardConfig::from_env()?;
//! let store = Arc::new(RestRecordStore::from_config(&config)?);
//! let backend = Arc::new(InsightsEndpoint::from_config(&config)?);
//! let dashboard = Dashboard::new(store, backend, config)?;
//!
//! dashboard.refresh().await;
//! dashboard.generate_insights().await;
//! dashboard.send_query("Which department has the slowest close?").await;
//!
//! let snapshot = dashboard.snapshot().await;
//! println!("{:.1} days", snapshot.kpis.avg_close_days);
//! ```

pub mod anomaly;
pub mod config;
pub mod debounce;
pub mod error;
pub mod export;
pub mod filters;
pub mod insights;
pub mod kpi;
pub mod projections;
pub mod schema;
pub mod session;
pub mod store;
pub mod utils;

pub use anomaly::{
    derive_recommendations, manual_process_candidates, AnomalyReport, Priority, Recommendation,
};
pub use config::DashboardConfig;
pub use debounce::Debouncer;
pub use error::{DashboardError, Result};
pub use export::{can_export, export_csv, export_file_name, write_export};
pub use filters::{FilterCriteria, Selection};
pub use insights::*;
pub use kpi::{compute_kpis, KpiResult, PeriodTrend};
pub use projections::*;
pub use schema::*;
pub use session::{Dashboard, DashboardSession, DashboardSnapshot};
pub use store::{fetch_all, FetchReport, RecordStore, RetryPolicy};
pub use utils::*;

#[cfg(feature = "http")]
pub use store::RestRecordStore;
