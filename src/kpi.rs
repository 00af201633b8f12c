//! Summary statistics and period-over-period deltas.
//!
//! Averages and totals are taken over the filtered views. Trends always look
//! at the unfiltered collections so narrowing the filter does not hide the
//! direction the business is moving in.

use crate::schema::{FinancialCloseRecord, ProcessEfficiencyRecord, ProcessStatus};
use crate::utils::{mean, percent_change, year_month};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiResult {
    pub avg_close_days: f64,
    /// Percentage change between the two most recent periods.
    pub close_days_trend: f64,
    pub avg_automation_rate: f64,
    pub automation_trend: f64,
    /// Percentage change in mean error rate between the two most recent months.
    pub error_rate_change: f64,
    pub current_month_avg_error: f64,
    pub prev_month_avg_error: f64,
    pub total_reconciliation_items: i64,
    pub avg_cycle_time: f64,
    pub avg_error_rate: f64,
    pub total_cost: f64,
    pub optimal_processes: usize,
    pub critical_processes: usize,
}

/// Two most recent buckets of a keyed series and the change between them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodTrend {
    pub current_key: Option<String>,
    pub previous_key: Option<String>,
    pub current_avg: f64,
    pub previous_avg: f64,
    pub change_pct: f64,
}

/// Buckets `items` by `key`, then compares the means of the two greatest keys.
///
/// Keys are compared as strings, which orders ISO dates chronologically.
/// Fewer than two buckets, or a zero previous mean, yields a change of 0.
pub fn period_over_period<T, K, V>(items: &[T], key: K, value: V) -> PeriodTrend
where
    K: Fn(&T) -> &str,
    V: Fn(&T) -> f64,
{
    let mut buckets: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for item in items {
        buckets.entry(key(item)).or_default().push(value(item));
    }

    let mut latest = buckets.iter().rev();
    let current = latest.next();
    let previous = latest.next();

    let current_avg = current.map(|(_, v)| mean(v.iter().copied())).unwrap_or(0.0);
    let previous_avg = previous.map(|(_, v)| mean(v.iter().copied())).unwrap_or(0.0);

    let change_pct = match previous {
        Some(_) => percent_change(current_avg, previous_avg),
        None => 0.0,
    };

    PeriodTrend {
        current_key: current.map(|(k, _)| k.to_string()),
        previous_key: previous.map(|(k, _)| k.to_string()),
        current_avg,
        previous_avg,
        change_pct,
    }
}

pub fn close_days_trend(all_financial: &[FinancialCloseRecord]) -> PeriodTrend {
    period_over_period(all_financial, |r| r.period.as_str(), |r| r.close_days)
}

pub fn automation_trend(all_financial: &[FinancialCloseRecord]) -> PeriodTrend {
    period_over_period(all_financial, |r| r.period.as_str(), |r| r.automation_rate)
}

pub fn error_rate_trend(all_process: &[ProcessEfficiencyRecord]) -> PeriodTrend {
    period_over_period(all_process, |r| year_month(&r.date), |r| r.error_rate)
}

pub fn compute_kpis(
    filtered_financial: &[FinancialCloseRecord],
    filtered_process: &[ProcessEfficiencyRecord],
    all_financial: &[FinancialCloseRecord],
    all_process: &[ProcessEfficiencyRecord],
) -> KpiResult {
    let close_trend = close_days_trend(all_financial);
    let automation = automation_trend(all_financial);
    let error_trend = error_rate_trend(all_process);

    KpiResult {
        avg_close_days: mean(filtered_financial.iter().map(|r| r.close_days)),
        close_days_trend: close_trend.change_pct,
        avg_automation_rate: mean(filtered_financial.iter().map(|r| r.automation_rate)),
        automation_trend: automation.change_pct,
        error_rate_change: error_trend.change_pct,
        current_month_avg_error: error_trend.current_avg,
        prev_month_avg_error: error_trend.previous_avg,
        total_reconciliation_items: filtered_financial
            .iter()
            .map(|r| r.reconciliation_items)
            .sum(),
        avg_cycle_time: mean(filtered_process.iter().map(|r| r.cycle_time)),
        avg_error_rate: mean(filtered_process.iter().map(|r| r.error_rate)),
        total_cost: filtered_process.iter().map(|r| r.cost).sum(),
        optimal_processes: filtered_process
            .iter()
            .filter(|r| r.status == ProcessStatus::Completed)
            .count(),
        critical_processes: filtered_process
            .iter()
            .filter(|r| r.status == ProcessStatus::InProgress)
            .count(),
    }
}
