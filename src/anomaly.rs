use crate::schema::ProcessEfficiencyRecord;
use crate::utils::{format_grouped, mean, population_std_dev, year_month};
use serde::{Deserialize, Serialize};

pub const CLOSE_DAYS_TARGET: f64 = 5.0;
pub const CLOSE_DAYS_CRITICAL: f64 = 8.0;
pub const MANUAL_ERROR_THRESHOLD: f64 = 3.0;
pub const HIGH_ERROR_THRESHOLD: f64 = 5.0;
pub const MAX_MANUAL_CANDIDATES: usize = 5;
pub const MAX_OUTLIERS: usize = 3;
pub const MAX_RECOMMENDATIONS: usize = 3;
pub const OUTLIER_SIGMAS: f64 = 2.0;

// Deviations within this distance of the threshold count as on it.
const OUTLIER_TOLERANCE: f64 = 1e-9;

/// Error-rate baseline over the full process history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub baseline_avg: f64,
    pub baseline_std_dev: f64,
    /// `YYYY-MM` of the most recent observation, empty when there is none.
    pub current_month: String,
    pub current_month_avg_error: f64,
    pub outliers: Vec<ProcessEfficiencyRecord>,
}

impl AnomalyReport {
    pub fn from_records(records: &[ProcessEfficiencyRecord]) -> Self {
        let rates: Vec<f64> = records.iter().map(|r| r.error_rate).collect();
        let baseline_avg = mean(rates.iter().copied());
        let baseline_std_dev = population_std_dev(&rates);

        let current_month = records
            .iter()
            .map(|r| r.date.as_str())
            .filter(|d| !d.is_empty())
            .max()
            .map(|d| year_month(d).to_string())
            .unwrap_or_default();

        let current_month_avg_error = if current_month.is_empty() {
            0.0
        } else {
            mean(
                records
                    .iter()
                    .filter(|r| r.date.starts_with(&current_month))
                    .map(|r| r.error_rate),
            )
        };

        let threshold = OUTLIER_SIGMAS * baseline_std_dev;
        let outliers = records
            .iter()
            .filter(|r| (r.error_rate - baseline_avg).abs() > threshold + OUTLIER_TOLERANCE)
            .cloned()
            .collect();

        Self {
            baseline_avg,
            baseline_std_dev,
            current_month,
            current_month_avg_error,
            outliers,
        }
    }

    pub fn top_outliers(&self) -> &[ProcessEfficiencyRecord] {
        let n = self.outliers.len().min(MAX_OUTLIERS);
        &self.outliers[..n]
    }

    pub fn is_outlier(&self, error_rate: f64) -> bool {
        (error_rate - self.baseline_avg).abs()
            > OUTLIER_SIGMAS * self.baseline_std_dev + OUTLIER_TOLERANCE
    }
}

/// Processes whose error rate suggests they are still handled manually.
///
/// Input order is kept; candidates are not ranked by severity.
pub fn manual_process_candidates(
    records: &[ProcessEfficiencyRecord],
) -> Vec<&ProcessEfficiencyRecord> {
    records
        .iter()
        .filter(|r| r.error_rate > MANUAL_ERROR_THRESHOLD)
        .take(MAX_MANUAL_CANDIDATES)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub details: String,
}

pub fn close_cycle_recommendation(avg_close_days: f64) -> Option<Recommendation> {
    if avg_close_days <= CLOSE_DAYS_TARGET {
        return None;
    }

    let priority = if avg_close_days > CLOSE_DAYS_CRITICAL {
        Priority::High
    } else {
        Priority::Medium
    };

    Some(Recommendation {
        priority,
        title: "Reduce Close Cycle Time".to_string(),
        description: format!(
            "Current average is {:.1} days, target is {} days ({:.1} days over target).",
            avg_close_days,
            CLOSE_DAYS_TARGET,
            avg_close_days - CLOSE_DAYS_TARGET
        ),
        details: "Focus on departments with highest close times. Consider automation of reconciliation tasks and parallel processing of independent activities.".to_string(),
    })
}

pub fn automation_recommendation(top: &ProcessEfficiencyRecord) -> Recommendation {
    let priority = if top.error_rate > HIGH_ERROR_THRESHOLD {
        Priority::High
    } else {
        Priority::Medium
    };

    Recommendation {
        priority,
        title: format!("Automate {}", top.process_name),
        description: format!(
            "{:.1}% error rate - high potential for improvement.",
            top.error_rate
        ),
        details: format!(
            "Estimated annual cost: ${}. Automation could reduce errors by up to 80% and save processing time.",
            format_grouped(top.cost * 12.0)
        ),
    }
}

/// Close-cycle advice first, then automation of the first manual candidate.
pub fn derive_recommendations(
    avg_close_days: f64,
    candidates: &[&ProcessEfficiencyRecord],
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    if let Some(rec) = close_cycle_recommendation(avg_close_days) {
        recommendations.push(rec);
    }

    if let Some(top) = candidates.first() {
        recommendations.push(automation_recommendation(top));
    }

    recommendations.truncate(MAX_RECOMMENDATIONS);
    recommendations
}
