//! Chart-ready group-bys over the filtered collections.

use crate::schema::{FinancialCloseRecord, ProcessEfficiencyRecord, ProcessStatus};
use crate::utils::{mean, month_label, round_to};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const UNCATEGORIZED: &str = "Other";
const NAME_DISPLAY_LEN: usize = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentAverage {
    pub department: String,
    pub avg_close_days: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PeriodAverage {
    pub period: String,
    pub avg_close_days: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    /// Short month label for the axis, falls back to the raw period.
    pub month: String,
    pub period: String,
    pub avg_close_days: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleTimeBand {
    Fast,
    Moderate,
    Slow,
}

impl CycleTimeBand {
    pub fn for_hours(hours: f64) -> Self {
        if hours < 15.0 {
            CycleTimeBand::Fast
        } else if hours <= 30.0 {
            CycleTimeBand::Moderate
        } else {
            CycleTimeBand::Slow
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryEfficiency {
    pub category: String,
    pub avg_cycle_time: f64,
    pub avg_error_rate: f64,
    pub band: CycleTimeBand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCost {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessBar {
    pub name: String,
    pub full_name: String,
    pub cycle_time: f64,
    pub error_rate: f64,
    pub cost: f64,
    pub status: ProcessStatus,
}

/// Groups values by key, keeping the order in which keys first appear.
fn group_first_seen<'a, T, K, V>(items: &'a [T], key: K, value: V) -> Vec<(&'a str, Vec<f64>)>
where
    K: Fn(&'a T) -> &'a str,
    V: Fn(&T) -> f64,
{
    let mut groups: Vec<(&str, Vec<f64>)> = Vec::new();
    for item in items {
        let k = key(item);
        match groups.iter_mut().find(|(existing, _)| *existing == k) {
            Some((_, values)) => values.push(value(item)),
            None => groups.push((k, vec![value(item)])),
        }
    }
    groups
}

fn category_of(record: &ProcessEfficiencyRecord) -> &str {
    if record.category.trim().is_empty() {
        UNCATEGORIZED
    } else {
        &record.category
    }
}

pub fn department_averages(records: &[FinancialCloseRecord]) -> Vec<DepartmentAverage> {
    group_first_seen(records, |r| r.department.as_str(), |r| r.close_days)
        .into_iter()
        .map(|(department, days)| DepartmentAverage {
            department: department.to_string(),
            avg_close_days: mean(days),
        })
        .collect()
}

/// Mean close days per period, most recent first, at most `limit` periods.
pub fn period_trend(records: &[FinancialCloseRecord], limit: usize) -> Vec<PeriodAverage> {
    let mut buckets: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for record in records {
        buckets
            .entry(record.period.as_str())
            .or_default()
            .push(record.close_days);
    }

    buckets
        .into_iter()
        .rev()
        .take(limit)
        .map(|(period, days)| PeriodAverage {
            period: period.to_string(),
            avg_close_days: mean(days),
        })
        .collect()
}

/// Full close-days series in chronological order, averages to one decimal.
pub fn close_trend_series(records: &[FinancialCloseRecord]) -> Vec<TrendPoint> {
    period_trend(records, usize::MAX)
        .into_iter()
        .rev()
        .map(|p| TrendPoint {
            month: month_label(&p.period).unwrap_or_else(|| p.period.clone()),
            period: p.period,
            avg_close_days: round_to(p.avg_close_days, 1),
        })
        .collect()
}

/// Completed processes per category, slowest category first.
pub fn category_efficiency(records: &[ProcessEfficiencyRecord]) -> Vec<CategoryEfficiency> {
    let completed: Vec<&ProcessEfficiencyRecord> = records
        .iter()
        .filter(|r| r.status == ProcessStatus::Completed)
        .collect();

    let mut groups: Vec<(&str, Vec<f64>, Vec<f64>)> = Vec::new();
    for record in completed {
        let category = category_of(record);
        match groups.iter_mut().find(|(c, _, _)| *c == category) {
            Some((_, cycles, errors)) => {
                cycles.push(record.cycle_time);
                errors.push(record.error_rate);
            }
            None => groups.push((category, vec![record.cycle_time], vec![record.error_rate])),
        }
    }

    let mut rows: Vec<CategoryEfficiency> = groups
        .into_iter()
        .map(|(category, cycles, errors)| {
            let avg_cycle_time = round_to(mean(cycles), 1);
            CategoryEfficiency {
                category: category.to_string(),
                avg_cycle_time,
                avg_error_rate: round_to(mean(errors), 2),
                band: CycleTimeBand::for_hours(avg_cycle_time),
            }
        })
        .collect();

    rows.sort_by(|a, b| b.avg_cycle_time.total_cmp(&a.avg_cycle_time));
    rows
}

pub fn cost_by_category(records: &[ProcessEfficiencyRecord]) -> Vec<CategoryCost> {
    group_first_seen(records, category_of, |r| r.cost)
        .into_iter()
        .map(|(name, costs)| CategoryCost {
            name: name.to_string(),
            value: costs.iter().sum::<f64>().round(),
        })
        .collect()
}

pub fn top_processes(records: &[ProcessEfficiencyRecord], n: usize) -> Vec<ProcessBar> {
    records
        .iter()
        .take(n)
        .map(|r| ProcessBar {
            name: truncate_name(&r.process_name),
            full_name: r.process_name.clone(),
            cycle_time: r.cycle_time,
            error_rate: r.error_rate,
            cost: r.cost,
            status: r.status.clone(),
        })
        .collect()
}

fn truncate_name(name: &str) -> String {
    if name.chars().count() > NAME_DISPLAY_LEN {
        let head: String = name.chars().take(NAME_DISPLAY_LEN).collect();
        format!("{}...", head)
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn close(period: &str, department: &str, close_days: f64) -> FinancialCloseRecord {
        FinancialCloseRecord {
            id: format!("{}-{}", period, department),
            period: period.to_string(),
            close_days,
            automation_rate: 60.0,
            reconciliation_items: 3,
            region: "Global".to_string(),
            department: department.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn process(name: &str, category: &str, status: &str, cycle: f64, err: f64, cost: f64) -> ProcessEfficiencyRecord {
        ProcessEfficiencyRecord {
            id: name.to_string(),
            process_name: name.to_string(),
            cycle_time: cycle,
            error_rate: err,
            cost,
            date: "2024-03-01".to_string(),
            category: category.to_string(),
            status: ProcessStatus::parse(status),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_department_averages_first_seen_order() {
        let records = vec![
            close("2024-03-31", "Treasury", 4.0),
            close("2024-03-31", "Tax", 9.0),
            close("2024-02-29", "Treasury", 6.0),
        ];
        let avgs = department_averages(&records);
        assert_eq!(avgs.len(), 2);
        assert_eq!(avgs[0].department, "Treasury");
        assert!((avgs[0].avg_close_days - 5.0).abs() < 1e-12);
        assert_eq!(avgs[1].department, "Tax");
    }

    #[test]
    fn test_period_trend_latest_first() {
        let records = vec![
            close("2024-01-31", "Tax", 9.0),
            close("2024-04-30", "Tax", 5.0),
            close("2024-02-29", "Tax", 8.0),
            close("2024-03-31", "Tax", 6.0),
            close("2024-03-31", "Treasury", 7.0),
        ];
        let trend = period_trend(&records, 3);
        let periods: Vec<&str> = trend.iter().map(|p| p.period.as_str()).collect();
        assert_eq!(periods, vec!["2024-04-30", "2024-03-31", "2024-02-29"]);
        assert!((trend[1].avg_close_days - 6.5).abs() < 1e-12);

        let series = close_trend_series(&records);
        assert_eq!(series.first().unwrap().month, "Jan");
        assert_eq!(series.last().unwrap().period, "2024-04-30");
    }

    #[test]
    fn test_category_efficiency_completed_only() {
        let records = vec![
            process("A", "Payables", "completed", 10.0, 1.0, 100.0),
            process("B", "Payables", "Completed", 20.0, 2.0, 100.0),
            process("C", "Close", "completed", 40.0, 3.333, 100.0),
            process("D", "Close", "failed", 1.0, 50.0, 100.0),
            process("E", "", "completed", 5.0, 0.5, 100.0),
        ];

        let rows = category_efficiency(&records);
        let names: Vec<&str> = rows.iter().map(|r| r.category.as_str()).collect();
        assert_eq!(names, vec!["Close", "Payables", UNCATEGORIZED]);
        assert_eq!(rows[0].band, CycleTimeBand::Slow);
        assert_eq!(rows[0].avg_error_rate, 3.33);
        assert_eq!(rows[1].avg_cycle_time, 15.0);
        assert_eq!(rows[1].band, CycleTimeBand::Moderate);
        assert_eq!(rows[2].band, CycleTimeBand::Fast);
    }

    #[test]
    fn test_cost_by_category() {
        let records = vec![
            process("A", "Payables", "completed", 1.0, 1.0, 100.4),
            process("B", "Close", "pending", 1.0, 1.0, 50.0),
            process("C", "Payables", "failed", 1.0, 1.0, 200.4),
        ];
        let costs = cost_by_category(&records);
        assert_eq!(
            costs,
            vec![
                CategoryCost { name: "Payables".to_string(), value: 301.0 },
                CategoryCost { name: "Close".to_string(), value: 50.0 },
            ]
        );
    }

    #[test]
    fn test_top_processes_truncates_names() {
        let records = vec![
            process("Intercompany Reconciliation", "Close", "completed", 1.0, 1.0, 1.0),
            process("Payroll", "Close", "completed", 1.0, 1.0, 1.0),
        ];
        let bars = top_processes(&records, 8);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].name, "Intercompany Re...");
        assert_eq!(bars[0].full_name, "Intercompany Reconciliation");
        assert_eq!(bars[1].name, "Payroll");
        assert_eq!(top_processes(&records, 1).len(), 1);
    }
}
