use crate::error::{DashboardError, Result};
use crate::schema::{FinancialCloseRecord, ProcessEfficiencyRecord};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use log::info;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub const FINANCIAL_SECTION: &str = "=== FINANCIAL CLOSE METRICS ===";
pub const FINANCIAL_HEADER: &str =
    "Period,Close Days,Automation Rate,Reconciliation Items,Region,Department,Created At";
pub const PROCESS_SECTION: &str = "=== PROCESS EFFICIENCY ===";
pub const PROCESS_HEADER: &str =
    "Process Name,Cycle Time (hrs),Error Rate (%),Cost,Date,Category,Status,Created At";

pub fn can_export(financial: &[FinancialCloseRecord], process: &[ProcessEfficiencyRecord]) -> bool {
    !(financial.is_empty() && process.is_empty())
}

pub fn export_file_name(date: NaiveDate) -> String {
    format!("CFO_Dashboard_Export_{}.csv", date.format("%Y-%m-%d"))
}

/// Renders both collections as one delimited artifact with two labelled sections.
pub fn export_csv(
    financial: &[FinancialCloseRecord],
    process: &[ProcessEfficiencyRecord],
) -> Result<String> {
    if !can_export(financial, process) {
        return Err(DashboardError::NothingToExport);
    }

    let mut out = String::new();
    writeln!(out, "{}", FINANCIAL_SECTION).map_err(fmt_error)?;
    writeln!(out, "{}", FINANCIAL_HEADER).map_err(fmt_error)?;
    for row in financial {
        writeln!(
            out,
            "{},{},{},{},{},{},{}",
            row.period,
            row.close_days,
            row.automation_rate,
            row.reconciliation_items,
            row.region,
            row.department,
            timestamp(&row.created_at)
        )
        .map_err(fmt_error)?;
    }

    writeln!(out).map_err(fmt_error)?;
    writeln!(out, "{}", PROCESS_SECTION).map_err(fmt_error)?;
    writeln!(out, "{}", PROCESS_HEADER).map_err(fmt_error)?;
    for row in process {
        writeln!(
            out,
            "\"{}\",{},{},{},{},{},{},{}",
            row.process_name.replace('"', "\"\""),
            row.cycle_time,
            row.error_rate,
            row.cost,
            row.date,
            row.category,
            row.status,
            timestamp(&row.created_at)
        )
        .map_err(fmt_error)?;
    }

    Ok(out)
}

/// Writes the export into `dir` under the dated file name and returns its path.
pub fn write_export(
    dir: &Path,
    date: NaiveDate,
    financial: &[FinancialCloseRecord],
    process: &[ProcessEfficiencyRecord],
) -> Result<PathBuf> {
    let content = export_csv(financial, process)?;
    let path = dir.join(export_file_name(date));
    std::fs::write(&path, content)?;

    info!(
        "Exported {} financial and {} process rows to {}",
        financial.len(),
        process.len(),
        path.display()
    );
    Ok(path)
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn fmt_error(e: std::fmt::Error) -> DashboardError {
    DashboardError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e))
}
