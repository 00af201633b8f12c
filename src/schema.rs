use chrono::{DateTime, Utc};
use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub const ALL_REGIONS: &str = "All Regions";
pub const ALL_DEPARTMENTS: &str = "All Departments";

pub const REGIONS: [&str; 5] = [
    "North America",
    "Europe",
    "Asia Pacific",
    "Latin America",
    "Global",
];

pub const DEPARTMENTS: [&str; 6] = [
    "Accounts Payable",
    "Accounts Receivable",
    "General Ledger",
    "Treasury",
    "Tax",
    "Reporting",
];

/// Collection names as they exist in the record store.
pub const FINANCIAL_CLOSE_TABLE: &str = "financial_close_metrics";
pub const PROCESS_EFFICIENCY_TABLE: &str = "process_efficiency";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinancialCloseRecord {
    #[schemars(description = "Opaque identifier assigned by the record store")]
    pub id: String,

    #[schemars(
        description = "Reporting period as an ISO-like month-end date string (e.g., '2024-03-31'). Lexicographic order equals chronological order."
    )]
    #[serde(default, deserialize_with = "null_as_empty")]
    #[schemars(with = "Option<String>")]
    pub period: String,

    #[schemars(description = "Days taken to close the books for this period and department")]
    pub close_days: f64,

    #[schemars(description = "Share of close work performed without manual intervention, 0-100")]
    pub automation_rate: f64,

    #[schemars(description = "Number of open reconciliation items")]
    pub reconciliation_items: i64,

    pub region: String,

    pub department: String,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProcessEfficiencyRecord {
    pub id: String,

    pub process_name: String,

    #[schemars(description = "Elapsed hours the process took to complete")]
    pub cycle_time: f64,

    #[schemars(description = "Error rate as a percentage (e.g., 4.2 means 4.2%)")]
    pub error_rate: f64,

    #[schemars(description = "Monthly cost of running the process")]
    pub cost: f64,

    #[schemars(description = "Calendar date string (YYYY-MM-DD) the observation belongs to")]
    #[serde(default, deserialize_with = "null_as_empty")]
    #[schemars(with = "Option<String>")]
    pub date: String,

    pub category: String,

    pub status: ProcessStatus,

    pub created_at: DateTime<Utc>,
}

// Nullable date columns come back as `null`; they load as "" and are placed
// at the reference day when filtering.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Lifecycle state of a process observation.
///
/// The store holds free text, so parsing is case-insensitive and anything
/// unrecognised is kept verbatim in [`ProcessStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProcessStatus {
    Completed,
    InProgress,
    Pending,
    Failed,
    Other(String),
}

impl ProcessStatus {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase().replace(['-', '_'], " ");
        match normalized.as_str() {
            "completed" => ProcessStatus::Completed,
            "in progress" => ProcessStatus::InProgress,
            "pending" => ProcessStatus::Pending,
            "failed" => ProcessStatus::Failed,
            _ => ProcessStatus::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ProcessStatus::Completed => "Completed",
            ProcessStatus::InProgress => "In Progress",
            ProcessStatus::Pending => "Pending",
            ProcessStatus::Failed => "Failed",
            ProcessStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for ProcessStatus {
    fn from(raw: String) -> Self {
        ProcessStatus::parse(&raw)
    }
}

impl From<ProcessStatus> for String {
    fn from(status: ProcessStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl JsonSchema for ProcessStatus {
    fn schema_name() -> String {
        "ProcessStatus".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}

/// Both collections as returned by one fetch round.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordSet {
    pub financial: Vec<FinancialCloseRecord>,
    pub process: Vec<ProcessEfficiencyRecord>,
}

impl RecordSet {
    pub fn new(
        financial: Vec<FinancialCloseRecord>,
        process: Vec<ProcessEfficiencyRecord>,
    ) -> Self {
        Self {
            financial,
            process,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.financial.is_empty() && self.process.is_empty()
    }

    pub fn counts(&self) -> (usize, usize) {
        (self.financial.len(), self.process.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing_is_case_insensitive() {
        assert_eq!(ProcessStatus::parse("completed"), ProcessStatus::Completed);
        assert_eq!(ProcessStatus::parse("COMPLETED"), ProcessStatus::Completed);
        assert_eq!(ProcessStatus::parse("In Progress"), ProcessStatus::InProgress);
        assert_eq!(ProcessStatus::parse("in-progress"), ProcessStatus::InProgress);
        assert_eq!(ProcessStatus::parse("IN_PROGRESS"), ProcessStatus::InProgress);
        assert_eq!(
            ProcessStatus::parse("optimal"),
            ProcessStatus::Other("optimal".to_string())
        );
    }

    #[test]
    fn test_process_record_deserialization() {
        let json = r#"{
            "id": "p-1",
            "process_name": "Invoice Matching",
            "cycle_time": 12.5,
            "error_rate": 4.2,
            "cost": 15000,
            "date": "2024-03-15",
            "category": "Accounts Payable",
            "status": "in progress",
            "created_at": "2024-03-15T10:30:00.123456+00:00"
        }"#;

        let record: ProcessEfficiencyRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.status, ProcessStatus::InProgress);
        assert_eq!(record.cost, 15000.0);

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["status"], "In Progress");
    }

    #[test]
    fn test_null_or_missing_dates_load_as_empty() {
        let json = r#"[
            {
                "id": "p-1",
                "process_name": "Payroll Run",
                "cycle_time": 8,
                "error_rate": 0.5,
                "cost": 6000,
                "date": null,
                "category": "Payroll",
                "status": "pending",
                "created_at": "2024-03-15T10:30:00Z"
            },
            {
                "id": "p-2",
                "process_name": "Payroll Run",
                "cycle_time": 8,
                "error_rate": 0.5,
                "cost": 6000,
                "category": "Payroll",
                "status": "pending",
                "created_at": "2024-03-15T10:30:00Z"
            }
        ]"#;
        let records: Vec<ProcessEfficiencyRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.date.is_empty()));

        let close = r#"{
            "id": "f-1",
            "period": null,
            "close_days": 6,
            "automation_rate": 70,
            "reconciliation_items": 4,
            "region": "Europe",
            "department": "Tax",
            "created_at": "2024-03-15T10:30:00Z"
        }"#;
        let record: FinancialCloseRecord = serde_json::from_str(close).unwrap();
        assert_eq!(record.period, "");
    }

    #[test]
    fn test_record_set_counts() {
        let set = RecordSet::default();
        assert!(set.is_empty());
        assert_eq!(set.counts(), (0, 0));
    }
}
