use crate::error::{DashboardError, Result};
use crate::projections::{DepartmentAverage, PeriodAverage};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_QUERY_SAMPLE: usize = 20;
pub const MAX_TREND_PERIODS: usize = 3;

pub const CLOSE_PERFORMANCE_FALLBACK: &str = "Unable to analyze close performance.";
pub const AUTOMATION_FALLBACK: &str = "Unable to analyze automation opportunities.";
pub const ANOMALY_FALLBACK: &str = "Unable to analyze anomalies.";
pub const WELL_AUTOMATED_MESSAGE: &str =
    "All processes are well-automated with low error rates. Focus on maintaining current performance.";
pub const TOO_SHORT_REPLY: &str = "Please be more specific with your question. Try asking about specific metrics, trends, or comparisons.";
pub const EMPTY_ANSWER_REPLY: &str = "Unable to process your question.";
pub const QUERY_ERROR_REPLY: &str =
    "Sorry, I encountered an error processing your question. Please try again.";
pub const RATE_LIMIT_WARNING: &str = "Please wait a few seconds before sending another query.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    ClosePerformance,
    Automation,
    Anomaly,
    Query,
}

impl InsightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightType::ClosePerformance => "close_performance",
            InsightType::Automation => "automation",
            InsightType::Anomaly => "anomaly",
            InsightType::Query => "query",
        }
    }

    /// Text shown in place of an automated insight that could not be generated.
    pub fn fallback(&self) -> &'static str {
        match self {
            InsightType::ClosePerformance => CLOSE_PERFORMANCE_FALLBACK,
            InsightType::Automation => AUTOMATION_FALLBACK,
            InsightType::Anomaly => ANOMALY_FALLBACK,
            InsightType::Query => QUERY_ERROR_REPLY,
        }
    }
}

impl fmt::Display for InsightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClosePerformancePayload {
    #[schemars(description = "Mean close days over the filtered view, one decimal place")]
    pub avg_close_days: String,
    pub department_data: Vec<DepartmentAverage>,
    #[schemars(description = "Most recent periods first, at most three")]
    pub trend_data: Vec<PeriodAverage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ManualProcess {
    pub process_name: String,
    pub error_rate: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutomationPayload {
    pub manual_processes: Vec<ManualProcess>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BaselineStats {
    pub avg_error_rate: String,
    pub std_dev: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CurrentMonthStats {
    pub month: String,
    pub avg_error_rate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutlierSummary {
    pub name: String,
    pub error_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyPayload {
    pub baseline: BaselineStats,
    pub current_month: CurrentMonthStats,
    pub outliers: Vec<OutlierSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSample {
    pub period: String,
    pub department: String,
    pub close_days: f64,
    pub automation_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSample {
    pub name: String,
    pub category: String,
    pub cycle_time: f64,
    pub error_rate: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryPayload {
    pub financial_data: Vec<FinancialSample>,
    pub process_data: Vec<ProcessSample>,
}

/// One payload per intent; serializes as `{ "type": ..., "data": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InsightPayload {
    ClosePerformance(ClosePerformancePayload),
    Automation(AutomationPayload),
    Anomaly(AnomalyPayload),
    Query(QueryPayload),
}

impl InsightPayload {
    pub fn insight_type(&self) -> InsightType {
        match self {
            InsightPayload::ClosePerformance(_) => InsightType::ClosePerformance,
            InsightPayload::Automation(_) => InsightType::Automation,
            InsightPayload::Anomaly(_) => InsightType::Anomaly,
            InsightPayload::Query(_) => InsightType::Query,
        }
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(InsightPayload)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}

/// Wire shape accepted by the narrative endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightRequest {
    #[serde(flatten)]
    pub payload: InsightPayload,
    #[serde(rename = "userQuery", skip_serializing_if = "Option::is_none")]
    pub user_query: Option<String>,
}

impl InsightRequest {
    pub fn new(payload: InsightPayload) -> Self {
        Self {
            payload,
            user_query: None,
        }
    }

    pub fn query(payload: QueryPayload, user_query: impl Into<String>) -> Self {
        Self {
            payload: InsightPayload::Query(payload),
            user_query: Some(user_query.into()),
        }
    }

    pub fn insight_type(&self) -> InsightType {
        self.payload.insight_type()
    }

    /// Checks the payload against its schema's invariants before it leaves the process.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(DashboardError::InvalidPayload(msg));

        match (&self.payload, &self.user_query) {
            (InsightPayload::Query(_), None) => {
                return invalid("query requests need a user question".to_string())
            }
            (InsightPayload::Query(_), Some(q)) if q.trim().is_empty() => {
                return invalid("user question is blank".to_string())
            }
            (InsightPayload::Query(_), Some(_)) => {}
            (other, Some(_)) => {
                return invalid(format!(
                    "{} requests must not carry a user question",
                    other.insight_type()
                ))
            }
            _ => {}
        }

        match &self.payload {
            InsightPayload::ClosePerformance(p) => {
                let values = p
                    .department_data
                    .iter()
                    .map(|d| d.avg_close_days)
                    .chain(p.trend_data.iter().map(|t| t.avg_close_days));
                if let Some(bad) = values.into_iter().find(|v| !v.is_finite()) {
                    return invalid(format!("non-finite close-day average {}", bad));
                }
                if p.trend_data.len() > MAX_TREND_PERIODS {
                    return invalid(format!(
                        "trend data has {} periods, at most {} allowed",
                        p.trend_data.len(),
                        MAX_TREND_PERIODS
                    ));
                }
            }
            InsightPayload::Automation(p) => {
                if p.manual_processes.is_empty() {
                    return invalid("automation request without manual processes".to_string());
                }
                if p.manual_processes.len() > crate::anomaly::MAX_MANUAL_CANDIDATES {
                    return invalid(format!(
                        "{} manual processes, at most {} allowed",
                        p.manual_processes.len(),
                        crate::anomaly::MAX_MANUAL_CANDIDATES
                    ));
                }
                if p
                    .manual_processes
                    .iter()
                    .any(|m| !m.error_rate.is_finite() || !m.cost.is_finite())
                {
                    return invalid("manual process with non-finite figures".to_string());
                }
            }
            InsightPayload::Anomaly(p) => {
                if p.outliers.len() > crate::anomaly::MAX_OUTLIERS {
                    return invalid(format!(
                        "{} outliers, at most {} allowed",
                        p.outliers.len(),
                        crate::anomaly::MAX_OUTLIERS
                    ));
                }
            }
            InsightPayload::Query(p) => {
                if p.financial_data.len() > MAX_QUERY_SAMPLE
                    || p.process_data.len() > MAX_QUERY_SAMPLE
                {
                    return invalid(format!(
                        "query sample exceeds {} rows per collection",
                        MAX_QUERY_SAMPLE
                    ));
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightResponse {
    #[serde(default)]
    pub insight: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightData {
    pub close_performance: Option<String>,
    pub automation: Option<String>,
    pub anomaly: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Session chat history. Messages can only be appended.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role: ChatRole::User,
            content: content.into(),
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role: ChatRole::Assistant,
            content: content.into(),
        });
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let request = InsightRequest::new(InsightPayload::Automation(AutomationPayload {
            manual_processes: vec![ManualProcess {
                process_name: "Vendor Onboarding".to_string(),
                error_rate: 4.5,
                cost: 15000.0,
            }],
        }));

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "automation",
                "data": {
                    "manualProcesses": [
                        { "process_name": "Vendor Onboarding", "error_rate": 4.5, "cost": 15000.0 }
                    ]
                }
            })
        );
    }

    #[test]
    fn test_query_request_carries_user_query() {
        let request = InsightRequest::query(
            QueryPayload {
                financial_data: vec![],
                process_data: vec![],
            },
            "Which department closes slowest?",
        );
        request.validate().unwrap();

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "query");
        assert_eq!(value["userQuery"], "Which department closes slowest?");
        assert_eq!(value["data"]["financialData"], json!([]));
    }

    #[test]
    fn test_validation_rules() {
        let empty_automation =
            InsightRequest::new(InsightPayload::Automation(AutomationPayload {
                manual_processes: vec![],
            }));
        assert!(empty_automation.validate().is_err());

        let stray_question = InsightRequest {
            payload: InsightPayload::Anomaly(AnomalyPayload {
                baseline: BaselineStats {
                    avg_error_rate: "2.00".to_string(),
                    std_dev: "1.00".to_string(),
                },
                current_month: CurrentMonthStats {
                    month: "2024-03".to_string(),
                    avg_error_rate: "2.50".to_string(),
                },
                outliers: vec![],
            }),
            user_query: Some("why?".to_string()),
        };
        assert!(matches!(
            stray_question.validate(),
            Err(DashboardError::InvalidPayload(_))
        ));

        let oversized = InsightRequest::query(
            QueryPayload {
                financial_data: vec![
                    FinancialSample {
                        period: "2024-03-31".to_string(),
                        department: "Tax".to_string(),
                        close_days: 5.0,
                        automation_rate: 60.0,
                    };
                    MAX_QUERY_SAMPLE + 1
                ],
                process_data: vec![],
            },
            "How are we trending this quarter?",
        );
        assert!(oversized.validate().is_err());
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = InsightPayload::schema_as_json().unwrap();
        assert!(schema_json.contains("manualProcesses"));
        assert!(schema_json.contains("close_performance"));
        assert!(!schema_json.contains("userQuery"));
    }

    #[test]
    fn test_transcript_is_append_only() {
        let mut transcript = Transcript::new();
        transcript.push_user("How fast do we close?");
        transcript.push_assistant("Your average close cycle is 6.2 days.");

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[0].role, ChatRole::User);
        assert_eq!(transcript.last().unwrap().role, ChatRole::Assistant);
    }
}
