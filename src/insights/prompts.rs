// Prompt templates for the narrative insight intents

use super::types::*;
use crate::error::Result;

pub const CLOSE_PERFORMANCE_INSTRUCTIONS: &str = r#"
Provide 2-3 sentences:
1. Overall performance vs target
2. Departments needing attention
3. Trend direction

Start with "Your average close cycle..." and be actionable."#;

pub const AUTOMATION_INSTRUCTIONS: &str = r#"
Identify:
1. Top process to automate (highest ROI based on error rate and cost)
2. Expected error reduction with automation
3. Annual savings estimate

Be specific with process names and numbers."#;

pub const ANOMALY_INSTRUCTIONS: &str = r#"
1. Are there concerning anomalies?
2. Root cause hypothesis
3. Month-end prediction

Start with "Warning:" if anomaly exists, "On track:" if normal."#;

pub const QUERY_INSTRUCTIONS: &str = r#"
Provide a clear conversational answer:
- Include specific metrics when relevant
- Keep under 150 words
- End with actionable insight

Natural language response with data citations."#;

/// Renders the model prompt for a validated request.
pub fn compose_prompt(request: &InsightRequest) -> Result<String> {
    request.validate()?;

    let prompt = match &request.payload {
        InsightPayload::ClosePerformance(data) => format!(
            "Analyze this financial close data:\nCurrent Average: {} days (Target: {} days)\nDepartment Performance: {}\n3-Month Trend: {}\n{}",
            data.avg_close_days,
            crate::anomaly::CLOSE_DAYS_TARGET,
            serde_json::to_string(&data.department_data)?,
            serde_json::to_string(&data.trend_data)?,
            CLOSE_PERFORMANCE_INSTRUCTIONS
        ),
        InsightPayload::Automation(data) => {
            let lines: Vec<String> = data
                .manual_processes
                .iter()
                .map(|p| format!("{}: {}% errors, ${}/month", p.process_name, p.error_rate, p.cost))
                .collect();
            format!(
                "Analyze these processes with high error rates:\n{}\n{}",
                lines.join("\n"),
                AUTOMATION_INSTRUCTIONS
            )
        }
        InsightPayload::Anomaly(data) => format!(
            "Analyze for anomalies:\n12-Month Baseline: {}\nCurrent Month: {}\nOutliers: {}\n{}",
            serde_json::to_string(&data.baseline)?,
            serde_json::to_string(&data.current_month)?,
            serde_json::to_string(&data.outliers)?,
            ANOMALY_INSTRUCTIONS
        ),
        InsightPayload::Query(data) => format!(
            "User Question: \"{}\"\n\nData Context:\nFinancial Metrics: {}\nProcess Data: {}\n{}",
            request.user_query.as_deref().unwrap_or_default(),
            serde_json::to_string(&data.financial_data)?,
            serde_json::to_string(&data.process_data)?,
            QUERY_INSTRUCTIONS
        ),
    };

    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_automation_prompt_lists_processes() {
        let request = InsightRequest::new(InsightPayload::Automation(AutomationPayload {
            manual_processes: vec![
                ManualProcess {
                    process_name: "Invoice Matching".to_string(),
                    error_rate: 6.5,
                    cost: 12000.0,
                },
                ManualProcess {
                    process_name: "Expense Review".to_string(),
                    error_rate: 3.2,
                    cost: 800.0,
                },
            ],
        }));

        let prompt = compose_prompt(&request).unwrap();
        assert!(prompt.contains("Invoice Matching: 6.5% errors, $12000/month"));
        assert!(prompt.contains("Expense Review: 3.2% errors, $800/month"));
        assert!(prompt.contains("highest ROI"));
    }

    #[test]
    fn test_query_prompt_quotes_question() {
        let request = InsightRequest::query(
            QueryPayload {
                financial_data: vec![FinancialSample {
                    period: "2024-03-31".to_string(),
                    department: "Tax".to_string(),
                    close_days: 7.0,
                    automation_rate: 55.0,
                }],
                process_data: vec![],
            },
            "Why is Tax slow to close?",
        );

        let prompt = compose_prompt(&request).unwrap();
        assert!(prompt.starts_with("User Question: \"Why is Tax slow to close?\""));
        assert!(prompt.contains("\"closeDays\":7.0"));
    }

    #[test]
    fn test_invalid_request_is_rejected() {
        let request = InsightRequest::new(InsightPayload::Automation(AutomationPayload {
            manual_processes: vec![],
        }));
        assert!(compose_prompt(&request).is_err());
    }
}
