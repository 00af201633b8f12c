use super::types::*;
use crate::error::Result;
use async_trait::async_trait;

/// Anything that turns an insight request into narrative text.
#[async_trait]
pub trait InsightBackend: Send + Sync {
    async fn generate(&self, request: &InsightRequest) -> Result<String>;
}

#[cfg(feature = "http")]
pub use http::{InsightsEndpoint, MessagesApiBackend};

#[cfg(feature = "http")]
mod http {
    use super::*;
    use crate::error::DashboardError;
    use crate::insights::prompts::compose_prompt;
    use log::{debug, error};
    use reqwest::{Client, StatusCode};
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    const MESSAGES_BASE_URL: &str = "https://api.anthropic.com/v1";
    const MESSAGES_API_VERSION: &str = "2023-06-01";
    pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
    pub const DEFAULT_MAX_TOKENS: u32 = 500;
    const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please try again in a few seconds.";
    const NO_INSIGHT: &str = "Unable to generate insight.";

    /// Remote narrative service accepting `{type, data, userQuery?}`.
    #[derive(Clone)]
    pub struct InsightsEndpoint {
        client: Client,
        url: String,
        api_key: Option<String>,
    }

    impl InsightsEndpoint {
        pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
            let client = Client::builder().timeout(timeout).build()?;
            Ok(Self {
                client,
                url: url.into(),
                api_key,
            })
        }

        pub fn from_config(config: &crate::config::DashboardConfig) -> Result<Self> {
            Self::new(
                config.insights_url.clone(),
                config
                    .insights_api_key
                    .clone()
                    .or_else(|| Some(config.store_api_key.clone()).filter(|k| !k.is_empty())),
                config.request_timeout(),
            )
        }
    }

    #[async_trait]
    impl InsightBackend for InsightsEndpoint {
        async fn generate(&self, request: &InsightRequest) -> Result<String> {
            request.validate()?;
            debug!("Requesting {} insight", request.insight_type());

            let mut builder = self.client.post(&self.url).json(request);
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }
            let res = builder.send().await?;
            let status = res.status();

            if status.is_success() {
                let body: InsightResponse = res.json().await?;
                return insight_text(status.as_u16(), body);
            }

            // Error bodies are best effort; the status alone decides the outcome.
            let detail = res
                .json::<InsightResponse>()
                .await
                .ok()
                .and_then(|body| body.error);
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(DashboardError::RateLimited(
                    detail.unwrap_or_else(|| RATE_LIMIT_MESSAGE.to_string()),
                ));
            }
            let message = detail
                .unwrap_or_else(|| format!("{} insight request failed", request.insight_type()));
            error!("Insight endpoint error (status {}): {}", status, message);
            Err(DashboardError::Endpoint {
                status: status.as_u16(),
                message,
            })
        }
    }

    fn insight_text(status: u16, body: InsightResponse) -> Result<String> {
        match (body.insight, body.error) {
            (Some(text), _) if !text.trim().is_empty() => Ok(text),
            (_, Some(message)) => Err(DashboardError::Endpoint { status, message }),
            _ => Err(DashboardError::EmptyInsight),
        }
    }

    #[derive(Serialize)]
    struct MessagesRequest<'a> {
        model: &'a str,
        max_tokens: u32,
        messages: Vec<MessageTurn<'a>>,
    }

    #[derive(Serialize)]
    struct MessageTurn<'a> {
        role: &'a str,
        content: &'a str,
    }

    #[derive(Deserialize)]
    struct MessagesResponse {
        #[serde(default)]
        content: Vec<ContentBlock>,
    }

    #[derive(Deserialize)]
    struct ContentBlock {
        #[serde(default)]
        text: Option<String>,
    }

    /// Composes prompts locally and calls a messages-style model API directly.
    #[derive(Clone)]
    pub struct MessagesApiBackend {
        client: Client,
        api_key: String,
        base_url: String,
        model: String,
        max_tokens: u32,
    }

    impl MessagesApiBackend {
        pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
            let client = Client::builder().timeout(timeout).build()?;
            Ok(Self {
                client,
                api_key: api_key.into(),
                base_url: MESSAGES_BASE_URL.to_string(),
                model: DEFAULT_MODEL.to_string(),
                max_tokens: DEFAULT_MAX_TOKENS,
            })
        }

        pub fn with_model(mut self, model: impl Into<String>) -> Self {
            self.model = model.into();
            self
        }

        pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
            self.base_url = base_url.into().trim_end_matches('/').to_string();
            self
        }
    }

    #[async_trait]
    impl InsightBackend for MessagesApiBackend {
        async fn generate(&self, request: &InsightRequest) -> Result<String> {
            let prompt = compose_prompt(request)?;
            let payload = MessagesRequest {
                model: &self.model,
                max_tokens: self.max_tokens,
                messages: vec![MessageTurn {
                    role: "user",
                    content: &prompt,
                }],
            };

            let res = self
                .client
                .post(format!("{}/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", MESSAGES_API_VERSION)
                .json(&payload)
                .send()
                .await?;

            let status = res.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(DashboardError::RateLimited(RATE_LIMIT_MESSAGE.to_string()));
            }
            if !status.is_success() {
                let err_text = res.text().await?;
                error!("Messages API error (status {}): {}", status, err_text);
                return Err(DashboardError::Endpoint {
                    status: status.as_u16(),
                    message: format!("Messages API error: {}", status.as_u16()),
                });
            }

            let body: MessagesResponse = res.json().await?;
            let text = body
                .content
                .into_iter()
                .next()
                .and_then(|block| block.text)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| NO_INSIGHT.to_string());
            Ok(text)
        }
    }

}
