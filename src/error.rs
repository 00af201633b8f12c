use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to fetch {collection}: {message}")]
    Fetch { collection: String, message: String },

    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Insight endpoint returned status {status}: {message}")]
    Endpoint { status: u16, message: String },

    #[error("Insight response carried no text")]
    EmptyInsight,

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Invalid insight payload: {0}")]
    InvalidPayload(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Nothing to export: both collections are empty")]
    NothingToExport,

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DashboardError {
    /// Transport failures and server-side hiccups are worth another attempt;
    /// everything else is terminal for the request that produced it.
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "http")]
            DashboardError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            DashboardError::Endpoint { status, .. } => *status == 429 || *status >= 500,
            DashboardError::RateLimited(_) | DashboardError::Timeout(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;
