use thiserror::Error;

/// Validator summaries API errors
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport failure or client timeout
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body is not a list of summaries
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Every attempt failed
    #[error("Giving up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<ApiError>,
    },
}

impl ApiError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Request(e) => !e.is_builder(),
            ApiError::Status { status, .. } => *status == 429 || *status >= 500,
            ApiError::Decode(_) => false,
            ApiError::Exhausted { .. } => false,
        }
    }
}
