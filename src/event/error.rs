use thiserror::Error;

/// Log line parse errors
#[derive(Error, Debug)]
pub enum ParseError {
    /// Line is not valid JSON
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON is valid but not one of the known line shapes
    #[error("Unexpected shape: {0}")]
    Shape(String),

    /// Timestamp does not match the node's log format
    #[error("Invalid timestamp: {0}")]
    Timestamp(String),

    /// A field the event cannot do without is empty or zero
    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

impl ParseError {
    pub fn shape(message: impl Into<String>) -> Self {
        ParseError::Shape(message.into())
    }
}
