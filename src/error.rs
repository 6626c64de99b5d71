/*!
# Error Module

Crate-level error type for the exporter. Each subsystem owns a narrower error
enum (`TailError`, `ParseError`, `ApiError`) and converts into [`Error`] at the
worker boundary.

## Error Categories

Errors fall into the categories the workers react to differently:
- Environment-absent: a log family directory does not exist. Never surfaced as an
  error; the tailer reports it as an idle poll.
- Transient I/O: open/read/seek failures. Logged, backed off, retried.
- Malformed input: a line that fails shape validation. Dropped at debug level.
- Remote API failures: retried a bounded number of times, then the caller falls
  back to cached data.

Nothing here is fatal to the process. `Error::is_retryable` tells a worker loop
whether backing off and trying again can help.
*/

use thiserror::Error;

use crate::api::ApiError;
use crate::event::ParseError;
use crate::tail::TailError;

/// Core exporter error type
#[derive(Error, Debug)]
pub enum Error {
    /// Log tailing error
    #[error("Tail error: {0}")]
    Tail(#[from] TailError),

    /// Log line parse error
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Remote validator API error
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Metrics registration, encoding or endpoint error
    #[error("Metrics error: {0}")]
    Metrics(String),
}

impl Error {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Tail(_) => true,
            Error::Parse(_) => false,
            Error::Api(e) => e.is_retryable(),
            Error::Io(_) => true,
            Error::Config(_) => false,
            Error::Metrics(_) => false,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Metrics(err.to_string())
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Config(s.to_string())
    }
}
