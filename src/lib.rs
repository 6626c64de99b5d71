pub mod api;
pub mod cache;
pub mod config;
pub mod event;
pub mod identity;
pub mod monitor;
pub mod sink;
pub mod tail;
pub mod tracker;

// Re-exports
pub use config::{Chain, ExporterConfig, LogFamily};
pub use event::{ConsensusEvent, ParseError};
pub use identity::{IdentityResolver, ValidatorLabels};
pub use monitor::{Dispatcher, Exporter};
pub use sink::{MetricsSink, PrometheusSink};
pub use tail::{LogTailer, TailOutcome};

// Core types
pub type Result<T> = std::result::Result<T, Error>;
pub use error::Error;

pub mod error;
