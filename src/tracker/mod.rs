//! Derived statistics kept by the event consumers.
//!
//! Each tracker is owned by exactly one dispatcher and needs no locking.

pub mod connectivity;
pub mod heartbeat;
pub mod participation;

pub use connectivity::{ConnectivityDelta, ConnectivityTracker};
pub use heartbeat::{HeartbeatCorrelator, HeartbeatMatch, HeartbeatRecord, HEARTBEAT_RETENTION_SECS};
pub use participation::{ParticipationConfig, ParticipationTracker, WindowEntry};
