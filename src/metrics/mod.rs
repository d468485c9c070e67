//! Metrics for link operations
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding application installs a recorder.
//!
//! Key metrics:
//! - Bytes moved over the data channel
//! - Transfers started, completed and failed per operation
//! - Transfer duration
//! - Malformed control events

pub mod recorder;

pub use recorder::{init_metrics, record_malformed_event, TransferMetrics};
