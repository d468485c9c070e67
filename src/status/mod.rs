//! Link status projection
//!
//! Folds connection, listing and download activity into one status object
//! that presentation observes.

pub mod error;
pub mod projector;
pub mod types;

pub use error::{StatusError, StatusResult};
pub use projector::StatusProjector;
pub use types::{LinkStatus, Phase, StatusEvent};
