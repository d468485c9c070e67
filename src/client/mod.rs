//! Application-facing facade
//!
//! [`LapTimerClient`] owns the engine and the status projector and exposes
//! the operations and observable fields presentation works with.

pub mod client;
pub mod error;

pub use client::{ClientState, LapTimerClient};
pub use error::{ClientError, ClientResult};
