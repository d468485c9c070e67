//! Lap timer link
//!
//! Talks to a lap timer over Bluetooth LE: lists and downloads lap logs,
//! downloads and uploads the track-definitions file, and decodes both into
//! typed records.

pub mod client;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod protocol;
pub mod records;
pub mod status;
pub mod transport;

pub use client::{ClientError, ClientResult, ClientState, LapTimerClient};
pub use config::ClientConfig;
