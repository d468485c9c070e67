//! Transport adapter over the platform's wireless primitive
//!
//! The lap timer exposes two characteristics on one GATT service:
//! - control: short command/response lines
//! - data: bulk payload bytes, notification driven
//!
//! [`TransportAdapter`] is the only type that talks to a [`BlePlatform`].

pub mod adapter;
pub mod error;
pub mod platform;
pub mod simulated;
pub mod types;

#[cfg(feature = "btleplug")]
pub mod btle;

pub use adapter::TransportAdapter;
pub use error::{TransportError, TransportResult};
pub use platform::BlePlatform;
pub use simulated::{ConnectBehavior, DeviceProfile, ListShape, SimulatedDevice};
pub use types::{Channel, ConnectionHandle, NotificationStream, WriteMode};

#[cfg(feature = "btleplug")]
pub use btle::BtlePlatform;
