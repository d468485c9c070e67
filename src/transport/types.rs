use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Stream of notification payloads from one characteristic, in arrival order.
pub type NotificationStream = mpsc::UnboundedReceiver<Bytes>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteMode {
    /// Acknowledged write.
    WithResponse,
    /// Unacknowledged write, used for bulk payload chunks.
    WithoutResponse,
}

/// Logical channel of the lap timer link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Control,
    Data,
}

/// Live connection as seen by the adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub service: Uuid,
    pub device_name: String,
    pub connected_at: DateTime<Utc>,
}
