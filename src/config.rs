//! Client configuration
//!
//! Everything tunable about the link lives here: GATT identifiers, the
//! transfer engine's timing constants and the status display delay.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// GATT service and characteristics exposed by the lap timer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceIds {
    pub service: Uuid,
    pub control: Uuid,
    pub data: Uuid,
}

impl Default for ServiceIds {
    fn default() -> Self {
        Self {
            service: Uuid::from_u128(0x0000_1ff8_0000_1000_8000_0080_5f9b_34fb),
            control: Uuid::from_u128(0x0000_0005_0000_1000_8000_0080_5f9b_34fb),
            data: Uuid::from_u128(0x0000_0006_0000_1000_8000_0080_5f9b_34fb),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest payload written to the data characteristic in one write.
    pub chunk_size: usize,
    /// How long a listing may take before it fails.
    pub list_timeout: Duration,
    /// Grace period after `DONE;DIR=TX` for notifications that raced it.
    pub settle_delay: Duration,
    /// Ceiling for downloads and uploads. `None` waits forever.
    pub transfer_timeout: Option<Duration>,
    /// Pace for upload chunk writes (0 = unpaced).
    pub upload_chunks_per_second: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 160,
            list_timeout: Duration::from_secs(3),
            settle_delay: Duration::from_millis(80),
            transfer_timeout: Some(Duration::from_secs(120)),
            upload_chunks_per_second: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub service: ServiceIds,
    pub engine: EngineConfig,
    /// How long the `done` phase is shown before returning to `idle`.
    pub done_display_delay: Duration,
    /// Download the newest session right after connecting.
    pub auto_download_newest: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service: ServiceIds::default(),
            engine: EngineConfig::default(),
            done_display_delay: Duration::from_millis(800),
            auto_download_newest: true,
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Load a JSON config file. Missing keys take their defaults.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_json_str(&text)?)
    }
}
