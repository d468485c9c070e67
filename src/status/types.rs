use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Connecting,
    Listing,
    Downloading,
    Done,
    Error,
}

/// The single status object observed by presentation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatus {
    pub phase: Phase,
    pub device_name: String,
    /// File being downloaded.
    pub file_name: String,
    /// 0-100 while downloading; `None` when unknown.
    pub progress: Option<u8>,
    pub error_msg: String,
    /// Bumped whenever a new operation starts.
    pub generation: u64,
}

impl LinkStatus {
    pub fn is_busy(&self) -> bool {
        matches!(
            self.phase,
            Phase::Connecting | Phase::Listing | Phase::Downloading
        )
    }

    pub fn is_error(&self) -> bool {
        self.phase == Phase::Error
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    ConnectRequested,
    DeviceAcquired { device_name: String },
    SelectionCancelled,
    ListingStarted,
    DownloadStarted { file_name: String },
    Progress { percent: Option<u8> },
    Completed,
    /// Display delay after `Completed` elapsed for operation `generation`.
    Settled { generation: u64 },
    Failed { message: String },
    Dismissed,
    Disconnected,
}
