use serde::{Deserialize, Serialize};

use crate::protocol::{Command, SizeTarget, TRACKS_FILE_NAME};

/// File requested from the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadTarget {
    Session(String),
    Tracks,
}

impl DownloadTarget {
    pub fn command(&self) -> Command {
        match self {
            DownloadTarget::Session(name) => Command::Get { name: name.clone() },
            DownloadTarget::Tracks => Command::GetTracks,
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            DownloadTarget::Session(name) => name,
            DownloadTarget::Tracks => TRACKS_FILE_NAME,
        }
    }

    pub fn size_target(&self) -> SizeTarget {
        match self {
            DownloadTarget::Session(_) => SizeTarget::Session,
            DownloadTarget::Tracks => SizeTarget::Tracks,
        }
    }
}

/// Progress of one download, reported after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub file_name: String,
    pub received_bytes: u64,
    pub expected_size: Option<u64>,
    /// 0-100, or `None` while the size is unknown.
    pub percent: Option<u8>,
}
