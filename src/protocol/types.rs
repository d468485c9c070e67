use serde::{Deserialize, Serialize};

/// Name of the reserved track-definitions file on the device.
pub const TRACKS_FILE_NAME: &str = "TRACKS.CSV";

/// A file advertised by the device in a listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    pub size: u64,
}

impl RemoteFile {
    /// Build an entry, keeping only the basename of `name`.
    pub fn new(name: &str, size: u64) -> Self {
        Self {
            name: basename(name).to_string(),
            size,
        }
    }
}

/// Strip any leading directory components from a device path.
pub fn basename(name: &str) -> &str {
    match name.rfind('/') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// Commands written by the client to the control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Get { name: String },
    GetTracks,
    PutTracks { size: usize },
    Done,
}

/// Which download a size announcement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeTarget {
    Session,
    Tracks,
}

/// Direction carried by a `CMD=DONE` event, seen from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoneDirection {
    /// Device finished transmitting a file.
    Tx,
    /// Device received and stored an upload.
    Rx,
}

/// Typed control-channel event emitted by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// `CMD=LIST;DIR=SESSIONS;FILES=a:1,b:2`
    ListSingleShot { files: Vec<RemoteFile> },
    /// `ITEM;NAME=a;SIZE=1;`
    ListItem(RemoteFile),
    /// `CMD=LIST;END=1;`
    ListEnd,
    /// `CMD=GET;SIZE=n;` or `CMD=GET_TRACKS;SIZE=n;`
    TransferSize { target: SizeTarget, size: u64 },
    /// `CMD=DONE;DIR=TX|RX;`
    Done(DoneDirection),
    /// Anything well-formed that the client has no use for.
    Other(String),
}

impl ControlEvent {
    pub fn is_list_event(&self) -> bool {
        matches!(
            self,
            ControlEvent::ListSingleShot { .. } | ControlEvent::ListItem(_) | ControlEvent::ListEnd
        )
    }
}
