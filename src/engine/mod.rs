//! Transfer engine
//!
//! Implements the device command protocol on top of the transport adapter:
//! - listing session files (single-shot and streamed responses)
//! - downloading a file with progress, terminated by `DONE;DIR=TX`
//! - uploading the track-definitions file, confirmed by `DONE;DIR=RX`

pub mod download;
pub mod engine;
pub mod error;
pub mod listing;
pub mod types;

pub use download::{decode_payload, TransferSession};
pub use engine::TransferEngine;
pub use error::{EngineError, EngineResult};
pub use listing::{sort_newest_first, ListingCollector, ListingState};
pub use types::{DownloadTarget, TransferProgress};
pub use crate::protocol::RemoteFile;
