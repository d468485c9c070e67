//! Control-channel wire format
//!
//! The device speaks short ASCII lines of `KEY=VALUE;` pairs on the control
//! characteristic. This module turns them into typed [`ControlEvent`]s and
//! renders client [`Command`]s.

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{control_line, parse_file_list, Fields};
pub use error::{ProtocolError, ProtocolResult};
pub use types::{
    basename, Command, ControlEvent, DoneDirection, RemoteFile, SizeTarget, TRACKS_FILE_NAME,
};
