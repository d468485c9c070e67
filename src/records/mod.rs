//! Domain records decoded from recovered transfers
//!
//! - `session`: lap logs written by the device, plus user-supplied CSV files
//! - `track`: finish-line definitions in the device and local encodings

pub mod session;
pub mod track;
pub mod types;

pub use session::{decode_local_session, decode_session, format_ms, parse_time_to_ms, session_name};
pub use track::{
    decode_device_tracks, decode_local_tracks, decode_tracks, detect_format, encode_device_tracks,
    encode_device_tracks_with_scale, encode_local_tracks, int_coord_to_deg, is_valid_coordinate,
    CoordinateScale, TrackFormat,
};
pub use types::{Coordinate, LapRecord, Session, Track};
