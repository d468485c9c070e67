use crate::records::types::{Coordinate, Track};

const LOCAL_HEADER: &str = "name,lat1,lng1,lat2,lng2";
const DEVICE_FIELDS: usize = 6;
const LOCAL_FIELDS: usize = 5;
const UNNAMED: &str = "Unknown";

/// Textual encodings of a tracks file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackFormat {
    /// `index;name;lat1;lng1;lat2;lng2`, integer coordinates, no header.
    Device,
    /// `name,lat1,lng1,lat2,lng2` in decimal degrees, with a header row.
    Local,
}

/// Fixed-point scale for device-encoded coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinateScale {
    /// × 10^7 where [`int_coord_to_deg`] reads it back as such, × 10^6
    /// otherwise. Always decodes to the encoded degrees.
    #[default]
    Adaptive,
    /// Degrees × 10^6.
    Micro,
    /// Degrees × 10^7, as written by current firmware. Values within
    /// 18 degrees of zero do not read back correctly.
    TenthMicro,
}

/// Largest fixed-point magnitude still read on the ÷10^6 path.
const MICRO_LIMIT: u64 = 180_000_000;

impl CoordinateScale {
    pub fn to_fixed(self, deg: f64) -> i64 {
        let micro = (deg * 1e6).round() as i64;
        let tenth = (deg * 1e7).round() as i64;
        match self {
            CoordinateScale::Micro => micro,
            CoordinateScale::TenthMicro => tenth,
            CoordinateScale::Adaptive if tenth.unsigned_abs() > MICRO_LIMIT => tenth,
            CoordinateScale::Adaptive => micro,
        }
    }
}

/// Convert a device integer coordinate to degrees.
///
/// Firmware revisions wrote both × 10^6 and × 10^7. The value is read as
/// × 10^6 first; if that is beyond 180 degrees it is read as × 10^7.
pub fn int_coord_to_deg(raw: f64) -> f64 {
    let degrees = raw / 1e6;
    if degrees.abs() > 180.0 {
        raw / 1e7
    } else {
        degrees
    }
}

/// Finite, in range, and not within half a degree of (0, 0) on both axes
/// (a receiver without a fix reports the origin).
pub fn is_valid_coordinate(lat: f64, lng: f64) -> bool {
    lat.is_finite()
        && lng.is_finite()
        && lat.abs() <= 90.0
        && lng.abs() <= 180.0
        && (lat.abs() > 0.5 || lng.abs() > 0.5)
}

fn valid_pair(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> Option<(Coordinate, Coordinate)> {
    (is_valid_coordinate(lat1, lng1) && is_valid_coordinate(lat2, lng2))
        .then(|| (Coordinate::new(lat1, lng1), Coordinate::new(lat2, lng2)))
}

fn content_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty())
}

/// Any semicolon anywhere means the device encoding.
pub fn detect_format(text: &str) -> TrackFormat {
    if text.contains(';') {
        TrackFormat::Device
    } else {
        TrackFormat::Local
    }
}

/// Decode a tracks file in either encoding. Invalid rows are dropped.
pub fn decode_tracks(text: &str) -> Vec<Track> {
    match detect_format(text) {
        TrackFormat::Device => decode_device_tracks(text),
        TrackFormat::Local => decode_local_tracks(text),
    }
}

pub fn decode_device_tracks(text: &str) -> Vec<Track> {
    content_lines(text)
        .filter(|line| line.contains(';'))
        .filter_map(|line| {
            let track = decode_device_row(line);
            if track.is_none() {
                tracing::debug!("Dropping track row: {}", line);
            }
            track
        })
        .collect()
}

fn decode_device_row(line: &str) -> Option<Track> {
    let mut cols: Vec<&str> = line.split(';').map(str::trim).collect();
    if cols.len() == DEVICE_FIELDS + 1 && cols.last().is_some_and(|c| c.is_empty()) {
        cols.pop();
    }
    if cols.len() != DEVICE_FIELDS {
        return None;
    }

    let coord = |i: usize| cols[i].parse::<f64>().ok().map(int_coord_to_deg);
    let (p1, p2) = valid_pair(coord(2)?, coord(3)?, coord(4)?, coord(5)?)?;
    Some(Track::new(name_or_unknown(cols[1]), p1, p2))
}

pub fn decode_local_tracks(text: &str) -> Vec<Track> {
    content_lines(text)
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split(',').map(str::trim).collect();
            if cols.len() < LOCAL_FIELDS {
                return None;
            }
            let coord = |i: usize| cols[i].parse::<f64>().ok();
            let (p1, p2) = valid_pair(coord(1)?, coord(2)?, coord(3)?, coord(4)?)?;
            Some(Track::new(name_or_unknown(cols[0]), p1, p2))
        })
        .collect()
}

fn name_or_unknown(name: &str) -> &str {
    if name.is_empty() {
        UNNAMED
    } else {
        name
    }
}

/// Names must not break either encoding.
fn clean_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ';' | ',' | '\r' | '\n' => ' ',
            other => other,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Serialize for upload to the device. Every coordinate decodes back to
/// within 10^-6 degrees.
pub fn encode_device_tracks(tracks: &[Track]) -> String {
    encode_device_tracks_with_scale(tracks, CoordinateScale::default())
}

pub fn encode_device_tracks_with_scale(tracks: &[Track], scale: CoordinateScale) -> String {
    let fixed = |deg: f64| scale.to_fixed(deg);
    tracks
        .iter()
        .enumerate()
        .map(|(i, t)| {
            format!(
                "{};{};{};{};{};{}",
                i + 1,
                clean_name(&t.name),
                fixed(t.finish_line_point1.lat),
                fixed(t.finish_line_point1.lng),
                fixed(t.finish_line_point2.lat),
                fixed(t.finish_line_point2.lng),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serialize for export to a file, in decimal degrees with a header.
pub fn encode_local_tracks(tracks: &[Track]) -> String {
    let mut out = String::from(LOCAL_HEADER);
    for t in tracks {
        out.push('\n');
        out.push_str(&format!(
            "{},{},{},{},{}",
            clean_name(&t.name),
            t.finish_line_point1.lat,
            t.finish_line_point1.lng,
            t.finish_line_point2.lat,
            t.finish_line_point2.lng,
        ));
    }
    out.push('\n');
    out
}
