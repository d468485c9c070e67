use chrono::Local;
use uuid::Uuid;

use crate::protocol::basename;
use crate::records::types::{LapRecord, Session};

const COL_LAP_NO: &str = "lap_no";
const COL_DATE: &str = "lap_start_date";
const COL_START: &str = "lap_start_time";
const COL_TIME_MS: &str = "lap_time_ms";
const COL_TIME: &str = "lap_time";

/// Session name for a file: base name with the extension stripped.
pub fn session_name(file_name: &str) -> String {
    let base = basename(file_name);
    match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => base.to_string(),
    }
}

fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Decode a lap log produced by the device.
///
/// ```text
/// track;Tor Poznan
/// lap_no;lap_start_date;lap_start_time;lap_time_ms;lap_time
/// 1;2025-08-15;09:11:25;65012;1:05.012
/// ```
///
/// The `track;` line is optional and columns may come in any order. Rows
/// whose lap number does not parse are dropped.
pub fn decode_session(text: &str, file_name: &str) -> Session {
    let name = session_name(file_name);
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty()).peekable();

    let mut track_name = String::new();
    if let Some(first) = lines.peek() {
        if first.to_ascii_lowercase().starts_with("track;") {
            track_name = first
                .split(';')
                .nth(1)
                .map(str::trim)
                .unwrap_or_default()
                .to_string();
            lines.next();
        }
    }

    let Some(header) = lines.next() else {
        return empty_session(name, track_name);
    };
    let header: Vec<&str> = header.split(';').map(str::trim).collect();
    let column = |wanted: &str| header.iter().position(|h| *h == wanted);
    let lap_no = column(COL_LAP_NO);
    let date_col = column(COL_DATE);
    let start_col = column(COL_START);
    let time_ms_col = column(COL_TIME_MS);
    let time_col = column(COL_TIME);

    let rows: Vec<Vec<&str>> = lines
        .map(|line| line.split(';').map(str::trim).collect())
        .collect();
    if rows.is_empty() {
        return empty_session(name, track_name);
    }

    let date = date_col
        .and_then(|i| rows[0].get(i))
        .filter(|d| !d.is_empty())
        .map(|d| d.to_string())
        .unwrap_or_else(today);

    let mut laps = Vec::with_capacity(rows.len());
    for (position, cols) in rows.iter().enumerate() {
        let cell = |idx: Option<usize>| idx.and_then(|i| cols.get(i).copied()).unwrap_or("");

        let lap_number = match lap_no {
            Some(_) => match parse_lap_number(cell(lap_no)) {
                Some(n) => n,
                None => {
                    tracing::debug!("Dropping lap row {}: bad lap number", position + 1);
                    continue;
                }
            },
            None => position as u32 + 1,
        };

        let time_text = cell(time_col);
        let time_ms = parse_millis(cell(time_ms_col))
            .or_else(|| parse_time_to_ms(time_text))
            .unwrap_or(0);
        let time_text = if time_text.is_empty() {
            format_ms(time_ms)
        } else {
            time_text.to_string()
        };

        laps.push(LapRecord {
            lap_number,
            time_ms,
            time_text,
            session_name: name.clone(),
            track_name: track_name.clone(),
            date: date.clone(),
            start_time: cell(start_col).chars().take(5).collect(),
        });
    }

    Session {
        id: Uuid::new_v4().to_string(),
        name,
        date,
        track_name,
        laps,
    }
}

/// Decode a comma-separated lap file supplied by the user.
///
/// The header is free text: the first column mentioning `lap` holds the lap
/// number, the first mentioning `time` (or `czas`) the lap time as
/// `M:SS.mmm`. Without a time column there are no laps.
pub fn decode_local_session(text: &str, file_name: &str) -> Session {
    let name = session_name(file_name);
    let date = today();

    let mut lines = text.trim().lines();
    let header: Vec<String> = lines
        .next()
        .unwrap_or_default()
        .to_lowercase()
        .split(',')
        .map(|h| h.trim().to_string())
        .collect();
    let lap_col = header.iter().position(|h| h.contains("lap"));
    let time_col = header
        .iter()
        .position(|h| h.contains("time") || h.contains("czas"));

    let mut laps = Vec::new();
    if let Some(time_col) = time_col {
        let rows = lines.map(str::trim).filter(|l| !l.is_empty());
        for (position, line) in rows.enumerate() {
            let cols: Vec<&str> = line.split(',').map(str::trim).collect();

            let lap_number = match lap_col.map(|i| cols.get(i).copied().unwrap_or("")) {
                Some("") | None => position as u32 + 1,
                Some(raw) => match parse_lap_number(raw) {
                    Some(n) => n,
                    None => continue,
                },
            };
            let time_text = cols.get(time_col).copied().unwrap_or("");
            let Some(time_ms) = parse_time_to_ms(time_text) else {
                continue;
            };

            laps.push(LapRecord {
                lap_number,
                time_ms,
                time_text: time_text.to_string(),
                session_name: name.clone(),
                track_name: String::new(),
                date: date.clone(),
                start_time: String::new(),
            });
        }
    }

    Session {
        id: Uuid::new_v4().to_string(),
        name,
        date,
        track_name: String::new(),
        laps,
    }
}

fn empty_session(name: String, track_name: String) -> Session {
    Session {
        id: Uuid::new_v4().to_string(),
        name,
        date: today(),
        track_name,
        laps: Vec::new(),
    }
}

/// Any finite number from 1 up; fractions are truncated.
fn parse_lap_number(raw: &str) -> Option<u32> {
    let value: f64 = raw.parse().ok()?;
    (value.is_finite() && value >= 1.0 && value <= u32::MAX as f64).then(|| value as u32)
}

fn parse_millis(raw: &str) -> Option<u64> {
    let value: f64 = raw.parse().ok()?;
    (value.is_finite() && value >= 0.0).then(|| value.round() as u64)
}

/// Parse `M:SS.mmm` or `SS.mmm` into milliseconds.
///
/// The part after the dot is a decimal fraction of a second, so `1:05.4`
/// is 65400 ms.
pub fn parse_time_to_ms(text: &str) -> Option<u64> {
    let text = text.trim();
    let (minutes, seconds) = match text.split_once(':') {
        Some((m, s)) => (parse_digits(m)?, s),
        None => (0, text),
    };

    let (whole, fraction) = seconds.split_once('.').unwrap_or((seconds, ""));
    let whole = parse_digits(whole)?;
    let millis = if fraction.is_empty() {
        0
    } else {
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let fraction: f64 = format!("0.{fraction}").parse().ok()?;
        (fraction * 1000.0).round() as u64
    };

    Some(minutes * 60_000 + whole * 1000 + millis)
}

fn parse_digits(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// Render milliseconds as `M:SS.mmm`.
pub fn format_ms(ms: u64) -> String {
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{minutes}:{seconds:02}.{millis:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "lap_no;lap_start_date;lap_start_time;lap_time_ms;lap_time";

    #[test]
    fn test_decode_single_row() {
        let text = format!("{HEADER}\n3;2025-08-15;09:12:30;65432;1:05.432\n");
        let session = decode_session(&text, "20250815_0843.csv");

        assert_eq!(session.name, "20250815_0843");
        assert_eq!(session.date, "2025-08-15");
        assert_eq!(session.track_name, "");
        assert_eq!(session.laps.len(), 1);

        let lap = &session.laps[0];
        assert_eq!(lap.lap_number, 3);
        assert_eq!(lap.time_ms, 65432);
        assert_eq!(lap.time_text, "1:05.432");
        assert_eq!(lap.date, "2025-08-15");
        assert_eq!(lap.start_time, "09:12");
        assert_eq!(lap.session_name, "20250815_0843");
    }

    #[test]
    fn test_track_line_and_blank_lines() {
        let text = format!(
            "\r\n  track; Tor Poznan \r\n\r\n{HEADER}\r\n1;2025-08-15;09:11:25;65012;1:05.012\r\n\r\n2;2025-08-15;09:12:30;64100;1:04.100\r\n"
        );
        let session = decode_session(&text, "sessions/20250815_0843.CSV");
        assert_eq!(session.name, "20250815_0843");
        assert_eq!(session.track_name, "Tor Poznan");
        assert_eq!(session.laps.len(), 2);
        assert!(session.laps.iter().all(|l| l.track_name == "Tor Poznan"));
        assert_eq!(session.laps[1].lap_number, 2);
    }

    #[test]
    fn test_columns_in_any_order() {
        let text = "lap_time;lap_no;lap_time_ms\n1:01.000;7;61000\n";
        let session = decode_session(text, "a.csv");
        let lap = &session.laps[0];
        assert_eq!(lap.lap_number, 7);
        assert_eq!(lap.time_ms, 61000);
        assert_eq!(lap.start_time, "");
        assert_eq!(session.date, today());
    }

    #[test]
    fn test_missing_columns_degrade() {
        let text = "lap_time_ms\n65432\n59001\n";
        let session = decode_session(text, "a.csv");
        assert_eq!(session.laps.len(), 2);
        assert_eq!(session.laps[0].lap_number, 1);
        assert_eq!(session.laps[1].lap_number, 2);
        assert_eq!(session.laps[0].time_text, "1:05.432");
        assert_eq!(session.laps[1].time_text, "0:59.001");

        let text = "lap_no;lap_time\n1;1:02.500\n";
        let session = decode_session(text, "a.csv");
        assert_eq!(session.laps[0].time_ms, 62500);
    }

    #[test]
    fn test_malformed_rows_dropped() {
        let text = format!(
            "{HEADER}\n1;2025-08-15;09:11:25;65012;1:05.012\n2;2025-08-15;09:12:30;64100;1:04.100\n;2025-08-15;09:1\nx;;;;\n"
        );
        let session = decode_session(&text, "a.csv");
        assert_eq!(session.laps.len(), 2);
        assert_eq!(session.laps[1].lap_number, 2);
    }

    #[test]
    fn test_lap_zero_dropped() {
        let session = decode_session("lap_no;lap_time_ms\n0;61000\n1;60000\n-2;59000\n", "a.csv");
        let numbers: Vec<u32> = session.laps.iter().map(|l| l.lap_number).collect();
        assert_eq!(numbers, vec![1]);
        assert_eq!(session.laps[0].time_ms, 60000);

        let session = decode_local_session("lap,time\n0,1:01.000\n1,1:00.000\n", "x.csv");
        assert_eq!(session.laps.len(), 1);
        assert_eq!(session.laps[0].lap_number, 1);
    }

    #[test]
    fn test_empty_and_header_only() {
        let session = decode_session("", "a.csv");
        assert!(session.laps.is_empty());
        assert_eq!(session.date, today());

        let session = decode_session("track;Kielce\nlap_no;lap_time_ms\n", "a.csv");
        assert!(session.laps.is_empty());
        assert_eq!(session.track_name, "Kielce");
    }

    #[test]
    fn test_session_ids_unique() {
        let text = format!("{HEADER}\n1;2025-08-15;09:11:25;65012;1:05.012\n");
        assert_ne!(decode_session(&text, "a.csv").id, decode_session(&text, "a.csv").id);
    }

    #[test]
    fn test_local_session() {
        let text = "Lap,Czas okrazenia\n1,1:05.432\n2,1:04.900\n\n3,bad\n";
        let session = decode_local_session(text, "import.csv");
        assert_eq!(session.name, "import");
        assert_eq!(session.track_name, "");
        assert_eq!(session.laps.len(), 2);
        assert_eq!(session.laps[0].time_ms, 65432);
        assert_eq!(session.laps[1].lap_number, 2);
    }

    #[test]
    fn test_local_session_lap_fallback() {
        let text = "time\n1:00.000\n0:59.500\n";
        let session = decode_local_session(text, "x.csv");
        let numbers: Vec<u32> = session.laps.iter().map(|l| l.lap_number).collect();
        assert_eq!(numbers, vec![1, 2]);

        let session = decode_local_session("lap,sector\n1,2\n", "x.csv");
        assert!(session.laps.is_empty());
    }

    #[test]
    fn test_parse_time_to_ms() {
        assert_eq!(parse_time_to_ms("1:05.432"), Some(65432));
        assert_eq!(parse_time_to_ms("1:05.4"), Some(65400));
        assert_eq!(parse_time_to_ms("59.001"), Some(59001));
        assert_eq!(parse_time_to_ms("2:00"), Some(120_000));
        assert_eq!(parse_time_to_ms("abc"), None);
        assert_eq!(parse_time_to_ms(""), None);
        assert_eq!(parse_time_to_ms("-1:00.000"), None);
    }

    #[test]
    fn test_format_ms() {
        assert_eq!(format_ms(65432), "1:05.432");
        assert_eq!(format_ms(0), "0:00.000");
        assert_eq!(format_ms(600_007), "10:00.007");
    }

    #[test]
    fn test_session_name() {
        assert_eq!(session_name("20250815_0843.csv"), "20250815_0843");
        assert_eq!(session_name("/a/b/run.txt"), "run");
        assert_eq!(session_name("noext"), "noext");
        assert_eq!(session_name(".hidden"), ".hidden");
    }
}
