use std::collections::HashMap;
use std::fmt;

use crate::protocol::error::{ProtocolError, ProtocolResult};
use crate::protocol::types::{Command, ControlEvent, DoneDirection, RemoteFile, SizeTarget};

/// Key/value view over one `KEY=VALUE;KEY=VALUE;` control line.
///
/// Segments without `=` (or with an empty key) are ignored. A repeated key
/// keeps its last value.
#[derive(Debug, Default)]
pub struct Fields<'a> {
    map: HashMap<&'a str, &'a str>,
}

impl<'a> Fields<'a> {
    pub fn parse(line: &'a str) -> Self {
        let mut map = HashMap::new();
        for part in line.split(';') {
            if let Some((key, value)) = part.split_once('=') {
                if !key.is_empty() {
                    map.insert(key, value);
                }
            }
        }
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.map.get(key).copied()
    }
}

/// Decode a raw control notification into trimmed text.
pub fn control_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_matches(|c: char| c.is_whitespace() || c == '\0')
        .to_string()
}

impl ControlEvent {
    /// Parse one control notification.
    pub fn parse(raw: &[u8]) -> ProtocolResult<ControlEvent> {
        Self::parse_line(&control_line(raw))
    }

    pub fn parse_line(line: &str) -> ProtocolResult<ControlEvent> {
        if line.split(';').next() == Some("ITEM") {
            return parse_item(line);
        }

        let fields = Fields::parse(line);
        let Some(cmd) = fields.get("CMD") else {
            return Ok(ControlEvent::Other(line.to_string()));
        };

        match cmd {
            "LIST" => {
                if let Some(files) = fields.get("FILES") {
                    if fields.get("DIR") == Some("SESSIONS") {
                        return Ok(ControlEvent::ListSingleShot {
                            files: parse_file_list(files),
                        });
                    }
                }
                if fields.get("END") == Some("1") {
                    return Ok(ControlEvent::ListEnd);
                }
                Err(ProtocolError::malformed(line, "LIST without FILES or END"))
            }
            "GET" | "GET_TRACKS" => {
                let target = if cmd == "GET" {
                    SizeTarget::Session
                } else {
                    SizeTarget::Tracks
                };
                let raw = fields
                    .get("SIZE")
                    .ok_or_else(|| ProtocolError::malformed(line, "missing SIZE"))?;
                let size = raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| ProtocolError::malformed(line, format!("bad SIZE: {e}")))?;
                Ok(ControlEvent::TransferSize { target, size })
            }
            "DONE" => match fields.get("DIR") {
                Some("TX") => Ok(ControlEvent::Done(DoneDirection::Tx)),
                Some("RX") => Ok(ControlEvent::Done(DoneDirection::Rx)),
                Some(other) => Err(ProtocolError::malformed(
                    line,
                    format!("unknown DONE direction {other:?}"),
                )),
                None => Err(ProtocolError::malformed(line, "DONE without DIR")),
            },
            _ => Ok(ControlEvent::Other(line.to_string())),
        }
    }

    /// Render the event the way the device writes it.
    pub fn encode(&self) -> String {
        match self {
            ControlEvent::ListSingleShot { files } => {
                let list: Vec<String> = files
                    .iter()
                    .map(|f| format!("{}:{}", f.name, f.size))
                    .collect();
                format!("CMD=LIST;DIR=SESSIONS;FILES={}", list.join(","))
            }
            ControlEvent::ListItem(file) => format!("ITEM;NAME={};SIZE={};", file.name, file.size),
            ControlEvent::ListEnd => "CMD=LIST;END=1;".to_string(),
            ControlEvent::TransferSize { target, size } => match target {
                SizeTarget::Session => format!("CMD=GET;SIZE={size};"),
                SizeTarget::Tracks => format!("CMD=GET_TRACKS;SIZE={size};"),
            },
            ControlEvent::Done(DoneDirection::Tx) => "CMD=DONE;DIR=TX;".to_string(),
            ControlEvent::Done(DoneDirection::Rx) => "CMD=DONE;DIR=RX;".to_string(),
            ControlEvent::Other(line) => line.clone(),
        }
    }
}

fn parse_item(line: &str) -> ProtocolResult<ControlEvent> {
    let fields = Fields::parse(line);
    let name = fields
        .get("NAME")
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ProtocolError::malformed(line, "ITEM without NAME"))?;
    let size = parse_size_lenient(fields.get("SIZE"));
    Ok(ControlEvent::ListItem(RemoteFile::new(name, size)))
}

/// Parse `name:size,name:size`. Entries without a name are skipped.
pub fn parse_file_list(value: &str) -> Vec<RemoteFile> {
    value
        .split(',')
        .filter_map(|item| {
            let (name, size) = match item.split_once(':') {
                Some((name, size)) => (name, Some(size)),
                None => (item, None),
            };
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(RemoteFile::new(name, parse_size_lenient(size)))
        })
        .collect()
}

fn parse_size_lenient(raw: Option<&str>) -> u64 {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.parse().unwrap_or_else(|_| {
            tracing::debug!("Unparsable listing size {:?}, using 0", s);
            0
        }),
        None => 0,
    }
}

impl Command {
    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode().into_bytes()
    }

    /// Parse a command line as the device sees it.
    pub fn parse(raw: &[u8]) -> ProtocolResult<Command> {
        let line = control_line(raw);
        let fields = Fields::parse(&line);
        match fields.get("CMD") {
            Some("LIST") => Ok(Command::List),
            Some("GET") => {
                let name = fields
                    .get("NAME")
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| ProtocolError::malformed(&line, "GET without NAME"))?;
                Ok(Command::Get {
                    name: name.to_string(),
                })
            }
            Some("GET_TRACKS") => Ok(Command::GetTracks),
            Some("PUT_TRACKS") => {
                let size = fields
                    .get("SIZE")
                    .and_then(|s| s.trim().parse().ok())
                    .ok_or_else(|| ProtocolError::malformed(&line, "PUT_TRACKS without SIZE"))?;
                Ok(Command::PutTracks { size })
            }
            Some("DONE") => Ok(Command::Done),
            _ => Err(ProtocolError::UnknownCommand(line)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::List => write!(f, "CMD=LIST;"),
            Command::Get { name } => write!(f, "CMD=GET;NAME={name};"),
            Command::GetTracks => write!(f, "CMD=GET_TRACKS;"),
            Command::PutTracks { size } => write!(f, "CMD=PUT_TRACKS;SIZE={size};"),
            Command::Done => write!(f, "CMD=DONE;"),
        }
    }
}
