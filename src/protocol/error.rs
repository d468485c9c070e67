use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed control event {line:?}: {reason}")]
    MalformedEvent { line: String, reason: String },

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

impl ProtocolError {
    pub(crate) fn malformed(line: &str, reason: impl Into<String>) -> Self {
        ProtocolError::MalformedEvent {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
