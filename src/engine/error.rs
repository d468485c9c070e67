use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Not connected to a device")]
    NotConnected,

    #[error("Timed out after {after:?} waiting for {operation}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Operation aborted by disconnect")]
    Disconnected,

    #[error("Link to device lost")]
    LinkLost,

    #[error("Transport error: {0}")]
    Transport(TransportError),
}

impl EngineError {
    /// The user backed out of device selection. Not a failure.
    pub fn is_no_device_selected(&self) -> bool {
        matches!(self, EngineError::Transport(TransportError::NoDeviceSelected))
    }
}

impl From<TransportError> for EngineError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotConnected => EngineError::NotConnected,
            TransportError::LinkLost => EngineError::LinkLost,
            other => EngineError::Transport(other),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
