use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Not connected to a device")]
    NotConnected,

    #[error("No device selected")]
    NoDeviceSelected,

    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Characteristic {0} not found on device")]
    CharacteristicNotFound(Uuid),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),

    #[error("Link to device lost")]
    LinkLost,
}

pub type TransportResult<T> = Result<T, TransportError>;
