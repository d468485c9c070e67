use thiserror::Error;

use crate::engine::EngineError;
use crate::status::StatusError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Status(#[from] StatusError),
}

pub type ClientResult<T> = Result<T, ClientError>;
