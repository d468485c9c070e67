use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),
}

pub type StatusResult<T> = Result<T, StatusError>;
