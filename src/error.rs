use std::time::Duration;
use thiserror::Error;

use crate::http::transport::TransportError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Remote rejected document: HTTP {status}: {body}")]
    RemoteRejected { status: u16, body: String },

    #[error("Transport failure: {0}")]
    TransportFailure(#[source] TransportError),

    #[error("Serialization failure: {0}")]
    SerializationFailure(#[from] serde_json::Error),

    #[error("Permit wait cancelled: {0}")]
    Cancelled(String),

    #[error("No permit available within {0:?}")]
    AcquireTimeout(Duration),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransportError> for AppError {
    fn from(err: TransportError) -> Self {
        AppError::TransportFailure(err)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
