use std::process::ExitStatus;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RadioError>;

#[derive(Error, Debug)]
pub enum RadioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transcoder exited abnormally: {0}")]
    Transcoder(ExitStatus),

    #[error("Live source authentication failed")]
    LiveAuth,

    #[error("Live source protocol error: {0}")]
    LiveProtocol(String),

    #[error("Startup failed: {0}")]
    Startup(String),
}

impl RadioError {
    /// Bind/setup failures are the only errors that abort the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RadioError::Startup(_))
    }
}
