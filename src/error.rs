// Doorcam Sync Error Types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DoorcamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Clip already present: {}", .0.display())]
    AlreadyPresent(PathBuf),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("{0}")]
    Other(String),
}

impl From<ureq::Error> for DoorcamError {
    fn from(err: ureq::Error) -> Self {
        DoorcamError::Http(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DoorcamError>;
