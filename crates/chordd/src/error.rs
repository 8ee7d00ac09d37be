#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DaemonError>;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration at {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("key map: {0}")]
    Tree(#[from] chordd_core::TreeError),

    #[error("dispatcher: {0}")]
    Dispatch(#[from] chordd_dispatch::DispatchError),

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("no key-capable input devices found")]
    NoDevices,
}

impl DaemonError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument { .. } => 2,
            _ => 1,
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
