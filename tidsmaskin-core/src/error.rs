use std::path::PathBuf;
use thiserror::Error;

/// Returned by every blocking operation whose block ended because the
/// calling thread was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Thread interrupted while blocked")]
pub struct Interrupted;

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("Invalid clock configuration: {0}")]
    InvalidConfig(String),

    #[error("A global clock is already installed")]
    AlreadyInstalled,

    #[error("Unable to read offset clock state in file '{path}': {source}")]
    StateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to save offset clock state in file '{path}': {source}")]
    StateWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed date '{0}', expected yyyyMMdd'T'HHmmss")]
    DateFormat(String),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl ClockError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ClockError::InvalidConfig(message.into())
    }
}
