//! Error types for Multiwan.

use std::io;

use thiserror::Error;

/// Result type alias for Multiwan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Multiwan.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid uplink {index}: {reason}")]
    InvalidUplink { index: usize, reason: String },

    // Probe errors
    #[error("probe failed on {interface}: {reason}")]
    Probe { interface: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // General errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Construct a fail-fast construction error for one uplink.
    pub fn invalid_uplink(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidUplink {
            index,
            reason: reason.into(),
        }
    }
}
