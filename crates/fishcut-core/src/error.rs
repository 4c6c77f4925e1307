//! Error types for fishcut.

use thiserror::Error;

/// Main error type for fishcut operations.
#[derive(Error, Debug)]
pub enum FishcutError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Media error: {0}")]
    Media(String),

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FishcutError {
    /// Whether this error means the source video could not be used at all.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Media(_) | Self::Decoder(_) | Self::NotFound(_)
        )
    }
}

/// Result type alias for fishcut operations.
pub type Result<T> = std::result::Result<T, FishcutError>;
