use std::io;

use thiserror::Error;

/// Errors raised while decoding a BMD payload.
#[derive(Debug, Error)]
pub enum BmdError {
    /// Bad magic, unknown version tag, out-of-range header counts.
    #[error("Invalid BMD format: {0}")]
    Format(String),

    /// A structural read ran past the end of the plaintext.
    #[error("{structure} truncated at offset {offset} (need {need} bytes, have {have})")]
    Truncated {
        structure: String,
        offset: usize,
        need: usize,
        have: usize,
    },

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl BmdError {
    pub fn format(msg: impl Into<String>) -> Self {
        BmdError::Format(msg.into())
    }

    pub fn decryption(msg: impl Into<String>) -> Self {
        BmdError::Decryption(msg.into())
    }

    /// True for errors that come from the cipher layer rather than the structure.
    pub fn is_decryption(&self) -> bool {
        matches!(self, BmdError::Decryption(_))
    }
}

/// Result type for BMD decoding
pub type Result<T> = std::result::Result<T, BmdError>;
