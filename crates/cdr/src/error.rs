//! CDR error types

use thiserror::Error;

/// Upper bound for any single length-prefixed allocation made while decoding.
///
/// A peer can announce an arbitrary `ulong` length; anything above this limit
/// is rejected before memory is reserved.
pub const MAX_CDR_ALLOCATION_SIZE: usize = 16 * 1024 * 1024;

/// CDR encoding/decoding errors
#[derive(Debug, Error)]
pub enum CdrError {
    /// Decoding ran past the declared bound of the buffer
    #[error("malformed encoding: needed {needed} bytes, have {have}")]
    MalformedEncoding { needed: usize, have: usize },

    /// Unknown enumerant or discriminant value
    #[error("invalid enum value: {0}")]
    InvalidEnumValue(u32),

    /// Invalid string - missing terminator or bad length
    #[error("invalid string: {0}")]
    InvalidString(String),

    /// Code set with no converter here
    #[error("unsupported code set {0:#010x}")]
    UnsupportedCodeSet(u32),

    /// Declared length exceeds the allocation limit
    #[error("allocation limit exceeded: requested {requested} bytes, limit {limit}")]
    AllocationLimitExceeded { requested: usize, limit: usize },

    /// UTF-8 decoding error
    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),

    /// UTF-16 decoding error
    #[error("UTF-16 error: {0}")]
    Utf16Error(#[from] std::string::FromUtf16Error),
}

impl CdrError {
    pub(crate) fn underflow(needed: usize, have: usize) -> Self {
        CdrError::MalformedEncoding { needed, have }
    }
}

/// Result type for CDR operations
pub type Result<T> = std::result::Result<T, CdrError>;
