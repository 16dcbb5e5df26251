//! Error types for GIOP

use crate::endpoint::Endpoint;
use crate::giop::MessageType;
use thiserror::Error;

/// GIOP error types
#[derive(Debug, Error)]
pub enum GiopError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CDR error: {0}")]
    Cdr(#[from] cdr::CdrError),

    #[error("bad GIOP magic: {magic:02x?}")]
    BadMagic { magic: [u8; 4] },

    #[error("unsupported GIOP version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("invalid message type: {0}")]
    InvalidMessageType(u8),

    #[error("unsupported target address discriminator: {0}")]
    UnsupportedTargetAddress(u16),

    #[error("message too large: {size} bytes exceeds maximum {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("more-fragments flag not allowed on {0:?}")]
    FragmentNotAllowed(MessageType),

    #[error("fragmentation not supported in GIOP {major}.{minor}")]
    FragmentationUnsupported { major: u8, minor: u8 },

    #[error("fragment without a started message (request id {request_id:?})")]
    UnexpectedFragment { request_id: Option<u32> },

    #[error("unexpected {0:?} message")]
    UnexpectedMessage(MessageType),

    #[error("peer reported a message error")]
    MessageError,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("all endpoints unreachable after {attempts} attempts (last: {last_endpoint:?})")]
    AllEndpointsUnreachable {
        attempts: usize,
        last_endpoint: Option<Endpoint>,
    },

    #[error("communication failure with {endpoint}: {reason}")]
    CommunicationFailure { endpoint: Endpoint, reason: String },

    #[error("request {request_id} to {endpoint} timed out")]
    Timeout { endpoint: Endpoint, request_id: u32 },

    #[error("request ids exhausted on {0}")]
    RequestIdsExhausted(Endpoint),

    #[error("invalid value for policy type {policy_type}")]
    InvalidPolicyValue { policy_type: u32 },

    #[error("task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

impl GiopError {
    /// Errors after which the connection that produced them cannot be reused.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            GiopError::Io(_)
                | GiopError::Cdr(_)
                | GiopError::BadMagic { .. }
                | GiopError::UnsupportedVersion { .. }
                | GiopError::InvalidMessageType(_)
                | GiopError::MessageTooLarge { .. }
                | GiopError::FragmentNotAllowed(_)
                | GiopError::FragmentationUnsupported { .. }
                | GiopError::UnexpectedFragment { .. }
                | GiopError::MessageError
                | GiopError::ConnectionClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, GiopError>;
