//! IIOP error types

use giop::SystemException;
use thiserror::Error;

/// Result type for object-reference and invocation operations
pub type Result<T> = std::result::Result<T, OrbError>;

/// Errors raised while handling object references or invoking on them
#[derive(Error, Debug)]
pub enum OrbError {
    /// Transport, framing or connection failure
    #[error("GIOP error: {0}")]
    Giop(#[from] giop::GiopError),

    /// Malformed CDR in a reference, profile or reply body
    #[error("CDR error: {0}")]
    Cdr(#[from] cdr::CdrError),

    /// Stringified or binary reference could not be parsed
    #[error("invalid object reference: {0}")]
    InvalidObjectReference(String),

    /// The reference has no Internet-IOP profile to connect to
    #[error("no usable IIOP profile in reference to {type_id:?}")]
    NoUsableProfile { type_id: String },

    #[error("invalid corbaloc URL: {0}")]
    InvalidCorbaloc(String),

    #[error("invalid iiop URL: {0}")]
    InvalidIiopUrl(String),

    /// Neither side can convert to a code set the other offers
    #[error("no common code set for {kind} data")]
    CodeSetIncompatible { kind: &'static str },

    /// LOCATION_FORWARD chain longer than the client allows
    #[error("too many location forwards (limit {limit})")]
    TooManyForwards { limit: usize },

    /// The server reported the target object as unknown
    #[error("object does not exist")]
    ObjectNotExist,

    #[error("system exception: {0}")]
    SystemException(SystemException),

    /// User exception raised by the servant; `body` follows the repository id
    #[error("user exception {repository_id}")]
    UserException {
        repository_id: String,
        body: bytes::Bytes,
    },

    /// A two-way invocation completed without a reply
    #[error("no reply to {operation}")]
    NoReply { operation: String },
}
