//! Payload marshaling
//!
//! The invocation client treats request arguments and reply results as
//! opaque. A [`PayloadMarshaler`] turns typed values into CDR at the position
//! they will occupy in the message, and back.

use crate::types::Result;
use bytes::Bytes;
use cdr::{CdrReader, CdrWriter};
use std::collections::HashSet;

/// Encodes arguments and decodes results for an interface
pub trait PayloadMarshaler: Send + Sync {
    type Args: ?Sized + Sync;
    type Output;

    /// Write the request body for `operation`
    fn encode_payload(&self, operation: &str, args: &Self::Args, writer: &mut CdrWriter)
        -> Result<()>;

    /// Read the NO_EXCEPTION reply body for `operation`
    fn decode_payload(&self, operation: &str, reader: &mut CdrReader) -> Result<Self::Output>;

    /// Whether a request may be re-issued after a communication failure
    fn is_idempotent(&self, _operation: &str) -> bool {
        false
    }
}

/// Passes pre-encoded bodies through untouched
#[derive(Debug, Clone, Default)]
pub struct RawMarshaler {
    idempotent: HashSet<String>,
}

impl RawMarshaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `operation` as safe to retry
    pub fn idempotent(mut self, operation: impl Into<String>) -> Self {
        self.idempotent.insert(operation.into());
        self
    }
}

impl PayloadMarshaler for RawMarshaler {
    type Args = [u8];
    type Output = Bytes;

    fn encode_payload(&self, _operation: &str, args: &[u8], writer: &mut CdrWriter) -> Result<()> {
        writer.write_octets(args);
        Ok(())
    }

    fn decode_payload(&self, _operation: &str, reader: &mut CdrReader) -> Result<Bytes> {
        Ok(reader.rest())
    }

    fn is_idempotent(&self, operation: &str) -> bool {
        self.idempotent.contains(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdr::CdrContext;

    #[test]
    fn test_raw_passthrough() {
        let marshaler = RawMarshaler::new();
        let mut writer = CdrWriter::with_position(CdrContext::big_endian(), 24);
        marshaler.encode_payload("op", b"\x01\x02\x03", &mut writer).unwrap();
        let body = writer.into_bytes();
        assert_eq!(&body[..], &[1, 2, 3]);

        let mut reader = CdrReader::with_position(body, CdrContext::big_endian(), 24);
        assert_eq!(&marshaler.decode_payload("op", &mut reader).unwrap()[..], &[1, 2, 3]);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_idempotent_operations() {
        let marshaler = RawMarshaler::new().idempotent("get");
        assert!(marshaler.is_idempotent("get"));
        assert!(!marshaler.is_idempotent("set"));
    }
}
