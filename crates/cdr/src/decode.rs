//! CDR decoding trait

use crate::error::CdrError;
use crate::{CdrContext, Result};
use bytes::Buf;

/// Trait for types that can be decoded from CDR format
pub trait CdrDecode: Sized {
    /// Decode a value from the buffer at the current position.
    ///
    /// The `position` parameter tracks the current byte offset from the start
    /// of the enclosing message or encapsulation, which is needed for
    /// alignment calculations.
    fn cdr_decode<B: Buf>(buf: &mut B, ctx: &CdrContext, position: &mut usize) -> Result<Self>;

    /// Get the CDR alignment requirement for this type
    fn cdr_align() -> usize {
        1
    }
}

/// Decode a `T` starting at `offset` within `bytes`.
///
/// `offset` doubles as the alignment position, so `bytes` must start at the
/// beginning of the enclosing message or encapsulation. Returns the value and
/// the offset just past it.
pub fn decode_at<T: CdrDecode>(bytes: &[u8], offset: usize, ctx: &CdrContext) -> Result<(T, usize)> {
    if offset > bytes.len() {
        return Err(CdrError::MalformedEncoding {
            needed: offset,
            have: bytes.len(),
        });
    }
    let mut buf = &bytes[offset..];
    let mut position = offset;
    let value = T::cdr_decode(&mut buf, ctx, &mut position)?;
    Ok((value, position))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_at_offsets() {
        // octet 0x07, three padding bytes, ulong 0x01020304 (big-endian)
        let data = [7u8, 0, 0, 0, 1, 2, 3, 4];
        let ctx = CdrContext::big_endian();

        let (octet, next) = decode_at::<u8>(&data, 0, &ctx).unwrap();
        assert_eq!(octet, 7);
        assert_eq!(next, 1);

        let (long, next) = decode_at::<u32>(&data, next, &ctx).unwrap();
        assert_eq!(long, 0x01020304);
        assert_eq!(next, 8);
    }

    #[test]
    fn test_decode_past_end() {
        let data = [0u8, 0, 0];
        let ctx = CdrContext::big_endian();
        let err = decode_at::<u32>(&data, 0, &ctx).unwrap_err();
        assert!(matches!(err, CdrError::MalformedEncoding { needed: 4, have: 3 }));

        let err = decode_at::<u8>(&data, 9, &ctx).unwrap_err();
        assert!(matches!(err, CdrError::MalformedEncoding { .. }));
    }
}
