//! CDR string types
//!
//! Narrow strings are encoded as:
//! - ulong length, counting the terminating NUL
//! - the characters, in the context's char code set
//! - a single NUL octet
//!
//! Wide strings use the GIOP 1.2 form: a ulong octet count followed by
//! 16-bit code units of the context's wchar code set in the stream byte
//! order, with no terminator.

use crate::codeset::{decode_narrow, decode_wide, encode_narrow, encode_wide};
use crate::error::{CdrError, MAX_CDR_ALLOCATION_SIZE};
use crate::{CdrContext, CdrDecode, CdrEncode, Result};
use bytes::{Buf, BufMut};

impl CdrEncode for str {
    fn cdr_encode<B: BufMut>(
        &self,
        buf: &mut B,
        ctx: &CdrContext,
        position: &mut usize,
    ) -> Result<()> {
        let bytes = encode_narrow(self, ctx.char_set)?;
        if bytes.contains(&0) {
            return Err(CdrError::InvalidString("embedded NUL".to_string()));
        }
        let length = u32::try_from(bytes.len() + 1).map_err(|_| {
            CdrError::AllocationLimitExceeded {
                requested: bytes.len() + 1,
                limit: u32::MAX as usize,
            }
        })?;
        length.cdr_encode(buf, ctx, position)?;
        buf.put_slice(&bytes);
        buf.put_u8(0);
        *position += bytes.len() + 1;
        Ok(())
    }
}

impl CdrEncode for String {
    fn cdr_encode<B: BufMut>(
        &self,
        buf: &mut B,
        ctx: &CdrContext,
        position: &mut usize,
    ) -> Result<()> {
        self.as_str().cdr_encode(buf, ctx, position)
    }

    fn cdr_align() -> usize {
        4
    }
}

impl CdrDecode for String {
    fn cdr_decode<B: Buf>(buf: &mut B, ctx: &CdrContext, position: &mut usize) -> Result<Self> {
        let length = u32::cdr_decode(buf, ctx, position)? as usize;
        // Some ORBs send a zero length for the empty string.
        if length == 0 {
            return Ok(String::new());
        }
        if length > MAX_CDR_ALLOCATION_SIZE {
            return Err(CdrError::AllocationLimitExceeded {
                requested: length,
                limit: MAX_CDR_ALLOCATION_SIZE,
            });
        }
        if buf.remaining() < length {
            return Err(CdrError::MalformedEncoding {
                needed: length,
                have: buf.remaining(),
            });
        }

        let mut bytes = vec![0u8; length];
        buf.copy_to_slice(&mut bytes);
        *position += length;

        if bytes.pop() != Some(0) {
            return Err(CdrError::InvalidString("missing NUL terminator".to_string()));
        }
        decode_narrow(bytes, ctx.char_set)
    }

    fn cdr_align() -> usize {
        4
    }
}

/// GIOP 1.2 wide string, carried in the context's wchar code set
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CdrWString(pub String);

impl CdrWString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CdrWString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CdrWString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl CdrEncode for CdrWString {
    fn cdr_encode<B: BufMut>(
        &self,
        buf: &mut B,
        ctx: &CdrContext,
        position: &mut usize,
    ) -> Result<()> {
        let units = encode_wide(&self.0, ctx.wchar_set)?;
        let octets = units.len() * 2;
        let length = u32::try_from(octets).map_err(|_| CdrError::AllocationLimitExceeded {
            requested: octets,
            limit: u32::MAX as usize,
        })?;
        length.cdr_encode(buf, ctx, position)?;
        for unit in units {
            ctx.put_u16(buf, unit);
        }
        *position += octets;
        Ok(())
    }

    fn cdr_align() -> usize {
        4
    }
}

impl CdrDecode for CdrWString {
    fn cdr_decode<B: Buf>(buf: &mut B, ctx: &CdrContext, position: &mut usize) -> Result<Self> {
        let octets = u32::cdr_decode(buf, ctx, position)? as usize;
        if octets % 2 != 0 {
            return Err(CdrError::InvalidString(format!(
                "odd wide string length {}",
                octets
            )));
        }
        if octets > MAX_CDR_ALLOCATION_SIZE {
            return Err(CdrError::AllocationLimitExceeded {
                requested: octets,
                limit: MAX_CDR_ALLOCATION_SIZE,
            });
        }
        if buf.remaining() < octets {
            return Err(CdrError::MalformedEncoding {
                needed: octets,
                have: buf.remaining(),
            });
        }

        let units: Vec<u16> = (0..octets / 2).map(|_| ctx.get_u16(buf)).collect();
        *position += octets;
        Ok(CdrWString(decode_wide(&units, ctx.wchar_set)?))
    }

    fn cdr_align() -> usize {
        4
    }
}
