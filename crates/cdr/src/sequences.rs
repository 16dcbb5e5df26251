//! CDR sequences
//!
//! A sequence is a ulong element count followed by the elements, each
//! aligned as its own type requires. `sequence<octet>` maps to [`Bytes`].

use crate::error::{CdrError, MAX_CDR_ALLOCATION_SIZE};
use crate::{CdrContext, CdrDecode, CdrEncode, Result};
use bytes::{Buf, BufMut, Bytes};

fn encode_count<B: BufMut>(
    len: usize,
    buf: &mut B,
    ctx: &CdrContext,
    position: &mut usize,
) -> Result<()> {
    let count = u32::try_from(len).map_err(|_| CdrError::AllocationLimitExceeded {
        requested: len,
        limit: u32::MAX as usize,
    })?;
    count.cdr_encode(buf, ctx, position)
}

/// Read a sequence length and check it against what the buffer can hold.
fn decode_count<B: Buf>(buf: &mut B, ctx: &CdrContext, position: &mut usize) -> Result<usize> {
    let count = u32::cdr_decode(buf, ctx, position)? as usize;
    if count > MAX_CDR_ALLOCATION_SIZE {
        return Err(CdrError::AllocationLimitExceeded {
            requested: count,
            limit: MAX_CDR_ALLOCATION_SIZE,
        });
    }
    // Every element occupies at least one octet.
    if count > buf.remaining() {
        return Err(CdrError::MalformedEncoding {
            needed: count,
            have: buf.remaining(),
        });
    }
    Ok(count)
}

impl<T: CdrEncode> CdrEncode for [T] {
    fn cdr_encode<B: BufMut>(
        &self,
        buf: &mut B,
        ctx: &CdrContext,
        position: &mut usize,
    ) -> Result<()> {
        encode_count(self.len(), buf, ctx, position)?;
        for item in self {
            item.cdr_encode(buf, ctx, position)?;
        }
        Ok(())
    }
}

impl<T: CdrEncode> CdrEncode for Vec<T> {
    fn cdr_encode<B: BufMut>(
        &self,
        buf: &mut B,
        ctx: &CdrContext,
        position: &mut usize,
    ) -> Result<()> {
        self.as_slice().cdr_encode(buf, ctx, position)
    }

    fn cdr_align() -> usize {
        4
    }
}

impl<T: CdrDecode> CdrDecode for Vec<T> {
    fn cdr_decode<B: Buf>(buf: &mut B, ctx: &CdrContext, position: &mut usize) -> Result<Self> {
        let count = decode_count(buf, ctx, position)?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(T::cdr_decode(buf, ctx, position)?);
        }
        Ok(items)
    }

    fn cdr_align() -> usize {
        4
    }
}

impl CdrEncode for Bytes {
    fn cdr_encode<B: BufMut>(
        &self,
        buf: &mut B,
        ctx: &CdrContext,
        position: &mut usize,
    ) -> Result<()> {
        encode_count(self.len(), buf, ctx, position)?;
        buf.put_slice(self);
        *position += self.len();
        Ok(())
    }

    fn cdr_align() -> usize {
        4
    }
}

impl CdrDecode for Bytes {
    fn cdr_decode<B: Buf>(buf: &mut B, ctx: &CdrContext, position: &mut usize) -> Result<Self> {
        let count = decode_count(buf, ctx, position)?;
        let bytes = buf.copy_to_bytes(count);
        *position += count;
        Ok(bytes)
    }

    fn cdr_align() -> usize {
        4
    }
}
