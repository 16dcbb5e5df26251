//! CDR encoding trait

use crate::{CdrContext, Result};
use bytes::BufMut;

/// Trait for types that can be encoded to CDR format
pub trait CdrEncode {
    /// Encode this value to the buffer at the current position.
    ///
    /// The `position` parameter tracks the current byte offset from the start
    /// of the enclosing message or encapsulation, which is needed for
    /// alignment calculations.
    fn cdr_encode<B: BufMut>(&self, buf: &mut B, ctx: &CdrContext, position: &mut usize)
        -> Result<()>;

    /// Get the CDR alignment requirement for this type
    fn cdr_align() -> usize
    where
        Self: Sized,
    {
        1
    }
}

impl<T: CdrEncode + ?Sized> CdrEncode for &T {
    fn cdr_encode<B: BufMut>(
        &self,
        buf: &mut B,
        ctx: &CdrContext,
        position: &mut usize,
    ) -> Result<()> {
        (**self).cdr_encode(buf, ctx, position)
    }
}

/// Append `value` to `buf`, advancing `position` past it.
pub fn encode_into<T, B>(value: &T, buf: &mut B, ctx: &CdrContext, position: &mut usize) -> Result<()>
where
    T: CdrEncode + ?Sized,
    B: BufMut,
{
    value.cdr_encode(buf, ctx, position)
}
