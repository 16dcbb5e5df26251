//! CDR encoding/decoding context
//!
//! The context tracks byte order and the transmission code sets, and
//! provides helpers for alignment and primitive encoding/decoding.

use crate::codeset::{DEFAULT_CHAR_SET, DEFAULT_WCHAR_SET};
use crate::error::{CdrError, Result};
use bytes::{Buf, BufMut};

/// CDR encoding/decoding context
///
/// Tracks the byte order selected for one message or encapsulation. The
/// same context must be threaded through every call that touches that
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CdrContext {
    /// Whether to use little-endian byte order
    pub little_endian: bool,
    /// Code set of `string` values
    pub char_set: u32,
    /// Code set of `wstring` values
    pub wchar_set: u32,
}

impl CdrContext {
    /// Big-endian context (the CDR default when no flags are known)
    pub fn big_endian() -> Self {
        Self::with_byte_order(false)
    }

    /// Little-endian context
    pub fn little_endian() -> Self {
        Self::with_byte_order(true)
    }

    /// Create a context with specified byte order and the default code sets
    pub fn with_byte_order(little_endian: bool) -> Self {
        Self {
            little_endian,
            char_set: DEFAULT_CHAR_SET,
            wchar_set: DEFAULT_WCHAR_SET,
        }
    }

    /// Create a context from a GIOP flags octet or encapsulation byte-order octet
    ///
    /// Only bit 0 is significant.
    pub fn from_flags(flags: u8) -> Self {
        Self::with_byte_order(flags & 0x01 != 0)
    }

    /// Same byte order, with the given transmission code sets
    pub fn with_code_sets(self, char_set: u32, wchar_set: u32) -> Self {
        Self {
            char_set,
            wchar_set,
            ..self
        }
    }

    /// The byte-order octet announcing this context
    pub fn byte_order_flag(&self) -> u8 {
        if self.little_endian {
            1
        } else {
            0
        }
    }

    /// Calculate padding needed to align to the given boundary
    #[inline]
    pub fn align_padding(position: usize, alignment: usize) -> usize {
        if alignment == 0 || alignment == 1 {
            return 0;
        }
        let remainder = position % alignment;
        if remainder == 0 {
            0
        } else {
            alignment - remainder
        }
    }

    /// Write padding bytes to align to the given boundary
    pub fn write_align<B: BufMut>(&self, buf: &mut B, position: &mut usize, alignment: usize) {
        let padding = Self::align_padding(*position, alignment);
        buf.put_bytes(0, padding);
        *position += padding;
    }

    /// Skip padding bytes to align to the given boundary
    pub fn read_align<B: Buf>(
        &self,
        buf: &mut B,
        position: &mut usize,
        alignment: usize,
    ) -> Result<()> {
        let padding = Self::align_padding(*position, alignment);
        if buf.remaining() < padding {
            return Err(CdrError::underflow(padding, buf.remaining()));
        }
        buf.advance(padding);
        *position += padding;
        Ok(())
    }

    /// Align, then check that `size` bytes can be read
    pub(crate) fn prepare_read<B: Buf>(
        &self,
        buf: &mut B,
        position: &mut usize,
        alignment: usize,
        size: usize,
    ) -> Result<()> {
        let padding = Self::align_padding(*position, alignment);
        if buf.remaining() < padding + size {
            return Err(CdrError::underflow(padding + size, buf.remaining()));
        }
        buf.advance(padding);
        *position += padding;
        Ok(())
    }

    // Primitive encoding methods

    #[inline]
    pub fn put_u8<B: BufMut>(&self, buf: &mut B, value: u8) {
        buf.put_u8(value);
    }

    #[inline]
    pub fn put_i8<B: BufMut>(&self, buf: &mut B, value: i8) {
        buf.put_i8(value);
    }

    #[inline]
    pub fn put_u16<B: BufMut>(&self, buf: &mut B, value: u16) {
        if self.little_endian {
            buf.put_u16_le(value);
        } else {
            buf.put_u16(value);
        }
    }

    #[inline]
    pub fn put_i16<B: BufMut>(&self, buf: &mut B, value: i16) {
        if self.little_endian {
            buf.put_i16_le(value);
        } else {
            buf.put_i16(value);
        }
    }

    #[inline]
    pub fn put_u32<B: BufMut>(&self, buf: &mut B, value: u32) {
        if self.little_endian {
            buf.put_u32_le(value);
        } else {
            buf.put_u32(value);
        }
    }

    #[inline]
    pub fn put_i32<B: BufMut>(&self, buf: &mut B, value: i32) {
        if self.little_endian {
            buf.put_i32_le(value);
        } else {
            buf.put_i32(value);
        }
    }

    #[inline]
    pub fn put_u64<B: BufMut>(&self, buf: &mut B, value: u64) {
        if self.little_endian {
            buf.put_u64_le(value);
        } else {
            buf.put_u64(value);
        }
    }

    #[inline]
    pub fn put_i64<B: BufMut>(&self, buf: &mut B, value: i64) {
        if self.little_endian {
            buf.put_i64_le(value);
        } else {
            buf.put_i64(value);
        }
    }

    #[inline]
    pub fn put_f32<B: BufMut>(&self, buf: &mut B, value: f32) {
        if self.little_endian {
            buf.put_f32_le(value);
        } else {
            buf.put_f32(value);
        }
    }

    #[inline]
    pub fn put_f64<B: BufMut>(&self, buf: &mut B, value: f64) {
        if self.little_endian {
            buf.put_f64_le(value);
        } else {
            buf.put_f64(value);
        }
    }

    // Primitive decoding methods
    //
    // Callers check `remaining()` first; these never fail.

    #[inline]
    pub fn get_u8<B: Buf>(&self, buf: &mut B) -> u8 {
        buf.get_u8()
    }

    #[inline]
    pub fn get_i8<B: Buf>(&self, buf: &mut B) -> i8 {
        buf.get_i8()
    }

    #[inline]
    pub fn get_u16<B: Buf>(&self, buf: &mut B) -> u16 {
        if self.little_endian {
            buf.get_u16_le()
        } else {
            buf.get_u16()
        }
    }

    #[inline]
    pub fn get_i16<B: Buf>(&self, buf: &mut B) -> i16 {
        if self.little_endian {
            buf.get_i16_le()
        } else {
            buf.get_i16()
        }
    }

    #[inline]
    pub fn get_u32<B: Buf>(&self, buf: &mut B) -> u32 {
        if self.little_endian {
            buf.get_u32_le()
        } else {
            buf.get_u32()
        }
    }

    #[inline]
    pub fn get_i32<B: Buf>(&self, buf: &mut B) -> i32 {
        if self.little_endian {
            buf.get_i32_le()
        } else {
            buf.get_i32()
        }
    }

    #[inline]
    pub fn get_u64<B: Buf>(&self, buf: &mut B) -> u64 {
        if self.little_endian {
            buf.get_u64_le()
        } else {
            buf.get_u64()
        }
    }

    #[inline]
    pub fn get_i64<B: Buf>(&self, buf: &mut B) -> i64 {
        if self.little_endian {
            buf.get_i64_le()
        } else {
            buf.get_i64()
        }
    }

    #[inline]
    pub fn get_f32<B: Buf>(&self, buf: &mut B) -> f32 {
        if self.little_endian {
            buf.get_f32_le()
        } else {
            buf.get_f32()
        }
    }

    #[inline]
    pub fn get_f64<B: Buf>(&self, buf: &mut B) -> f64 {
        if self.little_endian {
            buf.get_f64_le()
        } else {
            buf.get_f64()
        }
    }
}

impl Default for CdrContext {
    fn default() -> Self {
        Self::big_endian()
    }
}
