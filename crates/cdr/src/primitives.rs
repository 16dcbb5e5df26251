//! CDR primitive type implementations
//!
//! | IDL Type           | Rust Type | Size | Alignment |
//! |--------------------|-----------|------|-----------|
//! | boolean            | bool      | 1    | 1         |
//! | octet              | u8        | 1    | 1         |
//! | char               | i8        | 1    | 1         |
//! | short              | i16       | 2    | 2         |
//! | unsigned short     | u16       | 2    | 2         |
//! | long               | i32       | 4    | 4         |
//! | unsigned long      | u32       | 4    | 4         |
//! | long long          | i64       | 8    | 8         |
//! | unsigned long long | u64       | 8    | 8         |
//! | float              | f32       | 4    | 4         |
//! | double             | f64       | 8    | 8         |

use crate::{CdrContext, CdrDecode, CdrEncode, CdrError, Result};
use bytes::{Buf, BufMut};

macro_rules! impl_cdr_primitive {
    ($ty:ty, $size:expr, $put:ident, $get:ident) => {
        impl CdrEncode for $ty {
            fn cdr_encode<B: BufMut>(
                &self,
                buf: &mut B,
                ctx: &CdrContext,
                position: &mut usize,
            ) -> Result<()> {
                ctx.write_align(buf, position, $size);
                ctx.$put(buf, *self);
                *position += $size;
                Ok(())
            }

            fn cdr_align() -> usize {
                $size
            }
        }

        impl CdrDecode for $ty {
            fn cdr_decode<B: Buf>(
                buf: &mut B,
                ctx: &CdrContext,
                position: &mut usize,
            ) -> Result<Self> {
                ctx.prepare_read(buf, position, $size, $size)?;
                let value = ctx.$get(buf);
                *position += $size;
                Ok(value)
            }

            fn cdr_align() -> usize {
                $size
            }
        }
    };
}

impl_cdr_primitive!(u8, 1, put_u8, get_u8);
impl_cdr_primitive!(i8, 1, put_i8, get_i8);
impl_cdr_primitive!(u16, 2, put_u16, get_u16);
impl_cdr_primitive!(i16, 2, put_i16, get_i16);
impl_cdr_primitive!(u32, 4, put_u32, get_u32);
impl_cdr_primitive!(i32, 4, put_i32, get_i32);
impl_cdr_primitive!(u64, 8, put_u64, get_u64);
impl_cdr_primitive!(i64, 8, put_i64, get_i64);
impl_cdr_primitive!(f32, 4, put_f32, get_f32);
impl_cdr_primitive!(f64, 8, put_f64, get_f64);

impl CdrEncode for bool {
    fn cdr_encode<B: BufMut>(
        &self,
        buf: &mut B,
        ctx: &CdrContext,
        position: &mut usize,
    ) -> Result<()> {
        ctx.put_u8(buf, u8::from(*self));
        *position += 1;
        Ok(())
    }
}

impl CdrDecode for bool {
    fn cdr_decode<B: Buf>(buf: &mut B, ctx: &CdrContext, position: &mut usize) -> Result<Self> {
        ctx.prepare_read(buf, position, 1, 1)?;
        let value = ctx.get_u8(buf);
        *position += 1;
        match value {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CdrError::InvalidEnumValue(other as u32)),
        }
    }
}

/// Fixed-length octet arrays (magic numbers, reserved fields) have no
/// length prefix and no alignment.
impl<const N: usize> CdrEncode for [u8; N] {
    fn cdr_encode<B: BufMut>(
        &self,
        buf: &mut B,
        _ctx: &CdrContext,
        position: &mut usize,
    ) -> Result<()> {
        buf.put_slice(self);
        *position += N;
        Ok(())
    }
}

impl<const N: usize> CdrDecode for [u8; N] {
    fn cdr_decode<B: Buf>(buf: &mut B, _ctx: &CdrContext, position: &mut usize) -> Result<Self> {
        if buf.remaining() < N {
            return Err(CdrError::MalformedEncoding {
                needed: N,
                have: buf.remaining(),
            });
        }
        let mut value = [0u8; N];
        buf.copy_to_slice(&mut value);
        *position += N;
        Ok(value)
    }
}
