//! Ordered record declarations
//!
//! [`cdr_struct!`](crate::cdr_struct) declares a struct and implements
//! [`CdrEncode`](crate::CdrEncode)/[`CdrDecode`](crate::CdrDecode) for it. Fields
//! go on the wire strictly in the order they are listed.

/// Declare a struct whose CDR form is its fields in declaration order.
///
/// ```
/// use cdr::{cdr_struct, CdrContext, CdrReader, CdrWriter};
///
/// cdr_struct! {
///     #[derive(Debug, Clone, PartialEq)]
///     pub struct Address {
///         pub host: String,
///         pub port: u16,
///     }
/// }
///
/// let mut w = CdrWriter::new(CdrContext::big_endian());
/// w.write(&Address { host: "a".into(), port: 1 }).unwrap();
/// let mut r = CdrReader::new(w.into_bytes(), CdrContext::big_endian());
/// assert_eq!(r.read::<Address>().unwrap().port, 1);
/// ```
#[macro_export]
macro_rules! cdr_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $ty,
            )*
        }

        impl $crate::CdrEncode for $name {
            fn cdr_encode<B: $crate::BufMut>(
                &self,
                buf: &mut B,
                ctx: &$crate::CdrContext,
                position: &mut usize,
            ) -> $crate::Result<()> {
                $( $crate::CdrEncode::cdr_encode(&self.$field, buf, ctx, position)?; )*
                Ok(())
            }
        }

        impl $crate::CdrDecode for $name {
            fn cdr_decode<B: $crate::Buf>(
                buf: &mut B,
                ctx: &$crate::CdrContext,
                position: &mut usize,
            ) -> $crate::Result<Self> {
                $( let $field = <$ty as $crate::CdrDecode>::cdr_decode(buf, ctx, position)?; )*
                Ok(Self { $($field),* })
            }
        }
    };
}
