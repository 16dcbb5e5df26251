//! CDR (Common Data Representation) runtime library
//!
//! This crate implements the CORBA CDR transfer syntax used for every GIOP
//! message body, IOR, tagged profile and tagged component.
//!
//! # CDR Wire Format
//!
//! Key characteristics:
//! - Primitives align to their natural size (1, 2, 4, or 8 bytes), measured
//!   from the start of the enclosing message or encapsulation
//! - Byte order is chosen by the sender and announced once per message
//!   (GIOP flags) or per encapsulation (leading byte-order octet)
//! - Strings carry a `ulong` length that includes the terminating NUL, in the
//!   char code set of the context (wide strings in its wchar code set)
//! - Sequences carry a `ulong` element count followed by the elements
//!
//! # Example
//!
//! ```
//! use cdr::{CdrContext, CdrReader, CdrWriter};
//!
//! let mut writer = CdrWriter::new(CdrContext::big_endian());
//! writer.write(&7u8).unwrap();
//! writer.write(&0x01020304u32).unwrap(); // padded to offset 4
//! writer.write("host").unwrap();
//! let bytes = writer.into_bytes();
//! assert_eq!(&bytes[..8], &[7, 0, 0, 0, 1, 2, 3, 4]);
//!
//! let mut reader = CdrReader::new(bytes, CdrContext::big_endian());
//! assert_eq!(reader.read::<u8>().unwrap(), 7);
//! assert_eq!(reader.read::<u32>().unwrap(), 0x01020304);
//! assert_eq!(reader.read::<String>().unwrap(), "host");
//! ```

mod codeset;
mod context;
mod decode;
mod encapsulation;
mod encode;
mod error;
mod primitives;
mod record;
mod sequences;
mod strings;

pub use codeset::{
    code_set, is_char_set_supported, is_wchar_set_supported, DEFAULT_CHAR_SET, DEFAULT_WCHAR_SET,
};
pub use context::CdrContext;
pub use decode::{decode_at, CdrDecode};
pub use encapsulation::{CdrReader, CdrWriter, Encapsulation};
pub use encode::{encode_into, CdrEncode};
pub use error::{CdrError, Result, MAX_CDR_ALLOCATION_SIZE};
pub use strings::CdrWString;

/// Re-export bytes for convenience
pub use bytes::{Buf, BufMut, Bytes, BytesMut};
