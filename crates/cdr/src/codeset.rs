//! Transmission code sets for `string` and `wstring`
//!
//! Code sets are identified by their OSF registry numbers. A stream carries
//! narrow characters in one char code set and wide characters in one wchar
//! code set; both are fixed per connection by code-set negotiation and
//! default to ISO-8859-1 and UTF-16 when nothing was negotiated.

use crate::error::{CdrError, Result};
use std::borrow::Cow;

/// OSF registry numbers of the supported code sets
pub mod code_set {
    /// ISO 8859-1 (Latin-1)
    pub const ISO_8859_1: u32 = 0x0001_0001;
    /// ISO 646 (ASCII)
    pub const ISO_646: u32 = 0x0001_0020;
    /// X/Open UTF-8
    pub const UTF_8: u32 = 0x0501_0001;
    /// ISO/IEC 10646 UCS-2 level 1
    pub const UCS_2: u32 = 0x0001_0100;
    /// ISO/IEC 10646 UTF-16
    pub const UTF_16: u32 = 0x0001_0109;
}

/// Char code set assumed when none was negotiated
pub const DEFAULT_CHAR_SET: u32 = code_set::ISO_8859_1;
/// Wchar code set assumed when none was negotiated
pub const DEFAULT_WCHAR_SET: u32 = code_set::UTF_16;

/// Whether `set` can carry `string` values
pub fn is_char_set_supported(set: u32) -> bool {
    matches!(
        set,
        code_set::ISO_8859_1 | code_set::ISO_646 | code_set::UTF_8
    )
}

/// Whether `set` can carry `wstring` values
pub fn is_wchar_set_supported(set: u32) -> bool {
    matches!(set, code_set::UTF_16 | code_set::UCS_2)
}

/// Octets of `s` in the char code set `set`, without terminator.
pub(crate) fn encode_narrow(s: &str, set: u32) -> Result<Cow<'_, [u8]>> {
    match set {
        code_set::UTF_8 => Ok(Cow::Borrowed(s.as_bytes())),
        code_set::ISO_8859_1 | code_set::ISO_646 if s.is_ascii() => Ok(Cow::Borrowed(s.as_bytes())),
        code_set::ISO_8859_1 => s
            .chars()
            .map(|c| u8::try_from(u32::from(c)).map_err(|_| unrepresentable(c, set)))
            .collect::<Result<Vec<u8>>>()
            .map(Cow::Owned),
        code_set::ISO_646 => match s.chars().find(|c| !c.is_ascii()) {
            Some(c) => Err(unrepresentable(c, set)),
            None => Ok(Cow::Borrowed(s.as_bytes())),
        },
        other => Err(CdrError::UnsupportedCodeSet(other)),
    }
}

/// Text of `octets` read in the char code set `set`.
pub(crate) fn decode_narrow(octets: Vec<u8>, set: u32) -> Result<String> {
    match set {
        code_set::UTF_8 => Ok(String::from_utf8(octets)?),
        code_set::ISO_8859_1 => Ok(octets.into_iter().map(char::from).collect()),
        code_set::ISO_646 => {
            if let Some(&octet) = octets.iter().find(|o| !o.is_ascii()) {
                return Err(CdrError::InvalidString(format!(
                    "octet {:#04x} outside ISO 646",
                    octet
                )));
            }
            Ok(String::from_utf8(octets)?)
        }
        other => Err(CdrError::UnsupportedCodeSet(other)),
    }
}

/// Code units of `s` in the wchar code set `set`.
pub(crate) fn encode_wide(s: &str, set: u32) -> Result<Vec<u16>> {
    match set {
        code_set::UTF_16 => Ok(s.encode_utf16().collect()),
        code_set::UCS_2 => s
            .chars()
            .map(|c| u16::try_from(u32::from(c)).map_err(|_| unrepresentable(c, set)))
            .collect(),
        other => Err(CdrError::UnsupportedCodeSet(other)),
    }
}

/// Text of `units` read in the wchar code set `set`.
pub(crate) fn decode_wide(units: &[u16], set: u32) -> Result<String> {
    match set {
        code_set::UTF_16 => Ok(String::from_utf16(units)?),
        code_set::UCS_2 => units
            .iter()
            .map(|&unit| {
                char::from_u32(u32::from(unit)).ok_or_else(|| {
                    CdrError::InvalidString(format!("unit {:#06x} outside UCS-2", unit))
                })
            })
            .collect(),
        other => Err(CdrError::UnsupportedCodeSet(other)),
    }
}

fn unrepresentable(c: char, set: u32) -> CdrError {
    CdrError::InvalidString(format!(
        "{:?} not representable in code set {:#010x}",
        c, set
    ))
}
