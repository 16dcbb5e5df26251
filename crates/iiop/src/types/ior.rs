//! Interoperable Object Reference
//!
//! An IOR is a repository type id plus an ordered list of tagged profiles.
//! Its binary form is an encapsulation; the stringified form is `IOR:`
//! followed by that encapsulation in hex.

use super::corbaloc::Corbaloc;
use super::error::{OrbError, Result};
use super::iiop_url::IiopUrl;
use super::profile::{profile_tag, InternetIiopProfile, TaggedProfile};
use bytes::Bytes;
use cdr::{cdr_struct, CdrContext, CdrReader, CdrWriter, Encapsulation};
use std::fmt;
use std::str::FromStr;

const IOR_PREFIX: &str = "IOR:";

cdr_struct! {
    /// Object reference; immutable once built
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub struct ObjectReference {
        type_id: String,
        profiles: Vec<TaggedProfile>,
    }
}

impl ObjectReference {
    pub fn new(type_id: impl Into<String>, profiles: Vec<TaggedProfile>) -> Self {
        Self {
            type_id: type_id.into(),
            profiles,
        }
    }

    /// Reference to a single IIOP endpoint
    pub fn from_iiop(type_id: impl Into<String>, profile: &InternetIiopProfile) -> Result<Self> {
        Ok(Self::new(type_id, vec![profile.encode()?]))
    }

    /// The nil reference: empty type id, no profiles
    pub fn nil() -> Self {
        Self::default()
    }

    pub fn is_nil(&self) -> bool {
        self.type_id.is_empty() && self.profiles.is_empty()
    }

    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn profiles(&self) -> &[TaggedProfile] {
        &self.profiles
    }

    pub fn profiles_of_tag(&self, tag: u32) -> impl Iterator<Item = &TaggedProfile> + '_ {
        self.profiles.iter().filter(move |p| p.tag == tag)
    }

    /// Decoded Internet-IOP profiles, in encoded order
    pub fn iiop_profiles(&self) -> Result<Vec<InternetIiopProfile>> {
        self.profiles_of_tag(profile_tag::INTERNET_IOP)
            .map(InternetIiopProfile::decode)
            .collect()
    }

    /// Parse a stringified reference: `IOR:<hex>`, a `corbaloc:` URL or an
    /// `iiop://` URL.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with(super::corbaloc::CORBALOC_SCHEME) {
            return Corbaloc::parse(s)?.to_object_reference();
        }
        if IiopUrl::is_iiop_url(s) {
            return IiopUrl::parse(s)?.to_object_reference();
        }
        let hex_part = s
            .strip_prefix(IOR_PREFIX)
            .ok_or_else(|| OrbError::InvalidObjectReference("missing IOR: prefix".to_string()))?;
        let bytes = hex::decode(hex_part)
            .map_err(|e| OrbError::InvalidObjectReference(format!("bad hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Decode the binary form: byte-order octet followed by the body.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let reference = Encapsulation::decode(Bytes::copy_from_slice(data), |r| r.read())?;
        Ok(reference)
    }

    /// Decode a reference embedded in a CDR stream, such as a
    /// LOCATION_FORWARD reply body.
    pub fn decode(reader: &mut CdrReader) -> Result<Self> {
        Ok(reader.read()?)
    }

    pub fn encode(&self, writer: &mut CdrWriter) -> Result<()> {
        Ok(writer.write(self)?)
    }

    /// Big-endian binary form
    pub fn to_bytes(&self) -> Result<Bytes> {
        self.to_bytes_with(CdrContext::big_endian())
    }

    pub fn to_bytes_with(&self, ctx: CdrContext) -> Result<Bytes> {
        Ok(Encapsulation::encode(ctx, |w| w.write(self))?)
    }

    /// Stringified `IOR:` form
    pub fn to_ior_string(&self) -> Result<String> {
        Ok(format!("{}{}", IOR_PREFIX, hex::encode(self.to_bytes()?)))
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.to_ior_string().map_err(|_| fmt::Error)?;
        f.write_str(&s)
    }
}

impl FromStr for ObjectReference {
    type Err = OrbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
