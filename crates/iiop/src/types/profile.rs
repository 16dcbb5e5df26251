//! Tagged profiles and the Internet-IOP profile body

use super::component::{
    component_tag, AlternateIiopAddressComponentData, CodeSetComponentInfo, TaggedComponent,
};
use super::error::{OrbError, Result};
use bytes::Bytes;
use cdr::{cdr_struct, CdrContext, Encapsulation};
use giop::{Endpoint, GiopVersion};
use tracing::warn;

/// Well-known profile tags
pub mod profile_tag {
    pub const INTERNET_IOP: u32 = 0;
    pub const MULTIPLE_COMPONENTS: u32 = 1;
    pub const SCCP_IOP: u32 = 2;
}

cdr_struct! {
    /// Tagged profile: `{tag, sequence<octet>}`; the data is an encapsulation
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct TaggedProfile {
        pub tag: u32,
        pub profile_data: Bytes,
    }
}

impl TaggedProfile {
    pub fn new(tag: u32, profile_data: Bytes) -> Self {
        Self { tag, profile_data }
    }
}

/// Decoded `TAG_INTERNET_IOP` profile body
///
/// The component list only exists on the wire for IIOP 1.1 and later; a 1.0
/// profile always decodes with no components and encodes without the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternetIiopProfile {
    pub version: GiopVersion,
    pub host: String,
    pub port: u16,
    pub object_key: Bytes,
    pub components: Vec<TaggedComponent>,
}

impl InternetIiopProfile {
    pub fn new(version: GiopVersion, host: impl Into<String>, port: u16, object_key: Bytes) -> Self {
        Self {
            version,
            host: host.into(),
            port,
            object_key,
            components: Vec::new(),
        }
    }

    pub fn with_component(mut self, component: TaggedComponent) -> Self {
        self.components.push(component);
        self
    }

    pub fn decode(profile: &TaggedProfile) -> Result<Self> {
        if profile.tag != profile_tag::INTERNET_IOP {
            return Err(OrbError::InvalidObjectReference(format!(
                "profile tag {:#x} is not Internet-IOP",
                profile.tag
            )));
        }
        let decoded = Encapsulation::decode(profile.profile_data.clone(), |r| {
            let major: u8 = r.read()?;
            let minor: u8 = r.read()?;
            let host = r.read()?;
            let port = r.read()?;
            let object_key = r.read()?;
            let components = if minor >= 1 { r.read()? } else { Vec::new() };
            Ok(Self {
                version: GiopVersion::new(major, minor),
                host,
                port,
                object_key,
                components,
            })
        })?;
        Ok(decoded)
    }

    /// Encode as a big-endian tagged profile
    pub fn encode(&self) -> Result<TaggedProfile> {
        self.encode_with(CdrContext::big_endian())
    }

    pub fn encode_with(&self, ctx: CdrContext) -> Result<TaggedProfile> {
        let data = Encapsulation::encode(ctx, |w| {
            w.write(&self.version.major)?;
            w.write(&self.version.minor)?;
            w.write(self.host.as_str())?;
            w.write(&self.port)?;
            w.write(&self.object_key)?;
            if self.version.minor >= 1 {
                w.write(&self.components)?;
            }
            Ok(())
        })?;
        Ok(TaggedProfile::new(profile_tag::INTERNET_IOP, data))
    }

    /// Primary address of the profile
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    /// First component with `tag`
    pub fn component(&self, tag: u32) -> Option<&TaggedComponent> {
        self.components.iter().find(|c| c.tag == tag)
    }

    /// Code sets the target offers, if the profile says
    pub fn code_sets(&self) -> Result<Option<CodeSetComponentInfo>> {
        self.component(component_tag::CODE_SETS)
            .map(CodeSetComponentInfo::decode)
            .transpose()
    }

    /// Alternate addresses in the order the components were encoded.
    ///
    /// A malformed alternate-address component is skipped; the primary
    /// address and the remaining alternates stay usable.
    pub fn alternate_addresses(&self) -> Vec<Endpoint> {
        self.components
            .iter()
            .filter(|c| c.tag == component_tag::ALTERNATE_IIOP_ADDRESS)
            .filter_map(|c| match AlternateIiopAddressComponentData::decode(c) {
                Ok(data) => Some(data.endpoint()),
                Err(e) => {
                    warn!(host = %self.host, port = self.port, "skipping alternate address: {}", e);
                    None
                }
            })
            .collect()
    }
}
