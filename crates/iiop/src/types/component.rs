//! Tagged components carried inside IIOP 1.1+ profiles

use super::error::{OrbError, Result};
use bytes::Bytes;
use cdr::{
    cdr_struct, code_set, is_char_set_supported, is_wchar_set_supported, CdrContext, Encapsulation,
};
use giop::{CodeSetContext, Endpoint};

/// Well-known component tags
pub mod component_tag {
    /// ORB vendor identifier
    pub const ORB_TYPE: u32 = 0;
    /// Native and conversion code sets
    pub const CODE_SETS: u32 = 1;
    /// Additional host/port the object can be reached at
    pub const ALTERNATE_IIOP_ADDRESS: u32 = 3;
}

cdr_struct! {
    /// Tagged component: `{tag, sequence<octet>}`
    ///
    /// Components with tags this crate does not interpret are kept as-is.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct TaggedComponent {
        pub tag: u32,
        pub component_data: Bytes,
    }
}

impl TaggedComponent {
    pub fn new(tag: u32, component_data: Bytes) -> Self {
        Self {
            tag,
            component_data,
        }
    }
}

cdr_struct! {
    /// Body of a `TAG_ALTERNATE_IIOP_ADDRESS` component
    ///
    /// The port is an IDL `short` on the wire; ports above 32767 appear
    /// negative and are reinterpreted bitwise.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct AlternateIiopAddressComponentData {
        pub host_id: String,
        pub port: i16,
    }
}

impl AlternateIiopAddressComponentData {
    pub fn new(host_id: impl Into<String>, port: u16) -> Self {
        Self {
            host_id: host_id.into(),
            port: port as i16,
        }
    }

    /// Decode from a tagged component; the tag must be the alternate-address tag.
    pub fn decode(component: &TaggedComponent) -> Result<Self> {
        if component.tag != component_tag::ALTERNATE_IIOP_ADDRESS {
            return Err(OrbError::InvalidObjectReference(format!(
                "component tag {} is not an alternate IIOP address",
                component.tag
            )));
        }
        let data = Encapsulation::decode(component.component_data.clone(), |r| r.read())?;
        Ok(data)
    }

    /// Encode as a tagged component with the given byte order
    pub fn to_component(&self, ctx: CdrContext) -> Result<TaggedComponent> {
        let data = Encapsulation::encode(ctx, |w| w.write(self))?;
        Ok(TaggedComponent::new(
            component_tag::ALTERNATE_IIOP_ADDRESS,
            data,
        ))
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::from_signed_port(self.host_id.clone(), self.port)
    }
}

cdr_struct! {
    /// Code sets one side offers for one kind of character data
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct CodeSetComponent {
        pub native_code_set: u32,
        pub conversion_code_sets: Vec<u32>,
    }
}

impl CodeSetComponent {
    pub fn new(native_code_set: u32, conversion_code_sets: Vec<u32>) -> Self {
        Self {
            native_code_set,
            conversion_code_sets,
        }
    }
}

cdr_struct! {
    /// Body of a `TAG_CODE_SETS` component
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct CodeSetComponentInfo {
        pub for_char_data: CodeSetComponent,
        pub for_wchar_data: CodeSetComponent,
    }
}

/// Char code set this ORB prefers
pub const NATIVE_CHAR_SET: u32 = code_set::UTF_8;
/// Wchar code set this ORB prefers
pub const NATIVE_WCHAR_SET: u32 = code_set::UTF_16;

impl CodeSetComponentInfo {
    /// The code sets this ORB offers in the references it publishes
    pub fn native() -> Self {
        Self {
            for_char_data: CodeSetComponent::new(
                NATIVE_CHAR_SET,
                vec![code_set::ISO_8859_1, code_set::ISO_646],
            ),
            for_wchar_data: CodeSetComponent::new(NATIVE_WCHAR_SET, vec![code_set::UCS_2]),
        }
    }

    /// Decode from a tagged component; the tag must be the code-sets tag.
    pub fn decode(component: &TaggedComponent) -> Result<Self> {
        if component.tag != component_tag::CODE_SETS {
            return Err(OrbError::InvalidObjectReference(format!(
                "component tag {} is not a code-set component",
                component.tag
            )));
        }
        let data = Encapsulation::decode(component.component_data.clone(), |r| r.read())?;
        Ok(data)
    }

    pub fn to_component(&self, ctx: CdrContext) -> Result<TaggedComponent> {
        let data = Encapsulation::encode(ctx, |w| w.write(self))?;
        Ok(TaggedComponent::new(component_tag::CODE_SETS, data))
    }

    /// Transmission code sets for talking to the server that offers these.
    ///
    /// For each kind of data: a server native set equal to ours, else a
    /// server native set we can convert, else our native set if the server
    /// converts to it, else the first server conversion set we can convert.
    pub fn negotiate(&self) -> Result<CodeSetContext> {
        let char_data = choose(&self.for_char_data, NATIVE_CHAR_SET, is_char_set_supported)
            .ok_or(OrbError::CodeSetIncompatible { kind: "char" })?;
        let wchar_data = choose(&self.for_wchar_data, NATIVE_WCHAR_SET, is_wchar_set_supported)
            .ok_or(OrbError::CodeSetIncompatible { kind: "wchar" })?;
        Ok(CodeSetContext::new(char_data, wchar_data))
    }
}

fn choose(server: &CodeSetComponent, native: u32, supported: fn(u32) -> bool) -> Option<u32> {
    if server.native_code_set == native || supported(server.native_code_set) {
        return Some(server.native_code_set);
    }
    if server.conversion_code_sets.contains(&native) {
        return Some(native);
    }
    server
        .conversion_code_sets
        .iter()
        .copied()
        .find(|&set| supported(set))
}
