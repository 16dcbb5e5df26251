//! Code-set negotiation state
//!
//! The client picks the transmission code sets for a connection from the
//! target's `TAG_CODE_SETS` component and announces them once, in the
//! [`CODE_SETS_SERVICE_ID`] service context of the first request it sends
//! on that connection. Both sides then read and write every `string` and
//! `wstring` on the connection in those sets.

use crate::error::Result;
use crate::giop::ServiceContext;
use cdr::{
    cdr_struct, is_char_set_supported, is_wchar_set_supported, CdrContext, Encapsulation,
    DEFAULT_CHAR_SET, DEFAULT_WCHAR_SET,
};
use parking_lot::Mutex;

/// Service context id of the code-set announcement
pub const CODE_SETS_SERVICE_ID: u32 = 1;

cdr_struct! {
    /// Transmission code sets chosen for a connection
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CodeSetContext {
        pub char_data: u32,
        pub wchar_data: u32,
    }
}

impl CodeSetContext {
    pub fn new(char_data: u32, wchar_data: u32) -> Self {
        Self {
            char_data,
            wchar_data,
        }
    }

    /// Whether both sets can be converted here
    pub fn is_supported(&self) -> bool {
        is_char_set_supported(self.char_data) && is_wchar_set_supported(self.wchar_data)
    }

    /// `ctx` with these sets for its strings
    pub fn apply(&self, ctx: CdrContext) -> CdrContext {
        ctx.with_code_sets(self.char_data, self.wchar_data)
    }

    pub fn to_service_context(&self, byte_order: CdrContext) -> Result<ServiceContext> {
        let data = Encapsulation::encode(byte_order, |w| w.write(self))?;
        Ok(ServiceContext::new(CODE_SETS_SERVICE_ID, data))
    }

    /// The announcement carried in `list`, if any
    pub fn from_service_contexts(list: &[ServiceContext]) -> Result<Option<Self>> {
        let Some(entry) = ServiceContext::find(list, CODE_SETS_SERVICE_ID) else {
            return Ok(None);
        };
        let sets = Encapsulation::decode(entry.context_data.clone(), |r| r.read())?;
        Ok(Some(sets))
    }
}

impl Default for CodeSetContext {
    fn default() -> Self {
        Self::new(DEFAULT_CHAR_SET, DEFAULT_WCHAR_SET)
    }
}

/// Code sets of one connection, fixed once
#[derive(Debug, Default)]
pub struct CodeSetState {
    established: Mutex<Option<CodeSetContext>>,
}

impl CodeSetState {
    /// Sets in force; the defaults until established
    pub fn current(&self) -> CodeSetContext {
        let established = *self.established.lock();
        established.unwrap_or_default()
    }

    pub fn is_established(&self) -> bool {
        self.established.lock().is_some()
    }

    /// Fix the sets to `proposed` (the defaults for `None`) unless already
    /// fixed. Returns the sets in force and whether this call fixed them to
    /// an explicit proposal, i.e. whether the announcement must be sent.
    pub fn establish(&self, proposed: Option<CodeSetContext>) -> (CodeSetContext, bool) {
        let mut established = self.established.lock();
        if let Some(sets) = *established {
            return (sets, false);
        }
        let sets = proposed.unwrap_or_default();
        *established = Some(sets);
        (sets, proposed.is_some())
    }
}
