//! Endpoint resolution
//!
//! Turns an object reference into the ordered endpoint list the connection
//! manager fails over along: the first Internet-IOP profile's address,
//! followed by its alternate addresses in encoded order.

use crate::types::{profile_tag, InternetIiopProfile, ObjectReference, OrbError, Result};
use giop::{policy_type, Endpoint, PolicySet};
use tracing::debug;

/// Resolves references to candidate endpoints
#[derive(Debug, Clone, Copy)]
pub struct EndpointResolver {
    use_alternates: bool,
}

impl Default for EndpointResolver {
    fn default() -> Self {
        Self {
            use_alternates: true,
        }
    }
}

impl EndpointResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver honouring the `USE_ALTERNATE_ADDRESSES` policy (default on)
    pub fn from_policies(policies: &PolicySet) -> Self {
        Self {
            use_alternates: policies
                .flag(policy_type::USE_ALTERNATE_ADDRESSES)
                .unwrap_or(true),
        }
    }

    pub fn uses_alternates(&self) -> bool {
        self.use_alternates
    }

    /// The profile invocations are addressed through
    pub fn primary_profile(&self, reference: &ObjectReference) -> Result<InternetIiopProfile> {
        let tagged = reference
            .profiles_of_tag(profile_tag::INTERNET_IOP)
            .next()
            .ok_or_else(|| OrbError::NoUsableProfile {
                type_id: reference.type_id().to_string(),
            })?;
        InternetIiopProfile::decode(tagged)
    }

    /// Ordered candidate endpoints; index 0 is the profile's own address
    pub fn resolve(&self, reference: &ObjectReference) -> Result<Vec<Endpoint>> {
        let profile = self.primary_profile(reference)?;
        Ok(self.endpoints_of(&profile))
    }

    pub fn endpoints_of(&self, profile: &InternetIiopProfile) -> Vec<Endpoint> {
        let mut endpoints = vec![profile.endpoint()];
        if self.use_alternates {
            endpoints.extend(profile.alternate_addresses());
        }
        debug!(?endpoints, "resolved endpoints");
        endpoints
    }
}
