//! Per-call policies
//!
//! Policies parameterise invocation behaviour (timeouts, failover). They are
//! stored in a [`PolicySet`] keyed by `policy_type`; consumers query typed
//! values by type number and never depend on a concrete policy struct.

use crate::error::{GiopError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Well-known policy type numbers
pub mod policy_type {
    /// Bound on waiting for a reply
    pub const REQUEST_TIMEOUT: u32 = 0x5254_0001;
    /// Bound on each connection attempt
    pub const CONNECT_TIMEOUT: u32 = 0x5254_0002;
    /// Maximum number of endpoints tried per acquisition
    pub const MAX_FAILOVER_ATTEMPTS: u32 = 0x5254_0003;
    /// Whether alternate addresses from IOR components are used
    pub const USE_ALTERNATE_ADDRESSES: u32 = 0x5254_0004;
}

/// Typed value held by a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyValue {
    Duration(Duration),
    Count(u32),
    Flag(bool),
}

/// A policy: a type number plus a queryable value.
///
/// `copy` must return a clone that shares no state with `self`.
pub trait Policy: fmt::Debug + Send + Sync {
    fn policy_type(&self) -> u32;

    fn value(&self) -> PolicyValue;

    /// Replace the value; fails if the variant does not fit the policy.
    fn set_value(&mut self, value: PolicyValue) -> Result<()>;

    fn copy(&self) -> Box<dyn Policy>;
}

macro_rules! define_policy {
    ($(#[$meta:meta])* $name:ident, $type:expr, $variant:ident, $inner:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name(pub $inner);

        impl Policy for $name {
            fn policy_type(&self) -> u32 {
                $type
            }

            fn value(&self) -> PolicyValue {
                PolicyValue::$variant(self.0)
            }

            fn set_value(&mut self, value: PolicyValue) -> Result<()> {
                match value {
                    PolicyValue::$variant(v) => {
                        self.0 = v;
                        Ok(())
                    }
                    _ => Err(GiopError::InvalidPolicyValue {
                        policy_type: $type,
                    }),
                }
            }

            fn copy(&self) -> Box<dyn Policy> {
                Box::new(*self)
            }
        }
    };
}

define_policy!(
    /// Fails an invocation with `Timeout` when no reply arrives in time
    RequestTimeoutPolicy,
    policy_type::REQUEST_TIMEOUT,
    Duration,
    Duration
);
define_policy!(
    /// Bounds each connection attempt during failover
    ConnectTimeoutPolicy,
    policy_type::CONNECT_TIMEOUT,
    Duration,
    Duration
);
define_policy!(
    /// Caps how many candidate endpoints one acquisition tries
    MaxFailoverAttemptsPolicy,
    policy_type::MAX_FAILOVER_ATTEMPTS,
    Count,
    u32
);
define_policy!(
    /// Enables or disables alternate IIOP addresses
    UseAlternateAddressesPolicy,
    policy_type::USE_ALTERNATE_ADDRESSES,
    Flag,
    bool
);

/// Policies keyed by `policy_type`
#[derive(Debug, Default)]
pub struct PolicySet {
    policies: BTreeMap<u32, Box<dyn Policy>>,
}

impl PolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a policy, replacing any policy of the same type
    pub fn set(&mut self, policy: impl Policy + 'static) {
        self.set_boxed(Box::new(policy));
    }

    pub fn set_boxed(&mut self, policy: Box<dyn Policy>) {
        self.policies.insert(policy.policy_type(), policy);
    }

    pub fn with(mut self, policy: impl Policy + 'static) -> Self {
        self.set(policy);
        self
    }

    pub fn get(&self, policy_type: u32) -> Option<&dyn Policy> {
        self.policies.get(&policy_type).map(|p| p.as_ref())
    }

    pub fn get_mut(&mut self, policy_type: u32) -> Option<&mut Box<dyn Policy>> {
        self.policies.get_mut(&policy_type)
    }

    pub fn remove(&mut self, policy_type: u32) -> Option<Box<dyn Policy>> {
        self.policies.remove(&policy_type)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Policies in `overrides` replace those of the same type in `self`.
    pub fn merged(&self, overrides: &PolicySet) -> PolicySet {
        let mut merged = self.clone();
        for policy in overrides.policies.values() {
            merged.set_boxed(policy.copy());
        }
        merged
    }

    pub fn duration(&self, policy_type: u32) -> Option<Duration> {
        match self.get(policy_type)?.value() {
            PolicyValue::Duration(d) => Some(d),
            _ => None,
        }
    }

    pub fn count(&self, policy_type: u32) -> Option<u32> {
        match self.get(policy_type)?.value() {
            PolicyValue::Count(c) => Some(c),
            _ => None,
        }
    }

    pub fn flag(&self, policy_type: u32) -> Option<bool> {
        match self.get(policy_type)?.value() {
            PolicyValue::Flag(f) => Some(f),
            _ => None,
        }
    }
}

impl Clone for PolicySet {
    fn clone(&self) -> Self {
        Self {
            policies: self
                .policies
                .iter()
                .map(|(t, p)| (*t, p.copy()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct LabelPolicy {
        labels: Vec<String>,
    }

    impl Policy for LabelPolicy {
        fn policy_type(&self) -> u32 {
            99
        }

        fn value(&self) -> PolicyValue {
            PolicyValue::Count(self.labels.len() as u32)
        }

        fn set_value(&mut self, value: PolicyValue) -> Result<()> {
            match value {
                PolicyValue::Count(n) => {
                    self.labels.resize(n as usize, String::new());
                    Ok(())
                }
                _ => Err(GiopError::InvalidPolicyValue { policy_type: 99 }),
            }
        }

        fn copy(&self) -> Box<dyn Policy> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn test_copy_is_independent() {
        let originals: Vec<Box<dyn Policy>> = vec![
            Box::new(RequestTimeoutPolicy(Duration::from_secs(1))),
            Box::new(ConnectTimeoutPolicy(Duration::from_secs(2))),
            Box::new(MaxFailoverAttemptsPolicy(3)),
            Box::new(UseAlternateAddressesPolicy(true)),
            Box::new(LabelPolicy {
                labels: vec!["x".into()],
            }),
        ];
        for original in &originals {
            let before = original.value();
            let mut copy = original.copy();
            let changed = match before {
                PolicyValue::Duration(d) => PolicyValue::Duration(d * 10),
                PolicyValue::Count(c) => PolicyValue::Count(c + 5),
                PolicyValue::Flag(f) => PolicyValue::Flag(!f),
            };
            copy.set_value(changed).unwrap();
            assert_eq!(copy.value(), changed);
            assert_eq!(original.value(), before);
            assert_eq!(copy.policy_type(), original.policy_type());
        }
    }

    #[test]
    fn test_set_clone_is_independent() {
        let mut set = PolicySet::new().with(MaxFailoverAttemptsPolicy(3));
        let copy = set.clone();
        set.get_mut(policy_type::MAX_FAILOVER_ATTEMPTS)
            .unwrap()
            .set_value(PolicyValue::Count(1))
            .unwrap();
        assert_eq!(set.count(policy_type::MAX_FAILOVER_ATTEMPTS), Some(1));
        assert_eq!(copy.count(policy_type::MAX_FAILOVER_ATTEMPTS), Some(3));
    }

    #[test]
    fn test_wrong_value_variant() {
        let mut policy = RequestTimeoutPolicy(Duration::from_secs(1));
        let err = policy.set_value(PolicyValue::Flag(true)).unwrap_err();
        assert!(matches!(
            err,
            GiopError::InvalidPolicyValue {
                policy_type: policy_type::REQUEST_TIMEOUT
            }
        ));
    }

    #[test]
    fn test_typed_queries() {
        let set = PolicySet::new()
            .with(RequestTimeoutPolicy(Duration::from_millis(250)))
            .with(UseAlternateAddressesPolicy(false));
        assert_eq!(
            set.duration(policy_type::REQUEST_TIMEOUT),
            Some(Duration::from_millis(250))
        );
        assert_eq!(set.flag(policy_type::USE_ALTERNATE_ADDRESSES), Some(false));
        assert_eq!(set.count(policy_type::REQUEST_TIMEOUT), None);
        assert_eq!(set.duration(policy_type::CONNECT_TIMEOUT), None);
    }

    #[test]
    fn test_merged_overrides() {
        let base = PolicySet::new()
            .with(MaxFailoverAttemptsPolicy(5))
            .with(UseAlternateAddressesPolicy(true));
        let overrides = PolicySet::new().with(MaxFailoverAttemptsPolicy(1));
        let merged = base.merged(&overrides);
        assert_eq!(merged.count(policy_type::MAX_FAILOVER_ATTEMPTS), Some(1));
        assert_eq!(merged.flag(policy_type::USE_ALTERNATE_ADDRESSES), Some(true));
        assert_eq!(base.count(policy_type::MAX_FAILOVER_ATTEMPTS), Some(5));
    }
}
