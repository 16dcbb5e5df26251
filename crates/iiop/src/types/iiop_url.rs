//! `iiop://` URLs
//!
//! ```text
//! iiop://host:2809/Some%20Key
//! iiop1.0://host:2809/Some%20Key
//! ```
//!
//! The scheme may name the IIOP version (`iiop1.0`, `iiop1.1`, `iiop1.2`);
//! plain `iiop` means 1.2. The URL stands for a single Internet-IOP profile.

use super::corbaloc::{host_and_port, percent_decode, version_of, DEFAULT_CORBALOC_PORT};
use super::error::{OrbError, Result};
use super::ior::ObjectReference;
use super::profile::InternetIiopProfile;
use bytes::Bytes;
use giop::GiopVersion;
use std::str::FromStr;

const IIOP_SCHEME: &str = "iiop";
const SCHEME_DELIMITER: &str = "://";

/// Version of a plain `iiop://` URL
pub const DEFAULT_IIOP_URL_VERSION: GiopVersion = GiopVersion::V1_2;

/// Parsed `iiop://` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IiopUrl {
    pub version: GiopVersion,
    pub host: String,
    pub port: u16,
    /// Object key with `%HH` escapes decoded
    pub key: Bytes,
}

impl IiopUrl {
    /// Whether `s` uses an `iiop` scheme, with or without a version
    pub fn is_iiop_url(s: &str) -> bool {
        s.split_once(SCHEME_DELIMITER)
            .map(|(scheme, _)| scheme.starts_with(IIOP_SCHEME) && !scheme.starts_with("iiop-"))
            .unwrap_or(false)
    }

    pub fn parse(url: &str) -> Result<Self> {
        let (scheme, rest) = url
            .split_once(SCHEME_DELIMITER)
            .ok_or_else(|| invalid(url, "missing ://"))?;
        let version = match scheme.strip_prefix(IIOP_SCHEME) {
            Some("") => DEFAULT_IIOP_URL_VERSION,
            Some(version) if !version.starts_with('-') => {
                version_of(version).map_err(|reason| invalid(url, reason))?
            }
            _ => return Err(invalid(url, "unsupported scheme")),
        };

        let (host_port, key) = rest
            .split_once('/')
            .ok_or_else(|| invalid(url, "missing object key"))?;
        let (host, port) = host_and_port(host_port).map_err(|reason| invalid(url, reason))?;
        if host.is_empty() {
            return Err(invalid(url, "missing host"));
        }

        Ok(Self {
            version,
            host: host.to_string(),
            port: port.unwrap_or(DEFAULT_CORBALOC_PORT),
            key: percent_decode(key).map_err(|reason| invalid(url, reason))?,
        })
    }

    pub fn profile(&self) -> InternetIiopProfile {
        InternetIiopProfile::new(self.version, self.host.clone(), self.port, self.key.clone())
    }

    /// Reference with the URL's single profile; the type id is left empty.
    pub fn to_object_reference(&self) -> Result<ObjectReference> {
        ObjectReference::from_iiop("", &self.profile())
    }
}

impl FromStr for IiopUrl {
    type Err = OrbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn invalid(url: &str, reason: &str) -> OrbError {
    OrbError::InvalidIiopUrl(format!("{}: {}", reason, url))
}
