//! `corbaloc:` URLs
//!
//! ```text
//! corbaloc:iiop:1.2@host:2809,:backup/Some%20Key
//! ```
//!
//! Each address becomes one Internet-IOP profile sharing the object key.
//! Only the `iiop:` protocol (or its empty shorthand `:`) is supported.

use super::error::{OrbError, Result};
use super::ior::ObjectReference;
use super::profile::InternetIiopProfile;
use bytes::Bytes;
use giop::GiopVersion;
use std::str::FromStr;

pub(crate) const CORBALOC_SCHEME: &str = "corbaloc:";

/// Port assumed when an address omits one
pub const DEFAULT_CORBALOC_PORT: u16 = 2809;

const IIOP_PROTOCOL: &str = "iiop:";

/// One `iiop` address of a corbaloc URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorbalocAddress {
    pub version: GiopVersion,
    pub host: String,
    pub port: u16,
}

/// Parsed corbaloc URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corbaloc {
    pub addresses: Vec<CorbalocAddress>,
    /// Object key with `%HH` escapes decoded
    pub key: Bytes,
}

impl Corbaloc {
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix(CORBALOC_SCHEME)
            .ok_or_else(|| invalid(url, "missing corbaloc: scheme"))?;
        let (address_list, key) = rest
            .split_once('/')
            .ok_or_else(|| invalid(url, "missing object key"))?;

        let addresses = address_list
            .split(',')
            .map(|addr| parse_address(url, addr))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            addresses,
            key: unescape_key(url, key)?,
        })
    }

    /// Reference with one IIOP profile per address, in URL order.
    /// The type id is unknown and left empty.
    pub fn to_object_reference(&self) -> Result<ObjectReference> {
        let profiles = self
            .addresses
            .iter()
            .map(|addr| {
                InternetIiopProfile::new(addr.version, addr.host.clone(), addr.port, self.key.clone())
                    .encode()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ObjectReference::new("", profiles))
    }
}

impl FromStr for Corbaloc {
    type Err = OrbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn invalid(url: &str, reason: &str) -> OrbError {
    OrbError::InvalidCorbaloc(format!("{}: {}", reason, url))
}

fn parse_address(url: &str, addr: &str) -> Result<CorbalocAddress> {
    let body = addr
        .strip_prefix(IIOP_PROTOCOL)
        .or_else(|| addr.strip_prefix(':'))
        .ok_or_else(|| invalid(url, "unsupported address protocol"))?;

    let (version, host_port) = match body.split_once('@') {
        Some((version, host_port)) => (parse_version(url, version)?, host_port),
        None => (GiopVersion::V1_0, body),
    };

    let (host, port) = split_host_port(url, host_port)?;
    let host = if host.trim().is_empty() {
        "localhost".to_string()
    } else {
        host.to_string()
    };

    Ok(CorbalocAddress {
        version,
        host,
        port: port.unwrap_or(DEFAULT_CORBALOC_PORT),
    })
}

fn parse_version(url: &str, version: &str) -> Result<GiopVersion> {
    version_of(version).map_err(|reason| invalid(url, reason))
}

/// `major.minor`
pub(super) fn version_of(version: &str) -> std::result::Result<GiopVersion, &'static str> {
    let (major, minor) = version.split_once('.').ok_or("bad IIOP version")?;
    let major = major.parse().map_err(|_| "bad IIOP version")?;
    let minor = minor.parse().map_err(|_| "bad IIOP version")?;
    Ok(GiopVersion::new(major, minor))
}

fn split_host_port<'a>(url: &str, host_port: &'a str) -> Result<(&'a str, Option<u16>)> {
    host_and_port(host_port).map_err(|reason| invalid(url, reason))
}

/// Split `host[:port]`; an IPv6 host is written in brackets.
pub(super) fn host_and_port(
    host_port: &str,
) -> std::result::Result<(&str, Option<u16>), &'static str> {
    let (host, port) = if let Some(v6) = host_port.strip_prefix('[') {
        let (host, after) = v6.split_once(']').ok_or("unterminated IPv6 address")?;
        match after {
            "" => (host, None),
            _ => (host, Some(after.strip_prefix(':').ok_or("bad port")?)),
        }
    } else {
        match host_port.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (host_port, None),
        }
    };
    let port = port
        .map(|p| p.parse::<u16>().map_err(|_| "bad port"))
        .transpose()?;
    Ok((host, port))
}

fn unescape_key(url: &str, key: &str) -> Result<Bytes> {
    percent_decode(key).map_err(|reason| invalid(url, reason))
}

/// Object key with `%HH` escapes decoded
pub(super) fn percent_decode(key: &str) -> std::result::Result<Bytes, &'static str> {
    let raw = key.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            let hex = raw.get(i + 1..i + 3).ok_or("truncated key escape")?;
            let mut byte = [0u8; 1];
            hex::decode_to_slice(hex, &mut byte).map_err(|_| "bad key escape")?;
            out.push(byte[0]);
            i += 3;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::profile::profile_tag;
    use giop::Endpoint;

    #[test]
    fn test_defaults() {
        let loc = Corbaloc::parse("corbaloc::/NameService").unwrap();
        assert_eq!(
            loc.addresses,
            vec![CorbalocAddress {
                version: GiopVersion::V1_0,
                host: "localhost".to_string(),
                port: DEFAULT_CORBALOC_PORT,
            }]
        );
        assert_eq!(&loc.key[..], b"NameService");
    }

    #[test]
    fn test_multiple_addresses() {
        let loc: Corbaloc = "corbaloc:iiop:1.2@primary:1050,:backup,iiop:[::1]:1051/a%2Fb%00"
            .parse()
            .unwrap();
        assert_eq!(loc.addresses.len(), 3);
        assert_eq!(loc.addresses[0].version, GiopVersion::V1_2);
        assert_eq!(loc.addresses[0].host, "primary");
        assert_eq!(loc.addresses[0].port, 1050);
        assert_eq!(loc.addresses[1].host, "backup");
        assert_eq!(loc.addresses[1].port, 2809);
        assert_eq!(loc.addresses[2].host, "::1");
        assert_eq!(loc.addresses[2].port, 1051);
        assert_eq!(&loc.key[..], b"a/b\0");
    }

    #[test]
    fn test_object_reference() {
        let reference =
            ObjectReference::parse("corbaloc:iiop:1.1@primary:1050,:backup:1051/key").unwrap();
        assert_eq!(reference.type_id(), "");
        assert_eq!(reference.profiles_of_tag(profile_tag::INTERNET_IOP).count(), 2);

        let profiles = reference.iiop_profiles().unwrap();
        assert_eq!(profiles[0].endpoint(), Endpoint::new("primary", 1050));
        assert_eq!(profiles[0].version, GiopVersion::V1_1);
        assert_eq!(profiles[1].endpoint(), Endpoint::new("backup", 1051));
        assert_eq!(profiles[1].version, GiopVersion::V1_0);
        assert!(profiles.iter().all(|p| &p.object_key[..] == b"key"));
    }

    #[test]
    fn test_rejected_urls() {
        for bad in [
            "corbaname::host/key",
            "corbaloc::host",
            "corbaloc:rir:/NameService",
            "corbaloc:iiop:1@host/key",
            "corbaloc:iiop:x.y@host/key",
            "corbaloc::host:99999/key",
            "corbaloc::host:port/key",
            "corbaloc::[::1/key",
            "corbaloc::host/bad%4",
            "corbaloc::host/bad%zz",
        ] {
            assert!(
                matches!(Corbaloc::parse(bad), Err(OrbError::InvalidCorbaloc(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }
}
