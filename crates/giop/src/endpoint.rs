//! Network endpoints

use std::fmt;

/// A host/port pair a connection can be opened to.
///
/// Used as the connection pool key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Endpoint from a port carried as an IDL `short`.
    ///
    /// Ports above 32767 travel as negative values; the bits are kept as is.
    pub fn from_signed_port(host: impl Into<String>, port: i16) -> Self {
        Self::new(host, port as u16)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
