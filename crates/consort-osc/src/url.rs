//! `osc.udp://host:port/path` style addresses.

use crate::{OscError, Result};
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Udp,
    Tcp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Udp => "udp",
            Protocol::Tcp => "tcp",
        }
    }
}

/// Where a peer listens, plus the path prefix its methods live under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OscUrl {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    /// Empty or starting with '/', never ending with '/'.
    pub path: String,
}

impl OscUrl {
    pub fn new(protocol: Protocol, host: impl Into<String>, port: u16, path: &str) -> Self {
        Self {
            protocol,
            host: host.into(),
            port,
            path: normalize_path(path),
        }
    }

    pub fn parse(url: &str) -> Result<Self> {
        let invalid = || OscError::InvalidUrl(url.to_string());
        let (scheme, rest) = url.split_once("://").ok_or_else(invalid)?;
        let protocol = match scheme {
            "osc.udp" => Protocol::Udp,
            "osc.tcp" => Protocol::Tcp,
            _ => return Err(invalid()),
        };
        let (authority, path) = match rest.find('/') {
            Some(i) => rest.split_at(i),
            None => (rest, ""),
        };
        let (host, port) = authority.rsplit_once(':').ok_or_else(invalid)?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self::new(protocol, host, port, path))
    }

    /// The same peer with `suffix` appended to the path.
    pub fn join(&self, suffix: &str) -> Self {
        let mut joined = self.clone();
        joined.path = normalize_path(&format!("{}/{}", self.path, suffix.trim_start_matches('/')));
        joined
    }

    /// Full OSC path for `method` under this URL's prefix.
    pub fn method_path(&self, method: &str) -> String {
        format!("{}/{}", self.path, method)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| OscError::InvalidUrl(self.to_string()))
    }
}

impl fmt::Display for OscUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "osc.{}://[{}]:{}{}", self.protocol.as_str(), self.host, self.port, self.path)
        } else {
            write!(f, "osc.{}://{}:{}{}", self.protocol.as_str(), self.host, self.port, self.path)
        }
    }
}

impl FromStr for OscUrl {
    type Err = OscError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
