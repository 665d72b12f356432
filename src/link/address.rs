//! # Link Addresses
//!
//! Parses MAVLink connection strings:
//!
//! - `udpin:HOST:PORT`: bind locally, reply to whoever sends first
//! - `udpout:HOST:PORT`: send to a fixed remote endpoint
//! - `udp:HOST:PORT`: same as `udpin`

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use crate::error::{MavvizError, Result};

/// Parsed connection string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAddress {
    /// Bind to this local address and learn the peer from the first datagram
    Listen(SocketAddr),

    /// Send to this remote address from an ephemeral local port
    Connect(SocketAddr),
}

impl LinkAddress {
    /// Socket address named in the connection string.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        match self {
            LinkAddress::Listen(addr) | LinkAddress::Connect(addr) => *addr,
        }
    }
}

impl FromStr for LinkAddress {
    type Err = MavvizError;

    fn from_str(s: &str) -> Result<Self> {
        let (scheme, rest) = s
            .split_once(':')
            .ok_or_else(|| MavvizError::InvalidAddress(format!("'{}' has no scheme", s)))?;

        let addr = rest
            .to_socket_addrs()
            .map_err(|e| MavvizError::InvalidAddress(format!("'{}': {}", s, e)))?
            .next()
            .ok_or_else(|| MavvizError::InvalidAddress(format!("'{}' resolves to nothing", s)))?;

        match scheme {
            "udp" | "udpin" => Ok(LinkAddress::Listen(addr)),
            "udpout" => Ok(LinkAddress::Connect(addr)),
            other => Err(MavvizError::InvalidAddress(format!(
                "unsupported scheme '{}' in '{}' (expected udp, udpin or udpout)",
                other, s
            ))),
        }
    }
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkAddress::Listen(addr) => write!(f, "udpin:{}", addr),
            LinkAddress::Connect(addr) => write!(f, "udpout:{}", addr),
        }
    }
}
