//! # Address Parsing and Canonicalization
//!
//! A small value type shared by every component that needs to name a TCP
//! endpoint: the load balancer's own bind address, the set of broker
//! addresses it probes, and the `sender_addr`/`receiver_addr` fields carried
//! on the wire by every [`crate::message::Message`].

use std::fmt;
use std::net::{AddrParseError, IpAddr, Ipv4Addr};
use std::str::FromStr;

/// An IPv4/IPv6 host plus a TCP port.
///
/// Equality and hashing are over `(host, port)` only. The canonical string
/// form is `host:port`; `localhost` is normalized to `127.0.0.1` at parse
/// time so that two clients that spell the loopback address differently
/// still compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    host: IpAddr,
    port: u16,
}

impl Address {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self { host, port }
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The canonical `host:port` string used on the wire and in snapshot
    /// file names.
    pub fn connection_str(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// A filesystem-safe rendering of the canonical string, used for
    /// snapshot file names (`:` is not portable on all filesystems).
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.host, self.port)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Errors produced while parsing a `host:port` string into an [`Address`].
#[derive(Debug)]
pub enum AddressParseError {
    MissingPort,
    InvalidHost(AddrParseError),
    InvalidPort(std::num::ParseIntError),
}

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressParseError::MissingPort => write!(f, "address is missing a ':port' suffix"),
            AddressParseError::InvalidHost(e) => write!(f, "invalid host: {e}"),
            AddressParseError::InvalidPort(e) => write!(f, "invalid port: {e}"),
        }
    }
}

impl std::error::Error for AddressParseError {}

impl FromStr for Address {
    type Err = AddressParseError;

    /// Parses `"host:port"`. `localhost` normalizes to `127.0.0.1`, matching
    /// the source's `AddressFactory.from_str`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host_part, port_part) = s
            .rsplit_once(':')
            .ok_or(AddressParseError::MissingPort)?;

        let host_part = host_part.trim_start_matches('[').trim_end_matches(']');
        let host_part = if host_part == "localhost" {
            "127.0.0.1"
        } else {
            host_part
        };

        let host: IpAddr = host_part
            .parse()
            .map_err(AddressParseError::InvalidHost)?;
        let port: u16 = port_part
            .parse()
            .map_err(AddressParseError::InvalidPort)?;

        Ok(Address::new(host, port))
    }
}

impl Address {
    /// Builds an address from separate host/port parts, applying the same
    /// `localhost` normalization as [`Address::from_str`]. Used by CLI flags
    /// that take `--host`/`--port` separately.
    pub fn from_parts(host: &str, port: u16) -> Result<Self, AddressParseError> {
        let host = if host == "localhost" { "127.0.0.1" } else { host };
        let host: IpAddr = host.parse().map_err(AddressParseError::InvalidHost)?;
        Ok(Address::new(host, port))
    }
}

impl Default for Address {
    fn default() -> Self {
        Address::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_port() {
        let addr: Address = "127.0.0.1:9091".parse().unwrap();
        assert_eq!(addr.host(), IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
        assert_eq!(addr.port(), 9091);
        assert_eq!(addr.connection_str(), "127.0.0.1:9091");
    }

    #[test]
    fn normalizes_localhost() {
        let addr: Address = "localhost:9090".parse().unwrap();
        assert_eq!(addr, "127.0.0.1:9090".parse().unwrap());
    }

    #[test]
    fn equality_ignores_string_form() {
        let a: Address = "localhost:80".parse().unwrap();
        let b = Address::from_parts("127.0.0.1", 80).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_missing_port() {
        assert!("127.0.0.1".parse::<Address>().is_err());
    }

    #[test]
    fn parses_ipv6() {
        let addr: Address = "[::1]:9090".parse().unwrap();
        assert_eq!(addr.port(), 9090);
    }
}
