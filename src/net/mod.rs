//! Network types and the transport seam.
//!
//! `no_std`-friendly IPv4 address/endpoint types plus the [`AsyncTransport`]
//! abstraction the client drives its sockets through. A scripted
//! [`mock_transport::MockTransport`] backs the tests; the `embassy` feature
//! adds an `embassy-net` UDP adapter.

pub mod transport;

// Embassy adapter (only when the embassy feature is enabled)
#[cfg(feature = "embassy")]
pub mod embassy_adapter;

// Mock transport (only in tests or when std is available)
#[cfg(any(test, feature = "std"))]
pub mod mock_transport;

pub use transport::AsyncTransport;

use core::fmt;

/// IPv4 address.
///
/// A lightweight wrapper around four octets with conversions from the shapes
/// the protocol code produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ipv4Addr {
    octets: [u8; 4],
}

impl Ipv4Addr {
    /// The unspecified address (0.0.0.0), used for NAT-mode HPAIs.
    pub const UNSPECIFIED: Self = Self::new(0, 0, 0, 0);

    /// Create a new IPv4 address from individual octets.
    #[inline]
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self {
            octets: [a, b, c, d],
        }
    }

    /// The four octets of this address.
    #[inline]
    pub const fn octets(&self) -> [u8; 4] {
        self.octets
    }

    /// Whether this is 0.0.0.0.
    #[inline]
    pub const fn is_unspecified(&self) -> bool {
        matches!(self.octets, [0, 0, 0, 0])
    }
}

impl From<[u8; 4]> for Ipv4Addr {
    #[inline]
    fn from(octets: [u8; 4]) -> Self {
        Self { octets }
    }
}

impl From<Ipv4Addr> for [u8; 4] {
    #[inline]
    fn from(addr: Ipv4Addr) -> [u8; 4] {
        addr.octets
    }
}

impl fmt::Display for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.octets[0], self.octets[1], self.octets[2], self.octets[3]
        )
    }
}

impl core::str::FromStr for Ipv4Addr {
    type Err = crate::error::KnxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let mut octets = [0u8; 4];

        for octet in &mut octets {
            *octet = parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(crate::error::KnxError::malformed_address)?;
        }
        if parts.next().is_some() {
            return Err(crate::error::KnxError::malformed_address());
        }
        Ok(Self { octets })
    }
}

/// IP endpoint (address + port).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IpEndpoint {
    /// IP address
    pub addr: Ipv4Addr,
    /// Port number
    pub port: u16,
}

impl IpEndpoint {
    /// The unspecified endpoint (0.0.0.0:0).
    ///
    /// On the wire this tells the peer "reply to the datagram's real source";
    /// on receipt the stack substitutes the sender's endpoint for it.
    pub const UNSPECIFIED: Self = Self {
        addr: Ipv4Addr::UNSPECIFIED,
        port: 0,
    };

    /// Create a new endpoint.
    #[inline]
    pub const fn new(addr: Ipv4Addr, port: u16) -> Self {
        Self { addr, port }
    }

    /// Whether this is 0.0.0.0:0.
    #[inline]
    pub const fn is_unspecified(&self) -> bool {
        self.addr.is_unspecified() && self.port == 0
    }
}

impl Default for IpEndpoint {
    fn default() -> Self {
        Self::UNSPECIFIED
    }
}

impl From<([u8; 4], u16)> for IpEndpoint {
    #[inline]
    fn from((addr, port): ([u8; 4], u16)) -> Self {
        Self {
            addr: Ipv4Addr::from(addr),
            port,
        }
    }
}

impl fmt::Display for IpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}
