//! Client configuration.

use crate::addressing::IndividualAddress;
use crate::net::IpEndpoint;

/// Configuration for a KNXnet/IP client session.
///
/// `Default` gives the values a stock installation expects; the `with_*`
/// methods adjust individual options.
///
/// ```
/// use knx_link::ClientConfig;
///
/// let config = ClientConfig::default()
///     .with_remote_endpoint(([192, 168, 1, 10], 3671).into())
///     .with_two_level_addressing(true);
/// assert!(config.suppress_ack_ldatareq);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClientConfig {
    /// Gateway endpoint. When set, discovery is skipped and the session
    /// connects here directly.
    pub remote_endpoint: Option<IpEndpoint>,
    /// Discovery filter: only gateways advertising this physical address are
    /// accepted. `None` accepts any responder.
    pub phys_server_addr: Option<IndividualAddress>,
    /// Source physical address stamped into outbound cEMI frames.
    pub phys_addr: IndividualAddress,
    /// Parse and format group addresses in 2-level (`main/sub`) form.
    pub two_level_addressing: bool,
    /// When false, outbound L_Data.req asks the bus for a link-layer ack
    /// (ctrl1.acknowledge = 1).
    pub suppress_ack_ldatareq: bool,
    /// When false, outbound group operations go out as ROUTING_INDICATION to
    /// the multicast group instead of acknowledged tunneling requests.
    pub use_tunneling: bool,
    /// Per-request completion timeout for the client API, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            remote_endpoint: None,
            phys_server_addr: Some(IndividualAddress::from(0x11DC)), // 1.1.220
            phys_addr: IndividualAddress::from(0xFF0F),              // 15.15.15
            two_level_addressing: false,
            suppress_ack_ldatareq: true,
            use_tunneling: true,
            request_timeout_ms: 5_000,
        }
    }
}

impl ClientConfig {
    /// Set the gateway endpoint, skipping discovery.
    pub fn with_remote_endpoint(mut self, endpoint: IpEndpoint) -> Self {
        self.remote_endpoint = Some(endpoint);
        self
    }

    /// Set or clear the discovery filter.
    pub fn with_phys_server_addr(mut self, addr: Option<IndividualAddress>) -> Self {
        self.phys_server_addr = addr;
        self
    }

    /// Set the source physical address.
    pub fn with_phys_addr(mut self, addr: IndividualAddress) -> Self {
        self.phys_addr = addr;
        self
    }

    /// Select 2-level group address text form.
    pub fn with_two_level_addressing(mut self, two_level: bool) -> Self {
        self.two_level_addressing = two_level;
        self
    }

    /// Control the L_Data.req acknowledge-request bit.
    pub fn with_suppress_ack_ldatareq(mut self, suppress: bool) -> Self {
        self.suppress_ack_ldatareq = suppress;
        self
    }

    /// Select tunneling (true) or routing (false) for outbound operations.
    pub fn with_use_tunneling(mut self, tunneling: bool) -> Self {
        self.use_tunneling = tunneling;
        self
    }

    /// Set the per-request completion timeout.
    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::default();
        assert_eq!(config.remote_endpoint, None);
        assert_eq!(
            config.phys_server_addr,
            Some(IndividualAddress::new(1, 1, 220).unwrap())
        );
        assert_eq!(config.phys_addr, IndividualAddress::new(15, 15, 15).unwrap());
        assert!(!config.two_level_addressing);
        assert!(config.suppress_ack_ldatareq);
        assert!(config.use_tunneling);
        assert_eq!(config.request_timeout_ms, 5_000);
    }

    #[test]
    fn builder_methods() {
        let config = ClientConfig::default()
            .with_remote_endpoint(([10, 0, 0, 2], 3671).into())
            .with_phys_server_addr(None)
            .with_use_tunneling(false)
            .with_request_timeout_ms(1_000);
        assert!(config.remote_endpoint.is_some());
        assert!(config.phys_server_addr.is_none());
        assert!(!config.use_tunneling);
        assert_eq!(config.request_timeout_ms, 1_000);
    }
}
