//! Network transport abstraction.
//!
//! The connection machine is sans-IO; the client drives it through this
//! trait. Keeping the seam here means the whole stack runs against a mock in
//! tests and against `embassy-net` (or any other UDP implementation) in
//! production, without either knowing about service types.

use crate::error::Result;
use crate::net::{IpEndpoint, Ipv4Addr};

/// Asynchronous datagram transport.
///
/// Implementations wrap a UDP-like socket: fire-and-forget sends, blocking
/// receives. Two instances back a session: one joined to the discovery
/// multicast group, one for unicast control and tunneling traffic.
#[allow(async_fn_in_trait)]
pub trait AsyncTransport {
    /// Bind to a local port (0 = any).
    ///
    /// Default implementation is a no-op for transports that bind lazily.
    fn bind(&mut self, _port: u16) -> Result<()> {
        Ok(())
    }

    /// Join an IPv4 multicast group so `recv_from` sees traffic sent to it.
    ///
    /// Default implementation is a no-op for transports that do not need
    /// explicit membership (and for the unicast socket).
    fn join_multicast(&mut self, _group: Ipv4Addr) -> Result<()> {
        Ok(())
    }

    /// Send `data` to `addr`.
    async fn send_to(&mut self, data: &[u8], addr: IpEndpoint) -> Result<()>;

    /// Receive a datagram into `buf`, returning the byte count and the
    /// source endpoint. Suspends until a datagram arrives.
    async fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, IpEndpoint)>;

    /// Whether the transport is ready for traffic.
    fn is_ready(&self) -> bool {
        true
    }

    /// Close the transport and release resources.
    fn close(&mut self) {}
}
