//! `embassy-net` UDP adapter for [`AsyncTransport`].
//!
//! Wraps an `embassy_net::udp::UdpSocket` (plus its owning stack, needed for
//! multicast membership) so it can drive the client like any other transport.

use crate::error::{KnxError, Result};
use crate::knx_log;
use crate::net::transport::AsyncTransport;
use crate::net::{IpEndpoint, Ipv4Addr};
use embassy_net::{
    udp::{PacketMetadata, UdpSocket},
    IpAddress, IpEndpoint as EmbassyEndpoint, Stack,
};

/// Adapter implementing [`AsyncTransport`] over an embassy-net UDP socket.
///
/// ```rust,ignore
/// let mut transport = EmbassyUdpTransport::new(
///     stack,
///     &mut rx_meta, &mut rx_buffer,
///     &mut tx_meta, &mut tx_buffer,
/// );
/// transport.bind(0)?;
/// ```
pub struct EmbassyUdpTransport<'a> {
    stack: Stack<'a>,
    socket: UdpSocket<'a>,
}

impl core::fmt::Debug for EmbassyUdpTransport<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EmbassyUdpTransport").finish_non_exhaustive()
    }
}

impl<'a> EmbassyUdpTransport<'a> {
    /// Create an adapter from a stack and socket buffers.
    pub fn new(
        stack: Stack<'a>,
        rx_meta: &'a mut [PacketMetadata],
        rx_buffer: &'a mut [u8],
        tx_meta: &'a mut [PacketMetadata],
        tx_buffer: &'a mut [u8],
    ) -> Self {
        let socket = UdpSocket::new(stack, rx_meta, rx_buffer, tx_meta, tx_buffer);
        Self { stack, socket }
    }
}

impl AsyncTransport for EmbassyUdpTransport<'_> {
    fn bind(&mut self, port: u16) -> Result<()> {
        self.socket.bind(port).map_err(|_| KnxError::bind_failed())
    }

    fn join_multicast(&mut self, group: Ipv4Addr) -> Result<()> {
        let [a, b, c, d] = group.octets();
        self.stack
            .join_multicast_group(embassy_net::Ipv4Address::new(a, b, c, d))
            .map_err(|_| KnxError::multicast_join_failed())
    }

    async fn send_to(&mut self, data: &[u8], addr: IpEndpoint) -> Result<()> {
        self.socket
            .send_to(data, to_embassy(addr))
            .await
            .map_err(|_| KnxError::send_failed())
    }

    async fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, IpEndpoint)> {
        let (n, meta) = self
            .socket
            .recv_from(buf)
            .await
            .map_err(|_| KnxError::receive_failed())?;
        Ok((n, from_embassy(meta.endpoint)))
    }

    fn is_ready(&self) -> bool {
        self.socket.endpoint().port != 0
    }

    fn close(&mut self) {
        self.socket.close();
    }
}

impl Drop for EmbassyUdpTransport<'_> {
    fn drop(&mut self) {
        self.socket.close();
    }
}

#[inline]
fn to_embassy(endpoint: IpEndpoint) -> EmbassyEndpoint {
    let [a, b, c, d] = endpoint.addr.octets();
    EmbassyEndpoint::new(IpAddress::v4(a, b, c, d), endpoint.port)
}

#[inline]
fn from_embassy(endpoint: EmbassyEndpoint) -> IpEndpoint {
    match endpoint.addr {
        IpAddress::Ipv4(addr) => {
            let octets = addr.octets();
            IpEndpoint::new(
                Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]),
                endpoint.port,
            )
        }
        // KNXnet/IP is IPv4-only; anything else reads as unspecified and the
        // frame it carried will fail the codec.
        _ => {
            knx_log!(warn, "non-IPv4 datagram source ignored");
            IpEndpoint::UNSPECIFIED
        }
    }
}
