//! Scripted transport for tests.
//!
//! Pre-program the datagrams `recv_from` should deliver, run the code under
//! test, then inspect what was sent. Everything resolves immediately, so the
//! futures can be driven with `embassy_futures::block_on`: no timers, no
//! executor setup.

use crate::error::{KnxError, Result};
use crate::net::transport::AsyncTransport;
use crate::net::{IpEndpoint, Ipv4Addr};

use std::collections::VecDeque;

/// Mock transport with scripted responses and a sent-packet log.
///
/// ```rust,ignore
/// let mut mock = MockTransport::new();
/// mock.add_response(connect_response_bytes.to_vec());
///
/// // ... drive the client against `mock` ...
///
/// assert_eq!(mock.sent_packets().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: VecDeque<(Vec<u8>, IpEndpoint)>,
    sent_packets: Vec<(Vec<u8>, IpEndpoint)>,
    joined_groups: Vec<Ipv4Addr>,
    ready: bool,
}

impl MockTransport {
    /// Default source endpoint reported for scripted responses.
    pub const DEFAULT_PEER: IpEndpoint = IpEndpoint {
        addr: Ipv4Addr::new(192, 168, 1, 10),
        port: 3671,
    };

    /// Create a ready mock transport.
    pub fn new() -> Self {
        Self {
            responses: VecDeque::new(),
            sent_packets: Vec::new(),
            joined_groups: Vec::new(),
            ready: true,
        }
    }

    /// Queue a response, reported as coming from [`Self::DEFAULT_PEER`].
    pub fn add_response(&mut self, data: Vec<u8>) {
        self.add_response_from(data, Self::DEFAULT_PEER);
    }

    /// Queue a response with an explicit source endpoint.
    pub fn add_response_from(&mut self, data: Vec<u8>, from: IpEndpoint) {
        self.responses.push_back((data, from));
    }

    /// Every packet sent so far, as `(data, destination)` pairs in order.
    pub fn sent_packets(&self) -> &[(Vec<u8>, IpEndpoint)] {
        &self.sent_packets
    }

    /// The most recently sent packet.
    pub fn last_sent(&self) -> Option<&(Vec<u8>, IpEndpoint)> {
        self.sent_packets.last()
    }

    /// Forget the sent-packet history.
    pub fn clear_sent(&mut self) {
        self.sent_packets.clear();
    }

    /// Number of responses still queued.
    pub fn pending_responses(&self) -> usize {
        self.responses.len()
    }

    /// Multicast groups joined through the trait.
    pub fn joined_groups(&self) -> &[Ipv4Addr] {
        &self.joined_groups
    }

    /// Simulate an unbound or failed socket.
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }
}

impl AsyncTransport for MockTransport {
    fn join_multicast(&mut self, group: Ipv4Addr) -> Result<()> {
        self.joined_groups.push(group);
        Ok(())
    }

    async fn send_to(&mut self, data: &[u8], addr: IpEndpoint) -> Result<()> {
        if !self.ready {
            return Err(KnxError::send_failed());
        }
        self.sent_packets.push((data.to_vec(), addr));
        Ok(())
    }

    async fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, IpEndpoint)> {
        match self.responses.pop_front() {
            Some((data, from)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok((len, from))
            }
            // Script exhausted: report it as a receive timeout.
            None => Err(KnxError::Timeout),
        }
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn close(&mut self) {
        self.ready = false;
        self.responses.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn send_and_receive() {
        block_on(async {
            let mut mock = MockTransport::new();
            mock.add_response(vec![0x01, 0x02, 0x03]);

            let dest = IpEndpoint::from(([192, 168, 1, 10], 3671));
            mock.send_to(&[0xAA, 0xBB], dest).await.unwrap();
            assert_eq!(mock.sent_packets().len(), 1);
            assert_eq!(mock.sent_packets()[0].0, vec![0xAA, 0xBB]);
            assert_eq!(mock.sent_packets()[0].1, dest);

            let mut buf = [0u8; 16];
            let (n, from) = mock.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], &[0x01, 0x02, 0x03]);
            assert_eq!(from, MockTransport::DEFAULT_PEER);
        });
    }

    #[test]
    fn exhausted_script_times_out() {
        block_on(async {
            let mut mock = MockTransport::new();
            let mut buf = [0u8; 16];
            assert_eq!(
                mock.recv_from(&mut buf).await.unwrap_err(),
                KnxError::Timeout
            );
        });
    }

    #[test]
    fn responses_are_fifo() {
        block_on(async {
            let mut mock = MockTransport::new();
            mock.add_response(vec![0x01]);
            mock.add_response(vec![0x02]);

            let mut buf = [0u8; 16];
            mock.recv_from(&mut buf).await.unwrap();
            assert_eq!(buf[0], 0x01);
            mock.recv_from(&mut buf).await.unwrap();
            assert_eq!(buf[0], 0x02);
            assert_eq!(mock.pending_responses(), 0);
        });
    }

    #[test]
    fn multicast_join_is_recorded() {
        let mut mock = MockTransport::new();
        mock.join_multicast(Ipv4Addr::new(224, 0, 23, 12)).unwrap();
        assert_eq!(mock.joined_groups(), &[Ipv4Addr::new(224, 0, 23, 12)]);
    }

    #[test]
    fn close_drops_readiness() {
        let mut mock = MockTransport::new();
        assert!(mock.is_ready());
        mock.close();
        assert!(!mock.is_ready());
    }
}
