//! Async KNXnet/IP client.
//!
//! [`KnxClient`] drives the sans-IO [`TunnelMachine`] over two
//! [`AsyncTransport`] sockets: a discovery socket joined to the KNXnet/IP
//! multicast group and a unicast socket for control and tunneling traffic.
//! Every call runs the same single loop (flush pending transmits, wait for
//! a datagram on either socket or the machine's next timer, feed the result
//! back in) so all state mutation stays serialised in the caller's task.
//!
//! ```rust,ignore
//! let mut client = KnxClient::new(config, control, discovery)?;
//! client.connect().await?;
//! client.write(ga!(1/2/3), KnxValue::Switch(true)).await?;
//! let value = client.read(ga!(1/2/10)).await?;
//! client.disconnect().await?;
//! ```
//!
//! The client is single-owner: while a `read`/`write` call is waiting for
//! its completion, unrelated bus events are consumed and dropped. Subscribe
//! via [`KnxClient::next_event`] between calls when bus traffic matters.

use crate::addressing::{GroupAddress, IndividualAddress};
use crate::config::ClientConfig;
use crate::dpt::KnxValue;
use crate::error::{KnxError, Result};
use crate::knx_log;
use crate::net::{AsyncTransport, Ipv4Addr};
use crate::protocol::cemi::Apci;
use crate::protocol::constants::{
    KNXNETIP_DEFAULT_PORT, KNXNETIP_MULTICAST_ADDR, MAX_FRAME_SIZE,
};
use crate::protocol::datagram::Token;
use crate::tunnel::{
    AckOutcome, ConnectionState, Event, SocketRef, TunnelMachine, DISCONNECT_TIMEOUT_MS,
};
use embassy_futures::select::{select3, Either3};
use embassy_time::{with_timeout, Duration, Instant, Timer};

/// High-level bus event delivered by [`KnxClient::next_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KnxEvent {
    /// Tunnel established.
    Online,
    /// Tunnel lost or closed.
    Offline,
    /// A device wrote a group value.
    GroupWrite {
        source: IndividualAddress,
        dest: GroupAddress,
        payload: heapless::Vec<u8, 14>,
    },
    /// A device answered a group read.
    GroupResponse {
        source: IndividualAddress,
        dest: GroupAddress,
        payload: heapless::Vec<u8, 14>,
    },
    /// A device asked for a group value.
    GroupRead {
        source: IndividualAddress,
        dest: GroupAddress,
    },
    /// Any other APCI seen on a group address.
    Other {
        apci: Apci,
        source: IndividualAddress,
        dest: GroupAddress,
        payload: heapless::Vec<u8, 14>,
    },
}

/// Async client over two transports: `C` carries unicast control/tunneling
/// traffic, `D` is the multicast discovery socket.
pub struct KnxClient<C: AsyncTransport, D: AsyncTransport> {
    machine: TunnelMachine,
    control: C,
    discovery: D,
    request_timeout: Duration,
    two_level: bool,
    control_buf: [u8; MAX_FRAME_SIZE],
    discovery_buf: [u8; MAX_FRAME_SIZE],
}

impl<C: AsyncTransport, D: AsyncTransport> core::fmt::Debug for KnxClient<C, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KnxClient")
            .field("machine", &self.machine)
            .finish_non_exhaustive()
    }
}

impl<C: AsyncTransport, D: AsyncTransport> KnxClient<C, D> {
    /// Create a client: binds the control socket to an ephemeral port, binds
    /// the discovery socket to the KNXnet/IP port and joins the multicast
    /// group.
    pub fn new(config: ClientConfig, mut control: C, mut discovery: D) -> Result<Self> {
        control.bind(0)?;
        discovery.bind(KNXNETIP_DEFAULT_PORT)?;
        let [a, b, c, d] = KNXNETIP_MULTICAST_ADDR;
        discovery.join_multicast(Ipv4Addr::new(a, b, c, d))?;

        Ok(Self {
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            two_level: config.two_level_addressing,
            machine: TunnelMachine::new(config),
            control,
            discovery,
            control_buf: [0; MAX_FRAME_SIZE],
            discovery_buf: [0; MAX_FRAME_SIZE],
        })
    }

    /// Whether a tunnel is currently established.
    pub fn is_connected(&self) -> bool {
        self.machine.is_connected()
    }

    /// Connection machine state, for diagnostics.
    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    /// Parse a group address in this session's configured text form.
    pub fn parse_group_address(&self, text: &str) -> Result<GroupAddress> {
        GroupAddress::parse(text, self.two_level)
    }

    /// Format a group address in this session's configured text form.
    pub fn format_group_address(&self, addr: GroupAddress) -> heapless::String<16> {
        addr.format(self.two_level)
    }

    /// Establish the session: discovery (unless a remote endpoint is
    /// configured), then the connect handshake. Resolves when the tunnel is
    /// online.
    ///
    /// The machine keeps retrying failed attempts on its own schedule, so
    /// this suspends until it succeeds; wrap it in
    /// `embassy_time::with_timeout` to bound it.
    pub async fn connect(&mut self) -> Result<()> {
        self.machine.connect(now());
        while self.machine.state() != ConnectionState::Online {
            self.drive().await;
        }
        self.flush().await;
        Ok(())
    }

    /// Close the session: purge queued requests, send DISCONNECT_REQUEST and
    /// wait (bounded) for the gateway's response.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.machine.disconnect(now());
        self.flush().await;
        let wait = with_timeout(Duration::from_millis(DISCONNECT_TIMEOUT_MS), async {
            while self.machine.state() != ConnectionState::Idle {
                self.drive().await;
            }
        })
        .await;
        if wait.is_err() {
            knx_log!(warn, "disconnect response missing, session closed anyway");
        }
        self.flush().await;
        Ok(())
    }

    /// Write a typed value to a group address. Resolves once the gateway
    /// acknowledges the tunneling request with NO_ERROR.
    pub async fn write(&mut self, dest: GroupAddress, value: KnxValue) -> Result<()> {
        let payload = value.to_payload()?;
        let token = self.machine.write(dest, payload, now())?;
        self.finish_request(token).await
    }

    /// Write raw payload bytes with an explicit bit width, bypassing
    /// datapoint encoding.
    pub async fn write_raw(
        &mut self,
        dest: GroupAddress,
        data: &[u8],
        bit_length: usize,
    ) -> Result<()> {
        let token = self.machine.write_raw(dest, data, bit_length, now())?;
        self.finish_request(token).await
    }

    /// Answer a group read from the bus with a typed value.
    pub async fn respond(&mut self, dest: GroupAddress, value: KnxValue) -> Result<()> {
        let payload = value.to_payload()?;
        let token = self.machine.respond(dest, payload, now())?;
        self.finish_request(token).await
    }

    /// Read a group value: sends GroupValue_Read and resolves with the
    /// payload of the matching GroupValue_Response indication.
    pub async fn read(&mut self, dest: GroupAddress) -> Result<heapless::Vec<u8, 14>> {
        let token = self.machine.read(dest, now())?;
        self.flush().await;
        let timeout = self.request_timeout;
        with_timeout(timeout, self.read_completion(token, dest))
            .await
            .map_err(|_| KnxError::Timeout)?
    }

    /// Wait for the next bus event, driving the session (heartbeats, acks,
    /// inbound traffic) while idle.
    pub async fn next_event(&mut self) -> KnxEvent {
        loop {
            while let Some(event) = self.machine.poll_event() {
                if let Some(event) = map_event(event) {
                    return event;
                }
            }
            self.drive().await;
        }
    }

    async fn finish_request(&mut self, token: Token) -> Result<()> {
        self.flush().await;
        let timeout = self.request_timeout;
        with_timeout(timeout, self.ack_completion(token))
            .await
            .map_err(|_| KnxError::Timeout)?
    }

    async fn ack_completion(&mut self, token: Token) -> Result<()> {
        loop {
            while let Some(event) = self.machine.poll_event() {
                if let Event::Ack {
                    token: done,
                    outcome,
                } = event
                {
                    if done == token {
                        return ack_result(outcome);
                    }
                }
            }
            self.drive().await;
        }
    }

    async fn read_completion(
        &mut self,
        token: Token,
        dest: GroupAddress,
    ) -> Result<heapless::Vec<u8, 14>> {
        loop {
            while let Some(event) = self.machine.poll_event() {
                match event {
                    Event::Ack {
                        token: done,
                        outcome,
                    } if done == token => {
                        // A failed ack ends the read; a positive one keeps
                        // us waiting for the response indication.
                        ack_result(outcome)?;
                    }
                    Event::Group {
                        apci: Apci::GroupValueResponse,
                        dest: responded,
                        payload,
                        ..
                    } if responded == dest => {
                        return Ok(payload);
                    }
                    _ => {}
                }
            }
            self.drive().await;
        }
    }

    /// One scheduler step: flush, then wait for a datagram on either socket
    /// or the machine's next deadline, and feed the machine.
    async fn drive(&mut self) {
        self.flush().await;

        let deadline = self.machine.poll_at();
        let result = select3(
            self.control.recv_from(&mut self.control_buf),
            self.discovery.recv_from(&mut self.discovery_buf),
            wait_until(deadline),
        )
        .await;

        let now = now();
        match result {
            Either3::First(Ok((n, from))) => {
                self.machine
                    .handle_datagram(&self.control_buf[..n], from, now);
            }
            Either3::Second(Ok((n, from))) => {
                self.machine
                    .handle_datagram(&self.discovery_buf[..n], from, now);
            }
            Either3::First(Err(err)) | Either3::Second(Err(err)) => {
                // Socket errors are logged and absorbed; the machine's own
                // timers decide whether the session survives.
                knx_log!(warn, "socket receive failed: {:?}", err);
                self.machine.poll(now);
            }
            Either3::Third(()) => {
                self.machine.poll(now);
            }
        }
        self.flush().await;
    }

    async fn flush(&mut self) {
        while let Some(tx) = self.machine.poll_transmit() {
            let result = match tx.socket {
                SocketRef::Control => self.control.send_to(&tx.payload, tx.dest).await,
                SocketRef::Discovery => self.discovery.send_to(&tx.payload, tx.dest).await,
            };
            if let Err(err) = result {
                knx_log!(warn, "send failed: {:?}", err);
            }
        }
    }
}

fn now() -> u64 {
    Instant::now().as_millis()
}

async fn wait_until(deadline: Option<u64>) {
    match deadline {
        Some(at) => Timer::at(Instant::from_millis(at)).await,
        None => core::future::pending().await,
    }
}

fn ack_result(outcome: AckOutcome) -> Result<()> {
    match outcome {
        AckOutcome::Acked => Ok(()),
        AckOutcome::Refused(code) => {
            knx_log!(warn, "request refused with status {}", code);
            Err(KnxError::connection_refused())
        }
        AckOutcome::NoResponse => Err(KnxError::Timeout),
    }
}

fn map_event(event: Event) -> Option<KnxEvent> {
    match event {
        Event::Online => Some(KnxEvent::Online),
        Event::Offline => Some(KnxEvent::Offline),
        Event::Group {
            apci,
            source,
            dest,
            payload,
        } => Some(match apci {
            Apci::GroupValueWrite => KnxEvent::GroupWrite {
                source,
                dest,
                payload,
            },
            Apci::GroupValueResponse => KnxEvent::GroupResponse {
                source,
                dest,
                payload,
            },
            Apci::GroupValueRead => KnxEvent::GroupRead { source, dest },
            _ => KnxEvent::Other {
                apci,
                source,
                dest,
                payload,
            },
        }),
        // Ack completions belong to the call that issued the request.
        Event::Ack { .. } => None,
    }
}
