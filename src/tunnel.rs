//! Tunnel connection state machine.
//!
//! [`TunnelMachine`] owns the whole session lifecycle: gateway discovery,
//! connection establishment, heartbeat, paced tunneling with bounded
//! retransmission, sequence tracking, and disconnection. It performs no I/O
//! and reads no clock. Instead it is fed three kinds of input:
//!
//! - [`TunnelMachine::handle_datagram`] for bytes received on either socket,
//! - API commands (`connect`, `disconnect`, `read`, `write`, ...),
//! - [`TunnelMachine::poll`] with the current time in milliseconds,
//!
//! and produces its effects through two drain queues:
//! [`TunnelMachine::poll_transmit`] yields byte buffers to put on the wire
//! and [`TunnelMachine::poll_event`] yields user-observable events.
//! [`TunnelMachine::poll_at`] names the next instant `poll` needs to run.
//!
//! This shape keeps every state transition synchronous and single-threaded
//! regardless of which runtime drives the sockets, and lets the whole
//! lifecycle run under test with scripted datagrams and a manual clock.
//!
//! ```text
//! idle ──connect──► searching ──response──► connecting ──ok──► online ◄──┐
//!  ▲ ▲                 │timeout                │refused          │       │50ms
//!  │ └─────2s──────────┘                       ▼            request      │
//!  │                                          idle              ▼        │
//!  └───────────── disconnecting ◄──retries── awaiting ack ──► pacing ────┘
//! ```

use crate::addressing::{GroupAddress, IndividualAddress};
use crate::config::ClientConfig;
use crate::error::{KnxError, Result};
use crate::knx_log;
use crate::protocol::cemi::{Apci, ApduPayload, CemiFrame};
use crate::protocol::constants::{
    MessageCode, E_NO_ERROR, E_NO_MORE_CONNECTIONS, KNXNETIP_DEFAULT_PORT,
    KNXNETIP_MULTICAST_ADDR, MAX_FRAME_SIZE,
};
use crate::protocol::datagram::{Datagram, DatagramBuilder, GroupRequest, Token};
use crate::net::IpEndpoint;
use heapless::{Deque, Vec};

/// Delay before an idle session retries the search, in ms.
pub const IDLE_RETRY_MS: u64 = 2_000;
/// Discovery timeout, in ms.
pub const SEARCH_TIMEOUT_MS: u64 = 15_000;
/// Connection establishment timeout, in ms.
pub const CONNECT_TIMEOUT_MS: u64 = 15_000;
/// Heartbeat period while online, in ms.
pub const HEARTBEAT_INTERVAL_MS: u64 = 45_000;
/// Timeout for a single heartbeat response, in ms.
pub const HEARTBEAT_TIMEOUT_MS: u64 = 10_000;
/// Timeout for a tunneling ack, in ms.
pub const ACK_TIMEOUT_MS: u64 = 1_000;
/// Minimum interval between tunneling requests, in ms.
pub const PACING_DELAY_MS: u64 = 50;
/// Timeout for the disconnect handshake, in ms.
pub const DISCONNECT_TIMEOUT_MS: u64 = 10_000;
/// Heartbeat failures tolerated before the session is torn down.
pub const MAX_HEARTBEAT_FAILURES: u8 = 3;

/// Send attempts per tunneling request (initial send + one retransmission).
const MAX_SEND_ATTEMPTS: u8 = 2;
const DEFERRED_CAPACITY: usize = 8;

/// Which socket a transmit goes out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SocketRef {
    /// The multicast discovery socket.
    Discovery,
    /// The unicast control/data socket.
    Control,
}

/// An outbound datagram the driver must put on the wire.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transmit {
    /// Socket to send on
    pub socket: SocketRef,
    /// Destination endpoint
    pub dest: IpEndpoint,
    /// Encoded frame
    pub payload: Vec<u8, MAX_FRAME_SIZE>,
}

/// Final result of an outbound group operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AckOutcome {
    /// Positive acknowledgement (NO_ERROR).
    Acked,
    /// The gateway acknowledged with the given error status.
    Refused(u8),
    /// No acknowledgement arrived within the retry budget, or the request
    /// was purged before it could be sent.
    NoResponse,
}

/// User-observable events emitted by the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Tunnel established; the session can carry group operations.
    Online,
    /// Session returned to idle.
    Offline,
    /// Completion of the outbound request with the given token.
    Ack {
        /// Correlation token from the originating request
        token: Token,
        /// Result
        outcome: AckOutcome,
    },
    /// Inbound group traffic (L_Data.ind).
    Group {
        /// Application control code
        apci: Apci,
        /// Sending device
        source: IndividualAddress,
        /// Destination group address
        dest: GroupAddress,
        /// APDU payload bytes
        payload: Vec<u8, 14>,
    },
}

/// Public view of the machine's state, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    Idle,
    Searching,
    Connecting,
    Online,
    AwaitingAck,
    AwaitingHeartbeat,
    Pacing,
    Disconnecting,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Idle { retry_at: Option<u64> },
    Searching { deadline: u64 },
    Connecting { deadline: u64 },
    Online,
    AwaitingAck { token: Token, attempts: u8, deadline: u64 },
    AwaitingHeartbeat { deadline: u64 },
    Pacing { deadline: u64 },
    Disconnecting { deadline: u64 },
}

/// The tunnel connection state machine.
pub struct TunnelMachine {
    config: ClientConfig,
    builder: DatagramBuilder,
    state: State,
    /// Gateway control endpoint, learned from discovery or configured.
    remote: Option<IpEndpoint>,
    /// Channel id assigned by the gateway; `None` until CONNECT_RESPONSE.
    channel_id: Option<u8>,
    seq_out: u8,
    seq_in: u8,
    heartbeat_failures: u8,
    /// Next scheduled heartbeat, while a channel is up.
    heartbeat_at: Option<u64>,
    /// Whether the session should (re)establish itself from idle.
    reconnect: bool,
    /// Requests queued while the machine cannot dispatch, replayed FIFO.
    deferred: Deque<GroupRequest, DEFERRED_CAPACITY>,
    transmits: Deque<Transmit, 8>,
    events: Deque<Event, 16>,
    /// Encoded in-flight tunneling request, kept for retransmission.
    pending_tx: Vec<u8, MAX_FRAME_SIZE>,
}

impl core::fmt::Debug for TunnelMachine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TunnelMachine")
            .field("state", &self.state)
            .field("channel_id", &self.channel_id)
            .field("seq_out", &self.seq_out)
            .field("seq_in", &self.seq_in)
            .finish_non_exhaustive()
    }
}

impl TunnelMachine {
    /// Create a machine for the given configuration.
    pub fn new(config: ClientConfig) -> Self {
        let builder = DatagramBuilder::new(config.phys_addr, config.suppress_ack_ldatareq);
        Self {
            remote: config.remote_endpoint,
            config,
            builder,
            state: State::Idle { retry_at: None },
            channel_id: None,
            seq_out: 0,
            seq_in: 0,
            heartbeat_failures: 0,
            heartbeat_at: None,
            reconnect: false,
            deferred: Deque::new(),
            transmits: Deque::new(),
            events: Deque::new(),
            pending_tx: Vec::new(),
        }
    }

    /// Current state, for diagnostics and tests.
    pub const fn state(&self) -> ConnectionState {
        match self.state {
            State::Idle { .. } => ConnectionState::Idle,
            State::Searching { .. } => ConnectionState::Searching,
            State::Connecting { .. } => ConnectionState::Connecting,
            State::Online => ConnectionState::Online,
            State::AwaitingAck { .. } => ConnectionState::AwaitingAck,
            State::AwaitingHeartbeat { .. } => ConnectionState::AwaitingHeartbeat,
            State::Pacing { .. } => ConnectionState::Pacing,
            State::Disconnecting { .. } => ConnectionState::Disconnecting,
        }
    }

    /// Channel id of the established tunnel, if any.
    pub const fn channel_id(&self) -> Option<u8> {
        self.channel_id
    }

    /// Whether a tunnel is established (a channel id is held).
    pub const fn is_connected(&self) -> bool {
        self.channel_id.is_some()
    }

    /// Gateway endpoint in use, learned or configured.
    pub const fn remote_endpoint(&self) -> Option<IpEndpoint> {
        self.remote
    }

    /// Expected sequence number of the next inbound tunneling request.
    pub const fn inbound_seq(&self) -> u8 {
        self.seq_in
    }

    /// Sequence number the next outbound tunneling request will carry.
    pub const fn outbound_seq(&self) -> u8 {
        self.seq_out
    }

    // ------------------------------------------------------------------
    // API inputs
    // ------------------------------------------------------------------

    /// Begin establishing the session. From idle this starts discovery (or
    /// connects directly when a remote endpoint is configured); the session
    /// then re-establishes itself after failures until
    /// [`TunnelMachine::disconnect`] is called.
    pub fn connect(&mut self, now: u64) {
        self.reconnect = true;
        if matches!(self.state, State::Idle { .. }) {
            self.start_search(now);
        }
    }

    /// Tear the session down: purge queued requests, send
    /// DISCONNECT_REQUEST, stop reconnecting.
    pub fn disconnect(&mut self, now: u64) {
        self.reconnect = false;
        if matches!(self.state, State::Idle { .. }) {
            self.state = State::Idle { retry_at: None };
            self.purge_deferred();
        } else {
            self.enter_disconnecting(now);
        }
    }

    /// Queue a GroupValue_Read for `dest`.
    ///
    /// The returned token keys the [`Event::Ack`] completion; the response
    /// value itself arrives as an [`Event::Group`] with APCI
    /// GroupValue_Response for the same address.
    pub fn read(&mut self, dest: GroupAddress, now: u64) -> Result<Token> {
        let req = self.builder.read_request(dest);
        self.submit(req, now)
    }

    /// Queue a GroupValue_Write carrying an encoded payload.
    pub fn write(&mut self, dest: GroupAddress, payload: ApduPayload, now: u64) -> Result<Token> {
        let req = self.builder.write_request(dest, payload);
        self.submit(req, now)
    }

    /// Queue a GroupValue_Response (answering a read from the bus).
    pub fn respond(
        &mut self,
        dest: GroupAddress,
        payload: ApduPayload,
        now: u64,
    ) -> Result<Token> {
        let req = self.builder.respond_request(dest, payload);
        self.submit(req, now)
    }

    /// Queue a GroupValue_Write from raw bytes and a bit width, bypassing
    /// datapoint encoding.
    pub fn write_raw(
        &mut self,
        dest: GroupAddress,
        data: &[u8],
        bit_length: usize,
        now: u64,
    ) -> Result<Token> {
        let req = self.builder.write_raw_request(dest, data, bit_length)?;
        self.submit(req, now)
    }

    fn submit(&mut self, req: GroupRequest, now: u64) -> Result<Token> {
        let token = req.token;
        if matches!(self.state, State::Online) {
            self.dispatch(req, now);
        } else {
            // Deferred until the machine re-enters online; replayed FIFO.
            self.deferred
                .push_back(req)
                .map_err(|_| KnxError::queue_full())?;
        }
        Ok(token)
    }

    // ------------------------------------------------------------------
    // Inbound datagrams
    // ------------------------------------------------------------------

    /// Feed a received datagram into the machine.
    ///
    /// Malformed datagrams are logged and dropped; they never fail the
    /// session. `source` is the UDP sender, substituted into any NAT-mode
    /// HPAI the frame carries.
    pub fn handle_datagram(&mut self, data: &[u8], source: IpEndpoint, now: u64) {
        let mut dg = match Datagram::decode(data) {
            Ok(dg) => dg,
            Err(err) => {
                knx_log!(warn, "dropping malformed datagram: {:?}", err);
                return;
            }
        };
        dg.substitute_source(source);

        // A wrong channel id means the frame belongs to someone else's
        // session: drop it without any reaction. CONNECT_RESPONSE is exempt
        // since it is the message that assigns our channel id.
        if let Some(channel) = dg.channel_id() {
            let assigning = matches!(dg, Datagram::ConnectResponse { .. });
            if !assigning && self.channel_id != Some(channel) {
                return;
            }
        }

        match dg {
            Datagram::SearchResponse { endpoint, device } => {
                if !matches!(self.state, State::Searching { .. }) {
                    return;
                }
                if let Some(filter) = self.config.phys_server_addr {
                    if device.address != filter {
                        knx_log!(
                            debug,
                            "ignoring gateway {:?} (filter {:?})",
                            device.address,
                            filter
                        );
                        return;
                    }
                }
                knx_log!(info, "gateway found at {:?}", endpoint.endpoint);
                self.remote = Some(endpoint.endpoint);
                self.enter_connecting(now);
            }
            Datagram::ConnectResponse { state, .. } => {
                if !matches!(self.state, State::Connecting { .. }) {
                    return;
                }
                if state.is_ok() {
                    self.channel_id = Some(state.channel_id);
                    self.seq_out = 0;
                    self.seq_in = 0;
                    self.heartbeat_failures = 0;
                    self.heartbeat_at = Some(now + HEARTBEAT_INTERVAL_MS);
                    knx_log!(info, "tunnel established, channel {}", state.channel_id);
                    self.push_event(Event::Online);
                    self.enter_online(now);
                } else if state.status == E_NO_MORE_CONNECTIONS {
                    knx_log!(warn, "gateway has no more free tunnel connections");
                    self.enter_idle(now);
                } else {
                    knx_log!(warn, "connect refused, status {}", state.status);
                    self.enter_idle(now);
                }
            }
            Datagram::TunnelingAck { tunnel } => {
                let State::AwaitingAck {
                    token, attempts, ..
                } = self.state
                else {
                    return;
                };
                if tunnel.seq != self.seq_out {
                    // Stale ack; the pending request keeps its timer.
                    return;
                }
                if tunnel.is_ok() {
                    self.seq_out = self.seq_out.wrapping_add(1);
                    self.pending_tx.clear();
                    self.push_event(Event::Ack {
                        token,
                        outcome: AckOutcome::Acked,
                    });
                    self.enter_pacing(now);
                } else {
                    knx_log!(warn, "tunneling ack carried status {}", tunnel.status);
                    self.outbound_failure(token, attempts, Some(tunnel.status), now);
                }
            }
            Datagram::TunnelingRequest { tunnel, cemi } => {
                if matches!(
                    self.state,
                    State::Online
                        | State::AwaitingAck { .. }
                        | State::AwaitingHeartbeat { .. }
                        | State::Pacing { .. }
                ) {
                    self.handle_inbound_ldata(tunnel.seq, &cemi, now);
                }
            }
            Datagram::ConnectionstateResponse { state, .. } => {
                if !matches!(self.state, State::AwaitingHeartbeat { .. }) {
                    return;
                }
                if state.is_ok() {
                    self.heartbeat_failures = 0;
                    self.enter_pacing(now);
                } else {
                    knx_log!(warn, "heartbeat answered with status {}", state.status);
                    self.heartbeat_failure(now);
                }
            }
            Datagram::DisconnectRequest { .. } => {
                if let Some(channel) = self.channel_id {
                    let response = Datagram::disconnect_response(channel);
                    self.send_control(&response);
                    self.enter_idle(now);
                }
            }
            Datagram::DisconnectResponse { .. } => {
                if matches!(self.state, State::Disconnecting { .. }) {
                    self.enter_idle(now);
                }
            }
            Datagram::RoutingIndication { cemi } => {
                // Unsequenced multicast traffic: surface the group event as-is.
                self.emit_group_event(&cemi);
            }
            Datagram::SearchRequest { .. }
            | Datagram::ConnectRequest { .. }
            | Datagram::ConnectionstateRequest { .. } => {
                // Peer-role traffic; a client has nothing to do with it.
            }
        }
    }

    /// Inbound L_Data over the tunnel: ack within the window, deliver on
    /// exact match, drop silently otherwise.
    fn handle_inbound_ldata(&mut self, seq: u8, cemi: &CemiFrame, now: u64) {
        let Some(channel) = self.channel_id else {
            return;
        };
        if !matches!(
            cemi.msg_code,
            MessageCode::LDataInd | MessageCode::LDataCon
        ) {
            return;
        }

        if seq == self.seq_in {
            let ack = Datagram::tunneling_ack(channel, seq, E_NO_ERROR);
            self.send_control(&ack);
            self.seq_in = self.seq_in.wrapping_add(1);
            if cemi.msg_code == MessageCode::LDataInd {
                self.emit_group_event(cemi);
            }
            self.after_inbound(now);
        } else if seq == self.seq_in.wrapping_sub(1) {
            // Duplicate of the previous frame: our ack was lost. Ack again
            // but do not re-deliver the payload.
            let ack = Datagram::tunneling_ack(channel, seq, E_NO_ERROR);
            self.send_control(&ack);
            self.after_inbound(now);
        } else {
            knx_log!(
                warn,
                "inbound seq {} outside window (expected {})",
                seq,
                self.seq_in
            );
        }
    }

    fn after_inbound(&mut self, now: u64) {
        match self.state {
            // From the steady state the inbound handling paces like any
            // other bus interaction; a pacing window in progress restarts.
            State::Online | State::Pacing { .. } => self.enter_pacing(now),
            // While waiting for an ack or a heartbeat response, inbound
            // delivery continues without disturbing the pending exchange.
            _ => {}
        }
    }

    fn emit_group_event(&mut self, cemi: &CemiFrame) {
        let Some(dest) = cemi.dest_group() else {
            return;
        };
        let Some(apdu) = &cemi.apdu else {
            return;
        };
        let Ok(payload) = Vec::from_slice(apdu.payload.as_slice()) else {
            return;
        };
        self.push_event(Event::Group {
            apci: apdu.apci,
            source: cemi.source,
            dest,
            payload,
        });
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// Drive time-based transitions. Call whenever the instant returned by
    /// [`TunnelMachine::poll_at`] is reached.
    pub fn poll(&mut self, now: u64) {
        match self.state {
            State::Idle { retry_at: Some(at) } if now >= at && self.reconnect => {
                self.start_search(now);
            }
            State::Searching { deadline } if now >= deadline => {
                knx_log!(warn, "gateway search timed out");
                self.enter_idle(now);
            }
            State::Connecting { deadline } if now >= deadline => {
                knx_log!(warn, "connect timed out");
                self.enter_disconnecting(now);
            }
            State::AwaitingAck {
                token,
                attempts,
                deadline,
            } if now >= deadline => {
                self.outbound_failure(token, attempts, None, now);
            }
            State::AwaitingHeartbeat { deadline } if now >= deadline => {
                knx_log!(warn, "heartbeat timed out");
                self.heartbeat_failure(now);
            }
            State::Pacing { deadline } if now >= deadline => {
                self.enter_online(now);
            }
            State::Disconnecting { deadline } if now >= deadline => {
                self.enter_idle(now);
            }
            _ => {}
        }

        if matches!(self.state, State::Online) {
            if let Some(at) = self.heartbeat_at {
                if now >= at {
                    self.start_heartbeat(now);
                }
            }
        }
    }

    /// The next instant [`TunnelMachine::poll`] should run, if any.
    pub fn poll_at(&self) -> Option<u64> {
        let state_deadline = match self.state {
            State::Idle { retry_at } => {
                if self.reconnect {
                    retry_at
                } else {
                    None
                }
            }
            State::Searching { deadline }
            | State::Connecting { deadline }
            | State::AwaitingAck { deadline, .. }
            | State::AwaitingHeartbeat { deadline }
            | State::Pacing { deadline }
            | State::Disconnecting { deadline } => Some(deadline),
            State::Online => None,
        };
        let heartbeat = match self.state {
            State::Online => self.heartbeat_at,
            _ => None,
        };
        match (state_deadline, heartbeat) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        }
    }

    // ------------------------------------------------------------------
    // Output queues
    // ------------------------------------------------------------------

    /// Next datagram to put on the wire, if any.
    pub fn poll_transmit(&mut self) -> Option<Transmit> {
        self.transmits.pop_front()
    }

    /// Next user-observable event, if any.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn start_search(&mut self, now: u64) {
        if let Some(endpoint) = self.config.remote_endpoint {
            // Preconfigured gateway: skip discovery.
            self.remote = Some(endpoint);
            self.enter_connecting(now);
            return;
        }
        self.state = State::Searching {
            deadline: now + SEARCH_TIMEOUT_MS,
        };
        let multicast = IpEndpoint::from((KNXNETIP_MULTICAST_ADDR, KNXNETIP_DEFAULT_PORT));
        let request = Datagram::search_request();
        self.send_datagram(SocketRef::Discovery, multicast, &request);
    }

    fn enter_connecting(&mut self, now: u64) {
        if self.remote.is_none() {
            self.enter_idle(now);
            return;
        }
        self.state = State::Connecting {
            deadline: now + CONNECT_TIMEOUT_MS,
        };
        let request = Datagram::connect_request();
        self.send_control(&request);
    }

    /// Entering the steady state: a due heartbeat wins, then the oldest
    /// deferred request is dispatched.
    fn enter_online(&mut self, now: u64) {
        self.state = State::Online;
        if let Some(at) = self.heartbeat_at {
            if now >= at {
                self.start_heartbeat(now);
                return;
            }
        }
        if let Some(req) = self.deferred.pop_front() {
            self.dispatch(req, now);
        }
    }

    fn enter_pacing(&mut self, now: u64) {
        self.state = State::Pacing {
            deadline: now + PACING_DELAY_MS,
        };
    }

    fn enter_disconnecting(&mut self, now: u64) {
        self.purge_deferred();
        self.heartbeat_at = None;
        self.pending_tx.clear();
        match self.channel_id {
            Some(channel) if self.remote.is_some() => {
                self.state = State::Disconnecting {
                    deadline: now + DISCONNECT_TIMEOUT_MS,
                };
                let request = Datagram::disconnect_request(channel);
                self.send_control(&request);
            }
            _ => self.enter_idle(now),
        }
    }

    fn enter_idle(&mut self, now: u64) {
        self.channel_id = None;
        self.heartbeat_at = None;
        self.pending_tx.clear();
        self.state = State::Idle {
            retry_at: self.reconnect.then(|| now + IDLE_RETRY_MS),
        };
        self.push_event(Event::Offline);
    }

    fn start_heartbeat(&mut self, now: u64) {
        let Some(channel) = self.channel_id else {
            return;
        };
        self.heartbeat_at = Some(now + HEARTBEAT_INTERVAL_MS);
        self.state = State::AwaitingHeartbeat {
            deadline: now + HEARTBEAT_TIMEOUT_MS,
        };
        let request = Datagram::connectionstate_request(channel);
        self.send_control(&request);
    }

    fn heartbeat_failure(&mut self, now: u64) {
        self.heartbeat_failures += 1;
        if self.heartbeat_failures > MAX_HEARTBEAT_FAILURES {
            knx_log!(error, "heartbeat failed {} times, disconnecting", self.heartbeat_failures);
            self.enter_disconnecting(now);
        } else if let Some(channel) = self.channel_id {
            // Immediate resend; the 45 s period only spaces out successes.
            self.state = State::AwaitingHeartbeat {
                deadline: now + HEARTBEAT_TIMEOUT_MS,
            };
            let request = Datagram::connectionstate_request(channel);
            self.send_control(&request);
        }
    }

    /// Send one tunneling request and start the ack timer. The encoded bytes
    /// are kept so a retransmission repeats them exactly (same sequence
    /// number).
    fn dispatch(&mut self, req: GroupRequest, now: u64) {
        if !self.config.use_tunneling {
            // Routing mode: multicast indication, no ack to wait for.
            let mut cemi = req.cemi;
            cemi.msg_code = MessageCode::LDataInd;
            let multicast = IpEndpoint::from((KNXNETIP_MULTICAST_ADDR, KNXNETIP_DEFAULT_PORT));
            self.send_datagram(
                SocketRef::Discovery,
                multicast,
                &Datagram::RoutingIndication { cemi },
            );
            self.push_event(Event::Ack {
                token: req.token,
                outcome: AckOutcome::Acked,
            });
            self.enter_pacing(now);
            return;
        }

        let (Some(channel), Some(remote)) = (self.channel_id, self.remote) else {
            self.push_event(Event::Ack {
                token: req.token,
                outcome: AckOutcome::NoResponse,
            });
            return;
        };

        let dg = Datagram::tunneling_request(channel, self.seq_out, req.cemi);
        let mut buf = [0u8; MAX_FRAME_SIZE];
        match dg.encode(&mut buf) {
            Ok(n) => {
                self.pending_tx.clear();
                let _ = self.pending_tx.extend_from_slice(&buf[..n]);
                self.push_raw_transmit(SocketRef::Control, remote, &buf[..n]);
                self.state = State::AwaitingAck {
                    token: req.token,
                    attempts: 1,
                    deadline: now + ACK_TIMEOUT_MS,
                };
            }
            Err(err) => {
                knx_log!(error, "failed to encode tunneling request: {:?}", err);
                self.push_event(Event::Ack {
                    token: req.token,
                    outcome: AckOutcome::NoResponse,
                });
                self.enter_online(now);
            }
        }
    }

    /// Bounded retry for the in-flight request: one retransmission of the
    /// identical bytes, then completion with the failure and teardown.
    fn outbound_failure(&mut self, token: Token, attempts: u8, status: Option<u8>, now: u64) {
        if attempts < MAX_SEND_ATTEMPTS && !self.pending_tx.is_empty() {
            if let Some(remote) = self.remote {
                let pending: Vec<u8, MAX_FRAME_SIZE> = self.pending_tx.clone();
                self.push_raw_transmit(SocketRef::Control, remote, &pending);
            }
            self.state = State::AwaitingAck {
                token,
                attempts: attempts + 1,
                deadline: now + ACK_TIMEOUT_MS,
            };
        } else {
            let outcome = match status {
                Some(code) => AckOutcome::Refused(code),
                None => AckOutcome::NoResponse,
            };
            self.push_event(Event::Ack { token, outcome });
            self.enter_disconnecting(now);
        }
    }

    fn purge_deferred(&mut self) {
        while let Some(req) = self.deferred.pop_front() {
            self.push_event(Event::Ack {
                token: req.token,
                outcome: AckOutcome::NoResponse,
            });
        }
    }

    // ------------------------------------------------------------------
    // Output helpers
    // ------------------------------------------------------------------

    fn send_control(&mut self, dg: &Datagram) {
        let Some(remote) = self.remote else {
            return;
        };
        self.send_datagram(SocketRef::Control, remote, dg);
    }

    fn send_datagram(&mut self, socket: SocketRef, dest: IpEndpoint, dg: &Datagram) {
        let mut buf = [0u8; MAX_FRAME_SIZE];
        match dg.encode(&mut buf) {
            Ok(n) => self.push_raw_transmit(socket, dest, &buf[..n]),
            Err(err) => {
                knx_log!(error, "failed to encode datagram: {:?}", err);
            }
        }
    }

    fn push_raw_transmit(&mut self, socket: SocketRef, dest: IpEndpoint, bytes: &[u8]) {
        let Ok(payload) = Vec::from_slice(bytes) else {
            return;
        };
        if self
            .transmits
            .push_back(Transmit {
                socket,
                dest,
                payload,
            })
            .is_err()
        {
            knx_log!(warn, "transmit queue full, dropping frame");
        }
    }

    fn push_event(&mut self, event: Event) {
        if self.events.push_back(event).is_err() {
            knx_log!(warn, "event queue full, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::{ConnState, Hpai};

    const GATEWAY: IpEndpoint = IpEndpoint {
        addr: crate::net::Ipv4Addr::new(192, 168, 1, 10),
        port: 3671,
    };

    fn encode(dg: &Datagram) -> Vec<u8, MAX_FRAME_SIZE> {
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let n = dg.encode(&mut buf).unwrap();
        Vec::from_slice(&buf[..n]).unwrap()
    }

    fn connect_response(channel: u8, status: u8) -> Vec<u8, MAX_FRAME_SIZE> {
        encode(&Datagram::ConnectResponse {
            state: ConnState::new(channel, status),
            endpoint: Some(Hpai::new(GATEWAY)),
            cri: None,
        })
    }

    /// Machine brought up with a configured endpoint, straight to online.
    fn online_machine() -> (TunnelMachine, u64) {
        let config = ClientConfig::default().with_remote_endpoint(GATEWAY);
        let mut machine = TunnelMachine::new(config);
        let mut now = 0;
        machine.connect(now);
        assert_eq!(machine.state(), ConnectionState::Connecting);
        while machine.poll_transmit().is_some() {}

        now += 10;
        machine.handle_datagram(&connect_response(7, E_NO_ERROR), GATEWAY, now);
        assert_eq!(machine.state(), ConnectionState::Online);
        assert_eq!(machine.poll_event(), Some(Event::Online));
        (machine, now)
    }

    #[test]
    fn configured_endpoint_skips_discovery() {
        let config = ClientConfig::default().with_remote_endpoint(GATEWAY);
        let mut machine = TunnelMachine::new(config);
        machine.connect(0);
        assert_eq!(machine.state(), ConnectionState::Connecting);
        let tx = machine.poll_transmit().unwrap();
        assert_eq!(tx.socket, SocketRef::Control);
        assert_eq!(tx.dest, GATEWAY);
        assert_eq!(u16::from_be_bytes([tx.payload[2], tx.payload[3]]), 0x0205);
    }

    #[test]
    fn search_goes_to_multicast() {
        let mut machine = TunnelMachine::new(ClientConfig::default());
        machine.connect(0);
        assert_eq!(machine.state(), ConnectionState::Searching);
        let tx = machine.poll_transmit().unwrap();
        assert_eq!(tx.socket, SocketRef::Discovery);
        assert_eq!(tx.dest, IpEndpoint::from(([224, 0, 23, 12], 3671)));
        assert_eq!(u16::from_be_bytes([tx.payload[2], tx.payload[3]]), 0x0201);
    }

    #[test]
    fn no_more_connections_goes_idle() {
        let config = ClientConfig::default().with_remote_endpoint(GATEWAY);
        let mut machine = TunnelMachine::new(config);
        machine.connect(0);
        machine.handle_datagram(&connect_response(0, E_NO_MORE_CONNECTIONS), GATEWAY, 5);
        assert_eq!(machine.state(), ConnectionState::Idle);
        assert!(!machine.is_connected());
        assert_eq!(machine.poll_event(), Some(Event::Offline));
        // connect() is still wanted, so idle re-arms the retry timer
        assert_eq!(machine.poll_at(), Some(5 + IDLE_RETRY_MS));
    }

    #[test]
    fn channel_mismatch_dropped_silently() {
        let (mut machine, now) = online_machine();
        let ack = encode(&Datagram::tunneling_ack(9, 0, E_NO_ERROR));
        machine.handle_datagram(&ack, GATEWAY, now);
        assert_eq!(machine.state(), ConnectionState::Online);
        assert!(machine.poll_event().is_none());
        assert!(machine.poll_transmit().is_none());
    }

    #[test]
    fn write_not_sent_until_online() {
        let mut machine = TunnelMachine::new(ClientConfig::default());
        let ga = GroupAddress::new(1, 2, 3).unwrap();
        let token = machine.write(ga, ApduPayload::Small(1), 0).unwrap();
        // Nothing on the wire: the machine is idle and the request deferred.
        assert!(machine.poll_transmit().is_none());
        assert_eq!(machine.state(), ConnectionState::Idle);
        let _ = token;
    }

    #[test]
    fn deferred_requests_replay_in_order() {
        let config = ClientConfig::default().with_remote_endpoint(GATEWAY);
        let mut machine = TunnelMachine::new(config);
        let ga1 = GroupAddress::new(1, 0, 1).unwrap();
        let ga2 = GroupAddress::new(1, 0, 2).unwrap();
        machine.write(ga1, ApduPayload::Small(1), 0).unwrap();
        machine.write(ga2, ApduPayload::Small(0), 0).unwrap();

        machine.connect(0);
        while machine.poll_transmit().is_some() {}
        machine.handle_datagram(&connect_response(7, E_NO_ERROR), GATEWAY, 10);

        // First deferred request goes out immediately on entering online.
        assert_eq!(machine.state(), ConnectionState::AwaitingAck);
        let tx = machine.poll_transmit().unwrap();
        // TUNNELING_REQUEST with seq 0, dest 1/0/1
        assert_eq!(u16::from_be_bytes([tx.payload[2], tx.payload[3]]), 0x0420);
        assert_eq!(tx.payload[8], 0);
        assert_eq!(
            u16::from_be_bytes([tx.payload[16], tx.payload[17]]),
            ga1.raw()
        );

        // Ack it; after the pacing window the second one follows.
        let ack = encode(&Datagram::tunneling_ack(7, 0, E_NO_ERROR));
        machine.handle_datagram(&ack, GATEWAY, 20);
        assert_eq!(machine.state(), ConnectionState::Pacing);
        machine.poll(20 + PACING_DELAY_MS);
        assert_eq!(machine.state(), ConnectionState::AwaitingAck);
        let tx = machine.poll_transmit().unwrap();
        assert_eq!(tx.payload[8], 1); // next sequence number
        assert_eq!(
            u16::from_be_bytes([tx.payload[16], tx.payload[17]]),
            ga2.raw()
        );
    }

    #[test]
    fn stale_ack_seq_is_ignored() {
        let (mut machine, now) = online_machine();
        let ga = GroupAddress::new(1, 2, 3).unwrap();
        machine.write(ga, ApduPayload::Small(1), now).unwrap();
        assert_eq!(machine.state(), ConnectionState::AwaitingAck);

        let stale = encode(&Datagram::tunneling_ack(7, 5, E_NO_ERROR));
        machine.handle_datagram(&stale, GATEWAY, now);
        // Still waiting; no completion, no state change.
        assert_eq!(machine.state(), ConnectionState::AwaitingAck);
        assert!(machine.poll_event().is_none());
        assert_eq!(machine.outbound_seq(), 0);
    }

    #[test]
    fn error_ack_retries_once_then_disconnects() {
        let (mut machine, mut now) = online_machine();
        let ga = GroupAddress::new(1, 2, 3).unwrap();
        let token = machine.write(ga, ApduPayload::Small(1), now).unwrap();
        let first = machine.poll_transmit().unwrap();

        let bad_ack = encode(&Datagram::tunneling_ack(7, 0, 0x29));
        now += 5;
        machine.handle_datagram(&bad_ack, GATEWAY, now);
        // One retransmission, byte-identical.
        let second = machine.poll_transmit().unwrap();
        assert_eq!(first.payload, second.payload);
        assert_eq!(machine.state(), ConnectionState::AwaitingAck);

        now += 5;
        machine.handle_datagram(&bad_ack, GATEWAY, now);
        assert_eq!(
            machine.poll_event(),
            Some(Event::Ack {
                token,
                outcome: AckOutcome::Refused(0x29)
            })
        );
        assert_eq!(machine.state(), ConnectionState::Disconnecting);
        // DISCONNECT_REQUEST went out
        let tx = machine.poll_transmit().unwrap();
        assert_eq!(u16::from_be_bytes([tx.payload[2], tx.payload[3]]), 0x0209);
    }

    #[test]
    fn heartbeat_success_resets_failures() {
        let (mut machine, mut now) = online_machine();
        now += HEARTBEAT_INTERVAL_MS;
        machine.poll(now);
        assert_eq!(machine.state(), ConnectionState::AwaitingHeartbeat);
        let tx = machine.poll_transmit().unwrap();
        assert_eq!(u16::from_be_bytes([tx.payload[2], tx.payload[3]]), 0x0207);

        let response = encode(&Datagram::ConnectionstateResponse {
            state: ConnState::new(7, E_NO_ERROR),
            endpoint: None,
        });
        machine.handle_datagram(&response, GATEWAY, now + 5);
        assert_eq!(machine.state(), ConnectionState::Pacing);
        machine.poll(now + 5 + PACING_DELAY_MS);
        assert_eq!(machine.state(), ConnectionState::Online);
        // Next heartbeat re-armed one interval after the probe was sent.
        assert_eq!(machine.poll_at(), Some(now + HEARTBEAT_INTERVAL_MS));
    }

    #[test]
    fn routing_mode_multicasts_without_ack() {
        let config = ClientConfig::default()
            .with_remote_endpoint(GATEWAY)
            .with_use_tunneling(false);
        let mut machine = TunnelMachine::new(config);
        machine.connect(0);
        while machine.poll_transmit().is_some() {}
        machine.handle_datagram(&connect_response(7, E_NO_ERROR), GATEWAY, 10);
        assert_eq!(machine.poll_event(), Some(Event::Online));

        let ga = GroupAddress::new(1, 2, 3).unwrap();
        let token = machine.write(ga, ApduPayload::Small(1), 10).unwrap();
        let tx = machine.poll_transmit().unwrap();
        assert_eq!(tx.socket, SocketRef::Discovery);
        assert_eq!(u16::from_be_bytes([tx.payload[2], tx.payload[3]]), 0x0530);
        // L_Data.ind inside the routing indication
        assert_eq!(tx.payload[6], 0x29);
        // Completion is immediate; no ack will come.
        assert_eq!(
            machine.poll_event(),
            Some(Event::Ack {
                token,
                outcome: AckOutcome::Acked
            })
        );
        assert_eq!(machine.state(), ConnectionState::Pacing);
    }

    #[test]
    fn gateway_disconnect_request_is_honoured() {
        let (mut machine, now) = online_machine();
        let request = encode(&Datagram::disconnect_request(7));
        machine.handle_datagram(&request, GATEWAY, now);
        // DISCONNECT_RESPONSE echoed, session idle.
        let tx = machine.poll_transmit().unwrap();
        assert_eq!(u16::from_be_bytes([tx.payload[2], tx.payload[3]]), 0x020A);
        assert_eq!(machine.poll_event(), Some(Event::Offline));
        assert!(!machine.is_connected());
    }

    #[test]
    fn disconnect_purges_deferred_queue() {
        let mut machine = TunnelMachine::new(ClientConfig::default());
        let ga = GroupAddress::new(1, 2, 3).unwrap();
        let token = machine.write(ga, ApduPayload::Small(1), 0).unwrap();
        machine.disconnect(0);
        assert_eq!(
            machine.poll_event(),
            Some(Event::Ack {
                token,
                outcome: AckOutcome::NoResponse
            })
        );
        // No reconnect timer once disconnect was requested.
        assert_eq!(machine.poll_at(), None);
    }

    #[test]
    fn search_response_filter() {
        let mut machine = TunnelMachine::new(ClientConfig::default());
        machine.connect(0);
        assert_eq!(machine.state(), ConnectionState::Searching);
        while machine.poll_transmit().is_some() {}

        let mut name = heapless::String::new();
        name.push_str("gw").unwrap();
        let mut dib = crate::protocol::frame::DeviceDib {
            medium: 0x02,
            status: 0,
            address: IndividualAddress::new(2, 2, 2).unwrap(),
            project_installation_id: 0,
            serial: [0; 6],
            routing_multicast: [224, 0, 23, 12],
            mac: [0; 6],
            name,
        };

        // Wrong physical address: filtered out, still searching.
        let response = encode(&Datagram::SearchResponse {
            endpoint: Hpai::new(GATEWAY),
            device: dib.clone(),
        });
        machine.handle_datagram(&response, GATEWAY, 5);
        assert_eq!(machine.state(), ConnectionState::Searching);

        // Advertising the configured address: accepted.
        dib.address = IndividualAddress::new(1, 1, 220).unwrap();
        let response = encode(&Datagram::SearchResponse {
            endpoint: Hpai::new(GATEWAY),
            device: dib,
        });
        machine.handle_datagram(&response, GATEWAY, 6);
        assert_eq!(machine.state(), ConnectionState::Connecting);
        assert_eq!(machine.remote_endpoint(), Some(GATEWAY));
    }

    #[test]
    fn malformed_datagram_is_dropped() {
        let (mut machine, now) = online_machine();
        machine.handle_datagram(&[0x06, 0x10, 0x04], GATEWAY, now);
        machine.handle_datagram(&[0xFF; 32], GATEWAY, now);
        assert_eq!(machine.state(), ConnectionState::Online);
        assert!(machine.poll_event().is_none());
    }
}
