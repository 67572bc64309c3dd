//! Service-typed KNXnet/IP datagrams and the outbound datagram builder.
//!
//! [`Datagram`] models each frame body as a variant tagged by service type,
//! so dispatch is an exhaustive `match` and a new service cannot be added
//! without the compiler pointing at every site that must handle it. Reading
//! and writing walk the same sub-structure order per service.
//!
//! [`DatagramBuilder`] produces the cEMI payloads for group operations,
//! stamping each with a fresh correlation [`Token`] the connection machine
//! uses to route acknowledgement completions back to the originating caller.

use crate::addressing::{GroupAddress, IndividualAddress};
use crate::error::{KnxError, Result};
use crate::net::IpEndpoint;
use crate::protocol::cemi::{Apci, Apdu, ApduPayload, CemiFrame, ControlField1, ControlField2};
use crate::protocol::constants::{MessageCode, ServiceType, E_NO_ERROR};
use crate::protocol::frame::{ConnState, Cri, DeviceDib, Hpai, KnxnetIpHeader, TunnState};

/// A complete KNXnet/IP datagram, tagged by service type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Datagram {
    /// `SEARCH_REQUEST`: control HPAI, tunnel HPAI, CRI
    SearchRequest {
        control: Hpai,
        data: Hpai,
        cri: Cri,
    },
    /// `SEARCH_RESPONSE`: gateway control HPAI, device description
    SearchResponse {
        endpoint: Hpai,
        device: DeviceDib,
    },
    /// `CONNECT_REQUEST`: control HPAI, tunnel HPAI, CRI
    ConnectRequest {
        control: Hpai,
        data: Hpai,
        cri: Cri,
    },
    /// `CONNECT_RESPONSE`: channel state, then HPAI and CRI when the total
    /// length permits
    ConnectResponse {
        state: ConnState,
        endpoint: Option<Hpai>,
        cri: Option<Cri>,
    },
    /// `CONNECTIONSTATE_REQUEST`: channel state, optional control HPAI
    ConnectionstateRequest {
        state: ConnState,
        endpoint: Option<Hpai>,
    },
    /// `CONNECTIONSTATE_RESPONSE`
    ConnectionstateResponse {
        state: ConnState,
        endpoint: Option<Hpai>,
    },
    /// `DISCONNECT_REQUEST`
    DisconnectRequest {
        state: ConnState,
        endpoint: Option<Hpai>,
    },
    /// `DISCONNECT_RESPONSE`
    DisconnectResponse {
        state: ConnState,
        endpoint: Option<Hpai>,
    },
    /// `TUNNELING_REQUEST`: connection header, cEMI frame
    TunnelingRequest {
        tunnel: TunnState,
        cemi: CemiFrame,
    },
    /// `TUNNELING_ACK`: connection header only
    TunnelingAck {
        tunnel: TunnState,
    },
    /// `ROUTING_INDICATION`: bare cEMI frame, multicast, no ack
    RoutingIndication {
        cemi: CemiFrame,
    },
}

impl Datagram {
    /// The service type tag of this datagram.
    pub const fn service_type(&self) -> ServiceType {
        match self {
            Self::SearchRequest { .. } => ServiceType::SearchRequest,
            Self::SearchResponse { .. } => ServiceType::SearchResponse,
            Self::ConnectRequest { .. } => ServiceType::ConnectRequest,
            Self::ConnectResponse { .. } => ServiceType::ConnectResponse,
            Self::ConnectionstateRequest { .. } => ServiceType::ConnectionstateRequest,
            Self::ConnectionstateResponse { .. } => ServiceType::ConnectionstateResponse,
            Self::DisconnectRequest { .. } => ServiceType::DisconnectRequest,
            Self::DisconnectResponse { .. } => ServiceType::DisconnectResponse,
            Self::TunnelingRequest { .. } => ServiceType::TunnelingRequest,
            Self::TunnelingAck { .. } => ServiceType::TunnelingAck,
            Self::RoutingIndication { .. } => ServiceType::RoutingIndication,
        }
    }

    /// Total encoded size, header included.
    pub fn length(&self) -> usize {
        let body = match self {
            Self::SearchRequest { .. } | Self::ConnectRequest { .. } => {
                Hpai::SIZE * 2 + Cri::SIZE
            }
            Self::SearchResponse { .. } => Hpai::SIZE + DeviceDib::SIZE,
            Self::ConnectResponse { endpoint, cri, .. } => {
                ConnState::SIZE
                    + endpoint.map_or(0, |_| Hpai::SIZE)
                    + cri.map_or(0, |_| Cri::SIZE)
            }
            Self::ConnectionstateRequest { endpoint, .. }
            | Self::ConnectionstateResponse { endpoint, .. }
            | Self::DisconnectRequest { endpoint, .. }
            | Self::DisconnectResponse { endpoint, .. } => {
                ConnState::SIZE + endpoint.map_or(0, |_| Hpai::SIZE)
            }
            Self::TunnelingRequest { cemi, .. } => TunnState::SIZE + cemi.length(),
            Self::TunnelingAck { .. } => TunnState::SIZE,
            Self::RoutingIndication { cemi } => cemi.length(),
        };
        KnxnetIpHeader::SIZE + body
    }

    /// Decode a datagram from a byte buffer.
    ///
    /// # Errors
    ///
    /// Fails with `IncompletePacket` when the buffer is shorter than the
    /// header's `total_length`, and with the sub-structure errors of §frame
    /// and §cemi otherwise. Callers treat every decode error as "log and
    /// drop".
    pub fn decode(data: &[u8]) -> Result<Self> {
        let header = KnxnetIpHeader::parse(data)?;
        let total = header.total_length as usize;
        if data.len() < total || total < KnxnetIpHeader::SIZE {
            return Err(KnxError::incomplete_packet());
        }
        let body = &data[KnxnetIpHeader::SIZE..total];

        match header.service_type {
            ServiceType::SearchRequest => {
                let (control, data_ep, cri) = parse_connect_body(body)?;
                Ok(Self::SearchRequest {
                    control,
                    data: data_ep,
                    cri,
                })
            }
            ServiceType::SearchResponse => {
                if body.len() < Hpai::SIZE {
                    return Err(KnxError::incomplete_packet());
                }
                let endpoint = Hpai::parse(body)?;
                let device = DeviceDib::parse(&body[Hpai::SIZE..])?;
                Ok(Self::SearchResponse { endpoint, device })
            }
            ServiceType::ConnectRequest => {
                let (control, data_ep, cri) = parse_connect_body(body)?;
                Ok(Self::ConnectRequest {
                    control,
                    data: data_ep,
                    cri,
                })
            }
            ServiceType::ConnectResponse => {
                let state = ConnState::parse(body)?;
                let rest = &body[ConnState::SIZE..];
                let endpoint = if rest.len() >= Hpai::SIZE {
                    Some(Hpai::parse(rest)?)
                } else {
                    None
                };
                let rest = if endpoint.is_some() {
                    &rest[Hpai::SIZE..]
                } else {
                    rest
                };
                let cri = if rest.len() >= Cri::SIZE {
                    Some(Cri::parse(rest)?)
                } else {
                    None
                };
                Ok(Self::ConnectResponse {
                    state,
                    endpoint,
                    cri,
                })
            }
            ServiceType::ConnectionstateRequest => {
                let (state, endpoint) = parse_state_body(body)?;
                Ok(Self::ConnectionstateRequest { state, endpoint })
            }
            ServiceType::ConnectionstateResponse => {
                let (state, endpoint) = parse_state_body(body)?;
                Ok(Self::ConnectionstateResponse { state, endpoint })
            }
            ServiceType::DisconnectRequest => {
                let (state, endpoint) = parse_state_body(body)?;
                Ok(Self::DisconnectRequest { state, endpoint })
            }
            ServiceType::DisconnectResponse => {
                let (state, endpoint) = parse_state_body(body)?;
                Ok(Self::DisconnectResponse { state, endpoint })
            }
            ServiceType::TunnelingRequest => {
                let tunnel = TunnState::parse(body)?;
                let (cemi, _) = CemiFrame::parse(&body[TunnState::SIZE..])?;
                Ok(Self::TunnelingRequest { tunnel, cemi })
            }
            ServiceType::TunnelingAck => {
                let tunnel = TunnState::parse(body)?;
                Ok(Self::TunnelingAck { tunnel })
            }
            ServiceType::RoutingIndication => {
                let (cemi, _) = CemiFrame::parse(body)?;
                Ok(Self::RoutingIndication { cemi })
            }
        }
    }

    /// Encode into `buf`, returning the bytes written.
    ///
    /// The total length is computed from the structural walk before the
    /// header is emitted, so `total_length` always equals the byte count.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let total = self.length();
        if buf.len() < total {
            return Err(KnxError::buffer_too_small());
        }

        let header = KnxnetIpHeader::new(
            self.service_type(),
            (total - KnxnetIpHeader::SIZE) as u16,
        );
        let mut offset = header.encode(buf)?;

        match self {
            Self::SearchRequest { control, data, cri }
            | Self::ConnectRequest { control, data, cri } => {
                offset += control.encode(&mut buf[offset..])?;
                offset += data.encode(&mut buf[offset..])?;
                offset += cri.encode(&mut buf[offset..])?;
            }
            Self::SearchResponse { endpoint, device } => {
                offset += endpoint.encode(&mut buf[offset..])?;
                offset += device.encode(&mut buf[offset..])?;
            }
            Self::ConnectResponse {
                state,
                endpoint,
                cri,
            } => {
                offset += state.encode(&mut buf[offset..])?;
                if let Some(endpoint) = endpoint {
                    offset += endpoint.encode(&mut buf[offset..])?;
                }
                if let Some(cri) = cri {
                    offset += cri.encode(&mut buf[offset..])?;
                }
            }
            Self::ConnectionstateRequest { state, endpoint }
            | Self::ConnectionstateResponse { state, endpoint }
            | Self::DisconnectRequest { state, endpoint }
            | Self::DisconnectResponse { state, endpoint } => {
                offset += state.encode(&mut buf[offset..])?;
                if let Some(endpoint) = endpoint {
                    offset += endpoint.encode(&mut buf[offset..])?;
                }
            }
            Self::TunnelingRequest { tunnel, cemi } => {
                offset += tunnel.encode(&mut buf[offset..])?;
                offset += cemi.encode(&mut buf[offset..])?;
            }
            Self::TunnelingAck { tunnel } => {
                offset += tunnel.encode(&mut buf[offset..])?;
            }
            Self::RoutingIndication { cemi } => {
                offset += cemi.encode(&mut buf[offset..])?;
            }
        }

        debug_assert_eq!(offset, total);
        Ok(offset)
    }

    /// Replace every unspecified HPAI (0.0.0.0:0) with the datagram's actual
    /// source endpoint.
    ///
    /// Applied on receipt, before the frame moves up to the connection
    /// machine.
    pub fn substitute_source(&mut self, source: IpEndpoint) {
        let fix = |hpai: &mut Hpai| {
            if hpai.endpoint.is_unspecified() {
                hpai.endpoint = source;
            }
        };
        match self {
            Self::SearchRequest { control, data, .. }
            | Self::ConnectRequest { control, data, .. } => {
                fix(control);
                fix(data);
            }
            Self::SearchResponse { endpoint, .. } => fix(endpoint),
            Self::ConnectResponse { endpoint, .. } => {
                if let Some(endpoint) = endpoint {
                    fix(endpoint);
                }
            }
            Self::ConnectionstateRequest { endpoint, .. }
            | Self::ConnectionstateResponse { endpoint, .. }
            | Self::DisconnectRequest { endpoint, .. }
            | Self::DisconnectResponse { endpoint, .. } => {
                if let Some(endpoint) = endpoint {
                    fix(endpoint);
                }
            }
            Self::TunnelingRequest { .. }
            | Self::TunnelingAck { .. }
            | Self::RoutingIndication { .. } => {}
        }
    }

    /// The channel id carried by this datagram's ConnState/TunnState, if any.
    ///
    /// Inbound datagrams whose channel id does not match the session are
    /// dropped silently.
    pub const fn channel_id(&self) -> Option<u8> {
        match self {
            Self::ConnectResponse { state, .. }
            | Self::ConnectionstateRequest { state, .. }
            | Self::ConnectionstateResponse { state, .. }
            | Self::DisconnectRequest { state, .. }
            | Self::DisconnectResponse { state, .. } => Some(state.channel_id),
            Self::TunnelingRequest { tunnel, .. } | Self::TunnelingAck { tunnel } => {
                Some(tunnel.channel_id)
            }
            Self::SearchRequest { .. }
            | Self::SearchResponse { .. }
            | Self::ConnectRequest { .. }
            | Self::RoutingIndication { .. } => None,
        }
    }

    // Skeleton constructors for the control traffic the machine emits.

    /// `SEARCH_REQUEST` with NAT-mode endpoints.
    pub fn search_request() -> Self {
        Self::SearchRequest {
            control: Hpai::UNSPECIFIED,
            data: Hpai::UNSPECIFIED,
            cri: Cri::tunnel_link_layer(),
        }
    }

    /// `CONNECT_REQUEST` with NAT-mode endpoints.
    pub fn connect_request() -> Self {
        Self::ConnectRequest {
            control: Hpai::UNSPECIFIED,
            data: Hpai::UNSPECIFIED,
            cri: Cri::tunnel_link_layer(),
        }
    }

    /// `CONNECTIONSTATE_REQUEST` for the given channel.
    pub fn connectionstate_request(channel_id: u8) -> Self {
        Self::ConnectionstateRequest {
            state: ConnState::new(channel_id, 0),
            endpoint: Some(Hpai::UNSPECIFIED),
        }
    }

    /// `DISCONNECT_REQUEST` for the given channel.
    pub fn disconnect_request(channel_id: u8) -> Self {
        Self::DisconnectRequest {
            state: ConnState::new(channel_id, 0),
            endpoint: Some(Hpai::UNSPECIFIED),
        }
    }

    /// `DISCONNECT_RESPONSE` confirming the peer's request.
    pub fn disconnect_response(channel_id: u8) -> Self {
        Self::DisconnectResponse {
            state: ConnState::new(channel_id, E_NO_ERROR),
            endpoint: None,
        }
    }

    /// `TUNNELING_ACK` echoing the given sequence number.
    pub fn tunneling_ack(channel_id: u8, seq: u8, status: u8) -> Self {
        Self::TunnelingAck {
            tunnel: TunnState::new(channel_id, seq, status),
        }
    }

    /// `TUNNELING_REQUEST` carrying `cemi` with the given channel/sequence.
    pub fn tunneling_request(channel_id: u8, seq: u8, cemi: CemiFrame) -> Self {
        Self::TunnelingRequest {
            tunnel: TunnState::new(channel_id, seq, 0),
            cemi,
        }
    }
}

fn parse_connect_body(body: &[u8]) -> Result<(Hpai, Hpai, Cri)> {
    if body.len() < Hpai::SIZE * 2 + Cri::SIZE {
        return Err(KnxError::incomplete_packet());
    }
    let control = Hpai::parse(body)?;
    let data = Hpai::parse(&body[Hpai::SIZE..])?;
    let cri = Cri::parse(&body[Hpai::SIZE * 2..])?;
    Ok((control, data, cri))
}

fn parse_state_body(body: &[u8]) -> Result<(ConnState, Option<Hpai>)> {
    let state = ConnState::parse(body)?;
    let rest = &body[ConnState::SIZE..];
    let endpoint = if rest.len() >= Hpai::SIZE {
        Some(Hpai::parse(rest)?)
    } else {
        None
    };
    Ok((state, endpoint))
}

/// Correlation id stamped into every outbound group request.
///
/// The connection machine emits the acknowledgement completion keyed by this
/// token, which is how a caller's pending future finds its result without a
/// shared pending-request table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Token(pub u32);

/// An outbound group operation: the cEMI payload plus its correlation token.
///
/// Channel id and sequence number are stamped by the connection machine at
/// dispatch time, so a request built while the tunnel is down can sit in the
/// deferred queue unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GroupRequest {
    /// The cEMI frame to tunnel
    pub cemi: CemiFrame,
    /// Correlation token for the ack completion
    pub token: Token,
}

/// Builder for outbound group-operation datagrams.
///
/// Holds the per-session pieces every request shares: the source physical
/// address stamped into the cEMI frame and whether L_Data.req should ask the
/// bus for a link-layer acknowledge.
#[derive(Debug)]
pub struct DatagramBuilder {
    source: IndividualAddress,
    ack_request: bool,
    next_token: u32,
}

impl DatagramBuilder {
    /// Create a builder.
    ///
    /// `suppress_ack` mirrors the client option: when false, outbound
    /// L_Data.req frames carry ctrl1.acknowledge=1.
    pub fn new(source: IndividualAddress, suppress_ack: bool) -> Self {
        Self {
            source,
            ack_request: !suppress_ack,
            next_token: 0,
        }
    }

    fn take_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token = self.next_token.wrapping_add(1);
        token
    }

    /// The tunneling-request skeleton: L_Data.req, standard frame,
    /// do-not-repeat, broadcast, low priority, group destination, hop count
    /// 6, GroupValue_Write with zero data.
    fn skeleton(&self, dest: GroupAddress) -> CemiFrame {
        CemiFrame {
            msg_code: MessageCode::LDataReq,
            ctrl1: ControlField1::default().with_ack_requested(self.ack_request),
            ctrl2: ControlField2::default(),
            source: self.source,
            dest: dest.raw(),
            apdu: Some(Apdu::new(Apci::GroupValueWrite, ApduPayload::Small(0))),
        }
    }

    fn with_apdu(
        &mut self,
        dest: GroupAddress,
        apci: Apci,
        payload: ApduPayload,
    ) -> GroupRequest {
        let mut cemi = self.skeleton(dest);
        cemi.apdu = Some(Apdu::new(apci, payload));
        GroupRequest {
            cemi,
            token: self.take_token(),
        }
    }

    /// A GroupValue_Read request.
    pub fn read_request(&mut self, dest: GroupAddress) -> GroupRequest {
        self.with_apdu(dest, Apci::GroupValueRead, ApduPayload::Small(0))
    }

    /// A GroupValue_Write request carrying an already-encoded payload.
    pub fn write_request(&mut self, dest: GroupAddress, payload: ApduPayload) -> GroupRequest {
        self.with_apdu(dest, Apci::GroupValueWrite, payload)
    }

    /// A GroupValue_Response answering a read from the bus.
    pub fn respond_request(&mut self, dest: GroupAddress, payload: ApduPayload) -> GroupRequest {
        self.with_apdu(dest, Apci::GroupValueResponse, payload)
    }

    /// A GroupValue_Write from raw bytes and an explicit bit width,
    /// bypassing datapoint encoding.
    pub fn write_raw_request(
        &mut self,
        dest: GroupAddress,
        data: &[u8],
        bit_length: usize,
    ) -> Result<GroupRequest> {
        let payload = ApduPayload::from_bits(data, bit_length)?;
        Ok(self.write_request(dest, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::Ipv4Addr;

    fn sample_cemi() -> CemiFrame {
        CemiFrame {
            msg_code: MessageCode::LDataReq,
            ctrl1: ControlField1::default(),
            ctrl2: ControlField2::default(),
            source: IndividualAddress::new(15, 15, 15).unwrap(),
            dest: GroupAddress::new(1, 2, 3).unwrap().raw(),
            apdu: Some(Apdu::new(Apci::GroupValueWrite, ApduPayload::Small(1))),
        }
    }

    fn sample_dib() -> DeviceDib {
        let mut name = heapless::String::new();
        name.push_str("gw").unwrap();
        DeviceDib {
            medium: 0x02,
            status: 0x00,
            address: IndividualAddress::new(1, 1, 220).unwrap(),
            project_installation_id: 0,
            serial: [9, 8, 7, 6, 5, 4],
            routing_multicast: [224, 0, 23, 12],
            mac: [1, 2, 3, 4, 5, 6],
            name,
        }
    }

    fn roundtrip(dg: &Datagram) -> Datagram {
        let mut buf = [0u8; 256];
        let n = dg.encode(&mut buf).unwrap();
        assert_eq!(n, dg.length());
        // total length in the header must equal the bytes emitted
        assert_eq!(u16::from_be_bytes([buf[4], buf[5]]) as usize, n);
        Datagram::decode(&buf[..n]).unwrap()
    }

    #[test]
    fn every_service_type_roundtrips() {
        let gateway = Hpai::new(IpEndpoint::from(([192, 168, 1, 10], 3671)));
        let cases = [
            Datagram::search_request(),
            Datagram::SearchResponse {
                endpoint: gateway,
                device: sample_dib(),
            },
            Datagram::connect_request(),
            Datagram::ConnectResponse {
                state: ConnState::new(7, 0),
                endpoint: Some(gateway),
                cri: Some(Cri::tunnel_link_layer()),
            },
            Datagram::ConnectResponse {
                state: ConnState::new(7, 0x24),
                endpoint: None,
                cri: None,
            },
            Datagram::connectionstate_request(7),
            Datagram::ConnectionstateResponse {
                state: ConnState::new(7, 0),
                endpoint: None,
            },
            Datagram::disconnect_request(7),
            Datagram::disconnect_response(7),
            Datagram::tunneling_request(7, 3, sample_cemi()),
            Datagram::tunneling_ack(7, 3, 0),
            Datagram::RoutingIndication {
                cemi: sample_cemi(),
            },
        ];
        for dg in cases {
            assert_eq!(roundtrip(&dg), dg);
        }
    }

    #[test]
    fn connect_request_wire_layout() {
        let mut buf = [0u8; 64];
        let n = Datagram::connect_request().encode(&mut buf).unwrap();
        assert_eq!(n, 26);
        assert_eq!(&buf[..2], &[0x06, 0x10]);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 0x0205);
        assert_eq!(u16::from_be_bytes([buf[4], buf[5]]), 26);
        // two NAT-mode HPAIs then the tunnel CRI
        assert_eq!(&buf[6..14], &[0x08, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&buf[14..22], &[0x08, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&buf[22..26], &[0x04, 0x04, 0x02, 0x00]);
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let mut buf = [0u8; 64];
        let n = Datagram::connect_request().encode(&mut buf).unwrap();
        assert_eq!(
            Datagram::decode(&buf[..n - 1]),
            Err(KnxError::incomplete_packet())
        );
    }

    #[test]
    fn decode_tolerates_trailing_bytes() {
        // total_length bounds the parse; trailing noise is ignored
        let mut buf = [0u8; 64];
        let n = Datagram::tunneling_ack(1, 0, 0).encode(&mut buf).unwrap();
        buf[n] = 0xFF;
        assert_eq!(
            Datagram::decode(&buf[..n + 1]).unwrap(),
            Datagram::tunneling_ack(1, 0, 0)
        );
    }

    #[test]
    fn connect_response_without_optional_tail() {
        // ConnState only, as a refusing gateway sends it
        let data = [0x06, 0x10, 0x02, 0x06, 0x00, 0x08, 0x00, 0x24];
        match Datagram::decode(&data).unwrap() {
            Datagram::ConnectResponse {
                state,
                endpoint,
                cri,
            } => {
                assert_eq!(state.status, 0x24);
                assert!(endpoint.is_none());
                assert!(cri.is_none());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn substitute_source_fills_nat_endpoints() {
        let source = IpEndpoint::new(Ipv4Addr::new(192, 168, 1, 10), 3671);
        let mut dg = Datagram::SearchResponse {
            endpoint: Hpai::UNSPECIFIED,
            device: sample_dib(),
        };
        dg.substitute_source(source);
        match dg {
            Datagram::SearchResponse { endpoint, .. } => {
                assert_eq!(endpoint.endpoint, source);
            }
            _ => unreachable!(),
        }

        // a specified endpoint stays untouched
        let fixed = IpEndpoint::new(Ipv4Addr::new(10, 0, 0, 1), 1234);
        let mut dg = Datagram::SearchResponse {
            endpoint: Hpai::new(fixed),
            device: sample_dib(),
        };
        dg.substitute_source(source);
        match dg {
            Datagram::SearchResponse { endpoint, .. } => {
                assert_eq!(endpoint.endpoint, fixed);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn channel_id_extraction() {
        assert_eq!(Datagram::tunneling_ack(9, 0, 0).channel_id(), Some(9));
        assert_eq!(Datagram::disconnect_request(3).channel_id(), Some(3));
        assert_eq!(Datagram::search_request().channel_id(), None);
    }

    #[test]
    fn builder_read_request_shape() {
        let mut builder =
            DatagramBuilder::new(IndividualAddress::new(15, 15, 15).unwrap(), true);
        let req = builder.read_request(GroupAddress::new(1, 2, 3).unwrap());
        let apdu = req.cemi.apdu.as_ref().unwrap();
        assert_eq!(apdu.apci, Apci::GroupValueRead);
        assert_eq!(apdu.payload, ApduPayload::Small(0));
        assert_eq!(req.cemi.msg_code, MessageCode::LDataReq);
        assert!(req.cemi.ctrl2.is_group_address());
        assert_eq!(req.cemi.ctrl2.hop_count(), 6);
        assert!(!req.cemi.ctrl1.ack_requested());
    }

    #[test]
    fn builder_ack_option() {
        let mut builder =
            DatagramBuilder::new(IndividualAddress::new(15, 15, 15).unwrap(), false);
        let req = builder.write_request(
            GroupAddress::new(1, 2, 3).unwrap(),
            ApduPayload::Small(1),
        );
        assert!(req.cemi.ctrl1.ack_requested());
    }

    #[test]
    fn builder_tokens_are_unique_and_ordered() {
        let mut builder =
            DatagramBuilder::new(IndividualAddress::new(1, 1, 1).unwrap(), true);
        let ga = GroupAddress::new(0, 0, 1).unwrap();
        let a = builder.read_request(ga).token;
        let b = builder.read_request(ga).token;
        let c = builder
            .write_raw_request(ga, &[0x42], 8)
            .unwrap()
            .token;
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(b.0, a.0 + 1);
    }

    #[test]
    fn builder_write_raw_selects_wire_form() {
        let mut builder =
            DatagramBuilder::new(IndividualAddress::new(1, 1, 1).unwrap(), true);
        let ga = GroupAddress::new(0, 0, 1).unwrap();

        let small = builder.write_raw_request(ga, &[0x01], 1).unwrap();
        assert_eq!(
            small.cemi.apdu.unwrap().payload,
            ApduPayload::Small(0x01)
        );

        let long = builder.write_raw_request(ga, &[0x12, 0x34], 16).unwrap();
        assert_eq!(long.cemi.apdu.as_ref().unwrap().length(), 5);

        assert!(builder.write_raw_request(ga, &[0u8; 15], 120).is_err());
    }
}
