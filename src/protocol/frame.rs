//! KNXnet/IP frame header and fixed-size sub-structures.
//!
//! Everything here is a pure codec over byte slices: `parse` reads a value,
//! `encode` writes it and returns the byte count, `SIZE` pre-sizes buffers.
//! No I/O happens at this layer.

use crate::addressing::IndividualAddress;
use crate::error::{KnxError, Result};
use crate::net::{IpEndpoint, Ipv4Addr};
use crate::protocol::constants::*;

/// KNXnet/IP frame header (6 bytes)
///
/// ```text
/// ┌──────────────┬──────────────┬─────────────────────┐
/// │ Header Len   │ Protocol Ver │  Service Type ID    │
/// │   (1 byte)   │   (1 byte)   │     (2 bytes)       │
/// ├──────────────┴──────────────┴─────────────────────┤
/// │           Total Length (2 bytes)                  │
/// └───────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KnxnetIpHeader {
    /// Service type identifier
    pub service_type: ServiceType,
    /// Total length of frame (header + body)
    pub total_length: u16,
}

impl KnxnetIpHeader {
    /// Size of the header in bytes
    pub const SIZE: usize = 6;

    /// Create a new header for the given body length.
    pub const fn new(service_type: ServiceType, body_length: u16) -> Self {
        Self {
            service_type,
            total_length: Self::SIZE as u16 + body_length,
        }
    }

    /// Parse a header from a byte slice.
    ///
    /// # Errors
    ///
    /// Fails on a short buffer, wrong header length byte, unsupported
    /// protocol version, or an unrecognised service type.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(KnxError::incomplete_packet());
        }
        if data[0] != HEADER_SIZE_10 {
            return Err(KnxError::invalid_header());
        }
        if data[1] != KNXNETIP_VERSION_10 {
            return Err(KnxError::unsupported_version());
        }

        let service_type = ServiceType::from_u16(u16::from_be_bytes([data[2], data[3]]))
            .ok_or_else(KnxError::unsupported_service_type)?;
        let total_length = u16::from_be_bytes([data[4], data[5]]);

        Ok(Self {
            service_type,
            total_length,
        })
    }

    /// Encode the header into `buf`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < Self::SIZE {
            return Err(KnxError::buffer_too_small());
        }
        buf[0] = HEADER_SIZE_10;
        buf[1] = KNXNETIP_VERSION_10;
        buf[2..4].copy_from_slice(&self.service_type.to_u16().to_be_bytes());
        buf[4..6].copy_from_slice(&self.total_length.to_be_bytes());
        Ok(Self::SIZE)
    }

    /// Expected body length.
    pub const fn body_length(&self) -> u16 {
        self.total_length.saturating_sub(Self::SIZE as u16)
    }
}

/// Host Protocol Address Information (HPAI)
///
/// ```text
/// ┌──────────────┬──────────────┬─────────────────────┐
/// │ Structure Len│ Host Protocol│   IP Address        │
/// │   (1 byte)   │   (1 byte)   │   (4 bytes IPv4)    │
/// ├──────────────┴──────────────┴─────────────────────┤
/// │                Port (2 bytes)                     │
/// └───────────────────────────────────────────────────┘
/// ```
///
/// An all-zero endpoint is legal and means "use the datagram's real source";
/// the receiving side substitutes it before the frame moves upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Hpai {
    /// Endpoint (IPv4 address + UDP port)
    pub endpoint: IpEndpoint,
}

impl Hpai {
    /// Size of an IPv4 HPAI
    pub const SIZE: usize = 8;

    /// HPAI at 0.0.0.0:0 (NAT mode).
    pub const UNSPECIFIED: Self = Self {
        endpoint: IpEndpoint::UNSPECIFIED,
    };

    /// Create a new UDP HPAI.
    pub const fn new(endpoint: IpEndpoint) -> Self {
        Self { endpoint }
    }

    /// Parse an HPAI.
    ///
    /// # Errors
    ///
    /// Fails with `UnsupportedTransport` on protocol code 0x02 (TCP); only
    /// IPv4 UDP is carried.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(KnxError::incomplete_packet());
        }
        if data[0] != Self::SIZE as u8 {
            return Err(KnxError::invalid_structure());
        }
        match data[1] {
            IPV4_UDP => {}
            IPV4_TCP => return Err(KnxError::unsupported_transport()),
            _ => return Err(KnxError::invalid_structure()),
        }

        let addr = Ipv4Addr::new(data[2], data[3], data[4], data[5]);
        let port = u16::from_be_bytes([data[6], data[7]]);

        Ok(Self {
            endpoint: IpEndpoint::new(addr, port),
        })
    }

    /// Encode into `buf`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < Self::SIZE {
            return Err(KnxError::buffer_too_small());
        }
        buf[0] = Self::SIZE as u8;
        buf[1] = IPV4_UDP;
        buf[2..6].copy_from_slice(&self.endpoint.addr.octets());
        buf[6..8].copy_from_slice(&self.endpoint.port.to_be_bytes());
        Ok(Self::SIZE)
    }
}

/// Connection Request Information (CRI)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cri {
    /// Connection type (`TUNNEL_CONNECTION` = 0x04)
    pub connection_type: u8,
    /// KNX layer (`TUNNEL_LINKLAYER` = 0x02)
    pub knx_layer: u8,
}

impl Cri {
    /// Size of the CRI structure
    pub const SIZE: usize = 4;

    /// CRI for a tunnel link-layer connection.
    pub const fn tunnel_link_layer() -> Self {
        Self {
            connection_type: TUNNEL_CONNECTION,
            knx_layer: TUNNEL_LINKLAYER,
        }
    }

    /// Parse a CRI.
    ///
    /// Tunnel and device-management connection types are accepted; anything
    /// else fails with `UnsupportedConnectionType`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(KnxError::incomplete_packet());
        }
        if data[0] != Self::SIZE as u8 {
            return Err(KnxError::invalid_structure());
        }
        let connection_type = data[1];
        if connection_type != TUNNEL_CONNECTION && connection_type != DEVICE_MGMT_CONNECTION {
            return Err(KnxError::unsupported_connection_type());
        }

        Ok(Self {
            connection_type,
            knx_layer: data[2],
        })
    }

    /// Encode into `buf`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < Self::SIZE {
            return Err(KnxError::buffer_too_small());
        }
        buf[0] = Self::SIZE as u8;
        buf[1] = self.connection_type;
        buf[2] = self.knx_layer;
        buf[3] = 0x00; // Reserved
        Ok(Self::SIZE)
    }
}

impl Default for Cri {
    fn default() -> Self {
        Self::tunnel_link_layer()
    }
}

/// Channel state pair: channel id + status byte.
///
/// Appears at the head of connect/connectionstate/disconnect bodies. In
/// requests the status byte is the reserved zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnState {
    /// Communication channel id assigned by the gateway
    pub channel_id: u8,
    /// Status code (`E_NO_ERROR` = 0)
    pub status: u8,
}

impl ConnState {
    /// Size of the structure
    pub const SIZE: usize = 2;

    /// Create a new channel state pair.
    pub const fn new(channel_id: u8, status: u8) -> Self {
        Self { channel_id, status }
    }

    /// Parse from bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(KnxError::incomplete_packet());
        }
        Ok(Self {
            channel_id: data[0],
            status: data[1],
        })
    }

    /// Encode into `buf`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < Self::SIZE {
            return Err(KnxError::buffer_too_small());
        }
        buf[0] = self.channel_id;
        buf[1] = self.status;
        Ok(Self::SIZE)
    }

    /// Whether the status byte reports success.
    pub const fn is_ok(&self) -> bool {
        self.status == E_NO_ERROR
    }
}

/// Tunneling connection header: channel id + sequence counter + status.
///
/// Prefixes every `TUNNELING_REQUEST` and `TUNNELING_ACK`. The status byte is
/// reserved (zero) in requests and carries the result code in acks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TunnState {
    /// Communication channel id
    pub channel_id: u8,
    /// 8-bit sequence counter, wrapping mod 256
    pub seq: u8,
    /// Status code (requests: reserved zero; acks: result)
    pub status: u8,
}

impl TunnState {
    /// Size of the structure
    pub const SIZE: usize = 4;

    /// Create a new tunneling connection header.
    pub const fn new(channel_id: u8, seq: u8, status: u8) -> Self {
        Self {
            channel_id,
            seq,
            status,
        }
    }

    /// Parse from bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(KnxError::incomplete_packet());
        }
        if data[0] != Self::SIZE as u8 {
            return Err(KnxError::invalid_structure());
        }
        Ok(Self {
            channel_id: data[1],
            seq: data[2],
            status: data[3],
        })
    }

    /// Encode into `buf`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < Self::SIZE {
            return Err(KnxError::buffer_too_small());
        }
        buf[0] = Self::SIZE as u8;
        buf[1] = self.channel_id;
        buf[2] = self.seq;
        buf[3] = self.status;
        Ok(Self::SIZE)
    }

    /// Whether the status byte reports success.
    pub const fn is_ok(&self) -> bool {
        self.status == E_NO_ERROR
    }
}

/// DEVICE_INFO description block (DIB), 54 bytes.
///
/// Carried in `SEARCH_RESPONSE` after the gateway's control HPAI. The stack
/// uses the physical address for discovery filtering and keeps the friendly
/// name for diagnostics; the remaining fields ride along.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceDib {
    /// KNX medium (0x02 = TP1)
    pub medium: u8,
    /// Device status bits (bit 0 = programming mode)
    pub status: u8,
    /// Physical address of the gateway
    pub address: IndividualAddress,
    /// Project installation identifier
    pub project_installation_id: u16,
    /// Serial number
    pub serial: [u8; 6],
    /// Routing multicast address
    pub routing_multicast: [u8; 4],
    /// MAC address
    pub mac: [u8; 6],
    /// Friendly name (up to 30 ASCII bytes, zero padded on the wire)
    pub name: heapless::String<30>,
}

/// DEVICE_INFO description type code
const DESCRIPTION_TYPE_DEVICE_INFO: u8 = 0x01;

impl DeviceDib {
    /// Size of the DEVICE_INFO block
    pub const SIZE: usize = 54;

    /// Parse a DEVICE_INFO block.
    ///
    /// # Errors
    ///
    /// Fails with `UnknownDescription` when the description type byte is not
    /// DEVICE_INFO.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(KnxError::incomplete_packet());
        }
        if data[0] != Self::SIZE as u8 {
            return Err(KnxError::invalid_structure());
        }
        if data[1] != DESCRIPTION_TYPE_DEVICE_INFO {
            return Err(KnxError::unknown_description());
        }

        let mut serial = [0u8; 6];
        serial.copy_from_slice(&data[8..14]);
        let mut routing_multicast = [0u8; 4];
        routing_multicast.copy_from_slice(&data[14..18]);
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&data[18..24]);

        let name_bytes = &data[24..54];
        let name_len = name_bytes.iter().position(|&b| b == 0).unwrap_or(30);
        let name_str = core::str::from_utf8(&name_bytes[..name_len])
            .map_err(|_| KnxError::invalid_structure())?;
        let mut name = heapless::String::new();
        name.push_str(name_str)
            .map_err(|_| KnxError::invalid_structure())?;

        Ok(Self {
            medium: data[2],
            status: data[3],
            address: IndividualAddress::from(u16::from_be_bytes([data[4], data[5]])),
            project_installation_id: u16::from_be_bytes([data[6], data[7]]),
            serial,
            routing_multicast,
            mac,
            name,
        })
    }

    /// Encode into `buf`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < Self::SIZE {
            return Err(KnxError::buffer_too_small());
        }
        buf[0] = Self::SIZE as u8;
        buf[1] = DESCRIPTION_TYPE_DEVICE_INFO;
        buf[2] = self.medium;
        buf[3] = self.status;
        buf[4..6].copy_from_slice(&self.address.raw().to_be_bytes());
        buf[6..8].copy_from_slice(&self.project_installation_id.to_be_bytes());
        buf[8..14].copy_from_slice(&self.serial);
        buf[14..18].copy_from_slice(&self.routing_multicast);
        buf[18..24].copy_from_slice(&self.mac);
        buf[24..54].fill(0);
        buf[24..24 + self.name.len()].copy_from_slice(self.name.as_bytes());
        Ok(Self::SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_parse() {
        let data = [
            0x06, // header length
            0x10, // protocol version
            0x02, 0x01, // service type (SEARCH_REQUEST)
            0x00, 0x0E, // total length (14 bytes)
        ];

        let header = KnxnetIpHeader::parse(&data).unwrap();
        assert_eq!(header.service_type, ServiceType::SearchRequest);
        assert_eq!(header.total_length, 14);
        assert_eq!(header.body_length(), 8);
    }

    #[test]
    fn header_rejects_bad_constants() {
        assert_eq!(
            KnxnetIpHeader::parse(&[0x05, 0x10, 0x02, 0x01, 0x00, 0x0E]),
            Err(KnxError::invalid_header())
        );
        assert_eq!(
            KnxnetIpHeader::parse(&[0x06, 0x20, 0x02, 0x01, 0x00, 0x0E]),
            Err(KnxError::unsupported_version())
        );
        assert_eq!(
            KnxnetIpHeader::parse(&[0x06, 0x10, 0x03, 0x10, 0x00, 0x0E]),
            Err(KnxError::unsupported_service_type())
        );
    }

    #[test]
    fn header_encode() {
        let header = KnxnetIpHeader::new(ServiceType::SearchRequest, 8);
        let mut buf = [0u8; 6];
        let size = header.encode(&mut buf).unwrap();

        assert_eq!(size, 6);
        assert_eq!(buf, [0x06, 0x10, 0x02, 0x01, 0x00, 0x0E]);
    }

    #[test]
    fn hpai_roundtrip() {
        let hpai = Hpai::new(IpEndpoint::from(([192, 168, 1, 10], 3671)));
        let mut buf = [0u8; 8];
        assert_eq!(hpai.encode(&mut buf).unwrap(), 8);
        assert_eq!(buf, [0x08, 0x01, 192, 168, 1, 10, 0x0E, 0x57]);
        assert_eq!(Hpai::parse(&buf).unwrap(), hpai);
    }

    #[test]
    fn hpai_rejects_tcp() {
        let data = [0x08, 0x02, 192, 168, 1, 10, 0x0E, 0x57];
        assert_eq!(Hpai::parse(&data), Err(KnxError::unsupported_transport()));
    }

    #[test]
    fn cri_roundtrip() {
        let cri = Cri::tunnel_link_layer();
        let mut buf = [0u8; 4];
        assert_eq!(cri.encode(&mut buf).unwrap(), 4);
        assert_eq!(buf, [0x04, 0x04, 0x02, 0x00]);
        assert_eq!(Cri::parse(&buf).unwrap(), cri);
    }

    #[test]
    fn cri_accepts_device_mgmt_rejects_others() {
        assert!(Cri::parse(&[0x04, 0x03, 0x02, 0x00]).is_ok());
        assert_eq!(
            Cri::parse(&[0x04, 0x06, 0x02, 0x00]),
            Err(KnxError::unsupported_connection_type())
        );
    }

    #[test]
    fn tunnstate_roundtrip() {
        let tunn = TunnState::new(7, 42, 0);
        let mut buf = [0u8; 4];
        tunn.encode(&mut buf).unwrap();
        assert_eq!(buf, [0x04, 7, 42, 0]);
        let parsed = TunnState::parse(&buf).unwrap();
        assert_eq!(parsed, tunn);
        assert!(parsed.is_ok());
    }

    fn sample_dib() -> DeviceDib {
        let mut name = heapless::String::new();
        name.push_str("test gateway").unwrap();
        DeviceDib {
            medium: 0x02,
            status: 0x00,
            address: IndividualAddress::new(1, 1, 220).unwrap(),
            project_installation_id: 0,
            serial: [0, 1, 2, 3, 4, 5],
            routing_multicast: [224, 0, 23, 12],
            mac: [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
            name,
        }
    }

    #[test]
    fn device_dib_roundtrip() {
        let dib = sample_dib();
        let mut buf = [0u8; 54];
        assert_eq!(dib.encode(&mut buf).unwrap(), 54);
        assert_eq!(buf[1], 0x01);
        let parsed = DeviceDib::parse(&buf).unwrap();
        assert_eq!(parsed, dib);
        assert_eq!(parsed.name.as_str(), "test gateway");
    }

    #[test]
    fn device_dib_rejects_unknown_description() {
        let dib = sample_dib();
        let mut buf = [0u8; 54];
        dib.encode(&mut buf).unwrap();
        buf[1] = 0x02; // supported-services DIB
        assert_eq!(
            DeviceDib::parse(&buf),
            Err(KnxError::unknown_description())
        );
    }
}
