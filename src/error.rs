//! Error types for KNXnet/IP operations.
//!
//! Errors are grouped by category so callers can match on the broad class
//! (frame codec, connection lifecycle, transport, addressing, datapoint) and
//! drill into the kind only when they care. All kinds are plain `Copy` enums,
//! which keeps errors usable from `const fn` constructors and comparable in
//! tests.

use core::fmt;

/// Result type alias for KNX operations.
pub type Result<T> = core::result::Result<T, KnxError>;

/// Frame codec error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameErrorKind {
    /// Buffer ends before `total_length` is reached.
    IncompletePacket,
    /// Header length or constant bytes are wrong.
    InvalidHeader,
    /// Protocol version is not 0x10.
    UnsupportedVersion,
    /// Service type identifier is not one the stack recognises.
    UnsupportedServiceType,
    /// HPAI carries a host protocol other than IPv4 UDP (TCP is rejected).
    UnsupportedTransport,
    /// CRI carries a connection type other than tunnel or device management.
    UnsupportedConnectionType,
    /// DIB description type is not DEVICE_INFO.
    UnknownDescription,
    /// cEMI message code is not defined.
    InvalidMessageCode,
    /// APDU length byte is outside the 1..=15 window.
    BadApduLength,
    /// APDU payload is neither a 6-bit value nor a 1–14 byte buffer.
    PayloadNotEncodable,
    /// Output buffer too small for the encoded structure.
    BufferTooSmall,
    /// A length-prefixed sub-structure is malformed.
    InvalidStructure,
}

/// Connection lifecycle error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionErrorKind {
    /// Gateway refused the connection.
    Refused,
    /// Gateway reported E_NO_MORE_CONNECTIONS.
    NoMoreConnections,
    /// A lifecycle step timed out.
    Timeout,
    /// Connection was lost (heartbeat or ack failure).
    Lost,
    /// Operation requires an established tunnel.
    NotConnected,
    /// Deferred request queue is full.
    QueueFull,
}

/// Transport error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportErrorKind {
    BindFailed,
    SendFailed,
    ReceiveFailed,
    MulticastJoinFailed,
}

/// Addressing error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressingErrorKind {
    /// A component exceeds its bit width.
    OutOfRange,
    /// Text form does not match the expected shape.
    Malformed,
}

/// Datapoint type error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DptErrorKind {
    ValueOutOfRange,
    InvalidData,
}

/// KNX protocol error.
///
/// The main error type returned by all operations in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KnxError {
    /// Frame codec errors (parsing, encoding).
    Frame(FrameErrorKind),
    /// Connection lifecycle errors.
    Connection(ConnectionErrorKind),
    /// Transport errors (socket send/receive/bind).
    Transport(TransportErrorKind),
    /// Address parsing/formatting errors.
    Addressing(AddressingErrorKind),
    /// Datapoint encode/decode errors.
    Dpt(DptErrorKind),
    /// A caller-facing operation timed out.
    Timeout,
}

impl KnxError {
    // Frame codec

    #[inline]
    pub(crate) const fn incomplete_packet() -> Self {
        Self::Frame(FrameErrorKind::IncompletePacket)
    }

    #[inline]
    pub(crate) const fn invalid_header() -> Self {
        Self::Frame(FrameErrorKind::InvalidHeader)
    }

    #[inline]
    pub(crate) const fn unsupported_version() -> Self {
        Self::Frame(FrameErrorKind::UnsupportedVersion)
    }

    #[inline]
    pub(crate) const fn unsupported_service_type() -> Self {
        Self::Frame(FrameErrorKind::UnsupportedServiceType)
    }

    #[inline]
    pub(crate) const fn unsupported_transport() -> Self {
        Self::Frame(FrameErrorKind::UnsupportedTransport)
    }

    #[inline]
    pub(crate) const fn unsupported_connection_type() -> Self {
        Self::Frame(FrameErrorKind::UnsupportedConnectionType)
    }

    #[inline]
    pub(crate) const fn unknown_description() -> Self {
        Self::Frame(FrameErrorKind::UnknownDescription)
    }

    #[inline]
    pub(crate) const fn invalid_message_code() -> Self {
        Self::Frame(FrameErrorKind::InvalidMessageCode)
    }

    #[inline]
    pub(crate) const fn bad_apdu_length() -> Self {
        Self::Frame(FrameErrorKind::BadApduLength)
    }

    #[inline]
    pub(crate) const fn payload_not_encodable() -> Self {
        Self::Frame(FrameErrorKind::PayloadNotEncodable)
    }

    #[inline]
    pub(crate) const fn buffer_too_small() -> Self {
        Self::Frame(FrameErrorKind::BufferTooSmall)
    }

    #[inline]
    pub(crate) const fn invalid_structure() -> Self {
        Self::Frame(FrameErrorKind::InvalidStructure)
    }

    // Connection lifecycle

    #[inline]
    pub(crate) const fn connection_refused() -> Self {
        Self::Connection(ConnectionErrorKind::Refused)
    }

    #[inline]
    pub(crate) const fn no_more_connections() -> Self {
        Self::Connection(ConnectionErrorKind::NoMoreConnections)
    }

    #[inline]
    pub(crate) const fn connection_timeout() -> Self {
        Self::Connection(ConnectionErrorKind::Timeout)
    }

    #[inline]
    pub(crate) const fn connection_lost() -> Self {
        Self::Connection(ConnectionErrorKind::Lost)
    }

    #[inline]
    pub(crate) const fn not_connected() -> Self {
        Self::Connection(ConnectionErrorKind::NotConnected)
    }

    #[inline]
    pub(crate) const fn queue_full() -> Self {
        Self::Connection(ConnectionErrorKind::QueueFull)
    }

    // Transport

    #[inline]
    pub(crate) const fn bind_failed() -> Self {
        Self::Transport(TransportErrorKind::BindFailed)
    }

    #[inline]
    pub(crate) const fn send_failed() -> Self {
        Self::Transport(TransportErrorKind::SendFailed)
    }

    #[inline]
    pub(crate) const fn receive_failed() -> Self {
        Self::Transport(TransportErrorKind::ReceiveFailed)
    }

    #[inline]
    pub(crate) const fn multicast_join_failed() -> Self {
        Self::Transport(TransportErrorKind::MulticastJoinFailed)
    }

    // Addressing

    #[inline]
    pub(crate) const fn address_out_of_range() -> Self {
        Self::Addressing(AddressingErrorKind::OutOfRange)
    }

    #[inline]
    pub(crate) const fn malformed_address() -> Self {
        Self::Addressing(AddressingErrorKind::Malformed)
    }

    // Datapoint

    #[inline]
    pub(crate) const fn dpt_value_out_of_range() -> Self {
        Self::Dpt(DptErrorKind::ValueOutOfRange)
    }

    #[inline]
    pub(crate) const fn invalid_dpt_data() -> Self {
        Self::Dpt(DptErrorKind::InvalidData)
    }

    /// Whether this error came out of the frame codec.
    ///
    /// Codec errors are non-fatal by policy: the offending datagram is logged
    /// and dropped.
    pub const fn is_frame_error(&self) -> bool {
        matches!(self, Self::Frame(_))
    }

    /// Whether this error is a timeout (per-call or lifecycle).
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection(ConnectionErrorKind::Timeout)
        )
    }
}

impl fmt::Display for KnxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnxError::Frame(kind) => write!(f, "frame error: {kind:?}"),
            KnxError::Connection(kind) => write!(f, "connection error: {kind:?}"),
            KnxError::Transport(kind) => write!(f, "transport error: {kind:?}"),
            KnxError::Addressing(kind) => write!(f, "addressing error: {kind:?}"),
            KnxError::Dpt(kind) => write!(f, "DPT error: {kind:?}"),
            KnxError::Timeout => write!(f, "operation timeout"),
        }
    }
}

#[cfg(any(test, feature = "std"))]
impl std::error::Error for KnxError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_compare_by_kind() {
        assert_eq!(KnxError::incomplete_packet(), KnxError::incomplete_packet());
        assert_ne!(KnxError::incomplete_packet(), KnxError::invalid_header());
        assert!(KnxError::unsupported_transport().is_frame_error());
        assert!(!KnxError::connection_lost().is_frame_error());
    }

    #[test]
    fn timeout_predicate_covers_both_forms() {
        assert!(KnxError::Timeout.is_timeout());
        assert!(KnxError::connection_timeout().is_timeout());
        assert!(!KnxError::send_failed().is_timeout());
    }
}
