//! KNXnet/IP protocol implementation.
//!
//! The codec is layered the way the wire format is: [`frame`] holds the
//! header and the fixed-size sub-structures (HPAI, CRI, connection state,
//! device DIB), [`cemi`] holds the KNX telegram body with its bit-packed
//! control fields and APDU, and [`datagram`] ties both together into the
//! service-typed [`datagram::Datagram`] value the connection machine works
//! with.

pub mod cemi;
pub mod constants;
pub mod datagram;
pub mod frame;
