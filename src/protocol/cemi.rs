//! Common External Message Interface (cEMI).
//!
//! The cEMI frame is the KNX telegram carried inside tunneling requests and
//! routing indications: message code, two bit-packed control bytes, source
//! and destination addresses, and the APDU. This module owns the only two
//! places in the whole protocol where bit fields cross byte boundaries (the
//! control bytes and the TPCI/APCI/data word) and expresses both as tagged
//! records with explicit shifts and masks.
//!
//! ## Frame structure
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Message Code (1 byte)                    │
//! ├──────────────────────────────────────────┤
//! │ Additional Info Length (1 byte)          │
//! ├──────────────────────────────────────────┤
//! │ Control Field 1 (1 byte)                 │
//! │ Control Field 2 (1 byte)                 │
//! │ Source Address (2 bytes)                 │
//! │ Destination Address (2 bytes)            │
//! │ APDU: length, TPCI/APCI word, data       │
//! └──────────────────────────────────────────┘
//! ```

use crate::addressing::{GroupAddress, IndividualAddress};
use crate::error::{KnxError, Result};
use crate::protocol::constants::{MessageCode, Priority};

/// Control Field 1 of an `L_Data` frame.
///
/// ```text
/// Bit 7: Frame Type (1=standard, 0=extended)
/// Bit 6: Reserved
/// Bit 5: Repeat (1=do not repeat)
/// Bit 4: System Broadcast (1=broadcast)
/// Bit 3-2: Priority (00=system, 01=normal, 10=urgent, 11=low)
/// Bit 1: Acknowledge Request
/// Bit 0: Confirm (1=error)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlField1 {
    raw: u8,
}

impl From<u8> for ControlField1 {
    #[inline(always)]
    fn from(raw: u8) -> Self {
        Self { raw }
    }
}

impl From<ControlField1> for u8 {
    #[inline(always)]
    fn from(ctrl: ControlField1) -> u8 {
        ctrl.raw
    }
}

impl ControlField1 {
    /// Create a new Control Field 1.
    pub const fn new(
        standard_frame: bool,
        do_not_repeat: bool,
        broadcast: bool,
        priority: Priority,
        ack_requested: bool,
        has_error: bool,
    ) -> Self {
        let mut raw = 0u8;
        if standard_frame {
            raw |= 0x80;
        }
        if do_not_repeat {
            raw |= 0x20;
        }
        if broadcast {
            raw |= 0x10;
        }
        raw |= (priority.to_u8() & 0x03) << 2;
        if ack_requested {
            raw |= 0x02;
        }
        if has_error {
            raw |= 0x01;
        }
        Self { raw }
    }

    /// Raw byte value.
    #[inline(always)]
    pub const fn raw(self) -> u8 {
        self.raw
    }

    /// Standard (true) vs extended (false) frame.
    #[inline(always)]
    pub const fn is_standard_frame(self) -> bool {
        (self.raw & 0x80) != 0
    }

    /// Do-not-repeat flag.
    #[inline(always)]
    pub const fn do_not_repeat(self) -> bool {
        (self.raw & 0x20) != 0
    }

    /// Broadcast flag.
    #[inline(always)]
    pub const fn is_broadcast(self) -> bool {
        (self.raw & 0x10) != 0
    }

    /// Priority bits.
    #[inline(always)]
    pub const fn priority(self) -> Priority {
        Priority::from_u8((self.raw >> 2) & 0x03)
    }

    /// Acknowledge-request flag.
    #[inline(always)]
    pub const fn ack_requested(self) -> bool {
        (self.raw & 0x02) != 0
    }

    /// Confirm-error flag.
    #[inline(always)]
    pub const fn has_error(self) -> bool {
        (self.raw & 0x01) != 0
    }

    /// Copy with the acknowledge-request bit set or cleared.
    #[inline]
    pub const fn with_ack_requested(self, ack: bool) -> Self {
        Self {
            raw: if ack { self.raw | 0x02 } else { self.raw & !0x02 },
        }
    }
}

impl Default for ControlField1 {
    /// Standard frame, do not repeat, broadcast, low priority, no ack, no
    /// error: 0b1011_1100 = 0xBC.
    #[inline]
    fn default() -> Self {
        Self { raw: 0xBC }
    }
}

/// Control Field 2 of an `L_Data` frame.
///
/// ```text
/// Bit 7: Destination Address Type (0=individual, 1=group)
/// Bit 6-4: Hop Count (0-7)
/// Bit 3-0: Extended Frame Format (0000=standard)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlField2 {
    raw: u8,
}

impl From<u8> for ControlField2 {
    #[inline(always)]
    fn from(raw: u8) -> Self {
        Self { raw }
    }
}

impl From<ControlField2> for u8 {
    #[inline(always)]
    fn from(ctrl: ControlField2) -> u8 {
        ctrl.raw
    }
}

impl ControlField2 {
    /// Create a new Control Field 2.
    pub const fn new(is_group: bool, hop_count: u8, extended_format: u8) -> Self {
        let mut raw = 0u8;
        if is_group {
            raw |= 0x80;
        }
        raw |= (hop_count & 0x07) << 4;
        raw |= extended_format & 0x0F;
        Self { raw }
    }

    /// Raw byte value.
    #[inline(always)]
    pub const fn raw(self) -> u8 {
        self.raw
    }

    /// Destination is a group address (true) or individual (false).
    #[inline(always)]
    pub const fn is_group_address(self) -> bool {
        (self.raw & 0x80) != 0
    }

    /// Hop count (0-7).
    #[inline(always)]
    pub const fn hop_count(self) -> u8 {
        (self.raw >> 4) & 0x07
    }

    /// Extended frame format bits.
    #[inline(always)]
    pub const fn extended_format(self) -> u8 {
        self.raw & 0x0F
    }
}

impl Default for ControlField2 {
    /// Group destination, hop count 6, standard format: 0b1110_0000 = 0xE0.
    #[inline]
    fn default() -> Self {
        Self { raw: 0xE0 }
    }
}

/// APCI: the 4-bit application control code inside the TPCI/APCI word.
///
/// The code space is fully enumerated, so decoding is total and matching
/// stays exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Apci {
    /// `A_GroupValue_Read`
    GroupValueRead = 0,
    /// `A_GroupValue_Response`
    GroupValueResponse = 1,
    /// `A_GroupValue_Write`
    GroupValueWrite = 2,
    /// `A_IndividualAddress_Write`
    IndividualAddressWrite = 3,
    /// `A_IndividualAddress_Read`
    IndividualAddressRead = 4,
    /// `A_IndividualAddress_Response`
    IndividualAddressResponse = 5,
    /// `A_ADC_Read`
    AdcRead = 6,
    /// `A_ADC_Response`
    AdcResponse = 7,
    /// `A_Memory_Read`
    MemoryRead = 8,
    /// `A_Memory_Response`
    MemoryResponse = 9,
    /// `A_Memory_Write`
    MemoryWrite = 10,
    /// `A_UserMessage`
    UserMessage = 11,
    /// `A_DeviceDescriptor_Read`
    DeviceDescriptorRead = 12,
    /// `A_DeviceDescriptor_Response`
    DeviceDescriptorResponse = 13,
    /// `A_Restart`
    Restart = 14,
    /// Escape to the extended APCI space
    Escape = 15,
}

impl Apci {
    /// Convert the low four bits of a value to an `Apci`.
    pub const fn from_u8(value: u8) -> Self {
        match value & 0x0F {
            0 => Self::GroupValueRead,
            1 => Self::GroupValueResponse,
            2 => Self::GroupValueWrite,
            3 => Self::IndividualAddressWrite,
            4 => Self::IndividualAddressRead,
            5 => Self::IndividualAddressResponse,
            6 => Self::AdcRead,
            7 => Self::AdcResponse,
            8 => Self::MemoryRead,
            9 => Self::MemoryResponse,
            10 => Self::MemoryWrite,
            11 => Self::UserMessage,
            12 => Self::DeviceDescriptorRead,
            13 => Self::DeviceDescriptorResponse,
            14 => Self::Restart,
            _ => Self::Escape,
        }
    }

    /// Convert to the 4-bit code.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Wire name, as surfaced in group events.
    pub const fn name(self) -> &'static str {
        match self {
            Self::GroupValueRead => "GroupValue_Read",
            Self::GroupValueResponse => "GroupValue_Response",
            Self::GroupValueWrite => "GroupValue_Write",
            Self::IndividualAddressWrite => "PhysicalAddress_Write",
            Self::IndividualAddressRead => "PhysicalAddress_Read",
            Self::IndividualAddressResponse => "PhysicalAddress_Response",
            Self::AdcRead => "ADC_Read",
            Self::AdcResponse => "ADC_Response",
            Self::MemoryRead => "Memory_Read",
            Self::MemoryResponse => "Memory_Response",
            Self::MemoryWrite => "Memory_Write",
            Self::UserMessage => "UserMessage",
            Self::DeviceDescriptorRead => "DeviceDescriptor_Read",
            Self::DeviceDescriptorResponse => "DeviceDescriptor_Response",
            Self::Restart => "Restart",
            Self::Escape => "Escape",
        }
    }
}

/// APDU payload, in one of its two wire forms.
///
/// Values of six bits or less ride inside the low bits of the TPCI/APCI word
/// itself (the whole APDU is then three bytes); anything larger follows the
/// word as plain bytes, 1 to 14 of them.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ApduPayload {
    /// A value embedded in the low six bits of the word.
    Small(u8),
    /// Payload bytes following the word.
    Bytes(heapless::Vec<u8, 14>),
}

impl ApduPayload {
    /// Payload as a byte slice. A `Small` value reads as one byte.
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Small(v) => core::slice::from_ref(v),
            Self::Bytes(b) => b,
        }
    }

    /// Payload width in bits.
    pub fn bit_length(&self) -> usize {
        match self {
            Self::Small(_) => 6,
            Self::Bytes(b) => b.len() * 8,
        }
    }

    /// Build from raw bytes and a bit width, choosing the wire form.
    pub fn from_bits(data: &[u8], bit_length: usize) -> Result<Self> {
        if bit_length <= 6 {
            match data {
                [v] if *v <= 0x3F => Ok(Self::Small(*v)),
                _ => Err(KnxError::payload_not_encodable()),
            }
        } else {
            if data.is_empty() || data.len() > 14 {
                return Err(KnxError::bad_apdu_length());
            }
            Ok(Self::Bytes(
                heapless::Vec::from_slice(data).map_err(|_| KnxError::bad_apdu_length())?,
            ))
        }
    }
}

/// Application Protocol Data Unit.
///
/// On the wire: a length byte `L`, then `L + 1` further bytes, the first two
/// of which are the bit-packed word `tpci(6) | apci(4) | data(6)`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Apdu {
    /// Transport control bits (6 bits; 0 for unnumbered data)
    pub tpci: u8,
    /// Application control code
    pub apci: Apci,
    /// Payload
    pub payload: ApduPayload,
}

impl Apdu {
    /// Smallest encoded APDU (L=1): length byte plus the word.
    pub const MIN_SIZE: usize = 3;
    /// Largest encoded APDU (L=15): word plus 14 payload bytes.
    pub const MAX_SIZE: usize = 17;

    /// Create an APDU with an unnumbered-data TPCI.
    pub const fn new(apci: Apci, payload: ApduPayload) -> Self {
        Self {
            tpci: 0,
            apci,
            payload,
        }
    }

    /// Encoded size in bytes.
    pub fn length(&self) -> usize {
        match &self.payload {
            ApduPayload::Small(_) => Self::MIN_SIZE,
            ApduPayload::Bytes(b) => 3 + b.len(),
        }
    }

    /// Parse an APDU, returning the value and the bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        if data.is_empty() {
            return Err(KnxError::incomplete_packet());
        }
        let l = data[0] as usize;
        if l == 0 || l > 15 {
            return Err(KnxError::bad_apdu_length());
        }
        // L counts the word's second byte plus the trailing payload
        let total = l + 2;
        if data.len() < total {
            return Err(KnxError::incomplete_packet());
        }

        let word = u16::from_be_bytes([data[1], data[2]]);
        let tpci = (word >> 10) as u8;
        let apci = Apci::from_u8(((word >> 6) & 0x0F) as u8);
        let payload = if l == 1 {
            ApduPayload::Small((word & 0x3F) as u8)
        } else {
            ApduPayload::Bytes(
                heapless::Vec::from_slice(&data[3..total])
                    .map_err(|_| KnxError::bad_apdu_length())?,
            )
        };

        Ok((
            Self {
                tpci,
                apci,
                payload,
            },
            total,
        ))
    }

    /// Encode into `buf`, returning the bytes written.
    ///
    /// # Errors
    ///
    /// Fails when a `Small` payload exceeds six bits or a `Bytes` payload is
    /// empty (the encoded APDU would leave the 3..=17 byte window).
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let total = self.length();
        if buf.len() < total {
            return Err(KnxError::buffer_too_small());
        }

        let word_base = (u16::from(self.tpci & 0x3F) << 10) | (u16::from(self.apci.to_u8()) << 6);
        match &self.payload {
            ApduPayload::Small(v) => {
                if *v > 0x3F {
                    return Err(KnxError::payload_not_encodable());
                }
                buf[0] = 1;
                buf[1..3].copy_from_slice(&(word_base | u16::from(*v)).to_be_bytes());
            }
            ApduPayload::Bytes(b) => {
                if b.is_empty() {
                    return Err(KnxError::bad_apdu_length());
                }
                buf[0] = 1 + b.len() as u8;
                buf[1..3].copy_from_slice(&word_base.to_be_bytes());
                buf[3..3 + b.len()].copy_from_slice(b);
            }
        }
        Ok(total)
    }
}

/// cEMI frame.
///
/// An owned value so the datagram builder can fill in destination, APCI and
/// payload after constructing the skeleton. Message codes outside the
/// `L_Data` family carry the fixed head only (`apdu` is `None`).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CemiFrame {
    /// cEMI message code
    pub msg_code: MessageCode,
    /// Control field 1
    pub ctrl1: ControlField1,
    /// Control field 2
    pub ctrl2: ControlField2,
    /// Source address (always individual)
    pub source: IndividualAddress,
    /// Destination address; its type is named by `ctrl2`
    pub dest: u16,
    /// APDU, present for `L_Data` message codes
    pub apdu: Option<Apdu>,
}

impl CemiFrame {
    /// Fixed head: message code, add-info length, two control bytes, source
    /// and destination addresses.
    pub const HEAD_SIZE: usize = 8;

    /// Encoded size in bytes.
    pub fn length(&self) -> usize {
        Self::HEAD_SIZE + self.apdu.as_ref().map_or(0, Apdu::length)
    }

    /// Destination as a group address, when `ctrl2` says so.
    #[inline]
    pub fn dest_group(&self) -> Option<GroupAddress> {
        self.ctrl2
            .is_group_address()
            .then(|| GroupAddress::from(self.dest))
    }

    /// Destination as an individual address, when `ctrl2` says so.
    #[inline]
    pub fn dest_individual(&self) -> Option<IndividualAddress> {
        (!self.ctrl2.is_group_address()).then(|| IndividualAddress::from(self.dest))
    }

    /// Parse a cEMI frame, returning the value and the bytes consumed.
    ///
    /// Additional-info bytes are skipped. `L_Data` codes must carry a parsable
    /// APDU; other codes stop after the fixed head.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 2 {
            return Err(KnxError::incomplete_packet());
        }
        let msg_code =
            MessageCode::from_u8(data[0]).ok_or_else(KnxError::invalid_message_code)?;
        let add_info_len = data[1] as usize;

        let head = 2 + add_info_len;
        if data.len() < head + 6 {
            return Err(KnxError::incomplete_packet());
        }
        let ctrl1 = ControlField1::from(data[head]);
        let ctrl2 = ControlField2::from(data[head + 1]);
        let source = IndividualAddress::from(u16::from_be_bytes([data[head + 2], data[head + 3]]));
        let dest = u16::from_be_bytes([data[head + 4], data[head + 5]]);
        let mut consumed = head + 6;

        let apdu = if msg_code.is_ldata() {
            let (apdu, n) = Apdu::parse(&data[consumed..])?;
            consumed += n;
            Some(apdu)
        } else {
            None
        };

        Ok((
            Self {
                msg_code,
                ctrl1,
                ctrl2,
                source,
                dest,
                apdu,
            },
            consumed,
        ))
    }

    /// Encode into `buf`, returning the bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < self.length() {
            return Err(KnxError::buffer_too_small());
        }
        buf[0] = self.msg_code.to_u8();
        buf[1] = 0x00; // no additional info
        buf[2] = self.ctrl1.raw();
        buf[3] = self.ctrl2.raw();
        buf[4..6].copy_from_slice(&self.source.raw().to_be_bytes());
        buf[6..8].copy_from_slice(&self.dest.to_be_bytes());

        let mut offset = Self::HEAD_SIZE;
        if let Some(apdu) = &self.apdu {
            offset += apdu.encode(&mut buf[offset..])?;
        }
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_field1_bits() {
        let ctrl = ControlField1::new(true, true, true, Priority::Low, false, false);
        assert_eq!(ctrl.raw(), 0xBC);
        assert!(ctrl.is_standard_frame());
        assert!(ctrl.do_not_repeat());
        assert!(ctrl.is_broadcast());
        assert_eq!(ctrl.priority(), Priority::Low);
        assert!(!ctrl.ack_requested());
        assert!(!ctrl.has_error());
    }

    #[test]
    fn control_field1_default_matches_builder_skeleton() {
        assert_eq!(ControlField1::default().raw(), 0xBC);
    }

    #[test]
    fn control_field1_ack_toggle() {
        let ctrl = ControlField1::default().with_ack_requested(true);
        assert_eq!(ctrl.raw(), 0xBE);
        assert!(ctrl.ack_requested());
        assert_eq!(ctrl.with_ack_requested(false), ControlField1::default());
    }

    #[test]
    fn control_field2_bits() {
        let ctrl = ControlField2::default();
        assert_eq!(ctrl.raw(), 0xE0);
        assert!(ctrl.is_group_address());
        assert_eq!(ctrl.hop_count(), 6);
        assert_eq!(ctrl.extended_format(), 0);

        let individual = ControlField2::new(false, 5, 0);
        assert!(!individual.is_group_address());
        assert_eq!(individual.hop_count(), 5);
    }

    #[test]
    fn apci_code_roundtrip() {
        for code in 0u8..=15 {
            assert_eq!(Apci::from_u8(code).to_u8(), code);
        }
        assert_eq!(Apci::from_u8(2), Apci::GroupValueWrite);
        assert_eq!(Apci::GroupValueResponse.name(), "GroupValue_Response");
    }

    #[test]
    fn apdu_small_payload_is_three_bytes() {
        let apdu = Apdu::new(Apci::GroupValueWrite, ApduPayload::Small(0x01));
        let mut buf = [0u8; 17];
        let n = apdu.encode(&mut buf).unwrap();
        assert_eq!(n, 3);
        // word = tpci(0)<<10 | apci(2)<<6 | 0x01 = 0x0081
        assert_eq!(&buf[..3], &[0x01, 0x00, 0x81]);

        let (parsed, consumed) = Apdu::parse(&buf[..3]).unwrap();
        assert_eq!(consumed, 3);
        assert_eq!(parsed, apdu);
    }

    #[test]
    fn apdu_small_roundtrip_full_range() {
        for v in 0u8..=0x3F {
            let apdu = Apdu::new(Apci::GroupValueResponse, ApduPayload::Small(v));
            let mut buf = [0u8; 3];
            apdu.encode(&mut buf).unwrap();
            let (parsed, _) = Apdu::parse(&buf).unwrap();
            assert_eq!(parsed.payload, ApduPayload::Small(v));
        }
    }

    #[test]
    fn apdu_long_payload_14_bytes_is_17() {
        let payload: heapless::Vec<u8, 14> =
            heapless::Vec::from_slice(&[0xAB; 14]).unwrap();
        let apdu = Apdu::new(Apci::GroupValueWrite, ApduPayload::Bytes(payload));
        let mut buf = [0u8; 17];
        let n = apdu.encode(&mut buf).unwrap();
        assert_eq!(n, Apdu::MAX_SIZE);
        assert_eq!(buf[0], 15);

        let (parsed, consumed) = Apdu::parse(&buf).unwrap();
        assert_eq!(consumed, 17);
        assert_eq!(parsed, apdu);
    }

    #[test]
    fn apdu_rejects_bad_lengths() {
        // L = 0 on the wire
        assert_eq!(
            Apdu::parse(&[0x00, 0x00, 0x80]),
            Err(KnxError::bad_apdu_length())
        );
        // L = 16 on the wire
        let mut oversize = [0u8; 18];
        oversize[0] = 16;
        assert_eq!(Apdu::parse(&oversize), Err(KnxError::bad_apdu_length()));
        // empty long payload on encode
        let apdu = Apdu::new(
            Apci::GroupValueWrite,
            ApduPayload::Bytes(heapless::Vec::new()),
        );
        assert_eq!(
            apdu.encode(&mut [0u8; 17]),
            Err(KnxError::bad_apdu_length())
        );
        // 15-byte payloads cannot even be constructed
        assert!(ApduPayload::from_bits(&[0u8; 15], 120).is_err());
    }

    #[test]
    fn apdu_rejects_oversized_small_value() {
        let apdu = Apdu::new(Apci::GroupValueWrite, ApduPayload::Small(0x40));
        assert_eq!(
            apdu.encode(&mut [0u8; 3]),
            Err(KnxError::payload_not_encodable())
        );
        assert!(ApduPayload::from_bits(&[0x40], 6).is_err());
    }

    #[test]
    fn payload_from_bits_selects_form() {
        assert_eq!(
            ApduPayload::from_bits(&[0x01], 1).unwrap(),
            ApduPayload::Small(0x01)
        );
        assert!(matches!(
            ApduPayload::from_bits(&[0x42], 8).unwrap(),
            ApduPayload::Bytes(_)
        ));
        assert_eq!(ApduPayload::Small(9).as_slice(), &[9]);
    }

    #[test]
    fn cemi_group_write_roundtrip() {
        let cemi = CemiFrame {
            msg_code: MessageCode::LDataReq,
            ctrl1: ControlField1::default(),
            ctrl2: ControlField2::default(),
            source: IndividualAddress::new(15, 15, 15).unwrap(),
            dest: GroupAddress::new(1, 2, 3).unwrap().raw(),
            apdu: Some(Apdu::new(Apci::GroupValueWrite, ApduPayload::Small(1))),
        };

        let mut buf = [0u8; 64];
        let n = cemi.encode(&mut buf).unwrap();
        assert_eq!(n, cemi.length());
        assert_eq!(n, 11);
        assert_eq!(buf[0], 0x11); // L_Data.req
        assert_eq!(buf[2], 0xBC);
        assert_eq!(buf[3], 0xE0);

        let (parsed, consumed) = CemiFrame::parse(&buf[..n]).unwrap();
        assert_eq!(consumed, n);
        assert_eq!(parsed, cemi);
        assert_eq!(
            parsed.dest_group(),
            Some(GroupAddress::new(1, 2, 3).unwrap())
        );
        assert_eq!(parsed.dest_individual(), None);
    }

    #[test]
    fn cemi_skips_additional_info() {
        let data = [
            0x29, // L_Data.ind
            0x04, // add info length
            0x01, 0x02, 0x03, 0x04, // additional info
            0xBC, 0xE0, // control fields
            0x11, 0x01, // source 1.1.1
            0x0A, 0x03, // dest 1/2/3
            0x01, 0x00, 0x80, // APDU: GroupValue_Write, data 0
        ];
        let (cemi, consumed) = CemiFrame::parse(&data).unwrap();
        assert_eq!(consumed, data.len());
        assert_eq!(cemi.msg_code, MessageCode::LDataInd);
        assert_eq!(cemi.apdu.unwrap().apci, Apci::GroupValueWrite);
    }

    #[test]
    fn cemi_non_ldata_parses_head_only() {
        let data = [
            0x2B, // L_Busmon.ind
            0x00, 0xBC, 0xE0, 0x11, 0x01, 0x0A, 0x03,
        ];
        let (cemi, consumed) = CemiFrame::parse(&data).unwrap();
        assert_eq!(consumed, 8);
        assert!(cemi.apdu.is_none());
    }

    #[test]
    fn cemi_rejects_unknown_message_code() {
        assert_eq!(
            CemiFrame::parse(&[0xFF, 0x00]).unwrap_err(),
            KnxError::invalid_message_code()
        );
    }
}
