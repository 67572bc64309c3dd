//! KNX Datapoint Types (DPT).
//!
//! DPTs define how the payload bytes of a group telegram are interpreted.
//! The connection machine treats payloads as opaque; this module is the
//! collaborator that encodes typed values into APDU payloads and back.
//!
//! Supported families:
//! - **DPT 1.xxx** - boolean (1 bit): switches, enables
//! - **DPT 5.xxx** - 8-bit unsigned: percentages, angles, counters
//! - **DPT 9.xxx** - 2-byte float: temperature, humidity, illuminance

use crate::error::Result;
use crate::protocol::cemi::ApduPayload;

pub mod dpt1;
pub mod dpt5;
pub mod dpt9;

#[doc(inline)]
pub use dpt1::Dpt1;
#[doc(inline)]
pub use dpt5::Dpt5;
#[doc(inline)]
pub use dpt9::Dpt9;

/// Encoding of a typed value into KNX payload bytes.
///
/// Implementations write into the caller's buffer and report the number of
/// bytes produced.
pub trait DptEncode<T> {
    /// Encode `value` into `buf`, returning the bytes written.
    fn encode(&self, value: T, buf: &mut [u8]) -> Result<usize>;
}

/// Decoding of KNX payload bytes into a typed value.
pub trait DptDecode<T> {
    /// Decode a value from `data`.
    fn decode(&self, data: &[u8]) -> Result<T>;
}

/// A typed group value, ready to be written to the bus.
///
/// This is the value-level surface of the client API: each variant knows its
/// datapoint encoding and the APDU wire form it belongs in.
///
/// ```
/// use knx_link::dpt::KnxValue;
///
/// let payload = KnxValue::Switch(true).to_payload().unwrap();
/// assert_eq!(payload.as_slice(), &[0x01]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KnxValue {
    /// DPT 1.001 switch
    Switch(bool),
    /// DPT 5.001 percentage, 0-100 %
    Percent(u8),
    /// DPT 5.010 unsigned counter, 0-255
    Unsigned(u8),
    /// DPT 9.001 temperature in °C
    Temperature(f32),
}

impl KnxValue {
    /// Encode into the APDU payload form this value travels in.
    pub fn to_payload(&self) -> Result<ApduPayload> {
        let mut buf = [0u8; 2];
        match self {
            // One bit rides in the 6-bit embedded form.
            KnxValue::Switch(on) => Ok(ApduPayload::Small(u8::from(*on))),
            KnxValue::Percent(pct) => {
                let n = Dpt5::Percentage.encode(*pct, &mut buf)?;
                ApduPayload::from_bits(&buf[..n], 8)
            }
            KnxValue::Unsigned(value) => {
                let n = Dpt5::Unsigned.encode(*value, &mut buf)?;
                ApduPayload::from_bits(&buf[..n], 8)
            }
            KnxValue::Temperature(celsius) => {
                let n = Dpt9::Temperature.encode(*celsius, &mut buf)?;
                ApduPayload::from_bits(&buf[..n], 16)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_uses_embedded_form() {
        assert_eq!(
            KnxValue::Switch(true).to_payload().unwrap(),
            ApduPayload::Small(1)
        );
        assert_eq!(
            KnxValue::Switch(false).to_payload().unwrap(),
            ApduPayload::Small(0)
        );
    }

    #[test]
    fn percent_scales_to_byte() {
        let payload = KnxValue::Percent(100).to_payload().unwrap();
        assert_eq!(payload.as_slice(), &[255]);
        assert!(KnxValue::Percent(101).to_payload().is_err());
    }

    #[test]
    fn temperature_is_two_bytes() {
        let payload = KnxValue::Temperature(21.5).to_payload().unwrap();
        assert_eq!(payload.as_slice().len(), 2);
    }
}
