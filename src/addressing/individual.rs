//! KNX individual (physical) address.
//!
//! Individual addresses identify devices: `area.line.device` with 4/4/8 bits.

use crate::error::{KnxError, Result};
use core::fmt;

/// KNX individual address (`area.line.device`).
///
/// # Examples
///
/// ```
/// use knx_link::IndividualAddress;
///
/// let addr = IndividualAddress::new(1, 1, 220).unwrap();
/// assert_eq!(addr.to_string(), "1.1.220");
/// assert_eq!(addr.raw(), 0x11DC);
///
/// let parsed: IndividualAddress = "15.15.15".parse().unwrap();
/// assert_eq!(parsed.raw(), 0xFF0F);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndividualAddress {
    raw: u16,
}

impl IndividualAddress {
    /// Maximum area value (4 bits).
    pub const MAX_AREA: u8 = 15;
    /// Maximum line value (4 bits).
    pub const MAX_LINE: u8 = 15;

    /// Create from components.
    pub fn new(area: u8, line: u8, device: u8) -> Result<Self> {
        if area > Self::MAX_AREA || line > Self::MAX_LINE {
            return Err(KnxError::address_out_of_range());
        }
        Ok(Self {
            raw: (u16::from(area) << 12) | (u16::from(line) << 8) | u16::from(device),
        })
    }

    /// Raw 16-bit on-wire form.
    #[inline(always)]
    pub const fn raw(self) -> u16 {
        self.raw
    }

    /// Area component (0-15).
    #[inline(always)]
    pub const fn area(self) -> u8 {
        ((self.raw >> 12) & 0x0F) as u8
    }

    /// Line component (0-15).
    #[inline(always)]
    pub const fn line(self) -> u8 {
        ((self.raw >> 8) & 0x0F) as u8
    }

    /// Device component (0-255).
    #[inline(always)]
    pub const fn device(self) -> u8 {
        (self.raw & 0xFF) as u8
    }

    /// Format as `area.line.device`.
    pub fn format(self) -> heapless::String<16> {
        use core::fmt::Write;
        let mut s = heapless::String::new();
        let _ = write!(s, "{}.{}.{}", self.area(), self.line(), self.device());
        s
    }

    /// Encode big-endian into `buf`.
    #[inline]
    pub fn encode(self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < 2 {
            return Err(KnxError::buffer_too_small());
        }
        buf[0..2].copy_from_slice(&self.raw.to_be_bytes());
        Ok(2)
    }

    /// Decode big-endian from `buf`.
    #[inline]
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 2 {
            return Err(KnxError::buffer_too_small());
        }
        Ok(Self {
            raw: u16::from_be_bytes([buf[0], buf[1]]),
        })
    }
}

impl From<u16> for IndividualAddress {
    #[inline(always)]
    fn from(raw: u16) -> Self {
        Self { raw }
    }
}

impl From<IndividualAddress> for u16 {
    #[inline(always)]
    fn from(addr: IndividualAddress) -> u16 {
        addr.raw
    }
}

impl fmt::Display for IndividualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.area(), self.line(), self.device())
    }
}

impl core::str::FromStr for IndividualAddress {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('.');
        let mut component = || -> Result<u8> {
            parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(KnxError::malformed_address)
        };
        let area = component()?;
        let line = component()?;
        let device = component()?;
        if parts.next().is_some() {
            return Err(KnxError::malformed_address());
        }
        Self::new(area, line, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components() {
        let addr = IndividualAddress::new(1, 1, 250).unwrap();
        assert_eq!(addr.area(), 1);
        assert_eq!(addr.line(), 1);
        assert_eq!(addr.device(), 250);
        assert_eq!(addr.raw(), 0x11FA);
    }

    #[test]
    fn range_checks() {
        assert!(IndividualAddress::new(16, 0, 0).is_err());
        assert!(IndividualAddress::new(0, 16, 0).is_err());
        assert!(IndividualAddress::new(15, 15, 255).is_ok());
    }

    #[test]
    fn parse_format_roundtrip() {
        for text in ["0.0.0", "1.1.220", "15.15.15", "3.7.42"] {
            let addr: IndividualAddress = text.parse().unwrap();
            assert_eq!(addr.format().as_str(), text);
        }
    }

    #[test]
    fn raw_roundtrip_sample() {
        for raw in (0u16..=u16::MAX).step_by(509) {
            let addr = IndividualAddress::from(raw);
            let reparsed: IndividualAddress = addr.format().as_str().parse().unwrap();
            assert_eq!(reparsed, addr);
        }
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!("1.1".parse::<IndividualAddress>().is_err());
        assert!("1.1.1.1".parse::<IndividualAddress>().is_err());
        assert!("1/1/1".parse::<IndividualAddress>().is_err());
        assert!("16.0.0".parse::<IndividualAddress>().is_err());
        assert!("".parse::<IndividualAddress>().is_err());
    }

    #[test]
    fn encode_decode() {
        let addr = IndividualAddress::new(2, 3, 4).unwrap();
        let mut buf = [0u8; 2];
        addr.encode(&mut buf).unwrap();
        assert_eq!(IndividualAddress::decode(&buf).unwrap(), addr);
    }
}
