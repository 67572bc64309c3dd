//! KNX group address.
//!
//! Group addresses name datapoints on the bus. Two textual layouts exist for
//! the same 16 bits:
//! - 3-level `main/middle/sub` (5/3/8 bits), the common form
//! - 2-level `main/sub` (5/11 bits)
//!
//! Which layout a project uses is a per-installation choice, so parsing and
//! formatting take it as an explicit argument instead of consulting shared
//! state.

use crate::error::{KnxError, Result};
use core::fmt;

/// KNX group address.
///
/// # Examples
///
/// ```
/// use knx_link::GroupAddress;
///
/// let addr = GroupAddress::new(1, 2, 3).unwrap();
/// assert_eq!(addr.raw(), 0x0A03);
/// assert_eq!(addr.to_string(), "1/2/3");
///
/// let same = GroupAddress::parse("1/2/3", false).unwrap();
/// assert_eq!(addr, same);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupAddress {
    raw: u16,
}

impl GroupAddress {
    /// Maximum main group value (5 bits).
    pub const MAX_MAIN: u8 = 31;
    /// Maximum middle group value (3 bits).
    pub const MAX_MIDDLE: u8 = 7;
    /// Maximum sub group value in 2-level form (11 bits).
    pub const MAX_SUB_2LEVEL: u16 = 2047;

    /// Create a 3-level group address (main/middle/sub).
    pub fn new(main: u8, middle: u8, sub: u8) -> Result<Self> {
        if main > Self::MAX_MAIN || middle > Self::MAX_MIDDLE {
            return Err(KnxError::address_out_of_range());
        }
        Ok(Self {
            raw: (u16::from(main) << 11) | (u16::from(middle) << 8) | u16::from(sub),
        })
    }

    /// Create a 2-level group address (main/sub).
    pub fn new_2level(main: u8, sub: u16) -> Result<Self> {
        if main > Self::MAX_MAIN || sub > Self::MAX_SUB_2LEVEL {
            return Err(KnxError::address_out_of_range());
        }
        Ok(Self {
            raw: (u16::from(main) << 11) | sub,
        })
    }

    /// Parse from text, in 2-level form when `two_level` is set, 3-level
    /// otherwise.
    pub fn parse(text: &str, two_level: bool) -> Result<Self> {
        let mut parts = text.split('/');
        let main: u8 = next_component(&mut parts)?;

        let addr = if two_level {
            let sub: u16 = next_component(&mut parts)?;
            Self::new_2level(main, sub)?
        } else {
            let middle: u8 = next_component(&mut parts)?;
            let sub: u8 = next_component(&mut parts)?;
            Self::new(main, middle, sub)?
        };

        if parts.next().is_some() {
            return Err(KnxError::malformed_address());
        }
        Ok(addr)
    }

    /// Raw 16-bit on-wire form.
    #[inline(always)]
    pub const fn raw(self) -> u16 {
        self.raw
    }

    /// Main group (0-31).
    #[inline(always)]
    pub const fn main(self) -> u8 {
        ((self.raw >> 11) & 0x1F) as u8
    }

    /// Middle group in 3-level form (0-7).
    #[inline(always)]
    pub const fn middle(self) -> u8 {
        ((self.raw >> 8) & 0x07) as u8
    }

    /// Sub group in 3-level form (0-255).
    #[inline(always)]
    pub const fn sub(self) -> u8 {
        (self.raw & 0xFF) as u8
    }

    /// Sub group in 2-level form (0-2047).
    #[inline(always)]
    pub const fn sub_2level(self) -> u16 {
        self.raw & 0x07FF
    }

    /// Format as text, 2-level when `two_level` is set, 3-level otherwise.
    pub fn format(self, two_level: bool) -> heapless::String<16> {
        use core::fmt::Write;
        let mut s = heapless::String::new();
        if two_level {
            let _ = write!(s, "{}/{}", self.main(), self.sub_2level());
        } else {
            let _ = write!(s, "{}/{}/{}", self.main(), self.middle(), self.sub());
        }
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

fn next_component<T: core::str::FromStr>(parts: &mut core::str::Split<'_, char>) -> Result<T> {
    parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(KnxError::malformed_address)
}

impl From<u16> for GroupAddress {
    #[inline(always)]
    fn from(raw: u16) -> Self {
        Self { raw }
    }
}

impl From<GroupAddress> for u16 {
    #[inline(always)]
    fn from(addr: GroupAddress) -> u16 {
        addr.raw
    }
}

impl fmt::Display for GroupAddress {
    /// 3-level form by default.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.main(), self.middle(), self.sub())
    }
}

impl core::str::FromStr for GroupAddress {
    type Err = KnxError;

    /// Auto-detects the layout from the separator count.
    fn from_str(s: &str) -> Result<Self> {
        let two_level = s.split('/').count() == 2;
        Self::parse(s, two_level)
    }
}
