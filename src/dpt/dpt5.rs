//! DPT 5.xxx - 8-bit unsigned.
//!
//! One byte on the wire. Scaled subtypes (percentage, angle) map their
//! engineering range onto 0-255; the counter subtype is the raw byte.

use crate::dpt::{DptDecode, DptEncode};
use crate::error::{KnxError, Result};

/// DPT 5.xxx 8-bit unsigned subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dpt5 {
    /// 5.001 - percentage 0-100 %, scaled onto 0-255
    Percentage,
    /// 5.003 - angle 0-360°, scaled onto 0-255
    Angle,
    /// 5.010 - counter pulses, raw 0-255
    Unsigned,
}

impl Dpt5 {
    const fn scale_max(self) -> u16 {
        match self {
            Self::Percentage => 100,
            Self::Angle => 360,
            Self::Unsigned => 255,
        }
    }
}

impl DptEncode<u8> for Dpt5 {
    fn encode(&self, value: u8, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Err(KnxError::buffer_too_small());
        }
        buf[0] = match self {
            Self::Unsigned => value,
            _ => {
                let max = self.scale_max();
                if u16::from(value) > max {
                    return Err(KnxError::dpt_value_out_of_range());
                }
                ((u16::from(value) * 255 + max / 2) / max) as u8
            }
        };
        Ok(1)
    }
}

impl DptDecode<u8> for Dpt5 {
    fn decode(&self, data: &[u8]) -> Result<u8> {
        let raw = match data {
            [byte, ..] => u16::from(*byte),
            [] => return Err(KnxError::invalid_dpt_data()),
        };
        Ok(match self {
            Self::Unsigned => raw as u8,
            _ => ((raw * self.scale_max() + 127) / 255) as u8,
        })
    }
}
