//! DPT 1.xxx - Boolean (1 bit).
//!
//! The most common datapoint family: switches, enables, directions. All
//! subtypes share the same wire form, a single byte whose low bit carries the
//! value; the subtype only names the semantics.

use crate::dpt::{DptDecode, DptEncode};
use crate::error::{KnxError, Result};

/// DPT 1.xxx boolean subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dpt1 {
    /// 1.001 - on/off
    Switch,
    /// 1.002 - true/false
    Bool,
    /// 1.003 - enable/disable
    Enable,
    /// 1.008 - up/down
    UpDown,
}

impl DptEncode<bool> for Dpt1 {
    fn encode(&self, value: bool, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Err(KnxError::buffer_too_small());
        }
        buf[0] = u8::from(value);
        Ok(1)
    }
}

impl DptDecode<bool> for Dpt1 {
    fn decode(&self, data: &[u8]) -> Result<bool> {
        match data {
            [byte, ..] => Ok((byte & 0x01) != 0),
            [] => Err(KnxError::invalid_dpt_data()),
        }
    }
}
