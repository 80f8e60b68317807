//! Supported-PID discovery
//!
//! Mode 01 PIDs 00, 20 and 40 each answer a 32-bit bitmap. The most
//! significant bit of the first byte stands for `base + 1`; the lowest bit
//! says whether the next range can be queried.

use crate::error::ObdError;
use crate::pid::ParameterId;
use serde::Serialize;

/// Range queries that cover every PID in the catalogue
pub const SUPPORT_RANGES: [u8; 3] = [0x00, 0x20, 0x40];

/// Set of Mode 01 PIDs the ECU reports as supported
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SupportedPids {
    /// One bit per PID 0x01..=0x80, bit `pid - 1`
    bits: u128,
}

impl SupportedPids {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every PID of the catalogue, for adapters that cannot be asked
    pub fn all_catalogue() -> Self {
        let mut support = Self::new();
        for pid in ParameterId::ALL.iter().filter_map(ParameterId::pid) {
            support.insert(pid);
        }
        support
    }

    /// Merge the 4-byte bitmap answered for range query `base`
    pub fn add_bitmap(&mut self, base: u8, bytes: &[u8]) -> Result<(), ObdError> {
        let bitmap: [u8; 4] = bytes.try_into().map_err(|_| {
            ObdError::InvalidResponse(format!(
                "PID {:02X} bitmap has {} bytes, expected 4",
                base,
                bytes.len()
            ))
        })?;
        let word = u32::from_be_bytes(bitmap);
        for bit in 0..32u8 {
            if word & (1u32 << (31 - bit)) != 0 {
                if let Some(pid) = base.checked_add(bit + 1) {
                    self.insert(pid);
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, pid: u8) {
        if (1..=128).contains(&pid) {
            self.bits |= 1u128 << (pid - 1);
        }
    }

    pub fn contains(&self, pid: u8) -> bool {
        pid != 0 && pid <= 128 && self.bits & (1u128 << (pid - 1)) != 0
    }

    /// Whether the ECU advertises the range that follows `base`
    pub fn has_next_range(&self, base: u8) -> bool {
        base.checked_add(0x20).map_or(false, |pid| self.contains(pid))
    }

    /// Whether `parameter` can be polled. Adapter-level values always can.
    pub fn supports(&self, parameter: ParameterId) -> bool {
        parameter.pid().map_or(true, |pid| self.contains(pid))
    }

    /// Catalogue parameters the ECU supports, in catalogue order
    pub fn parameters(&self) -> Vec<ParameterId> {
        ParameterId::ALL
            .into_iter()
            .filter(|p| self.supports(*p))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }
}
