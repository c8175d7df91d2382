use serde::{Deserialize, Serialize};
use std::fmt;

/// Latched fault bits as reported by the RTD-to-digital bridge.
///
/// The layout follows the converter's fault status register. Bits outside the
/// named set are kept as-is and still count as a fault.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaultFlags(u8);

impl FaultFlags {
    pub const RTD_HIGH_THRESHOLD: Self = Self(0x80);
    pub const RTD_LOW_THRESHOLD: Self = Self(0x40);
    pub const REFIN_HIGH: Self = Self(0x20);
    pub const REFIN_LOW_OPEN: Self = Self(0x10);
    pub const RTDIN_LOW_OPEN: Self = Self(0x08);
    pub const OVER_UNDER_VOLTAGE: Self = Self(0x04);

    const NAMED: [(FaultFlags, &'static str); 6] = [
        (Self::RTD_HIGH_THRESHOLD, "rtd_high_threshold"),
        (Self::RTD_LOW_THRESHOLD, "rtd_low_threshold"),
        (Self::REFIN_HIGH, "refin_high"),
        (Self::REFIN_LOW_OPEN, "refin_low_open"),
        (Self::RTDIN_LOW_OPEN, "rtdin_low_open"),
        (Self::OVER_UNDER_VOLTAGE, "over_under_voltage"),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Any bit set, named or not.
    pub const fn is_faulted(self) -> bool {
        self.0 != 0
    }

    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Names of the known bits that are set, most significant first.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }

    /// Bits that have no name in the register layout.
    pub fn unknown_bits(self) -> u8 {
        let known = Self::NAMED.iter().fold(0u8, |acc, (flag, _)| acc | flag.0);
        self.0 & !known
    }
}

impl std::ops::BitOr for FaultFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for FaultFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for FaultFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)?;
        let names = self.names();
        if !names.is_empty() {
            write!(f, " {}", names.join(","))?;
        }
        Ok(())
    }
}
