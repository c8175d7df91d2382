//! Platinum RTD configuration and resistance/temperature conversion.
//!
//! Conversions use the IEC 60751 Callendar-Van Dusen coefficients. The bridge
//! ADC is ratiometric: a 15-bit code is the RTD resistance as a fraction of the
//! reference resistor.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const CVD_A: f64 = 3.9083e-3;
pub const CVD_B: f64 = -5.775e-7;
pub const CVD_C: f64 = -4.183e-12;

/// Full-scale value of the 15-bit ratio code.
pub const CODE_FULL_SCALE: f64 = 32768.0;
pub const CODE_MAX: u16 = 0x7FFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireMode {
    Two,
    Three,
    #[default]
    Four,
}

impl WireMode {
    pub fn from_count(wires: u8) -> Option<Self> {
        match wires {
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            4 => Some(Self::Four),
            _ => None,
        }
    }

    pub fn count(self) -> u8 {
        match self {
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
        }
    }
}

impl fmt::Display for WireMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-wire", self.count())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("nominal resistance must be finite and positive, got {0}")]
    InvalidNominal(f64),

    #[error("reference resistance must be finite and positive, got {0}")]
    InvalidReference(f64),

    #[error("reference resistance {reference} must exceed nominal resistance {nominal}")]
    ReferenceBelowNominal { reference: f64, nominal: f64 },
}

/// Fixed bridge configuration, set once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RtdConfig {
    nominal_ohms: f64,
    reference_ohms: f64,
    wire_mode: WireMode,
}

impl RtdConfig {
    pub fn new(
        nominal_ohms: f64,
        reference_ohms: f64,
        wire_mode: WireMode,
    ) -> Result<Self, ConfigError> {
        if !nominal_ohms.is_finite() || nominal_ohms <= 0.0 {
            return Err(ConfigError::InvalidNominal(nominal_ohms));
        }
        if !reference_ohms.is_finite() || reference_ohms <= 0.0 {
            return Err(ConfigError::InvalidReference(reference_ohms));
        }
        if reference_ohms <= nominal_ohms {
            return Err(ConfigError::ReferenceBelowNominal {
                reference: reference_ohms,
                nominal: nominal_ohms,
            });
        }
        Ok(Self {
            nominal_ohms,
            reference_ohms,
            wire_mode,
        })
    }

    /// PT100 element with a 430 Ω reference, 4-wire.
    pub const fn pt100() -> Self {
        Self {
            nominal_ohms: 100.0,
            reference_ohms: 430.0,
            wire_mode: WireMode::Four,
        }
    }

    /// PT1000 element with a 4300 Ω reference, 4-wire.
    pub const fn pt1000() -> Self {
        Self {
            nominal_ohms: 1000.0,
            reference_ohms: 4300.0,
            wire_mode: WireMode::Four,
        }
    }

    pub fn nominal_ohms(&self) -> f64 {
        self.nominal_ohms
    }

    pub fn reference_ohms(&self) -> f64 {
        self.reference_ohms
    }

    pub fn wire_mode(&self) -> WireMode {
        self.wire_mode
    }

    pub fn code_to_celsius(&self, code: u16) -> f64 {
        resistance_to_celsius(code_to_resistance(code, self.reference_ohms), self.nominal_ohms)
    }

    pub fn celsius_to_code(&self, celsius: f64) -> u16 {
        resistance_to_code(celsius_to_resistance(celsius, self.nominal_ohms), self.reference_ohms)
    }
}

impl Default for RtdConfig {
    fn default() -> Self {
        Self::pt100()
    }
}

pub fn code_to_resistance(code: u16, reference_ohms: f64) -> f64 {
    f64::from(code) / CODE_FULL_SCALE * reference_ohms
}

/// Saturates to `0..=CODE_MAX`.
pub fn resistance_to_code(resistance_ohms: f64, reference_ohms: f64) -> u16 {
    let code = (resistance_ohms / reference_ohms * CODE_FULL_SCALE).round();
    if code.is_nan() || code <= 0.0 {
        0
    } else if code >= f64::from(CODE_MAX) {
        CODE_MAX
    } else {
        code as u16
    }
}

pub fn celsius_to_resistance(celsius: f64, nominal_ohms: f64) -> f64 {
    let t = celsius;
    let mut ratio = 1.0 + CVD_A * t + CVD_B * t * t;
    if t < 0.0 {
        ratio += CVD_C * (t - 100.0) * t * t * t;
    }
    nominal_ohms * ratio
}

pub fn resistance_to_celsius(resistance_ohms: f64, nominal_ohms: f64) -> f64 {
    // Above 0 °C the C term vanishes and the quadratic inverts exactly.
    let z1 = -CVD_A;
    let z2 = CVD_A * CVD_A - 4.0 * CVD_B;
    let z3 = 4.0 * CVD_B / nominal_ohms;
    let z4 = 2.0 * CVD_B;

    let t = ((z2 + z3 * resistance_ohms).sqrt() + z1) / z4;
    if t >= 0.0 {
        return t;
    }

    // Below 0 °C, polynomial fit on the PT100-normalized resistance.
    let r = resistance_ohms / nominal_ohms * 100.0;
    let mut rpoly = r;
    let mut t = -242.02;
    t += 2.2228 * rpoly;
    rpoly *= r;
    t += 2.5859e-3 * rpoly;
    rpoly *= r;
    t -= 4.8260e-6 * rpoly;
    rpoly *= r;
    t -= 2.8183e-8 * rpoly;
    rpoly *= r;
    t += 1.5243e-10 * rpoly;
    t
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn pt100_reference_points() {
        assert!(close(celsius_to_resistance(0.0, 100.0), 100.0, 1e-9));
        assert!(close(celsius_to_resistance(100.0, 100.0), 138.5055, 1e-3));
        assert!(close(celsius_to_resistance(-100.0, 100.0), 60.2558, 1e-3));
    }

    #[test]
    fn inverse_is_exact_above_zero() {
        for t in [0.5, 23.5, 100.0, 400.0] {
            let r = celsius_to_resistance(t, 100.0);
            assert!(close(resistance_to_celsius(r, 100.0), t, 1e-6), "t={t}");
        }
    }

    #[test]
    fn inverse_is_close_below_zero() {
        for t in [-10.0, -50.0, -100.0, -150.0] {
            let r = celsius_to_resistance(t, 1000.0);
            assert!(close(resistance_to_celsius(r, 1000.0), t, 0.1), "t={t}");
        }
    }

    #[test]
    fn code_saturates() {
        assert_eq!(resistance_to_code(1e9, 430.0), CODE_MAX);
        assert_eq!(resistance_to_code(-5.0, 430.0), 0);
        assert_eq!(resistance_to_code(f64::NAN, 430.0), 0);
    }

    #[test]
    fn quantized_round_trip_within_one_lsb() {
        let cfg = RtdConfig::pt100();
        let code = cfg.celsius_to_code(23.5);
        assert!(close(cfg.code_to_celsius(code), 23.5, 0.05));
    }

    #[test]
    fn rejects_reference_below_nominal() {
        let err = RtdConfig::new(1000.0, 430.0, WireMode::Four).unwrap_err();
        assert!(matches!(err, ConfigError::ReferenceBelowNominal { .. }));
        assert!(RtdConfig::new(0.0, 430.0, WireMode::Four).is_err());
        assert!(RtdConfig::new(100.0, f64::NAN, WireMode::Four).is_err());
    }

    #[test]
    fn wire_mode_counts() {
        assert_eq!(WireMode::from_count(3), Some(WireMode::Three));
        assert_eq!(WireMode::from_count(5), None);
        assert_eq!(WireMode::Four.to_string(), "4-wire");
    }
}
