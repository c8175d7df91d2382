//! Text lines the probe sends back for a read command.

use crate::fault::FaultFlags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const FAULT_NOTICE: &str = "Fault detected!";

/// How much of the fault register ends up on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultReport {
    /// The bare notice.
    #[default]
    Notice,
    /// Notice followed by the hex code and the names of the set bits.
    Detailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Temperature(f32),
    /// Fault bits are `None` when the peer only sent the bare notice.
    Fault(Option<FaultFlags>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty response line")]
    Empty,

    #[error("response is not a temperature: {0:?}")]
    NotANumber(String),

    #[error("malformed fault code in {0:?}")]
    MalformedFault(String),
}

impl Response {
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }

    pub fn temperature(&self) -> Option<f32> {
        match self {
            Self::Temperature(value) => Some(*value),
            Self::Fault(_) => None,
        }
    }

    /// Renders the line without its terminator.
    pub fn render(&self, precision: usize, report: FaultReport) -> String {
        match (self, report) {
            (Self::Temperature(value), _) => format!("{:.*}", precision, value),
            (Self::Fault(Some(flags)), FaultReport::Detailed) => {
                format!("{FAULT_NOTICE} {flags}")
            }
            (Self::Fault(_), _) => FAULT_NOTICE.to_string(),
        }
    }

    /// Parses one received line; surrounding whitespace and CR/LF are ignored.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        if let Some(rest) = line.strip_prefix(FAULT_NOTICE) {
            let detail = rest.trim();
            if detail.is_empty() {
                return Ok(Self::Fault(None));
            }
            let code = detail
                .split_whitespace()
                .next()
                .and_then(|token| token.strip_prefix("0x"))
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| ParseError::MalformedFault(line.to_string()))?;
            return Ok(Self::Fault(Some(FaultFlags::from_bits(code))));
        }

        line.parse::<f32>()
            .map(Self::Temperature)
            .map_err(|_| ParseError::NotANumber(line.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_two_decimals_by_default() {
        assert_eq!(Response::Temperature(23.5).render(2, FaultReport::Notice), "23.50");
        assert_eq!(Response::Temperature(-3.14159).render(3, FaultReport::Notice), "-3.142");
    }

    #[test]
    fn notice_hides_fault_bits() {
        let flags = FaultFlags::from_bits(0x84);
        assert_eq!(
            Response::Fault(Some(flags)).render(2, FaultReport::Notice),
            "Fault detected!"
        );
        assert_eq!(
            Response::Fault(Some(flags)).render(2, FaultReport::Detailed),
            "Fault detected! 0x84 rtd_high_threshold,over_under_voltage"
        );
        assert_eq!(
            Response::Fault(None).render(2, FaultReport::Detailed),
            "Fault detected!"
        );
    }

    #[test]
    fn parses_value_and_notices() {
        assert_eq!(Response::parse("23.50\r\n"), Ok(Response::Temperature(23.5)));
        assert_eq!(Response::parse("Fault detected!\n"), Ok(Response::Fault(None)));
        assert_eq!(
            Response::parse("Fault detected! 0x84 rtd_high_threshold,over_under_voltage"),
            Ok(Response::Fault(Some(FaultFlags::from_bits(0x84))))
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(Response::parse("  \r\n"), Err(ParseError::Empty));
        assert!(matches!(Response::parse("hello"), Err(ParseError::NotANumber(_))));
        assert!(matches!(
            Response::parse("Fault detected! zz"),
            Err(ParseError::MalformedFault(_))
        ));
    }
}
