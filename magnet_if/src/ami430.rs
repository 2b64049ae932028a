//! # AMI430 Programmer Protocol
//!
//! Command strings and reply parsing for the American Magnetics model 430 power supply
//! programmer. Commands are rendered without their terminator, the transport appends it.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default TCP port of the programmer's command interface.
pub const DEFAULT_PORT: u16 = 7180;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A command understood by the programmer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// `STATE?`
    RampStateQuery,
    /// `PS?`
    SwitchHeaterQuery,
    /// `PS 1` / `PS 0`
    SetSwitchHeater(bool),
    /// `RAMP`
    Ramp,
    /// `PAUSE`
    Pause,
    /// `ZERO`
    Zero,
    /// `FIELD:MAG?`
    FieldQuery,
    /// `FIELD:TARG?`
    FieldTargetQuery,
    /// `CONF:FIELD:TARG <v> ;`
    SetFieldTarget(f64),
    /// `CURR:MAG?`
    CurrentQuery,
    /// `CONF:CURR:TARG <v> ;`
    SetCurrentTarget(f64),
    /// `FIELD:UNITS?`
    FieldUnitsQuery,
    /// `CONF:FIELD:UNITS <u>`
    SetFieldUnits(FieldUnits),
    /// `QU?`
    QuenchQuery,
    /// `QU 0`
    ResetQuench,
    /// `PERS?`
    PersistentQuery,
    /// `SYST:ERR?`
    ErrorQuery,
    /// `RAMP:RATE:FIELD:1?`
    RampRateQuery,
    /// `CONF:RAMP:RATE:FIELD 1, <rate>, <upper bound>`
    SetRampRate { rate: f64, field_rating: f64 },
}

/// State of the programmer's ramp.
///
/// The programmer numbers its states from 1, these are numbered from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RampState {
    Ramping = 0,
    Holding = 1,
    Paused = 2,
    ManualUp = 3,
    ManualDown = 4,
    RampingToZero = 5,
    Quench = 6,
    AtZero = 7,
    HeatingSwitch = 8,
    CoolingSwitch = 9,
}

/// Field units selected on the programmer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldUnits {
    Kilogauss = 0,
    Tesla = 1,
}

/// A reply from the programmer which could not be interpreted.
#[derive(Debug, Error, PartialEq)]
#[error("Expected {expected}, found {reply:?}")]
pub struct ReplyError {
    pub expected: &'static str,
    pub reply: String,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Command {
    /// Whether the programmer answers this command.
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Command::RampStateQuery
                | Command::SwitchHeaterQuery
                | Command::FieldQuery
                | Command::FieldTargetQuery
                | Command::CurrentQuery
                | Command::FieldUnitsQuery
                | Command::QuenchQuery
                | Command::PersistentQuery
                | Command::ErrorQuery
                | Command::RampRateQuery
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::RampStateQuery => write!(f, "STATE?"),
            Command::SwitchHeaterQuery => write!(f, "PS?"),
            Command::SetSwitchHeater(on) => write!(f, "PS {}", *on as u8),
            Command::Ramp => write!(f, "RAMP"),
            Command::Pause => write!(f, "PAUSE"),
            Command::Zero => write!(f, "ZERO"),
            Command::FieldQuery => write!(f, "FIELD:MAG?"),
            Command::FieldTargetQuery => write!(f, "FIELD:TARG?"),
            Command::SetFieldTarget(v) => write!(f, "CONF:FIELD:TARG {} ;", v),
            Command::CurrentQuery => write!(f, "CURR:MAG?"),
            Command::SetCurrentTarget(v) => write!(f, "CONF:CURR:TARG {} ;", v),
            Command::FieldUnitsQuery => write!(f, "FIELD:UNITS?"),
            Command::SetFieldUnits(u) => write!(f, "CONF:FIELD:UNITS {}", *u as u8),
            Command::QuenchQuery => write!(f, "QU?"),
            Command::ResetQuench => write!(f, "QU 0"),
            Command::PersistentQuery => write!(f, "PERS?"),
            Command::ErrorQuery => write!(f, "SYST:ERR?"),
            Command::RampRateQuery => write!(f, "RAMP:RATE:FIELD:1?"),
            Command::SetRampRate { rate, field_rating } => {
                write!(f, "CONF:RAMP:RATE:FIELD 1, {}, {}", rate, field_rating)
            }
        }
    }
}

impl RampState {
    /// Decode the programmer's 1-based state number.
    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            1 => Some(RampState::Ramping),
            2 => Some(RampState::Holding),
            3 => Some(RampState::Paused),
            4 => Some(RampState::ManualUp),
            5 => Some(RampState::ManualDown),
            6 => Some(RampState::RampingToZero),
            7 => Some(RampState::Quench),
            8 => Some(RampState::AtZero),
            9 => Some(RampState::HeatingSwitch),
            10 => Some(RampState::CoolingSwitch),
            _ => None,
        }
    }

    /// The programmer's 1-based state number.
    pub fn to_wire(self) -> i64 {
        self as i64 + 1
    }
}

impl fmt::Display for RampState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RampState::Ramping => "ramping",
            RampState::Holding => "holding",
            RampState::Paused => "paused",
            RampState::ManualUp => "manual up",
            RampState::ManualDown => "manual down",
            RampState::RampingToZero => "ramping to zero",
            RampState::Quench => "quench detected",
            RampState::AtZero => "at zero",
            RampState::HeatingSwitch => "heating switch",
            RampState::CoolingSwitch => "cooling switch",
        };
        write!(f, "{}", s)
    }
}

impl TryFrom<i64> for FieldUnits {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FieldUnits::Kilogauss),
            1 => Ok(FieldUnits::Tesla),
            v => Err(v),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parse an integer reply.
pub fn parse_int(reply: &str) -> Result<i64, ReplyError> {
    reply.trim().parse().map_err(|_| ReplyError {
        expected: "an integer",
        reply: reply.to_string(),
    })
}

/// Parse a floating point reply. `NaN` and infinities are not valid readings.
pub fn parse_float(reply: &str) -> Result<f64, ReplyError> {
    match reply.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ReplyError {
            expected: "a finite number",
            reply: reply.to_string(),
        }),
    }
}

/// Parse a `0`/`1` flag reply.
pub fn parse_flag(reply: &str) -> Result<bool, ReplyError> {
    match parse_int(reply) {
        Ok(0) => Ok(false),
        Ok(1) => Ok(true),
        _ => Err(ReplyError {
            expected: "0 or 1",
            reply: reply.to_string(),
        }),
    }
}

/// Parse a `STATE?` reply.
pub fn parse_ramp_state(reply: &str) -> Result<RampState, ReplyError> {
    parse_int(reply)
        .ok()
        .and_then(RampState::from_wire)
        .ok_or_else(|| ReplyError {
            expected: "a ramp state between 1 and 10",
            reply: reply.to_string(),
        })
}

/// Parse a `FIELD:UNITS?` reply.
pub fn parse_units(reply: &str) -> Result<FieldUnits, ReplyError> {
    parse_int(reply)
        .ok()
        .and_then(|v| FieldUnits::try_from(v).ok())
        .ok_or_else(|| ReplyError {
            expected: "0 (kG) or 1 (T)",
            reply: reply.to_string(),
        })
}

/// Parse a `RAMP:RATE:FIELD:1?` reply, which is `<rate>,<upper bound>`. Only the rate is
/// returned.
pub fn parse_ramp_rate(reply: &str) -> Result<f64, ReplyError> {
    let rate = reply.split(',').next().unwrap_or("");
    parse_float(rate).map_err(|_| ReplyError {
        expected: "a ramp rate pair",
        reply: reply.to_string(),
    })
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_command_strings() {
        assert_eq!(Command::RampStateQuery.to_string(), "STATE?");
        assert_eq!(Command::SetSwitchHeater(true).to_string(), "PS 1");
        assert_eq!(Command::SetSwitchHeater(false).to_string(), "PS 0");
        assert_eq!(Command::SetFieldTarget(1.25).to_string(), "CONF:FIELD:TARG 1.25 ;");
        assert_eq!(Command::SetFieldTarget(-0.5).to_string(), "CONF:FIELD:TARG -0.5 ;");
        assert_eq!(Command::SetFieldUnits(FieldUnits::Tesla).to_string(), "CONF:FIELD:UNITS 1");
        assert_eq!(
            Command::SetRampRate { rate: 0.01, field_rating: 1.01 }.to_string(),
            "CONF:RAMP:RATE:FIELD 1, 0.01, 1.01"
        );
        assert!(Command::FieldQuery.is_query());
        assert!(!Command::Pause.is_query());
    }

    #[test]
    fn test_ramp_state_numbering() {
        assert_eq!(RampState::from_wire(1), Some(RampState::Ramping));
        assert_eq!(RampState::from_wire(3), Some(RampState::Paused));
        assert_eq!(RampState::from_wire(8), Some(RampState::AtZero));
        assert_eq!(RampState::from_wire(10), Some(RampState::CoolingSwitch));
        assert_eq!(RampState::from_wire(0), None);
        assert_eq!(RampState::from_wire(11), None);
        assert_eq!(RampState::from_wire(i64::MIN), None);
        assert_eq!(RampState::Holding.to_wire(), 2);
    }

    #[test]
    fn test_parse_replies() {
        assert_eq!(parse_ramp_state("2\r\n"), Ok(RampState::Holding));
        assert!(parse_ramp_state("holding").is_err());
        assert!(parse_ramp_state("12").is_err());
        assert!(parse_ramp_state("-9223372036854775808").is_err());
        assert_eq!(parse_float(" 0.8512\r\n"), Ok(0.8512));
        assert_eq!(parse_float("-1e-3"), Ok(-0.001));
        for bad in ["NaN", "nan", "inf", "-inf", "infinity"].iter() {
            assert!(parse_float(bad).is_err(), "accepted {}", bad);
        }
        assert!(parse_ramp_rate("NaN,1.01").is_err());
        assert_eq!(parse_flag("1\r\n"), Ok(true));
        assert!(parse_flag("2").is_err());
        assert_eq!(parse_units("0"), Ok(FieldUnits::Kilogauss));
        assert_eq!(parse_ramp_rate("0.0100,1.0100\r\n"), Ok(0.01));
        assert!(parse_ramp_rate("").is_err());
    }
}
