//! # Request module
//!
//! Requests are the instructions given to the magnet by an operator, either typed at the console
//! or read from a script. The textual form is
//!
//! ```text
//! get <quantity>
//! set <quantity> [value]
//! stop
//! ```

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::quantity::{Quantity, QuantityError, QuantityValue, ValueKind};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A single request to the magnet.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub enum Request {
    /// Read a quantity
    Get(Quantity),

    /// Write a quantity
    Set(Quantity, QuantityValue),

    /// Cancel any vector ramp currently in progress
    Stop,
}

/// Possible parsing errors.
#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("Request is empty")]
    Empty,

    #[error("\"{0}\" is not a recognised request, expected get, set or stop")]
    InvalidVerb(String),

    #[error("Request \"{0}\" is missing its quantity")]
    MissingQuantity(String),

    #[error("Setting {0} requires a value")]
    MissingValue(Quantity),

    #[error("Unexpected trailing input \"{0}\"")]
    TrailingInput(String),

    #[error("{0}")]
    Quantity(#[from] QuantityError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Request {
    /// Parse a request from a line of text.
    pub fn parse(line: &str) -> Result<Self, RequestError> {
        let mut words = line.split_whitespace();

        let verb = match words.next() {
            Some(v) => v.to_ascii_lowercase(),
            None => return Err(RequestError::Empty),
        };

        let request = match verb.as_str() {
            "stop" => Request::Stop,
            "get" => {
                let quantity: Quantity = words
                    .next()
                    .ok_or_else(|| RequestError::MissingQuantity(verb.clone()))?
                    .parse()?;

                if !quantity.is_gettable() {
                    return Err(QuantityError::WriteOnly(quantity).into());
                }

                Request::Get(quantity)
            }
            "set" => {
                let quantity: Quantity = words
                    .next()
                    .ok_or_else(|| RequestError::MissingQuantity(verb.clone()))?
                    .parse()?;

                if !quantity.is_settable() {
                    return Err(QuantityError::ReadOnly(quantity).into());
                }

                let value = match (quantity.kind(), words.next()) {
                    (ValueKind::Trigger, _) => QuantityValue::Trigger,
                    (_, Some(text)) => QuantityValue::parse(quantity, text)?,
                    (_, None) => return Err(RequestError::MissingValue(quantity)),
                };

                Request::Set(quantity, value)
            }
            _ => return Err(RequestError::InvalidVerb(verb)),
        };

        // Anything left over is a typo we shouldn't silently swallow
        let rest: Vec<&str> = words.collect();
        if !rest.is_empty() {
            return Err(RequestError::TrailingInput(rest.join(" ")));
        }

        Ok(request)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Get(q) => write!(f, "get {}", q),
            Request::Set(q, QuantityValue::Trigger) => write!(f, "set {}", q),
            Request::Set(q, v) => write!(f, "set {} {}", q, v),
            Request::Stop => write!(f, "stop"),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::quantity::{AxisAttr, AxisId, VectorAttr};

    #[test]
    fn test_parse_requests() -> Result<(), RequestError> {
        assert_eq!(
            Request::parse("set radius 0.5")?,
            Request::Set(Quantity::Vector(VectorAttr::Radius), QuantityValue::Float(0.5))
        );
        assert_eq!(
            Request::parse("  GET   x_field ")?,
            Request::Get(Quantity::Axis(AxisId::X, AxisAttr::Field))
        );
        assert_eq!(
            Request::parse("set z_ramp")?,
            Request::Set(Quantity::Axis(AxisId::Z, AxisAttr::Ramp), QuantityValue::Trigger)
        );
        assert_eq!(Request::parse("stop")?, Request::Stop);

        Ok(())
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Request::parse("   "), Err(RequestError::Empty));
        assert_eq!(
            Request::parse("ramp radius"),
            Err(RequestError::InvalidVerb("ramp".into()))
        );
        assert_eq!(
            Request::parse("set radius"),
            Err(RequestError::MissingValue(Quantity::Vector(VectorAttr::Radius)))
        );
        assert!(matches!(
            Request::parse("set x_rampState 1"),
            Err(RequestError::Quantity(QuantityError::ReadOnly(_)))
        ));
        assert!(matches!(
            Request::parse("get y_pause"),
            Err(RequestError::Quantity(QuantityError::WriteOnly(_)))
        ));
        assert_eq!(
            Request::parse("get radius now"),
            Err(RequestError::TrailingInput("now".into()))
        );
    }

    #[test]
    fn test_display_parses_back() -> Result<(), RequestError> {
        for line in ["set constant_theta 90", "get y_quench", "set x_zero", "stop"].iter() {
            assert_eq!(Request::parse(line)?.to_string(), *line);
        }
        Ok(())
    }
}
