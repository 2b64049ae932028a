//! # Quantities
//!
//! The host addresses the magnet through named quantities. Per-axis quantities are named
//! `{axis}_{attribute}` (for example `x_field` or `z_rampRate`), vector quantities are bare names
//! (`radius`, `phi`, `constant_theta`, ...). Names are decoded once into a [`Quantity`] so that
//! nothing below the boundary deals with strings.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// All per-axis attributes, in the order they are listed by the console help.
pub const AXIS_ATTRS: [AxisAttr; 13] = [
    AxisAttr::Field,
    AxisAttr::SetPoint,
    AxisAttr::Current,
    AxisAttr::Units,
    AxisAttr::RampRate,
    AxisAttr::RampState,
    AxisAttr::PSwitch,
    AxisAttr::Persistent,
    AxisAttr::Quench,
    AxisAttr::Error,
    AxisAttr::Ramp,
    AxisAttr::Pause,
    AxisAttr::Zero,
];

/// All vector attributes.
pub const VECTOR_ATTRS: [VectorAttr; 6] = [
    VectorAttr::Radius,
    VectorAttr::Phi,
    VectorAttr::Theta,
    VectorAttr::ConstantRadius,
    VectorAttr::ConstantPhi,
    VectorAttr::ConstantTheta,
];

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Identifier of a single magnet axis, each of which is driven by its own power supply.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AxisId {
    X,
    Y,
    Z,
}

/// Attributes available on every axis.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum AxisAttr {
    /// Persistent switch heater
    PSwitch,
    Current,
    Field,
    Units,
    SetPoint,
    RampRate,
    RampState,
    Persistent,
    Quench,
    /// Head of the instrument error queue
    Error,
    /// Trigger: start ramping to the set point
    Ramp,
    /// Trigger: pause the ramp
    Pause,
    /// Trigger: ramp to zero
    Zero,
}

/// Attributes of the combined field vector.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum VectorAttr {
    Radius,
    Phi,
    Theta,
    ConstantRadius,
    ConstantPhi,
    ConstantTheta,
}

/// A quantity exposed to the host.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum Quantity {
    Axis(AxisId, AxisAttr),
    Vector(VectorAttr),
}

/// The kind of value a quantity reads and writes.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum ValueKind {
    Float,
    Int,
    Bool,
    Text,
    /// Write-only action which takes no value
    Trigger,
}

/// A value read from or written to a quantity.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(untagged)]
pub enum QuantityValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Trigger,
}

/// Errors which can occur while decoding quantities and their values.
#[derive(Debug, Error, PartialEq)]
pub enum QuantityError {
    #[error("\"{0}\" is not a recognised quantity")]
    UnknownQuantity(String),

    #[error("\"{0}\" is not a recognised axis")]
    UnknownAxis(String),

    #[error("Quantity {quantity} expects a {kind:?} value, found \"{value}\"")]
    InvalidValue {
        quantity: Quantity,
        kind: ValueKind,
        value: String,
    },

    #[error("Quantity {0} cannot be written")]
    ReadOnly(Quantity),

    #[error("Quantity {0} cannot be read")]
    WriteOnly(Quantity),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl AxisId {
    /// Lowercase single letter used in quantity names and parameter files.
    pub fn as_str(&self) -> &'static str {
        match self {
            AxisId::X => "x",
            AxisId::Y => "y",
            AxisId::Z => "z",
        }
    }
}

impl FromStr for AxisId {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x" | "X" => Ok(AxisId::X),
            "y" | "Y" => Ok(AxisId::Y),
            "z" | "Z" => Ok(AxisId::Z),
            _ => Err(QuantityError::UnknownAxis(s.to_string())),
        }
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AxisAttr {
    /// Name suffix used by the host (`x_<suffix>`).
    pub fn suffix(&self) -> &'static str {
        match self {
            AxisAttr::PSwitch => "pSwitch",
            AxisAttr::Current => "current",
            AxisAttr::Field => "field",
            AxisAttr::Units => "units",
            AxisAttr::SetPoint => "setPoint",
            AxisAttr::RampRate => "rampRate",
            AxisAttr::RampState => "rampState",
            AxisAttr::Persistent => "persistent",
            AxisAttr::Quench => "quench",
            AxisAttr::Error => "error",
            AxisAttr::Ramp => "ramp",
            AxisAttr::Pause => "pause",
            AxisAttr::Zero => "zero",
        }
    }

    fn from_suffix(s: &str) -> Option<Self> {
        AXIS_ATTRS.iter().copied().find(|a| a.suffix() == s)
    }
}

impl VectorAttr {
    pub fn name(&self) -> &'static str {
        match self {
            VectorAttr::Radius => "radius",
            VectorAttr::Phi => "phi",
            VectorAttr::Theta => "theta",
            VectorAttr::ConstantRadius => "constant_radius",
            VectorAttr::ConstantPhi => "constant_phi",
            VectorAttr::ConstantTheta => "constant_theta",
        }
    }

    fn from_name(s: &str) -> Option<Self> {
        VECTOR_ATTRS.iter().copied().find(|a| a.name() == s)
    }
}

impl Quantity {
    /// The kind of value this quantity carries.
    pub fn kind(&self) -> ValueKind {
        match self {
            Quantity::Vector(_) => ValueKind::Float,
            Quantity::Axis(_, attr) => match attr {
                AxisAttr::Current | AxisAttr::Field | AxisAttr::SetPoint | AxisAttr::RampRate => {
                    ValueKind::Float
                }
                AxisAttr::Units | AxisAttr::RampState => ValueKind::Int,
                AxisAttr::PSwitch | AxisAttr::Persistent | AxisAttr::Quench => ValueKind::Bool,
                AxisAttr::Error => ValueKind::Text,
                AxisAttr::Ramp | AxisAttr::Pause | AxisAttr::Zero => ValueKind::Trigger,
            },
        }
    }

    /// Whether the quantity can be written.
    pub fn is_settable(&self) -> bool {
        !matches!(
            self,
            Quantity::Axis(_, AxisAttr::RampState) | Quantity::Axis(_, AxisAttr::Error)
        )
    }

    /// Whether the quantity can be read.
    pub fn is_gettable(&self) -> bool {
        self.kind() != ValueKind::Trigger
    }

    /// The axis this quantity addresses, if it is a per-axis quantity.
    pub fn axis(&self) -> Option<AxisId> {
        match self {
            Quantity::Axis(id, _) => Some(*id),
            Quantity::Vector(_) => None,
        }
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(attr) = VectorAttr::from_name(s) {
            return Ok(Quantity::Vector(attr));
        }

        // Per-axis names are a single axis letter, an underscore, then the attribute suffix
        let mut parts = s.splitn(2, '_');
        let axis = parts.next().unwrap_or("");
        let suffix = match parts.next() {
            Some(suffix) => suffix,
            None => return Err(QuantityError::UnknownQuantity(s.to_string())),
        };

        let axis: AxisId = axis
            .parse()
            .map_err(|_| QuantityError::UnknownQuantity(s.to_string()))?;

        match AxisAttr::from_suffix(suffix) {
            Some(attr) => Ok(Quantity::Axis(axis, attr)),
            None => Err(QuantityError::UnknownQuantity(s.to_string())),
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Axis(id, attr) => write!(f, "{}_{}", id, attr.suffix()),
            Quantity::Vector(attr) => write!(f, "{}", attr.name()),
        }
    }
}

impl QuantityValue {
    /// Parse a textual value for the given quantity.
    ///
    /// Booleans accept `1/0`, `true/false` and `on/off`. Triggers ignore the text entirely.
    pub fn parse(quantity: Quantity, text: &str) -> Result<Self, QuantityError> {
        let text = text.trim();
        let invalid = || QuantityError::InvalidValue {
            quantity,
            kind: quantity.kind(),
            value: text.to_string(),
        };

        match quantity.kind() {
            ValueKind::Float => text.parse().map(QuantityValue::Float).map_err(|_| invalid()),
            ValueKind::Int => text.parse().map(QuantityValue::Int).map_err(|_| invalid()),
            ValueKind::Bool => match text.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" => Ok(QuantityValue::Bool(true)),
                "0" | "false" | "off" => Ok(QuantityValue::Bool(false)),
                _ => Err(invalid()),
            },
            ValueKind::Text => Ok(QuantityValue::Text(text.to_string())),
            ValueKind::Trigger => Ok(QuantityValue::Trigger),
        }
    }

    /// Numeric view of the value. Integers and booleans are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            QuantityValue::Float(v) => Some(*v),
            QuantityValue::Int(v) => Some(*v as f64),
            QuantityValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            QuantityValue::Int(v) => Some(*v),
            QuantityValue::Bool(b) => Some(*b as i64),
            QuantityValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            QuantityValue::Bool(b) => Some(*b),
            QuantityValue::Int(v) => Some(*v != 0),
            QuantityValue::Float(v) => Some(*v != 0.0),
            _ => None,
        }
    }
}

impl fmt::Display for QuantityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuantityValue::Bool(b) => write!(f, "{}", b),
            QuantityValue::Int(v) => write!(f, "{}", v),
            QuantityValue::Float(v) => write!(f, "{}", v),
            QuantityValue::Text(s) => write!(f, "{}", s),
            QuantityValue::Trigger => write!(f, "<trigger>"),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_names() -> Result<(), QuantityError> {
        assert_eq!(
            "x_field".parse::<Quantity>()?,
            Quantity::Axis(AxisId::X, AxisAttr::Field)
        );
        assert_eq!(
            "z_rampRate".parse::<Quantity>()?,
            Quantity::Axis(AxisId::Z, AxisAttr::RampRate)
        );
        assert_eq!(
            "y_pSwitch".parse::<Quantity>()?,
            Quantity::Axis(AxisId::Y, AxisAttr::PSwitch)
        );
        assert_eq!(
            "constant_phi".parse::<Quantity>()?,
            Quantity::Vector(VectorAttr::ConstantPhi)
        );
        assert_eq!("radius".parse::<Quantity>()?, Quantity::Vector(VectorAttr::Radius));

        Ok(())
    }

    #[test]
    fn test_names_round_trip_through_display() {
        for axis in [AxisId::X, AxisId::Y, AxisId::Z].iter() {
            for attr in AXIS_ATTRS.iter() {
                let q = Quantity::Axis(*axis, *attr);
                assert_eq!(q.to_string().parse::<Quantity>(), Ok(q));
            }
        }
        for attr in VECTOR_ATTRS.iter() {
            let q = Quantity::Vector(*attr);
            assert_eq!(q.to_string().parse::<Quantity>(), Ok(q));
        }
    }

    #[test]
    fn test_reject_unknown() {
        assert!("w_field".parse::<Quantity>().is_err());
        assert!("x_fields".parse::<Quantity>().is_err());
        assert!("x".parse::<Quantity>().is_err());
        assert!("constant".parse::<Quantity>().is_err());
    }

    #[test]
    fn test_parse_values() {
        let field = Quantity::Axis(AxisId::X, AxisAttr::Field);
        let pers = Quantity::Axis(AxisId::X, AxisAttr::Persistent);
        let units = Quantity::Axis(AxisId::Y, AxisAttr::Units);
        let ramp = Quantity::Axis(AxisId::Z, AxisAttr::Ramp);

        assert_eq!(QuantityValue::parse(field, " 0.25 "), Ok(QuantityValue::Float(0.25)));
        assert_eq!(QuantityValue::parse(pers, "on"), Ok(QuantityValue::Bool(true)));
        assert_eq!(QuantityValue::parse(pers, "0"), Ok(QuantityValue::Bool(false)));
        assert_eq!(QuantityValue::parse(units, "1"), Ok(QuantityValue::Int(1)));
        assert_eq!(QuantityValue::parse(ramp, ""), Ok(QuantityValue::Trigger));
        assert!(QuantityValue::parse(field, "abc").is_err());
        assert!(QuantityValue::parse(pers, "maybe").is_err());
    }

    #[test]
    fn test_access_flags() {
        assert!(!Quantity::Axis(AxisId::X, AxisAttr::RampState).is_settable());
        assert!(!Quantity::Axis(AxisId::X, AxisAttr::Ramp).is_gettable());
        assert!(Quantity::Vector(VectorAttr::Theta).is_settable());
        assert_eq!(Quantity::Vector(VectorAttr::Phi).axis(), None);
    }
}
