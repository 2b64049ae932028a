//! # Magnet Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use magnet_if::quantity::AxisId;
use util::params::{self, LoadError};

pub use crate::ramp_coord::RampParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MagnetExecParams {
    /// How the axes combine into the field vector
    pub geometry: Geometry,

    /// One entry per power supply, any order
    pub axes: Vec<AxisParams>,

    #[serde(default)]
    pub transport: TransportParams,

    #[serde(default)]
    pub timing: TimingParams,

    pub ramp: RampParams,
}

/// Connection details of a single axis.
#[derive(Debug, Clone, Deserialize)]
pub struct AxisParams {
    pub id: AxisId,

    /// `host:port` of the programmer, the port defaults to 7180
    pub address: String,

    /// Upper bound passed with every ramp rate configuration.
    ///
    /// Units: Tesla
    pub field_rating: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportParams {
    pub connect_timeout_s: f64,
    pub read_timeout_s: f64,

    /// How long to read the greeting sent by the programmer on connection
    pub banner_timeout_s: f64,
}

/// Delays applied around programmer commands.
///
/// Units: seconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingParams {
    /// Delay after every command before the programmer is trusted again
    pub settle_s: f64,

    /// Delay after switching the persistent switch heater
    pub switch_settle_s: f64,

    /// Poll interval while the switch heater is changing
    pub switch_poll_s: f64,

    /// Maximum time to wait for the switch heater to finish changing
    pub switch_timeout_s: f64,

    /// Delay after reaching zero before verifying persistent mode
    pub zero_settle_s: f64,

    /// Maximum time to wait for a ramp to zero when entering or leaving persistent mode
    pub zero_timeout_s: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Arrangement of the magnet axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Geometry {
    /// Three axes, x/y/z, described by radius, phi and theta
    Spherical,

    /// Two axes described by radius and an angle measured from `a` towards `b`
    Planar { a: AxisId, b: AxisId },
}

#[derive(Debug, Error, PartialEq)]
pub enum ParamsError {
    #[error(
        "Thresholds must satisfy 0 < restart_all_threshold ({restart}) < stop_threshold ({stop}) \
         < combined_field_limit ({limit})"
    )]
    ThresholdOrder { restart: f64, stop: f64, limit: f64 },

    #[error("{0} must be positive, found {1}")]
    NotPositive(&'static str, f64),

    #[error("{0} must not be negative, found {1}")]
    Negative(&'static str, f64),

    #[error("Expected axes {expected:?} for the configured geometry, found {found:?}")]
    AxisMismatch {
        expected: Vec<AxisId>,
        found: Vec<AxisId>,
    },

    #[error("Axis {0} is configured more than once")]
    DuplicateAxis(AxisId),

    #[error("Planar geometry needs two different axes, found {0} twice")]
    DegeneratePlane(AxisId),
}

/// Errors raised while loading the executable's parameters.
#[derive(Debug, Error)]
pub enum ParamsLoadError {
    #[error("{0}")]
    Load(#[from] LoadError),

    #[error("Invalid parameters: {0}")]
    Invalid(#[from] ParamsError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MagnetExecParams {
    /// Load and validate the parameter file, relative to `$MAGNET_SW_ROOT/params`.
    pub fn load(param_file_path: &str) -> Result<Self, ParamsLoadError> {
        let p: Self = params::load(param_file_path)?;
        p.validate()?;
        Ok(p)
    }

    /// Parse and validate parameters from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ParamsLoadError> {
        let p: Self = params::from_str(text)?;
        p.validate()?;
        Ok(p)
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        self.geometry.validate()?;

        let mut seen = HashSet::new();
        for a in self.axes.iter() {
            if !seen.insert(a.id) {
                return Err(ParamsError::DuplicateAxis(a.id));
            }
            positive("field_rating", a.field_rating)?;
        }

        let mut expected = self.geometry.axes();
        let mut found: Vec<AxisId> = self.axes.iter().map(|a| a.id).collect();
        expected.sort();
        found.sort();
        if expected != found {
            return Err(ParamsError::AxisMismatch { expected, found });
        }

        self.transport.validate()?;
        self.timing.validate()?;
        self.ramp.validate()
    }

    /// The parameters of each axis, in geometry order.
    pub fn ordered_axes(&self) -> Vec<&AxisParams> {
        self.geometry
            .axes()
            .into_iter()
            .filter_map(|id| self.axes.iter().find(|a| a.id == id))
            .collect()
    }
}

impl Geometry {
    /// The axes making up the vector, in the order vector components are given.
    pub fn axes(&self) -> Vec<AxisId> {
        match self {
            Geometry::Spherical => vec![AxisId::X, AxisId::Y, AxisId::Z],
            Geometry::Planar { a, b } => vec![*a, *b],
        }
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        match self {
            Geometry::Planar { a, b } if a == b => Err(ParamsError::DegeneratePlane(*a)),
            _ => Ok(()),
        }
    }
}

impl Default for TransportParams {
    fn default() -> Self {
        Self {
            connect_timeout_s: 5.0,
            read_timeout_s: 5.0,
            banner_timeout_s: 0.5,
        }
    }
}

impl TransportParams {
    fn validate(&self) -> Result<(), ParamsError> {
        positive("connect_timeout_s", self.connect_timeout_s)?;
        positive("read_timeout_s", self.read_timeout_s)?;
        non_negative("banner_timeout_s", self.banner_timeout_s)
    }
}

impl Default for TimingParams {
    fn default() -> Self {
        Self {
            settle_s: 0.8,
            switch_settle_s: 0.5,
            switch_poll_s: 0.3,
            switch_timeout_s: 120.0,
            zero_settle_s: 2.0,
            zero_timeout_s: 1800.0,
        }
    }
}

impl TimingParams {
    fn validate(&self) -> Result<(), ParamsError> {
        non_negative("settle_s", self.settle_s)?;
        non_negative("switch_settle_s", self.switch_settle_s)?;
        positive("switch_poll_s", self.switch_poll_s)?;
        positive("switch_timeout_s", self.switch_timeout_s)?;
        non_negative("zero_settle_s", self.zero_settle_s)?;
        positive("zero_timeout_s", self.zero_timeout_s)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

pub(crate) fn positive(name: &'static str, value: f64) -> Result<(), ParamsError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ParamsError::NotPositive(name, value))
    }
}

pub(crate) fn non_negative(name: &'static str, value: f64) -> Result<(), ParamsError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ParamsError::Negative(name, value))
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
