//! Parameters structure for the ramp coordinator

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::params::{non_negative, positive, ParamsError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Limits and timing of a vector ramp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RampParams {
    // ---- LIMITS ----

    /// Hard ceiling on the magnitude of the field vector.
    ///
    /// Units: Tesla
    pub combined_field_limit: f64,

    /// Below this magnitude every axis may ramp at once.
    ///
    /// Units: Tesla
    pub restart_all_threshold: f64,

    /// At or above this magnitude only axes reducing the magnitude may ramp.
    ///
    /// Units: Tesla
    pub stop_threshold: f64,

    // ---- TIMING ----

    /// Delay between poll iterations.
    ///
    /// Units: seconds
    #[serde(default = "default_poll_interval_s")]
    pub poll_interval_s: f64,

    /// Delay after every axis reports holding, before the final pause.
    ///
    /// Units: seconds
    #[serde(default = "default_completion_settle_s")]
    pub completion_settle_s: f64,

    /// Maximum duration of one vector ramp before it is abandoned.
    ///
    /// Units: seconds
    #[serde(default = "default_max_ramp_duration_s")]
    pub max_ramp_duration_s: f64,

    /// An axis within this distance of its set point is considered there.
    ///
    /// Units: Tesla
    #[serde(default = "default_at_target_tolerance")]
    pub at_target_tolerance: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RampParams {
    /// Check the thresholds are ordered and the timings usable.
    pub fn validate(&self) -> Result<(), ParamsError> {
        let ordered = self.restart_all_threshold > 0.0
            && self.restart_all_threshold < self.stop_threshold
            && self.stop_threshold < self.combined_field_limit
            && self.combined_field_limit.is_finite();

        if !ordered {
            return Err(ParamsError::ThresholdOrder {
                restart: self.restart_all_threshold,
                stop: self.stop_threshold,
                limit: self.combined_field_limit,
            });
        }

        positive("poll_interval_s", self.poll_interval_s)?;
        non_negative("completion_settle_s", self.completion_settle_s)?;
        positive("max_ramp_duration_s", self.max_ramp_duration_s)?;
        non_negative("at_target_tolerance", self.at_target_tolerance)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn default_poll_interval_s() -> f64 {
    0.5
}

fn default_completion_settle_s() -> f64 {
    1.0
}

fn default_max_ramp_duration_s() -> f64 {
    3600.0
}

fn default_at_target_tolerance() -> f64 {
    1e-4
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn params(restart: f64, stop: f64, limit: f64) -> RampParams {
        RampParams {
            combined_field_limit: limit,
            restart_all_threshold: restart,
            stop_threshold: stop,
            poll_interval_s: default_poll_interval_s(),
            completion_settle_s: default_completion_settle_s(),
            max_ramp_duration_s: default_max_ramp_duration_s(),
            at_target_tolerance: default_at_target_tolerance(),
        }
    }

    #[test]
    fn test_threshold_order() {
        assert!(params(0.8, 0.85, 0.9).validate().is_ok());
        assert!(params(2.8, 2.85, 2.89).validate().is_ok());

        assert!(params(0.85, 0.8, 0.9).validate().is_err());
        assert!(params(0.8, 0.9, 0.9).validate().is_err());
        assert!(params(0.0, 0.85, 0.9).validate().is_err());
        assert!(params(0.8, 0.85, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn test_timing_checked() {
        let mut p = params(0.8, 0.85, 0.9);
        p.poll_interval_s = 0.0;
        assert_eq!(
            p.validate(),
            Err(ParamsError::NotPositive("poll_interval_s", 0.0))
        );
    }
}
