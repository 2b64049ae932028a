//! Ramp coordinator state and poll loop

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, error, info, warn};
use std::fmt;
use thiserror::Error;

use magnet_if::ami430::RampState;
use util::{maths::magnitude, time::secs_to_duration};

use super::*;
use crate::axis_channel::{AxisChannel, AxisError};
use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::params::ParamsError;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Drives one vector ramp across a set of axes.
///
/// A coordinator is built for a single target and discarded once [`RampCoordinator::run`]
/// returns, keeping only its trace.
pub struct RampCoordinator {
    params: RampParams,

    /// Set point of each axis, in axis order
    ///
    /// Units: Tesla
    targets: Vec<f64>,

    trace: RampTrace,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Non-error ends of a ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampOutcome {
    /// Every axis reached its set point, or nothing was left to start
    Success,

    /// Stopped on request, all axes paused
    Cancelled,
}

#[derive(Debug, Error)]
pub enum RampError {
    #[error("Field magnitude {radius:.4} T would exceed the limit of {limit:.4} T, all axes paused")]
    LimitExceeded { radius: f64, limit: f64 },

    #[error("Ramp did not complete within {elapsed:.1} s, all axes paused")]
    Timeout { elapsed: f64 },

    #[error("Axis error during ramp: {0}")]
    Axis(#[from] AxisError),

    #[error("Ramp has {targets} set points for {axes} axes")]
    AxisCountMismatch { axes: usize, targets: usize },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RampCoordinator {
    /// Create a coordinator for the given per-axis set points.
    ///
    /// Fails if the thresholds are not ordered.
    pub fn new(params: RampParams, targets: Vec<f64>) -> Result<Self, ParamsError> {
        params.validate()?;

        let trace = RampTrace::new(Vec::new(), targets.clone(), magnitude(&targets), params.clone());

        Ok(Self {
            params,
            targets,
            trace,
        })
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    pub fn target_radius(&self) -> f64 {
        magnitude(&self.targets)
    }

    pub fn trace(&self) -> &RampTrace {
        &self.trace
    }

    pub fn into_trace(self) -> RampTrace {
        self.trace
    }

    /// Ramp the axes to their set points without letting the field magnitude exceed
    /// `combined_field_limit`.
    ///
    /// Every failure which leaves the ramp unfinished pauses all axes before returning.
    pub fn run(
        &mut self,
        axes: &mut [AxisChannel],
        clock: &dyn Clock,
        cancel: &CancelToken,
    ) -> Result<RampOutcome, RampError> {
        if axes.len() != self.targets.len() {
            return Err(RampError::AxisCountMismatch {
                axes: axes.len(),
                targets: self.targets.len(),
            });
        }

        self.trace.axes = axes.iter().map(|a| a.id()).collect();

        let result = match self.drive(axes, clock, cancel) {
            Err(RampError::Axis(e)) => {
                error!("{}, pausing all axes", e);
                pause_all(axes);
                Err(RampError::Axis(e))
            }
            r => r,
        };

        self.trace.outcome = match &result {
            Ok(o) => o.to_string(),
            Err(e) => e.to_string(),
        };

        result
    }

    fn drive(
        &mut self,
        axes: &mut [AxisChannel],
        clock: &dyn Clock,
        cancel: &CancelToken,
    ) -> Result<RampOutcome, RampError> {
        let start = clock.now();

        // No axis may be moving while set points are rewritten
        for axis in axes.iter_mut() {
            axis.pause_ramp()?;
        }

        let target_radius = self.target_radius();
        if target_radius >= self.params.combined_field_limit {
            warn!(
                "Target magnitude {:.4} T is not below the limit of {:.4} T, ramp refused",
                target_radius, self.params.combined_field_limit
            );
            return Err(RampError::LimitExceeded {
                radius: target_radius,
                limit: self.params.combined_field_limit,
            });
        }

        for (axis, target) in axes.iter_mut().zip(self.targets.iter()) {
            axis.set_set_point(*target)?;
        }

        let fields = read_fields(axes)?;
        let initial = plan_initial(&self.params, &self.targets, &fields);
        let radius = magnitude(&fields);
        let zone = Zone::of(&self.params, radius);

        info!(
            "Ramping to {:?} ({:.4} T) from {:.4} T in the {} zone",
            self.targets, target_radius, radius, zone
        );

        execute(axes, &initial)?;
        self.trace.push(
            0.0,
            &fields,
            &StepPlan {
                zone,
                radius,
                ramping: 0,
                actions: initial,
                complete: false,
            },
        );

        let mut states = read_states(axes)?;

        loop {
            if cancel.is_cancelled() {
                info!("Ramp cancelled, pausing all axes");
                pause_all(axes);
                return Ok(RampOutcome::Cancelled);
            }

            let elapsed = clock.now().checked_sub(start).unwrap_or_default().as_secs_f64();
            if elapsed > self.params.max_ramp_duration_s {
                error!("Ramp timed out after {:.1} s, pausing all axes", elapsed);
                pause_all(axes);
                return Err(RampError::Timeout { elapsed });
            }

            let fields = read_fields(axes)?;
            let radius = magnitude(&fields);
            if radius > self.params.combined_field_limit {
                error!(
                    "Field magnitude {:.4} T exceeds the limit of {:.4} T, pausing all axes",
                    radius, self.params.combined_field_limit
                );
                pause_all(axes);
                return Err(RampError::LimitExceeded {
                    radius,
                    limit: self.params.combined_field_limit,
                });
            }

            let plan = plan_step(&self.params, &self.targets, &fields, &states);
            debug!(
                "{:8.1} s | {:?} | {:.4} T | {} | {} ramping | {:?}",
                elapsed, fields, plan.radius, plan.zone, plan.ramping, plan.actions
            );
            self.trace.push(elapsed, &fields, &plan);

            if plan.complete {
                return self.finish(axes, clock);
            }

            execute(axes, &plan.actions)?;

            states = read_states(axes)?;
            if states.iter().all(|s| *s == RampState::Holding) {
                return self.finish(axes, clock);
            }

            clock.sleep(secs_to_duration(self.params.poll_interval_s));
        }
    }

    fn finish(
        &mut self,
        axes: &mut [AxisChannel],
        clock: &dyn Clock,
    ) -> Result<RampOutcome, RampError> {
        clock.sleep(secs_to_duration(self.params.completion_settle_s));

        for axis in axes.iter_mut() {
            axis.pause_ramp()?;
        }

        info!(
            "Ramp complete, peak magnitude {:.4} T",
            self.trace.peak_radius()
        );

        Ok(RampOutcome::Success)
    }
}

impl fmt::Display for RampOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RampOutcome::Success => write!(f, "Success"),
            RampOutcome::Cancelled => write!(f, "Cancelled"),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Pause every axis, logging rather than returning failures so that each axis is tried.
pub fn pause_all(axes: &mut [AxisChannel]) {
    for axis in axes.iter_mut() {
        if let Err(e) = axis.pause_ramp() {
            error!("Could not pause axis {}: {}", axis.id(), e);
        }
    }
}

fn read_fields(axes: &mut [AxisChannel]) -> Result<Vec<f64>, AxisError> {
    axes.iter_mut().map(|a| a.get_field()).collect()
}

fn read_states(axes: &mut [AxisChannel]) -> Result<Vec<RampState>, AxisError> {
    axes.iter_mut().map(|a| a.get_ramp_state()).collect()
}

fn execute(axes: &mut [AxisChannel], actions: &[AxisAction]) -> Result<(), AxisError> {
    for action in actions {
        match *action {
            AxisAction::Start(i) => axes[i].start_ramp()?,
            AxisAction::Pause(i) => axes[i].pause_ramp()?,
        }
    }
    Ok(())
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
