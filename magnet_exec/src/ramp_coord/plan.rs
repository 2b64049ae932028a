//! Zone based dispatch decisions
//!
//! These functions decide which axes may move given the live field vector. They perform no I/O so
//! every decision the coordinator makes can be checked without a power supply.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;
use std::fmt;

use magnet_if::ami430::RampState;
use util::maths::magnitude;

use super::RampParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The decision taken in one poll iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepPlan {
    pub zone: Zone,

    /// Units: Tesla
    pub radius: f64,

    /// Number of axes which were ramping when the plan was made
    pub ramping: usize,

    pub actions: Vec<AxisAction>,

    /// No axis is moving and none is left to start
    pub complete: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Band of the field magnitude relative to the thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    /// Below `restart_all_threshold`, every axis may ramp
    Safe,

    /// Between the thresholds, only one axis is restarted at a time
    Grey,

    /// At or above `stop_threshold`, axes increasing the magnitude are stopped
    Danger,
}

/// Effect ramping an axis from its current field to its set point has on the magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Decreasing,
    Increasing,

    /// Already at the set point magnitude
    Steady,

    /// The field changes sign on the way
    Crossing,
}

/// A command for one axis, by index into the axis list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AxisAction {
    Start(usize),
    Pause(usize),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Zone {
    pub fn of(params: &RampParams, radius: f64) -> Self {
        if radius < params.restart_all_threshold {
            Zone::Safe
        } else if radius >= params.stop_threshold {
            Zone::Danger
        } else {
            Zone::Grey
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Zone::Safe => "safe",
            Zone::Grey => "grey",
            Zone::Danger => "danger",
        };
        write!(f, "{}", s)
    }
}

impl Direction {
    pub fn of(target: f64, current: f64) -> Self {
        if target * current < 0.0 {
            Direction::Crossing
        } else if target.abs() < current.abs() {
            Direction::Decreasing
        } else if target.abs() > current.abs() {
            Direction::Increasing
        } else {
            Direction::Steady
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Axes to start once the set points have been written.
///
/// In the safe zone every axis starts, otherwise only those whose motion reduces the magnitude.
pub fn plan_initial(params: &RampParams, targets: &[f64], fields: &[f64]) -> Vec<AxisAction> {
    let zone = Zone::of(params, magnitude(fields));

    targets
        .iter()
        .zip(fields.iter())
        .enumerate()
        .filter(|(_, (t, c))| {
            zone == Zone::Safe || Direction::of(**t, **c) == Direction::Decreasing
        })
        .map(|(i, _)| AxisAction::Start(i))
        .collect()
}

/// Decide the actions of one poll iteration from the live fields and ramp states.
///
/// The fields must already be known to be within `combined_field_limit`.
pub fn plan_step(
    params: &RampParams,
    targets: &[f64],
    fields: &[f64],
    states: &[RampState],
) -> StepPlan {
    let radius = magnitude(fields);
    let zone = Zone::of(params, radius);
    let ramping = states.iter().filter(|s| **s == RampState::Ramping).count();

    let mut actions = Vec::new();
    let mut complete = false;

    match zone {
        Zone::Danger if ramping > 1 => {
            for (i, state) in states.iter().enumerate() {
                if *state == RampState::Ramping
                    && Direction::of(targets[i], fields[i]) == Direction::Increasing
                {
                    actions.push(AxisAction::Pause(i));
                }
            }
        }
        Zone::Danger | Zone::Grey if ramping == 0 => {
            match first_eligible(params, targets, fields, states) {
                Some(i) => actions.push(AxisAction::Start(i)),
                None => complete = true,
            }
        }
        Zone::Safe => {
            for (i, state) in states.iter().enumerate() {
                if *state == RampState::Paused {
                    actions.push(AxisAction::Start(i));
                }
            }
        }
        _ => (),
    }

    StepPlan {
        zone,
        radius,
        ramping,
        actions,
        complete,
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// First paused axis, in axis order, which has not reached its set point.
fn first_eligible(
    params: &RampParams,
    targets: &[f64],
    fields: &[f64],
    states: &[RampState],
) -> Option<usize> {
    (0..states.len()).find(|&i| {
        states[i] == RampState::Paused
            && (fields[i] - targets[i]).abs() > params.at_target_tolerance
    })
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use RampState::{Holding, Paused, Ramping};

    fn params_3d() -> RampParams {
        RampParams {
            combined_field_limit: 0.9,
            restart_all_threshold: 0.8,
            stop_threshold: 0.85,
            poll_interval_s: 0.5,
            completion_settle_s: 1.0,
            max_ramp_duration_s: 3600.0,
            at_target_tolerance: 1e-4,
        }
    }

    fn params_2d() -> RampParams {
        RampParams {
            combined_field_limit: 2.9,
            restart_all_threshold: 2.8,
            stop_threshold: 2.85,
            ..params_3d()
        }
    }

    #[test]
    fn test_zones() {
        let p = params_3d();
        assert_eq!(Zone::of(&p, 0.0), Zone::Safe);
        assert_eq!(Zone::of(&p, 0.79), Zone::Safe);
        assert_eq!(Zone::of(&p, 0.8), Zone::Grey);
        assert_eq!(Zone::of(&p, 0.849), Zone::Grey);
        assert_eq!(Zone::of(&p, 0.85), Zone::Danger);
    }

    #[test]
    fn test_direction() {
        assert_eq!(Direction::of(0.1, 0.5), Direction::Decreasing);
        assert_eq!(Direction::of(-0.1, -0.5), Direction::Decreasing);
        assert_eq!(Direction::of(0.0, 0.5), Direction::Decreasing);
        assert_eq!(Direction::of(0.9, 0.2), Direction::Increasing);
        assert_eq!(Direction::of(0.9, 0.0), Direction::Increasing);
        assert_eq!(Direction::of(0.3, 0.3), Direction::Steady);
        assert_eq!(Direction::of(-0.1, 0.5), Direction::Crossing);
    }

    #[test]
    fn test_initial_safe_starts_all() {
        let actions = plan_initial(&params_2d(), &[2.0, 1.0], &[0.0, 0.0]);
        assert_eq!(actions, vec![AxisAction::Start(0), AxisAction::Start(1)]);
    }

    #[test]
    fn test_initial_outside_safe_starts_decreasing_only() {
        // z: 2.86 -> 2.5 decreases, y: 0.2 -> 0.9 increases
        let actions = plan_initial(&params_2d(), &[2.5, 0.9], &[2.86, 0.2]);
        assert_eq!(actions, vec![AxisAction::Start(0)]);

        // Crossing zero is never started first
        let actions = plan_initial(&params_3d(), &[0.0, -0.1, 0.2], &[0.5, 0.5, 0.5]);
        assert_eq!(actions, vec![AxisAction::Start(0), AxisAction::Start(2)]);
    }

    #[test]
    fn test_danger_pauses_increasing_axis() {
        let plan = plan_step(&params_2d(), &[2.5, 0.9], &[2.86, 0.2], &[Ramping, Ramping]);

        assert_eq!(plan.zone, Zone::Danger);
        assert_eq!(plan.ramping, 2);
        assert_eq!(plan.actions, vec![AxisAction::Pause(1)]);
        assert!(!plan.complete);
    }

    #[test]
    fn test_danger_single_ramping_left_alone() {
        let plan = plan_step(&params_2d(), &[2.5, 0.9], &[2.86, 0.2], &[Ramping, Paused]);
        assert_eq!(plan.ramping, 1);
        assert!(plan.actions.is_empty());
        assert!(!plan.complete);
    }

    #[test]
    fn test_idle_resumes_exactly_one() {
        let p = params_3d();
        let fields = [0.5, 0.5, 0.5];

        let plan = plan_step(&p, &[0.1, 0.6, 0.2], &fields, &[Paused, Paused, Paused]);
        assert_eq!(plan.zone, Zone::Danger);
        assert_eq!(plan.actions, vec![AxisAction::Start(0)]);

        // Axes already at their set point are skipped
        let plan = plan_step(&p, &[0.5, 0.5, 0.2], &fields, &[Paused, Paused, Paused]);
        assert_eq!(plan.actions, vec![AxisAction::Start(2)]);

        // Grey zone behaves the same way when idle
        let fields = [0.82, 0.0, 0.0];
        let plan = plan_step(&p, &[0.82, 0.3, 0.0], &fields, &[Paused, Paused, Holding]);
        assert_eq!(plan.zone, Zone::Grey);
        assert_eq!(plan.actions, vec![AxisAction::Start(1)]);
    }

    #[test]
    fn test_idle_with_nothing_left_is_complete() {
        let p = params_3d();
        let fields = [0.5, 0.5, 0.5];

        let plan = plan_step(&p, &[0.5, 0.5, 0.5], &fields, &[Paused, Holding, Paused]);
        assert!(plan.actions.is_empty());
        assert!(plan.complete);
    }

    #[test]
    fn test_grey_with_ramping_axis_waits() {
        let p = params_3d();
        let plan = plan_step(&p, &[0.0, 0.3, 0.0], &[0.82, 0.0, 0.0], &[Ramping, Paused, Paused]);
        assert_eq!(plan.zone, Zone::Grey);
        assert!(plan.actions.is_empty());
        assert!(!plan.complete);
    }

    #[test]
    fn test_safe_resumes_all_paused() {
        let p = params_3d();
        let plan = plan_step(&p, &[0.5, 0.5, 0.5], &[0.1, 0.0, 0.0], &[Paused, Ramping, Paused]);
        assert_eq!(plan.zone, Zone::Safe);
        assert_eq!(
            plan.actions,
            vec![AxisAction::Start(0), AxisAction::Start(2)]
        );
    }
}
