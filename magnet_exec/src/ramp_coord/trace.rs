//! Record of a vector ramp, saved to the session archive once the ramp ends

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;

use magnet_if::quantity::AxisId;

use super::{AxisAction, RampParams, StepPlan, Zone};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RampTrace {
    pub axes: Vec<AxisId>,

    /// Units: Tesla
    pub targets: Vec<f64>,

    /// Units: Tesla
    pub target_radius: f64,

    pub limits: RampParams,

    pub records: Vec<PollRecord>,

    /// How the ramp ended, empty while it is running
    pub outcome: String,
}

/// The live vector and the decision taken in one poll iteration.
#[derive(Debug, Clone, Serialize)]
pub struct PollRecord {
    /// Time since the ramp started.
    ///
    /// Units: seconds
    pub elapsed_s: f64,

    /// Units: Tesla
    pub fields: Vec<f64>,

    /// Units: Tesla
    pub radius: f64,

    pub zone: Zone,
    pub ramping: usize,
    pub actions: Vec<AxisAction>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RampTrace {
    pub fn new(axes: Vec<AxisId>, targets: Vec<f64>, target_radius: f64, limits: RampParams) -> Self {
        Self {
            axes,
            targets,
            target_radius,
            limits,
            records: Vec::new(),
            outcome: String::new(),
        }
    }

    pub fn push(&mut self, elapsed_s: f64, fields: &[f64], plan: &StepPlan) {
        self.records.push(PollRecord {
            elapsed_s,
            fields: fields.to_vec(),
            radius: plan.radius,
            zone: plan.zone,
            ramping: plan.ramping,
            actions: plan.actions.clone(),
        });
    }

    /// Largest magnitude seen by any poll.
    pub fn peak_radius(&self) -> f64 {
        self.records.iter().map(|r| r.radius).fold(0.0, f64::max)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::ramp_coord::plan_step;
    use magnet_if::ami430::RampState;

    fn limits() -> RampParams {
        RampParams {
            combined_field_limit: 2.9,
            restart_all_threshold: 2.8,
            stop_threshold: 2.85,
            poll_interval_s: 0.5,
            completion_settle_s: 1.0,
            max_ramp_duration_s: 3600.0,
            at_target_tolerance: 1e-4,
        }
    }

    fn trace() -> RampTrace {
        let targets = vec![2.5, 0.9];
        let mut trace = RampTrace::new(vec![AxisId::Z, AxisId::Y], targets.clone(), 2.657, limits());

        for fields in [[2.0, 0.0], [2.86, 0.2], [2.7, 0.3]].iter() {
            let plan = plan_step(
                &limits(),
                &targets,
                fields,
                &[RampState::Ramping, RampState::Ramping],
            );
            trace.push(0.5 * trace.records.len() as f64, fields, &plan);
        }

        trace
    }

    #[test]
    fn test_peak_radius() {
        let t = trace();

        assert_eq!(t.records.len(), 3);
        assert!((t.peak_radius() - (2.86f64.powi(2) + 0.2f64.powi(2)).sqrt()).abs() < 1e-9);
        assert_eq!(RampTrace::new(vec![], vec![], 0.0, limits()).peak_radius(), 0.0);
    }

    #[test]
    fn test_serialises_for_the_archive() -> Result<(), serde_json::Error> {
        let mut t = trace();
        t.outcome = "Success".into();

        let json = serde_json::to_value(&t)?;

        assert_eq!(json["axes"], serde_json::json!(["z", "y"]));
        assert_eq!(json["limits"]["stop_threshold"], serde_json::json!(2.85));
        assert_eq!(json["records"][0]["zone"], serde_json::json!("safe"));
        assert_eq!(json["records"][1]["zone"], serde_json::json!("danger"));
        assert_eq!(json["records"][1]["ramping"], serde_json::json!(2));
        assert_eq!(json["records"][1]["actions"], serde_json::json!([{ "Pause": 1 }]));
        assert_eq!(json["outcome"], serde_json::json!("Success"));

        Ok(())
    }
}
