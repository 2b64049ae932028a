//! # Magnet facade
//!
//! The facade is the single entry point for reading and writing magnet quantities. Vector
//! quantities go through [`VectorState`] and the [`RampCoordinator`], per-axis quantities are
//! passed to the matching [`AxisChannel`].
//!
//! Per-axis field writes are checked against the combined field limit using the live fields of
//! the other axes, since they bypass the coordinator.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{error, info, warn};
use std::convert::TryFrom;
use std::sync::Arc;
use thiserror::Error;

use magnet_if::{
    ami430::FieldUnits,
    quantity::{AxisAttr, AxisId, Quantity, QuantityError, QuantityValue, VectorAttr},
    transport::{TcpOptions, TcpTransport, TransportError},
};
use util::{maths::magnitude, time::secs_to_duration};

use crate::axis_channel::{AxisChannel, AxisError, AxisTiming};
use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::params::{Geometry, MagnetExecParams, ParamsError};
use crate::ramp_coord::{RampCoordinator, RampError, RampOutcome, RampParams, RampTrace};
use crate::vector_state::VectorState;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct MagnetFacade {
    /// Axes in geometry order
    axes: Vec<AxisChannel>,

    vector: VectorState,
    ramp_params: RampParams,
    clock: Arc<dyn Clock>,
    cancel: CancelToken,

    /// Trace of the most recent vector ramp, until taken
    last_trace: Option<RampTrace>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq)]
pub enum SetOutcome {
    /// The value actually applied. For `persistent` this is whether the mode was reached.
    Done(QuantityValue),

    /// The write started a ramp which was cancelled
    Cancelled,
}

#[derive(Debug, Error)]
pub enum FacadeError {
    #[error("{0} is not available on this magnet")]
    NotAvailable(Quantity),

    #[error("{1} is not a valid value for {0}")]
    InvalidValue(Quantity, QuantityValue),

    #[error("Axis {0} is not ready to ramp")]
    NotReady(AxisId),

    #[error("{0}")]
    Quantity(#[from] QuantityError),

    #[error("{0}")]
    Axis(#[from] AxisError),

    #[error("{0}")]
    Ramp(#[from] RampError),

    #[error("Invalid magnet configuration: {0}")]
    Params(#[from] ParamsError),

    #[error("Could not connect to axis {0}: {1}")]
    Transport(AxisId, TransportError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MagnetFacade {
    /// Build a facade over already connected axes, which must be given in geometry order.
    pub fn new(
        geometry: Geometry,
        axes: Vec<AxisChannel>,
        ramp_params: RampParams,
        clock: Arc<dyn Clock>,
        cancel: CancelToken,
    ) -> Result<Self, FacadeError> {
        geometry.validate()?;
        ramp_params.validate()?;

        let expected = geometry.axes();
        let found: Vec<AxisId> = axes.iter().map(|a| a.id()).collect();
        if expected != found {
            return Err(ParamsError::AxisMismatch { expected, found }.into());
        }

        Ok(Self {
            axes,
            vector: VectorState::new(geometry),
            ramp_params,
            clock,
            cancel,
            last_trace: None,
        })
    }

    /// Connect to every programmer named in the parameters.
    pub fn open(
        params: &MagnetExecParams,
        clock: Arc<dyn Clock>,
        cancel: CancelToken,
    ) -> Result<Self, FacadeError> {
        let options = TcpOptions {
            connect_timeout: secs_to_duration(params.transport.connect_timeout_s),
            read_timeout: secs_to_duration(params.transport.read_timeout_s),
            banner_timeout: secs_to_duration(params.transport.banner_timeout_s),
        };
        let timing = AxisTiming::from(&params.timing);

        let mut axes = Vec::new();
        for p in params.ordered_axes() {
            let transport = match TcpTransport::open(&p.address, options) {
                Ok(t) => t,
                Err(e) => return Err(FacadeError::Transport(p.id, e)),
            };
            info!("Axis {} connected to {}", p.id, transport.addr());

            axes.push(AxisChannel::new(
                p.id,
                p.field_rating,
                Box::new(transport),
                clock.clone(),
                timing,
            ));
        }

        Self::new(params.geometry, axes, params.ramp.clone(), clock, cancel)
    }

    /// Take the constant coordinates from the live field, unless the magnet is at zero.
    pub fn seed_constants(&mut self) -> Result<(), FacadeError> {
        let fields = self.read_fields()?;

        if magnitude(&fields) > 0.0 {
            self.vector.seed(&fields);
            info!(
                "Constants seeded from the live field: radius {:.4} T, phi {:.2} deg, theta {:.2} deg",
                self.vector.constant_radius, self.vector.constant_phi, self.vector.constant_theta
            );
        }

        Ok(())
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn vector(&self) -> &VectorState {
        &self.vector
    }

    /// Trace of the last vector ramp, if it hasn't been taken yet.
    pub fn take_trace(&mut self) -> Option<RampTrace> {
        self.last_trace.take()
    }

    // ---- GET ----

    pub fn get(&mut self, quantity: Quantity) -> Result<QuantityValue, FacadeError> {
        match quantity {
            Quantity::Vector(attr) => self.get_vector(quantity, attr),
            Quantity::Axis(id, attr) => {
                let axis = self.axis_mut(quantity, id)?;
                get_axis(axis, quantity, attr)
            }
        }
    }

    fn get_vector(
        &mut self,
        quantity: Quantity,
        attr: VectorAttr,
    ) -> Result<QuantityValue, FacadeError> {
        let v = match attr {
            VectorAttr::ConstantRadius => self.vector.constant_radius,
            VectorAttr::ConstantPhi => self.vector.constant_phi,
            VectorAttr::ConstantTheta if self.vector.has_theta() => self.vector.constant_theta,
            VectorAttr::ConstantTheta => return Err(FacadeError::NotAvailable(quantity)),
            VectorAttr::Radius => {
                let fields = self.read_fields()?;
                self.vector.radius(&fields)
            }
            VectorAttr::Phi => {
                let fields = self.read_fields()?;
                self.vector.phi(&fields)
            }
            VectorAttr::Theta => {
                if !self.vector.has_theta() {
                    return Err(FacadeError::NotAvailable(quantity));
                }
                let fields = self.read_fields()?;
                self.vector
                    .theta(&fields)
                    .ok_or(FacadeError::NotAvailable(quantity))?
            }
        };

        Ok(QuantityValue::Float(v))
    }

    // ---- SET ----

    pub fn set(
        &mut self,
        quantity: Quantity,
        value: QuantityValue,
    ) -> Result<SetOutcome, FacadeError> {
        if !quantity.is_settable() {
            return Err(QuantityError::ReadOnly(quantity).into());
        }

        match quantity {
            Quantity::Vector(attr) => self.set_vector(quantity, attr, value),
            Quantity::Axis(id, attr) => self.set_axis(quantity, id, attr, value),
        }
    }

    fn set_vector(
        &mut self,
        quantity: Quantity,
        attr: VectorAttr,
        value: QuantityValue,
    ) -> Result<SetOutcome, FacadeError> {
        let v = float(quantity, &value)?;

        match attr {
            VectorAttr::ConstantRadius => {
                non_negative(quantity, v)?;
                self.vector.constant_radius = v;
            }
            VectorAttr::ConstantPhi => self.vector.constant_phi = v,
            VectorAttr::ConstantTheta => {
                if !self.vector.has_theta() {
                    return Err(FacadeError::NotAvailable(quantity));
                }
                self.vector.constant_theta = v;
            }
            VectorAttr::Radius => {
                non_negative(quantity, v)?;
                let targets = self.vector.target_for_radius(v);
                if self.ramp_vector(targets)? == RampOutcome::Cancelled {
                    return Ok(SetOutcome::Cancelled);
                }
                self.vector.constant_radius = v;
            }
            VectorAttr::Phi => {
                let targets = self.vector.target_for_phi(v);
                if self.ramp_vector(targets)? == RampOutcome::Cancelled {
                    return Ok(SetOutcome::Cancelled);
                }
                self.vector.constant_phi = v;
            }
            VectorAttr::Theta => {
                let targets = self
                    .vector
                    .target_for_theta(v)
                    .ok_or(FacadeError::NotAvailable(quantity))?;
                if self.ramp_vector(targets)? == RampOutcome::Cancelled {
                    return Ok(SetOutcome::Cancelled);
                }
                self.vector.constant_theta = v;
            }
        }

        Ok(SetOutcome::Done(QuantityValue::Float(v)))
    }

    /// Run a vector ramp to the given axis fields, keeping its trace.
    fn ramp_vector(&mut self, targets: Vec<f64>) -> Result<RampOutcome, FacadeError> {
        for axis in self.axes.iter_mut() {
            if !axis.is_ready_to_ramp()? {
                return Err(FacadeError::NotReady(axis.id()));
            }
        }

        let mut coord = RampCoordinator::new(self.ramp_params.clone(), targets)?;
        let result = coord.run(&mut self.axes, self.clock.as_ref(), &self.cancel);
        self.last_trace = Some(coord.into_trace());

        Ok(result?)
    }

    fn set_axis(
        &mut self,
        quantity: Quantity,
        id: AxisId,
        attr: AxisAttr,
        value: QuantityValue,
    ) -> Result<SetOutcome, FacadeError> {
        let index = self.axis_index(quantity, id)?;

        match attr {
            AxisAttr::Field | AxisAttr::SetPoint => {
                let v = float(quantity, &value)?;
                self.check_single_axis(index, v)?;

                let axis = &mut self.axes[index];
                if attr == AxisAttr::Field {
                    if !axis.is_ready_to_ramp()? {
                        return Err(FacadeError::NotReady(id));
                    }
                    axis.set_field(v)?;
                } else {
                    axis.set_set_point(v)?;
                }
            }
            AxisAttr::Current => {
                let v = float(quantity, &value)?;
                self.axes[index].set_current(v)?;
            }
            AxisAttr::RampRate => {
                let v = float(quantity, &value)?;
                if !(v.is_finite() && v > 0.0) {
                    return Err(FacadeError::InvalidValue(quantity, value));
                }
                self.axes[index].set_ramp_rate(v)?;
            }
            AxisAttr::Units => {
                let units = value
                    .as_i64()
                    .and_then(|u| FieldUnits::try_from(u).ok())
                    .ok_or_else(|| FacadeError::InvalidValue(quantity, value.clone()))?;
                self.axes[index].set_units(units)?;
            }
            AxisAttr::PSwitch => {
                let on = boolean(quantity, &value)?;
                self.axes[index].set_switch_heater(on)?;
            }
            AxisAttr::Persistent => {
                let on = boolean(quantity, &value)?;
                let achieved = self.axes[index].set_persistent(on)?;
                if !achieved {
                    error!(
                        "Axis {}: persistent mode could not be {}",
                        id,
                        if on { "entered" } else { "left" }
                    );
                }
                return Ok(SetOutcome::Done(QuantityValue::Bool(achieved)));
            }
            AxisAttr::Quench => {
                // Only clearing a quench makes sense
                if boolean(quantity, &value)? {
                    return Err(FacadeError::InvalidValue(quantity, value));
                }
                self.axes[index].reset_quench()?;
            }
            AxisAttr::Ramp => {
                let axis = &mut self.axes[index];
                if !axis.is_ready_to_ramp()? {
                    return Err(FacadeError::NotReady(id));
                }
                axis.start_ramp()?;
            }
            AxisAttr::Pause => self.axes[index].pause_ramp()?,
            AxisAttr::Zero => self.axes[index].ramp_to_zero()?,
            AxisAttr::RampState | AxisAttr::Error => {
                return Err(QuantityError::ReadOnly(quantity).into())
            }
        }

        Ok(SetOutcome::Done(value))
    }

    /// Refuse a single axis set point which would put the vector at or over the limit.
    fn check_single_axis(&mut self, index: usize, value: f64) -> Result<(), FacadeError> {
        let mut fields = self.read_fields()?;
        fields[index] = value;

        let radius = magnitude(&fields);
        let limit = self.ramp_params.combined_field_limit;
        if radius >= limit {
            warn!(
                "Axis {} set point of {} T refused, magnitude would be {:.4} T",
                self.axes[index].id(),
                value,
                radius
            );
            return Err(RampError::LimitExceeded { radius, limit }.into());
        }

        Ok(())
    }

    fn read_fields(&mut self) -> Result<Vec<f64>, AxisError> {
        self.axes.iter_mut().map(|a| a.get_field()).collect()
    }

    fn axis_index(&self, quantity: Quantity, id: AxisId) -> Result<usize, FacadeError> {
        self.axes
            .iter()
            .position(|a| a.id() == id)
            .ok_or(FacadeError::NotAvailable(quantity))
    }

    fn axis_mut(&mut self, quantity: Quantity, id: AxisId) -> Result<&mut AxisChannel, FacadeError> {
        let index = self.axis_index(quantity, id)?;
        Ok(&mut self.axes[index])
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn get_axis(
    axis: &mut AxisChannel,
    quantity: Quantity,
    attr: AxisAttr,
) -> Result<QuantityValue, FacadeError> {
    let value = match attr {
        AxisAttr::Field => QuantityValue::Float(axis.get_field()?),
        AxisAttr::SetPoint => QuantityValue::Float(axis.get_set_point()?),
        AxisAttr::Current => QuantityValue::Float(axis.get_current()?),
        AxisAttr::RampRate => QuantityValue::Float(axis.get_ramp_rate()?),
        AxisAttr::Units => QuantityValue::Int(axis.get_units()? as i64),
        AxisAttr::RampState => QuantityValue::Int(axis.get_ramp_state()? as i64),
        AxisAttr::PSwitch => QuantityValue::Bool(axis.get_switch_heater()?),
        AxisAttr::Persistent => QuantityValue::Bool(axis.get_persistent()?),
        AxisAttr::Quench => QuantityValue::Bool(axis.get_quench()?),
        AxisAttr::Error => QuantityValue::Text(axis.get_error()?),
        AxisAttr::Ramp | AxisAttr::Pause | AxisAttr::Zero => {
            return Err(QuantityError::WriteOnly(quantity).into())
        }
    };

    Ok(value)
}

fn float(quantity: Quantity, value: &QuantityValue) -> Result<f64, FacadeError> {
    match value.as_f64() {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(FacadeError::InvalidValue(quantity, value.clone())),
    }
}

fn boolean(quantity: Quantity, value: &QuantityValue) -> Result<bool, FacadeError> {
    value
        .as_bool()
        .ok_or_else(|| FacadeError::InvalidValue(quantity, value.clone()))
}

fn non_negative(quantity: Quantity, v: f64) -> Result<(), FacadeError> {
    if v < 0.0 {
        Err(FacadeError::InvalidValue(quantity, QuantityValue::Float(v)))
    } else {
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::{sim_axes, SimClock, SimHandle};
    use magnet_if::ami430::RampState;
    use std::time::Duration;

    const TOL: f64 = 1e-6;

    fn timing() -> AxisTiming {
        AxisTiming {
            settle: Duration::from_millis(50),
            switch_settle: Duration::from_millis(500),
            switch_poll: Duration::from_millis(300),
            switch_timeout: Duration::from_secs(120),
            zero_settle: Duration::from_secs(2),
            zero_timeout: Duration::from_secs(1800),
        }
    }

    fn ramp_params(restart: f64, stop: f64, limit: f64) -> RampParams {
        RampParams {
            combined_field_limit: limit,
            restart_all_threshold: restart,
            stop_threshold: stop,
            poll_interval_s: 0.5,
            completion_settle_s: 1.0,
            max_ramp_duration_s: 3600.0,
            at_target_tolerance: 1e-4,
        }
    }

    /// Planar z/y magnet limited to 2.9 T.
    fn planar(z: f64, y: f64) -> (MagnetFacade, Vec<SimHandle>, Arc<SimClock>) {
        let clock = Arc::new(SimClock::new());
        let (axes, handles) = sim_axes(
            &[(AxisId::Z, z, 8.99), (AxisId::Y, y, 2.99)],
            clock.clone(),
            timing(),
        );
        for h in handles.iter() {
            h.set_ramp_rate(0.1);
        }

        let facade = MagnetFacade::new(
            Geometry::Planar {
                a: AxisId::Z,
                b: AxisId::Y,
            },
            axes,
            ramp_params(2.8, 2.85, 2.9),
            clock.clone(),
            CancelToken::new(),
        );

        match facade {
            Ok(f) => (f, handles, clock),
            Err(e) => panic!("Could not build facade: {}", e),
        }
    }

    /// Spherical x/y/z magnet limited to 0.9 T.
    fn spherical() -> (MagnetFacade, Vec<SimHandle>, Arc<SimClock>) {
        let clock = Arc::new(SimClock::new());
        let (axes, handles) = sim_axes(
            &[
                (AxisId::X, 0.0, 1.01),
                (AxisId::Y, 0.0, 0.98),
                (AxisId::Z, 0.0, 5.99),
            ],
            clock.clone(),
            timing(),
        );

        let facade = MagnetFacade::new(
            Geometry::Spherical,
            axes,
            ramp_params(0.8, 0.85, 0.9),
            clock.clone(),
            CancelToken::new(),
        );

        match facade {
            Ok(f) => (f, handles, clock),
            Err(e) => panic!("Could not build facade: {}", e),
        }
    }

    fn q(name: &str) -> Quantity {
        match name.parse() {
            Ok(q) => q,
            Err(e) => panic!("{}", e),
        }
    }

    fn float_of(v: QuantityValue) -> f64 {
        v.as_f64().unwrap_or(f64::NAN)
    }

    #[test]
    fn test_axes_must_match_geometry() {
        let clock = Arc::new(SimClock::new());
        let (axes, _) = sim_axes(
            &[(AxisId::Y, 0.0, 2.99), (AxisId::Z, 0.0, 8.99)],
            clock.clone(),
            timing(),
        );

        let result = MagnetFacade::new(
            Geometry::Planar {
                a: AxisId::Z,
                b: AxisId::Y,
            },
            axes,
            ramp_params(2.8, 2.85, 2.9),
            clock,
            CancelToken::new(),
        );
        assert!(matches!(
            result,
            Err(FacadeError::Params(ParamsError::AxisMismatch { .. }))
        ));
    }

    #[test]
    fn test_get_vector_and_axis() -> Result<(), FacadeError> {
        let (mut facade, _, _) = planar(0.0, 2.0);

        assert!((float_of(facade.get(q("radius"))?) - 2.0).abs() < TOL);
        assert!((float_of(facade.get(q("phi"))?) - 90.0).abs() < TOL);
        assert!((float_of(facade.get(q("y_field"))?) - 2.0).abs() < TOL);
        assert_eq!(
            facade.get(q("z_rampState"))?,
            QuantityValue::Int(RampState::AtZero as i64)
        );
        assert_eq!(facade.get(q("y_persistent"))?, QuantityValue::Bool(false));

        assert!(matches!(
            facade.get(q("theta")),
            Err(FacadeError::NotAvailable(_))
        ));
        assert!(matches!(
            facade.get(q("x_field")),
            Err(FacadeError::NotAvailable(_))
        ));

        Ok(())
    }

    #[test]
    fn test_seed_constants() -> Result<(), FacadeError> {
        let (mut facade, _, _) = planar(1.0, 1.0);
        facade.seed_constants()?;

        assert!((facade.vector().constant_radius - 2f64.sqrt()).abs() < TOL);
        assert!((facade.vector().constant_phi - 45.0).abs() < TOL);

        // At zero the defaults are kept
        let (mut facade, _, _) = planar(0.0, 0.0);
        facade.set(q("constant_phi"), QuantityValue::Float(30.0))?;
        facade.seed_constants()?;
        assert_eq!(facade.vector().constant_phi, 30.0);

        Ok(())
    }

    #[test]
    fn test_set_radius_ramps_along_constant_angles() -> Result<(), FacadeError> {
        let (mut facade, handles, _) = spherical();
        facade.set(q("constant_theta"), QuantityValue::Float(90.0))?;
        facade.set(q("constant_phi"), QuantityValue::Float(90.0))?;

        let outcome = facade.set(q("radius"), QuantityValue::Float(0.5))?;
        assert_eq!(outcome, SetOutcome::Done(QuantityValue::Float(0.5)));

        assert!(handles[0].field().abs() < TOL);
        assert!((handles[1].field() - 0.5).abs() < TOL);
        assert!(handles[2].field().abs() < TOL);
        assert_eq!(facade.vector().constant_radius, 0.5);

        let trace = facade.take_trace().ok_or(FacadeError::NotAvailable(q("radius")))?;
        assert_eq!(trace.outcome, "Success");
        assert!(facade.take_trace().is_none());

        Ok(())
    }

    #[test]
    fn test_set_phi_holds_radius() -> Result<(), FacadeError> {
        let (mut facade, handles, _) = planar(1.0, 0.0);
        facade.seed_constants()?;

        facade.set(q("phi"), QuantityValue::Float(90.0))?;

        assert!(handles[0].field().abs() < TOL);
        assert!((handles[1].field() - 1.0).abs() < TOL);
        assert_eq!(facade.vector().constant_phi, 90.0);
        assert!((facade.vector().constant_radius - 1.0).abs() < TOL);

        assert!(matches!(
            facade.set(q("theta"), QuantityValue::Float(10.0)),
            Err(FacadeError::NotAvailable(_))
        ));

        Ok(())
    }

    #[test]
    fn test_radius_over_limit_keeps_constants() -> Result<(), FacadeError> {
        let (mut facade, handles, _) = spherical();

        assert!(matches!(
            facade.set(q("radius"), QuantityValue::Float(0.95)),
            Err(FacadeError::Ramp(RampError::LimitExceeded { .. }))
        ));
        assert_eq!(facade.vector().constant_radius, 0.0);
        assert!(handles.iter().all(|h| h.field() == 0.0));

        assert!(matches!(
            facade.set(q("radius"), QuantityValue::Float(-0.1)),
            Err(FacadeError::InvalidValue(_, _))
        ));

        Ok(())
    }

    #[test]
    fn test_cancelled_ramp_keeps_constants() -> Result<(), FacadeError> {
        let (mut facade, handles, clock) = planar(0.0, 0.0);
        clock.cancel_at(Duration::from_secs(3), facade.cancel_token());

        let outcome = facade.set(q("radius"), QuantityValue::Float(2.0))?;
        assert_eq!(outcome, SetOutcome::Cancelled);
        assert_eq!(facade.vector().constant_radius, 0.0);
        assert_eq!(handles[0].state(), RampState::Paused);

        Ok(())
    }

    #[test]
    fn test_single_axis_field_checked_against_limit() -> Result<(), FacadeError> {
        let (mut facade, handles, _) = planar(2.8, 0.0);

        assert!(matches!(
            facade.set(q("y_field"), QuantityValue::Float(1.0)),
            Err(FacadeError::Ramp(RampError::LimitExceeded { .. }))
        ));
        assert!(!handles[1]
            .commands()
            .iter()
            .any(|c| c.starts_with("CONF:FIELD:TARG")));

        let outcome = facade.set(q("y_field"), QuantityValue::Float(0.5))?;
        assert_eq!(outcome, SetOutcome::Done(QuantityValue::Float(0.5)));
        assert_eq!(handles[1].state(), RampState::Ramping);

        // The current bypasses the check
        facade.set(q("y_current"), QuantityValue::Float(40.0))?;

        Ok(())
    }

    #[test]
    fn test_ramp_gated_by_readiness() -> Result<(), FacadeError> {
        let (mut facade, handles, _) = planar(1.0, 0.0);
        handles[0].quench();

        assert!(matches!(
            facade.set(q("z_ramp"), QuantityValue::Trigger),
            Err(FacadeError::NotReady(AxisId::Z))
        ));
        assert!(matches!(
            facade.set(q("radius"), QuantityValue::Float(1.5)),
            Err(FacadeError::NotReady(AxisId::Z))
        ));

        // Only clearing a quench is accepted
        assert!(matches!(
            facade.set(q("z_quench"), QuantityValue::Bool(true)),
            Err(FacadeError::InvalidValue(_, _))
        ));
        facade.set(q("z_quench"), QuantityValue::Bool(false))?;

        facade.set(q("z_ramp"), QuantityValue::Trigger)?;
        assert_eq!(handles[0].commands().last().map(|c| c.as_str()), Some("RAMP"));

        Ok(())
    }

    #[test]
    fn test_persistent_reports_achieved_mode() -> Result<(), FacadeError> {
        let (mut facade, handles, _) = planar(1.0, 0.0);

        let outcome = facade.set(q("z_persistent"), QuantityValue::Bool(true))?;
        assert_eq!(outcome, SetOutcome::Done(QuantityValue::Bool(true)));
        assert!(handles[0].snapshot().persistent());

        // Refused under manual control, reported rather than raised
        handles[1].set_state(RampState::ManualUp);
        let outcome = facade.set(q("y_persistent"), QuantityValue::Bool(true))?;
        assert_eq!(outcome, SetOutcome::Done(QuantityValue::Bool(false)));

        Ok(())
    }

    #[test]
    fn test_axis_settings() -> Result<(), FacadeError> {
        let (mut facade, handles, _) = planar(0.0, 0.0);

        facade.set(q("z_rampRate"), QuantityValue::Float(0.02))?;
        assert!((float_of(facade.get(q("z_rampRate"))?) - 0.02).abs() < TOL);
        assert!(matches!(
            facade.set(q("z_rampRate"), QuantityValue::Float(0.0)),
            Err(FacadeError::InvalidValue(_, _))
        ));

        facade.set(q("y_units"), QuantityValue::Int(0))?;
        assert_eq!(facade.get(q("y_units"))?, QuantityValue::Int(0));
        assert!(matches!(
            facade.set(q("y_units"), QuantityValue::Int(4)),
            Err(FacadeError::InvalidValue(_, _))
        ));

        assert!(matches!(
            facade.set(q("z_rampState"), QuantityValue::Int(1)),
            Err(FacadeError::Quantity(QuantityError::ReadOnly(_)))
        ));

        facade.set(q("z_pause"), QuantityValue::Trigger)?;
        assert_eq!(handles[0].state(), RampState::Paused);

        Ok(())
    }
}
