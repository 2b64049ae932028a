//! # Axis Channel
//!
//! An [`AxisChannel`] owns the session with one AMI430 programmer and is the only way the rest of
//! the software talks to that power supply. Every command is followed by the configured settle
//! delay before the programmer is trusted again.
//!
//! Failed attempts to change the persistent mode are not errors: they are logged and reported
//! through the returned flag. Transport failures and unreadable replies are always errors.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, error, info, trace};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use magnet_if::{
    ami430::{self, Command, FieldUnits, RampState, ReplyError},
    quantity::AxisId,
    transport::{Transport, TransportError},
};
use util::time::secs_to_duration;

use crate::clock::Clock;
use crate::params::TimingParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Delays applied by an axis around its commands.
#[derive(Debug, Clone, Copy)]
pub struct AxisTiming {
    pub settle: Duration,
    pub switch_settle: Duration,
    pub switch_poll: Duration,
    pub switch_timeout: Duration,
    pub zero_settle: Duration,
    pub zero_timeout: Duration,
}

/// Last values read from the programmer.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AxisStatus {
    pub field: Option<f64>,
    pub ramp_state: Option<RampState>,
    pub set_point: Option<f64>,
    pub persistent: Option<bool>,
    pub quench: Option<bool>,
}

/// A single magnet axis and its power supply.
pub struct AxisChannel {
    id: AxisId,

    /// Upper bound sent with ramp rate configurations
    field_rating: f64,

    transport: Box<dyn Transport>,
    clock: Arc<dyn Clock>,
    timing: AxisTiming,
    status: AxisStatus,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AxisError {
    #[error("Axis {0}: {1}")]
    Transport(AxisId, TransportError),

    #[error("Axis {axis}: invalid reply to \"{command}\": {source}")]
    Protocol {
        axis: AxisId,
        command: Command,
        source: ReplyError,
    },

    #[error("Axis {0}: the switch heater did not settle within {1} s")]
    SwitchTimeout(AxisId, f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl From<&TimingParams> for AxisTiming {
    fn from(p: &TimingParams) -> Self {
        Self {
            settle: secs_to_duration(p.settle_s),
            switch_settle: secs_to_duration(p.switch_settle_s),
            switch_poll: secs_to_duration(p.switch_poll_s),
            switch_timeout: secs_to_duration(p.switch_timeout_s),
            zero_settle: secs_to_duration(p.zero_settle_s),
            zero_timeout: secs_to_duration(p.zero_timeout_s),
        }
    }
}

impl AxisChannel {
    pub fn new(
        id: AxisId,
        field_rating: f64,
        transport: Box<dyn Transport>,
        clock: Arc<dyn Clock>,
        timing: AxisTiming,
    ) -> Self {
        Self {
            id,
            field_rating,
            transport,
            clock,
            timing,
            status: AxisStatus::default(),
        }
    }

    pub fn id(&self) -> AxisId {
        self.id
    }

    /// Values seen the last time each quantity was read.
    pub fn status(&self) -> AxisStatus {
        self.status
    }

    // ---- RAMP ----

    pub fn get_ramp_state(&mut self) -> Result<RampState, AxisError> {
        let state = self.query_parse(Command::RampStateQuery, ami430::parse_ramp_state)?;

        if self.status.ramp_state != Some(state) {
            debug!("Axis {}: {}", self.id, state);
        }
        self.status.ramp_state = Some(state);

        Ok(state)
    }

    /// Field magnitude of the axis.
    ///
    /// Units: Tesla (or kilogauss if the programmer is set to it)
    pub fn get_field(&mut self) -> Result<f64, AxisError> {
        let field = self.query_parse(Command::FieldQuery, ami430::parse_float)?;
        self.status.field = Some(field);
        Ok(field)
    }

    pub fn get_set_point(&mut self) -> Result<f64, AxisError> {
        let target = self.query_parse(Command::FieldTargetQuery, ami430::parse_float)?;
        self.status.set_point = Some(target);
        Ok(target)
    }

    /// Pause the axis and write a new target field. Does not start ramping.
    pub fn set_set_point(&mut self, value: f64) -> Result<(), AxisError> {
        self.pause_ramp()?;
        self.write(Command::SetFieldTarget(value))?;
        self.status.set_point = Some(value);
        Ok(())
    }

    /// Ramp the axis to a new field.
    pub fn set_field(&mut self, value: f64) -> Result<(), AxisError> {
        self.set_set_point(value)?;
        self.start_ramp()
    }

    pub fn start_ramp(&mut self) -> Result<(), AxisError> {
        self.write(Command::Ramp)
    }

    pub fn pause_ramp(&mut self) -> Result<(), AxisError> {
        self.write(Command::Pause)
    }

    pub fn ramp_to_zero(&mut self) -> Result<(), AxisError> {
        self.write(Command::Zero)
    }

    pub fn get_ramp_rate(&mut self) -> Result<f64, AxisError> {
        self.query_parse(Command::RampRateQuery, ami430::parse_ramp_rate)
    }

    /// Set the ramp rate of the first ramp segment, bounded by the axis field rating.
    ///
    /// Units: Tesla/second
    pub fn set_ramp_rate(&mut self, rate: f64) -> Result<(), AxisError> {
        self.write(Command::SetRampRate {
            rate,
            field_rating: self.field_rating,
        })
    }

    // ---- CURRENT AND UNITS ----

    pub fn get_current(&mut self) -> Result<f64, AxisError> {
        self.query_parse(Command::CurrentQuery, ami430::parse_float)
    }

    /// Ramp the axis to a new supply current.
    pub fn set_current(&mut self, value: f64) -> Result<(), AxisError> {
        self.pause_ramp()?;
        self.write(Command::SetCurrentTarget(value))?;
        self.start_ramp()
    }

    pub fn get_units(&mut self) -> Result<FieldUnits, AxisError> {
        self.query_parse(Command::FieldUnitsQuery, ami430::parse_units)
    }

    pub fn set_units(&mut self, units: FieldUnits) -> Result<(), AxisError> {
        self.write(Command::SetFieldUnits(units))
    }

    /// Head of the programmer's error queue.
    pub fn get_error(&mut self) -> Result<String, AxisError> {
        self.query(Command::ErrorQuery)
            .map(|reply| reply.trim().to_string())
    }

    // ---- QUENCH ----

    pub fn get_quench(&mut self) -> Result<bool, AxisError> {
        let quench = self.query_parse(Command::QuenchQuery, ami430::parse_flag)?;
        self.status.quench = Some(quench);
        Ok(quench)
    }

    pub fn reset_quench(&mut self) -> Result<(), AxisError> {
        info!("Axis {}: resetting quench", self.id);
        self.write(Command::ResetQuench)?;
        self.status.quench = Some(false);
        Ok(())
    }

    // ---- PERSISTENT MODE ----

    pub fn get_switch_heater(&mut self) -> Result<bool, AxisError> {
        self.query_parse(Command::SwitchHeaterQuery, ami430::parse_flag)
    }

    /// Switch the persistent switch heater and wait for the programmer to finish heating or
    /// cooling the switch.
    pub fn set_switch_heater(&mut self, on: bool) -> Result<(), AxisError> {
        self.write(Command::SetSwitchHeater(on))?;
        self.clock.sleep(self.timing.switch_settle);

        let changing = |s: RampState| {
            matches!(s, RampState::HeatingSwitch | RampState::CoolingSwitch)
        };

        match self.wait_while(changing, self.timing.switch_timeout)? {
            Some(_) => Ok(()),
            None => Err(AxisError::SwitchTimeout(
                self.id,
                self.timing.switch_timeout.as_secs_f64(),
            )),
        }
    }

    pub fn get_persistent(&mut self) -> Result<bool, AxisError> {
        let persistent = self.query_parse(Command::PersistentQuery, ami430::parse_flag)?;
        self.status.persistent = Some(persistent);
        Ok(persistent)
    }

    /// Enter or leave persistent mode.
    ///
    /// Returns `true` if the axis ended up in the requested mode. A refused or failed attempt is
    /// logged and gives `false`, the caller decides what to do next.
    pub fn set_persistent(&mut self, on: bool) -> Result<bool, AxisError> {
        if self.get_persistent()? == on {
            debug!(
                "Axis {}: persistent mode already {}",
                self.id,
                if on { "on" } else { "off" }
            );
            return Ok(true);
        }

        let state = self.get_ramp_state()?;

        let achieved = if on {
            if !matches!(state, RampState::Holding | RampState::Paused) {
                error!(
                    "Axis {}: can only enter persistent mode when holding or paused, state is {}",
                    self.id, state
                );
                return Ok(false);
            }
            self.enter_persistent()?
        } else {
            if !matches!(
                state,
                RampState::Holding | RampState::Paused | RampState::AtZero
            ) {
                error!(
                    "Axis {}: can only leave persistent mode when holding, paused or at zero, \
                     state is {}",
                    self.id, state
                );
                return Ok(false);
            }
            self.leave_persistent()?
        };

        if achieved {
            info!(
                "Axis {}: persistent mode {}",
                self.id,
                if on { "on" } else { "off" }
            );
        }

        Ok(achieved)
    }

    /// Whether the axis may be told to ramp.
    ///
    /// A quenched or persistent axis never is. Holding and at zero are always fine, ramping or
    /// paused only with the switch heater on.
    pub fn is_ready_to_ramp(&mut self) -> Result<bool, AxisError> {
        if self.get_quench()? {
            debug!("Axis {}: not ready, quench detected", self.id);
            return Ok(false);
        }
        if self.get_persistent()? {
            debug!("Axis {}: not ready, in persistent mode", self.id);
            return Ok(false);
        }

        match self.get_ramp_state()? {
            RampState::Holding | RampState::AtZero => Ok(true),
            RampState::Ramping | RampState::Paused => self.get_switch_heater(),
            state => {
                debug!("Axis {}: not ready, state is {}", self.id, state);
                Ok(false)
            }
        }
    }

    // ---- PRIVATE ----

    fn enter_persistent(&mut self) -> Result<bool, AxisError> {
        self.pause_ramp()?;

        if !self.switch_or_log(false)? {
            return Ok(false);
        }

        // The supply ramps down while the magnet keeps its field
        self.ramp_to_zero()?;
        self.clock.sleep(self.timing.switch_settle);

        let to_zero = |s: RampState| s == RampState::RampingToZero;
        if self.wait_while(to_zero, self.timing.zero_timeout)?.is_none() {
            error!("Axis {}: supply did not reach zero in time", self.id);
            return Ok(false);
        }

        self.clock.sleep(self.timing.zero_settle);

        let persistent = self.get_persistent()?;
        let state = self.get_ramp_state()?;
        if persistent && state == RampState::AtZero {
            Ok(true)
        } else {
            error!(
                "Axis {}: failed to enter persistent mode (persistent: {}, state: {})",
                self.id, persistent, state
            );
            Ok(false)
        }
    }

    fn leave_persistent(&mut self) -> Result<bool, AxisError> {
        // Bring the supply back up to the field held in the magnet before closing the switch
        let field = self.get_field()?;
        self.set_field(field)?;

        let ramping = |s: RampState| s == RampState::Ramping;
        if self.wait_while(ramping, self.timing.zero_timeout)?.is_none() {
            error!("Axis {}: supply did not reach the magnet field in time", self.id);
            return Ok(false);
        }

        if !self.switch_or_log(true)? {
            return Ok(false);
        }

        let persistent = self.get_persistent()?;
        if persistent {
            error!("Axis {}: failed to leave persistent mode", self.id);
        }
        Ok(!persistent)
    }

    /// Switch the heater, turning a timeout into a logged `false`.
    fn switch_or_log(&mut self, on: bool) -> Result<bool, AxisError> {
        match self.set_switch_heater(on) {
            Ok(_) => Ok(true),
            Err(e @ AxisError::SwitchTimeout(_, _)) => {
                error!("{}", e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Poll the ramp state while `predicate` holds. Returns the first state for which it doesn't,
    /// or `None` if `timeout` elapses first.
    fn wait_while<F>(&mut self, predicate: F, timeout: Duration) -> Result<Option<RampState>, AxisError>
    where
        F: Fn(RampState) -> bool,
    {
        let start = self.clock.now();

        loop {
            let state = self.get_ramp_state()?;
            if !predicate(state) {
                return Ok(Some(state));
            }
            if self.clock.now() - start > timeout {
                return Ok(None);
            }
            self.clock.sleep(self.timing.switch_poll);
        }
    }

    fn write(&mut self, command: Command) -> Result<(), AxisError> {
        trace!("Axis {} <- {}", self.id, command);

        let id = self.id;
        self.transport
            .send(&command.to_string())
            .map_err(|e| AxisError::Transport(id, e))?;
        self.clock.sleep(self.timing.settle);

        Ok(())
    }

    fn query(&mut self, command: Command) -> Result<String, AxisError> {
        self.write(command)?;

        let id = self.id;
        let reply = self
            .transport
            .receive()
            .map_err(|e| AxisError::Transport(id, e))?;
        trace!("Axis {} -> {}", self.id, reply);

        Ok(reply)
    }

    fn query_parse<T, F>(&mut self, command: Command, parse: F) -> Result<T, AxisError>
    where
        F: Fn(&str) -> Result<T, ReplyError>,
    {
        let reply = self.query(command)?;
        parse(&reply).map_err(|source| AxisError::Protocol {
            axis: self.id,
            command,
            source,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::{sim_axes, SimClock};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Transport replying from a script and recording everything sent.
    struct MockTransport {
        replies: VecDeque<String>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl Transport for MockTransport {
        fn send(&mut self, command: &str) -> Result<(), TransportError> {
            self.sent.lock().expect("lock").push(command.to_string());
            Ok(())
        }

        fn receive(&mut self) -> Result<String, TransportError> {
            self.replies.pop_front().ok_or(TransportError::Timeout)
        }
    }

    fn mock_axis(replies: &[&str]) -> (AxisChannel, Arc<Mutex<Vec<String>>>, Arc<SimClock>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let clock = Arc::new(SimClock::new());
        let transport = MockTransport {
            replies: replies.iter().map(|r| r.to_string()).collect(),
            sent: sent.clone(),
        };
        let axis = AxisChannel::new(
            AxisId::X,
            1.01,
            Box::new(transport),
            clock.clone(),
            AxisTiming::from(&TimingParams::default()),
        );

        (axis, sent, clock)
    }

    fn sent(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().expect("lock").clone()
    }

    #[test]
    fn test_set_point_pauses_first() -> Result<(), AxisError> {
        let (mut axis, log, clock) = mock_axis(&[]);

        axis.set_set_point(0.5)?;

        assert_eq!(sent(&log), vec!["PAUSE", "CONF:FIELD:TARG 0.5 ;"]);
        assert_eq!(axis.status().set_point, Some(0.5));

        // One settle delay after every write
        assert_eq!(clock.now(), Duration::from_millis(1600));

        Ok(())
    }

    #[test]
    fn test_queries() -> Result<(), AxisError> {
        let (mut axis, log, _) = mock_axis(&["2", "0.4500", "0.0100,1.0100", "1", "-101,Syntax error "]);

        assert_eq!(axis.get_ramp_state()?, RampState::Holding);
        assert_eq!(axis.get_field()?, 0.45);
        assert_eq!(axis.get_ramp_rate()?, 0.01);
        assert_eq!(axis.get_units()?, FieldUnits::Tesla);
        assert_eq!(axis.get_error()?, "-101,Syntax error");

        assert_eq!(
            sent(&log),
            vec!["STATE?", "FIELD:MAG?", "RAMP:RATE:FIELD:1?", "FIELD:UNITS?", "SYST:ERR?"]
        );
        assert_eq!(axis.status().field, Some(0.45));

        Ok(())
    }

    #[test]
    fn test_protocol_errors() {
        let (mut axis, _, _) = mock_axis(&["ramping", "11"]);

        assert!(matches!(
            axis.get_ramp_state(),
            Err(AxisError::Protocol {
                axis: AxisId::X,
                command: Command::RampStateQuery,
                ..
            })
        ));
        assert!(matches!(axis.get_ramp_state(), Err(AxisError::Protocol { .. })));

        // No reply at all is a transport failure
        assert!(matches!(
            axis.get_field(),
            Err(AxisError::Transport(AxisId::X, TransportError::Timeout))
        ));
    }

    #[test]
    fn test_ramp_rate_uses_field_rating() -> Result<(), AxisError> {
        let (mut axis, log, _) = mock_axis(&[]);
        axis.set_ramp_rate(0.02)?;
        assert_eq!(sent(&log), vec!["CONF:RAMP:RATE:FIELD 1, 0.02, 1.01"]);
        Ok(())
    }

    #[test]
    fn test_ready_to_ramp() -> Result<(), AxisError> {
        // Quenched
        let (mut axis, _, _) = mock_axis(&["1"]);
        assert!(!axis.is_ready_to_ramp()?);

        // Persistent
        let (mut axis, _, _) = mock_axis(&["0", "1"]);
        assert!(!axis.is_ready_to_ramp()?);

        // Holding
        let (mut axis, _, _) = mock_axis(&["0", "0", "2"]);
        assert!(axis.is_ready_to_ramp()?);

        // Paused with the heater off
        let (mut axis, log, _) = mock_axis(&["0", "0", "3", "0"]);
        assert!(!axis.is_ready_to_ramp()?);
        assert_eq!(sent(&log), vec!["QU?", "PERS?", "STATE?", "PS?"]);

        // Ramping with the heater on
        let (mut axis, _, _) = mock_axis(&["0", "0", "1", "1"]);
        assert!(axis.is_ready_to_ramp()?);

        // Heating the switch
        let (mut axis, _, _) = mock_axis(&["0", "0", "9"]);
        assert!(!axis.is_ready_to_ramp()?);

        Ok(())
    }

    #[test]
    fn test_persistent_refused_while_ramping() -> Result<(), AxisError> {
        let (mut axis, log, _) = mock_axis(&["0", "1"]);

        assert!(!axis.set_persistent(true)?);
        assert_eq!(sent(&log), vec!["PERS?", "STATE?"]);

        let (mut axis, log, _) = mock_axis(&["1", "6"]);
        assert!(!axis.set_persistent(false)?);
        assert_eq!(sent(&log), vec!["PERS?", "STATE?"]);

        Ok(())
    }

    #[test]
    fn test_persistent_already_in_requested_mode() -> Result<(), AxisError> {
        // Already persistent, sitting at zero
        let (mut axis, log, _) = mock_axis(&["1"]);
        assert!(axis.set_persistent(true)?);
        assert_eq!(sent(&log), vec!["PERS?"]);

        // Driven and ramping
        let (mut axis, log, _) = mock_axis(&["0"]);
        assert!(axis.set_persistent(false)?);
        assert_eq!(sent(&log), vec!["PERS?"]);

        Ok(())
    }

    #[test]
    fn test_persistent_mode_is_idempotent_on_sim() -> Result<(), AxisError> {
        let clock = Arc::new(SimClock::new());
        let timing = AxisTiming::from(&TimingParams::default());
        let (mut axes, handles) = sim_axes(
            &[(AxisId::X, 0.5, 1.01), (AxisId::Y, 0.2, 0.98)],
            clock,
            timing,
        );

        // Entering twice leaves the magnet persistent
        assert!(axes[0].set_persistent(true)?);
        assert_eq!(handles[0].state(), RampState::AtZero);
        let before = handles[0].commands().len();
        assert!(axes[0].set_persistent(true)?);
        assert_eq!(handles[0].commands()[before..].to_vec(), vec!["PERS?"]);
        assert!(handles[0].snapshot().persistent());

        // Leaving on a driven axis keeps the pending set point
        axes[1].set_set_point(0.5)?;
        let before = handles[1].commands().len();
        assert!(axes[1].set_persistent(false)?);
        assert_eq!(handles[1].commands()[before..].to_vec(), vec!["PERS?"]);
        assert_eq!(handles[1].snapshot().target, 0.5);
        assert_eq!(handles[1].state(), RampState::Paused);

        Ok(())
    }

    #[test]
    fn test_switch_heater_waits_for_switch() -> Result<(), AxisError> {
        let (mut axis, log, _) = mock_axis(&["9", "9", "3"]);

        axis.set_switch_heater(true)?;
        assert_eq!(sent(&log), vec!["PS 1", "STATE?", "STATE?", "STATE?"]);

        Ok(())
    }

    #[test]
    fn test_switch_heater_timeout() {
        let replies = vec!["10"; 1000];
        let (mut axis, _, _) = mock_axis(&replies);

        assert!(matches!(
            axis.set_switch_heater(false),
            Err(AxisError::SwitchTimeout(AxisId::X, _))
        ));
    }
}
