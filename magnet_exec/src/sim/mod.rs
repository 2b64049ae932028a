//! # Simulated AMI430
//!
//! A software stand-in for the AMI430 programmer, answering the same command set over the
//! [`Transport`] trait. Field motion follows the [`Clock`] the simulation is built with, so with a
//! [`SimClock`] a full vector ramp runs instantly and deterministically.
//!
//! The model keeps the supply field and the magnet field apart: they only move together while the
//! persistent switch heater is on. Faults can be injected through a [`SimHandle`].

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod clock;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use magnet_if::{
    ami430::{FieldUnits, RampState},
    quantity::AxisId,
    transport::{Transport, TransportError},
};

use crate::axis_channel::{AxisChannel, AxisTiming};
use crate::clock::Clock;

pub use clock::SimClock;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default ramp rate of a simulated supply.
///
/// Units: Tesla/second
pub const DEFAULT_RAMP_RATE: f64 = 0.01;

/// Time taken to heat or cool the persistent switch.
const SWITCH_DURATION: Duration = Duration::from_millis(1500);

/// Field per unit of supply current.
///
/// Units: Tesla/Ampere
const COIL_CONSTANT: f64 = 0.1;

const NO_ERROR: &str = "0,\"No error\"";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Internal state of one simulated programmer.
#[derive(Debug, Clone)]
pub struct SimAxisState {
    /// Field produced by the supply
    pub supply_field: f64,

    /// Field held in the magnet, equal to the supply field unless persistent
    pub magnet_field: f64,

    pub target: f64,
    pub state: RampState,

    /// State to return to once the switch heater has finished changing
    switch_return: Option<(Duration, RampState)>,

    pub heater_on: bool,
    pub quench: bool,
    pub units: FieldUnits,

    /// Units: Tesla/second
    pub ramp_rate: f64,
    pub rate_bound: f64,

    pub faults: SimFaults,

    /// Every command received, in order
    pub command_log: Vec<String>,

    errors: VecDeque<String>,
    replies: VecDeque<String>,
    last_update: Duration,
}

/// Faults which can be injected into a simulated programmer.
#[derive(Debug, Clone, Default)]
pub struct SimFaults {
    /// The supply accepts commands but never moves
    pub stuck: bool,

    /// Replace a field reading with this value, after the given number of normal readings
    pub field_spike: Option<(usize, f64)>,

    /// Replace the next reply with garbage
    pub garbage_reply: bool,
}

/// The transport end of a simulated programmer.
pub struct SimAmi430 {
    id: AxisId,
    inner: Arc<Mutex<SimAxisState>>,
    clock: Arc<dyn Clock>,
}

/// Test-side handle onto a simulated programmer.
#[derive(Clone)]
pub struct SimHandle {
    inner: Arc<Mutex<SimAxisState>>,
    clock: Arc<dyn Clock>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimAxisState {
    fn new(field: f64, field_rating: f64) -> Self {
        Self {
            supply_field: field,
            magnet_field: field,
            target: field,
            state: if field == 0.0 {
                RampState::AtZero
            } else {
                RampState::Holding
            },
            switch_return: None,
            heater_on: true,
            quench: false,
            units: FieldUnits::Tesla,
            ramp_rate: DEFAULT_RAMP_RATE,
            rate_bound: field_rating,
            faults: SimFaults::default(),
            command_log: Vec::new(),
            errors: VecDeque::new(),
            replies: VecDeque::new(),
            last_update: Duration::from_secs(0),
        }
    }

    pub fn persistent(&self) -> bool {
        !self.heater_on
    }

    /// Move the supply towards its target for the time elapsed since the last update.
    fn advance(&mut self, now: Duration) {
        let dt = now.checked_sub(self.last_update).unwrap_or_default();
        self.last_update = now;

        if let Some((until, next)) = self.switch_return {
            if now >= until {
                self.state = next;
                self.switch_return = None;
            }
        }

        if self.faults.stuck {
            return;
        }

        let goal = match self.state {
            RampState::Ramping => self.target,
            RampState::RampingToZero => 0.0,
            _ => return,
        };

        let step = self.ramp_rate * dt.as_secs_f64();
        let diff = goal - self.supply_field;
        if diff.abs() <= step {
            self.supply_field = goal;
            self.state = match self.state {
                RampState::RampingToZero => RampState::AtZero,
                _ => RampState::Holding,
            };
        } else {
            self.supply_field += step * diff.signum();
        }

        if self.heater_on {
            self.magnet_field = self.supply_field;
        }
    }

    /// Field reported by `FIELD:MAG?`, the magnet's own field when persistent.
    fn reported_field(&self) -> f64 {
        if self.heater_on {
            self.supply_field
        } else {
            self.magnet_field
        }
    }

    fn start_switch(&mut self, now: Duration, on: bool) {
        let resume = match self.state {
            RampState::HeatingSwitch | RampState::CoolingSwitch => self
                .switch_return
                .map(|(_, s)| s)
                .unwrap_or(RampState::Paused),
            s => s,
        };

        self.heater_on = on;
        self.state = if on {
            RampState::HeatingSwitch
        } else {
            RampState::CoolingSwitch
        };
        self.switch_return = Some((now + SWITCH_DURATION, resume));

        if on {
            // A heated switch puts the supply back across the magnet
            self.magnet_field = self.supply_field;
        }
    }

    /// Execute one command, queueing the reply if it is a query.
    fn handle(&mut self, command: &str, now: Duration) {
        self.command_log.push(command.to_string());
        self.advance(now);

        let mut words = command.trim().splitn(2, ' ');
        let head = words.next().unwrap_or("");
        let args: Vec<f64> = words
            .next()
            .unwrap_or("")
            .split(|c: char| c == ',' || c == ';' || c == ' ')
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect();

        let reply = match (head, args.as_slice()) {
            ("STATE?", _) => Some(self.state.to_wire().to_string()),
            ("PS?", _) => Some((self.heater_on as u8).to_string()),
            ("PS", [v]) => {
                self.start_switch(now, *v != 0.0);
                None
            }
            ("RAMP", []) => {
                if !self.quench {
                    self.state = RampState::Ramping;
                }
                None
            }
            ("PAUSE", []) => {
                if !self.quench && self.switch_return.is_none() {
                    self.state = RampState::Paused;
                }
                None
            }
            ("ZERO", []) => {
                if !self.quench {
                    self.state = RampState::RampingToZero;
                }
                None
            }
            ("FIELD:MAG?", _) => {
                let field = match self.faults.field_spike {
                    Some((0, spike)) => {
                        self.faults.field_spike = None;
                        spike
                    }
                    Some((n, spike)) => {
                        self.faults.field_spike = Some((n - 1, spike));
                        self.reported_field()
                    }
                    None => self.reported_field(),
                };
                Some(format!("{:.6}", field))
            }
            ("FIELD:TARG?", _) => Some(format!("{:.6}", self.target)),
            ("CONF:FIELD:TARG", [v]) => {
                self.target = *v;
                None
            }
            ("CURR:MAG?", _) => Some(format!("{:.6}", self.supply_field / COIL_CONSTANT)),
            ("CONF:CURR:TARG", [v]) => {
                self.target = *v * COIL_CONSTANT;
                None
            }
            ("FIELD:UNITS?", _) => Some((self.units as u8).to_string()),
            ("CONF:FIELD:UNITS", [v]) => {
                self.units = if *v == 0.0 {
                    FieldUnits::Kilogauss
                } else {
                    FieldUnits::Tesla
                };
                None
            }
            ("QU?", _) => Some((self.quench as u8).to_string()),
            ("QU", [v]) if *v == 0.0 => {
                if self.quench {
                    self.quench = false;
                    self.state = RampState::Paused;
                }
                None
            }
            ("PERS?", _) => Some((self.persistent() as u8).to_string()),
            ("SYST:ERR?", _) => Some(
                self.errors
                    .pop_front()
                    .unwrap_or_else(|| NO_ERROR.to_string()),
            ),
            ("RAMP:RATE:FIELD:1?", _) => {
                Some(format!("{:.4},{:.4}", self.ramp_rate, self.rate_bound))
            }
            ("CONF:RAMP:RATE:FIELD", [segment, rate, bound]) if *segment == 1.0 => {
                self.ramp_rate = *rate;
                self.rate_bound = *bound;
                None
            }
            _ => {
                self.errors.push_back("-101,\"Unrecognized command\"".to_string());
                None
            }
        };

        if let Some(r) = reply {
            if self.faults.garbage_reply {
                self.faults.garbage_reply = false;
                self.replies.push_back("#~!".to_string());
            } else {
                self.replies.push_back(r);
            }
        }
    }
}

impl SimAmi430 {
    pub fn new(id: AxisId, field: f64, field_rating: f64, clock: Arc<dyn Clock>) -> (Self, SimHandle) {
        let inner = Arc::new(Mutex::new(SimAxisState::new(field, field_rating)));
        let handle = SimHandle {
            inner: inner.clone(),
            clock: clock.clone(),
        };

        (Self { id, inner, clock }, handle)
    }
}

impl Transport for SimAmi430 {
    fn send(&mut self, command: &str) -> Result<(), TransportError> {
        trace!("Sim {} <- {}", self.id, command);
        let now = self.clock.now();
        lock(&self.inner).handle(command, now);
        Ok(())
    }

    fn receive(&mut self) -> Result<String, TransportError> {
        lock(&self.inner)
            .replies
            .pop_front()
            .ok_or(TransportError::Timeout)
    }
}

impl SimHandle {
    /// A snapshot of the simulated programmer, brought up to date with the clock.
    pub fn snapshot(&self) -> SimAxisState {
        let mut s = lock(&self.inner);
        s.advance(self.clock.now());
        s.clone()
    }

    /// Field currently in the magnet.
    pub fn field(&self) -> f64 {
        self.snapshot().magnet_field
    }

    pub fn state(&self) -> RampState {
        self.snapshot().state
    }

    pub fn commands(&self) -> Vec<String> {
        lock(&self.inner).command_log.clone()
    }

    pub fn set_state(&self, state: RampState) {
        lock(&self.inner).state = state;
    }

    pub fn set_ramp_rate(&self, rate: f64) {
        lock(&self.inner).ramp_rate = rate;
    }

    pub fn set_stuck(&self, stuck: bool) {
        lock(&self.inner).faults.stuck = stuck;
    }

    /// Report `field` once, after `after` more normal readings.
    pub fn inject_field_spike(&self, after: usize, field: f64) {
        lock(&self.inner).faults.field_spike = Some((after, field));
    }

    pub fn inject_garbage_reply(&self) {
        lock(&self.inner).faults.garbage_reply = true;
    }

    pub fn quench(&self) {
        let mut s = lock(&self.inner);
        s.quench = true;
        s.state = RampState::Quench;
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build one simulated axis per `(id, initial field, field rating)`.
pub fn sim_axes(
    axes: &[(AxisId, f64, f64)],
    clock: Arc<dyn Clock>,
    timing: AxisTiming,
) -> (Vec<AxisChannel>, Vec<SimHandle>) {
    axes.iter()
        .map(|&(id, field, rating)| {
            let (sim, handle) = SimAmi430::new(id, field, rating, clock.clone());
            (
                AxisChannel::new(id, rating, Box::new(sim), clock.clone(), timing),
                handle,
            )
        })
        .unzip()
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn lock(inner: &Mutex<SimAxisState>) -> MutexGuard<'_, SimAxisState> {
    match inner.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
