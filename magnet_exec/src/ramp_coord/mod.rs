//! # Ramp coordinator module
//!
//! The ramp coordinator moves every axis of the magnet to a new set point while keeping the
//! magnitude of the combined field vector below `combined_field_limit`.
//!
//! Ramping all axes at once towards a target which is itself within the limit can still overshoot
//! it on the way, for example when one axis grows before another shrinks. The coordinator
//! therefore polls the live field and decides which axes may move based on which zone the
//! magnitude is in:
//!
//! - **Safe**, below `restart_all_threshold`: every paused axis is resumed.
//! - **Grey**, between the thresholds: nothing changes while an axis is moving. When none is, one
//!   paused axis which has not reached its set point is restarted.
//! - **Danger**, at or above `stop_threshold`: if more than one axis is moving, those increasing
//!   the magnitude are paused. When none is, one axis is restarted as in the grey zone.
//!
//! Any poll reading above the limit pauses every axis and ends the ramp. So do cancellation and
//! exceeding `max_ramp_duration_s`.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;
mod plan;
mod state;
mod trace;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use params::RampParams;
pub use plan::*;
pub use state::*;
pub use trace::*;
