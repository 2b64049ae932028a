//! # Magnet library.
//!
//! This library allows other crates in the workspace, and the tests, to access items defined inside
//! the magnet crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Axis channel - one power supply programmer and the commands it understands
pub mod axis_channel;

/// Cooperative cancellation of vector ramps
pub mod cancel;

/// Time source and sleeping, swappable for a simulated clock
pub mod clock;

/// Magnet facade - the get/set surface exposed to scripts and the console
pub mod facade;

/// Worker thread which owns the facade and executes requests
pub mod magnet_worker;

/// Parameters for the magnet executable
pub mod params;

/// Ramp coordinator - drives all axes to a vector target without exceeding the field ceiling
pub mod ramp_coord;

/// Simulated AMI430 programmers
#[cfg(any(test, feature = "sim"))]
pub mod sim;

/// Vector state - conversions between axis fields and the polar/spherical field vector
pub mod vector_state;
