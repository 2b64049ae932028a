//! # Magnet interface crate.
//!
//! Provides all common interfaces for the magnet software: the host quantity surface, the request
//! language used by scripts and the console, the AMI430 wire protocol and the transports that
//! carry it.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Named quantities exposed to the host, decoded into axis/attribute enums
pub mod quantity;

/// Textual get/set requests
pub mod request;

/// AMI430 power supply programmer commands and replies
pub mod ami430;

/// Byte-stream sessions to the power supplies
pub mod transport;
