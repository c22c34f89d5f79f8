//! # Communications interface crate.
//!
//! Provides the interfaces between the rover core and its collaborators (dashboard, console,
//! presence scanner): commands going in, and status coming out.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Telecommands, i.e. instructions sent to the rover
pub mod tc;

/// Telemetry, i.e. status reported by the rover
pub mod tm;
