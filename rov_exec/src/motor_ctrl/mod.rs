//! # Motor control module
//!
//! Drives the rover's two drive motors through a dual H-bridge driver. Each physical channel (A
//! and B) has two direction inputs and a PWM speed input, and the whole driver is gated by a
//! standby line.
//!
//! Commands are given in the rover's logical frame (left/right side, forward/back/left/right
//! manoeuvres). How a logical side maps onto a physical channel, and which way round its
//! direction inputs are, is a property of the wiring on a particular unit and is described by the
//! [`MotorCalibration`] parameters. See [`mapping`] for the mapping itself.
//!
//! Channel A's PWM input is the pin shared with the scanner servo, so the motors must hold the
//! [`PinArbiter`](crate::pin_arbiter::PinArbiter) lease while enabled.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod mapping;
pub mod params;
pub mod state;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use mapping::*;
pub use params::*;
pub use state::*;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::{hal::HalError, pin_arbiter::PinOwner};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error("Motor PWM busy, the shared pin is held by {0:?}")]
    PinBusy(Option<PinOwner>),

    #[error("Motors are not enabled")]
    NotEnabled,

    #[error("Invalid motor control parameters")]
    InvalidParams,

    #[error("Hardware error: {0}")]
    Hal(#[from] HalError),
}
