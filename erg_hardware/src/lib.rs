//! Actuator implementations for the trainer: a simulated brake and power
//! meter for development, and a GPIO step/dir driver behind the `hardware`
//! feature.
pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;
pub mod sim;
pub mod util;

pub use sim::{Physics, SimulatedActuator, SimulatedPowerMeter};
