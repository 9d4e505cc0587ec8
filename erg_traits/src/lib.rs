//! Seams between the trainer control core and the outside world.
//!
//! Everything the core consumes but does not own lives behind one of these
//! traits: the resistance actuator, the byte store that keeps the learned
//! table across reboots, the protocol side that wants to hear about table
//! changes, and time itself.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Resistance actuator (stepper-driven brake).
///
/// Positions are in actuator units. The driver moves asynchronously; the core
/// only ever requests a target and reads back where the brake currently is.
pub trait Actuator {
    fn set_target_position(&mut self, position: i32) -> Result<(), BoxError>;
    fn target_position(&self) -> i32;
    fn current_position(&mut self) -> Result<i32, BoxError>;
    /// Drop holding torque so the brake does not stay clamped.
    fn release_tension(&mut self) -> Result<(), BoxError>;
    /// Restrict the travel range the driver may move within.
    fn set_travel_limits(&mut self, min: i32, max: i32) -> Result<(), BoxError>;
}

/// Opaque named-file store (flash filesystem on the device).
pub trait Storage {
    /// Whole-file read. `Ok(None)` when the file does not exist.
    fn read(&mut self, name: &str) -> Result<Option<Vec<u8>>, BoxError>;
    /// Truncate-and-write.
    fn write(&mut self, name: &str, bytes: &[u8]) -> Result<(), BoxError>;
    fn remove(&mut self, name: &str) -> Result<(), BoxError>;
}

/// Advisory hook fired when a row of the learned table changes.
pub trait TableObserver: Send {
    fn table_row_changed(&self, row: usize);
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn set_target_position(&mut self, position: i32) -> Result<(), BoxError> {
        (**self).set_target_position(position)
    }
    fn target_position(&self) -> i32 {
        (**self).target_position()
    }
    fn current_position(&mut self) -> Result<i32, BoxError> {
        (**self).current_position()
    }
    fn release_tension(&mut self) -> Result<(), BoxError> {
        (**self).release_tension()
    }
    fn set_travel_limits(&mut self, min: i32, max: i32) -> Result<(), BoxError> {
        (**self).set_travel_limits(min, max)
    }
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn read(&mut self, name: &str) -> Result<Option<Vec<u8>>, BoxError> {
        (**self).read(name)
    }
    fn write(&mut self, name: &str, bytes: &[u8]) -> Result<(), BoxError> {
        (**self).write(name, bytes)
    }
    fn remove(&mut self, name: &str) -> Result<(), BoxError> {
        (**self).remove(name)
    }
}
