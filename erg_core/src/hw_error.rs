//! Maps `Box<dyn Error>` from trait boundaries to typed `ErgError`.
//!
//! The traits in `erg_traits` use `Box<dyn Error + Send + Sync>`; this module
//! converts those to our typed error enum, with an optional feature-gated path
//! for `erg_hardware::HwError` downcasting.

use crate::error::ErgError;

/// Map an actuator-boundary error to a typed `ErgError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ErgError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<erg_hardware::error::HwError>() {
            return match hw {
                erg_hardware::error::HwError::Timeout => ErgError::Timeout,
                other => ErgError::ActuatorFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        ErgError::Timeout
    } else {
        ErgError::Actuator(s)
    }
}

/// Map a storage-boundary error. Storage failures are never hardware faults
/// from the controller's point of view; they only cost persistence.
pub fn map_storage_error(e: &(dyn std::error::Error + 'static)) -> ErgError {
    ErgError::Storage(e.to_string())
}

/// Convenience for the common `map_err(...)` on actuator calls.
pub(crate) fn actuator_report(e: erg_traits::BoxError) -> eyre::Report {
    eyre::Report::new(map_hw_error(&*e))
}

pub(crate) fn storage_report(e: erg_traits::BoxError) -> eyre::Report {
    eyre::Report::new(map_storage_error(&*e))
}
