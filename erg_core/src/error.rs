use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ErgError {
    #[error("actuator error: {0}")]
    Actuator(String),
    #[error("actuator fault: {0}")]
    ActuatorFault(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("timeout waiting for actuator")]
    Timeout,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing actuator")]
    MissingActuator,
    #[error("missing storage")]
    MissingStorage,
    #[error("missing trainer state")]
    MissingState,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

/// Table file decode failures. All of them are recovered by rewriting the file.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PersistError {
    #[error("table file truncated: expected {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("table file version {found} does not match expected {expected}")]
    VersionMismatch { expected: i32, found: i32 },
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
