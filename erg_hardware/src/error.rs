use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("actuator timeout")]
    Timeout,
    #[error("travel limits inverted: min {min} > max {max}")]
    InvalidLimits { min: i32, max: i32 },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
