//! Error types for the IQ balancer

use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IqbError {
    #[error("Invalid FFT size: {0} (must be a power of two in 64..=65536)")]
    InvalidFftSize(usize),

    #[error("Invalid lookback capacity: {0} (must be a power of two >= 2)")]
    InvalidLookback(usize),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Allocation failed: {0}")]
    Allocation(String),
}

/// Result type alias
pub type IqbResult<T> = Result<T, IqbError>;
