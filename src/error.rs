use thiserror::Error;

/// Caller bugs. Insufficient or degenerate data is never an error here; those
/// outcomes come back as skip reasons or zero-confidence results.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    #[error("FFT length must be a non-zero power of two, got {0}")]
    NotPowerOfTwo(usize),
    #[error("real/imag length mismatch: {real} vs {imag}")]
    LengthMismatch { real: usize, imag: usize },
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, GridError>;
