//! Errors
//!
//! Custom error types used throughout the `conformal` crate.
use thiserror::Error;

/// Errors that can occur in the conformal engine.
#[derive(Debug, Error)]
pub enum ConformalError {
    /// A required field is null or absent at scoring time.
    #[error("Missing value in column {0} for row {1}.")]
    MissingValue(String, String),
    /// A field is present but holds a non-numeric value where a number is required.
    #[error("Column {0} holds {1} where a numeric value is required.")]
    WrongType(String, String),
    /// Empty class partition, or a calibration set too small to rank.
    #[error("Insufficient calibration data: {0}")]
    InsufficientCalibrationData(String),
    /// Quantile index beyond the calibration set.
    #[error("Index {0} is out of range for a calibration set of size {1}.")]
    IndexOutOfRange(usize, usize),
    /// Unknown sampling method, or calibration size below the supported minimum.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
    /// Fold aggregation invoked outside a valid loop, or fold tables out of sync.
    #[error("Protocol violation: {0}")]
    Protocol(String),
    /// Cooperative cancellation observed.
    #[error("Execution was cancelled.")]
    Cancelled,
    /// Invalid value parsing.
    #[error("Invalid value {0} passed for {1}, expected one of {2}.")]
    ParseString(String, String, String),
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
}
