use thiserror::Error;

use crate::DataType;

/// Errors produced while validating or converting data against a format.
///
/// All of these describe caller mistakes (or a device that cannot represent a type at all);
/// they are raised before any device resource is touched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    #[error("device cannot store {ty} data (writable: {writable})")]
    Unsupported { ty: DataType, writable: bool },
    #[error("expected {expected} data, got {found}")]
    TypeMismatch { expected: DataType, found: DataType },
    #[error("expected {expected} values, got {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("value {value} is not representable as {ty}")]
    OutOfRange { ty: DataType, value: f64 },
    #[error("component count must be an integer in 1..=4, got {0}")]
    InvalidComponentCount(u32),
    #[error("LINEAR filtering is only supported for floating point types, got {0}")]
    InterpolatedInteger(DataType),
    #[error("a {width}x{height} texture does not fit in memory")]
    TooLarge { width: u32, height: u32 },
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),
    #[error("invalid clear value: {0}")]
    InvalidClearValue(String),
    #[error("invalid {kind} `{value}`, must be one of {valid}")]
    UnknownName {
        kind: &'static str,
        value: String,
        valid: &'static str,
    },
}
