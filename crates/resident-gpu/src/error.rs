use resident_format::FormatError;
use thiserror::Error;

use crate::hal::{BackendError, UniformKind};

/// Errors raised synchronously to the caller.
#[derive(Debug, Error)]
pub enum ResidentError {
    /// Malformed construction/resize/uniform parameters. Nothing was allocated or changed.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// Invalid runtime access (bad index, disposed array, missing history, unreadable target).
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("uniform `{name}` was bound as {from}, cannot change to {to}")]
    Immutability {
        name: String,
        from: UniformKind,
        to: UniformKind,
    },
    /// The device failed an operation that has no best-effort fallback.
    #[error(transparent)]
    Device(#[from] DeviceResourceError),
}

impl From<FormatError> for ResidentError {
    fn from(err: FormatError) -> Self {
        ResidentError::Configuration(err.to_string())
    }
}

pub type Result<T, E = ResidentError> = core::result::Result<T, E>;

/// Device-side failures. These are normally delivered through the context's error callback
/// rather than returned, and leave the affected object in a best-effort state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceResourceError {
    #[error("array `{name}`: failed to allocate storage: {source}")]
    StorageAllocation { name: String, source: BackendError },
    #[error("array `{name}`: failed to allocate render target: {source}")]
    RenderTargetAllocation { name: String, source: BackendError },
    #[error("array `{name}`: render target is incomplete ({status})")]
    IncompleteRenderTarget { name: String, status: String },
    #[error("array `{name}`: upload failed: {source}")]
    Upload { name: String, source: BackendError },
    #[error("array `{name}`: readback failed: {source}")]
    Readback { name: String, source: BackendError },
    #[error("kernel link failed: {0}")]
    LinkFailed(BackendError),
    #[error("uniform `{name}` was not found in the kernel")]
    UniformNotFound { name: String },
    #[error("uniform `{name}` is declared as {declared} in the kernel, got {requested}")]
    UniformKindMismatch {
        name: String,
        declared: UniformKind,
        requested: UniformKind,
    },
    #[error("uniform `{name}` could not be set: {source}")]
    UniformUpload { name: String, source: BackendError },
    #[error("draw into `{name}` failed: {source}")]
    Draw { name: String, source: BackendError },
}
