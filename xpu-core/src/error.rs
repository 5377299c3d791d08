//! Driver-facing error taxonomy.

use crate::BackendKind;

/// Result alias used throughout `xpu-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur below the runtime, at the driver / dynamic-loader boundary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load backend '{backend}' from '{path}': {reason}")]
    LoadFailure {
        backend: BackendKind,
        path: String,
        reason: String,
    },

    #[error("backend '{backend}' setup failed: {message}")]
    SetupFailure { backend: BackendKind, message: String },

    #[error("allocation of {bytes} bytes on {side:?} side failed (backend error {code})")]
    AllocationFailure {
        bytes: usize,
        side: crate::Side,
        code: i32,
    },

    #[error("copy of {bytes} bytes from {src_kind:?} to {dst_kind:?} failed (backend error {code})")]
    CopyFailure {
        bytes: usize,
        src_kind: crate::PointerKind,
        dst_kind: crate::PointerKind,
        code: i32,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("backend '{backend}' reported error {code}: {message}")]
    Backend {
        backend: BackendKind,
        code: i32,
        message: String,
    },

    #[error("pointer does not belong to backend '{backend}'")]
    ForeignPointer { backend: BackendKind },
}
