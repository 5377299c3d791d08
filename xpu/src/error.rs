//! Runtime-facing error taxonomy. Wraps the driver-level [`xpu_core::Error`] and
//! adds the kinds that only make sense once kernels, images, and the runtime
//! singleton exist.

use xpu_core::BackendKind;

/// Result alias used throughout `xpu`.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] xpu_core::Error),

    #[error("initialize() was already called; the active backend is unchanged")]
    AlreadyInitialised,

    #[error("kernel '{kernel}' launch failed on backend '{backend}' (error {code}): {message}")]
    LaunchFailure {
        kernel: String,
        backend: BackendKind,
        code: i32,
        message: String,
    },

    #[error("image for this family does not declare kernel '{kernel}'")]
    NoSuchKernel { kernel: String },

    #[error("image for this family does not declare constant '{constant}'")]
    NoSuchConstant { constant: String },
}
