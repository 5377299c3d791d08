//! The uniform backend contract (`driver_interface`).

use crate::types::{BackendKind, DeviceProperties, PointerKind};

/// Capability set every backend (CPU or GPU) must implement.
///
/// Every fallible operation returns `Result<T, i32>`: a raw backend error code rather
/// than `xpu_core::Error`, so that the runtime (which knows which backend produced the
/// code) can attach context via `error_to_string` before surfacing it to the user. This
/// mirrors the source implementation's `xpu::error` (a plain integer) plus
/// `error_to_string`.
pub trait DriverInterface: Send + Sync {
    /// Initialises backend state, enumerates devices, and selects a default device.
    /// Idempotent: calling it more than once must not be observably different from
    /// calling it once.
    fn setup(&self) -> Result<(), i32>;

    /// Allocates `bytes` of device memory.
    fn malloc_device(&self, bytes: usize) -> Result<*mut u8, i32>;

    /// Allocates `bytes` of host memory (page-locked where the backend supports it).
    fn malloc_host(&self, bytes: usize) -> Result<*mut u8, i32>;

    /// Allocates `bytes` of memory addressable from both host and device. Backends
    /// without unified memory support return an error.
    fn malloc_shared(&self, bytes: usize) -> Result<*mut u8, i32>;

    /// Releases an allocation returned by any of the three `malloc_*` methods.
    ///
    /// # Safety
    /// `ptr` must have been returned by this same driver instance and not yet freed.
    unsafe fn free(&self, ptr: *mut u8) -> Result<(), i32>;

    /// Copies `bytes` bytes from `src` to `dst`. Blocking. The direction (h2d, d2h,
    /// d2d, h2h) is inferred by the backend from the pointer kinds.
    ///
    /// # Safety
    /// `dst` and `src` must each address at least `bytes` valid bytes and must not
    /// overlap.
    unsafe fn memcpy(&self, dst: *mut u8, src: *const u8, bytes: usize) -> Result<(), i32>;

    /// Fills `bytes` bytes at `dst` with `value`. Blocking.
    ///
    /// # Safety
    /// `dst` must address at least `bytes` valid bytes.
    unsafe fn memset(&self, dst: *mut u8, value: u8, bytes: usize) -> Result<(), i32>;

    /// Number of devices visible to this backend.
    fn num_devices(&self) -> usize;

    /// Selects the current device by index (`< num_devices()`).
    fn set_device(&self, index: usize) -> Result<(), i32>;

    /// Returns the index of the currently selected device.
    fn get_device(&self) -> usize;

    /// Blocks until all work previously issued on the current device has completed.
    fn device_synchronize(&self) -> Result<(), i32>;

    /// Returns static properties of the device at `index`.
    fn get_properties(&self, index: usize) -> Result<DeviceProperties, i32>;

    /// Categorises `ptr` as host/device/shared/unknown memory for this backend.
    fn pointer_kind(&self, ptr: *const u8) -> PointerKind;

    /// Returns the device index owning `ptr`, or an error if `ptr` was not produced
    /// by this backend.
    fn pointer_get_device(&self, ptr: *const u8) -> Result<usize, i32>;

    /// `(free_bytes, total_bytes)` on the current device.
    fn meminfo(&self) -> Result<(usize, usize), i32>;

    /// A stable human-readable description of a backend error code.
    fn error_to_string(&self, code: i32) -> String;

    /// The backend tag this driver implements; used to cross-check loaded shared
    /// objects against the family/backend pair the registry expected.
    fn kind(&self) -> BackendKind;

    /// This backend's fixed default threads-per-block, used to resolve a
    /// threads-given [`crate::types::Grid`].
    fn default_block_size(&self) -> u32;
}
