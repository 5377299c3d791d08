//! `xpu`: the backend-agnostic host API for the heterogeneous-compute
//! runtime. Builds on `xpu-core`'s driver contract to provide a single
//! process-wide runtime, typed buffers, and compile-time-checked kernel
//! dispatch that works the same way whether the active backend is the CPU
//! reference driver or a `dlopen`ed GPU backend.
//!
//! ```no_run
//! use xpu::{HdBuffer, InitOptions};
//! use xpu_core::BackendKind;
//!
//! xpu::initialize(BackendKind::Cpu, InitOptions::default()).unwrap();
//! let mut buf = HdBuffer::<f32>::new(1024).unwrap();
//! buf.host_slice_mut().fill(1.0);
//! buf.sync(xpu_core::Direction::HostToDevice).unwrap();
//! ```

pub mod buffer;
pub mod error;
pub mod kernel;
pub mod registry;
pub mod runtime;

pub use crate::buffer::{DBuffer, HdBuffer, HostBuffer};
pub use crate::error::{Error, Result};
pub use crate::kernel::{constant_id, kernel_id, ConstantSymbol, GpuImage, ImageFamily, KernelTag};
pub use crate::registry::{box_gpu_image, drop_gpu_image};
pub use crate::runtime::{InitOptions, Runtime};

pub use xpu_core::{
    BackendKind, DeviceProperties, DeviceRecord, Dim, Direction, Grid, KernelInfo, PointerKind,
    ResolvedGrid, Side,
};

/// Selects and sets up `backend` for the lifetime of the process. May be
/// called exactly once; a second call returns [`Error::AlreadyInitialised`].
pub fn initialize(backend: BackendKind, options: InitOptions) -> Result<()> {
    Runtime::get().initialize(backend, options)
}

/// The backend selected by [`initialize`], or `Cpu` before `initialize` runs.
pub fn active_driver() -> BackendKind {
    Runtime::get().active_driver()
}

/// Number of devices visible to the active backend.
pub fn num_devices() -> usize {
    Runtime::get().num_devices()
}

/// Selects device `index` on the active backend.
pub fn set_device(index: usize) -> Result<DeviceRecord> {
    Runtime::get().set_device(index)
}

/// The currently selected device on the active backend.
pub fn get_device() -> DeviceRecord {
    Runtime::get().get_device()
}

/// Static properties of device `index` on the active backend.
pub fn get_properties(index: usize) -> Result<DeviceProperties> {
    Runtime::get().get_properties(index)
}

/// `(free_bytes, total_bytes)` on the active backend's current device.
pub fn meminfo() -> Result<(usize, usize)> {
    Runtime::get().meminfo()
}

/// Allocates room for `n` elements of `T` on the host.
pub fn host_malloc<T>(n: usize) -> Result<*mut T> {
    malloc(n, Side::Host)
}

/// Allocates room for `n` elements of `T` on the active device.
pub fn device_malloc<T>(n: usize) -> Result<*mut T> {
    malloc(n, Side::Device)
}

/// Allocates room for `n` elements of `T` on `side` of the host/device boundary.
pub fn malloc<T>(n: usize, side: Side) -> Result<*mut T> {
    let bytes = n * std::mem::size_of::<T>();
    Runtime::get().malloc(side, bytes).map(|ptr| ptr as *mut T)
}

/// Releases an allocation returned by [`malloc`], [`host_malloc`], or
/// [`device_malloc`].
///
/// # Safety
/// `ptr` must have been returned by one of those functions against this
/// runtime's active driver, and not yet freed.
pub unsafe fn free<T>(ptr: *mut T) -> Result<()> {
    Runtime::get().free(ptr as *mut u8)
}

/// Copies `bytes` raw bytes from `src` to `dst` using the active driver.
///
/// # Safety
/// `dst` and `src` must each address at least `bytes` valid, non-overlapping
/// bytes.
pub unsafe fn memcpy(dst: *mut u8, src: *const u8, bytes: usize) -> Result<()> {
    Runtime::get().memcpy(dst, src, bytes)
}

/// Copies `n` elements of `T` from `src` to `dst`, multiplying by
/// `size_of::<T>()` before forwarding to the untyped [`memcpy`].
///
/// # Safety
/// `dst` and `src` must each address at least `n` valid, non-overlapping
/// elements of `T`.
pub unsafe fn copy<T>(dst: *mut T, src: *const T, n: usize) -> Result<()> {
    memcpy(dst as *mut u8, src as *const u8, n * std::mem::size_of::<T>())
}

/// Dispatches one launch of kernel `K` over `grid` with `args`.
pub fn run_kernel<K: KernelTag>(grid: Grid, args: K::Args) -> Result<()> {
    Runtime::get().run_kernel::<K>(grid, args)
}

/// Uploads `value` into constant symbol `C`.
pub fn set_constant<C: ConstantSymbol>(value: C::Value) -> Result<()> {
    Runtime::get().set_constant::<C>(value)
}

/// Every recorded elapsed-time sample for kernel `K`, in launch order.
pub fn get_timing<K: KernelTag>() -> Vec<f32> {
    Runtime::get().get_timing::<K>()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoFamily;
    #[derive(Default)]
    struct EchoImage;
    impl ImageFamily for EchoFamily {
        type CpuImage = EchoImage;
        fn file_name() -> &'static str {
            "echo"
        }
    }

    struct Fill;
    impl KernelTag for Fill {
        type Family = EchoFamily;
        type Args = (*mut f32, usize, f32);
        const NAME: &'static str = "fill";

        fn run_cpu(
            _image: &EchoImage,
            _timing: Option<&mut f32>,
            grid: Grid,
            args: (*mut f32, usize, f32),
        ) -> Result<()> {
            let resolved = grid.resolve(32)?;
            let (ptr, len, value) = args;
            let n = (resolved.n_logical_threads() as usize).min(len);
            let slice = unsafe { std::slice::from_raw_parts_mut(ptr, n) };
            slice.fill(value);
            Ok(())
        }
    }

    #[test]
    fn run_kernel_dispatches_on_cpu_image() {
        let mut values = vec![0.0f32; 8];
        run_kernel::<Fill>(Grid::n_threads(8i64), (values.as_mut_ptr(), values.len(), 7.0))
            .unwrap();
        assert_eq!(values, vec![7.0; 8]);
    }

    #[test]
    fn copy_round_trips_through_a_device_allocation() {
        let len = 16usize;
        let h: *mut u32 = host_malloc(len).unwrap();
        let d: *mut u32 = device_malloc(len).unwrap();
        let h2: *mut u32 = host_malloc(len).unwrap();

        unsafe {
            let src = std::slice::from_raw_parts_mut(h, len);
            for (i, v) in src.iter_mut().enumerate() {
                *v = i as u32;
            }

            copy(d, h as *const u32, len).unwrap();
            copy(h2, d as *const u32, len).unwrap();

            let original = std::slice::from_raw_parts(h, len);
            let round_tripped = std::slice::from_raw_parts(h2, len);
            assert_eq!(original, round_tripped);

            free(h).unwrap();
            free(d).unwrap();
            free(h2).unwrap();
        }
    }
}
