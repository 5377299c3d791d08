//! CUDA-like stub backend for the `xpu` runtime.
//!
//! There is no CUDA toolchain here: device memory is ordinary heap memory,
//! kept in a *separate* allocation from any host allocation so that
//! `HdBuffer::copy_required()` is `true` for this backend, matching what a
//! real discrete-GPU backend would report. This crate exists to exercise the
//! dynamic-loading and dispatch machinery end-to-end without depending on
//! vendor tooling; it does not simulate CUDA semantics beyond that.

use std::alloc::{self, Layout};
use std::collections::HashMap;
use std::ffi::c_void;
use std::ptr;
use std::sync::Mutex;

use xpu_core::{BackendKind, DeviceProperties, Dim, DriverInterface, PointerKind};

mod errc {
    pub const UNKNOWN_POINTER: i32 = 1;
    pub const OUT_OF_MEMORY: i32 = 2;
    pub const DEVICE_OUT_OF_RANGE: i32 = 3;
    pub const UNSUPPORTED: i32 = 4;
}

struct Allocation {
    layout: Layout,
    kind: PointerKind,
}

struct CudaStubDriver {
    allocations: Mutex<HashMap<usize, Allocation>>,
}

const ALIGN: usize = 16;

impl CudaStubDriver {
    fn new() -> CudaStubDriver {
        CudaStubDriver {
            allocations: Mutex::new(HashMap::new()),
        }
    }

    fn alloc_tagged(&self, bytes: usize, kind: PointerKind) -> Result<*mut u8, i32> {
        let layout = Layout::from_size_align(bytes.max(1), ALIGN).map_err(|_| errc::OUT_OF_MEMORY)?;
        let ptr = unsafe { alloc::alloc(layout) };
        if ptr.is_null() {
            return Err(errc::OUT_OF_MEMORY);
        }
        self.allocations
            .lock()
            .unwrap()
            .insert(ptr as usize, Allocation { layout, kind });
        Ok(ptr)
    }
}

impl DriverInterface for CudaStubDriver {
    fn setup(&self) -> Result<(), i32> {
        tracing::info!(backend = "cuda", "stub driver setup");
        Ok(())
    }

    fn malloc_device(&self, bytes: usize) -> Result<*mut u8, i32> {
        self.alloc_tagged(bytes, PointerKind::Device)
    }

    fn malloc_host(&self, bytes: usize) -> Result<*mut u8, i32> {
        self.alloc_tagged(bytes, PointerKind::Host)
    }

    fn malloc_shared(&self, _bytes: usize) -> Result<*mut u8, i32> {
        // This stub has no unified-memory model to back onto; only the SYCL
        // stub supports shared allocations.
        Err(errc::UNSUPPORTED)
    }

    unsafe fn free(&self, ptr: *mut u8) -> Result<(), i32> {
        match self.allocations.lock().unwrap().remove(&(ptr as usize)) {
            Some(a) => {
                alloc::dealloc(ptr, a.layout);
                Ok(())
            }
            None => Err(errc::UNKNOWN_POINTER),
        }
    }

    unsafe fn memcpy(&self, dst: *mut u8, src: *const u8, bytes: usize) -> Result<(), i32> {
        if bytes > 0 {
            ptr::copy_nonoverlapping(src, dst, bytes);
        }
        Ok(())
    }

    unsafe fn memset(&self, dst: *mut u8, value: u8, bytes: usize) -> Result<(), i32> {
        if bytes > 0 {
            ptr::write_bytes(dst, value, bytes);
        }
        Ok(())
    }

    fn num_devices(&self) -> usize {
        1
    }

    fn set_device(&self, index: usize) -> Result<(), i32> {
        if index == 0 {
            Ok(())
        } else {
            Err(errc::DEVICE_OUT_OF_RANGE)
        }
    }

    fn get_device(&self) -> usize {
        0
    }

    fn device_synchronize(&self) -> Result<(), i32> {
        Ok(())
    }

    fn get_properties(&self, index: usize) -> Result<DeviceProperties, i32> {
        if index != 0 {
            return Err(errc::DEVICE_OUT_OF_RANGE);
        }
        Ok(DeviceProperties {
            name: "stub-cuda-device-0".to_string(),
            arch: "sm_stub".to_string(),
            warp_or_subgroup_size: 32,
            shared_mem_bytes: 48 * 1024,
            const_mem_bytes: 64 * 1024,
            max_threads_per_block: self.default_block_size(),
            max_grid: Dim::new3(i32::MAX as i64, 65535, 65535),
            mem_free_bytes: 8 * 1024 * 1024 * 1024,
            mem_total_bytes: 8 * 1024 * 1024 * 1024,
        })
    }

    fn pointer_kind(&self, ptr: *const u8) -> PointerKind {
        self.allocations
            .lock()
            .unwrap()
            .get(&(ptr as usize))
            .map(|a| a.kind)
            .unwrap_or(PointerKind::Unknown)
    }

    fn pointer_get_device(&self, ptr: *const u8) -> Result<usize, i32> {
        if self.allocations.lock().unwrap().contains_key(&(ptr as usize)) {
            Ok(0)
        } else {
            Err(errc::UNKNOWN_POINTER)
        }
    }

    fn meminfo(&self) -> Result<(usize, usize), i32> {
        Ok((8 * 1024 * 1024 * 1024, 8 * 1024 * 1024 * 1024))
    }

    fn error_to_string(&self, code: i32) -> String {
        match code {
            0 => "success".to_string(),
            errc::UNKNOWN_POINTER => "pointer not allocated by this driver".to_string(),
            errc::OUT_OF_MEMORY => "out of memory".to_string(),
            errc::DEVICE_OUT_OF_RANGE => "device index out of range".to_string(),
            errc::UNSUPPORTED => "operation not supported by this backend".to_string(),
            other => format!("unknown CUDA stub driver error {other}"),
        }
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Cuda
    }

    fn default_block_size(&self) -> u32 {
        128
    }
}

/// # Safety
/// Called only by `xpu_core::loader::LoadedObject::open`, which requires
/// `destroy` be called on the returned pointer exactly once before the
/// library is unloaded.
#[no_mangle]
pub extern "C" fn create() -> *mut c_void {
    xpu_core::box_driver(CudaStubDriver::new())
}

/// # Safety
/// `object` must be a pointer previously returned by `create` and not yet
/// destroyed.
#[no_mangle]
pub extern "C" fn destroy(object: *mut c_void) {
    unsafe { xpu_core::drop_driver(object) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_and_device_allocations_are_distinct_pointers() {
        let drv = CudaStubDriver::new();
        let h = drv.malloc_host(64).unwrap();
        let d = drv.malloc_device(64).unwrap();
        assert_ne!(h, d);
        unsafe {
            drv.free(h).unwrap();
            drv.free(d).unwrap();
        }
    }

    #[test]
    fn kind_matches_backend() {
        assert_eq!(CudaStubDriver::new().kind(), BackendKind::Cuda);
    }

    #[test]
    fn malloc_shared_is_unsupported() {
        let drv = CudaStubDriver::new();
        assert_eq!(drv.malloc_shared(64), Err(errc::UNSUPPORTED));
    }
}
