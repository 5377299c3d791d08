//! SYCL-like stub backend for the `xpu` runtime.
//!
//! No SYCL toolchain here; see `xpu-backend-cuda` for the rationale. Device
//! and host allocations are kept in separate heap regions so
//! `HdBuffer::copy_required()` is `true`.

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
}

struct Allocation {
    layout: Layout,
    kind: PointerKind,
}

struct SyclStubDriver {
    allocations: Mutex<HashMap<usize, Allocation>>,
}

const ALIGN: usize = 16;

impl SyclStubDriver {
    fn new() -> SyclStubDriver {
        SyclStubDriver {
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

impl DriverInterface for SyclStubDriver {
    fn setup(&self) -> Result<(), i32> {
        tracing::info!(backend = "sycl", "stub driver setup");
        Ok(())
    }

    fn malloc_device(&self, bytes: usize) -> Result<*mut u8, i32> {
        self.alloc_tagged(bytes, PointerKind::Device)
    }

    fn malloc_host(&self, bytes: usize) -> Result<*mut u8, i32> {
        self.alloc_tagged(bytes, PointerKind::Host)
    }

    fn malloc_shared(&self, bytes: usize) -> Result<*mut u8, i32> {
        // Unified shared memory is SYCL's headline feature; unlike the CUDA
        // and HIP stubs, this one actually tags allocations as `Shared`
        // rather than erroring.
        self.alloc_tagged(bytes, PointerKind::Shared)
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
            name: "stub-sycl-device-0".to_string(),
            arch: "spir64_stub".to_string(),
            warp_or_subgroup_size: 32,
            shared_mem_bytes: 32 * 1024,
            const_mem_bytes: 64 * 1024,
            max_threads_per_block: self.default_block_size(),
            max_grid: Dim::new3(i32::MAX as i64, 65535, 65535),
            mem_free_bytes: 4 * 1024 * 1024 * 1024,
            mem_total_bytes: 4 * 1024 * 1024 * 1024,
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
        Ok((4 * 1024 * 1024 * 1024, 4 * 1024 * 1024 * 1024))
    }

    fn error_to_string(&self, code: i32) -> String {
        match code {
            0 => "success".to_string(),
            errc::UNKNOWN_POINTER => "pointer not allocated by this driver".to_string(),
            errc::OUT_OF_MEMORY => "out of memory".to_string(),
            errc::DEVICE_OUT_OF_RANGE => "device index out of range".to_string(),
            other => format!("unknown SYCL stub driver error {other}"),
        }
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Sycl
    }

    fn default_block_size(&self) -> u32 {
        64
    }
}

/// # Safety
/// Called only by `xpu_core::loader::LoadedObject::open`, which requires
/// `destroy` be called on the returned pointer exactly once before the
/// library is unloaded.
#[no_mangle]
pub extern "C" fn create() -> *mut c_void {
    xpu_core::box_driver(SyclStubDriver::new())
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
    fn shared_allocations_are_tagged_shared() {
        let drv = SyclStubDriver::new();
        let ptr = drv.malloc_shared(64).unwrap();
        assert_eq!(drv.pointer_kind(ptr), PointerKind::Shared);
        unsafe { drv.free(ptr).unwrap() };
    }

    #[test]
    fn kind_matches_backend() {
        assert_eq!(SyclStubDriver::new().kind(), BackendKind::Sycl);
    }
}
