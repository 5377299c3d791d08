//! The always-available CPU reference driver.

use std::alloc::{self, Layout};
use std::collections::HashMap;
use std::ptr;
use std::sync::Mutex;

use crate::driver::DriverInterface;
use crate::types::{BackendKind, DeviceProperties, Dim, PointerKind};

/// Error codes returned by [`CpuDriver`]. `0` means success everywhere in this crate.
pub mod errc {
    pub const UNKNOWN_POINTER: i32 = 1;
    pub const OUT_OF_MEMORY: i32 = 2;
    pub const DEVICE_OUT_OF_RANGE: i32 = 3;
}

struct Allocation {
    layout: Layout,
    kind: PointerKind,
}

/// The CPU reference driver.
///
/// `malloc_device` and `malloc_host` both hand out ordinary heap memory; the two
/// are tagged separately so `pointer_kind` can still answer correctly and so that
/// wrappers built on top (e.g. `HdBuffer`) can detect aliasing deliberately rather
/// than by accident. Always constructed during `initialize`, regardless of which
/// backend ends up active, so CPU-side reference computation stays available.
pub struct CpuDriver {
    allocations: Mutex<HashMap<usize, Allocation>>,
}

const ALIGN: usize = 16;

impl CpuDriver {
    pub fn new() -> CpuDriver {
        CpuDriver {
            allocations: Mutex::new(HashMap::new()),
        }
    }

    fn alloc_tagged(&self, bytes: usize, kind: PointerKind) -> Result<*mut u8, i32> {
        if bytes == 0 {
            // A zero-byte allocation still needs a unique, freeable "pointer" identity.
            let layout = Layout::from_size_align(1, ALIGN).unwrap();
            let ptr = unsafe { alloc::alloc(layout) };
            if ptr.is_null() {
                return Err(errc::OUT_OF_MEMORY);
            }
            self.allocations
                .lock()
                .unwrap()
                .insert(ptr as usize, Allocation { layout, kind });
            return Ok(ptr);
        }

        let layout = Layout::from_size_align(bytes, ALIGN).map_err(|_| errc::OUT_OF_MEMORY)?;
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

impl Default for CpuDriver {
    fn default() -> CpuDriver {
        CpuDriver::new()
    }
}

impl DriverInterface for CpuDriver {
    fn setup(&self) -> Result<(), i32> {
        tracing::info!(backend = "cpu", "driver setup");
        Ok(())
    }

    fn malloc_device(&self, bytes: usize) -> Result<*mut u8, i32> {
        self.alloc_tagged(bytes, PointerKind::Device)
    }

    fn malloc_host(&self, bytes: usize) -> Result<*mut u8, i32> {
        self.alloc_tagged(bytes, PointerKind::Host)
    }

    fn malloc_shared(&self, bytes: usize) -> Result<*mut u8, i32> {
        self.alloc_tagged(bytes, PointerKind::Shared)
    }

    unsafe fn free(&self, ptr: *mut u8) -> Result<(), i32> {
        let mut allocations = self.allocations.lock().unwrap();
        match allocations.remove(&(ptr as usize)) {
            Some(alloc_entry) => {
                alloc::dealloc(ptr, alloc_entry.layout);
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
            name: "CPU".to_string(),
            arch: "host".to_string(),
            warp_or_subgroup_size: 1,
            shared_mem_bytes: 48 * 1024,
            const_mem_bytes: 64 * 1024,
            max_threads_per_block: self.default_block_size(),
            max_grid: Dim::new(i32::MAX as i64),
            mem_free_bytes: usize::MAX / 2,
            mem_total_bytes: usize::MAX / 2,
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
        Ok((usize::MAX / 2, usize::MAX / 2))
    }

    fn error_to_string(&self, code: i32) -> String {
        match code {
            0 => "success".to_string(),
            errc::UNKNOWN_POINTER => "pointer not allocated by this driver".to_string(),
            errc::OUT_OF_MEMORY => "out of memory".to_string(),
            errc::DEVICE_OUT_OF_RANGE => "device index out of range".to_string(),
            other => format!("unknown CPU driver error {other}"),
        }
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn default_block_size(&self) -> u32 {
        64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_free_round_trip() {
        let drv = CpuDriver::new();
        let ptr = drv.malloc_device(256).unwrap();
        assert_eq!(drv.pointer_kind(ptr), PointerKind::Device);
        unsafe { drv.free(ptr).unwrap() };
        assert_eq!(drv.pointer_kind(ptr), PointerKind::Unknown);
    }

    #[test]
    fn double_free_is_an_error() {
        let drv = CpuDriver::new();
        let ptr = drv.malloc_host(8).unwrap();
        unsafe { drv.free(ptr).unwrap() };
        assert_eq!(unsafe { drv.free(ptr) }, Err(errc::UNKNOWN_POINTER));
    }

    #[test]
    fn host_and_device_allocations_are_distinct() {
        let drv = CpuDriver::new();
        let h = drv.malloc_host(64).unwrap();
        let d = drv.malloc_device(64).unwrap();
        assert_ne!(h, d);
        assert_eq!(drv.pointer_kind(h), PointerKind::Host);
        assert_eq!(drv.pointer_kind(d), PointerKind::Device);
        unsafe {
            drv.free(h).unwrap();
            drv.free(d).unwrap();
        }
    }

    #[test]
    fn memcpy_round_trip() {
        let drv = CpuDriver::new();
        let src = [1u8, 2, 3, 4];
        let dst_ptr = drv.malloc_host(4).unwrap();
        unsafe {
            drv.memcpy(dst_ptr, src.as_ptr(), 4).unwrap();
            let dst_slice = std::slice::from_raw_parts(dst_ptr, 4);
            assert_eq!(dst_slice, &src);
            drv.free(dst_ptr).unwrap();
        }
    }
}
