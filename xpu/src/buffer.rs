//! Typed buffer wrappers over the host façade's `malloc`/`free`/`copy`.

use std::marker::PhantomData;
use std::ptr;

use xpu_core::{BackendKind, Direction, Side};

use crate::error::Result;
use crate::runtime;

fn typed_malloc<T>(side: Side, len: usize) -> Result<*mut T> {
    crate::malloc(len, side)
}

fn typed_free<T>(ptr: *mut T) {
    if ptr.is_null() {
        return;
    }
    // Freeing a pointer the active driver never allocated (or already freed)
    // would be a logic error upstream; nothing useful can be done with it
    // from a `Drop` impl, so the error is dropped.
    let _ = unsafe { crate::free(ptr) };
}

fn typed_copy<T>(dst: *mut T, src: *const T, len: usize) -> Result<()> {
    unsafe { crate::copy(dst, src, len) }
}

/// A host-only buffer of `len` elements of `T`.
pub struct HostBuffer<T> {
    ptr: *mut T,
    len: usize,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for HostBuffer<T> {}
unsafe impl<T: Sync> Sync for HostBuffer<T> {}

impl<T: Copy> HostBuffer<T> {
    /// Allocates room for `len` elements of `T` on the host.
    pub fn new(len: usize) -> Result<HostBuffer<T>> {
        let ptr = typed_malloc::<T>(Side::Host, len)?;
        Ok(HostBuffer {
            ptr,
            len,
            _marker: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr
    }

    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr
    }

    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl<T> Drop for HostBuffer<T> {
    fn drop(&mut self) {
        typed_free(self.ptr);
        self.ptr = ptr::null_mut();
    }
}

/// A device-only buffer of `len` elements of `T`. Not host-addressable;
/// contents must be staged through a [`HostBuffer`] or an [`HdBuffer`].
pub struct DBuffer<T> {
    ptr: *mut T,
    len: usize,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for DBuffer<T> {}
unsafe impl<T: Sync> Sync for DBuffer<T> {}

impl<T: Copy> DBuffer<T> {
    /// Allocates room for `len` elements of `T` on the active device.
    pub fn new(len: usize) -> Result<DBuffer<T>> {
        let ptr = typed_malloc::<T>(Side::Device, len)?;
        Ok(DBuffer {
            ptr,
            len,
            _marker: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr
    }

    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr
    }

    /// Copies `len` elements from `src` into this buffer.
    pub fn copy_from_host(&mut self, src: &[T]) -> Result<()> {
        assert_eq!(src.len(), self.len, "source slice length must match buffer length");
        typed_copy(self.ptr, src.as_ptr(), self.len)
    }

    /// Copies `len` elements out of this buffer into `dst`.
    pub fn copy_to_host(&self, dst: &mut [T]) -> Result<()> {
        assert_eq!(dst.len(), self.len, "destination slice length must match buffer length");
        typed_copy(dst.as_mut_ptr(), self.ptr, self.len)
    }
}

impl<T> Drop for DBuffer<T> {
    fn drop(&mut self) {
        typed_free(self.ptr);
        self.ptr = ptr::null_mut();
    }
}

/// A paired host/device buffer of `len` elements of `T`.
///
/// On the CPU backend `host_ptr()` and `device_ptr()` alias the same
/// allocation (`copy_required()` is `false`): the "device" side is ordinary heap memory
/// the CPU driver already owns, so staging a copy would be pure overhead.
/// On every other backend the two sides are genuinely distinct allocations
/// and must be kept in sync explicitly with [`HdBuffer::sync`].
pub struct HdBuffer<T> {
    host: *mut T,
    device: *mut T,
    len: usize,
}

unsafe impl<T: Send> Send for HdBuffer<T> {}
unsafe impl<T: Sync> Sync for HdBuffer<T> {}

impl<T: Copy> HdBuffer<T> {
    /// Allocates `len` elements of `T` on both sides of the host/device
    /// boundary (a single aliased allocation on the CPU backend).
    pub fn new(len: usize) -> Result<HdBuffer<T>> {
        let host = typed_malloc::<T>(Side::Host, len)?;
        let device = if runtime::Runtime::get().active_driver() == BackendKind::Cpu {
            host
        } else {
            match typed_malloc::<T>(Side::Device, len) {
                Ok(ptr) => ptr,
                Err(e) => {
                    typed_free(host);
                    return Err(e);
                }
            }
        };
        Ok(HdBuffer { host, device, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn host_ptr(&self) -> *mut T {
        self.host
    }

    pub fn device_ptr(&self) -> *mut T {
        self.device
    }

    /// Whether the host and device sides are distinct allocations. `false` on
    /// the CPU backend, `true` everywhere else.
    pub fn copy_required(&self) -> bool {
        self.host != self.device
    }

    pub fn host_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.host, self.len) }
    }

    pub fn host_slice_mut(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.host, self.len) }
    }

    /// Copies this buffer's contents across the host/device boundary in
    /// `direction`. A no-op when [`copy_required`](HdBuffer::copy_required) is
    /// `false`.
    ///
    /// Each direction is handled by its own early return: the source
    /// implementation this was modeled on fell through from
    /// `host_to_device` into `device_to_host` because its `switch` case was
    /// missing a `break`, silently performing both copies on every call.
    pub fn sync(&mut self, direction: Direction) -> Result<()> {
        if !self.copy_required() {
            return Ok(());
        }
        match direction {
            Direction::HostToDevice => typed_copy(self.device, self.host, self.len),
            Direction::DeviceToHost => typed_copy(self.host, self.device, self.len),
        }
    }
}

impl<T> Drop for HdBuffer<T> {
    fn drop(&mut self) {
        let device_differs = self.host != self.device;
        typed_free(self.host);
        if device_differs {
            typed_free(self.device);
        }
        self.host = ptr::null_mut();
        self.device = ptr::null_mut();
    }
}

#[cfg(test)]
impl<T: Copy> HdBuffer<T> {
    /// Forces separate host/device allocations regardless of the active
    /// backend, so `sync` can be exercised with `copy_required() == true`
    /// without a GPU backend loaded.
    fn new_distinct(len: usize) -> Result<HdBuffer<T>> {
        let host = typed_malloc::<T>(Side::Host, len)?;
        let device = match typed_malloc::<T>(Side::Device, len) {
            Ok(ptr) => ptr,
            Err(e) => {
                typed_free(host);
                return Err(e);
            }
        };
        Ok(HdBuffer { host, device, len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_buffer_allocates_and_frees_without_error() {
        let mut buf = HostBuffer::<u32>::new(4).expect("alloc host buffer");
        buf.as_mut_slice().copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(buf.as_slice(), &[1, 2, 3, 4]);
        assert_eq!(buf.len(), 4);
        assert!(!buf.is_empty());
        // Dropping `buf` here frees it; a double free or leak would show up
        // under a leak checker, not as a panic from this test.
    }

    #[test]
    fn d_buffer_copy_round_trips_through_the_device() {
        let mut d = DBuffer::<u32>::new(4).expect("alloc device buffer");
        let src = [10u32, 20, 30, 40];
        d.copy_from_host(&src).expect("copy to device");
        let mut dst = [0u32; 4];
        d.copy_to_host(&mut dst).expect("copy from device");
        assert_eq!(dst, src);
    }

    #[test]
    fn hd_buffer_aliases_host_and_device_on_the_cpu_backend() {
        let hd = HdBuffer::<u32>::new(4).expect("alloc hd buffer");
        assert!(!hd.copy_required());
        assert_eq!(hd.host_ptr(), hd.device_ptr());
    }

    #[test]
    fn hd_buffer_sync_moves_data_in_exactly_the_requested_direction() {
        let mut hd = HdBuffer::<u32>::new_distinct(4).expect("alloc distinct hd buffer");
        assert!(hd.copy_required());

        hd.host_slice_mut().copy_from_slice(&[1, 2, 3, 4]);
        unsafe {
            std::slice::from_raw_parts_mut(hd.device_ptr(), hd.len()).copy_from_slice(&[9, 9, 9, 9]);
        }

        hd.sync(Direction::HostToDevice).expect("host -> device sync");
        let device_values = unsafe { std::slice::from_raw_parts(hd.device_ptr(), hd.len()) };
        assert_eq!(device_values, &[1, 2, 3, 4], "device must take on the host's values");
        assert_eq!(hd.host_slice(), &[1, 2, 3, 4], "host must be untouched by its own source copy");

        unsafe {
            std::slice::from_raw_parts_mut(hd.device_ptr(), hd.len()).copy_from_slice(&[5, 6, 7, 8]);
        }
        hd.sync(Direction::DeviceToHost).expect("device -> host sync");
        assert_eq!(hd.host_slice(), &[5, 6, 7, 8], "host must take on the device's values");
        let device_values = unsafe { std::slice::from_raw_parts(hd.device_ptr(), hd.len()) };
        assert_eq!(device_values, &[5, 6, 7, 8], "device must be untouched by its own source copy");
    }
}
