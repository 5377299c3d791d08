//! The per-(backend, image family) instance cache.
//!
//! Mirrors the source runtime's `image_pool`: an image is constructed (CPU)
//! or `dlopen`ed (GPU) at most once, the first time any of its kernels or
//! constants is referenced, and lives for the rest of the process.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::ffi::c_void;

use xpu_core::{loader, BackendKind, LoadedObject};

use crate::error::Result;
use crate::kernel::{GpuImage, ImageFamily};

enum ImageEntry {
    Cpu(Box<dyn Any + Send + Sync>),
    Gpu(LoadedObject),
}

#[derive(Default)]
pub struct ImageRegistry {
    entries: HashMap<(BackendKind, TypeId), ImageEntry>,
}

impl ImageRegistry {
    pub fn new() -> ImageRegistry {
        ImageRegistry {
            entries: HashMap::new(),
        }
    }

    /// Returns family `F`'s CPU image, constructing it on first reference.
    pub fn cpu_image<F: ImageFamily>(&mut self) -> &F::CpuImage {
        let key = (BackendKind::Cpu, TypeId::of::<F>());
        let entry = self.entries.entry(key).or_insert_with(|| {
            tracing::debug!(family = std::any::type_name::<F>(), "instantiating CPU image");
            ImageEntry::Cpu(Box::new(F::CpuImage::default()))
        });
        match entry {
            ImageEntry::Cpu(any) => any
                .downcast_ref::<F::CpuImage>()
                .expect("image family registered under its own TypeId"),
            ImageEntry::Gpu(_) => unreachable!("CPU key can only hold a CPU entry"),
        }
    }

    /// Returns family `F`'s image on `backend`, loading its shared object on
    /// first reference.
    pub fn gpu_image<F: ImageFamily>(&mut self, backend: BackendKind) -> Result<&dyn GpuImage> {
        let key = (backend, TypeId::of::<F>());
        if !self.entries.contains_key(&key) {
            let file_name = loader::image_file_name(F::file_name(), backend);
            let path = loader::resolve_library_path(&file_name);
            let object = LoadedObject::open(&path, backend)?;
            tracing::info!(
                family = std::any::type_name::<F>(),
                backend = %backend,
                "loaded image"
            );
            self.entries.insert(key, ImageEntry::Gpu(object));
        }
        match self.entries.get(&key).expect("just inserted above") {
            ImageEntry::Gpu(obj) => Ok(unsafe { gpu_image_from_raw(obj.object()) }),
            ImageEntry::Cpu(_) => unreachable!("non-CPU key can only hold a GPU entry"),
        }
    }
}

/// Casts a `create()`-produced pointer back into a `&dyn GpuImage`.
///
/// # Safety
/// `ptr` must have been produced by [`box_gpu_image`] and must outlive the
/// returned reference.
pub unsafe fn gpu_image_from_raw<'a>(ptr: *mut c_void) -> &'a dyn GpuImage {
    let boxed = ptr as *mut Box<dyn GpuImage>;
    &**boxed
}

/// Boxes `image` twice (trait object, then a thin pointer to it) so a
/// backend's `create` export can hand it across the `dlopen` boundary behind
/// a plain `*mut c_void`. Pair with [`drop_gpu_image`] in the shared object's
/// `destroy` export.
pub fn box_gpu_image<I: GpuImage + 'static>(image: I) -> *mut c_void {
    let trait_object: Box<dyn GpuImage> = Box::new(image);
    Box::into_raw(Box::new(trait_object)) as *mut c_void
}

/// Reconstructs and drops a pointer produced by [`box_gpu_image`].
///
/// # Safety
/// `ptr` must have been produced by [`box_gpu_image`] and not yet dropped.
pub unsafe fn drop_gpu_image(ptr: *mut c_void) {
    drop(Box::from_raw(ptr as *mut Box<dyn GpuImage>));
}
