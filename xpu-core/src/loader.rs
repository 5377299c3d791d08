//! Dynamic loading of backend and image shared objects.

use std::ffi::c_void;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use crate::driver::DriverInterface;
use crate::error::{Error, Result};
use crate::types::BackendKind;

type CreateFn = unsafe extern "C" fn() -> *mut c_void;
type DestroyFn = unsafe extern "C" fn(*mut c_void);

/// Conventional shared-object file name for a backend driver, e.g.
/// `libxpu_backend_cuda.so` on Linux.
pub fn backend_file_name(backend: BackendKind) -> String {
    platform_file_name(&format!("xpu_backend_{}", backend.as_str()))
}

/// Conventional shared-object file name for an image family on a given backend,
/// e.g. `libvector_ops_cuda.so`.
pub fn image_file_name(family_file_name: &str, backend: BackendKind) -> String {
    platform_file_name(&format!("{family_file_name}_{}", backend.as_str()))
}

#[cfg(target_os = "windows")]
fn platform_file_name(stem: &str) -> String {
    format!("{stem}.dll")
}

#[cfg(target_os = "macos")]
fn platform_file_name(stem: &str) -> String {
    format!("lib{stem}.dylib")
}

#[cfg(all(unix, not(target_os = "macos")))]
fn platform_file_name(stem: &str) -> String {
    format!("lib{stem}.so")
}

/// An owned handle to an object obtained from a dynamically loaded shared library.
///
/// `destroy` is guaranteed to run (on the object returned by `create`) strictly
/// before the library itself is unloaded: field declaration order controls `Drop`
/// order in Rust, and `object`/`destroy` are declared above `library`.
pub struct LoadedObject {
    object: *mut c_void,
    destroy: DestroyFn,
    library: Library,
}

unsafe impl Send for LoadedObject {}
unsafe impl Sync for LoadedObject {}

impl LoadedObject {
    /// Opens `path`, resolves `create`/`destroy`, and calls `create` to obtain the
    /// owned object. `backend` is used only to produce a descriptive error.
    pub fn open(path: &Path, backend: BackendKind) -> Result<LoadedObject> {
        tracing::info!(backend = %backend, path = %path.display(), "loading shared object");

        let library = unsafe { Library::new(path) }.map_err(|e| Error::LoadFailure {
            backend,
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let create: Symbol<CreateFn> = unsafe { library.get(b"create\0") }.map_err(|e| {
            Error::LoadFailure {
                backend,
                path: path.display().to_string(),
                reason: format!("missing symbol 'create': {e}"),
            }
        })?;
        let destroy: Symbol<DestroyFn> = unsafe { library.get(b"destroy\0") }.map_err(|e| {
            Error::LoadFailure {
                backend,
                path: path.display().to_string(),
                reason: format!("missing symbol 'destroy': {e}"),
            }
        })?;

        let create = *create;
        let destroy = *destroy;
        let object = unsafe { create() };
        if object.is_null() {
            return Err(Error::LoadFailure {
                backend,
                path: path.display().to_string(),
                reason: "create() returned a null object".to_string(),
            });
        }

        Ok(LoadedObject {
            object,
            destroy,
            library,
        })
    }

    /// The raw object pointer returned by `create`.
    pub fn object(&self) -> *mut c_void {
        self.object
    }
}

impl Drop for LoadedObject {
    fn drop(&mut self) {
        unsafe { (self.destroy)(self.object) };
    }
}

/// Resolves the search path for a backend or image shared object. Looks in the
/// current directory first, then `$XPU_BACKEND_PATH` if set (a `:`/`;`-separated
/// list, matching the platform path-list convention).
pub fn resolve_library_path(file_name: &str) -> PathBuf {
    let here = PathBuf::from(file_name);
    if here.exists() {
        return here;
    }

    if let Ok(search_path) = std::env::var("XPU_BACKEND_PATH") {
        for dir in std::env::split_paths(&search_path) {
            let candidate = dir.join(file_name);
            if candidate.exists() {
                return candidate;
            }
        }
    }

    here
}

/// Boxes `driver` twice (trait object, then a thin pointer to it) so a backend's
/// `create` export can hand it across the `dlopen` boundary behind a plain
/// `*mut c_void`. Pair with [`drop_driver`] in the shared object's `destroy`.
pub fn box_driver<D: DriverInterface + 'static>(driver: D) -> *mut c_void {
    let trait_object: Box<dyn DriverInterface> = Box::new(driver);
    Box::into_raw(Box::new(trait_object)) as *mut c_void
}

/// Casts a `create()`-produced pointer back into a `&dyn DriverInterface`.
///
/// # Safety
/// `ptr` must have been produced by [`box_driver`] and must outlive the
/// returned reference.
pub unsafe fn driver_from_raw<'a>(ptr: *mut c_void) -> &'a dyn DriverInterface {
    let boxed = ptr as *mut Box<dyn DriverInterface>;
    &**boxed
}

/// Reconstructs and drops a pointer produced by [`box_driver`].
///
/// # Safety
/// `ptr` must have been produced by [`box_driver`] and not yet dropped.
pub unsafe fn drop_driver(ptr: *mut c_void) {
    drop(Box::from_raw(ptr as *mut Box<dyn DriverInterface>));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_follow_platform_convention() {
        let name = backend_file_name(BackendKind::Cuda);
        assert!(name.contains("xpu_backend_cuda"));
    }

    #[test]
    fn missing_library_is_a_load_failure() {
        let path = PathBuf::from("libxpu_backend_does_not_exist.so");
        let err = LoadedObject::open(&path, BackendKind::Cuda).unwrap_err();
        match err {
            Error::LoadFailure { backend, .. } => assert_eq!(backend, BackendKind::Cuda),
            other => panic!("expected LoadFailure, got {other:?}"),
        }
    }
}
