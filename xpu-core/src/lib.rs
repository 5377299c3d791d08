//! `xpu-core`: the backend driver contract, dynamic-library loading, and the
//! CPU reference driver for the `xpu` heterogeneous-compute runtime.
//!
//! This crate is the leaf layer described in the design: it knows nothing about
//! kernels, images, or the runtime singleton. It only defines the capability set
//! every backend must implement (`DriverInterface`), the CPU implementation of
//! that contract, and the machinery to `dlopen` a GPU backend's shared object.

pub mod cpu;
pub mod driver;
pub mod error;
pub mod loader;
pub mod types;

pub use crate::cpu::CpuDriver;
pub use crate::driver::DriverInterface;
pub use crate::error::{Error, Result};
pub use crate::loader::{
    backend_file_name, box_driver, drop_driver, driver_from_raw, image_file_name,
    resolve_library_path, LoadedObject,
};
pub use crate::types::{
    BackendKind, DeviceProperties, DeviceRecord, Dim, Direction, Grid, KernelInfo, PointerKind,
    ResolvedGrid, Side,
};
