//! The process-wide runtime singleton: backend selection, allocation,
//! copying, kernel dispatch and timing. Constructed lazily on first reference,
//! `initialize`d at most once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use xpu_core::{
    BackendKind, CpuDriver, DeviceProperties, DeviceRecord, DriverInterface, Grid, LoadedObject,
    PointerKind, Side,
};

use crate::error::{Error, Result};
use crate::kernel::{constant_id, kernel_id, ConstantSymbol, ImageFamily, KernelTag};
use crate::registry::ImageRegistry;

/// Options controlling [`crate::initialize`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// When set, every [`crate::run_kernel`] call records elapsed time in the
    /// runtime's per-kernel timing table (retrievable with
    /// [`crate::get_timing`]).
    pub measure_time: bool,
}

struct RuntimeState {
    initialized: bool,
    active: BackendKind,
    cpu_driver: CpuDriver,
    gpu_driver: Option<LoadedObject>,
    images: ImageRegistry,
    measure_time: bool,
    profiling: HashMap<u32, Vec<f32>>,
    global_device_ids: HashMap<(BackendKind, usize), u64>,
}

/// Assigns a process-wide, monotonically increasing id the first time
/// `(backend, index)` is observed. Since only one backend is ever active,
/// this mostly degenerates to the device's local index, but keeps
/// [`DeviceRecord::global_id`] meaningful if that ever changes.
static NEXT_GLOBAL_DEVICE_ID: AtomicU64 = AtomicU64::new(0);

fn global_device_id(table: &mut HashMap<(BackendKind, usize), u64>, backend: BackendKind, index: usize) -> u64 {
    *table
        .entry((backend, index))
        .or_insert_with(|| NEXT_GLOBAL_DEVICE_ID.fetch_add(1, Ordering::Relaxed))
}

impl RuntimeState {
    fn driver(&self) -> &dyn DriverInterface {
        match self.active {
            BackendKind::Cpu => &self.cpu_driver,
            _ => {
                let handle = self
                    .gpu_driver
                    .as_ref()
                    .expect("active() is a GPU backend only after a driver has been loaded");
                unsafe { xpu_core::driver_from_raw(handle.object()) }
            }
        }
    }
}

/// The runtime singleton.
pub struct Runtime {
    state: Mutex<RuntimeState>,
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

fn instance() -> &'static Runtime {
    RUNTIME.get_or_init(|| Runtime {
        state: Mutex::new(RuntimeState {
            initialized: false,
            active: BackendKind::Cpu,
            cpu_driver: CpuDriver::new(),
            gpu_driver: None,
            images: ImageRegistry::new(),
            measure_time: false,
            profiling: HashMap::new(),
            global_device_ids: HashMap::new(),
        }),
    })
}

impl Runtime {
    /// Returns the process-wide runtime, constructing it on first reference.
    pub fn get() -> &'static Runtime {
        instance()
    }

    /// Selects and sets up `backend`. May be called exactly once per process;
    /// a second call returns [`Error::AlreadyInitialised`] without touching
    /// the already-active backend.
    pub fn initialize(&self, backend: BackendKind, options: InitOptions) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.initialized {
            return Err(Error::AlreadyInitialised);
        }

        state
            .cpu_driver
            .setup()
            .map_err(|code| xpu_core::Error::SetupFailure {
                backend: BackendKind::Cpu,
                message: state.cpu_driver.error_to_string(code),
            })?;

        if backend != BackendKind::Cpu {
            let file_name = xpu_core::backend_file_name(backend);
            let path = xpu_core::resolve_library_path(&file_name);
            let handle = LoadedObject::open(&path, backend)?;
            let driver = unsafe { xpu_core::driver_from_raw(handle.object()) };
            if driver.kind() != backend {
                return Err(xpu_core::Error::LoadFailure {
                    backend,
                    path: path.display().to_string(),
                    reason: format!("loaded driver reports kind '{}'", driver.kind()),
                }
                .into());
            }
            driver
                .setup()
                .map_err(|code| xpu_core::Error::SetupFailure {
                    backend,
                    message: driver.error_to_string(code),
                })?;
            state.gpu_driver = Some(handle);
        }

        state.active = backend;
        state.measure_time = options.measure_time;
        state.initialized = true;
        tracing::info!(backend = %backend, "runtime initialized");
        Ok(())
    }

    /// The backend selected by `initialize`, or `Cpu` if `initialize` has not
    /// been called yet.
    pub fn active_driver(&self) -> BackendKind {
        self.state.lock().unwrap().active
    }

    fn malloc_bytes(&self, side: Side, bytes: usize) -> Result<*mut u8> {
        let state = self.state.lock().unwrap();
        let driver = state.driver();
        let result = match side {
            Side::Host => driver.malloc_host(bytes),
            Side::Device => driver.malloc_device(bytes),
        };
        result.map_err(|code| {
            Error::from(xpu_core::Error::AllocationFailure { bytes, side, code })
        })
    }

    /// Allocates `bytes` on `side` of the host/device boundary.
    pub fn malloc(&self, side: Side, bytes: usize) -> Result<*mut u8> {
        self.malloc_bytes(side, bytes)
    }

    /// Releases an allocation returned by [`malloc`](Runtime::malloc).
    ///
    /// # Safety
    /// `ptr` must have been returned by this runtime's active driver and not
    /// yet freed.
    pub unsafe fn free(&self, ptr: *mut u8) -> Result<()> {
        let state = self.state.lock().unwrap();
        state.driver().free(ptr).map_err(|code| {
            Error::from(xpu_core::Error::Backend {
                backend: state.active,
                code,
                message: state.driver().error_to_string(code),
            })
        })
    }

    /// Copies `bytes` bytes from `src` to `dst` using the active driver.
    ///
    /// # Safety
    /// `dst` and `src` must each address at least `bytes` valid, non-overlapping
    /// bytes.
    pub unsafe fn memcpy(&self, dst: *mut u8, src: *const u8, bytes: usize) -> Result<()> {
        let state = self.state.lock().unwrap();
        let driver = state.driver();
        driver.memcpy(dst, src, bytes).map_err(|code| {
            let src_kind = driver.pointer_kind(src);
            let dst_kind = driver.pointer_kind(dst as *const u8);
            Error::from(xpu_core::Error::CopyFailure {
                bytes,
                src_kind,
                dst_kind,
                code,
            })
        })
    }

    /// Categorises `ptr` under the active driver.
    pub fn pointer_kind(&self, ptr: *const u8) -> PointerKind {
        self.state.lock().unwrap().driver().pointer_kind(ptr)
    }

    /// Number of devices visible to the active backend.
    pub fn num_devices(&self) -> usize {
        self.state.lock().unwrap().driver().num_devices()
    }

    /// Selects device `index` on the active backend and returns the
    /// [`DeviceRecord`] naming it.
    pub fn set_device(&self, index: usize) -> Result<DeviceRecord> {
        let mut state = self.state.lock().unwrap();
        let backend = state.active;
        state.driver().set_device(index).map_err(|code| {
            Error::from(xpu_core::Error::Backend {
                backend,
                code,
                message: state.driver().error_to_string(code),
            })
        })?;
        let global_id = global_device_id(&mut state.global_device_ids, backend, index);
        Ok(DeviceRecord {
            global_id,
            backend,
            index,
        })
    }

    /// The [`DeviceRecord`] naming the active backend's currently selected
    /// device.
    pub fn get_device(&self) -> DeviceRecord {
        let mut state = self.state.lock().unwrap();
        let backend = state.active;
        let index = state.driver().get_device();
        let global_id = global_device_id(&mut state.global_device_ids, backend, index);
        DeviceRecord {
            global_id,
            backend,
            index,
        }
    }

    /// Static properties of device `index` on the active backend.
    pub fn get_properties(&self, index: usize) -> Result<DeviceProperties> {
        let state = self.state.lock().unwrap();
        let backend = state.active;
        state.driver().get_properties(index).map_err(|code| {
            Error::from(xpu_core::Error::Backend {
                backend,
                code,
                message: state.driver().error_to_string(code),
            })
        })
    }

    /// `(free_bytes, total_bytes)` on the active backend's current device.
    pub fn meminfo(&self) -> Result<(usize, usize)> {
        let state = self.state.lock().unwrap();
        let backend = state.active;
        state.driver().meminfo().map_err(|code| {
            Error::from(xpu_core::Error::Backend {
                backend,
                code,
                message: state.driver().error_to_string(code),
            })
        })
    }

    /// Dispatches one launch of kernel `K`.
    pub fn run_kernel<K: KernelTag>(&self, grid: Grid, args: K::Args) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let backend = state.active;
        let measure = state.measure_time;
        let kid = kernel_id::<K>();
        let mut elapsed: f32 = 0.0;

        let result = match backend {
            BackendKind::Cpu => {
                let timing = if measure { Some(&mut elapsed) } else { None };
                let image = state.images.cpu_image::<K::Family>();
                K::run_cpu(image, timing, grid, args)
            }
            gpu => {
                let timing = if measure { Some(&mut elapsed) } else { None };
                let image = state.images.gpu_image::<K::Family>(gpu)?;
                K::run_gpu(image, kid, timing, grid, args)
            }
        };
        result?;

        if measure {
            state.profiling.entry(kid).or_default().push(elapsed);
        }
        Ok(())
    }

    /// Uploads `value` into constant symbol `C`.
    pub fn set_constant<C: ConstantSymbol>(&self, value: C::Value) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.active {
            BackendKind::Cpu => {
                let image = state.images.cpu_image::<C::Family>();
                C::store_cpu(image, value);
                Ok(())
            }
            gpu => {
                let cid = constant_id::<C>();
                let image = state.images.gpu_image::<C::Family>(gpu)?;
                let bytes = unsafe {
                    std::slice::from_raw_parts(
                        &value as *const C::Value as *const u8,
                        std::mem::size_of::<C::Value>(),
                    )
                };
                image.set_constant(cid, bytes).map_err(|code| Error::LaunchFailure {
                    kernel: C::NAME.to_string(),
                    backend: gpu,
                    code,
                    message: format!("set_constant failed with backend error {code}"),
                })
            }
        }
    }

    /// Returns every recorded elapsed-time sample for kernel `K`, in launch
    /// order. Empty if timing wasn't enabled at `initialize` or `K` has never
    /// run.
    pub fn get_timing<K: KernelTag>(&self) -> Vec<f32> {
        let state = self.state.lock().unwrap();
        state
            .profiling
            .get(&kernel_id::<K>())
            .cloned()
            .unwrap_or_default()
    }
}
