//! Kernel and constant dispatch traits, and the stable dense id assignment used
//! to index the runtime's per-kernel timing table.
//!
//! A kernel (or constant symbol) is a zero-sized type that names one entry
//! point in one [`ImageFamily`]. Dispatch to it is resolved at compile time on
//! the CPU path (`run_cpu` is a concrete, monomorphised call) and at the
//! `kernel_id`/name boundary on the GPU path, where the actual kernel body
//! lives in a shared object loaded at runtime and cannot be named by the Rust
//! type system.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use xpu_core::{BackendKind, Grid};

use crate::error::{Error, Result};

/// A family of kernels and constants compiled together into one image per
/// backend (one `.so`/`.dll` per non-CPU backend, one in-process struct on
/// CPU).
pub trait ImageFamily: 'static {
    /// The struct holding this family's state when running on the CPU backend.
    /// Constructed once, lazily, the first time any of its kernels or
    /// constants is referenced.
    type CpuImage: Default + Send + Sync + 'static;

    /// The file name stem used to derive this family's per-backend shared
    /// object name, e.g. `"vector_ops"` for `libvector_ops_cuda.so`.
    fn file_name() -> &'static str;
}

/// One kernel entry point within an [`ImageFamily`].
pub trait KernelTag: 'static {
    type Family: ImageFamily;
    /// The argument bundle passed to one launch of this kernel.
    type Args;

    /// Name used in diagnostics and to look the kernel up inside a GPU image.
    const NAME: &'static str;

    /// Runs this kernel against the CPU image. Implementors iterate the grid
    /// themselves (the CPU backend has no hardware scheduler to do it for
    /// them).
    fn run_cpu(
        image: &<Self::Family as ImageFamily>::CpuImage,
        timing: Option<&mut f32>,
        grid: Grid,
        args: Self::Args,
    ) -> Result<()>;

    /// Runs this kernel against a loaded GPU image. The default forwards to
    /// [`GpuImage::run_kernel`] by id and name; backends needing to marshal
    /// `args` into device memory override this instead.
    fn run_gpu(
        image: &dyn GpuImage,
        kernel_id: u32,
        timing: Option<&mut f32>,
        grid: Grid,
        args: Self::Args,
    ) -> Result<()> {
        let _ = args;
        image
            .run_kernel(kernel_id, Self::NAME, timing, grid)
            .map_err(|code| Error::LaunchFailure {
                kernel: Self::NAME.to_string(),
                backend: image.backend(),
                code,
                message: format!("backend reported error {code}"),
            })
    }
}

/// A type-erased handle to one family's image on a non-CPU backend, obtained
/// by `dlopen`ing its shared object.
///
/// Object-safe by design: once a backend is loaded at runtime, Rust's type
/// system no longer knows the concrete kernel bodies compiled into it, so
/// dispatch crosses this trait object by numeric id and string name instead
/// of by generic instantiation.
pub trait GpuImage: Send + Sync {
    /// The backend this image was compiled for.
    fn backend(&self) -> BackendKind;

    /// Launches the kernel identified by `kernel_id`/`kernel_name` with the
    /// given grid shape. `timing`, if present, receives elapsed milliseconds.
    fn run_kernel(
        &self,
        kernel_id: u32,
        kernel_name: &str,
        timing: Option<&mut f32>,
        grid: Grid,
    ) -> std::result::Result<(), i32>;

    /// Uploads the raw bytes of one constant symbol's value.
    fn set_constant(&self, const_id: u32, bytes: &[u8]) -> std::result::Result<(), i32>;
}

/// A constant-memory symbol within an [`ImageFamily`].
pub trait ConstantSymbol: 'static {
    type Family: ImageFamily;
    /// Must be `Copy` so the runtime can read its value's bytes directly when
    /// uploading to a GPU image.
    type Value: Copy + 'static;

    const NAME: &'static str;

    /// Stores `value` into the CPU image's corresponding field.
    fn store_cpu(image: &<Self::Family as ImageFamily>::CpuImage, value: Self::Value);
}

struct DenseIds {
    next_by_scope: HashMap<TypeId, u32>,
    ids: HashMap<TypeId, u32>,
}

impl DenseIds {
    fn new() -> DenseIds {
        DenseIds {
            next_by_scope: HashMap::new(),
            ids: HashMap::new(),
        }
    }

    fn id_of(&mut self, scope: TypeId, item: TypeId) -> u32 {
        if let Some(&id) = self.ids.get(&item) {
            return id;
        }
        let next = self.next_by_scope.entry(scope).or_insert(0);
        let id = *next;
        *next += 1;
        self.ids.insert(item, id);
        id
    }
}

static KERNEL_IDS: OnceLock<Mutex<DenseIds>> = OnceLock::new();
static CONSTANT_IDS: OnceLock<Mutex<DenseIds>> = OnceLock::new();

/// A stable, dense (per image family) id for kernel tag `K`, assigned the
/// first time it's referenced. Used to index the runtime's timing table and
/// to address a GPU image's kernel table.
pub fn kernel_id<K: KernelTag>() -> u32 {
    let registry = KERNEL_IDS.get_or_init(|| Mutex::new(DenseIds::new()));
    registry
        .lock()
        .unwrap()
        .id_of(TypeId::of::<K::Family>(), TypeId::of::<K>())
}

/// A stable, dense (per image family) id for constant symbol `C`.
pub fn constant_id<C: ConstantSymbol>() -> u32 {
    let registry = CONSTANT_IDS.get_or_init(|| Mutex::new(DenseIds::new()));
    registry
        .lock()
        .unwrap()
        .id_of(TypeId::of::<C::Family>(), TypeId::of::<C>())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FamilyA;
    struct FamilyB;
    impl ImageFamily for FamilyA {
        type CpuImage = ();
        fn file_name() -> &'static str {
            "family_a"
        }
    }
    impl ImageFamily for FamilyB {
        type CpuImage = ();
        fn file_name() -> &'static str {
            "family_b"
        }
    }

    struct KernelA1;
    struct KernelA2;
    struct KernelB1;
    impl KernelTag for KernelA1 {
        type Family = FamilyA;
        type Args = ();
        const NAME: &'static str = "a1";
        fn run_cpu(_: &(), _: Option<&mut f32>, _: Grid, _: ()) -> Result<()> {
            Ok(())
        }
    }
    impl KernelTag for KernelA2 {
        type Family = FamilyA;
        type Args = ();
        const NAME: &'static str = "a2";
        fn run_cpu(_: &(), _: Option<&mut f32>, _: Grid, _: ()) -> Result<()> {
            Ok(())
        }
    }
    impl KernelTag for KernelB1 {
        type Family = FamilyB;
        type Args = ();
        const NAME: &'static str = "b1";
        fn run_cpu(_: &(), _: Option<&mut f32>, _: Grid, _: ()) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn ids_are_dense_per_family_and_stable() {
        assert_eq!(kernel_id::<KernelA1>(), 0);
        assert_eq!(kernel_id::<KernelA2>(), 1);
        assert_eq!(kernel_id::<KernelB1>(), 0);
        assert_eq!(kernel_id::<KernelA1>(), 0);
        assert_eq!(kernel_id::<KernelA2>(), 1);
    }
}
