//! `VectorOps`: the reference kernel family exercised by the `xpu` test suite
//! and the `vector_add` demo. Three kernels, one constant, one image family.

use std::sync::Mutex;

use xpu::{ConstantSymbol, Grid, ImageFamily, KernelTag, Result};

/// The image family every kernel and constant in this crate belongs to.
pub struct VectorOps;

pub struct VectorOpsImage {
    scale: Mutex<f32>,
}

impl ImageFamily for VectorOps {
    type CpuImage = VectorOpsImage;

    fn file_name() -> &'static str {
        "vector_ops"
    }
}

/// `out[i] = a[i] + b[i]` for `i` in `0..len`.
pub struct Add;

impl KernelTag for Add {
    type Family = VectorOps;
    type Args = (*const f32, *const f32, *mut f32, usize);
    const NAME: &'static str = "add";

    fn run_cpu(
        _image: &VectorOpsImage,
        _timing: Option<&mut f32>,
        grid: Grid,
        args: Self::Args,
    ) -> Result<()> {
        let resolved = grid.resolve(64)?;
        let (a, b, out, len) = args;
        let n = (resolved.n_logical_threads() as usize).min(len);
        for i in 0..n {
            unsafe {
                *out.add(i) = *a.add(i) + *b.add(i);
            }
        }
        Ok(())
    }
}

/// The scalar multiplier used by [`ScaleKernel`], uploaded via [`Scale`].
pub struct Scale;

impl ConstantSymbol for Scale {
    type Family = VectorOps;
    type Value = f32;
    const NAME: &'static str = "scale";

    fn store_cpu(image: &VectorOpsImage, value: f32) {
        *image.scale.lock().unwrap() = value;
    }
}

/// `out[i] = scale * a[i]` for `i` in `0..len`, where `scale` is whatever was
/// last uploaded through [`Scale`] (`1.0` if never set).
pub struct ScaleKernel;

impl KernelTag for ScaleKernel {
    type Family = VectorOps;
    type Args = (*const f32, *mut f32, usize);
    const NAME: &'static str = "scale";

    fn run_cpu(
        image: &VectorOpsImage,
        _timing: Option<&mut f32>,
        grid: Grid,
        args: Self::Args,
    ) -> Result<()> {
        let resolved = grid.resolve(64)?;
        let (a, out, len) = args;
        let n = (resolved.n_logical_threads() as usize).min(len);
        let scale = *image.scale.lock().unwrap();
        for i in 0..n {
            unsafe {
                *out.add(i) = scale * *a.add(i);
            }
        }
        Ok(())
    }
}

impl Default for VectorOpsImage {
    fn default() -> VectorOpsImage {
        VectorOpsImage {
            scale: Mutex::new(1.0),
        }
    }
}

/// Increments `counts[i]` once for every logical thread whose index falls
/// within `len`. A `Grid::n_threads(len)` launch rounds `len` up to a whole
/// number of blocks, so the logical thread count can exceed `len`; this
/// kernel exists to exercise that the tail threads are discarded rather than
/// written past the end of `counts`.
pub struct TailGuardCount;

impl KernelTag for TailGuardCount {
    type Family = VectorOps;
    type Args = (*mut u32, usize);
    const NAME: &'static str = "tail_guard_count";

    fn run_cpu(
        _image: &VectorOpsImage,
        _timing: Option<&mut f32>,
        grid: Grid,
        args: Self::Args,
    ) -> Result<()> {
        let resolved = grid.resolve(64)?;
        let (counts, len) = args;
        let n = (resolved.n_logical_threads() as usize).min(len);
        for i in 0..n {
            unsafe {
                *counts.add(i) += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_sums_elementwise() {
        let a = [1.0f32, 2.0, 3.0, 4.0, 5.0];
        let b = [10.0f32, 20.0, 30.0, 40.0, 50.0];
        let mut out = [0.0f32; 5];
        xpu::run_kernel::<Add>(
            Grid::n_threads(5i64),
            (a.as_ptr(), b.as_ptr(), out.as_mut_ptr(), 5),
        )
        .unwrap();
        assert_eq!(out, [11.0, 22.0, 33.0, 44.0, 55.0]);
    }

    #[test]
    fn scale_constant_round_trips_into_the_kernel() {
        xpu::set_constant::<Scale>(3.0).unwrap();
        let a = [1.0f32, 2.0, 3.0];
        let mut out = [0.0f32; 3];
        xpu::run_kernel::<ScaleKernel>(Grid::n_threads(3i64), (a.as_ptr(), out.as_mut_ptr(), 3))
            .unwrap();
        assert_eq!(out, [3.0, 6.0, 9.0]);
    }

    #[test]
    fn tail_guard_count_never_touches_past_len() {
        // 5 threads over a default block size of 64 rounds up to one full
        // block (64 logical threads); only the first 5 entries of `counts`
        // exist, so a missing guard would be instant undefined behaviour.
        let mut counts = [0u32; 5];
        xpu::run_kernel::<TailGuardCount>(Grid::n_threads(5i64), (counts.as_mut_ptr(), 5))
            .unwrap();
        assert_eq!(counts, [1, 1, 1, 1, 1]);
    }
}
