//! Small closed enumerations and value types shared by every backend.

use std::fmt;

/// The set of execution backends this runtime can dispatch to.
///
/// Established once at `initialize` and never changed for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Cpu,
    Cuda,
    Hip,
    Sycl,
}

impl BackendKind {
    /// Short lowercase name used to derive shared-object file names and log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Cpu => "cpu",
            BackendKind::Cuda => "cuda",
            BackendKind::Hip => "hip",
            BackendKind::Sycl => "sycl",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The memory-residency category of a pointer, as reported by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Host,
    Device,
    Shared,
    Unknown,
}

/// Which side of the host/device boundary an allocation should live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Host,
    Device,
}

/// The direction of an explicit `HdBuffer` copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HostToDevice,
    DeviceToHost,
}

/// An integer triple used for thread/block counts and indices.
///
/// `y` and `z` default to zero; `x` is required. Signed so that the
/// "unspecified" sentinel (`-1`) used by [`Grid`] is representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dim {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl Dim {
    pub const fn new(x: i64) -> Dim {
        Dim { x, y: 0, z: 0 }
    }

    pub const fn new2(x: i64, y: i64) -> Dim {
        Dim { x, y, z: 0 }
    }

    pub const fn new3(x: i64, y: i64, z: i64) -> Dim {
        Dim { x, y, z }
    }

    const UNSPECIFIED: Dim = Dim { x: -1, y: 0, z: 0 };
}

impl From<i64> for Dim {
    fn from(x: i64) -> Dim {
        Dim::new(x)
    }
}

/// A launch shape: either "by threads" or "by blocks", never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub blocks: Dim,
    pub threads: Dim,
}

impl Grid {
    /// Build a grid specifying a total thread count; the backend chooses the block count.
    pub fn n_threads<D: Into<Dim>>(threads: D) -> Grid {
        Grid {
            blocks: Dim::UNSPECIFIED,
            threads: threads.into(),
        }
    }

    /// Build a grid specifying an explicit block count; the backend uses its default
    /// block size.
    pub fn n_blocks<D: Into<Dim>>(blocks: D) -> Grid {
        Grid {
            blocks: blocks.into(),
            threads: Dim::UNSPECIFIED,
        }
    }

    /// Validate the threads-xor-blocks invariant, returning the resolved block count
    /// for a given `default_block_size`.
    pub fn resolve(&self, default_block_size: u32) -> crate::error::Result<ResolvedGrid> {
        if self.threads.x < -1 || self.blocks.x < -1 {
            return Err(crate::error::Error::InvalidArgument(format!(
                "dimensions may not be below the unspecified sentinel (threads.x={}, blocks.x={})",
                self.threads.x, self.blocks.x
            )));
        }

        let by_threads = self.threads.x >= 0;
        let by_blocks = self.blocks.x >= 0;

        if by_threads == by_blocks {
            return Err(crate::error::Error::InvalidArgument(format!(
                "grid must specify exactly one of threads or blocks (threads.x={}, blocks.x={})",
                self.threads.x, self.blocks.x
            )));
        }

        let block_size = default_block_size as i64;
        if by_threads {
            if self.threads.x == 0 {
                return Ok(ResolvedGrid {
                    n_blocks: 0,
                    block_size: default_block_size,
                });
            }
            let n_blocks = (self.threads.x + block_size - 1) / block_size;
            Ok(ResolvedGrid {
                n_blocks: n_blocks as u64,
                block_size: default_block_size,
            })
        } else {
            Ok(ResolvedGrid {
                n_blocks: self.blocks.x.max(0) as u64,
                block_size: default_block_size,
            })
        }
    }
}

/// The outcome of resolving a [`Grid`] against a backend's default block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedGrid {
    pub n_blocks: u64,
    pub block_size: u32,
}

impl ResolvedGrid {
    pub fn n_logical_threads(&self) -> u64 {
        self.n_blocks * self.block_size as u64
    }
}

/// `(global_id, backend, index)` — a device observed by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRecord {
    pub global_id: u64,
    pub backend: BackendKind,
    pub index: usize,
}

/// Static properties of a device, as reported by `DriverInterface::get_properties`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProperties {
    pub name: String,
    pub arch: String,
    pub warp_or_subgroup_size: u32,
    pub shared_mem_bytes: usize,
    pub const_mem_bytes: usize,
    pub max_threads_per_block: u32,
    pub max_grid: Dim,
    pub mem_free_bytes: usize,
    pub mem_total_bytes: usize,
}

/// The record passed to each kernel body describing its position in the launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelInfo {
    pub i_thread: Dim,
    pub n_threads: Dim,
    pub i_block: Dim,
    pub n_blocks: Dim,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_threads_rounds_up_to_whole_blocks() {
        let resolved = Grid::n_threads(100i64).resolve(64).unwrap();
        assert_eq!(resolved.n_blocks, 2);
        assert_eq!(resolved.block_size, 64);
        assert_eq!(resolved.n_logical_threads(), 128);
    }

    #[test]
    fn by_threads_zero_resolves_to_zero_blocks() {
        let resolved = Grid::n_threads(0i64).resolve(64).unwrap();
        assert_eq!(resolved.n_blocks, 0);
    }

    #[test]
    fn by_blocks_uses_block_count_directly() {
        let resolved = Grid::n_blocks(3i64).resolve(64).unwrap();
        assert_eq!(resolved.n_blocks, 3);
        assert_eq!(resolved.n_logical_threads(), 192);
    }

    #[test]
    fn specifying_both_threads_and_blocks_is_invalid() {
        let grid = Grid {
            blocks: Dim::new(4),
            threads: Dim::new(100),
        };
        assert!(grid.resolve(64).is_err());
    }

    #[test]
    fn specifying_neither_threads_nor_blocks_is_invalid() {
        let grid = Grid {
            blocks: Dim::UNSPECIFIED,
            threads: Dim::UNSPECIFIED,
        };
        assert!(grid.resolve(64).is_err());
    }

    #[test]
    fn dimensions_below_the_sentinel_are_invalid() {
        let grid = Grid {
            blocks: Dim::new(-2),
            threads: Dim::UNSPECIFIED,
        };
        assert!(grid.resolve(64).is_err());
    }
}
