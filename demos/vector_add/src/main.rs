//! End-to-end vector-add demo: allocates three device arrays of 100 `f32`,
//! fills two of them, runs `Add`, and checks the result.

use xpu::{BackendKind, Grid, HdBuffer, InitOptions};
use xpu_demo_kernels::Add;

const LEN: usize = 100;

fn main() {
    tracing_subscriber::fmt::init();

    xpu::initialize(BackendKind::Cpu, InitOptions::default()).expect("runtime initialize");

    let mut a = HdBuffer::<f32>::new(LEN).expect("allocate a");
    let mut b = HdBuffer::<f32>::new(LEN).expect("allocate b");
    let mut out = HdBuffer::<f32>::new(LEN).expect("allocate out");

    a.host_slice_mut().fill(8.0);
    b.host_slice_mut().fill(8.0);
    a.sync(xpu_core::Direction::HostToDevice).expect("sync a");
    b.sync(xpu_core::Direction::HostToDevice).expect("sync b");

    xpu::run_kernel::<Add>(
        Grid::n_threads(LEN as i64),
        (a.device_ptr(), b.device_ptr(), out.device_ptr(), LEN),
    )
    .expect("run Add kernel");

    out.sync(xpu_core::Direction::DeviceToHost).expect("sync out");

    for (i, value) in out.host_slice().iter().enumerate() {
        assert_eq!(*value, 16.0, "element {i} did not equal 16.0");
    }

    println!("vector_add: all {LEN} elements equal 16.0");
}
