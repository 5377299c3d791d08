//! Integration tests exercising the runtime singleton end to end. Kept in one
//! test function: `xpu::initialize` may only succeed once per process, and
//! the default test harness runs functions in the same binary concurrently.

use xpu::{BackendKind, Grid, InitOptions};

struct Family;
#[derive(Default)]
struct Image;
impl xpu::ImageFamily for Family {
    type CpuImage = Image;
    fn file_name() -> &'static str {
        "runtime_test_family"
    }
}

struct Noop;
impl xpu::KernelTag for Noop {
    type Family = Family;
    type Args = ();
    const NAME: &'static str = "noop";

    fn run_cpu(_image: &Image, timing: Option<&mut f32>, _grid: Grid, _args: ()) -> xpu::Result<()> {
        if let Some(elapsed) = timing {
            *elapsed = 1.5;
        }
        Ok(())
    }
}

#[test]
fn initialize_reselect_and_timing() {
    xpu::initialize(BackendKind::Cpu, InitOptions { measure_time: true })
        .expect("first initialize call must succeed");

    let second = xpu::initialize(BackendKind::Cpu, InitOptions::default());
    assert!(
        matches!(second, Err(xpu::Error::AlreadyInitialised)),
        "a second initialize() call must be rejected, not silently swap the active backend"
    );
    assert_eq!(xpu::active_driver(), BackendKind::Cpu);

    assert!(xpu::get_timing::<Noop>().is_empty());
    xpu::run_kernel::<Noop>(Grid::n_threads(1i64), ()).expect("run Noop kernel");
    xpu::run_kernel::<Noop>(Grid::n_threads(1i64), ()).expect("run Noop kernel again");

    let timing = xpu::get_timing::<Noop>();
    assert_eq!(timing, vec![1.5, 1.5]);

    assert_eq!(xpu::num_devices(), 1);
    let record = xpu::set_device(0).expect("select device 0");
    assert_eq!(record.backend, BackendKind::Cpu);
    assert_eq!(record.index, 0);
    assert_eq!(xpu::get_device(), record);
    let props = xpu::get_properties(0).expect("query device properties");
    assert_eq!(props.name, "CPU");
    let (free, total) = xpu::meminfo().expect("query meminfo");
    assert!(free <= total);
}
