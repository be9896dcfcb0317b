//! Public API driven through the `mock` feature's driver.

use cl_bridge::mock::{FailPoint, MockDriver, Resource};
use cl_bridge::{run_with, BridgeError, DispatchStep, Session};
use std::io::Write;

const DEMO: &str = include_str!("../src/kernels/demo.cl");

fn demo_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(DEMO.as_bytes()).unwrap();
    file
}

#[test]
fn many_dispatches_one_compile() {
    let driver = MockDriver::new();
    let file = demo_file();
    let session = Session::locate(driver.clone()).unwrap().compile(file.path(), "vector_add").unwrap();

    for n in [1usize, 63, 64, 65, 1000] {
        let a: Vec<f32> = (0..n).map(|i| i as f32).collect();
        let c = session.vector_add(&a, &a).unwrap();
        assert!(c.iter().enumerate().all(|(i, &x)| x == 2.0 * i as f32));
    }
    assert_eq!(session.dispatches(), 5);
    assert!(driver.launches().iter().all(|s| s.global % 64 == 0));
    assert_eq!(driver.out_of_range(), 0);
    assert_eq!(driver.live(Resource::Buffer), 0);
}

#[test]
fn read_failure_surfaces_step() {
    let file = demo_file();
    let driver = MockDriver::new().failing_at(FailPoint::Read);
    let err = run_with(driver.clone(), file.path(), "vector_add", &[1.0; 3], &[1.0; 3]).unwrap_err();
    assert!(matches!(err, BridgeError::DispatchFailed { step: DispatchStep::ReadOut, .. }));
    assert_eq!(driver.live_total(), 0);
}

#[test]
fn build_failure_log_reaches_the_caller() {
    let file = demo_file();
    let driver = MockDriver::new().failing_build("error: undefined symbol 'vadd_helper'");
    let err = run_with(driver, file.path(), "vector_add", &[1.0], &[1.0]).unwrap_err();
    assert!(err.build_log().unwrap().contains("vadd_helper"));
}
