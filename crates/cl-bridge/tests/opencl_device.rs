//! The end-to-end scenarios against a real OpenCL device.
//!
//! Run with `cargo test -- --ignored` on a machine with an OpenCL driver.

use cl_bridge::config::{DEFAULT_ENTRY, DEFAULT_KERNEL_PATH};
use cl_bridge::{run, BridgeError, IndexSpace, OpenCl, Session};
use std::io::Write;

fn source_file(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
#[ignore = "requires OpenCL runtime - run with --ignored on GPU machine"]
fn ones_plus_twos() {
    let c = run(DEFAULT_KERNEL_PATH, DEFAULT_ENTRY, &[1.0; 1024], &[2.0; 1024]).unwrap();
    assert_eq!(c.len(), 1024);
    assert!(c.iter().all(|&x| (x - 3.0).abs() < 1e-6));
}

#[test]
#[ignore = "requires OpenCL runtime - run with --ignored on GPU machine"]
fn single_element_and_ragged_tail() {
    let session = Session::locate(OpenCl).unwrap().compile(DEFAULT_KERNEL_PATH, DEFAULT_ENTRY).unwrap();

    let mut one = [0.0_f32];
    let space = session.dispatch_vector_add(&[1.5], &[-0.5], &mut one).unwrap();
    assert_eq!(one, [1.0]);
    assert_eq!(space, IndexSpace { global: 64, local: 64 });

    let a: Vec<f32> = (0..65).map(|i| i as f32).collect();
    let c = session.vector_add(&a, &[1.0; 65]).unwrap();
    for (i, x) in c.iter().enumerate() {
        assert_eq!(*x, i as f32 + 1.0);
    }
    assert_eq!(session.dispatches(), 2);
}

#[test]
#[ignore = "requires OpenCL runtime - run with --ignored on GPU machine"]
fn missing_source() {
    let err = run("/nonexistent/demo.cl", DEFAULT_ENTRY, &[1.0], &[1.0]).unwrap_err();
    assert!(matches!(err, BridgeError::SourceUnavailable { .. }), "{err}");
}

#[test]
#[ignore = "requires OpenCL runtime - run with --ignored on GPU machine"]
fn undefined_symbol_fails_the_build_with_a_log() {
    let file = source_file(
        "__kernel void vector_add(__global const float* a, __global const float* b,\n\
         __global float* out, const int n)\n\
         { int i = get_global_id(0); if (i < n) out[i] = a[i] + undefined_symbol[i]; }\n",
    );
    let err = run(file.path(), DEFAULT_ENTRY, &[1.0], &[1.0]).unwrap_err();
    let log = err.build_log().expect("build failure");
    assert!(log.contains("undefined_symbol"), "log: {log}");
}

#[test]
#[ignore = "requires OpenCL runtime - run with --ignored on GPU machine"]
fn entry_not_in_source() {
    let err = run(DEFAULT_KERNEL_PATH, "vector_mul", &[1.0], &[1.0]).unwrap_err();
    assert!(matches!(err, BridgeError::EntryNotFound { .. }), "{err}");
}

#[test]
#[ignore = "loads the system OpenCL ICD loader"]
fn locate_is_graceful_without_hardware() {
    match Session::locate(OpenCl) {
        Ok(session) => session.teardown(),
        Err(e) => assert!(
            matches!(e, BridgeError::NoPlatform { .. } | BridgeError::NoDevice { .. }),
            "unexpected error: {e}"
        ),
    }
}
