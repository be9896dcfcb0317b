//! Host-side bridge to an OpenCL compute device.
//!
//! A [`Session`] locates one device, compiles one kernel entry from source
//! and dispatches element-wise vector additions over a 1-D index space on a
//! single in-order queue. Every driver object is released on every path.
//!
//! ```no_run
//! let c = cl_bridge::run("src/kernels/demo.cl", "vector_add", &[1.0; 4], &[2.0; 4])?;
//! assert_eq!(c, [3.0; 4]);
//! # Ok::<(), cl_bridge::BridgeError>(())
//! ```

// ─── feature modules ──────────────────────────────────────────────────
#[cfg(feature = "metrics")]
pub mod metrics;
#[cfg(feature = "metrics")]
pub use metrics::summary;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// ─── core ─────────────────────────────────────────────────────────────
pub mod buffer;
pub mod compiler;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod locator;
pub mod opencl;
pub mod session;

pub use buffer::{DeviceBuffer, ReadOnly, ReadWrite, WriteOnly};
pub use compiler::{CompiledProgram, KernelEntry};
pub use dispatch::IndexSpace;
pub use driver::{Access, ComputeDriver, DeviceClass};
pub use error::{BridgeError, DispatchStep, Result, Status};
pub use locator::{DeviceHandle, SessionContext};
pub use opencl::OpenCl;
pub use session::{Compiled, Located, Session, State};

use std::path::Path;

/// Locate, compile `entry_name` from `kernel_path`, add `a` and `b` on the
/// device, tear down. Uses the system OpenCL driver.
pub fn run(kernel_path: impl AsRef<Path>, entry_name: &str, a: &[f32], b: &[f32]) -> Result<Vec<f32>> {
    run_with(OpenCl, kernel_path, entry_name, a, b)
}

/// [`run`] over any driver.
pub fn run_with<D: ComputeDriver>(
    driver: D,
    kernel_path: impl AsRef<Path>,
    entry_name: &str,
    a: &[f32],
    b: &[f32],
) -> Result<Vec<f32>> {
    let session = Session::locate(driver)?.compile(kernel_path, entry_name)?;
    session.vector_add(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDriver, Resource};
    use std::io::Write;

    #[test]
    fn run_with_mock_driver() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(include_str!("kernels/demo.cl").as_bytes()).unwrap();
        let driver = MockDriver::new();

        let c = run_with(driver.clone(), file.path(), "vector_add", &[1.0; 1024], &[2.0; 1024]).unwrap();
        assert_eq!(c.len(), 1024);
        assert_eq!(&c[..5], &[3.0; 5]);
        assert_eq!(driver.live_total(), 0);
    }

    #[test]
    fn run_with_reports_missing_entry_and_releases() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(include_str!("kernels/demo.cl").as_bytes()).unwrap();
        let driver = MockDriver::new();

        let err = run_with(driver.clone(), file.path(), "nope", &[1.0], &[1.0]).unwrap_err();
        assert!(matches!(err, BridgeError::EntryNotFound { .. }));
        assert_eq!(driver.live(Resource::Context), 0);
    }

    #[test]
    fn run_with_no_platform() {
        let driver = MockDriver::new().failing_platform_query(Status::PLATFORM_NOT_FOUND_KHR);
        let err = run_with(driver, "unused.cl", "vector_add", &[1.0], &[1.0]).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::NoPlatform { status: Some(Status::PLATFORM_NOT_FOUND_KHR) }
        ));
    }
}
