//! Fixed tunables of the bridge. Nothing here is read from the environment.

use crate::driver::DeviceClass;

/// Work-group size of every launch. Divides evenly on common devices.
pub const LOCAL_SIZE: usize = 64;

/// Capacity of the device-name buffer, terminator included.
pub const DEVICE_NAME_CAPACITY: usize = 128;

/// Compiler options passed to every program build.
pub const BUILD_OPTIONS: &str = "";

/// Device classes tried in order on the first platform.
pub const DEVICE_PREFERENCE: [DeviceClass; 2] = [DeviceClass::Gpu, DeviceClass::Cpu];

/// Relative to the working directory, like the demo's own invocation.
pub const DEFAULT_KERNEL_PATH: &str = "src/kernels/demo.cl";
pub const DEFAULT_ENTRY: &str = "vector_add";
pub const DEFAULT_LEN: usize = 1024;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn default_kernel_path_is_relative_and_present() {
        let path = Path::new(DEFAULT_KERNEL_PATH);
        assert!(path.is_relative());
        assert!(Path::new(env!("CARGO_MANIFEST_DIR")).join(path).is_file());
    }
}
