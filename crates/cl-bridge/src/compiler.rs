//! Source loading, program build and kernel entry lookup.

use crate::config::BUILD_OPTIONS;
use crate::driver::{ComputeDriver, Scoped};
use crate::error::{BridgeError, Result};
use crate::locator::SessionContext;

use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, error, warn};

/// A program built for the session's device, with its build log.
pub struct CompiledProgram<D: ComputeDriver> {
    _program: Scoped<D::Program>,
    log: String,
    source_path: PathBuf,
}

impl<D: ComputeDriver> CompiledProgram<D> {
    pub fn build_log(&self) -> &str {
        &self.log
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }
}

/// A resolved entry point. The kernel is released before its program.
pub struct KernelEntry<D: ComputeDriver> {
    kernel: Scoped<D::Kernel>,
    program: CompiledProgram<D>,
    name: String,
}

impl<D: ComputeDriver> KernelEntry<D> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &CompiledProgram<D> {
        &self.program
    }

    pub(crate) fn kernel(&self) -> &D::Kernel {
        self.kernel.get()
    }
}

impl<D: ComputeDriver> Drop for KernelEntry<D> {
    fn drop(&mut self) {
        debug!(entry = %self.name, "releasing kernel and program");
    }
}

/// Reads the whole file. A missing, unreadable or empty file is an error.
pub fn read_source(path: &Path) -> Result<String> {
    let unavailable = |source| BridgeError::SourceUnavailable { path: path.to_owned(), source };

    let text = fs::read_to_string(path).map_err(unavailable)?;
    if text.is_empty() {
        return Err(unavailable(io::Error::new(io::ErrorKind::InvalidData, "kernel source is empty")));
    }
    Ok(text)
}

/// Builds `source_path` for the session's device and resolves `entry_name`.
///
/// The build log is fetched whether or not the build succeeded; on failure it
/// goes to the error log and into [`BridgeError::BuildFailed`].
pub fn compile<D: ComputeDriver>(
    driver: &D,
    session: &SessionContext<D>,
    source_path: &Path,
    entry_name: &str,
) -> Result<KernelEntry<D>> {
    let source = read_source(source_path)?;
    let device = session.device().id();

    let mut program = driver
        .create_program(session.context(), &source)
        .map_err(|status| BridgeError::ProgramFailed { status })?;
    let built = driver.build_program(&mut program, device, BUILD_OPTIONS);
    let program = Scoped::new("program", program);

    let log = driver.build_log(program.get(), device).unwrap_or_else(|status| {
        warn!(%status, "build log unavailable");
        String::new()
    });

    if let Err(status) = built {
        error!(path = %source_path.display(), %status, "build log: {log}");
        return Err(BridgeError::BuildFailed { status, log });
    }
    if !log.trim().is_empty() {
        debug!(path = %source_path.display(), "build log: {log}");
    }

    let kernel = driver
        .create_kernel(program.get(), entry_name)
        .map_err(|status| BridgeError::EntryNotFound { name: entry_name.to_owned(), status })?;
    debug!(entry = entry_name, "kernel entry resolved");

    Ok(KernelEntry {
        kernel: Scoped::new("kernel", kernel),
        program: CompiledProgram { _program: program, log, source_path: source_path.to_owned() },
        name: entry_name.to_owned(),
    })
}
