//! The compute session as a typestate.
//!
//! ```text
//! Session::locate ──► Session<D, Located> ──compile──► Session<D, Compiled<D>>
//!                                                        │  dispatch_vector_add (any number)
//!                     drop / teardown ◄──────────────────┘
//! ```
//!
//! Failed transitions consume the session, which releases whatever it held.
//! On drop the kernel goes first, then the program, the queue and the context.

use crate::compiler::{self, KernelEntry};
use crate::dispatch::{self, IndexSpace};
use crate::driver::ComputeDriver;
use crate::error::Result;
use crate::locator::{self, DeviceHandle, SessionContext};

use std::{cell::Cell, path::Path};
use tracing::{debug, info};

// ─── state markers ───────────────────────────────────────────────────
mod sealed {
    pub trait Sealed {}
}

pub trait State: sealed::Sealed {}

/// Device, context and queue exist; nothing compiled yet.
pub struct Located;
impl sealed::Sealed for Located {}
impl State for Located {}

/// A kernel entry is resolved and ready to dispatch.
pub struct Compiled<D: ComputeDriver> {
    entry: KernelEntry<D>,
    dispatches: Cell<u64>,
}
impl<D: ComputeDriver> sealed::Sealed for Compiled<D> {}
impl<D: ComputeDriver> State for Compiled<D> {}

/// Field order is release order: state (kernel, program) before the context.
pub struct Session<D: ComputeDriver, S: State = Located> {
    state: S,
    context: SessionContext<D>,
    driver: D,
}

impl<D: ComputeDriver> Session<D, Located> {
    pub fn locate(driver: D) -> Result<Self> {
        let context = locator::locate(&driver)?;
        Ok(Session { state: Located, context, driver })
    }

    pub fn compile(self, source_path: impl AsRef<Path>, entry_name: &str) -> Result<Session<D, Compiled<D>>> {
        let Session { state: Located, context, driver } = self;
        let entry = compiler::compile(&driver, &context, source_path.as_ref(), entry_name)?;
        Ok(Session {
            state: Compiled { entry, dispatches: Cell::new(0) },
            context,
            driver,
        })
    }
}

impl<D: ComputeDriver> Session<D, Compiled<D>> {
    pub fn entry(&self) -> &KernelEntry<D> {
        &self.state.entry
    }

    pub fn dispatches(&self) -> u64 {
        self.state.dispatches.get()
    }

    /// Fills `out` with `a + b`; see [`dispatch::dispatch_vector_add`].
    pub fn dispatch_vector_add(&self, a: &[f32], b: &[f32], out: &mut [f32]) -> Result<IndexSpace> {
        let space = dispatch::dispatch_vector_add(&self.driver, &self.context, &self.state.entry, a, b, out)?;
        self.state.dispatches.set(self.state.dispatches.get() + 1);
        Ok(space)
    }

    pub fn vector_add(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>> {
        let mut out = vec![0.0; a.len()];
        self.dispatch_vector_add(a, b, &mut out)?;
        Ok(out)
    }
}

impl<D: ComputeDriver, S: State> Session<D, S> {
    pub fn device(&self) -> &DeviceHandle<D::Device> {
        self.context.device()
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Releases everything the session holds. Same as dropping it, plus a log line.
    pub fn teardown(self) {
        info!(device = %self.context.device().name(), "tearing down session");
        drop(self);
        debug!("session torn down");
    }
}
