//! Buffer transfer and 1-D launch of the vector-add entry.

use crate::buffer::{DeviceBuffer, ReadOnly, WriteOnly};
use crate::compiler::KernelEntry;
use crate::config::LOCAL_SIZE;
use crate::driver::ComputeDriver;
use crate::error::{BridgeError, DispatchStep, Result};
use crate::locator::SessionContext;

use tracing::debug;

#[cfg(feature = "metrics")]
use crate::metrics::record;
#[cfg(feature = "metrics")]
use std::time::Instant;

/// A 1-D launch. `global` is always a multiple of `local`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexSpace {
    pub global: usize,
    pub local: usize,
}

impl IndexSpace {
    /// Smallest launch of `local`-sized groups covering `n` work-items.
    ///
    /// # Panics
    /// If `local` is zero.
    pub fn covering(n: usize, local: usize) -> Self {
        assert!(local > 0, "work-group size must be non-zero");
        Self { global: n.div_ceil(local) * local, local }
    }

    pub fn groups(&self) -> usize {
        self.global / self.local
    }
}

fn check_lengths(a: &[f32], b: &[f32], out: &[f32]) -> Result<i32> {
    let n = a.len();
    if b.len() != n || out.len() != n {
        return Err(BridgeError::LengthMismatch { a: n, b: b.len(), out: out.len() });
    }
    if n == 0 {
        return Err(BridgeError::EmptyInput);
    }
    i32::try_from(n).map_err(|_| BridgeError::TooLarge { len: n })
}

/// Runs `out[i] = a[i] + b[i]` on the device.
///
/// `out` must already hold `a.len()` elements; it is filled, never resized.
/// Both uploads block, the launch is queued, and the blocking read-back
/// observes the finished launch because the queue is in-order. The three
/// device buffers are released before this returns, on every path.
pub fn dispatch_vector_add<D: ComputeDriver>(
    driver: &D,
    session: &SessionContext<D>,
    entry: &KernelEntry<D>,
    a: &[f32],
    b: &[f32],
    out: &mut [f32],
) -> Result<IndexSpace> {
    let count = check_lengths(a, b, out)?;
    let bytes = std::mem::size_of_val(a);
    let (context, queue, kernel) = (session.context(), session.queue(), entry.kernel());

    let mut d_a = DeviceBuffer::<D, ReadOnly>::allocate(driver, context, bytes)
        .map_err(BridgeError::at(DispatchStep::AllocateA))?;
    let mut d_b = DeviceBuffer::<D, ReadOnly>::allocate(driver, context, bytes)
        .map_err(BridgeError::at(DispatchStep::AllocateB))?;
    let d_c = DeviceBuffer::<D, WriteOnly>::allocate(driver, context, bytes)
        .map_err(BridgeError::at(DispatchStep::AllocateOut))?;

    d_a.write(driver, queue, a).map_err(BridgeError::at(DispatchStep::WriteA))?;
    d_b.write(driver, queue, b).map_err(BridgeError::at(DispatchStep::WriteB))?;

    for (index, buf) in [(0, d_a.raw()), (1, d_b.raw()), (2, d_c.raw())] {
        driver
            .set_arg_mem(kernel, index, buf)
            .map_err(BridgeError::at(DispatchStep::BindArgument(index)))?;
    }
    driver
        .set_arg_i32(kernel, 3, count)
        .map_err(BridgeError::at(DispatchStep::BindArgument(3)))?;

    let space = IndexSpace::covering(a.len(), LOCAL_SIZE);

    #[cfg(feature = "metrics")]
    let t = Instant::now();

    driver
        .enqueue_kernel(queue, kernel, space)
        .map_err(BridgeError::at(DispatchStep::Launch))?;

    #[cfg(feature = "metrics")]
    record("launch", t);

    debug!(entry = entry.name(), n = a.len(), global = space.global, local = space.local, "kernel queued");

    d_c.read(driver, queue, out).map_err(BridgeError::at(DispatchStep::ReadOut))?;
    Ok(space)
}
