//! Device buffers typed by how the kernel may access them.
//!
//! `DeviceBuffer<D, ReadOnly>` can only be filled from the host,
//! `DeviceBuffer<D, WriteOnly>` can only be read back. Dropping a buffer
//! releases it, so every exit path of a dispatch frees what it allocated.

use crate::driver::{Access, ComputeDriver};
use crate::error::Status;

use bytemuck::Pod;
use std::marker::PhantomData;
use tracing::trace;

#[cfg(feature = "metrics")]
use crate::metrics::{record, ALLOCS, ALLOC_BYTES};
#[cfg(feature = "metrics")]
use std::{sync::atomic::Ordering, time::Instant};

// ─── access markers ──────────────────────────────────────────────────
mod sealed {
    pub trait Sealed {}
}

pub trait AccessMode: sealed::Sealed {
    const ACCESS: Access;
}

/// Kernel reads, host writes.
pub struct ReadOnly;
impl sealed::Sealed for ReadOnly {}
impl AccessMode for ReadOnly {
    const ACCESS: Access = Access::ReadOnly;
}

/// Kernel writes, host reads.
pub struct WriteOnly;
impl sealed::Sealed for WriteOnly {}
impl AccessMode for WriteOnly {
    const ACCESS: Access = Access::WriteOnly;
}

pub struct ReadWrite;
impl sealed::Sealed for ReadWrite {}
impl AccessMode for ReadWrite {
    const ACCESS: Access = Access::ReadWrite;
}

/// Modes the host may upload into.
pub trait HostWritable: AccessMode {}
impl HostWritable for ReadOnly {}
impl HostWritable for ReadWrite {}

/// Modes the host may download from.
pub trait HostReadable: AccessMode {}
impl HostReadable for WriteOnly {}
impl HostReadable for ReadWrite {}

// ─── buffer ──────────────────────────────────────────────────────────
pub struct DeviceBuffer<D: ComputeDriver, M: AccessMode> {
    mem: D::Mem,
    bytes: usize,
    _mode: PhantomData<M>,
}

impl<D: ComputeDriver, M: AccessMode> DeviceBuffer<D, M> {
    pub fn allocate(driver: &D, context: &D::Context, bytes: usize) -> Result<Self, Status> {
        if bytes == 0 {
            return Err(Status::INVALID_BUFFER_SIZE);
        }

        #[cfg(feature = "metrics")]
        let t = Instant::now();

        let mem = driver.create_buffer(context, M::ACCESS, bytes)?;

        #[cfg(feature = "metrics")]
        {
            record("allocate", t);
            ALLOCS.fetch_add(1, Ordering::Relaxed);
            ALLOC_BYTES.fetch_add(bytes, Ordering::Relaxed);
        }

        trace!(bytes, access = ?M::ACCESS, "device buffer allocated");
        Ok(Self { mem, bytes, _mode: PhantomData })
    }

    pub fn len(&self) -> usize {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    pub fn raw(&self) -> &D::Mem {
        &self.mem
    }
}

impl<D: ComputeDriver, M: HostWritable> DeviceBuffer<D, M> {
    /// Blocking upload; `host` may be reused as soon as this returns.
    pub fn write<T: Pod>(&mut self, driver: &D, queue: &D::Queue, host: &[T]) -> Result<(), Status> {
        let bytes: &[u8] = bytemuck::cast_slice(host);
        if bytes.len() != self.bytes {
            return Err(Status::INVALID_VALUE);
        }

        #[cfg(feature = "metrics")]
        let t = Instant::now();

        driver.enqueue_write(queue, &mut self.mem, bytes)?;

        #[cfg(feature = "metrics")]
        record("enqueue_write", t);

        trace!(bytes = bytes.len(), "host → device");
        Ok(())
    }
}

impl<D: ComputeDriver, M: HostReadable> DeviceBuffer<D, M> {
    /// Blocking download. On an in-order queue it observes every command
    /// enqueued before it.
    pub fn read<T: Pod>(&self, driver: &D, queue: &D::Queue, host: &mut [T]) -> Result<(), Status> {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(host);
        if bytes.len() != self.bytes {
            return Err(Status::INVALID_VALUE);
        }

        #[cfg(feature = "metrics")]
        let t = Instant::now();

        driver.enqueue_read(queue, &self.mem, bytes)?;

        #[cfg(feature = "metrics")]
        record("enqueue_read", t);

        trace!(bytes = self.bytes, "device → host");
        Ok(())
    }
}

impl<D: ComputeDriver, M: AccessMode> Drop for DeviceBuffer<D, M> {
    fn drop(&mut self) {
        #[cfg(feature = "metrics")]
        {
            ALLOCS.fetch_sub(1, Ordering::Relaxed);
            ALLOC_BYTES.fetch_sub(self.bytes, Ordering::Relaxed);
        }
        trace!(bytes = self.bytes, "device buffer released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::locate;
    use crate::mock::{MockDriver, Resource};

    #[test]
    fn round_trips_through_read_write_buffer() {
        let driver = MockDriver::new();
        let ctx = locate(&driver).unwrap();
        let host = [1.0_f32, 2.0, 3.0];

        let mut buf = DeviceBuffer::<_, ReadWrite>::allocate(&driver, ctx.context(), 12).unwrap();
        buf.write(&driver, ctx.queue(), &host).unwrap();
        let mut back = [0.0_f32; 3];
        buf.read(&driver, ctx.queue(), &mut back).unwrap();
        assert_eq!(back, host);
        assert_eq!(buf.raw().access(), Access::ReadWrite);
    }

    #[test]
    fn access_mode_reaches_the_driver() {
        let driver = MockDriver::new();
        let ctx = locate(&driver).unwrap();
        let a = DeviceBuffer::<_, ReadOnly>::allocate(&driver, ctx.context(), 4).unwrap();
        let c = DeviceBuffer::<_, WriteOnly>::allocate(&driver, ctx.context(), 4).unwrap();
        assert_eq!(a.raw().access(), Access::ReadOnly);
        assert_eq!(c.raw().access(), Access::WriteOnly);
    }

    #[test]
    fn size_mismatch_is_rejected_before_the_driver() {
        let driver = MockDriver::new();
        let ctx = locate(&driver).unwrap();
        let mut buf = DeviceBuffer::<_, ReadOnly>::allocate(&driver, ctx.context(), 8).unwrap();
        assert_eq!(buf.write(&driver, ctx.queue(), &[1.0_f32]), Err(Status::INVALID_VALUE));
        assert!(driver.ops().is_empty());
    }

    #[test]
    fn zero_length_is_refused() {
        let driver = MockDriver::new();
        let ctx = locate(&driver).unwrap();
        let err = DeviceBuffer::<_, ReadOnly>::allocate(&driver, ctx.context(), 0).err();
        assert_eq!(err, Some(Status::INVALID_BUFFER_SIZE));
    }

    #[test]
    fn drop_releases() {
        let driver = MockDriver::new();
        let ctx = locate(&driver).unwrap();
        {
            let _a = DeviceBuffer::<_, ReadOnly>::allocate(&driver, ctx.context(), 64).unwrap();
            assert_eq!(driver.live(Resource::Buffer), 1);
        }
        assert_eq!(driver.live(Resource::Buffer), 0);
    }
}
