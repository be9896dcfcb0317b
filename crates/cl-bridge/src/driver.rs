//! The capability set the bridge needs from a compute driver.
//!
//! Every handle type is an owned value that releases the driver object it
//! names when dropped, so "release handle" is expressed by ownership and
//! ordering is expressed by drop order.

use crate::dispatch::IndexSpace;
use crate::error::Status;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceClass {
    Gpu,
    Cpu,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceClass::Gpu => "GPU",
            DeviceClass::Cpu => "CPU",
        })
    }
}

/// How a kernel may touch a device buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

pub trait ComputeDriver {
    type Platform;
    type Device: Copy + fmt::Debug;
    type Context;
    type Queue;
    type Program;
    type Kernel;
    type Mem;

    fn platforms(&self) -> Result<Vec<Self::Platform>, Status>;

    fn devices(
        &self,
        platform: &Self::Platform,
        class: DeviceClass,
    ) -> Result<Vec<Self::Device>, Status>;

    fn device_name(&self, device: Self::Device) -> Result<String, Status>;

    fn create_context(&self, device: Self::Device) -> Result<Self::Context, Status>;

    /// A single in-order queue without properties.
    fn create_queue(
        &self,
        context: &Self::Context,
        device: Self::Device,
    ) -> Result<Self::Queue, Status>;

    fn create_program(
        &self,
        context: &Self::Context,
        source: &str,
    ) -> Result<Self::Program, Status>;

    fn build_program(
        &self,
        program: &mut Self::Program,
        device: Self::Device,
        options: &str,
    ) -> Result<(), Status>;

    fn build_log(&self, program: &Self::Program, device: Self::Device) -> Result<String, Status>;

    fn create_kernel(&self, program: &Self::Program, name: &str) -> Result<Self::Kernel, Status>;

    fn create_buffer(
        &self,
        context: &Self::Context,
        access: Access,
        bytes: usize,
    ) -> Result<Self::Mem, Status>;

    /// Blocking host → device copy of the whole buffer.
    fn enqueue_write(
        &self,
        queue: &Self::Queue,
        mem: &mut Self::Mem,
        host: &[u8],
    ) -> Result<(), Status>;

    fn set_arg_mem(&self, kernel: &Self::Kernel, index: u32, mem: &Self::Mem)
        -> Result<(), Status>;

    fn set_arg_i32(&self, kernel: &Self::Kernel, index: u32, value: i32) -> Result<(), Status>;

    /// 1-D launch without offset. Returns once the launch is queued.
    fn enqueue_kernel(
        &self,
        queue: &Self::Queue,
        kernel: &Self::Kernel,
        space: IndexSpace,
    ) -> Result<(), Status>;

    /// Blocking device → host copy of the whole buffer.
    fn enqueue_read(
        &self,
        queue: &Self::Queue,
        mem: &Self::Mem,
        host: &mut [u8],
    ) -> Result<(), Status>;
}

/// A driver handle that logs its own release.
pub(crate) struct Scoped<T> {
    what: &'static str,
    inner: T,
}

impl<T> Scoped<T> {
    pub(crate) fn new(what: &'static str, inner: T) -> Self {
        tracing::trace!(resource = what, "acquired");
        Self { what, inner }
    }

    pub(crate) fn get(&self) -> &T {
        &self.inner
    }
}

impl<T> Drop for Scoped<T> {
    fn drop(&mut self) {
        tracing::trace!(resource = self.what, "releasing");
    }
}
