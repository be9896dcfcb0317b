//! `ComputeDriver` over the system OpenCL ICD loader.
//!
//! The loader is opened at runtime, so a host without OpenCL simply reports
//! no platform.

use crate::dispatch::IndexSpace;
use crate::driver::{Access, ComputeDriver, DeviceClass};
use crate::error::Status;

use opencl3::{
    command_queue::CommandQueue,
    context::Context,
    device::{Device, CL_DEVICE_TYPE_CPU, CL_DEVICE_TYPE_GPU},
    kernel::Kernel,
    memory::{Buffer, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE, CL_MEM_WRITE_ONLY},
    platform::{get_platforms, Platform},
    program::Program,
    types::{cl_device_id, cl_device_type, cl_mem_flags, CL_BLOCKING},
};
use std::ptr;

#[derive(Clone, Copy, Debug, Default)]
pub struct OpenCl;

fn device_type(class: DeviceClass) -> cl_device_type {
    match class {
        DeviceClass::Gpu => CL_DEVICE_TYPE_GPU,
        DeviceClass::Cpu => CL_DEVICE_TYPE_CPU,
    }
}

fn mem_flags(access: Access) -> cl_mem_flags {
    match access {
        Access::ReadOnly => CL_MEM_READ_ONLY,
        Access::WriteOnly => CL_MEM_WRITE_ONLY,
        Access::ReadWrite => CL_MEM_READ_WRITE,
    }
}

impl ComputeDriver for OpenCl {
    type Platform = Platform;
    type Device = cl_device_id;
    type Context = Context;
    type Queue = CommandQueue;
    type Program = Program;
    type Kernel = Kernel;
    type Mem = Buffer<u8>;

    fn platforms(&self) -> Result<Vec<Platform>, Status> {
        Ok(get_platforms()?)
    }

    fn devices(&self, platform: &Platform, class: DeviceClass) -> Result<Vec<cl_device_id>, Status> {
        Ok(platform.get_devices(device_type(class))?)
    }

    fn device_name(&self, device: cl_device_id) -> Result<String, Status> {
        Ok(Device::new(device).name()?)
    }

    fn create_context(&self, device: cl_device_id) -> Result<Context, Status> {
        Ok(Context::from_device(&Device::new(device))?)
    }

    fn create_queue(&self, context: &Context, device: cl_device_id) -> Result<CommandQueue, Status> {
        // clCreateCommandQueue is the only entry point an OpenCL 1.2 runtime has.
        #[allow(deprecated)]
        let queue = unsafe { CommandQueue::create(context, device, 0)? };
        Ok(queue)
    }

    fn create_program(&self, context: &Context, source: &str) -> Result<Program, Status> {
        Ok(Program::create_from_source(context, source)?)
    }

    fn build_program(
        &self,
        program: &mut Program,
        device: cl_device_id,
        options: &str,
    ) -> Result<(), Status> {
        Ok(program.build(&[device], options)?)
    }

    fn build_log(&self, program: &Program, device: cl_device_id) -> Result<String, Status> {
        Ok(program.get_build_log(device)?)
    }

    fn create_kernel(&self, program: &Program, name: &str) -> Result<Kernel, Status> {
        Ok(Kernel::create(program, name)?)
    }

    fn create_buffer(&self, context: &Context, access: Access, bytes: usize) -> Result<Buffer<u8>, Status> {
        // SAFETY: no host pointer is handed to the driver.
        let buf = unsafe { Buffer::<u8>::create(context, mem_flags(access), bytes, ptr::null_mut())? };
        Ok(buf)
    }

    fn enqueue_write(&self, queue: &CommandQueue, mem: &mut Buffer<u8>, host: &[u8]) -> Result<(), Status> {
        // SAFETY: blocking write, `host` outlives the call.
        let _evt = unsafe { queue.enqueue_write_buffer(mem, CL_BLOCKING, 0, host, &[])? };
        Ok(())
    }

    fn set_arg_mem(&self, kernel: &Kernel, index: u32, mem: &Buffer<u8>) -> Result<(), Status> {
        // SAFETY: `Buffer` is a bare cl_mem, which is what a __global argument expects.
        unsafe { kernel.set_arg(index, mem)? };
        Ok(())
    }

    fn set_arg_i32(&self, kernel: &Kernel, index: u32, value: i32) -> Result<(), Status> {
        // SAFETY: the argument is a plain `int`.
        unsafe { kernel.set_arg(index, &value)? };
        Ok(())
    }

    fn enqueue_kernel(&self, queue: &CommandQueue, kernel: &Kernel, space: IndexSpace) -> Result<(), Status> {
        let global = [space.global];
        let local = [space.local];
        // SAFETY: work sizes point at one-element arrays living across the call.
        let _evt = unsafe {
            queue.enqueue_nd_range_kernel(
                kernel.get(),
                1,
                ptr::null(),
                global.as_ptr(),
                local.as_ptr(),
                &[],
            )?
        };
        Ok(())
    }

    fn enqueue_read(&self, queue: &CommandQueue, mem: &Buffer<u8>, host: &mut [u8]) -> Result<(), Status> {
        // SAFETY: blocking read, `host` is exclusively borrowed until it returns.
        let _evt = unsafe { queue.enqueue_read_buffer(mem, CL_BLOCKING, 0, host, &[])? };
        Ok(())
    }
}
