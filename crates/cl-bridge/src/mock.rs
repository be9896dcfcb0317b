//! Host-side stand-in for a compute driver.
//!
//! Every call lands in a shared ledger that counts live handles per
//! resource kind and records the command stream. Any kernel runs as the
//! vector-add entry: `out[i] = a[i] + b[i]` for `i < n`, work-items at or past
//! `n` do nothing, and a work-item below `n` that would touch memory past a
//! buffer end is counted as out of range instead of writing.

use crate::dispatch::IndexSpace;
use crate::driver::{Access, ComputeDriver, DeviceClass};
use crate::error::Status;

use bytemuck::pod_read_unaligned;
use std::{cell::RefCell, collections::HashMap, rc::Rc};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    Context,
    Queue,
    Program,
    Kernel,
    Buffer,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Write { buffer: u64, bytes: usize },
    SetArg(u32),
    Launch(IndexSpace),
    Read { buffer: u64, bytes: usize },
    Release(Resource),
}

/// Where an injected failure fires. Counters are zero-based per driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailPoint {
    CreateBuffer(usize),
    Write(usize),
    SetArg(u32),
    Launch,
    Read,
}

#[derive(Clone, Debug)]
struct Plan {
    platforms: Result<usize, Status>,
    gpu: Result<usize, Status>,
    cpu: Result<usize, Status>,
    device_name: Result<String, Status>,
    context: Option<Status>,
    queue: Option<Status>,
    program: Option<Status>,
    build_failure: Option<String>,
    build_log: Option<Status>,
    fail_at: Option<FailPoint>,
}

impl Default for Plan {
    fn default() -> Self {
        Self {
            platforms: Ok(1),
            gpu: Ok(1),
            cpu: Ok(1),
            device_name: Ok(String::from("Mock Device")),
            context: None,
            queue: None,
            program: None,
            build_failure: None,
            build_log: None,
            fail_at: None,
        }
    }
}

#[derive(Debug, Default)]
struct Ledger {
    next_id: u64,
    live: HashMap<Resource, usize>,
    released: HashMap<Resource, usize>,
    ops: Vec<Op>,
    memory: HashMap<u64, Vec<u8>>,
    buffers_created: usize,
    writes: usize,
    out_of_range: usize,
}

impl Ledger {
    fn acquire(&mut self, kind: Resource) -> u64 {
        self.next_id += 1;
        *self.live.entry(kind).or_default() += 1;
        self.next_id
    }

    fn release(&mut self, kind: Resource, id: u64) {
        if let Some(n) = self.live.get_mut(&kind) {
            *n = n.saturating_sub(1);
        }
        *self.released.entry(kind).or_default() += 1;
        self.memory.remove(&id);
        self.ops.push(Op::Release(kind));
    }
}

#[derive(Clone, Default)]
pub struct MockDriver {
    plan: Rc<Plan>,
    ledger: Rc<RefCell<Ledger>>,
}

impl MockDriver {
    /// One platform exposing a GPU and a CPU; every call succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    fn plan(mut self, edit: impl FnOnce(&mut Plan)) -> Self {
        edit(Rc::make_mut(&mut self.plan));
        self
    }

    pub fn without_platforms(self) -> Self {
        self.plan(|p| p.platforms = Ok(0))
    }

    pub fn failing_platform_query(self, status: Status) -> Self {
        self.plan(|p| p.platforms = Err(status))
    }

    /// What a device query for `class` answers: `Ok(count)` devices (an
    /// empty list for zero, as real drivers report it) or the failing status.
    pub fn with_devices(self, class: DeviceClass, answer: Result<usize, Status>) -> Self {
        self.plan(|p| match class {
            DeviceClass::Gpu => p.gpu = answer,
            DeviceClass::Cpu => p.cpu = answer,
        })
    }

    pub fn without_gpu(self) -> Self {
        self.with_devices(DeviceClass::Gpu, Err(Status::DEVICE_NOT_FOUND))
    }

    pub fn without_cpu(self) -> Self {
        self.with_devices(DeviceClass::Cpu, Err(Status::DEVICE_NOT_FOUND))
    }

    pub fn with_device_name(self, name: &str) -> Self {
        let name = name.to_owned();
        self.plan(|p| p.device_name = Ok(name))
    }

    pub fn failing_device_name(self, status: Status) -> Self {
        self.plan(|p| p.device_name = Err(status))
    }

    pub fn failing_context(self, status: Status) -> Self {
        self.plan(|p| p.context = Some(status))
    }

    pub fn failing_queue(self, status: Status) -> Self {
        self.plan(|p| p.queue = Some(status))
    }

    pub fn failing_program(self, status: Status) -> Self {
        self.plan(|p| p.program = Some(status))
    }

    /// Every build fails with `log` as the driver's diagnostic output.
    pub fn failing_build(self, log: &str) -> Self {
        let log = log.to_owned();
        self.plan(|p| p.build_failure = Some(log))
    }

    pub fn failing_build_log(self, status: Status) -> Self {
        self.plan(|p| p.build_log = Some(status))
    }

    pub fn failing_at(self, point: FailPoint) -> Self {
        self.plan(|p| p.fail_at = Some(point))
    }

    pub fn live(&self, kind: Resource) -> usize {
        self.ledger.borrow().live.get(&kind).copied().unwrap_or(0)
    }

    pub fn live_total(&self) -> usize {
        self.ledger.borrow().live.values().sum()
    }

    pub fn released(&self, kind: Resource) -> usize {
        self.ledger.borrow().released.get(&kind).copied().unwrap_or(0)
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ledger.borrow().ops.clone()
    }

    /// Release order of everything except buffers.
    pub fn teardown_order(&self) -> Vec<Resource> {
        self.ledger
            .borrow()
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::Release(kind) if *kind != Resource::Buffer => Some(*kind),
                _ => None,
            })
            .collect()
    }

    pub fn launches(&self) -> Vec<IndexSpace> {
        self.ledger
            .borrow()
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::Launch(space) => Some(*space),
                _ => None,
            })
            .collect()
    }

    pub fn out_of_range(&self) -> usize {
        self.ledger.borrow().out_of_range
    }

    fn handle(&self, kind: Resource) -> MockHandle {
        let id = self.ledger.borrow_mut().acquire(kind);
        MockHandle { id, kind, ledger: Rc::clone(&self.ledger) }
    }

    fn fails(&self, point: FailPoint) -> bool {
        self.plan.fail_at == Some(point)
    }
}

#[derive(Debug)]
pub struct MockHandle {
    id: u64,
    kind: Resource,
    ledger: Rc<RefCell<Ledger>>,
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.ledger.borrow_mut().release(self.kind, self.id);
    }
}

#[derive(Debug)]
pub struct MockPlatform;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MockDevice(pub DeviceClass);

#[derive(Debug)]
pub struct MockProgram {
    _handle: MockHandle,
    source: String,
    entries: Vec<String>,
    log: String,
    built: bool,
}

#[derive(Clone, Copy, Debug)]
enum Arg {
    Mem(u64),
    Int(i32),
}

#[derive(Debug)]
pub struct MockKernel {
    _handle: MockHandle,
    args: RefCell<Vec<Option<Arg>>>,
}

#[derive(Debug)]
pub struct MockMem {
    handle: MockHandle,
    access: Access,
    bytes: usize,
}

impl MockMem {
    pub fn access(&self) -> Access {
        self.access
    }
}

/// Names declared as `__kernel void <name>(` in `source`.
fn kernel_names(source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = source;
    while let Some(at) = rest.find("__kernel") {
        rest = &rest[at + "__kernel".len()..];
        let mut words = rest
            .split(|c: char| c.is_whitespace() || c == '(')
            .filter(|w| !w.is_empty());
        if words.next() == Some("void") {
            if let Some(name) = words.next() {
                names.push(name.to_owned());
            }
        }
    }
    names
}

impl ComputeDriver for MockDriver {
    type Platform = MockPlatform;
    type Device = MockDevice;
    type Context = MockHandle;
    type Queue = MockHandle;
    type Program = MockProgram;
    type Kernel = MockKernel;
    type Mem = MockMem;

    fn platforms(&self) -> Result<Vec<MockPlatform>, Status> {
        let count = self.plan.platforms?;
        Ok((0..count).map(|_| MockPlatform).collect())
    }

    fn devices(&self, _platform: &MockPlatform, class: DeviceClass) -> Result<Vec<MockDevice>, Status> {
        let count = match class {
            DeviceClass::Gpu => self.plan.gpu,
            DeviceClass::Cpu => self.plan.cpu,
        }?;
        Ok(vec![MockDevice(class); count])
    }

    fn device_name(&self, _device: MockDevice) -> Result<String, Status> {
        self.plan.device_name.clone()
    }

    fn create_context(&self, _device: MockDevice) -> Result<MockHandle, Status> {
        match self.plan.context {
            Some(status) => Err(status),
            None => Ok(self.handle(Resource::Context)),
        }
    }

    fn create_queue(&self, _context: &MockHandle, _device: MockDevice) -> Result<MockHandle, Status> {
        match self.plan.queue {
            Some(status) => Err(status),
            None => Ok(self.handle(Resource::Queue)),
        }
    }

    fn create_program(&self, _context: &MockHandle, source: &str) -> Result<MockProgram, Status> {
        if let Some(status) = self.plan.program {
            return Err(status);
        }
        if source.is_empty() {
            return Err(Status::INVALID_VALUE);
        }
        Ok(MockProgram {
            _handle: self.handle(Resource::Program),
            source: source.to_owned(),
            entries: Vec::new(),
            log: String::new(),
            built: false,
        })
    }

    fn build_program(&self, program: &mut MockProgram, _device: MockDevice, _options: &str) -> Result<(), Status> {
        if let Some(log) = &self.plan.build_failure {
            program.log = log.clone();
            return Err(Status::BUILD_PROGRAM_FAILURE);
        }
        program.entries = kernel_names(&program.source);
        program.log.clear();
        program.built = true;
        Ok(())
    }

    fn build_log(&self, program: &MockProgram, _device: MockDevice) -> Result<String, Status> {
        if let Some(status) = self.plan.build_log {
            return Err(status);
        }
        Ok(program.log.clone())
    }

    fn create_kernel(&self, program: &MockProgram, name: &str) -> Result<MockKernel, Status> {
        if !program.built {
            return Err(Status::INVALID_PROGRAM_EXECUTABLE);
        }
        if !program.entries.iter().any(|e| e == name) {
            return Err(Status::INVALID_KERNEL_NAME);
        }
        Ok(MockKernel { _handle: self.handle(Resource::Kernel), args: RefCell::new(Vec::new()) })
    }

    fn create_buffer(&self, _context: &MockHandle, access: Access, bytes: usize) -> Result<MockMem, Status> {
        let nth = {
            let mut ledger = self.ledger.borrow_mut();
            ledger.buffers_created += 1;
            ledger.buffers_created - 1
        };
        if self.fails(FailPoint::CreateBuffer(nth)) {
            return Err(Status::MEM_OBJECT_ALLOCATION_FAILURE);
        }
        if bytes == 0 {
            return Err(Status::INVALID_BUFFER_SIZE);
        }
        let handle = self.handle(Resource::Buffer);
        self.ledger.borrow_mut().memory.insert(handle.id, vec![0; bytes]);
        Ok(MockMem { handle, access, bytes })
    }

    fn enqueue_write(&self, _queue: &MockHandle, mem: &mut MockMem, host: &[u8]) -> Result<(), Status> {
        let mut ledger = self.ledger.borrow_mut();
        ledger.writes += 1;
        if self.fails(FailPoint::Write(ledger.writes - 1)) {
            return Err(Status::OUT_OF_RESOURCES);
        }
        if host.len() != mem.bytes {
            return Err(Status::INVALID_VALUE);
        }
        ledger.memory.insert(mem.handle.id, host.to_vec());
        ledger.ops.push(Op::Write { buffer: mem.handle.id, bytes: host.len() });
        Ok(())
    }

    fn set_arg_mem(&self, kernel: &MockKernel, index: u32, mem: &MockMem) -> Result<(), Status> {
        set_arg(self, kernel, index, Arg::Mem(mem.handle.id))
    }

    fn set_arg_i32(&self, kernel: &MockKernel, index: u32, value: i32) -> Result<(), Status> {
        set_arg(self, kernel, index, Arg::Int(value))
    }

    fn enqueue_kernel(&self, _queue: &MockHandle, kernel: &MockKernel, space: IndexSpace) -> Result<(), Status> {
        if self.fails(FailPoint::Launch) {
            return Err(Status::OUT_OF_RESOURCES);
        }
        if space.local == 0 || space.global % space.local != 0 {
            return Err(Status::INVALID_WORK_GROUP_SIZE);
        }
        let args = kernel.args.borrow();
        let (a, b, c, n) = match args.as_slice() {
            [Some(Arg::Mem(a)), Some(Arg::Mem(b)), Some(Arg::Mem(c)), Some(Arg::Int(n))] => (*a, *b, *c, *n),
            _ => return Err(Status::INVALID_KERNEL_ARGS),
        };

        let mut ledger = self.ledger.borrow_mut();
        let a = ledger.memory.get(&a).cloned().ok_or(Status::INVALID_KERNEL_ARGS)?;
        let b = ledger.memory.get(&b).cloned().ok_or(Status::INVALID_KERNEL_ARGS)?;
        let mut out = ledger.memory.remove(&c).ok_or(Status::INVALID_KERNEL_ARGS)?;

        const F: usize = std::mem::size_of::<f32>();
        let mut out_of_range = 0;
        for gid in 0..space.global {
            if i64::try_from(gid).map_or(true, |g| g >= i64::from(n)) {
                continue;
            }
            let at = gid * F;
            if at + F > a.len() || at + F > b.len() || at + F > out.len() {
                out_of_range += 1;
                continue;
            }
            let sum = pod_read_unaligned::<f32>(&a[at..at + F]) + pod_read_unaligned::<f32>(&b[at..at + F]);
            out[at..at + F].copy_from_slice(bytemuck::bytes_of(&sum));
        }

        ledger.memory.insert(c, out);
        ledger.out_of_range += out_of_range;
        ledger.ops.push(Op::Launch(space));
        Ok(())
    }

    fn enqueue_read(&self, _queue: &MockHandle, mem: &MockMem, host: &mut [u8]) -> Result<(), Status> {
        if self.fails(FailPoint::Read) {
            return Err(Status::OUT_OF_RESOURCES);
        }
        if host.len() != mem.bytes {
            return Err(Status::INVALID_VALUE);
        }
        let mut ledger = self.ledger.borrow_mut();
        let data = ledger.memory.get(&mem.handle.id).ok_or(Status::INVALID_VALUE)?;
        host.copy_from_slice(data);
        ledger.ops.push(Op::Read { buffer: mem.handle.id, bytes: host.len() });
        Ok(())
    }
}

fn set_arg(driver: &MockDriver, kernel: &MockKernel, index: u32, arg: Arg) -> Result<(), Status> {
    if driver.fails(FailPoint::SetArg(index)) {
        return Err(Status::INVALID_ARG_INDEX);
    }
    let mut args = kernel.args.borrow_mut();
    let slot = index as usize;
    if args.len() <= slot {
        args.resize(slot + 1, None);
    }
    args[slot] = Some(arg);
    driver.ledger.borrow_mut().ops.push(Op::SetArg(index));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_kernel_declarations() {
        let src = "__kernel void vector_add(__global float* a)\n{}\n__kernel  void\nscale (float k) {}";
        assert_eq!(kernel_names(src), vec!["vector_add", "scale"]);
        assert!(kernel_names("void helper(int x) {}").is_empty());
    }

    #[test]
    fn handles_are_counted_until_dropped() {
        let driver = MockDriver::new();
        let ctx = driver.create_context(MockDevice(DeviceClass::Gpu)).unwrap();
        let mem = driver.create_buffer(&ctx, Access::ReadOnly, 16).unwrap();
        assert_eq!(driver.live(Resource::Buffer), 1);
        assert_eq!(mem.access(), Access::ReadOnly);
        drop(mem);
        drop(ctx);
        assert_eq!(driver.live_total(), 0);
        assert_eq!(driver.teardown_order(), vec![Resource::Context]);
    }
}
