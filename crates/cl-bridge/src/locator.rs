//! Platform/device discovery and the `{device, context, queue}` triple.

use crate::config::{DEVICE_NAME_CAPACITY, DEVICE_PREFERENCE};
use crate::driver::{ComputeDriver, DeviceClass, Scoped};
use crate::error::{BridgeError, Result, Status};
use tracing::{debug, info, warn};

/// The selected device. Immutable once chosen.
#[derive(Clone, Debug)]
pub struct DeviceHandle<Dev> {
    id: Dev,
    name: String,
    class: DeviceClass,
}

impl<Dev: Copy> DeviceHandle<Dev> {
    pub fn id(&self) -> Dev {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }
}

/// Device, context and the single in-order queue on it.
///
/// The queue is declared before the context so it is released first.
pub struct SessionContext<D: ComputeDriver> {
    queue: Scoped<D::Queue>,
    context: Scoped<D::Context>,
    device: DeviceHandle<D::Device>,
}

impl<D: ComputeDriver> SessionContext<D> {
    pub fn device(&self) -> &DeviceHandle<D::Device> {
        &self.device
    }

    pub fn context(&self) -> &D::Context {
        self.context.get()
    }

    pub fn queue(&self) -> &D::Queue {
        self.queue.get()
    }
}

impl<D: ComputeDriver> Drop for SessionContext<D> {
    fn drop(&mut self) {
        debug!(device = %self.device.name, "releasing queue and context");
    }
}

/// Picks the first platform, its first GPU (else its first CPU), and builds
/// a context plus in-order queue on that device.
pub fn locate<D: ComputeDriver>(driver: &D) -> Result<SessionContext<D>> {
    let platform = match driver.platforms() {
        Ok(mut platforms) if !platforms.is_empty() => platforms.swap_remove(0),
        Ok(_) => return Err(BridgeError::NoPlatform { status: None }),
        Err(status) => return Err(BridgeError::NoPlatform { status: Some(status) }),
    };

    let (id, class) = select_device(driver, &platform)?;

    let name = match driver.device_name(id) {
        Ok(raw) => truncate_name(&raw, DEVICE_NAME_CAPACITY),
        Err(status) => {
            warn!(%status, "could not read device name");
            String::from("<unnamed device>")
        }
    };
    info!(device = %name, %class, "initialised on device: {name}");

    let context = driver.create_context(id).map_err(BridgeError::ContextFailed)?;
    let context = Scoped::new("context", context);
    // a failed queue drops `context` on the way out
    let queue = driver
        .create_queue(context.get(), id)
        .map_err(BridgeError::QueueFailed)?;
    let queue = Scoped::new("queue", queue);

    Ok(SessionContext {
        queue,
        context,
        device: DeviceHandle { id, name, class },
    })
}

fn select_device<D: ComputeDriver>(
    driver: &D,
    platform: &D::Platform,
) -> Result<(D::Device, DeviceClass)> {
    let [first, second] = DEVICE_PREFERENCE;

    let first_status = match first_device(driver, platform, first) {
        Ok(id) => return Ok((id, first)),
        Err(status) => status,
    };
    warn!(status = %first_status, "no {first} device, trying {second}");

    match first_device(driver, platform, second) {
        Ok(id) => Ok((id, second)),
        Err(second_status) => {
            let (gpu, cpu) = match first {
                DeviceClass::Gpu => (first_status, second_status),
                DeviceClass::Cpu => (second_status, first_status),
            };
            Err(BridgeError::NoDevice { gpu, cpu })
        }
    }
}

fn first_device<D: ComputeDriver>(
    driver: &D,
    platform: &D::Platform,
    class: DeviceClass,
) -> std::result::Result<D::Device, Status> {
    driver
        .devices(platform, class)?
        .into_iter()
        .next()
        .ok_or(Status::DEVICE_NOT_FOUND)
}

/// Fits `raw` into a C buffer of `capacity` bytes: at most `capacity - 1`
/// bytes of text, cut on a char boundary, trailing NULs stripped.
pub(crate) fn truncate_name(raw: &str, capacity: usize) -> String {
    let raw = raw.trim_end_matches('\0');
    let max = capacity.saturating_sub(1);
    if raw.len() <= max {
        return raw.to_owned();
    }
    let mut end = max;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    raw[..end].to_owned()
}
