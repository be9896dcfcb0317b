use std::{fmt, io, path::PathBuf};

/// Raw status code reported by the compute driver. `0` is success and never
/// wrapped in an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    pub const DEVICE_NOT_FOUND: Status = Status(-1);
    pub const MEM_OBJECT_ALLOCATION_FAILURE: Status = Status(-4);
    pub const OUT_OF_RESOURCES: Status = Status(-5);
    pub const BUILD_PROGRAM_FAILURE: Status = Status(-11);
    pub const INVALID_VALUE: Status = Status(-30);
    pub const INVALID_CONTEXT: Status = Status(-34);
    pub const INVALID_PROGRAM_EXECUTABLE: Status = Status(-45);
    pub const INVALID_KERNEL_NAME: Status = Status(-46);
    pub const INVALID_ARG_INDEX: Status = Status(-49);
    pub const INVALID_KERNEL_ARGS: Status = Status(-52);
    pub const INVALID_WORK_GROUP_SIZE: Status = Status(-54);
    pub const INVALID_BUFFER_SIZE: Status = Status(-61);
    pub const PLATFORM_NOT_FOUND_KHR: Status = Status(-1001);

    /// Symbolic name for the codes this crate cares about.
    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::DEVICE_NOT_FOUND => "CL_DEVICE_NOT_FOUND",
            Self::MEM_OBJECT_ALLOCATION_FAILURE => "CL_MEM_OBJECT_ALLOCATION_FAILURE",
            Self::OUT_OF_RESOURCES => "CL_OUT_OF_RESOURCES",
            Self::BUILD_PROGRAM_FAILURE => "CL_BUILD_PROGRAM_FAILURE",
            Self::INVALID_VALUE => "CL_INVALID_VALUE",
            Self::INVALID_CONTEXT => "CL_INVALID_CONTEXT",
            Self::INVALID_PROGRAM_EXECUTABLE => "CL_INVALID_PROGRAM_EXECUTABLE",
            Self::INVALID_KERNEL_NAME => "CL_INVALID_KERNEL_NAME",
            Self::INVALID_ARG_INDEX => "CL_INVALID_ARG_INDEX",
            Self::INVALID_KERNEL_ARGS => "CL_INVALID_KERNEL_ARGS",
            Self::INVALID_WORK_GROUP_SIZE => "CL_INVALID_WORK_GROUP_SIZE",
            Self::INVALID_BUFFER_SIZE => "CL_INVALID_BUFFER_SIZE",
            Self::PLATFORM_NOT_FOUND_KHR => "CL_PLATFORM_NOT_FOUND_KHR",
            _ => return None,
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "status {}", self.0),
        }
    }
}

impl std::error::Error for Status {}

impl From<opencl3::error_codes::ClError> for Status {
    #[inline]
    fn from(err: opencl3::error_codes::ClError) -> Self {
        Status(err.0)
    }
}

/// The step of the dispatch protocol at which the driver refused to go on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchStep {
    AllocateA,
    AllocateB,
    AllocateOut,
    WriteA,
    WriteB,
    BindArgument(u32),
    Launch,
    ReadOut,
}

impl fmt::Display for DispatchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocateA => f.write_str("allocate input buffer a"),
            Self::AllocateB => f.write_str("allocate input buffer b"),
            Self::AllocateOut => f.write_str("allocate output buffer"),
            Self::WriteA => f.write_str("write input a"),
            Self::WriteB => f.write_str("write input b"),
            Self::BindArgument(index) => write!(f, "bind kernel argument {index}"),
            Self::Launch => f.write_str("launch kernel"),
            Self::ReadOut => f.write_str("read output"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("no compute platform available{}", .status.map(|s| format!(": {s}")).unwrap_or_default())]
    NoPlatform { status: Option<Status> },

    #[error("no GPU or CPU device on the platform (gpu lookup: {gpu}, cpu lookup: {cpu})")]
    NoDevice { gpu: Status, cpu: Status },

    #[error("context creation failed: {0}")]
    ContextFailed(Status),

    #[error("command queue creation failed: {0}")]
    QueueFailed(Status),

    #[error("kernel source {} unavailable: {source}", .path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("program creation failed: {status}")]
    ProgramFailed { status: Status },

    #[error("program build failed ({status}):\n{log}")]
    BuildFailed { status: Status, log: String },

    #[error("kernel entry `{name}` not found: {status}")]
    EntryNotFound { name: String, status: Status },

    #[error("dispatch failed at step `{step}`: {status}")]
    DispatchFailed { step: DispatchStep, status: Status },

    #[error("dispatch needs at least one element")]
    EmptyInput,

    #[error("length mismatch: a = {a}, b = {b}, out = {out}")]
    LengthMismatch { a: usize, b: usize, out: usize },

    #[error("{len} elements do not fit the kernel's 32-bit element count")]
    TooLarge { len: usize },
}

pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// The driver's build log, when this is a build failure.
    pub fn build_log(&self) -> Option<&str> {
        match self {
            Self::BuildFailed { log, .. } => Some(log),
            _ => None,
        }
    }

    pub(crate) fn at(step: DispatchStep) -> impl FnOnce(Status) -> BridgeError {
        move |status| BridgeError::DispatchFailed { step, status }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_uses_symbolic_name() {
        assert_eq!(Status::INVALID_KERNEL_NAME.to_string(), "CL_INVALID_KERNEL_NAME (-46)");
        assert_eq!(Status(-9999).to_string(), "status -9999");
    }

    #[test]
    fn no_platform_message_includes_status_only_when_present() {
        let bare = BridgeError::NoPlatform { status: None }.to_string();
        assert_eq!(bare, "no compute platform available");

        let with = BridgeError::NoPlatform { status: Some(Status::PLATFORM_NOT_FOUND_KHR) }.to_string();
        assert!(with.ends_with("CL_PLATFORM_NOT_FOUND_KHR (-1001)"), "{with}");
    }

    #[test]
    fn dispatch_failure_names_step() {
        let err = BridgeError::at(DispatchStep::BindArgument(3))(Status::INVALID_ARG_INDEX);
        assert_eq!(
            err.to_string(),
            "dispatch failed at step `bind kernel argument 3`: CL_INVALID_ARG_INDEX (-49)"
        );
    }

    #[test]
    fn build_log_is_exposed_verbatim() {
        let err = BridgeError::BuildFailed {
            status: Status::BUILD_PROGRAM_FAILURE,
            log: "error: use of undeclared identifier 'q'".into(),
        };
        assert_eq!(err.build_log(), Some("error: use of undeclared identifier 'q'"));
        assert!(BridgeError::EmptyInput.build_log().is_none());
    }
}
