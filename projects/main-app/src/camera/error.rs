use std::fmt;

/// Device primitive (or composite operation) that raised a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOp {
    Open,
    Configure,
    Start,
    Stop,
    Capture,
    Restart,
}

impl fmt::Display for DeviceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceOp::Open => "open",
            DeviceOp::Configure => "configure",
            DeviceOp::Start => "start",
            DeviceOp::Stop => "stop",
            DeviceOp::Capture => "capture",
            DeviceOp::Restart => "restart",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsViolation {
    pub field: &'static str,
    pub reason: String,
}

impl fmt::Display for SettingsViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid settings: {}", join_violations(.0))]
    Validation(Vec<SettingsViolation>),

    #[error("device fault during {op}: {cause}")]
    DeviceFault { op: DeviceOp, cause: String },
}

impl CameraError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn device_fault(op: DeviceOp, cause: &anyhow::Error) -> Self {
        Self::DeviceFault {
            op,
            cause: format!("{cause:#}"),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CameraError::InvalidState(_) => "invalid_state",
            CameraError::Validation(_) => "validation_error",
            CameraError::DeviceFault { .. } => "device_fault",
        }
    }

    /// True when the fault came from bringing the device up rather than from
    /// an operation on an already running device.
    pub fn is_startup_fault(&self) -> bool {
        matches!(
            self,
            CameraError::DeviceFault {
                op: DeviceOp::Open | DeviceOp::Configure | DeviceOp::Start,
                ..
            }
        )
    }
}

fn join_violations(violations: &[SettingsViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
