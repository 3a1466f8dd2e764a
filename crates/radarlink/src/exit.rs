use std::fmt;
use std::io;

use radarlink_device::{DeviceError, ErrorClass};
use radarlink_frame::FrameError;
use radarlink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

fn io_code(kind: io::ErrorKind) -> i32 {
    match kind {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => {
            TRANSPORT_ERROR
        }
        _ => INTERNAL,
    }
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Open { ref source, .. } | TransportError::Io { ref source, .. } => {
            CliError::new(io_code(source.kind()), format!("{context}: {err}"))
        }
        TransportError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        TransportError::Closed { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Transport { source, .. } => transport_error(context, source),
        FrameError::NotFound { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        FrameError::Rejected { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

/// Setter validation failures are usage errors; everything the sensor sent
/// back is classified by its cause.
pub fn device_error(context: &str, err: DeviceError) -> CliError {
    match err {
        DeviceError::Transport(err) => transport_error(context, err),
        DeviceError::Frame(err) => frame_error(context, err),
        DeviceError::Command { .. } if err.is_timeout() => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        DeviceError::Command { .. } => match err.class() {
            ErrorClass::Transport => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
            ErrorClass::Rejected => CliError::new(FAILURE, format!("{context}: {err}")),
            _ => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        },
        DeviceError::HandshakeFailed(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        DeviceError::InvalidValue {
            location: "readback",
            ..
        } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        DeviceError::InvalidValue { .. } => CliError::usage(format!("{context}: {err}")),
        DeviceError::SessionClosed => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}
