use radarlink_frame::FrameError;
use radarlink_transport::TransportError;

/// Errors that can occur in device operations.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Transport-level error outside of a command exchange.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error outside of a command exchange.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A command exchange failed after exhausting its retries.
    #[error("{command} failed at {step} after {attempts} attempt(s): {source}")]
    Command {
        command: String,
        step: &'static str,
        attempts: u32,
        #[source]
        source: FrameError,
    },

    /// Command mode could not be negotiated.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// A configuration value is outside its accepted range.
    #[error("{location}: invalid value {value}")]
    InvalidValue {
        location: &'static str,
        value: String,
    },

    /// The configuration session was already ended.
    #[error("configuration session already closed")]
    SessionClosed,
}

/// Failure taxonomy used for retry decisions and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Timeout or I/O failure on the link.
    Transport,
    /// Header/footer mismatch, length mismatch or missing marker.
    Malformed,
    /// The device answered with a non-zero status or `Error`.
    Rejected,
    /// A value outside its accepted range.
    InvalidValue,
    /// Session contract violation.
    Session,
}

impl ErrorClass {
    /// Classes the command engine retries.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorClass::Transport | ErrorClass::Malformed | ErrorClass::Rejected
        )
    }
}

/// Class of a frame-level failure.
pub fn frame_class(err: &FrameError) -> ErrorClass {
    match err {
        FrameError::Transport { .. } => ErrorClass::Transport,
        FrameError::Mismatch { .. }
        | FrameError::NotFound { .. }
        | FrameError::Malformed { .. }
        | FrameError::Overrun { .. } => ErrorClass::Malformed,
        FrameError::Rejected { .. } => ErrorClass::Rejected,
        FrameError::InvalidValue { .. } => ErrorClass::InvalidValue,
    }
}

impl DeviceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DeviceError::Transport(_) => ErrorClass::Transport,
            DeviceError::Frame(err) | DeviceError::Command { source: err, .. } => frame_class(err),
            DeviceError::HandshakeFailed(_) => ErrorClass::Rejected,
            DeviceError::InvalidValue { .. } => ErrorClass::InvalidValue,
            DeviceError::SessionClosed => ErrorClass::Session,
        }
    }

    /// Short tag naming the step that failed.
    pub fn location(&self) -> &'static str {
        match self {
            DeviceError::Transport(err) => err.location(),
            DeviceError::Frame(err) => err.location(),
            DeviceError::Command { source, .. } => source.location(),
            DeviceError::HandshakeFailed(_) => "handshake",
            DeviceError::InvalidValue { location, .. } => location,
            DeviceError::SessionClosed => "session",
        }
    }

    /// Whether the underlying failure is a transport timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            DeviceError::Transport(err) => err.is_timeout(),
            DeviceError::Frame(FrameError::Transport { source, .. })
            | DeviceError::Command {
                source: FrameError::Transport { source, .. },
                ..
            } => source.is_timeout(),
            DeviceError::Frame(FrameError::NotFound { .. })
            | DeviceError::Command {
                source: FrameError::NotFound { .. },
                ..
            } => true,
            _ => false,
        }
    }

    pub(crate) fn invalid(location: &'static str, value: impl ToString) -> Self {
        DeviceError::InvalidValue {
            location,
            value: value.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
