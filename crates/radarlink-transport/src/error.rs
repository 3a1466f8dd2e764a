use std::time::Duration;

/// Errors that can occur on a byte channel.
///
/// Every variant carries the name of the step that failed so a failure deep
/// inside a command exchange can still be traced back to its origin.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the underlying port.
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    /// The operation did not complete before its wait elapsed.
    #[error("{location}: timed out after {waited:?}")]
    Timeout {
        location: &'static str,
        waited: Duration,
    },

    /// An I/O error occurred on the port.
    #[error("{location}: transport I/O error: {source}")]
    Io {
        location: &'static str,
        source: std::io::Error,
    },

    /// The link reached end-of-stream and no buffered bytes remain.
    #[error("{location}: link closed")]
    Closed { location: &'static str },
}

impl TransportError {
    /// Short tag naming the step that failed.
    pub fn location(&self) -> &'static str {
        match self {
            TransportError::Open { .. } => "open",
            TransportError::Timeout { location, .. }
            | TransportError::Io { location, .. }
            | TransportError::Closed { location } => location,
        }
    }

    /// Whether this error is a timeout rather than a hard I/O failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }

    pub(crate) fn io(location: &'static str, source: std::io::Error) -> Self {
        TransportError::Io { location, source }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
