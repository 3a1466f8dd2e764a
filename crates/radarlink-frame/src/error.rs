use std::time::Duration;

use radarlink_transport::TransportError;

/// Errors that can occur while sending or receiving protocol units.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The byte channel failed underneath a combinator.
    #[error("{location}: {source}")]
    Transport {
        location: &'static str,
        #[source]
        source: TransportError,
    },

    /// Bytes on the wire differ from the expected constant.
    #[error("{location}: expected {expected:02x?}, found {found:02x?}")]
    Mismatch {
        location: &'static str,
        expected: Vec<u8>,
        found: Vec<u8>,
    },

    /// A pattern did not show up before the deadline or the end of payload.
    #[error("{location}: pattern not found within {waited:?}")]
    NotFound {
        location: &'static str,
        waited: Duration,
    },

    /// Structural problem with a frame (length, size accounting, layout).
    #[error("{location}: malformed frame: {reason}")]
    Malformed {
        location: &'static str,
        reason: String,
    },

    /// A read-until destination filled up before the delimiter appeared.
    #[error("{location}: destination full after {capacity} bytes")]
    Overrun {
        location: &'static str,
        capacity: usize,
    },

    /// The device answered with a non-zero status.
    #[error("{location}: command rejected by device (status {status})")]
    Rejected { location: &'static str, status: u16 },

    /// A received value is outside its accepted range.
    #[error("{location}: invalid value {value}")]
    InvalidValue {
        location: &'static str,
        value: String,
    },
}

impl FrameError {
    /// Short tag naming the step that failed.
    pub fn location(&self) -> &'static str {
        match self {
            FrameError::Transport { location, .. }
            | FrameError::Mismatch { location, .. }
            | FrameError::NotFound { location, .. }
            | FrameError::Malformed { location, .. }
            | FrameError::Overrun { location, .. }
            | FrameError::Rejected { location, .. }
            | FrameError::InvalidValue { location, .. } => location,
        }
    }

    /// Re-tag the error with the name of the enclosing step.
    pub fn at(mut self, tag: &'static str) -> Self {
        match &mut self {
            FrameError::Transport { location, .. }
            | FrameError::Mismatch { location, .. }
            | FrameError::NotFound { location, .. }
            | FrameError::Malformed { location, .. }
            | FrameError::Overrun { location, .. }
            | FrameError::Rejected { location, .. }
            | FrameError::InvalidValue { location, .. } => *location = tag,
        }
        self
    }

    pub fn malformed(location: &'static str, reason: impl Into<String>) -> Self {
        FrameError::Malformed {
            location,
            reason: reason.into(),
        }
    }

    pub fn invalid_value(location: &'static str, value: impl ToString) -> Self {
        FrameError::InvalidValue {
            location,
            value: value.to_string(),
        }
    }
}

impl From<TransportError> for FrameError {
    fn from(source: TransportError) -> Self {
        FrameError::Transport {
            location: source.location(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
