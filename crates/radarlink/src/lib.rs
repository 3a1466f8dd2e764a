//! Serial-link protocol engine for mmWave radar sensors.
//!
//! radarlink talks to UART radar modules through a threaded byte channel,
//! composable protocol combinators and a retrying command engine, with
//! drivers for binary-framed (RD-03E / LD2412) and line-protocol (C4001)
//! sensors.
//!
//! # Crate Structure
//!
//! - [`transport`] — Byte channel, capture ring buffer and serial backend
//! - [`frame`] — Protocol combinators, binary frame codec and ASCII line codec
//! - [`device`] — Command engine, configuration sessions and sensor drivers

/// Re-export transport types.
pub mod transport {
    pub use radarlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use radarlink_frame::*;
}

/// Re-export device types.
pub mod device {
    pub use radarlink_device::*;
}
