//! Byte channel for UART-attached sensors.
//!
//! This is the lowest layer of radarlink. A [`Channel`] owns a duplex
//! [`Port`], runs its receive pump and transmit worker on dedicated threads,
//! and exposes blocking-with-timeout reads, single-byte lookahead and a
//! continuous capture mode backed by a [`CaptureRing`].

pub mod channel;
pub mod error;
pub mod port;
pub mod ring;

#[cfg(feature = "serial")]
pub mod serial;

pub use channel::{Channel, ChannelConfig, ChannelStats, DEFAULT_WAIT};
pub use error::{Result, TransportError};
pub use port::Port;
pub use ring::CaptureRing;

#[cfg(feature = "serial")]
pub use serial::{available_ports, open_serial, PortInfo};
