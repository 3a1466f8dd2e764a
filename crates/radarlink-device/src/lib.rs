//! Command engine, configuration sessions and drivers for mmWave radar
//! sensors.
//!
//! A [`CommandEngine`] owns a [`Channel`](radarlink_transport::Channel) and
//! pairs each request with its reply, retrying transient failures. Device
//! drivers build on it:
//! - [`BinarySensor`] for binary-framed sensors (RD-03E / LD2412)
//! - [`AsciiSensor`] for line-protocol sensors (DFRobot C4001)
//!
//! Configuration changes go through a [`Session`]: sampling is suspended,
//! setters collect changes, and `end` writes each touched group once in a
//! fixed order before resuming sampling.
//!
//! ```no_run
//! use radarlink_device::{BinarySensor, SensorConfig, SystemMode};
//!
//! # fn main() -> radarlink_device::Result<()> {
//! let mut sensor = BinarySensor::open("/dev/ttyUSB0", 256_000, SensorConfig::default())?;
//! sensor.init()?;
//! sensor
//!     .configure()
//!     .set_mode(SystemMode::Energy)
//!     .set_max_distance(8)
//!     .end()?;
//! # Ok(())
//! # }
//! ```

pub mod ascii;
pub mod binary;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod handshake;
pub mod opcode;
pub mod report;
pub mod session;
pub mod telemetry;

pub use ascii::{AsciiConfig, AsciiGroup, AsciiSensor, Latency, Range, Sensitivity};
pub use binary::{
    BaseParams, BaudRate, BinaryConfig, BinaryGroup, BinarySensor, DistanceResolution,
    FirmwareVersion, OutPinPolarity, SystemMode,
};
pub use command::{BinaryCommand, LineCommand};
pub use config::SensorConfig;
pub use engine::{flush_and_wait, CommandEngine, EngineConfig, Exchange};
pub use error::{frame_class, DeviceError, ErrorClass, Result};
pub use handshake::{
    close_command_mode, open_command_mode, restart_from_command_mode, with_command_mode,
    CommandModeInfo, HandshakeConfig,
};
pub use report::{EngineeringData, Presence, TargetReport, TargetState, GATES};
pub use session::{Configurable, Session, SessionState};
pub use telemetry::{poll, Drain};
