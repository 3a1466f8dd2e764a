use std::thread;
use std::time::Duration;

use radarlink_frame::{Arg, Recv};
use serde::Serialize;
use tracing::{debug, warn};

use crate::command::BinaryCommand;
use crate::engine::CommandEngine;
use crate::error::{DeviceError, Result};
use crate::opcode;

/// Configuration for entering command mode.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Protocol version requested from the device; the reply must echo it.
    pub protocol_version: u16,
    /// Pause between the wake frame and the real request.
    pub wake_delay: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            protocol_version: 1,
            wake_delay: Duration::from_millis(100),
        }
    }
}

/// What the device reports when it enters command mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandModeInfo {
    pub protocol_version: u16,
    pub buffer_size: u16,
}

/// Switch a binary-framed device into command mode.
///
/// A device busy streaming reports may miss the first request, so a wake
/// frame goes out first and its reply, if any, is flushed by the real
/// exchange. Command mode must be left with [`close_command_mode`].
pub fn open_command_mode(
    engine: &mut CommandEngine,
    config: &HandshakeConfig,
) -> Result<CommandModeInfo> {
    let wake = BinaryCommand::new(opcode::OPEN_COMMAND_MODE).arg(Arg::value(config.protocol_version));
    engine.transmit_only(&wake)?;
    thread::sleep(config.wake_delay);

    let mut info = CommandModeInfo {
        protocol_version: 0,
        buffer_size: 0,
    };
    {
        let mut cmd = BinaryCommand::new(opcode::OPEN_COMMAND_MODE)
            .arg(Arg::value(config.protocol_version))
            .recv(Recv::value(&mut info.protocol_version, "protocol_version"))
            .recv(Recv::value(&mut info.buffer_size, "buffer_size"));
        engine.execute(&mut cmd)?;
    }

    if info.protocol_version != config.protocol_version {
        return Err(DeviceError::HandshakeFailed(format!(
            "requested protocol version {}, device answered {}",
            config.protocol_version, info.protocol_version
        )));
    }

    debug!(
        protocol_version = info.protocol_version,
        buffer_size = info.buffer_size,
        "command mode opened"
    );
    Ok(info)
}

/// Leave command mode; the device resumes reporting.
pub fn close_command_mode(engine: &mut CommandEngine) -> Result<()> {
    engine.execute(&mut BinaryCommand::new(opcode::CLOSE_COMMAND_MODE))?;
    debug!("command mode closed");
    Ok(())
}

/// Run `body` inside command mode.
///
/// Closing is always attempted once the mode was entered. An error from
/// `body` takes precedence over an error from closing.
pub fn with_command_mode<T>(
    engine: &mut CommandEngine,
    config: &HandshakeConfig,
    body: impl FnOnce(&mut CommandEngine) -> Result<T>,
) -> Result<T> {
    open_command_mode(engine, config)?;
    let outcome = body(engine);
    let closed = close_command_mode(engine);
    let value = outcome?;
    closed?;
    Ok(value)
}

/// Run `body` inside command mode and finish with a restart request.
///
/// The restart takes the device out of command mode. When `body` or the
/// restart request fails, closing is attempted before the error is returned.
pub fn restart_from_command_mode(
    engine: &mut CommandEngine,
    config: &HandshakeConfig,
    body: impl FnOnce(&mut CommandEngine) -> Result<()>,
) -> Result<()> {
    open_command_mode(engine, config)?;
    let outcome = body(engine)
        .and_then(|()| engine.transmit_only(&BinaryCommand::new(opcode::RESTART)));
    if let Err(err) = outcome {
        if let Err(close) = close_command_mode(engine) {
            warn!(error = %close, "leaving command mode after a failed request");
        }
        return Err(err);
    }
    Ok(())
}
