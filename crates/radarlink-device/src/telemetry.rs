//! Telemetry polling shared by the sensor drivers.

use std::str::FromStr;
use std::time::Duration;

use radarlink_transport::Channel;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{DeviceError, Result};

/// Most frames consumed by one draining poll.
pub const MAX_DRAIN_FRAMES: usize = 100;

/// How a telemetry poll treats frames that are already buffered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Drain {
    /// Wait for the next frame, trying up to `attempts` times.
    #[default]
    No,
    /// Read every buffered frame and keep the latest; wait like [`Drain::No`]
    /// when nothing is buffered.
    Try,
    /// Read every buffered frame and keep the latest; fail when nothing is
    /// buffered.
    Only,
}

impl FromStr for Drain {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "no" => Ok(Drain::No),
            "try" => Ok(Drain::Try),
            "only" => Ok(Drain::Only),
            other => Err(DeviceError::invalid("drain", other)),
        }
    }
}

/// Poll one telemetry frame with `read`.
///
/// `wait` is the channel wait used when not draining. `flush` discards
/// buffered input first and only applies to [`Drain::No`].
pub fn poll<T>(
    channel: &mut Channel,
    wait: Duration,
    attempts: u32,
    flush: bool,
    drain: Drain,
    read: &mut dyn FnMut(&mut Channel) -> Result<T>,
) -> Result<T> {
    if drain == Drain::No {
        return channel.with_wait(wait, |ch| -> Result<T> {
            if flush {
                ch.flush()?;
            }
            let attempts = attempts.max(1);
            let mut attempt = 1;
            loop {
                match read(ch) {
                    Ok(frame) => return Ok(frame),
                    Err(err) if attempt >= attempts => return Err(err),
                    Err(err) => {
                        trace!(attempt, error = %err, "telemetry read failed");
                        attempt += 1;
                    }
                }
            }
        });
    }

    let drained = channel.with_wait(Duration::ZERO, |ch| -> Result<T> {
        let mut latest = read(ch)?;
        let mut frames = 1;
        while frames < MAX_DRAIN_FRAMES {
            match read(ch) {
                Ok(frame) => {
                    latest = frame;
                    frames += 1;
                }
                Err(_) => break,
            }
        }
        trace!(frames, "drained telemetry");
        Ok(latest)
    });

    match drained {
        Err(err) if drain == Drain::Try => {
            trace!(error = %err, "nothing buffered, waiting for a frame");
            poll(channel, wait, attempts, flush, Drain::No, read)
        }
        other => other,
    }
}
