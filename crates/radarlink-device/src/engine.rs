use std::thread;
use std::time::Duration;

use radarlink_frame::FrameError;
use radarlink_transport::{Channel, DEFAULT_WAIT};
use tracing::{debug, warn};

use crate::error::{frame_class, DeviceError, Result};

/// Configuration for a [`CommandEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lower bound for the channel wait while a command is in flight.
    pub turnaround: Duration,
    /// Extra attempts after the first failure.
    pub max_retry: u32,
    /// Pause before each retry.
    pub retry_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            turnaround: DEFAULT_WAIT,
            max_retry: 1,
            retry_backoff: DEFAULT_WAIT,
        }
    }
}

/// One request/response exchange.
///
/// `receive` may run more than once when the engine retries, so receive
/// steps must not depend on state left over from an earlier attempt.
pub trait Exchange {
    /// Name used in logs and errors.
    fn describe(&self) -> String;

    /// Put the request on the wire.
    fn transmit(&self, channel: &mut Channel) -> std::result::Result<(), FrameError>;

    /// Match the reply.
    fn receive(&mut self, channel: &mut Channel) -> std::result::Result<(), FrameError>;
}

/// Pairs requests with their replies over a single [`Channel`].
///
/// Every attempt flushes stale input, sends the request, waits for the
/// transmission to complete and then matches the reply. Transport, malformed
/// and rejected failures are retried up to [`EngineConfig::max_retry`] times.
#[derive(Debug)]
pub struct CommandEngine {
    channel: Channel,
    config: EngineConfig,
}

impl CommandEngine {
    pub fn new(channel: Channel, config: EngineConfig) -> Self {
        Self { channel, config }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut Channel {
        &mut self.channel
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn into_channel(self) -> Channel {
        self.channel
    }

    /// Run `exchange` to completion, retrying transient failures.
    ///
    /// Capture mode is switched off first: replies must be read
    /// synchronously.
    pub fn execute<E: Exchange + ?Sized>(&mut self, exchange: &mut E) -> Result<()> {
        self.prepare()?;
        let command = exchange.describe();
        let attempts = self.config.max_retry + 1;

        let mut attempt = 1;
        loop {
            match self.attempt(exchange) {
                Ok(()) => {
                    debug!(%command, attempt, "command completed");
                    return Ok(());
                }
                Err((step, source))
                    if attempt < attempts && frame_class(&source).is_transient() =>
                {
                    warn!(%command, step, attempt, error = %source, "command failed, retrying");
                    thread::sleep(self.config.retry_backoff);
                    attempt += 1;
                }
                Err((step, source)) => {
                    debug!(%command, step, attempt, error = %source, "command failed");
                    return Err(DeviceError::Command {
                        command,
                        step,
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    /// Send the request of `exchange` without waiting for a reply.
    pub fn transmit_only<E: Exchange + ?Sized>(&mut self, exchange: &E) -> Result<()> {
        self.prepare()?;
        let command = exchange.describe();
        let fail = |step, source| DeviceError::Command {
            command: command.clone(),
            step,
            attempts: 1,
            source,
        };

        exchange
            .transmit(&mut self.channel)
            .map_err(|e| fail("send", e))?;
        self.channel
            .wait_all_sent()
            .map_err(|e| fail("wait_sent", e.into()))?;
        debug!(%command, "request sent without reply");
        Ok(())
    }

    fn prepare(&mut self) -> Result<()> {
        if self.channel.default_wait() < self.config.turnaround {
            self.channel.set_default_wait(self.config.turnaround);
        }
        self.channel.disable_capture()?;
        Ok(())
    }

    fn attempt<E: Exchange + ?Sized>(
        &mut self,
        exchange: &mut E,
    ) -> std::result::Result<(), (&'static str, FrameError)> {
        self.channel.flush().map_err(|e| ("flush", e.into()))?;
        exchange
            .transmit(&mut self.channel)
            .map_err(|e| ("send", e))?;
        self.channel
            .wait_all_sent()
            .map_err(|e| ("wait_sent", e.into()))?;
        exchange
            .receive(&mut self.channel)
            .map_err(|e| ("recv", e))
    }
}

/// Drop buffered input, then wait up to `timeout` for the device to start
/// talking again.
pub fn flush_and_wait(channel: &mut Channel, timeout: Duration) -> Result<()> {
    channel.flush()?;
    channel.peek_byte(Some(timeout))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_retries_once_after_turnaround() {
        let config = EngineConfig::default();
        assert_eq!(config.turnaround, Duration::from_millis(350));
        assert_eq!(config.max_retry, 1);
        assert_eq!(config.retry_backoff, Duration::from_millis(350));
    }
}
