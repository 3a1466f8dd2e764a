use std::time::Duration;

use radarlink_transport::{ChannelConfig, DEFAULT_WAIT};

use crate::engine::EngineConfig;
use crate::handshake::HandshakeConfig;

/// Configuration shared by the sensor drivers.
#[derive(Debug, Clone)]
pub struct SensorConfig {
    pub channel: ChannelConfig,
    pub engine: EngineConfig,
    pub handshake: HandshakeConfig,
    /// Capture ring size used while polling telemetry.
    pub capture_capacity: usize,
    /// Pause after a restart request before listening again.
    pub restart_settle: Duration,
    /// How long a restarted device may stay silent.
    pub restart_timeout: Duration,
    /// Channel wait while a factory reset is in progress.
    pub factory_reset_wait: Duration,
    /// Channel wait applied by `init` and telemetry polling.
    pub default_wait: Duration,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            engine: EngineConfig::default(),
            handshake: HandshakeConfig::default(),
            capture_capacity: 1024,
            restart_settle: Duration::from_secs(1),
            restart_timeout: Duration::from_secs(2),
            factory_reset_wait: Duration::from_millis(1000),
            default_wait: DEFAULT_WAIT,
        }
    }
}
