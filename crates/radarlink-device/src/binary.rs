//! Driver for binary-framed sensors (RD-03E / LD2412 family).

use std::fmt;
use std::thread;

use bytes::{BufMut, BytesMut};
use radarlink_frame::{Arg, Recv, Wire};
use radarlink_transport::Channel;
use serde::Serialize;
use tracing::{debug, info};

use crate::command::BinaryCommand;
use crate::config::SensorConfig;
use crate::engine::{flush_and_wait, CommandEngine};
use crate::error::{DeviceError, Result};
use crate::handshake::{
    close_command_mode, open_command_mode, restart_from_command_mode, with_command_mode,
};
use crate::opcode;
use crate::report::{self, TargetReport, GATES};
use crate::session::{Configurable, Session};
use crate::telemetry::{self, Drain};

/// Highest addressable gate.
pub const MAX_GATE: u8 = (GATES - 1) as u8;
/// Highest accepted energy threshold.
pub const MAX_THRESHOLD: u8 = 100;

const VERSION_MARKER: u16 = 0x2412;
const MAC_SELECTOR: u16 = 0x0001;

/// Firmware version reported by the sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub misc: u32,
}

impl Wire for FirmwareVersion {
    const SIZE: usize = 6;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.minor);
        dst.put_u8(self.major);
        dst.put_u32_le(self.misc);
    }

    fn decode(src: &[u8]) -> Self {
        Self {
            minor: src[0],
            major: src[1],
            misc: u32::decode(&src[2..6]),
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.misc)
    }
}

/// What the sensor reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemMode {
    /// Target state and distances only.
    #[default]
    Simple,
    /// Engineering mode: adds per-gate energies.
    Energy,
}

/// Length of one distance gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum DistanceResolution {
    #[default]
    #[serde(rename = "0.75m")]
    Gate75cm,
    #[serde(rename = "0.5m")]
    Gate50cm,
    #[serde(rename = "0.2m")]
    Gate20cm,
}

impl DistanceResolution {
    pub fn from_index(index: u16) -> Option<Self> {
        match index {
            0 => Some(DistanceResolution::Gate75cm),
            1 => Some(DistanceResolution::Gate50cm),
            3 => Some(DistanceResolution::Gate20cm),
            _ => None,
        }
    }

    pub fn index(self) -> u16 {
        match self {
            DistanceResolution::Gate75cm => 0,
            DistanceResolution::Gate50cm => 1,
            DistanceResolution::Gate20cm => 3,
        }
    }

    /// Gate length in metres.
    pub fn gate_length(self) -> f32 {
        match self {
            DistanceResolution::Gate75cm => 0.75,
            DistanceResolution::Gate50cm => 0.5,
            DistanceResolution::Gate20cm => 0.2,
        }
    }
}

/// Level of the output pin while a target is present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutPinPolarity {
    #[default]
    HighOnPresence,
    LowOnPresence,
}

/// Gate range, presence timeout and output polarity, written as one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BaseParams {
    pub min_gate: u8,
    pub max_gate: u8,
    /// Seconds a target stays reported after it was last seen.
    pub timeout: u16,
    pub polarity: OutPinPolarity,
}

impl Default for BaseParams {
    fn default() -> Self {
        Self {
            min_gate: 1,
            max_gate: 12,
            timeout: 5,
            polarity: OutPinPolarity::HighOnPresence,
        }
    }
}

impl Wire for BaseParams {
    const SIZE: usize = 5;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.min_gate);
        dst.put_u8(self.max_gate);
        dst.put_u16_le(self.timeout);
        dst.put_u8(match self.polarity {
            OutPinPolarity::HighOnPresence => 0,
            OutPinPolarity::LowOnPresence => 1,
        });
    }

    fn decode(src: &[u8]) -> Self {
        Self {
            min_gate: src[0],
            max_gate: src[1],
            timeout: u16::decode(&src[2..4]),
            polarity: match src[4] {
                0 => OutPinPolarity::HighOnPresence,
                _ => OutPinPolarity::LowOnPresence,
            },
        }
    }
}

/// UART rates the sensor can switch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BaudRate {
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
    B230400,
    B256000,
    B460800,
}

impl BaudRate {
    const ALL: [BaudRate; 8] = [
        BaudRate::B9600,
        BaudRate::B19200,
        BaudRate::B38400,
        BaudRate::B57600,
        BaudRate::B115200,
        BaudRate::B230400,
        BaudRate::B256000,
        BaudRate::B460800,
    ];

    pub fn from_bps(bps: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|rate| rate.bps() == bps)
    }

    pub fn bps(self) -> u32 {
        match self {
            BaudRate::B9600 => 9_600,
            BaudRate::B19200 => 19_200,
            BaudRate::B38400 => 38_400,
            BaudRate::B57600 => 57_600,
            BaudRate::B115200 => 115_200,
            BaudRate::B230400 => 230_400,
            BaudRate::B256000 => 256_000,
            BaudRate::B460800 => 460_800,
        }
    }

    /// Wire index, starting at 1.
    pub fn index(self) -> u16 {
        Self::ALL
            .iter()
            .position(|rate| *rate == self)
            .map_or(0, |i| i as u16 + 1)
    }
}

/// Cached configuration of a binary sensor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BinaryConfig {
    pub mode: SystemMode,
    pub resolution: DistanceResolution,
    pub base: BaseParams,
    pub move_thresholds: [u8; GATES],
    pub still_thresholds: [u8; GATES],
}

/// Groups written by one batched command each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryGroup {
    Mode,
    Resolution,
    Base,
    MoveThresholds,
    StillThresholds,
}

/// A binary-framed radar sensor.
#[derive(Debug)]
pub struct BinarySensor {
    engine: CommandEngine,
    config: SensorConfig,
    snapshot: BinaryConfig,
    version: Option<FirmwareVersion>,
    mac: Option<[u8; 6]>,
    last_report: Option<TargetReport>,
    background_analysis: bool,
}

impl BinarySensor {
    pub fn new(channel: Channel, config: SensorConfig) -> Self {
        Self {
            engine: CommandEngine::new(channel, config.engine.clone()),
            config,
            snapshot: BinaryConfig::default(),
            version: None,
            mac: None,
            last_report: None,
            background_analysis: false,
        }
    }

    /// Open `path` at `baud` (8N1, no flow control).
    #[cfg(feature = "serial")]
    pub fn open(path: &str, baud: u32, config: SensorConfig) -> Result<Self> {
        let channel = radarlink_transport::open_serial(path, baud, config.channel.clone())?;
        Ok(Self::new(channel, config))
    }

    /// Apply the default wait and load the configuration from the sensor.
    pub fn init(&mut self) -> Result<()> {
        self.engine
            .channel_mut()
            .set_default_wait(self.config.default_wait);
        self.reload_config()?;
        info!(
            port = %self.engine.channel().name(),
            version = %self.version.unwrap_or_default(),
            "binary sensor initialised"
        );
        Ok(())
    }

    /// Re-read version, configuration and MAC address.
    ///
    /// The snapshot is only replaced once every read succeeded.
    pub fn reload_config(&mut self) -> Result<()> {
        let mode = self.snapshot.mode;
        let (version, snapshot, mac) =
            with_command_mode(&mut self.engine, &self.config.handshake, |engine| {
                let version = read_version(engine)?;
                let base = read_base(engine)?;
                let resolution = read_resolution(engine)?;
                let move_thresholds = read_thresholds(engine, opcode::READ_MOVE_THRESHOLDS)?;
                let still_thresholds = read_thresholds(engine, opcode::READ_STILL_THRESHOLDS)?;
                let mac = read_mac(engine)?;
                let snapshot = BinaryConfig {
                    mode,
                    resolution,
                    base,
                    move_thresholds,
                    still_thresholds,
                };
                Ok((version, snapshot, mac))
            })?;

        debug!(?snapshot, %version, "configuration loaded");
        self.version = Some(version);
        self.snapshot = snapshot;
        self.mac = Some(mac);
        Ok(())
    }

    /// Reboot the sensor and wait for it to come back.
    pub fn restart(&mut self) -> Result<()> {
        self.engine
            .channel_mut()
            .set_default_wait(self.config.default_wait);
        restart_from_command_mode(&mut self.engine, &self.config.handshake, |_| Ok(()))?;
        self.recover()?;
        info!(port = %self.engine.channel().name(), "sensor restarted");
        Ok(())
    }

    /// Restore factory settings, reboot and reload the configuration.
    ///
    /// The longer factory-reset wait only applies to the reset request; the
    /// default wait is back in place whether or not the request succeeds.
    pub fn factory_reset(&mut self) -> Result<()> {
        self.engine
            .channel_mut()
            .set_default_wait(self.config.factory_reset_wait);
        let outcome = restart_from_command_mode(&mut self.engine, &self.config.handshake, |engine| {
            engine.execute(&mut BinaryCommand::new(opcode::FACTORY_RESET))
        });
        self.engine
            .channel_mut()
            .set_default_wait(self.config.default_wait);
        outcome?;
        self.recover()?;
        self.reload_config()?;
        info!(port = %self.engine.channel().name(), "sensor reset to factory settings");
        Ok(())
    }

    /// Switch the Bluetooth radio; takes effect after the restart done here.
    pub fn set_bluetooth(&mut self, on: bool) -> Result<()> {
        self.engine
            .channel_mut()
            .set_default_wait(self.config.default_wait);
        restart_from_command_mode(&mut self.engine, &self.config.handshake, |engine| {
            engine.execute(&mut BinaryCommand::new(opcode::BLUETOOTH).arg(Arg::value(u16::from(on))))
        })?;
        self.recover()?;
        self.reload_config()?;
        info!(on, "bluetooth switched");
        Ok(())
    }

    /// Change the sensor's UART rate and restart it.
    ///
    /// The sensor comes back at the new rate, so the port has to be reopened
    /// at `rate` before talking to it again.
    pub fn set_baud_rate(&mut self, rate: BaudRate) -> Result<()> {
        restart_from_command_mode(&mut self.engine, &self.config.handshake, |engine| {
            engine.execute(
                &mut BinaryCommand::new(opcode::SET_BAUD_RATE).arg(Arg::value(rate.index())),
            )
        })?;
        info!(bps = rate.bps(), "baud rate changed, sensor restarting");
        Ok(())
    }

    /// Start dynamic background analysis.
    pub fn start_background_analysis(&mut self) -> Result<()> {
        with_command_mode(&mut self.engine, &self.config.handshake, |engine| {
            engine.execute(&mut BinaryCommand::new(opcode::START_BACKGROUND_ANALYSIS))
        })?;
        self.background_analysis = true;
        Ok(())
    }

    /// Whether background analysis is still running.
    ///
    /// Only asks the sensor while a started analysis hasn't been seen to
    /// finish.
    pub fn background_analysis_running(&mut self) -> Result<bool> {
        if self.background_analysis {
            let mut active = 0u16;
            with_command_mode(&mut self.engine, &self.config.handshake, |engine| {
                engine.execute(
                    &mut BinaryCommand::new(opcode::QUERY_BACKGROUND_ANALYSIS)
                        .recv(Recv::value(&mut active, "active")),
                )
            })?;
            self.background_analysis = active != 0;
        }
        Ok(self.background_analysis)
    }

    /// Poll one target report.
    pub fn try_read_frame(&mut self, attempts: u32, flush: bool, drain: Drain) -> Result<TargetReport> {
        let channel = self.engine.channel_mut();
        channel.enable_capture(self.config.capture_capacity);
        let report = telemetry::poll(
            channel,
            self.config.default_wait,
            attempts,
            flush,
            drain,
            &mut |ch: &mut Channel| -> Result<TargetReport> { Ok(report::read_report(ch)?) },
        )?;
        self.last_report = Some(report.clone());
        Ok(report)
    }

    /// Start a configuration session; sampling stops until it ends.
    pub fn configure(&mut self) -> Session<'_, Self> {
        Session::open(self)
    }

    pub fn version(&self) -> Option<FirmwareVersion> {
        self.version
    }

    pub fn mac(&self) -> Option<[u8; 6]> {
        self.mac
    }

    /// MAC address as colon-separated hex.
    pub fn mac_string(&self) -> Option<String> {
        self.mac.map(|mac| {
            mac.iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(":")
        })
    }

    pub fn config(&self) -> &BinaryConfig {
        &self.snapshot
    }

    pub fn mode(&self) -> SystemMode {
        self.snapshot.mode
    }

    pub fn resolution(&self) -> DistanceResolution {
        self.snapshot.resolution
    }

    pub fn min_gate(&self) -> u8 {
        self.snapshot.base.min_gate
    }

    pub fn max_gate(&self) -> u8 {
        self.snapshot.base.max_gate
    }

    /// Near edge of the detection range in metres.
    pub fn min_distance_m(&self) -> f32 {
        f32::from(self.min_gate()) * self.snapshot.resolution.gate_length()
    }

    /// Far edge of the detection range in metres.
    pub fn max_distance_m(&self) -> f32 {
        f32::from(self.max_gate()) * self.snapshot.resolution.gate_length()
    }

    /// Presence timeout in seconds.
    pub fn timeout(&self) -> u16 {
        self.snapshot.base.timeout
    }

    pub fn out_pin_polarity(&self) -> OutPinPolarity {
        self.snapshot.base.polarity
    }

    pub fn move_threshold(&self, gate: u8) -> Option<u8> {
        self.snapshot.move_thresholds.get(usize::from(gate)).copied()
    }

    pub fn still_threshold(&self, gate: u8) -> Option<u8> {
        self.snapshot.still_thresholds.get(usize::from(gate)).copied()
    }

    pub fn last_report(&self) -> Option<&TargetReport> {
        self.last_report.as_ref()
    }

    pub fn channel(&self) -> &Channel {
        self.engine.channel()
    }

    pub fn channel_mut(&mut self) -> &mut Channel {
        self.engine.channel_mut()
    }

    /// Wait out a restart and put the sensor back in the mode it had.
    fn recover(&mut self) -> Result<()> {
        thread::sleep(self.config.restart_settle);
        flush_and_wait(self.engine.channel_mut(), self.config.restart_timeout)?;
        if self.snapshot.mode == SystemMode::Energy {
            debug!("re-entering engineering mode after restart");
            let mut session = self.configure();
            session.set_mode(SystemMode::Energy);
            session.end()?;
        }
        Ok(())
    }
}

fn read_version(engine: &mut CommandEngine) -> Result<FirmwareVersion> {
    let mut version = FirmwareVersion::default();
    engine.execute(
        &mut BinaryCommand::new(opcode::READ_VERSION)
            .recv(Recv::expect(VERSION_MARKER.to_le_bytes().to_vec(), "version_marker"))
            .recv(Recv::value(&mut version, "version")),
    )?;
    Ok(version)
}

fn read_base(engine: &mut CommandEngine) -> Result<BaseParams> {
    let mut base = BaseParams::default();
    engine.execute(
        &mut BinaryCommand::new(opcode::READ_BASE_PARAMS).recv(Recv::value(&mut base, "base")),
    )?;
    Ok(base)
}

fn read_resolution(engine: &mut CommandEngine) -> Result<DistanceResolution> {
    let mut index = 0u16;
    engine.execute(
        &mut BinaryCommand::new(opcode::READ_DISTANCE_RESOLUTION)
            .recv(Recv::checked(
                &mut index,
                |i: &u16| DistanceResolution::from_index(*i).is_some(),
                "resolution",
            ))
            .recv(Recv::skip(4)),
    )?;
    DistanceResolution::from_index(index).ok_or_else(|| DeviceError::invalid("resolution", index))
}

fn read_thresholds(engine: &mut CommandEngine, opcode: u16) -> Result<[u8; GATES]> {
    let mut table = [0u8; GATES];
    engine.execute(
        &mut BinaryCommand::new(opcode).recv(Recv::checked(
            &mut table,
            |t: &[u8; GATES]| t.iter().all(|v| *v <= MAX_THRESHOLD),
            "thresholds",
        )),
    )?;
    Ok(table)
}

fn read_mac(engine: &mut CommandEngine) -> Result<[u8; 6]> {
    let mut mac = [0u8; 6];
    engine.execute(
        &mut BinaryCommand::new(opcode::READ_MAC)
            .arg(Arg::value(MAC_SELECTOR))
            .recv(Recv::value(&mut mac, "mac")),
    )?;
    Ok(mac)
}

/// Store the read-back value and fail if it differs from what was written.
fn confirm<T: PartialEq + fmt::Debug>(slot: &mut T, desired: &T, read: T) -> Result<()> {
    let outcome = if read == *desired {
        Ok(())
    } else {
        Err(DeviceError::invalid(
            "readback",
            format!("wrote {desired:?}, sensor reports {read:?}"),
        ))
    };
    *slot = read;
    outcome
}

impl Configurable for BinarySensor {
    type Snapshot = BinaryConfig;
    type Group = BinaryGroup;

    const COMMIT_ORDER: &'static [BinaryGroup] = &[
        BinaryGroup::Mode,
        BinaryGroup::Resolution,
        BinaryGroup::Base,
        BinaryGroup::MoveThresholds,
        BinaryGroup::StillThresholds,
    ];

    fn snapshot(&self) -> &BinaryConfig {
        &self.snapshot
    }

    /// Sampling stops while the sensor is in command mode.
    fn suspend(&mut self) -> Result<()> {
        open_command_mode(&mut self.engine, &self.config.handshake).map(|_| ())
    }

    fn resume(&mut self) -> Result<()> {
        close_command_mode(&mut self.engine)
    }

    fn write_group(&mut self, group: BinaryGroup, desired: &BinaryConfig) -> Result<()> {
        let engine = &mut self.engine;
        match group {
            BinaryGroup::Mode => {
                let op = match desired.mode {
                    SystemMode::Energy => opcode::ENTER_ENGINEERING,
                    SystemMode::Simple => opcode::LEAVE_ENGINEERING,
                };
                engine.execute(&mut BinaryCommand::new(op))?;
                self.snapshot.mode = desired.mode;
            }
            BinaryGroup::Resolution => {
                engine.execute(
                    &mut BinaryCommand::new(opcode::SET_DISTANCE_RESOLUTION)
                        .arg(Arg::value(desired.resolution.index()))
                        .arg(Arg::value([0u8; 4])),
                )?;
                self.snapshot.resolution = desired.resolution;
                let read = read_resolution(engine)?;
                confirm(&mut self.snapshot.resolution, &desired.resolution, read)?;
            }
            BinaryGroup::Base => {
                engine.execute(
                    &mut BinaryCommand::new(opcode::WRITE_BASE_PARAMS).arg(Arg::value(desired.base)),
                )?;
                self.snapshot.base = desired.base;
                let read = read_base(engine)?;
                confirm(&mut self.snapshot.base, &desired.base, read)?;
            }
            BinaryGroup::MoveThresholds => {
                engine.execute(
                    &mut BinaryCommand::new(opcode::SET_MOVE_THRESHOLDS)
                        .arg(Arg::value(desired.move_thresholds)),
                )?;
                self.snapshot.move_thresholds = desired.move_thresholds;
                let read = read_thresholds(engine, opcode::READ_MOVE_THRESHOLDS)?;
                confirm(&mut self.snapshot.move_thresholds, &desired.move_thresholds, read)?;
            }
            BinaryGroup::StillThresholds => {
                engine.execute(
                    &mut BinaryCommand::new(opcode::SET_STILL_THRESHOLDS)
                        .arg(Arg::value(desired.still_thresholds)),
                )?;
                self.snapshot.still_thresholds = desired.still_thresholds;
                let read = read_thresholds(engine, opcode::READ_STILL_THRESHOLDS)?;
                confirm(&mut self.snapshot.still_thresholds, &desired.still_thresholds, read)?;
            }
        }
        Ok(())
    }
}

fn check_gate(location: &'static str, gate: u8) -> Result<()> {
    if gate > MAX_GATE {
        return Err(DeviceError::invalid(location, gate));
    }
    Ok(())
}

fn check_threshold(value: u8) -> Result<()> {
    if value > MAX_THRESHOLD {
        return Err(DeviceError::invalid("threshold", value));
    }
    Ok(())
}

impl Session<'_, BinarySensor> {
    pub fn set_mode(&mut self, mode: SystemMode) -> &mut Self {
        self.update(BinaryGroup::Mode, |c| {
            c.mode = mode;
            Ok(())
        })
    }

    pub fn set_distance_resolution(&mut self, resolution: DistanceResolution) -> &mut Self {
        self.update(BinaryGroup::Resolution, |c| {
            c.resolution = resolution;
            Ok(())
        })
    }

    /// Nearest gate that reports targets.
    pub fn set_min_distance(&mut self, gate: u8) -> &mut Self {
        self.update(BinaryGroup::Base, |c| {
            check_gate("min_gate", gate)?;
            if gate > c.base.max_gate {
                return Err(DeviceError::invalid(
                    "min_gate",
                    format!("{gate} beyond max gate {}", c.base.max_gate),
                ));
            }
            c.base.min_gate = gate;
            Ok(())
        })
    }

    /// Farthest gate that reports targets.
    pub fn set_max_distance(&mut self, gate: u8) -> &mut Self {
        self.update(BinaryGroup::Base, |c| {
            check_gate("max_gate", gate)?;
            if gate < c.base.min_gate {
                return Err(DeviceError::invalid(
                    "max_gate",
                    format!("{gate} below min gate {}", c.base.min_gate),
                ));
            }
            c.base.max_gate = gate;
            Ok(())
        })
    }

    /// Presence timeout in seconds.
    pub fn set_timeout(&mut self, seconds: u16) -> &mut Self {
        self.update(BinaryGroup::Base, |c| {
            c.base.timeout = seconds;
            Ok(())
        })
    }

    pub fn set_out_pin_polarity(&mut self, polarity: OutPinPolarity) -> &mut Self {
        self.update(BinaryGroup::Base, |c| {
            c.base.polarity = polarity;
            Ok(())
        })
    }

    pub fn set_move_threshold(&mut self, gate: u8, value: u8) -> &mut Self {
        self.update(BinaryGroup::MoveThresholds, |c| {
            check_gate("gate", gate)?;
            check_threshold(value)?;
            c.move_thresholds[usize::from(gate)] = value;
            Ok(())
        })
    }

    pub fn set_still_threshold(&mut self, gate: u8, value: u8) -> &mut Self {
        self.update(BinaryGroup::StillThresholds, |c| {
            check_gate("gate", gate)?;
            check_threshold(value)?;
            c.still_thresholds[usize::from(gate)] = value;
            Ok(())
        })
    }
}
