//! Driver for line-protocol sensors (DFRobot C4001).
//!
//! Every command is one text line answered by optional reply lines and a
//! final `Done` or `Error`. Getters answer with `Response <values>`.

use std::fmt;
use std::str::FromStr;
use std::thread;

use radarlink_frame::{Arg, Recv, MAX_LINE};
use radarlink_transport::Channel;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::command::LineCommand;
use crate::config::SensorConfig;
use crate::engine::{flush_and_wait, CommandEngine};
use crate::error::{DeviceError, Result};
use crate::report::{self, Presence};
use crate::session::{Configurable, Session};
use crate::telemetry::{self, Drain};

const LABEL_RESPONSE: &[u8] = b"Response ";
const LABEL_HW_VERSION: &[u8] = b"HardwareVersion:";
const LABEL_SW_VERSION: &[u8] = b"SoftwareVersion:";

/// Largest difference between a written and a read-back distance or delay.
pub const READBACK_TOLERANCE: f32 = 1e-3;

pub const MIN_DISTANCE_M: f32 = 0.6;
pub const MAX_DISTANCE_M: f32 = 25.0;

/// Detection range in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Range {
    pub from: f32,
    pub to: f32,
}

/// Delays in seconds before presence is reported and cleared.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Latency {
    pub detect: f32,
    pub clear: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Sensitivity {
    pub detect: u8,
    pub hold: u8,
}

/// Cached configuration of an ASCII sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AsciiConfig {
    pub range: Range,
    /// Trigger distance in metres.
    pub trigger: f32,
    pub latency: Latency,
    pub sensitivity: Sensitivity,
    /// Seconds the output stays inhibited after presence clears.
    pub inhibit: f32,
}

impl Default for AsciiConfig {
    fn default() -> Self {
        Self {
            range: Range { from: 0.6, to: 6.0 },
            trigger: 6.0,
            latency: Latency {
                detect: 0.0,
                clear: 0.5,
            },
            sensitivity: Sensitivity { detect: 7, hold: 7 },
            inhibit: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsciiGroup {
    Range,
    Trigger,
    Latency,
    Sensitivity,
    Inhibit,
}

trait Approx {
    fn approx(&self, other: &Self) -> bool;
}

impl Approx for f32 {
    fn approx(&self, other: &Self) -> bool {
        (self - other).abs() <= READBACK_TOLERANCE
    }
}

impl Approx for Range {
    fn approx(&self, other: &Self) -> bool {
        self.from.approx(&other.from) && self.to.approx(&other.to)
    }
}

impl Approx for Latency {
    fn approx(&self, other: &Self) -> bool {
        self.detect.approx(&other.detect) && self.clear.approx(&other.clear)
    }
}

impl Approx for Sensitivity {
    fn approx(&self, other: &Self) -> bool {
        self == other
    }
}

/// A C4001 presence sensor.
#[derive(Debug)]
pub struct AsciiSensor {
    engine: CommandEngine,
    config: SensorConfig,
    snapshot: AsciiConfig,
    hw_version: Option<String>,
    sw_version: Option<String>,
    last_presence: Option<Presence>,
}

impl AsciiSensor {
    pub fn new(channel: Channel, config: SensorConfig) -> Self {
        Self {
            engine: CommandEngine::new(channel, config.engine.clone()),
            config,
            snapshot: AsciiConfig::default(),
            hw_version: None,
            sw_version: None,
            last_presence: None,
        }
    }

    /// Open `path` at `baud` (8N1, no flow control).
    #[cfg(feature = "serial")]
    pub fn open(path: &str, baud: u32, config: SensorConfig) -> Result<Self> {
        let channel = radarlink_transport::open_serial(path, baud, config.channel.clone())?;
        Ok(Self::new(channel, config))
    }

    pub fn init(&mut self) -> Result<()> {
        self.engine
            .channel_mut()
            .set_default_wait(self.config.default_wait);
        self.reload_config()?;
        info!(
            port = %self.engine.channel().name(),
            hw = self.hw_version.as_deref().unwrap_or(""),
            sw = self.sw_version.as_deref().unwrap_or(""),
            "ascii sensor initialised"
        );
        Ok(())
    }

    /// Stop the sensor, read versions and configuration, start it again.
    ///
    /// The sensor is restarted even when a read fails.
    pub fn reload_config(&mut self) -> Result<()> {
        stop(&mut self.engine)?;
        let loaded = read_all(&mut self.engine);
        let started = start(&mut self.engine);
        let (hw, sw, snapshot) = loaded?;
        started?;

        debug!(?snapshot, "configuration loaded");
        self.hw_version = Some(hw);
        self.sw_version = Some(sw);
        self.snapshot = snapshot;
        Ok(())
    }

    /// Reboot the sensor, wait for it and reload the configuration.
    pub fn restart(&mut self) -> Result<()> {
        self.engine
            .transmit_only(&LineCommand::new("resetSystem"))?;
        thread::sleep(self.config.restart_settle);
        flush_and_wait(self.engine.channel_mut(), self.config.restart_timeout)?;
        self.reload_config()?;
        info!(port = %self.engine.channel().name(), "sensor restarted");
        Ok(())
    }

    /// Restore factory settings, then restart.
    pub fn factory_reset(&mut self) -> Result<()> {
        let wait = self.config.factory_reset_wait;
        self.engine.channel_mut().set_default_wait(wait);
        let outcome = stop(&mut self.engine)
            .and_then(|()| self.engine.execute(&mut LineCommand::new("resetCfg")));
        self.engine
            .channel_mut()
            .set_default_wait(self.config.default_wait);
        outcome?;
        self.restart()?;
        info!(port = %self.engine.channel().name(), "sensor reset to factory settings");
        Ok(())
    }

    /// Poll one presence line.
    pub fn try_read_frame(&mut self, attempts: u32, flush: bool, drain: Drain) -> Result<Presence> {
        let channel = self.engine.channel_mut();
        channel.enable_capture(self.config.capture_capacity);
        let presence = telemetry::poll(
            channel,
            self.config.default_wait,
            attempts,
            flush,
            drain,
            &mut |ch: &mut Channel| -> Result<Presence> { Ok(report::read_presence(ch)?) },
        )?;
        self.last_presence = Some(presence);
        Ok(presence)
    }

    /// Start a configuration session; the sensor is stopped until it ends.
    pub fn configure(&mut self) -> Session<'_, Self> {
        Session::open(self)
    }

    pub fn config(&self) -> &AsciiConfig {
        &self.snapshot
    }

    pub fn range_from(&self) -> f32 {
        self.snapshot.range.from
    }

    pub fn range_to(&self) -> f32 {
        self.snapshot.range.to
    }

    pub fn trigger_distance(&self) -> f32 {
        self.snapshot.trigger
    }

    pub fn detect_latency(&self) -> f32 {
        self.snapshot.latency.detect
    }

    pub fn clear_latency(&self) -> f32 {
        self.snapshot.latency.clear
    }

    pub fn detect_sensitivity(&self) -> u8 {
        self.snapshot.sensitivity.detect
    }

    pub fn hold_sensitivity(&self) -> u8 {
        self.snapshot.sensitivity.hold
    }

    pub fn inhibit(&self) -> f32 {
        self.snapshot.inhibit
    }

    pub fn hw_version(&self) -> Option<&str> {
        self.hw_version.as_deref()
    }

    pub fn sw_version(&self) -> Option<&str> {
        self.sw_version.as_deref()
    }

    pub fn last_presence(&self) -> Option<Presence> {
        self.last_presence
    }

    pub fn channel(&self) -> &Channel {
        self.engine.channel()
    }

    pub fn channel_mut(&mut self) -> &mut Channel {
        self.engine.channel_mut()
    }
}

fn stop(engine: &mut CommandEngine) -> Result<()> {
    engine.execute(&mut LineCommand::new("sensorStop"))
}

fn start(engine: &mut CommandEngine) -> Result<()> {
    engine.execute(&mut LineCommand::new("sensorStart"))
}

fn read_all(engine: &mut CommandEngine) -> Result<(String, String, AsciiConfig)> {
    let hw = read_line(engine, "getHWV", LABEL_HW_VERSION)?;
    let sw = read_line(engine, "getSWV", LABEL_SW_VERSION)?;
    let [from, to] = read_values(engine, "getRange")?;
    let [trigger] = read_values(engine, "getTrigRange")?;
    let [detect, clear] = read_values(engine, "getLatency")?;
    let [detect_sens, hold_sens] = read_values(engine, "getSensitivity")?;
    let [inhibit] = read_values(engine, "getInhibit")?;
    let snapshot = AsciiConfig {
        range: Range { from, to },
        trigger,
        latency: Latency { detect, clear },
        sensitivity: Sensitivity {
            detect: detect_sens,
            hold: hold_sens,
        },
        inhibit,
    };
    Ok((hw, sw, snapshot))
}

/// Run `command` and return the text after `label` up to the line end.
fn read_line(engine: &mut CommandEngine, command: &'static str, label: &'static [u8]) -> Result<String> {
    let mut text = Vec::new();
    engine.execute(
        &mut LineCommand::new(command).reply(label, [Recv::until(&mut text, b'\r', MAX_LINE, "reply")]),
    )?;
    Ok(String::from_utf8_lossy(&text).trim().to_string())
}

fn read_values<T, const N: usize>(engine: &mut CommandEngine, command: &'static str) -> Result<[T; N]>
where
    T: FromStr + Default + Copy,
{
    let text = read_line(engine, command, LABEL_RESPONSE)?;
    parse_values(command, &text)
}

/// Parse the first `N` whitespace-separated values of a reply.
fn parse_values<T, const N: usize>(location: &'static str, text: &str) -> Result<[T; N]>
where
    T: FromStr + Default + Copy,
{
    let mut values = [T::default(); N];
    let mut words = text.split_whitespace();
    for value in values.iter_mut() {
        *value = words
            .next()
            .and_then(|w| w.parse().ok())
            .ok_or_else(|| DeviceError::invalid(location, text))?;
    }
    Ok(values)
}

/// Store the read-back value and fail if it is not close to what was written.
fn confirm<T: Approx + fmt::Debug>(slot: &mut T, desired: &T, read: T) -> Result<()> {
    let outcome = if read.approx(desired) {
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

impl Configurable for AsciiSensor {
    type Snapshot = AsciiConfig;
    type Group = AsciiGroup;

    const COMMIT_ORDER: &'static [AsciiGroup] = &[
        AsciiGroup::Range,
        AsciiGroup::Trigger,
        AsciiGroup::Latency,
        AsciiGroup::Sensitivity,
        AsciiGroup::Inhibit,
    ];

    fn snapshot(&self) -> &AsciiConfig {
        &self.snapshot
    }

    fn suspend(&mut self) -> Result<()> {
        stop(&mut self.engine)
    }

    fn resume(&mut self) -> Result<()> {
        start(&mut self.engine)
    }

    fn write_group(&mut self, group: AsciiGroup, desired: &AsciiConfig) -> Result<()> {
        let engine = &mut self.engine;
        match group {
            AsciiGroup::Range => {
                engine.execute(
                    &mut LineCommand::new("setRange")
                        .arg(Arg::decimal(desired.range.from))
                        .arg(Arg::decimal(desired.range.to)),
                )?;
                self.snapshot.range = desired.range;
                let [from, to] = read_values(engine, "getRange")?;
                confirm(&mut self.snapshot.range, &desired.range, Range { from, to })?;
            }
            AsciiGroup::Trigger => {
                engine.execute(
                    &mut LineCommand::new("setTrigRange").arg(Arg::decimal(desired.trigger)),
                )?;
                self.snapshot.trigger = desired.trigger;
                let [trigger] = read_values(engine, "getTrigRange")?;
                confirm(&mut self.snapshot.trigger, &desired.trigger, trigger)?;
            }
            AsciiGroup::Latency => {
                engine.execute(
                    &mut LineCommand::new("setLatency")
                        .arg(Arg::decimal(desired.latency.detect))
                        .arg(Arg::decimal(desired.latency.clear)),
                )?;
                self.snapshot.latency = desired.latency;
                let [detect, clear] = read_values(engine, "getLatency")?;
                confirm(&mut self.snapshot.latency, &desired.latency, Latency { detect, clear })?;
            }
            AsciiGroup::Sensitivity => {
                engine.execute(
                    &mut LineCommand::new("setSensitivity")
                        .arg(Arg::display(desired.sensitivity.detect))
                        .arg(Arg::display(desired.sensitivity.hold)),
                )?;
                self.snapshot.sensitivity = desired.sensitivity;
                let [detect, hold] = read_values(engine, "getSensitivity")?;
                confirm(
                    &mut self.snapshot.sensitivity,
                    &desired.sensitivity,
                    Sensitivity { detect, hold },
                )?;
            }
            AsciiGroup::Inhibit => {
                engine.execute(
                    &mut LineCommand::new("setInhibit").arg(Arg::decimal(desired.inhibit)),
                )?;
                self.snapshot.inhibit = desired.inhibit;
                let [inhibit] = read_values(engine, "getInhibit")?;
                confirm(&mut self.snapshot.inhibit, &desired.inhibit, inhibit)?;
            }
        }
        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        self.engine.execute(&mut LineCommand::new("saveConfig")).map_err(|err| {
            warn!(error = %err, "saving configuration failed");
            err
        })
    }
}

fn check_distance(location: &'static str, metres: f32) -> Result<()> {
    if !(MIN_DISTANCE_M..=MAX_DISTANCE_M).contains(&metres) {
        return Err(DeviceError::invalid(location, metres));
    }
    Ok(())
}

impl Session<'_, AsciiSensor> {
    /// Detection range in metres, 0.6 to 25.
    pub fn set_range(&mut self, from: f32, to: f32) -> &mut Self {
        self.update(AsciiGroup::Range, |c| {
            check_distance("range", from)?;
            check_distance("range", to)?;
            if from > to {
                return Err(DeviceError::invalid("range", format!("{from} > {to}")));
            }
            c.range = Range { from, to };
            Ok(())
        })
    }

    pub fn set_trigger_distance(&mut self, metres: f32) -> &mut Self {
        self.update(AsciiGroup::Trigger, |c| {
            check_distance("trigger", metres)?;
            c.trigger = metres;
            Ok(())
        })
    }

    /// Detect delay 0 to 2 s, clear delay 0 to 20 s.
    pub fn set_latency(&mut self, detect: f32, clear: f32) -> &mut Self {
        self.update(AsciiGroup::Latency, |c| {
            if !(0.0..=2.0).contains(&detect) {
                return Err(DeviceError::invalid("latency", detect));
            }
            if !(0.0..=20.0).contains(&clear) {
                return Err(DeviceError::invalid("latency", clear));
            }
            c.latency = Latency { detect, clear };
            Ok(())
        })
    }

    pub fn set_sensitivity(&mut self, detect: u8, hold: u8) -> &mut Self {
        self.update(AsciiGroup::Sensitivity, |c| {
            for value in [detect, hold] {
                if !(1..=9).contains(&value) {
                    return Err(DeviceError::invalid("sensitivity", value));
                }
            }
            c.sensitivity = Sensitivity { detect, hold };
            Ok(())
        })
    }

    pub fn set_inhibit(&mut self, seconds: f32) -> &mut Self {
        self.update(AsciiGroup::Inhibit, |c| {
            if !(0.1..=255.0).contains(&seconds) {
                return Err(DeviceError::invalid("inhibit", seconds));
            }
            c.inhibit = seconds;
            Ok(())
        })
    }
}
