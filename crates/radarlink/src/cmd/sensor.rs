//! Opening sensors and rendering their configuration.

use radarlink_device::{
    AsciiConfig, AsciiSensor, BinaryConfig, BinarySensor, DistanceResolution, OutPinPolarity,
    SensorConfig, SystemMode,
};
use serde::Serialize;
use tracing::debug;

use super::{parse_timeout, PortArgs, SensorKind};
use crate::exit::{device_error, CliResult};

pub enum Sensor {
    Binary(BinarySensor),
    Ascii(AsciiSensor),
}

impl Sensor {
    /// Open the port and load the sensor configuration.
    pub fn open(args: &PortArgs) -> CliResult<Self> {
        let wait = parse_timeout(&args.timeout)?;
        let mut config = SensorConfig {
            default_wait: wait,
            ..SensorConfig::default()
        };
        config.channel.default_wait = wait;
        let baud = args.baud.unwrap_or_else(|| args.kind.default_baud());
        debug!(port = %args.port, kind = ?args.kind, baud, ?wait, "opening sensor");

        let mut sensor = match args.kind {
            SensorKind::Binary => BinarySensor::open(&args.port, baud, config).map(Sensor::Binary),
            SensorKind::Ascii => AsciiSensor::open(&args.port, baud, config).map(Sensor::Ascii),
        }
        .map_err(|err| device_error("open failed", err))?;

        let init = match &mut sensor {
            Sensor::Binary(s) => s.init(),
            Sensor::Ascii(s) => s.init(),
        };
        init.map_err(|err| device_error("init failed", err))?;

        Ok(sensor)
    }

    pub fn summary(&self, port: &str) -> Summary {
        match self {
            Sensor::Binary(s) => Summary {
                kind: "binary",
                port: port.to_string(),
                firmware: s.version().map(|v| v.to_string()),
                hardware: None,
                mac: s.mac_string(),
                config: ConfigView::Binary(s.config().clone()),
            },
            Sensor::Ascii(s) => Summary {
                kind: "ascii",
                port: port.to_string(),
                firmware: s.sw_version().map(str::to_string),
                hardware: s.hw_version().map(str::to_string),
                mac: None,
                config: ConfigView::Ascii(*s.config()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ConfigView {
    Binary(BinaryConfig),
    Ascii(AsciiConfig),
}

/// Identity and configuration snapshot of an initialised sensor.
#[derive(Debug, Serialize)]
pub struct Summary {
    pub kind: &'static str,
    pub port: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    pub config: ConfigView,
}

impl Summary {
    /// Flattened rows for table and text output.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![("kind", self.kind.to_string()), ("port", self.port.clone())];
        if let Some(firmware) = &self.firmware {
            rows.push(("firmware", firmware.clone()));
        }
        if let Some(hardware) = &self.hardware {
            rows.push(("hardware", hardware.clone()));
        }
        if let Some(mac) = &self.mac {
            rows.push(("mac", mac.clone()));
        }

        match &self.config {
            ConfigView::Binary(c) => {
                let gate = c.resolution.gate_length();
                rows.push(("mode", mode_name(c.mode).to_string()));
                rows.push(("resolution", format!("{gate} m")));
                rows.push((
                    "min gate",
                    format!("{} ({:.2} m)", c.base.min_gate, f32::from(c.base.min_gate) * gate),
                ));
                rows.push((
                    "max gate",
                    format!("{} ({:.2} m)", c.base.max_gate, f32::from(c.base.max_gate) * gate),
                ));
                rows.push(("timeout", format!("{} s", c.base.timeout)));
                rows.push(("out pin", polarity_name(c.base.polarity).to_string()));
                rows.push(("move thresholds", join(&c.move_thresholds)));
                rows.push(("still thresholds", join(&c.still_thresholds)));
            }
            ConfigView::Ascii(c) => {
                rows.push(("range", format!("{} - {} m", c.range.from, c.range.to)));
                rows.push(("trigger", format!("{} m", c.trigger)));
                rows.push((
                    "latency",
                    format!("detect {} s, clear {} s", c.latency.detect, c.latency.clear),
                ));
                rows.push((
                    "sensitivity",
                    format!("detect {}, hold {}", c.sensitivity.detect, c.sensitivity.hold),
                ));
                rows.push(("inhibit", format!("{} s", c.inhibit)));
            }
        }
        rows
    }
}

fn mode_name(mode: SystemMode) -> &'static str {
    match mode {
        SystemMode::Simple => "simple",
        SystemMode::Energy => "energy",
    }
}

fn polarity_name(polarity: OutPinPolarity) -> &'static str {
    match polarity {
        OutPinPolarity::HighOnPresence => "high on presence",
        OutPinPolarity::LowOnPresence => "low on presence",
    }
}

fn join(values: &[u8]) -> String {
    values
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn resolution(arg: super::ResolutionArg) -> DistanceResolution {
    match arg {
        super::ResolutionArg::Gate75 => DistanceResolution::Gate75cm,
        super::ResolutionArg::Gate50 => DistanceResolution::Gate50cm,
        super::ResolutionArg::Gate20 => DistanceResolution::Gate20cm,
    }
}
