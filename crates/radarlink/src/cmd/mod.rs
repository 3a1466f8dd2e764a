use std::str::FromStr;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use radarlink_device::Drain;

use crate::exit::{CliError, CliResult};
use crate::output::OutputFormat;

pub mod info;
pub mod ports;
pub mod reset;
pub mod sensor;
pub mod set;
pub mod version;
pub mod watch;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show version information.
    Version(VersionArgs),
    /// List serial ports.
    Ports,
    /// Read firmware details and the full sensor configuration.
    Info(InfoArgs),
    /// Poll telemetry until interrupted.
    Watch(WatchArgs),
    /// Change sensor configuration in one session.
    Set(SetArgs),
    /// Restart the sensor and reload its configuration.
    Restart(PortArgs),
    /// Restore factory settings.
    FactoryReset(PortArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Version(args) => version::run(args),
        Command::Ports => ports::run(format),
        Command::Info(args) => info::run(args, format),
        Command::Watch(args) => watch::run(args, format),
        Command::Set(args) => set::run(args, format),
        Command::Restart(args) => reset::restart(args, format),
        Command::FactoryReset(args) => reset::factory_reset(args, format),
    }
}

/// Sensor protocol family.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum SensorKind {
    /// Binary-framed sensors (RD-03E, LD2412).
    Binary,
    /// Line-protocol sensors (C4001).
    Ascii,
}

impl SensorKind {
    pub fn default_baud(self) -> u32 {
        match self {
            SensorKind::Binary => 115_200,
            SensorKind::Ascii => 9_600,
        }
    }
}

#[derive(Args, Debug)]
pub struct PortArgs {
    /// Serial port path.
    pub port: String,
    /// Sensor protocol family.
    #[arg(long, value_enum, default_value = "binary")]
    pub kind: SensorKind,
    /// Baud rate. Default: 115200 for binary, 9600 for ascii.
    #[arg(long)]
    pub baud: Option<u32>,
    /// How long to wait for each reply (e.g. 350ms, 1s).
    #[arg(long, default_value = "350ms")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Print extended build metadata.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub port: PortArgs,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub port: PortArgs,
    /// Stop after N readings.
    #[arg(long)]
    pub count: Option<u64>,
    /// Treatment of buffered frames: no, try or only.
    #[arg(long, default_value = "no")]
    pub drain: Drain,
    /// Waits per reading before giving up.
    #[arg(long, default_value = "3")]
    pub attempts: u32,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    #[command(flatten)]
    pub port: PortArgs,

    /// Reporting mode (binary).
    #[arg(long, value_enum, help_heading = "Binary sensors")]
    pub mode: Option<ModeArg>,
    /// Gate length in metres (binary).
    #[arg(long, value_enum, help_heading = "Binary sensors")]
    pub resolution: Option<ResolutionArg>,
    /// Nearest gate reported (binary).
    #[arg(long, help_heading = "Binary sensors")]
    pub min_gate: Option<u8>,
    /// Farthest gate reported (binary).
    #[arg(long, help_heading = "Binary sensors")]
    pub max_gate: Option<u8>,
    /// Seconds presence is held after the target leaves (binary).
    #[arg(long, help_heading = "Binary sensors")]
    pub timeout_secs: Option<u16>,
    /// OUT pin level while a target is present (binary).
    #[arg(long, value_enum, help_heading = "Binary sensors")]
    pub out_pin: Option<OutPinArg>,
    /// Motion threshold for one gate (binary, repeatable).
    #[arg(long = "move", value_name = "GATE=V", value_parser = parse_gate_value, help_heading = "Binary sensors")]
    pub move_thresholds: Vec<(u8, u8)>,
    /// Static threshold for one gate (binary, repeatable).
    #[arg(long = "still", value_name = "GATE=V", value_parser = parse_gate_value, help_heading = "Binary sensors")]
    pub still_thresholds: Vec<(u8, u8)>,

    /// Detection range in metres (ascii).
    #[arg(long, value_name = "FROM,TO", value_parser = parse_pair::<f32>, help_heading = "ASCII sensors")]
    pub range: Option<(f32, f32)>,
    /// Trigger distance in metres (ascii).
    #[arg(long, value_name = "METRES", help_heading = "ASCII sensors")]
    pub trigger: Option<f32>,
    /// Detect and clear latency in seconds (ascii).
    #[arg(long, value_name = "DETECT,CLEAR", value_parser = parse_pair::<f32>, help_heading = "ASCII sensors")]
    pub latency: Option<(f32, f32)>,
    /// Detect and hold sensitivity, 1 to 9 (ascii).
    #[arg(long, value_name = "DETECT,HOLD", value_parser = parse_pair::<u8>, help_heading = "ASCII sensors")]
    pub sensitivity: Option<(u8, u8)>,
    /// Output inhibit time in seconds (ascii).
    #[arg(long, value_name = "SECONDS", help_heading = "ASCII sensors")]
    pub inhibit: Option<f32>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Simple,
    Energy,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ResolutionArg {
    #[value(name = "0.75")]
    Gate75,
    #[value(name = "0.5")]
    Gate50,
    #[value(name = "0.2")]
    Gate20,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutPinArg {
    High,
    Low,
}

fn parse_gate_value(input: &str) -> Result<(u8, u8), String> {
    let (gate, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected GATE=VALUE, got {input:?}"))?;
    let gate = gate
        .trim()
        .parse()
        .map_err(|_| format!("invalid gate: {gate:?}"))?;
    let value = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid threshold: {value:?}"))?;
    Ok((gate, value))
}

fn parse_pair<T: FromStr>(input: &str) -> Result<(T, T), String> {
    let (a, b) = input
        .split_once(',')
        .ok_or_else(|| format!("expected two comma-separated values, got {input:?}"))?;
    let a = a
        .trim()
        .parse()
        .map_err(|_| format!("invalid value: {a:?}"))?;
    let b = b
        .trim()
        .parse()
        .map_err(|_| format!("invalid value: {b:?}"))?;
    Ok((a, b))
}

pub(crate) fn parse_timeout(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("timeout must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid timeout value: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("timeout must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
