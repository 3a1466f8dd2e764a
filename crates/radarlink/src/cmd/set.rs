use radarlink_device::{AsciiSensor, BinarySensor, OutPinPolarity, SystemMode};
use tracing::info;

use crate::cmd::sensor::{resolution, Sensor};
use crate::cmd::{ModeArg, OutPinArg, SensorKind, SetArgs};
use crate::exit::{device_error, CliError, CliResult, SUCCESS};
use crate::output::{print_fields, OutputFormat};

pub fn run(args: SetArgs, format: OutputFormat) -> CliResult<i32> {
    check_flags(&args)?;

    let mut sensor = Sensor::open(&args.port)?;
    let result = match &mut sensor {
        Sensor::Binary(s) => apply_binary(s, &args),
        Sensor::Ascii(s) => apply_ascii(s, &args),
    };
    result.map_err(|err| device_error("configuration failed", err))?;
    info!(port = %args.port.port, "configuration committed");

    let summary = sensor.summary(&args.port.port);
    print_fields(&summary.fields(), &summary, format);
    Ok(SUCCESS)
}

fn has_binary_flags(args: &SetArgs) -> bool {
    args.mode.is_some()
        || args.resolution.is_some()
        || args.min_gate.is_some()
        || args.max_gate.is_some()
        || args.timeout_secs.is_some()
        || args.out_pin.is_some()
        || !args.move_thresholds.is_empty()
        || !args.still_thresholds.is_empty()
}

fn has_ascii_flags(args: &SetArgs) -> bool {
    args.range.is_some()
        || args.trigger.is_some()
        || args.latency.is_some()
        || args.sensitivity.is_some()
        || args.inhibit.is_some()
}

fn check_flags(args: &SetArgs) -> CliResult<()> {
    let (own, other, kind) = match args.port.kind {
        SensorKind::Binary => (has_binary_flags(args), has_ascii_flags(args), "binary"),
        SensorKind::Ascii => (has_ascii_flags(args), has_binary_flags(args), "ascii"),
    };
    if other {
        return Err(CliError::usage(format!(
            "flags for another sensor family given with --kind {kind}"
        )));
    }
    if !own {
        return Err(CliError::usage("nothing to set"));
    }
    Ok(())
}

fn apply_binary(sensor: &mut BinarySensor, args: &SetArgs) -> radarlink_device::Result<()> {
    let mut session = sensor.configure();
    if let Some(mode) = args.mode {
        session.set_mode(match mode {
            ModeArg::Simple => SystemMode::Simple,
            ModeArg::Energy => SystemMode::Energy,
        });
    }
    if let Some(res) = args.resolution {
        session.set_distance_resolution(resolution(res));
    }
    // Max first so a wider window can take a larger min gate.
    if let Some(gate) = args.max_gate {
        session.set_max_distance(gate);
    }
    if let Some(gate) = args.min_gate {
        session.set_min_distance(gate);
    }
    if let Some(seconds) = args.timeout_secs {
        session.set_timeout(seconds);
    }
    if let Some(pin) = args.out_pin {
        session.set_out_pin_polarity(match pin {
            OutPinArg::High => OutPinPolarity::HighOnPresence,
            OutPinArg::Low => OutPinPolarity::LowOnPresence,
        });
    }
    for &(gate, value) in &args.move_thresholds {
        session.set_move_threshold(gate, value);
    }
    for &(gate, value) in &args.still_thresholds {
        session.set_still_threshold(gate, value);
    }
    session.end()
}

fn apply_ascii(sensor: &mut AsciiSensor, args: &SetArgs) -> radarlink_device::Result<()> {
    let mut session = sensor.configure();
    if let Some((from, to)) = args.range {
        session.set_range(from, to);
    }
    if let Some(metres) = args.trigger {
        session.set_trigger_distance(metres);
    }
    if let Some((detect, clear)) = args.latency {
        session.set_latency(detect, clear);
    }
    if let Some((detect, hold)) = args.sensitivity {
        session.set_sensitivity(detect, hold);
    }
    if let Some(seconds) = args.inhibit {
        session.set_inhibit(seconds);
    }
    session.end()
}
