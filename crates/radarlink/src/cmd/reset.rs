use tracing::info;

use crate::cmd::sensor::Sensor;
use crate::cmd::PortArgs;
use crate::exit::{device_error, CliResult, SUCCESS};
use crate::output::{print_fields, OutputFormat};

pub fn restart(args: PortArgs, format: OutputFormat) -> CliResult<i32> {
    let mut sensor = Sensor::open(&args)?;
    let result = match &mut sensor {
        Sensor::Binary(s) => s.restart(),
        Sensor::Ascii(s) => s.restart(),
    };
    result.map_err(|err| device_error("restart failed", err))?;
    info!(port = %args.port, "sensor restarted");

    let summary = sensor.summary(&args.port);
    print_fields(&summary.fields(), &summary, format);
    Ok(SUCCESS)
}

pub fn factory_reset(args: PortArgs, format: OutputFormat) -> CliResult<i32> {
    let mut sensor = Sensor::open(&args)?;
    let result = match &mut sensor {
        Sensor::Binary(s) => s.factory_reset(),
        Sensor::Ascii(s) => s.factory_reset(),
    };
    result.map_err(|err| device_error("factory reset failed", err))?;
    info!(port = %args.port, "factory settings restored");

    let summary = sensor.summary(&args.port);
    print_fields(&summary.fields(), &summary, format);
    Ok(SUCCESS)
}
