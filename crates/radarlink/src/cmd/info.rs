use crate::cmd::sensor::Sensor;
use crate::cmd::InfoArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_fields, OutputFormat};

pub fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let sensor = Sensor::open(&args.port)?;
    let summary = sensor.summary(&args.port.port);
    print_fields(&summary.fields(), &summary, format);
    Ok(SUCCESS)
}
