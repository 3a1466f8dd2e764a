use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct PortOutput {
    name: String,
    kind: String,
}

pub fn run(format: OutputFormat) -> CliResult<i32> {
    let ports: Vec<PortOutput> = radarlink_transport::available_ports()
        .map_err(|err| transport_error("port enumeration failed", err))?
        .into_iter()
        .map(|p| PortOutput {
            name: p.name,
            kind: p.kind,
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&ports),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PORT", "KIND"]);
            for port in &ports {
                table.add_row(vec![port.name.clone(), port.kind.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for port in &ports {
                println!("{:<24} {}", port.name, port.kind);
            }
        }
        OutputFormat::Raw => {
            for port in &ports {
                println!("{}", port.name);
            }
        }
    }

    Ok(SUCCESS)
}
