use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use radarlink_device::{Presence, TargetReport};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One telemetry sample from either sensor family.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Reading {
    Report(TargetReport),
    Presence(Presence),
}

impl Reading {
    fn present(&self) -> bool {
        match self {
            Reading::Report(report) => report.state.is_present(),
            Reading::Presence(presence) => presence.present,
        }
    }
}

#[derive(Serialize)]
struct ReadingOutput<'a> {
    seq: u64,
    timestamp: String,
    #[serde(flatten)]
    reading: &'a Reading,
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

/// Print key/value pairs, falling back to `json` for the JSON format.
pub fn print_fields<T: Serialize>(fields: &[(&str, String)], json: &T, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(json),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (key, value) in fields {
                table.add_row(vec![key.to_string(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (key, value) in fields {
                println!("{key:<20} {value}");
            }
        }
        OutputFormat::Raw => {
            for (key, value) in fields {
                println!("{key}={value}");
            }
        }
    }
}

pub fn print_reading(seq: u64, reading: &Reading, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ReadingOutput {
            seq,
            timestamp: now_unix_seconds(),
            reading,
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);
            match reading {
                Reading::Report(report) => {
                    table
                        .set_header(vec!["SEQ", "STATE", "MOVE CM", "MOVE E", "STILL CM", "STILL E"])
                        .add_row(vec![
                            seq.to_string(),
                            state_name(report).to_string(),
                            report.move_distance.to_string(),
                            report.move_energy.to_string(),
                            report.still_distance.to_string(),
                            report.still_energy.to_string(),
                        ]);
                }
                Reading::Presence(presence) => {
                    table
                        .set_header(vec!["SEQ", "PRESENT"])
                        .add_row(vec![seq.to_string(), presence.present.to_string()]);
                }
            }
            println!("{table}");
        }
        OutputFormat::Pretty => match reading {
            Reading::Report(report) => println!(
                "seq={seq} state={} move={}cm/{} still={}cm/{}",
                state_name(report),
                report.move_distance,
                report.move_energy,
                report.still_distance,
                report.still_energy
            ),
            Reading::Presence(presence) => println!("seq={seq} present={}", presence.present),
        },
        OutputFormat::Raw => println!("{}", u8::from(reading.present())),
    }
}

fn state_name(report: &TargetReport) -> &'static str {
    use radarlink_device::TargetState;
    match report.state {
        TargetState::None => "none",
        TargetState::Moving => "moving",
        TargetState::Still => "still",
        TargetState::MovingAndStill => "moving+still",
    }
}

fn now_unix_seconds() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:03}", now.as_secs(), now.subsec_millis())
}
