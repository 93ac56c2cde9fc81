use std::fmt::Write as _;
use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use liftlink_peer::{CommandResponse, LinkEvent};
use serde::Serialize;

const RESPONSE_SCHEMA: &str =
    "https://schemas.liftworks.dev/liftlink/cli/v1/command-outcome.schema.json";
const EVENT_SCHEMA: &str = "https://schemas.liftworks.dev/liftlink/cli/v1/link-event.schema.json";

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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

#[derive(Serialize)]
struct CommandOutcomeOutput<'a> {
    schema_id: &'a str,
    outcome: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    command_id: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
}

pub fn print_response(response: &CommandResponse, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = CommandOutcomeOutput {
                schema_id: RESPONSE_SCHEMA,
                outcome: "response",
                command_id: Some(response.command_id),
                status: Some(response.status.to_string()),
                data: Some(hex_string(response.data())),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "STATUS", "DATA"])
                .add_row(vec![
                    format!("0x{:02x}", response.command_id),
                    response.status.to_string(),
                    hex_string(response.data()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "command=0x{:02x} status={} data={}",
                response.command_id,
                response.status,
                hex_string(response.data())
            );
        }
    }
}

pub fn print_timeout(format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = CommandOutcomeOutput {
                schema_id: RESPONSE_SCHEMA,
                outcome: "timeout",
                command_id: None,
                status: None,
                data: None,
            };
            print_json(&out);
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("command timed out (no response from device)");
        }
    }
}

#[derive(Serialize)]
struct LinkEventOutput<'a> {
    schema_id: &'a str,
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_type: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<u8>,
}

pub fn print_link_event(event: &LinkEvent, format: OutputFormat) {
    let (kind, event_type, data) = match event {
        LinkEvent::LinkUp => ("link_up", None, None),
        LinkEvent::LinkDown => ("link_down", None, None),
        LinkEvent::StateEvent(state) => ("state_event", Some(state.event_type), Some(state.data)),
        LinkEvent::CommandResponse(_) => ("command_response", None, None),
        LinkEvent::CommandTimeout => ("command_timeout", None, None),
    };
    match format {
        OutputFormat::Json => {
            let out = LinkEventOutput {
                schema_id: EVENT_SCHEMA,
                kind,
                event_type,
                data,
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "TYPE", "DATA"])
                .add_row(vec![
                    kind.to_string(),
                    event_type.map_or_else(|| "-".to_string(), |t| format!("0x{t:02x}")),
                    data.map_or_else(|| "-".to_string(), |d| d.to_string()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match (event_type, data) {
            (Some(event_type), Some(data)) => {
                println!("{kind} type=0x{event_type:02x} data={data}");
            }
            _ => println!("{kind}"),
        },
    }
}

fn print_json(value: &impl Serialize) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn hex_string(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_string_formats_bytes() {
        assert_eq!(hex_string(&[0x00, 0x1f, 0xa0]), "001fa0");
        assert_eq!(hex_string(&[]), "");
    }
}
