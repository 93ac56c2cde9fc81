use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Emulate the device end of the link: ack heartbeats, answer commands.
    Echo(EchoArgs),
    /// Send a single command and wait for its response.
    Send(SendArgs),
    /// Connect and print state events and link transitions.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Serve a single connection, then exit.
    #[arg(long)]
    pub once: bool,
    /// Status to answer commands with.
    #[arg(long, default_value = "ok")]
    pub status: StatusArg,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum StatusArg {
    Ok,
    ErrUnknown,
    ErrInvalid,
    ErrBusy,
}

impl StatusArg {
    pub fn as_status(self) -> liftlink_peer::CommandStatus {
        match self {
            StatusArg::Ok => liftlink_peer::CommandStatus::Ok,
            StatusArg::ErrUnknown => liftlink_peer::CommandStatus::ErrUnknown,
            StatusArg::ErrInvalid => liftlink_peer::CommandStatus::ErrInvalid,
            StatusArg::ErrBusy => liftlink_peer::CommandStatus::ErrBusy,
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Command id to send.
    #[arg(long, short = 'c')]
    pub command: u8,
    /// Command parameters as hex (e.g. 0301).
    #[arg(long, default_value = "")]
    pub params: String,
    /// Maximum time to wait for the response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug, Default)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}

/// Parse a human-friendly duration: `5s`, `500ms`, `2m`.
pub fn parse_duration(text: &str) -> CliResult<Duration> {
    let text = text.trim();
    let (value, unit) = text.split_at(text.find(|c: char| !c.is_ascii_digit()).unwrap_or(0));
    let value: u64 = value
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {text}")))?;
    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        _ => Err(CliError::new(USAGE, format!("invalid duration: {text}"))),
    }
}

/// Decode a hex string like `0301` into bytes.
pub fn parse_hex(text: &str) -> CliResult<Vec<u8>> {
    let text = text.trim();
    if text.len() % 2 != 0 {
        return Err(CliError::new(
            USAGE,
            format!("hex string has odd length: {text}"),
        ));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16)
                .map_err(|_| CliError::new(USAGE, format!("invalid hex string: {text}")))
        })
        .collect()
}
