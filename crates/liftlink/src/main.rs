mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "liftlink", version, about = "Framed serial bridge diagnostics")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "liftlink",
            "send",
            "/tmp/test.sock",
            "--command",
            "2",
            "--params",
            "03",
        ])
        .expect("send args should parse");

        assert!(matches!(cli.command, Command::Send(_)));
    }

    #[test]
    fn parses_echo_subcommand_with_status() {
        let cli = Cli::try_parse_from([
            "liftlink",
            "echo",
            "/tmp/test.sock",
            "--once",
            "--status",
            "err-busy",
        ])
        .expect("echo args should parse");

        let Command::Echo(args) = cli.command else {
            panic!("expected echo subcommand");
        };
        assert!(args.once);
    }

    #[test]
    fn parses_listen_subcommand() {
        let cli = Cli::try_parse_from(["liftlink", "listen", "/tmp/test.sock", "--count", "3"])
            .expect("listen args should parse");
        assert!(matches!(cli.command, Command::Listen(_)));
    }

    #[test]
    fn rejects_unknown_duration_unit() {
        let err = cmd::parse_duration("5h").expect_err("hours are not supported");
        assert_eq!(err.code, exit::USAGE);
    }
}
