mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "serialpkt", version, about = "Serial packet and request CLI")]
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
    fn parses_request_subcommand() {
        let cli = Cli::try_parse_from([
            "serialpkt",
            "request",
            "/dev/ttyUSB0",
            "--data",
            "AT\\r",
            "--expect-suffix",
            "OK\\r\\n",
            "--timeout",
            "500ms",
        ])
        .expect("request args should parse");

        match cli.command {
            Command::Request(args) => {
                assert_eq!(args.timeout, "500ms");
                assert_eq!(args.expect_suffix.as_deref(), Some("OK\\r\\n"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_expectations() {
        let err = Cli::try_parse_from([
            "serialpkt",
            "request",
            "/dev/ttyUSB0",
            "--data",
            "AT",
            "--expect-regex",
            "OK",
            "--expect-suffix",
            "OK",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_regex_with_suffix_on_listen() {
        let err = Cli::try_parse_from([
            "serialpkt",
            "listen",
            "/dev/ttyUSB0",
            "--regex",
            "\\d+",
            "--suffix",
            "\\n",
        ])
        .expect_err("conflicting args should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "serialpkt",
            "listen",
            "/dev/ttyUSB0",
            "--count",
            "3",
            "--format",
            "raw",
            "--log-level",
            "debug",
        ])
        .expect("listen args should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Raw)));
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert!(matches!(cli.command, Command::Listen(ref a) if a.count == Some(3)));
    }
}
