use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::time::Duration;

use clap::{Args, Subcommand};
use serialpkt_port::{spawn_device_reader, PortConfig, SerialPort};
use serialpkt_transport::{DeviceNode, SerialStream, TransportEvent};

use crate::exit::{port_error, transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod request;
pub mod send;
pub mod version;

/// How long a single pump waits before checking for Ctrl-C.
pub const PUMP_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print packets received from a device.
    Listen(ListenArgs),
    /// Send one command and wait for its response.
    Request(RequestArgs),
    /// Write bytes to a device without waiting.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Request(args) => request::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Device node to read (e.g. /dev/ttyUSB0).
    pub device: PathBuf,
    /// Packet prefix. Escapes such as \r, \n and \x02 are understood.
    #[arg(long, conflicts_with = "regex")]
    pub prefix: Option<String>,
    /// Packet suffix. Defaults to \n when no other boundary is given.
    #[arg(long, conflicts_with = "regex")]
    pub suffix: Option<String>,
    /// Regular expression that ends a packet.
    #[arg(long)]
    pub regex: Option<String>,
    /// Exit after printing N packets.
    #[arg(long)]
    pub count: Option<usize>,
    /// Discard a partial packet once it grows past N bytes.
    #[arg(long, value_name = "N")]
    pub max_buffer: Option<usize>,
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// Device node to talk to.
    pub device: PathBuf,
    /// Command to send. Escapes such as \r and \n are understood.
    #[arg(long)]
    pub data: String,
    /// Response is complete once it matches this regular expression.
    #[arg(long, conflicts_with = "expect_suffix")]
    pub expect_regex: Option<String>,
    /// Response is complete once it ends with this text.
    #[arg(long)]
    pub expect_suffix: Option<String>,
    /// Maximum time to wait for the response (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Device node to write to.
    pub device: PathBuf,
    /// Bytes to write. Escapes such as \r and \n are understood.
    #[arg(long)]
    pub data: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Open `path` and start a reader thread for it.
pub fn open_port<U>(
    path: &Path,
    config: PortConfig,
) -> CliResult<(SerialPort<SerialStream, U>, Receiver<TransportEvent>)> {
    let device = DeviceNode::new(path).map_err(|err| transport_error("open failed", err))?;
    let stream = device
        .connect()
        .map_err(|err| transport_error("open failed", err))?;
    let reader = stream
        .try_clone()
        .map_err(|err| transport_error("open failed", err))?;

    // The reader thread blocks in read() for the life of the process.
    let (events, _reader) = spawn_device_reader(reader, device, config.read_chunk_size)
        .map_err(|err| port_error("reader start failed", err))?;
    Ok((SerialPort::with_config(stream, config), events))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Expand `\r`, `\n`, `\t`, `\0`, `\\` and `\xNN` in command-line byte strings.
pub fn unescape(input: &str) -> CliResult<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());
    let mut bytes = input.bytes();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(b'r') => out.push(b'\r'),
            Some(b'n') => out.push(b'\n'),
            Some(b't') => out.push(b'\t'),
            Some(b'0') => out.push(0),
            Some(b'\\') => out.push(b'\\'),
            Some(b'x') => {
                let hex = [bytes.next(), bytes.next()];
                let value = match hex {
                    [Some(hi), Some(lo)] => std::str::from_utf8(&[hi, lo])
                        .ok()
                        .and_then(|h| u8::from_str_radix(h, 16).ok()),
                    _ => None,
                };
                let value = value.ok_or_else(|| {
                    CliError::new(USAGE, format!("invalid \\x escape in {input:?}"))
                })?;
                out.push(value);
            }
            Some(other) => {
                return Err(CliError::new(
                    USAGE,
                    format!("unknown escape \\{} in {input:?}", other as char),
                ))
            }
            None => return Err(CliError::new(USAGE, format!("trailing backslash in {input:?}"))),
        }
    }
    Ok(out)
}
