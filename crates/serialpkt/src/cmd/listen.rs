use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serialpkt_packet::{EngineConfig, PacketDescriptor};
use serialpkt_port::{PortConfig, PortEvent};
use tracing::{info, warn};

use crate::cmd::{open_port, unescape, ListenArgs, PUMP_INTERVAL};
use crate::exit::{packet_error, port_error, CliError, CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_record, OutputFormat, Record};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let descriptor = build_descriptor(&args)?;
    let label = descriptor.user_info().clone();
    let device = args.device.display().to_string();

    let mut engine = EngineConfig::default();
    if args.max_buffer.is_some() {
        engine.max_buffer_len = args.max_buffer;
    }
    let config = PortConfig {
        engine,
        ..PortConfig::default()
    };
    let (mut port, events) = open_port::<String>(&args.device, config)?;
    port.register_packet_descriptor(descriptor);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let batch = port
            .pump(&events, PUMP_INTERVAL)
            .map_err(|err| port_error("receive failed", err))?;

        for event in batch {
            match event {
                PortEvent::PacketReceived(packet) => {
                    let record =
                        Record::new("packet", &device, &packet.data).with_label(&label);
                    print_record(&record, &packet.data, format);
                    printed = printed.saturating_add(1);

                    if args.count.is_some_and(|count| printed >= count) {
                        return Ok(SUCCESS);
                    }
                }
                PortEvent::BufferOverflow { len, max, .. } => {
                    warn!(len, max, "partial packet discarded");
                }
                PortEvent::EvaluationFailed { error, .. } => {
                    warn!(%error, "packet evaluation failed");
                }
                PortEvent::TransportError(message) => {
                    warn!(error = %message, "device reported an error");
                }
                PortEvent::Closed => {
                    info!(packets = printed, "device closed");
                    return Ok(SUCCESS);
                }
                PortEvent::Removed => {
                    return Err(CliError::new(
                        TRANSPORT_ERROR,
                        format!("device removed: {device}"),
                    ));
                }
                _ => {}
            }
        }
    }

    Ok(SUCCESS)
}

fn build_descriptor(args: &ListenArgs) -> CliResult<PacketDescriptor<String>> {
    if let Some(pattern) = &args.regex {
        return PacketDescriptor::with_regex(pattern, format!("regex:{pattern}"))
            .map_err(|err| packet_error("invalid --regex", err));
    }

    let prefix = args.prefix.as_deref().map(unescape).transpose()?;
    let suffix = match (&prefix, args.suffix.as_deref()) {
        (_, Some(suffix)) => Some(unescape(suffix)?),
        (Some(_), None) => None,
        (None, None) => Some(b"\n".to_vec()),
    };

    let label = match (&args.prefix, &args.suffix) {
        (Some(p), Some(s)) => format!("{p}..{s}"),
        (Some(p), None) => format!("{p}.."),
        (None, Some(s)) => format!("..{s}"),
        (None, None) => "..\\n".to_string(),
    };
    PacketDescriptor::with_prefix_suffix(prefix, suffix, label)
        .map_err(|err| packet_error("invalid packet boundary", err))
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::exit::USAGE;

    fn args(prefix: Option<&str>, suffix: Option<&str>, regex: Option<&str>) -> ListenArgs {
        ListenArgs {
            device: PathBuf::from("/dev/null"),
            prefix: prefix.map(str::to_string),
            suffix: suffix.map(str::to_string),
            regex: regex.map(str::to_string),
            count: None,
            max_buffer: None,
        }
    }

    #[test]
    fn default_boundary_is_newline() {
        let descriptor = build_descriptor(&args(None, None, None)).unwrap();
        assert_eq!(descriptor.suffix(), Some(&b"\n"[..]));
        assert_eq!(descriptor.prefix(), None);
    }

    #[test]
    fn prefix_alone_does_not_add_suffix() {
        let descriptor = build_descriptor(&args(Some("\\x02"), None, None)).unwrap();
        assert_eq!(descriptor.prefix(), Some(&[0x02][..]));
        assert_eq!(descriptor.suffix(), None);
        assert_eq!(descriptor.user_info(), "\\x02..");
    }

    #[test]
    fn invalid_regex_is_usage_error() {
        let err = build_descriptor(&args(None, None, Some("(unclosed"))).unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}
