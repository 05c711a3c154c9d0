use std::time::{Duration, Instant};

use regex::bytes::Regex;
use serialpkt_packet::Evaluator;
use serialpkt_port::{PortConfig, PortEvent};
use serialpkt_request::SerialRequest;
use tracing::{debug, warn};

use crate::cmd::{open_port, parse_duration, unescape, RequestArgs, PUMP_INTERVAL};
use crate::exit::{
    port_error, transport_error, CliError, CliResult, SUCCESS, TIMEOUT, TRANSPORT_ERROR, USAGE,
};
use crate::output::{print_record, OutputFormat, Record};

pub fn run(args: RequestArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let request = build_request(&args, timeout)?;
    let device = args.device.display().to_string();

    let (mut port, events) = open_port::<()>(&args.device, PortConfig::default())?;
    let id = port
        .submit_request(request, Instant::now())
        .map_err(|err| port_error("send failed", err))?;
    debug!(request = %id, "request submitted");

    loop {
        let batch = port
            .pump(&events, PUMP_INTERVAL)
            .map_err(|err| port_error("receive failed", err))?;

        for event in batch {
            match event {
                PortEvent::RequestCompleted { response, .. } => {
                    let record = Record::new("response", &device, &response);
                    print_record(&record, &response, format);
                    return Ok(SUCCESS);
                }
                PortEvent::RequestTimedOut { .. } => {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("no response from {device} within {timeout:?}"),
                    ));
                }
                PortEvent::RequestFailed { error, .. } => {
                    return Err(transport_error("send failed", error));
                }
                PortEvent::RequestCancelled { reason, .. } => {
                    return Err(CliError::new(
                        TRANSPORT_ERROR,
                        format!("request cancelled: {}", reason.as_str()),
                    ));
                }
                PortEvent::EvaluationFailed { error, .. } => {
                    warn!(%error, "response evaluation failed");
                }
                _ => {}
            }
        }
    }
}

fn build_request(args: &RequestArgs, timeout: Duration) -> CliResult<SerialRequest<()>> {
    let data = unescape(&args.data)?;
    let request = SerialRequest::new(data, ()).with_timeout(timeout);

    if let Some(pattern) = &args.expect_regex {
        let regex = Regex::new(pattern)
            .map_err(|err| CliError::new(USAGE, format!("invalid --expect-regex: {err}")))?;
        return Ok(request.with_evaluator(move |response| regex.is_match(response)));
    }
    if let Some(suffix) = &args.expect_suffix {
        let suffix = unescape(suffix)?;
        return Ok(request.with_response_evaluator(Evaluator::ends_with(suffix)));
    }
    Ok(request)
}
