use serialpkt_transport::{DeviceNode, Transport};
use tracing::info;

use crate::cmd::{unescape, SendArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat, Record};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let data = unescape(&args.data)?;
    let mut stream =
        DeviceNode::open(&args.device).map_err(|err| transport_error("open failed", err))?;
    stream
        .send_bytes(&data)
        .map_err(|err| transport_error("send failed", err))?;
    info!(len = data.len(), "bytes written");

    // Raw mode echoes nothing; the bytes went to the device.
    if !matches!(format, OutputFormat::Raw) {
        let device = args.device.display().to_string();
        print_record(&Record::new("sent", &device, &data), &data, format);
    }
    Ok(SUCCESS)
}
