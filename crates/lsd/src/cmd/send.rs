use lsd_link::Link;
use lsd_transport::serial;
use tracing::info;

use crate::cmd::{send_message, SendArgs};
use crate::exit::{link_error, transport_error, CliResult, SUCCESS};

pub fn run(args: SendArgs) -> CliResult<i32> {
    let config = args.link.load_config()?;
    let payload = args.payload.resolve()?;
    let transport = serial::open(&args.serial.device, args.serial.baud)
        .map_err(|err| transport_error("open failed", err))?;

    let mut link = Link::with_config(transport, config);
    link.init();

    let calls = send_message(
        &mut link,
        &payload,
        args.channel,
        args.chunk,
        args.link.loops,
        || Ok(()),
    )
    .map_err(|err| link_error("send failed", err))?;
    link.flush().map_err(|err| link_error("flush failed", err))?;

    info!(
        device = %args.serial.device.display(),
        channel = args.channel,
        bytes = payload.len(),
        calls,
        "message sent"
    );
    Ok(SUCCESS)
}
