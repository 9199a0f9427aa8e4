use lsd_link::{Delivery, Link, LinkError};
use lsd_transport::{ShadowConfig, ShadowUart};
use tracing::{debug, info};

use crate::cmd::{send_message, LoopbackArgs};
use crate::exit::{link_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_message, OutputFormat};

pub fn run(args: LoopbackArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.load_config()?;
    let payload = args.payload.resolve()?;
    let loops = args.link.loops;

    let (a, b) = ShadowUart::pair_with_config(ShadowConfig {
        rx_capacity: args.rx_capacity,
        tx_burst: args.tx_burst,
    });
    let mut sender = Link::with_config(a, config.clone());
    let mut receiver = Link::with_config(b, config);
    sender.init();
    receiver.init();
    receiver
        .ch_enable(args.channel)
        .map_err(|err| link_error("enable failed", err))?;

    let mut buf = vec![0u8; payload.len().max(1)];
    let mut received: Option<Delivery> = None;

    // Drain the receiver between segments so its FIFO never has to hold the
    // whole message.
    let calls = send_message(
        &mut sender,
        &payload,
        args.channel,
        args.chunk,
        loops,
        || {
            if received.is_none() {
                received = try_recv(&mut receiver, &mut buf, loops)?;
            }
            Ok(())
        },
    )
    .map_err(|err| link_error("send failed", err))?;
    debug!(calls, bytes = payload.len(), "loopback payload sent");

    let delivery = match received {
        Some(delivery) => delivery,
        None => try_recv(&mut receiver, &mut buf, loops)
            .map_err(|err| link_error("receive failed", err))?
            .ok_or_else(|| CliError::new(TIMEOUT, "no message within the polling budget"))?,
    };

    let echoed = &buf[..delivery.len];
    print_message(delivery.channel, echoed, "loopback", format);

    if delivery.channel != args.channel || echoed != payload.as_slice() {
        return Err(CliError::new(
            FAILURE,
            format!(
                "loopback mismatch: sent {} bytes on channel {}, got {} bytes on channel {}",
                payload.len(),
                args.channel,
                delivery.len,
                delivery.channel
            ),
        ));
    }
    info!(channel = delivery.channel, bytes = delivery.len, "loopback ok");
    Ok(SUCCESS)
}

/// One budgeted receive; a timeout just means nothing complete yet.
fn try_recv(
    link: &mut Link<ShadowUart>,
    buf: &mut [u8],
    loops: u32,
) -> Result<Option<Delivery>, LinkError> {
    match link.recv(buf, loops) {
        Ok(delivery) => Ok(Some(delivery)),
        Err(LinkError::Timeout { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}
