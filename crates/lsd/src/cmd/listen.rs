use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lsd_frame::{MAX_CH, MAX_LEN};
use lsd_link::{Link, LinkConfig, LinkError};
use lsd_transport::serial;
use tracing::{info, warn};

use crate::cmd::ListenArgs;
use crate::exit::{link_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

const IDLE_BACKOFF: Duration = Duration::from_millis(5);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.load_config()?;
    let transport = serial::open(&args.serial.device, args.serial.baud)
        .map_err(|err| transport_error("open failed", err))?;
    let source = args.serial.device.display().to_string();

    let mut buf = vec![0u8; receive_capacity(&config)];
    let mut link = Link::with_config(transport, config);
    link.init();

    let channels = args
        .channels
        .clone()
        .unwrap_or_else(|| (0..MAX_CH).collect());
    for &channel in &channels {
        link.ch_enable(channel)
            .map_err(|err| link_error("enable failed", err))?;
    }
    info!(device = %source, ?channels, "listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        match link.recv(&mut buf, args.link.loops) {
            Ok(delivery) => {
                print_message(delivery.channel, &buf[..delivery.len], &source, format);
                printed = printed.saturating_add(1);
                if let Some(count) = args.count {
                    if printed >= count {
                        return Ok(SUCCESS);
                    }
                }
            }
            Err(LinkError::Timeout { .. }) => std::thread::sleep(IDLE_BACKOFF),
            Err(err) if err.is_retryable() => warn!(%err, "dropped malformed input"),
            Err(err) => return Err(link_error("receive failed", err)),
        }
    }

    Ok(SUCCESS)
}

/// Large enough for any single frame, even when the config caps reassembled
/// messages below one frame's payload.
fn receive_capacity(config: &LinkConfig) -> usize {
    config.max_message_len.max(MAX_LEN)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
