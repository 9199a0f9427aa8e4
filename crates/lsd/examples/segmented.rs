//! Send a message larger than one frame with split start/next/end.
//!
//! Run: cargo run -p lsd --example segmented

use lsd::frame::MAX_LEN;
use lsd::link::Link;
use lsd::transport::{ShadowConfig, ShadowUart};

const CHANNEL: u8 = 1;
const CHUNK: usize = 2_048;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (a, b) = ShadowUart::pair_with_config(ShadowConfig {
        rx_capacity: 32 * 1024,
        tx_burst: 64,
    });
    let mut sender = Link::new(a);
    let mut receiver = Link::new(b);
    sender.init();
    receiver.init();
    receiver.ch_enable(CHANNEL)?;

    let message: Vec<u8> = (0..3 * MAX_LEN).map(|i| (i % 256) as u8).collect();
    let mut chunks = message.chunks(CHUNK).peekable();

    if let Some(first) = chunks.next() {
        sender.split_start(first, message.len(), CHANNEL, 1_000)?;
    }
    while let Some(chunk) = chunks.next() {
        if chunks.peek().is_some() {
            sender.split_next(chunk, 1_000)?;
        } else {
            sender.split_end(chunk, 1_000)?;
        }
    }

    let mut buf = vec![0u8; message.len()];
    let delivery = receiver.recv(&mut buf, 1_000)?;
    println!(
        "received {} bytes on channel {} (intact: {})",
        delivery.len,
        delivery.channel,
        buf[..delivery.len] == message[..]
    );

    Ok(())
}
