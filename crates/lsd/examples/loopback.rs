//! Two links over an in-process UART pair, talking on every channel.
//!
//! Run: cargo run -p lsd --example loopback

use lsd::frame::{channel_name, MAX_CH};
use lsd::link::{Link, Status};
use lsd::transport::ShadowUart;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (host_end, device_end) = ShadowUart::pair();
    let mut host = Link::new(host_end);
    let mut device = Link::new(device_end);
    host.init();
    device.init();

    for channel in 0..MAX_CH {
        device.ch_enable(channel)?;
    }

    for channel in 0..MAX_CH {
        let message = format!("hello on {}", channel_name(channel));
        host.send(message.as_bytes(), channel, 100)?;
    }

    let mut buf = [0u8; 64];
    loop {
        let result = device.recv(&mut buf, 10);
        match Status::of(&result) {
            Status::Ok => {}
            status => {
                println!("recv -> {status}");
                break;
            }
        }
        let delivery = result?;
        println!(
            "channel {} ({}): {}",
            delivery.channel,
            channel_name(delivery.channel),
            String::from_utf8_lossy(&buf[..delivery.len])
        );
    }

    Ok(())
}
