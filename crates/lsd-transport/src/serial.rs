//! Serial port access for real UART hardware.

use std::path::Path;
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::info;

use crate::error::{Result, TransportError};
use crate::stream::StreamTransport;

/// Baud rate used when none is requested.
pub const DEFAULT_BAUD: u32 = 115_200;

/// A serial port driven through the non-blocking [`Transport`](crate::Transport)
/// contract.
pub type SerialTransport = StreamTransport<Box<dyn SerialPort>>;

/// Open a serial device in 8N1 mode at `baud`.
///
/// The port is opened with a zero timeout, so reads and writes that cannot
/// make progress report "nothing moved" instead of blocking.
pub fn open(path: impl AsRef<Path>, baud: u32) -> Result<SerialTransport> {
    let path = path.as_ref();
    if baud == 0 {
        return Err(TransportError::UnsupportedBaud(baud));
    }

    let port = serialport::new(path.to_string_lossy(), baud)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(Duration::ZERO)
        .open()
        .map_err(|err| TransportError::Open {
            path: path.to_path_buf(),
            source: err.into(),
        })?;

    info!(?path, baud, "opened serial device");
    Ok(StreamTransport::new(port))
}
