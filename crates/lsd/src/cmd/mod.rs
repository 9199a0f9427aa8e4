use std::fs;
use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};
use lsd_frame::{SegmentKind, MAX_LEN};
use lsd_link::{Link, LinkConfig, LinkError};
use lsd_transport::Transport;

use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, USAGE};
use crate::output::{from_hex, OutputFormat};

pub mod decode;
pub mod encode;
pub mod listen;
pub mod loopback;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode a payload into one frame and print the wire bytes.
    Encode(EncodeArgs),
    /// Decode every frame in a byte capture.
    Decode(DecodeArgs),
    /// Send one message over a serial device.
    Send(SendArgs),
    /// Print messages received on a serial device.
    Listen(ListenArgs),
    /// Send a message through an in-process UART pair and receive it back.
    Loopback(LoopbackArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Send(args) => send::run(args),
        Command::Listen(args) => listen::run(args, format),
        Command::Loopback(args) => loopback::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct PayloadArgs {
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex payload (whitespace and ':' ignored).
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
}

impl PayloadArgs {
    pub fn resolve(&self) -> CliResult<Vec<u8>> {
        if let Some(data) = &self.data {
            return Ok(data.as_bytes().to_vec());
        }
        if let Some(hex) = &self.hex {
            return from_hex(hex)
                .map_err(|err| CliError::new(USAGE, format!("--hex is not valid hex: {err}")));
        }
        if let Some(path) = &self.file {
            return fs::read(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
        }
        Ok(Vec::new())
    }
}

#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Polling budget per link operation.
    #[arg(long, default_value = "10000", value_name = "N")]
    pub loops: u32,
    /// Link configuration file (JSON).
    #[arg(long, value_name = "FILE", env = "LSD_CONFIG")]
    pub config: Option<PathBuf>,
}

impl LinkArgs {
    pub fn load_config(&self) -> CliResult<LinkConfig> {
        match &self.config {
            Some(path) => LinkConfig::load(path).map_err(|err| {
                let code = if err.kind() == std::io::ErrorKind::InvalidData {
                    DATA_INVALID
                } else {
                    USAGE
                };
                CliError::new(code, format!("config {}: {err}", path.display()))
            }),
            None => Ok(LinkConfig::default()),
        }
    }
}

#[derive(Args, Debug)]
pub struct SerialArgs {
    /// Serial device path (e.g. /dev/ttyUSB0).
    pub device: PathBuf,
    /// Baud rate.
    #[arg(long, default_value = "115200")]
    pub baud: u32,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum KindArg {
    Single,
    Start,
    Next,
    End,
}

impl From<KindArg> for SegmentKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Single => SegmentKind::Single,
            KindArg::Start => SegmentKind::Start,
            KindArg::Next => SegmentKind::Next,
            KindArg::End => SegmentKind::End,
        }
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Channel to encode for.
    #[arg(long, short = 'c', default_value = "1")]
    pub channel: u8,
    /// Segment kind carried in the control byte.
    #[arg(long, value_enum, default_value = "single")]
    pub kind: KindArg,
    #[command(flatten)]
    pub payload: PayloadArgs,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex capture to decode.
    #[arg(long, conflicts_with = "file")]
    pub hex: Option<String>,
    /// Binary capture file to decode. Reads stdin when neither is given.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub serial: SerialArgs,
    /// Channel to send on.
    #[arg(long, short = 'c', default_value = "1")]
    pub channel: u8,
    /// Chunk size for messages that need segmentation.
    #[arg(long, default_value_t = MAX_LEN)]
    pub chunk: usize,
    #[command(flatten)]
    pub payload: PayloadArgs,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub serial: SerialArgs,
    /// Channels to enable (comma-separated). Default: all.
    #[arg(long, value_delimiter = ',')]
    pub channels: Option<Vec<u8>>,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct LoopbackArgs {
    /// Channel to send on.
    #[arg(long, short = 'c', default_value = "1")]
    pub channel: u8,
    /// Chunk size for messages that need segmentation.
    #[arg(long, default_value_t = MAX_LEN)]
    pub chunk: usize,
    /// Receive FIFO depth of each simulated UART.
    #[arg(long, default_value = "16384")]
    pub rx_capacity: usize,
    /// Bytes accepted per write by each simulated UART.
    #[arg(long, default_value = "16")]
    pub tx_burst: usize,
    #[command(flatten)]
    pub payload: PayloadArgs,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Send `data` on `channel`, segmenting it into `chunk`-sized pieces when it
/// does not fit one frame. `between` runs before every piece after the first.
///
/// Returns the number of link calls made.
pub fn send_message<T, F>(
    link: &mut Link<T>,
    data: &[u8],
    channel: u8,
    chunk: usize,
    loops: u32,
    mut between: F,
) -> Result<usize, LinkError>
where
    T: Transport,
    F: FnMut() -> Result<(), LinkError>,
{
    if data.len() <= MAX_LEN {
        link.send(data, channel, loops)?;
        return Ok(1);
    }

    let mut pieces = data.chunks(chunk.max(1));
    let first = pieces.next().unwrap_or_default();
    let rest: Vec<&[u8]> = pieces.collect();
    link.split_start(first, data.len(), channel, loops)?;

    if rest.is_empty() {
        between()?;
        link.split_end(&[], loops)?;
        return Ok(2);
    }
    for (i, piece) in rest.iter().enumerate() {
        between()?;
        if i + 1 == rest.len() {
            link.split_end(piece, loops)?;
        } else {
            link.split_next(piece, loops)?;
        }
    }
    Ok(1 + rest.len())
}
