use std::fmt::Write as _;
use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use lsd_frame::{channel_name, Frame};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    channel: u8,
    channel_name: &'a str,
    payload_size: usize,
    payload: String,
    source: &'a str,
    timestamp: String,
}

/// Print one received message.
pub fn print_message(channel: u8, payload: &[u8], source: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                channel,
                channel_name: channel_name(channel),
                payload_size: payload.len(),
                payload: payload_preview(payload),
                source,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "SIZE", "SOURCE", "PAYLOAD"])
                .add_row(vec![
                    format!("{channel} ({})", channel_name(channel)),
                    payload.len().to_string(),
                    source.to_string(),
                    payload_preview(payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "channel={} ({}) size={} source={} payload={}",
                channel,
                channel_name(channel),
                payload.len(),
                source,
                payload_preview(payload)
            );
        }
        OutputFormat::Raw => print_raw(payload),
    }
}

#[derive(Serialize)]
struct EncodedOutput<'a> {
    channel: u8,
    kind: &'a str,
    payload_size: usize,
    frame_size: usize,
    wire_size: usize,
    hex: String,
}

/// Print an encoded frame. `frame_size` is the logical size, `wire` the
/// stuffed bytes.
pub fn print_encoded(frame: &Frame, wire: &[u8], format: OutputFormat) {
    let hex = to_hex(wire);
    match format {
        OutputFormat::Json => {
            let out = EncodedOutput {
                channel: frame.channel,
                kind: frame.kind.as_str(),
                payload_size: frame.payload.len(),
                frame_size: frame.wire_size(),
                wire_size: wire.len(),
                hex,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "KIND", "SIZE", "WIRE", "BYTES"])
                .add_row(vec![
                    frame.channel.to_string(),
                    frame.kind.as_str().to_string(),
                    frame.payload.len().to_string(),
                    wire.len().to_string(),
                    hex,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{hex}"),
        OutputFormat::Raw => print_raw(wire),
    }
}

/// One entry of a decoded capture: a frame or the error that replaced one.
pub enum Decoded {
    Frame(Frame),
    Error(String),
}

#[derive(Serialize)]
struct DecodedOutput<'a> {
    index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

pub fn print_decoded(entries: &[Decoded], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for (index, entry) in entries.iter().enumerate() {
                let out = match entry {
                    Decoded::Frame(frame) => DecodedOutput {
                        index,
                        channel: Some(frame.channel),
                        kind: Some(frame.kind.as_str()),
                        payload_size: Some(frame.payload.len()),
                        payload: Some(payload_preview(&frame.payload)),
                        error: None,
                    },
                    Decoded::Error(err) => DecodedOutput {
                        index,
                        channel: None,
                        kind: None,
                        payload_size: None,
                        payload: None,
                        error: Some(err),
                    },
                };
                println!(
                    "{}",
                    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "CHANNEL", "KIND", "SIZE", "PAYLOAD"]);
            for (index, entry) in entries.iter().enumerate() {
                match entry {
                    Decoded::Frame(frame) => table.add_row(vec![
                        index.to_string(),
                        frame.channel.to_string(),
                        frame.kind.as_str().to_string(),
                        frame.payload.len().to_string(),
                        payload_preview(&frame.payload),
                    ]),
                    Decoded::Error(err) => table.add_row(vec![
                        index.to_string(),
                        "-".to_string(),
                        "error".to_string(),
                        "-".to_string(),
                        err.clone(),
                    ]),
                };
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (index, entry) in entries.iter().enumerate() {
                match entry {
                    Decoded::Frame(frame) => println!(
                        "#{index} channel={} kind={} size={} payload={}",
                        frame.channel,
                        frame.kind.as_str(),
                        frame.payload.len(),
                        payload_preview(&frame.payload)
                    ),
                    Decoded::Error(err) => println!("#{index} error: {err}"),
                }
            }
        }
        OutputFormat::Raw => {
            for entry in entries {
                if let Decoded::Frame(frame) = entry {
                    print_raw(&frame.payload);
                }
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn to_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Parse a hex string; whitespace and `:` separators are ignored.
pub fn from_hex(input: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':')
        .collect();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits ({})", digits.len()));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).map_err(|_| "non-ascii hex digit".to_string())?;
            u8::from_str_radix(text, 16).map_err(|_| format!("invalid hex byte '{text}'"))
        })
        .collect()
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ if payload.len() <= 32 => format!("0x{}", to_hex(payload)),
        _ => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
