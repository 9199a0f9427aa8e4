use std::fs;
use std::io::Read;

use bytes::BytesMut;
use lsd_frame::{FrameDecoder, FrameError};
use tracing::{debug, warn};

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{from_hex, print_decoded, Decoded, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let capture = read_capture(&args)?;
    let (entries, errors) = decode_capture(&capture);
    debug!(bytes = capture.len(), entries = entries.len(), errors, "decoded capture");
    print_decoded(&entries, format);

    if errors > 0 {
        warn!(errors, "capture contains malformed frames");
        return Ok(DATA_INVALID);
    }
    Ok(SUCCESS)
}

fn read_capture(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    if let Some(hex) = &args.hex {
        return from_hex(hex)
            .map_err(|err| CliError::new(USAGE, format!("--hex is not valid hex: {err}")));
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    let mut capture = Vec::new();
    std::io::stdin()
        .read_to_end(&mut capture)
        .map_err(|err| io_error("failed reading stdin", err))?;
    Ok(capture)
}

/// Decode a whole capture, recording framing errors in place.
///
/// A capture that stops inside a frame ends with an incomplete-frame entry.
fn decode_capture(capture: &[u8]) -> (Vec<Decoded>, usize) {
    let mut src = BytesMut::from(capture);
    let mut decoder = FrameDecoder::new();
    let mut entries = Vec::new();
    let mut errors = 0usize;

    loop {
        match decoder.decode(&mut src) {
            Ok(Some(frame)) => entries.push(Decoded::Frame(frame)),
            Ok(None) => break,
            Err(err) => {
                errors += 1;
                entries.push(Decoded::Error(err.to_string()));
            }
        }
    }
    if decoder.is_mid_frame() {
        errors += 1;
        entries.push(Decoded::Error(FrameError::Incomplete.to_string()));
    }
    (entries, errors)
}
