use bytes::BytesMut;
use lsd_frame::{encode_frame, Frame, SegmentKind};

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_encoded, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = args.payload.resolve()?;
    let kind = SegmentKind::from(args.kind);

    let mut wire = BytesMut::new();
    encode_frame(args.channel, kind, &payload, &mut wire)
        .map_err(|err| frame_error("encode failed", err))?;

    let frame = Frame::segment(args.channel, kind, payload);
    print_encoded(&frame, &wire, format);
    Ok(SUCCESS)
}
