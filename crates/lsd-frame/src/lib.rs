//! Delimited frame codec with channel multiplexing for the lsd serial link.
//!
//! Every datagram travels in one frame:
//! - an `STX` delimiter (`0x7E`)
//! - a control byte carrying the segment kind and the channel
//! - a 2-byte little-endian payload length
//! - the payload, a CRC-8 and an `ETX` delimiter (`0x7E` again)
//!
//! Delimiter and escape bytes inside a frame are byte-stuffed, so a receiver
//! can always find the next frame boundary after line noise.

pub mod channel;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use channel::{channel_name, is_valid, CONTROL};
pub use codec::{
    crc8, decode_frame, encode_frame, frame_size, Frame, FrameDecoder, SegmentKind, ESC, ESC_XOR,
    MAX_CH, MAX_LEN, MAX_SEGMENTED_LEN, OVERHEAD, SEGMENT_HEADER, STX_ETX,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
