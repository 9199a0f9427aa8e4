use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Number of channels a link multiplexes.
pub const MAX_CH: u8 = 4;

/// Maximum payload bytes carried by one frame.
pub const MAX_LEN: usize = 4095;

/// Logical bytes added to every payload: STX + control + length (2) + CRC + ETX.
pub const OVERHEAD: usize = 6;

/// Start and end delimiter.
pub const STX_ETX: u8 = 0x7E;

/// Escape byte for stuffing delimiter/escape values inside a frame.
pub const ESC: u8 = 0x7D;

/// Mask applied to a byte following [`ESC`].
pub const ESC_XOR: u8 = 0x20;

/// Bytes of total-length prefix at the start of a [`SegmentKind::Start`] payload.
pub const SEGMENT_HEADER: usize = 2;

/// Largest message a segmented transfer can carry.
pub const MAX_SEGMENTED_LEN: usize = u16::MAX as usize;

const HEADER_LEN: usize = 3;
const CRC8_POLY: u8 = 0xD5;

/// Logical size of a frame carrying `payload_len` bytes, before stuffing.
pub const fn frame_size(payload_len: usize) -> usize {
    payload_len + OVERHEAD
}

/// Role of a frame within a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    /// A whole message in one frame.
    Single = 0,
    /// First frame of a segmented message; payload starts with the u16 LE total.
    Start = 1,
    /// Continuation of a segmented message.
    Next = 2,
    /// Last frame of a segmented message.
    End = 3,
}

impl SegmentKind {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Single),
            1 => Some(Self::Start),
            2 => Some(Self::Next),
            3 => Some(Self::End),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Start => "start",
            Self::Next => "next",
            Self::End => "end",
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The channel this frame belongs to.
    pub channel: u8,
    /// Position of this frame within its message.
    pub kind: SegmentKind,
    /// The frame payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a single-frame message.
    pub fn new(channel: u8, payload: impl Into<Bytes>) -> Self {
        Self::segment(channel, SegmentKind::Single, payload)
    }

    /// Create a frame with an explicit segment kind.
    pub fn segment(channel: u8, kind: SegmentKind, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            kind,
            payload: payload.into(),
        }
    }

    /// Logical wire size of this frame (overhead + payload, before stuffing).
    pub fn wire_size(&self) -> usize {
        frame_size(self.payload.len())
    }
}

/// CRC-8 with polynomial 0xD5 (DVB-S2), initial value 0.
pub fn crc8(data: &[u8]) -> u8 {
    crc8_update(0, data)
}

fn crc8_update(mut crc: u8, data: &[u8]) -> u8 {
    for &byte in data {
        crc = crc8_byte(crc, byte);
    }
    crc
}

fn crc8_byte(mut crc: u8, byte: u8) -> u8 {
    crc ^= byte;
    for _ in 0..8 {
        crc = if crc & 0x80 != 0 {
            (crc << 1) ^ CRC8_POLY
        } else {
            crc << 1
        };
    }
    crc
}

fn control_byte(channel: u8, kind: SegmentKind) -> u8 {
    ((kind as u8) << 4) | channel
}

fn needs_escape(byte: u8) -> bool {
    byte == STX_ETX || byte == ESC
}

fn put_stuffed(dst: &mut BytesMut, bytes: &[u8]) {
    for &byte in bytes {
        if needs_escape(byte) {
            dst.put_u8(ESC);
            dst.put_u8(byte ^ ESC_XOR);
        } else {
            dst.put_u8(byte);
        }
    }
}

/// Encode a frame into the wire format.
///
/// Wire format (before stuffing):
/// ```text
/// ┌──────┬─────────────────┬──────────┬─────────┬───────┬──────┐
/// │ STX  │ Control         │ Length   │ Payload │ CRC-8 │ ETX  │
/// │ 0x7E │ kind<<4 | chan  │ (2B LE)  │         │       │ 0x7E │
/// └──────┴─────────────────┴──────────┴─────────┴───────┴──────┘
/// ```
/// Every byte between the delimiters equal to `0x7E` or `0x7D` goes out as
/// `0x7D, byte ^ 0x20`. The CRC covers control, length and payload.
///
/// Nothing is written to `dst` when the arguments are rejected.
pub fn encode_frame(
    channel: u8,
    kind: SegmentKind,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    if channel >= MAX_CH {
        return Err(FrameError::InvalidChannel {
            channel,
            max: MAX_CH,
        });
    }
    if payload.len() > MAX_LEN {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_LEN,
        });
    }

    let len = payload.len() as u16;
    let header = [control_byte(channel, kind), len as u8, (len >> 8) as u8];
    let crc = crc8_update(crc8(&header), payload);

    // Worst case every byte between the delimiters is stuffed.
    dst.reserve(2 + 2 * (HEADER_LEN + payload.len() + 1));
    dst.put_u8(STX_ETX);
    put_stuffed(dst, &header);
    put_stuffed(dst, payload);
    put_stuffed(dst, &[crc]);
    dst.put_u8(STX_ETX);
    Ok(())
}

/// Decode exactly one frame from a complete byte slice.
///
/// Leading noise is skipped. Returns [`FrameError::Incomplete`] if the slice
/// ends before the frame's end delimiter.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    let mut src = BytesMut::from(bytes);
    let mut decoder = FrameDecoder::new();
    decoder.decode(&mut src)?.ok_or(FrameError::Incomplete)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Discarding bytes until a delimiter.
    Scan,
    Header,
    Payload,
    Checksum,
    Terminator,
}

enum Step {
    Continue,
    Frame(Frame),
    Error(FrameError),
}

/// Incremental frame decoder.
///
/// Keeps partial-frame state between calls, so bytes can be fed as they
/// trickle in from the UART. After any framing error the decoder is back to
/// scanning for the next delimiter.
#[derive(Debug)]
pub struct FrameDecoder {
    state: State,
    escaped: bool,
    header: [u8; HEADER_LEN],
    received: usize,
    channel: u8,
    kind: SegmentKind,
    len: usize,
    crc: u8,
    payload: BytesMut,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: State::Scan,
            escaped: false,
            header: [0; HEADER_LEN],
            received: 0,
            channel: 0,
            kind: SegmentKind::Single,
            len: 0,
            crc: 0,
            payload: BytesMut::new(),
        }
    }

    /// Decode the next frame from `src`.
    ///
    /// Consumed bytes are removed from `src`. Returns `Ok(None)` when `src` ran
    /// out before a frame completed; the partial frame is kept for the next
    /// call. On a framing error the offending bytes are consumed, the bytes
    /// after them stay in `src`.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let mut consumed = 0usize;
        let result = loop {
            let Some(&byte) = src.get(consumed) else {
                break Ok(None);
            };
            consumed += 1;
            match self.step(byte) {
                Step::Continue => {}
                Step::Frame(frame) => break Ok(Some(frame)),
                Step::Error(err) => break Err(err),
            }
        };
        src.advance(consumed);
        result
    }

    /// True while a frame has been started but not finished.
    ///
    /// A delimiter with nothing after it yet does not count.
    pub fn is_mid_frame(&self) -> bool {
        match self.state {
            State::Scan => false,
            State::Header => self.received > 0 || self.escaped,
            _ => true,
        }
    }

    /// Drop any partial frame and go back to scanning.
    pub fn reset(&mut self) {
        self.state = State::Scan;
        self.escaped = false;
        self.received = 0;
        self.payload.clear();
    }

    fn begin(&mut self) {
        self.reset();
        self.state = State::Header;
        self.crc = 0;
    }

    fn fail(&mut self, err: FrameError) -> Step {
        self.reset();
        Step::Error(err)
    }

    fn step(&mut self, byte: u8) -> Step {
        if byte == STX_ETX {
            return match self.state {
                State::Scan => {
                    self.begin();
                    Step::Continue
                }
                // Back-to-back delimiters: idle fill, or a separate start
                // delimiter after the previous frame's terminator.
                State::Header if self.received == 0 && !self.escaped => {
                    self.begin();
                    Step::Continue
                }
                State::Terminator => {
                    let frame = Frame {
                        channel: self.channel,
                        kind: self.kind,
                        payload: self.payload.split().freeze(),
                    };
                    // The terminator also opens the next frame.
                    self.begin();
                    Step::Frame(frame)
                }
                _ => {
                    let received = self.received;
                    self.begin();
                    Step::Error(FrameError::UnexpectedDelimiter { received })
                }
            };
        }

        match self.state {
            State::Scan => return Step::Continue,
            State::Terminator => return self.fail(FrameError::MissingTerminator(byte)),
            _ => {}
        }

        let byte = if self.escaped {
            self.escaped = false;
            let unescaped = byte ^ ESC_XOR;
            if !needs_escape(unescaped) {
                return self.fail(FrameError::InvalidEscape(byte));
            }
            unescaped
        } else if byte == ESC {
            self.escaped = true;
            return Step::Continue;
        } else {
            byte
        };

        self.received += 1;
        match self.state {
            State::Header => {
                self.header[self.received - 1] = byte;
                self.crc = crc8_byte(self.crc, byte);
                if self.received == HEADER_LEN {
                    return self.parse_header();
                }
            }
            State::Payload => {
                self.payload.put_u8(byte);
                self.crc = crc8_byte(self.crc, byte);
                if self.payload.len() == self.len {
                    self.state = State::Checksum;
                }
            }
            State::Checksum => {
                if byte != self.crc {
                    let expected = self.crc;
                    return self.fail(FrameError::ChecksumMismatch {
                        expected,
                        actual: byte,
                    });
                }
                self.state = State::Terminator;
            }
            State::Scan | State::Terminator => {}
        }
        Step::Continue
    }

    fn parse_header(&mut self) -> Step {
        let control = self.header[0];
        let len = u16::from_le_bytes([self.header[1], self.header[2]]) as usize;
        let channel = control & 0x0F;
        let kind = SegmentKind::from_bits(control >> 4);

        match kind {
            Some(kind) if channel < MAX_CH && len <= MAX_LEN => {
                self.channel = channel;
                self.kind = kind;
                self.len = len;
                self.payload.reserve(len);
                self.state = if len == 0 {
                    State::Checksum
                } else {
                    State::Payload
                };
                Step::Continue
            }
            _ => self.fail(FrameError::BadHeader { control, len }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(channel: u8, kind: SegmentKind, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(channel, kind, payload, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let payload = b"hello, lsd!";
        let wire = encoded(1, SegmentKind::Single, payload);

        assert_eq!(wire.len(), frame_size(payload.len()));

        let frame = decode_frame(&wire).unwrap();
        assert_eq!(frame.channel, 1);
        assert_eq!(frame.kind, SegmentKind::Single);
        assert_eq!(frame.payload.as_ref(), payload);
    }

    #[test]
    fn test_known_wire_layout() {
        let wire = encoded(0, SegmentKind::Single, &[0xAA, 0xBB]);
        let crc = crc8(&[0x00, 0x02, 0x00, 0xAA, 0xBB]);
        assert_eq!(wire.as_ref(), &[0x7E, 0x00, 0x02, 0x00, 0xAA, 0xBB, crc, 0x7E]);
    }

    #[test]
    fn test_crc8_check_value() {
        assert_eq!(crc8(b"123456789"), 0xBC);
        assert_eq!(crc8(&[]), 0);
    }

    #[test]
    fn test_delimiters_in_payload_are_stuffed() {
        let payload = [STX_ETX, 0x01, ESC, STX_ETX];
        let wire = encoded(2, SegmentKind::Single, &payload);

        let inner = &wire[1..wire.len() - 1];
        assert!(!inner.contains(&STX_ETX));
        assert_eq!(wire.len(), frame_size(payload.len()) + 3);

        let frame = decode_frame(&wire).unwrap();
        assert_eq!(frame.payload.as_ref(), &payload);
    }

    #[test]
    fn test_control_byte_carries_kind_and_channel() {
        let wire = encoded(3, SegmentKind::End, b"z");
        assert_eq!(wire[1], 0x33);
        let frame = decode_frame(&wire).unwrap();
        assert_eq!((frame.channel, frame.kind), (3, SegmentKind::End));
    }

    #[test]
    fn test_encode_rejects_invalid_channel() {
        let mut buf = BytesMut::new();
        let err = encode_frame(MAX_CH, SegmentKind::Single, b"x", &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::InvalidChannel { channel: 4, .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let mut buf = BytesMut::new();
        let payload = vec![0u8; MAX_LEN + 1];
        let err = encode_frame(0, SegmentKind::Single, &payload, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size, max } if size == MAX_LEN + 1 && max == MAX_LEN));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_max_len_payload_roundtrips() {
        let payload: Vec<u8> = (0..MAX_LEN).map(|i| i as u8).collect();
        let wire = encoded(1, SegmentKind::Next, &payload);
        let frame = decode_frame(&wire).unwrap();
        assert_eq!(frame.payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn test_empty_payload() {
        let wire = encoded(0, SegmentKind::End, b"");
        assert_eq!(wire.len(), OVERHEAD);
        let frame = decode_frame(&wire).unwrap();
        assert!(frame.payload.is_empty());
        assert_eq!(frame.kind, SegmentKind::End);
    }

    #[test]
    fn test_truncated_frame_is_incomplete() {
        let wire = encoded(1, SegmentKind::Single, b"hello");
        let err = decode_frame(&wire[..wire.len() - 1]).unwrap_err();
        assert!(matches!(err, FrameError::Incomplete));
        assert!(err.is_framing());
    }

    #[test]
    fn test_partial_frame_completes_when_terminator_arrives() {
        let wire = encoded(1, SegmentKind::Single, b"hello");
        let mut decoder = FrameDecoder::new();

        let mut src = BytesMut::from(&wire[..wire.len() - 1]);
        assert!(decoder.decode(&mut src).unwrap().is_none());
        assert!(decoder.is_mid_frame());
        assert!(src.is_empty());

        src.put_u8(STX_ETX);
        let frame = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), b"hello");
        assert!(!decoder.is_mid_frame());
    }

    #[test]
    fn test_noise_before_frame_is_skipped() {
        let mut src = BytesMut::from(&[0x01, 0x02, 0x03][..]);
        src.extend_from_slice(&encoded(2, SegmentKind::Single, b"ok"));

        let frame = FrameDecoder::new().decode(&mut src).unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), b"ok");
    }

    #[test]
    fn test_multiple_frames() {
        let mut src = encoded(1, SegmentKind::Single, b"first");
        src.extend_from_slice(&encoded(2, SegmentKind::Single, b"second"));
        let mut decoder = FrameDecoder::new();

        let f1 = decoder.decode(&mut src).unwrap().unwrap();
        let f2 = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!((f1.channel, f1.payload.as_ref()), (1, b"first".as_ref()));
        assert_eq!((f2.channel, f2.payload.as_ref()), (2, b"second".as_ref()));
        assert!(src.is_empty());
    }

    #[test]
    fn test_cut_frame_resynchronizes_on_next_start() {
        let first = encoded(1, SegmentKind::Single, b"lost-tail");
        let mut src = BytesMut::from(&first[..5]);
        src.extend_from_slice(&encoded(2, SegmentKind::Single, b"next"));
        let mut decoder = FrameDecoder::new();

        let err = decoder.decode(&mut src).unwrap_err();
        assert!(matches!(err, FrameError::UnexpectedDelimiter { received: 4 }));

        let frame = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!((frame.channel, frame.payload.as_ref()), (2, b"next".as_ref()));
    }

    #[test]
    fn test_frame_missing_terminator_costs_only_itself() {
        let cut = encoded(1, SegmentKind::Single, b"cut");
        let mut src = BytesMut::from(&cut[..cut.len() - 1]);
        src.extend_from_slice(&encoded(1, SegmentKind::Single, b"two"));
        src.extend_from_slice(&encoded(1, SegmentKind::Single, b"three"));
        let mut decoder = FrameDecoder::new();

        let mut payloads = Vec::new();
        while let Some(frame) = decoder.decode(&mut src).unwrap() {
            payloads.push(frame.payload.to_vec());
        }
        assert_eq!(payloads, vec![b"cut".to_vec(), b"two".to_vec(), b"three".to_vec()]);
        assert!(src.is_empty());
        assert!(!decoder.is_mid_frame());
    }

    #[test]
    fn test_shared_delimiter_between_frames() {
        let first = encoded(1, SegmentKind::Single, b"a");
        let second = encoded(2, SegmentKind::Single, b"b");
        let mut src = BytesMut::from(&first[..]);
        src.extend_from_slice(&second[1..]);
        let mut decoder = FrameDecoder::new();

        let f1 = decoder.decode(&mut src).unwrap().unwrap();
        let f2 = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(f1.payload.as_ref(), b"a");
        assert_eq!((f2.channel, f2.payload.as_ref()), (2, b"b".as_ref()));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut wire = encoded(1, SegmentKind::Single, b"abc");
        let crc_at = wire.len() - 2;
        wire[crc_at] ^= 0x01;

        let err = decode_frame(&wire).unwrap_err();
        assert!(matches!(err, FrameError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_missing_terminator() {
        let mut wire = encoded(1, SegmentKind::Single, b"abc");
        let end = wire.len() - 1;
        wire[end] = 0x00;

        let err = decode_frame(&wire).unwrap_err();
        assert!(matches!(err, FrameError::MissingTerminator(0x00)));
    }

    #[test]
    fn test_bad_header_channel() {
        let src = [STX_ETX, 0x05, 0x01, 0x00];
        let err = decode_frame(&src).unwrap_err();
        assert!(matches!(err, FrameError::BadHeader { control: 0x05, len: 1 }));
    }

    #[test]
    fn test_bad_header_length() {
        let src = [STX_ETX, 0x00, 0xFF, 0xFF];
        let err = decode_frame(&src).unwrap_err();
        assert!(matches!(err, FrameError::BadHeader { len: 0xFFFF, .. }));
    }

    #[test]
    fn test_invalid_escape() {
        let src = [STX_ETX, ESC, 0x00];
        let err = decode_frame(&src).unwrap_err();
        assert!(matches!(err, FrameError::InvalidEscape(0x00)));
    }

    #[test]
    fn test_idle_delimiters_between_frames() {
        let mut src = BytesMut::from(&[STX_ETX, STX_ETX, STX_ETX][..]);
        src.extend_from_slice(&encoded(0, SegmentKind::Single, b"x"));

        let frame = FrameDecoder::new().decode(&mut src).unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), b"x");
    }

    #[test]
    fn test_frame_wire_size() {
        let frame = Frame::new(1, Bytes::from_static(b"test"));
        assert_eq!(frame.wire_size(), OVERHEAD + 4);
        assert_eq!(frame.kind, SegmentKind::Single);
    }
}
