/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The channel id is outside `0..MAX_CH`.
    #[error("channel {channel} out of range (max {max})")]
    InvalidChannel { channel: u8, max: u8 },

    /// The payload exceeds the per-frame maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A frame header names an impossible channel, kind or length.
    #[error("bad frame header (control 0x{control:02x}, length {len})")]
    BadHeader { control: u8, len: usize },

    /// A raw delimiter showed up before the frame was complete.
    #[error("unexpected delimiter after {received} frame bytes")]
    UnexpectedDelimiter { received: usize },

    /// An escape byte was followed by a byte that cannot be escaped.
    #[error("invalid escape sequence 0x7d 0x{0:02x}")]
    InvalidEscape(u8),

    /// The frame checksum does not match its contents.
    #[error("checksum mismatch (expected 0x{expected:02x}, got 0x{actual:02x})")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// The byte where the end delimiter belongs is something else.
    #[error("missing end delimiter (got 0x{0:02x})")]
    MissingTerminator(u8),

    /// The input ended before a whole frame was seen.
    #[error("incomplete frame")]
    Incomplete,

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] lsd_transport::TransportError),

    /// The polling budget ran out with bytes still unsent.
    #[error("write budget exhausted after {written} of {total} bytes")]
    WriteTimeout { written: usize, total: usize },
}

impl FrameError {
    /// True for malformed or incomplete wire data, which a caller may retry past.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            FrameError::BadHeader { .. }
                | FrameError::UnexpectedDelimiter { .. }
                | FrameError::InvalidEscape(_)
                | FrameError::ChecksumMismatch { .. }
                | FrameError::MissingTerminator(_)
                | FrameError::Incomplete
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
