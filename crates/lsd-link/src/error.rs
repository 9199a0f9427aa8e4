use lsd_frame::FrameError;
use lsd_transport::TransportError;

/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// An operation was attempted before [`Link::init`](crate::Link::init).
    #[error("link not initialized")]
    NotInitialized,

    /// The channel id is outside `0..MAX_CH`.
    #[error("channel {channel} out of range (max {max})")]
    InvalidChannel { channel: u8, max: u8 },

    /// The payload exceeds what the operation can carry.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An outbound segmented message is already open.
    #[error("segmented send already open on channel {0}")]
    SegmentActive(u8),

    /// `split_next`/`split_end` without a preceding `split_start`.
    #[error("no segmented send is open")]
    NoActiveSegment,

    /// A chunk would leave the segmented message short of or past its total.
    #[error("segment chunk of {chunk} bytes after {sent} sent does not fit total {total}")]
    SegmentLength {
        sent: usize,
        chunk: usize,
        total: usize,
    },

    /// The caller's buffer cannot hold the next message; it stays pending.
    #[error("receive buffer too small ({needed} bytes needed, {capacity} available)")]
    BufferTooSmall { needed: usize, capacity: usize },

    /// The polling budget ran out.
    #[error("polling budget of {iterations} iterations exhausted")]
    Timeout { iterations: u32 },

    /// Next or End arrived with no segmented message open on the channel.
    #[error("unexpected {kind} segment on channel {channel}")]
    UnexpectedSegment { channel: u8, kind: &'static str },

    /// A Start frame too short to carry the total length.
    #[error("start segment on channel {channel} carries no total length")]
    MalformedStart { channel: u8 },

    /// A new Start replaced a partially received message.
    #[error("segmented message on channel {channel} interrupted after {received} of {total} bytes")]
    SegmentInterrupted {
        channel: u8,
        received: usize,
        total: usize,
    },

    /// Segments carried more bytes than the declared total.
    #[error("segmented message on channel {channel} overflowed ({received} of {total} bytes)")]
    SegmentOverflow {
        channel: u8,
        received: usize,
        total: usize,
    },

    /// The End segment closed the message short of its total.
    #[error("segmented message on channel {channel} ended at {received} of {total} bytes")]
    SegmentTruncated {
        channel: u8,
        received: usize,
        total: usize,
    },

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl LinkError {
    /// Map the error onto the three-valued status code.
    pub fn status(&self) -> Status {
        match self {
            LinkError::Timeout { .. }
            | LinkError::UnexpectedSegment { .. }
            | LinkError::MalformedStart { .. }
            | LinkError::SegmentInterrupted { .. }
            | LinkError::SegmentOverflow { .. }
            | LinkError::SegmentTruncated { .. } => Status::FramingError,
            LinkError::Frame(FrameError::WriteTimeout { .. }) => Status::FramingError,
            LinkError::Frame(err) if err.is_framing() => Status::FramingError,
            _ => Status::Error,
        }
    }

    /// True when the caller may simply try again.
    pub fn is_retryable(&self) -> bool {
        self.status() == Status::FramingError
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// Status codes returned by link operations.
///
/// `FramingError` is retryable (timeout or malformed wire data); `Error`
/// means the request itself was invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum Status {
    Ok = 0,
    Error = -1,
    FramingError = -2,
}

impl Status {
    /// Status of an operation result.
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(err) => err.status(),
        }
    }

    /// Numeric code.
    pub fn code(self) -> i32 {
        self as i8 as i32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Error => "ERROR",
            Status::FramingError => "FRAMING_ERROR",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(Status::Ok.code(), 0);
        assert_eq!(Status::Error.code(), -1);
        assert_eq!(Status::FramingError.code(), -2);
        assert_eq!(Status::FramingError.to_string(), "FRAMING_ERROR");
    }

    #[test]
    fn argument_errors_are_not_retryable() {
        let cases = [
            LinkError::NotInitialized,
            LinkError::InvalidChannel { channel: 9, max: 4 },
            LinkError::PayloadTooLarge { size: 5000, max: 4095 },
            LinkError::NoActiveSegment,
            LinkError::BufferTooSmall {
                needed: 10,
                capacity: 2,
            },
            LinkError::Frame(FrameError::PayloadTooLarge { size: 1, max: 0 }),
            LinkError::Transport(TransportError::Closed),
        ];
        for err in cases {
            assert_eq!(err.status(), Status::Error, "{err}");
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn wire_errors_are_framing() {
        let cases = [
            LinkError::Timeout { iterations: 3 },
            LinkError::UnexpectedSegment {
                channel: 1,
                kind: "next",
            },
            LinkError::Frame(FrameError::ChecksumMismatch {
                expected: 1,
                actual: 2,
            }),
            LinkError::Frame(FrameError::WriteTimeout {
                written: 0,
                total: 8,
            }),
        ];
        for err in cases {
            assert_eq!(err.status(), Status::FramingError, "{err}");
        }
    }

    #[test]
    fn status_of_result() {
        let ok: Result<()> = Ok(());
        let bad: Result<()> = Err(LinkError::NotInitialized);
        assert_eq!(Status::of(&ok), Status::Ok);
        assert_eq!(Status::of(&bad), Status::Error);
    }
}
