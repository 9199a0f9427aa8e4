use bytes::BytesMut;
use lsd_transport::{LoopBudget, Transport};
use tracing::trace;

use crate::codec::{Frame, FrameDecoder};
use crate::error::Result;

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 256;

/// Default cap on bytes held between decodes.
pub const DEFAULT_MAX_BUFFERED: usize = 64 * 1024;

/// Pulls bytes from a [`Transport`] and turns them into frames.
///
/// Handles partial reads internally: bytes that do not yet form a whole frame
/// stay buffered (and the decoder keeps its partial state) for the next call.
#[derive(Debug)]
pub struct FrameReader {
    buf: BytesMut,
    decoder: FrameDecoder,
    max_buffered: usize,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    /// Create a reader with the default buffer cap.
    pub fn new() -> Self {
        Self::with_max_buffered(DEFAULT_MAX_BUFFERED)
    }

    /// Create a reader holding at most `max_buffered` undecoded bytes.
    pub fn with_max_buffered(max_buffered: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY.min(max_buffered)),
            decoder: FrameDecoder::new(),
            max_buffered: max_buffered.max(1),
        }
    }

    /// Move whatever the transport has ready into the receive buffer.
    ///
    /// Performs a single non-blocking read. Returns the number of bytes moved;
    /// zero when nothing was ready or the buffer is at its cap.
    pub fn pump<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<usize> {
        let room = self.max_buffered.saturating_sub(self.buf.len());
        if room == 0 {
            return Ok(0);
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let want = room.min(READ_CHUNK_SIZE);
        let read = transport.read(&mut chunk[..want])?;
        if read > 0 {
            trace!(bytes = read, buffered = self.buf.len() + read, "rx bytes");
            self.buf.extend_from_slice(&chunk[..read]);
        }
        Ok(read)
    }

    /// Decode the next frame from already buffered bytes.
    pub fn poll_frame(&mut self) -> Result<Option<Frame>> {
        self.decoder.decode(&mut self.buf)
    }

    /// Read the next complete frame, polling the transport at most
    /// `budget` times.
    ///
    /// Returns `Ok(None)` when the budget runs out first.
    pub fn read_frame<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        budget: &mut LoopBudget,
    ) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.poll_frame()? {
                return Ok(Some(frame));
            }
            if !budget.tick() {
                return Ok(None);
            }
            self.pump(transport)?;
        }
    }

    /// True while a frame has started arriving but is not complete.
    pub fn is_mid_frame(&self) -> bool {
        self.decoder.is_mid_frame()
    }

    /// Undecoded bytes held in the buffer.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop buffered bytes and any partial frame.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.decoder.reset();
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;
    use lsd_transport::{ShadowConfig, ShadowUart, StreamTransport};

    use super::*;
    use crate::codec::{encode_frame, SegmentKind, STX_ETX};
    use crate::error::FrameError;

    fn wire(frames: &[(u8, &[u8])]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (channel, payload) in frames {
            encode_frame(*channel, SegmentKind::Single, payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn read_single_frame() {
        let (_tx, mut rx) = ShadowUart::pair();
        rx.inject_rx(&wire(&[(1, b"hello")]));

        let mut reader = FrameReader::new();
        let frame = reader
            .read_frame(&mut rx, &mut LoopBudget::new(4))
            .unwrap()
            .unwrap();

        assert_eq!(frame.channel, 1);
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn read_multiple_frames() {
        let (_tx, mut rx) = ShadowUart::pair();
        rx.inject_rx(&wire(&[(1, b"one"), (2, b"two"), (3, b"three")]));

        let mut reader = FrameReader::new();
        let mut budget = LoopBudget::new(8);
        let f1 = reader.read_frame(&mut rx, &mut budget).unwrap().unwrap();
        let f2 = reader.read_frame(&mut rx, &mut budget).unwrap().unwrap();
        let f3 = reader.read_frame(&mut rx, &mut budget).unwrap().unwrap();

        assert_eq!((f1.channel, f1.payload.as_ref()), (1, b"one".as_ref()));
        assert_eq!((f2.channel, f2.payload.as_ref()), (2, b"two".as_ref()));
        assert_eq!((f3.channel, f3.payload.as_ref()), (3, b"three".as_ref()));
    }

    #[test]
    fn partial_read_handling() {
        let bytes = wire(&[(2, b"slow")]);
        let mut transport = StreamTransport::new(ByteByByteReader { bytes, pos: 0 });

        let mut reader = FrameReader::new();
        let frame = reader
            .read_frame(&mut transport, &mut LoopBudget::new(64))
            .unwrap()
            .unwrap();
        assert_eq!(frame.channel, 2);
        assert_eq!(frame.payload.as_ref(), b"slow");
    }

    #[test]
    fn budget_exhaustion_keeps_partial_frame() {
        let bytes = wire(&[(1, b"hello")]);
        let (_tx, mut rx) = ShadowUart::pair();
        rx.inject_rx(&bytes[..bytes.len() - 1]);

        let mut reader = FrameReader::new();
        let mut budget = LoopBudget::new(3);
        assert!(reader.read_frame(&mut rx, &mut budget).unwrap().is_none());
        assert!(budget.is_exhausted());
        assert!(reader.is_mid_frame());

        rx.inject_rx(&[STX_ETX]);
        let frame = reader
            .read_frame(&mut rx, &mut LoopBudget::new(3))
            .unwrap()
            .unwrap();
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn zero_budget_only_decodes_buffered_bytes() {
        let (_tx, mut rx) = ShadowUart::pair();
        rx.inject_rx(&wire(&[(0, b"x")]));

        let mut reader = FrameReader::new();
        assert!(reader
            .read_frame(&mut rx, &mut LoopBudget::new(0))
            .unwrap()
            .is_none());
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn framing_error_then_recovery() {
        let mut bytes = wire(&[(1, b"bad")]);
        let crc_at = bytes.len() - 2;
        bytes[crc_at] ^= 0x01;
        bytes.extend_from_slice(&wire(&[(1, b"good")]));

        let (_tx, mut rx) = ShadowUart::pair();
        rx.inject_rx(&bytes);

        let mut reader = FrameReader::new();
        let mut budget = LoopBudget::new(8);
        let err = reader.read_frame(&mut rx, &mut budget).unwrap_err();
        assert!(matches!(err, FrameError::ChecksumMismatch { .. }));

        let frame = reader.read_frame(&mut rx, &mut budget).unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), b"good");
    }

    #[test]
    fn buffer_cap_limits_pump() {
        let (_tx, mut rx) = ShadowUart::pair_with_config(ShadowConfig::default());
        rx.inject_rx(&[0x11; 32]);

        let mut reader = FrameReader::with_max_buffered(8);
        assert_eq!(reader.pump(&mut rx).unwrap(), 8);
        assert_eq!(reader.pump(&mut rx).unwrap(), 0);
        assert_eq!(rx.rx_pending(), 24);

        reader.reset();
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn closed_stream_propagates_transport_error() {
        let mut partial = BytesMut::new();
        partial.put_u8(STX_ETX);
        partial.put_u8(0x01);
        let mut transport = StreamTransport::new(std::io::Cursor::new(partial.to_vec()));

        let mut reader = FrameReader::new();
        let err = reader
            .read_frame(&mut transport, &mut LoopBudget::new(4))
            .unwrap_err();
        assert!(matches!(
            err,
            FrameError::Transport(lsd_transport::TransportError::Closed)
        ));
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl std::io::Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() {
                return Err(std::io::Error::from(std::io::ErrorKind::WouldBlock));
            }
            if buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    impl std::io::Write for ByteByByteReader {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
