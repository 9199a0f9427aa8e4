use bytes::{Buf, BytesMut};
use lsd_transport::{LoopBudget, Transport};
use tracing::{debug, trace};

use crate::codec::{encode_frame, SegmentKind};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Encodes frames into a pending buffer and drains it into a [`Transport`].
///
/// Several frames can be queued and then written in one budgeted pass, so a
/// segmented chunk either goes out whole or the call reports how far it got.
#[derive(Debug)]
pub struct FrameWriter {
    pending: BytesMut,
}

impl Default for FrameWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameWriter {
    pub fn new() -> Self {
        Self {
            pending: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Encode a frame and append it to the pending bytes.
    ///
    /// Nothing is queued if the frame is rejected.
    pub fn queue(&mut self, channel: u8, kind: SegmentKind, payload: &[u8]) -> Result<()> {
        encode_frame(channel, kind, payload, &mut self.pending)?;
        trace!(
            channel,
            kind = kind.as_str(),
            len = payload.len(),
            pending = self.pending.len(),
            "queued frame"
        );
        Ok(())
    }

    /// Bytes queued but not yet written.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Drop queued bytes without writing them.
    pub fn discard(&mut self) {
        self.pending.clear();
    }

    /// Write all pending bytes, polling the transport at most `budget` times.
    ///
    /// `service` runs once per polling iteration, before the write attempt,
    /// with the iteration number (starting at 1); the link uses it to keep
    /// draining the receiver while it transmits.
    ///
    /// On budget exhaustion or transport failure the unsent tail is dropped.
    /// A frame cut short on the wire is closed by the next frame's start
    /// delimiter on the peer; the next frame itself still decodes.
    pub fn write_pending<T, F>(
        &mut self,
        transport: &mut T,
        budget: &mut LoopBudget,
        mut service: F,
    ) -> Result<usize>
    where
        T: Transport + ?Sized,
        F: FnMut(&mut T, u32) -> Result<()>,
    {
        let total = self.pending.len();
        let mut written = 0usize;

        while !self.pending.is_empty() {
            if !budget.tick() {
                self.pending.clear();
                debug!(written, total, "write budget exhausted");
                return Err(FrameError::WriteTimeout { written, total });
            }

            if let Err(err) = service(&mut *transport, budget.used()) {
                self.pending.clear();
                return Err(err);
            }

            match transport.write(&self.pending) {
                Ok(n) => {
                    self.pending.advance(n);
                    written += n;
                }
                Err(err) => {
                    self.pending.clear();
                    return Err(FrameError::Transport(err));
                }
            }
        }

        transport.flush()?;
        Ok(written)
    }

    /// Encode and write one frame.
    pub fn send<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        channel: u8,
        kind: SegmentKind,
        payload: &[u8],
        budget: &mut LoopBudget,
    ) -> Result<usize> {
        self.queue(channel, kind, payload)?;
        self.write_pending(transport, budget, |_, _| Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use lsd_transport::{ShadowConfig, ShadowUart, TransportError};

    use super::*;
    use crate::codec::{decode_frame, frame_size, FrameDecoder, MAX_CH, MAX_LEN};

    #[test]
    fn write_single_frame() {
        let (mut tx, rx) = ShadowUart::pair();
        let mut writer = FrameWriter::new();

        let n = writer
            .send(&mut tx, 1, SegmentKind::Single, b"hello", &mut LoopBudget::new(8))
            .unwrap();
        assert_eq!(n, frame_size(5));

        let frame = decode_frame(&rx.take_rx()).unwrap();
        assert_eq!(frame.channel, 1);
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn write_multiple_queued_frames() {
        let (mut tx, rx) = ShadowUart::pair();
        let mut writer = FrameWriter::new();

        writer.queue(1, SegmentKind::Start, b"one").unwrap();
        writer.queue(1, SegmentKind::Next, b"two").unwrap();
        writer.queue(1, SegmentKind::End, b"three").unwrap();
        writer
            .write_pending(&mut tx, &mut LoopBudget::new(16), |_, _| Ok(()))
            .unwrap();
        assert_eq!(writer.pending(), 0);

        let mut wire = BytesMut::from(rx.take_rx().as_slice());
        let mut decoder = FrameDecoder::new();
        let f1 = decoder.decode(&mut wire).unwrap().unwrap();
        let f2 = decoder.decode(&mut wire).unwrap().unwrap();
        let f3 = decoder.decode(&mut wire).unwrap().unwrap();

        assert_eq!((f1.kind, f1.payload.as_ref()), (SegmentKind::Start, b"one".as_ref()));
        assert_eq!((f2.kind, f2.payload.as_ref()), (SegmentKind::Next, b"two".as_ref()));
        assert_eq!((f3.kind, f3.payload.as_ref()), (SegmentKind::End, b"three".as_ref()));
    }

    #[test]
    fn rejected_frame_writes_nothing() {
        let (mut tx, rx) = ShadowUart::pair();
        let mut writer = FrameWriter::new();

        let payload = vec![0u8; MAX_LEN + 1];
        let err = writer
            .send(&mut tx, 0, SegmentKind::Single, &payload, &mut LoopBudget::new(8))
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));

        let err = writer
            .send(&mut tx, MAX_CH, SegmentKind::Single, b"x", &mut LoopBudget::new(8))
            .unwrap_err();
        assert!(matches!(err, FrameError::InvalidChannel { .. }));

        assert_eq!(writer.pending(), 0);
        assert_eq!(rx.rx_pending(), 0);
    }

    #[test]
    fn small_bursts_need_several_iterations() {
        let (mut tx, rx) = ShadowUart::pair_with_config(ShadowConfig {
            rx_capacity: 1024,
            tx_burst: 4,
        });
        let mut writer = FrameWriter::new();

        let mut budget = LoopBudget::new(100);
        writer
            .send(&mut tx, 2, SegmentKind::Single, b"0123456789", &mut budget)
            .unwrap();
        assert_eq!(budget.used(), 4);

        let frame = decode_frame(&rx.take_rx()).unwrap();
        assert_eq!(frame.payload.as_ref(), b"0123456789");
    }

    #[test]
    fn stalled_transport_times_out_and_drops_tail() {
        let (mut tx, rx) = ShadowUart::pair();
        tx.set_tx_stalled(true);
        let mut writer = FrameWriter::new();

        let err = writer
            .send(&mut tx, 1, SegmentKind::Single, b"stuck", &mut LoopBudget::new(5))
            .unwrap_err();
        assert!(matches!(err, FrameError::WriteTimeout { written: 0, total } if total == frame_size(5)));
        assert_eq!(writer.pending(), 0);
        assert_eq!(rx.rx_pending(), 0);
    }

    #[test]
    fn service_hook_runs_every_iteration() {
        let (mut tx, _rx) = ShadowUart::pair_with_config(ShadowConfig {
            rx_capacity: 1024,
            tx_burst: 2,
        });
        let mut writer = FrameWriter::new();
        writer.queue(0, SegmentKind::Single, b"abcd").unwrap();

        let mut seen = Vec::new();
        writer
            .write_pending(&mut tx, &mut LoopBudget::new(50), |_, iteration| {
                seen.push(iteration);
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn service_error_aborts_write() {
        let (mut tx, rx) = ShadowUart::pair();
        let mut writer = FrameWriter::new();
        writer.queue(0, SegmentKind::Single, b"abcd").unwrap();

        let err = writer
            .write_pending(&mut tx, &mut LoopBudget::new(50), |_, _| {
                Err(FrameError::Transport(TransportError::Closed))
            })
            .unwrap_err();
        assert!(matches!(err, FrameError::Transport(TransportError::Closed)));
        assert_eq!(writer.pending(), 0);
        assert_eq!(rx.rx_pending(), 0);
    }
}
