use bytes::{BufMut, BytesMut};
use lsd_frame::{
    channel_name, Frame, FrameError, FrameReader, FrameWriter, SegmentKind, MAX_LEN,
    MAX_SEGMENTED_LEN, SEGMENT_HEADER,
};
use lsd_transport::{LoopBudget, Transport};
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::segment::{self, Message, Reassembler, TxSegment};
use crate::table::{self, ChannelTable};

/// Lifecycle of a [`Link`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Uninitialized,
    Ready,
}

/// Where a received message landed in the caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub channel: u8,
    pub len: usize,
}

/// A link driver over one transport.
///
/// Owns the channel table, the outbound segment descriptor and the per-channel
/// reassembly buffers. All calls are synchronous and bounded by their
/// `max_loop_cnt` argument.
#[derive(Debug)]
pub struct Link<T> {
    transport: T,
    config: LinkConfig,
    state: LinkState,
    table: ChannelTable,
    reader: FrameReader,
    writer: FrameWriter,
    reassembly: Reassembler,
    tx_segment: Option<TxSegment>,
    pending: Option<Message>,
}

impl<T: Transport> Link<T> {
    /// Create a link with the default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, LinkConfig::default())
    }

    pub fn with_config(transport: T, config: LinkConfig) -> Self {
        Self {
            table: ChannelTable::new(config.channels_enabled_at_init),
            reader: FrameReader::with_max_buffered(config.rx_buffer),
            writer: FrameWriter::new(),
            reassembly: Reassembler::new(config.max_message_len),
            tx_segment: None,
            pending: None,
            state: LinkState::Uninitialized,
            transport,
            config,
        }
    }

    /// Bring the link to `Ready`, resetting the channel table and all
    /// segmentation and receive state. Safe to call repeatedly.
    pub fn init(&mut self) {
        self.table.reset(self.config.channels_enabled_at_init);
        self.reader.reset();
        self.writer.discard();
        self.reassembly.reset();
        self.tx_segment = None;
        self.pending = None;
        self.state = LinkState::Ready;
        info!(
            channels_enabled = self.config.channels_enabled_at_init,
            recv_prio = self.config.recv_prio,
            "link initialized"
        );
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            LinkState::Ready => Ok(()),
            LinkState::Uninitialized => Err(LinkError::NotInitialized),
        }
    }

    pub fn ch_enable(&mut self, channel: u8) -> Result<()> {
        self.ensure_ready()?;
        self.table.enable(channel)
    }

    /// Disable reception on `channel`. A partially reassembled message on it
    /// is dropped.
    pub fn ch_disable(&mut self, channel: u8) -> Result<()> {
        self.ensure_ready()?;
        self.table.disable(channel)?;
        self.reassembly.discard(channel);
        Ok(())
    }

    pub fn is_enabled(&self, channel: u8) -> bool {
        self.state == LinkState::Ready && self.table.is_enabled(channel)
    }

    /// Install a callback for messages on `channel`; see [`Link::poll`].
    pub fn subscribe<F>(&mut self, channel: u8, handler: F) -> Result<()>
    where
        F: FnMut(u8, &[u8]) + 'static,
    {
        self.ensure_ready()?;
        self.table.subscribe(channel, Box::new(handler))
    }

    pub fn unsubscribe(&mut self, channel: u8) -> Result<bool> {
        self.ensure_ready()?;
        self.table.unsubscribe(channel)
    }

    /// Send `data` as one frame on `channel`.
    pub fn send(&mut self, data: &[u8], channel: u8, max_loop_cnt: u32) -> Result<()> {
        self.ensure_ready()?;
        table::index(channel)?;
        if data.len() > MAX_LEN {
            return Err(LinkError::PayloadTooLarge {
                size: data.len(),
                max: MAX_LEN,
            });
        }
        if let Some(open) = self.tx_segment {
            if open.channel == channel {
                return Err(LinkError::SegmentActive(channel));
            }
        }

        self.writer.queue(channel, SegmentKind::Single, data)?;
        debug!(channel, name = channel_name(channel), len = data.len(), "send");
        self.transmit(max_loop_cnt)
    }

    /// Open a segmented message of `total` bytes on `channel` and send its
    /// first chunk.
    ///
    /// Only one outbound segmented message may be open at a time.
    pub fn split_start(
        &mut self,
        data: &[u8],
        total: usize,
        channel: u8,
        max_loop_cnt: u32,
    ) -> Result<()> {
        self.ensure_ready()?;
        table::index(channel)?;
        if let Some(open) = self.tx_segment {
            return Err(LinkError::SegmentActive(open.channel));
        }
        if total > MAX_SEGMENTED_LEN {
            return Err(LinkError::PayloadTooLarge {
                size: total,
                max: MAX_SEGMENTED_LEN,
            });
        }
        let descriptor = TxSegment {
            channel,
            total,
            sent: 0,
        };
        descriptor.check_next(data.len())?;

        // `total` fits u16 after the check above.
        let header = (total as u16).to_le_bytes();
        let pieces = segment::plan(data, SegmentKind::Start, SegmentKind::Next);
        self.queue_pieces(channel, pieces, |kind, piece| match kind {
            SegmentKind::Start => {
                let mut payload = BytesMut::with_capacity(SEGMENT_HEADER + piece.len());
                payload.put_slice(&header);
                payload.put_slice(piece);
                Some(payload)
            }
            _ => None,
        })?;

        debug!(channel, total, len = data.len(), "split start");
        self.transmit(max_loop_cnt)?;
        self.tx_segment = Some(TxSegment {
            sent: data.len(),
            ..descriptor
        });
        Ok(())
    }

    /// Send the next chunk of the open segmented message.
    pub fn split_next(&mut self, data: &[u8], max_loop_cnt: u32) -> Result<()> {
        self.ensure_ready()?;
        let mut descriptor = self.tx_segment.ok_or(LinkError::NoActiveSegment)?;
        descriptor.check_next(data.len())?;

        let pieces = segment::plan(data, SegmentKind::Next, SegmentKind::Next);
        self.queue_pieces(descriptor.channel, pieces, |_, _| None)?;

        if let Err(err) = self.transmit(max_loop_cnt) {
            self.abort_segment();
            return Err(err);
        }
        descriptor.sent += data.len();
        self.tx_segment = Some(descriptor);
        Ok(())
    }

    /// Send the final chunk and close the segmented message.
    ///
    /// The chunk must bring the bytes sent to exactly the declared total.
    pub fn split_end(&mut self, data: &[u8], max_loop_cnt: u32) -> Result<()> {
        self.ensure_ready()?;
        let descriptor = self.tx_segment.ok_or(LinkError::NoActiveSegment)?;
        descriptor.check_end(data.len())?;

        let pieces = segment::plan(data, SegmentKind::Next, SegmentKind::End);
        self.queue_pieces(descriptor.channel, pieces, |_, _| None)?;

        let result = self.transmit(max_loop_cnt);
        self.tx_segment = None;
        match &result {
            Ok(()) => debug!(
                channel = descriptor.channel,
                total = descriptor.total,
                "split end"
            ),
            Err(err) => warn!(channel = descriptor.channel, %err, "segmented send aborted"),
        }
        result
    }

    /// The outbound segmented message in flight, if any.
    pub fn tx_segment(&self) -> Option<&TxSegment> {
        self.tx_segment.as_ref()
    }

    fn abort_segment(&mut self) {
        if let Some(open) = self.tx_segment.take() {
            warn!(
                channel = open.channel,
                sent = open.sent,
                total = open.total,
                "segmented send aborted"
            );
        }
    }

    /// Queue every piece, or nothing at all.
    fn queue_pieces<F>(
        &mut self,
        channel: u8,
        pieces: Vec<(SegmentKind, &[u8])>,
        mut rewrite: F,
    ) -> Result<()>
    where
        F: FnMut(SegmentKind, &[u8]) -> Option<BytesMut>,
    {
        for (kind, piece) in pieces {
            let queued = match rewrite(kind, piece) {
                Some(payload) => self.writer.queue(channel, kind, &payload),
                None => self.writer.queue(channel, kind, piece),
            };
            if let Err(err) = queued {
                self.writer.discard();
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Drain the writer, servicing the receiver every `recv_prio` iterations.
    fn transmit(&mut self, max_loop_cnt: u32) -> Result<()> {
        let recv_prio = self.config.recv_prio;
        let reader = &mut self.reader;
        let mut budget = LoopBudget::new(max_loop_cnt);

        let result = self
            .writer
            .write_pending(&mut self.transport, &mut budget, |transport, iteration| {
                if recv_prio != 0 && iteration % recv_prio == 0 {
                    reader.pump(transport)?;
                }
                Ok(())
            });

        match result {
            Ok(_) => Ok(()),
            Err(FrameError::WriteTimeout { written, total }) => {
                warn!(written, total, max_loop_cnt, "send timed out");
                Err(LinkError::Timeout {
                    iterations: max_loop_cnt,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Receive the next complete message on an enabled channel into `buf`.
    ///
    /// A message that does not fit stays pending and is returned by the next
    /// call with a large enough buffer. Subscribers are not invoked here.
    pub fn recv(&mut self, buf: &mut [u8], max_loop_cnt: u32) -> Result<Delivery> {
        self.ensure_ready()?;
        let message = match self.pending.take() {
            Some(message) => message,
            None => {
                let mut budget = LoopBudget::new(max_loop_cnt);
                match self.next_message(&mut budget)? {
                    Some(message) => message,
                    None => {
                        debug!(
                            max_loop_cnt,
                            mid_frame = self.reader.is_mid_frame(),
                            "recv timed out"
                        );
                        return Err(LinkError::Timeout {
                            iterations: max_loop_cnt,
                        });
                    }
                }
            }
        };

        let len = message.payload.len();
        if len > buf.len() {
            let capacity = buf.len();
            self.pending = Some(message);
            return Err(LinkError::BufferTooSmall {
                needed: len,
                capacity,
            });
        }
        buf[..len].copy_from_slice(&message.payload);
        Ok(Delivery {
            channel: message.channel,
            len,
        })
    }

    /// Dispatch every message available within the budget to subscribers.
    ///
    /// Stops early once the line is idle. A message for a channel with no
    /// subscriber is held for [`Link::recv`] and ends the pass. Returns the
    /// number of messages dispatched.
    pub fn poll(&mut self, max_loop_cnt: u32) -> Result<usize> {
        self.ensure_ready()?;
        let mut dispatched = 0usize;

        if let Some(message) = self.pending.take() {
            if !self.dispatch(message) {
                return Ok(dispatched);
            }
            dispatched += 1;
        }

        let mut budget = LoopBudget::new(max_loop_cnt);
        loop {
            while let Some(frame) = self.reader.poll_frame().inspect_err(log_framing)? {
                if let Some(message) = self.route(frame)? {
                    if !self.dispatch(message) {
                        return Ok(dispatched);
                    }
                    dispatched += 1;
                }
            }
            if !budget.tick() {
                break;
            }
            if self.reader.pump(&mut self.transport)? == 0 && !self.reader.is_mid_frame() {
                break;
            }
        }
        Ok(dispatched)
    }

    fn dispatch(&mut self, message: Message) -> bool {
        if self.table.deliver(message.channel, &message.payload) {
            return true;
        }
        self.pending = Some(message);
        false
    }

    fn next_message(&mut self, budget: &mut LoopBudget) -> Result<Option<Message>> {
        loop {
            let frame = self
                .reader
                .read_frame(&mut self.transport, budget)
                .inspect_err(log_framing)?;
            let Some(frame) = frame else {
                return Ok(None);
            };
            if let Some(message) = self.route(frame)? {
                return Ok(Some(message));
            }
        }
    }

    fn route(&mut self, frame: Frame) -> Result<Option<Message>> {
        if !self.table.is_enabled(frame.channel) {
            debug!(
                channel = frame.channel,
                kind = frame.kind.as_str(),
                "dropping frame for disabled channel"
            );
            return Ok(None);
        }
        self.reassembly.accept(frame)
    }

    /// True while a segmented message is partially received on `channel`.
    pub fn is_reassembling(&self, channel: u8) -> bool {
        self.reassembly.is_open(channel)
    }

    /// Flush the transport.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.transport.flush()?;
        Ok(())
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

fn log_framing(err: &FrameError) {
    if err.is_framing() {
        warn!(%err, "malformed frame dropped");
    }
}
