//! Segmentation state: the outbound descriptor and inbound reassembly.
//!
//! A segmented message is a Start frame (payload prefixed with the u16 LE
//! total), any number of Next frames, and an End frame. Next and End carry no
//! total, so the receiver tracks one partial message per channel.

use bytes::{Bytes, BytesMut};
use lsd_frame::{Frame, SegmentKind, MAX_CH, MAX_LEN, SEGMENT_HEADER};
use tracing::{debug, warn};

use crate::error::{LinkError, Result};

/// A complete message received on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub channel: u8,
    pub payload: Bytes,
}

/// Descriptor of the outbound segmented message in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSegment {
    pub channel: u8,
    pub total: usize,
    pub sent: usize,
}

impl TxSegment {
    /// Bytes still owed before the message can end.
    pub fn remaining(&self) -> usize {
        self.total - self.sent
    }

    /// Reject a chunk that would carry the message past its total.
    pub(crate) fn check_next(&self, chunk: usize) -> Result<()> {
        if chunk > self.remaining() {
            return Err(self.length_error(chunk));
        }
        Ok(())
    }

    /// Reject a final chunk that does not land exactly on the total.
    pub(crate) fn check_end(&self, chunk: usize) -> Result<()> {
        if chunk != self.remaining() {
            return Err(self.length_error(chunk));
        }
        Ok(())
    }

    fn length_error(&self, chunk: usize) -> LinkError {
        LinkError::SegmentLength {
            sent: self.sent,
            chunk,
            total: self.total,
        }
    }
}

/// Split `data` into frame-sized pieces tagged with their segment kind.
///
/// The first piece of a Start chunk leaves room for the total-length prefix.
/// An empty End chunk still yields one (empty) End frame.
pub(crate) fn plan(data: &[u8], first: SegmentKind, last: SegmentKind) -> Vec<(SegmentKind, &[u8])> {
    let head_room = match first {
        SegmentKind::Start => MAX_LEN - SEGMENT_HEADER,
        _ => MAX_LEN,
    };
    let (head, rest) = data.split_at(data.len().min(head_room));

    let mut pieces = Vec::with_capacity(1 + rest.len() / MAX_LEN + 1);
    if first == SegmentKind::Start || !head.is_empty() || last == SegmentKind::End {
        pieces.push((first, head));
    }
    pieces.extend(rest.chunks(MAX_LEN).map(|chunk| (SegmentKind::Next, chunk)));

    if last == SegmentKind::End {
        if let Some(piece) = pieces.last_mut() {
            if piece.0 == SegmentKind::Next {
                piece.0 = SegmentKind::End;
            }
        }
    }
    pieces
}

#[derive(Debug)]
struct Partial {
    total: usize,
    data: BytesMut,
}

/// Per-channel reassembly of segmented messages.
#[derive(Debug)]
pub struct Reassembler {
    slots: [Option<Partial>; MAX_CH as usize],
    max_message_len: usize,
}

impl Reassembler {
    pub fn new(max_message_len: usize) -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            max_message_len,
        }
    }

    /// True while a segmented message is partially received on `channel`.
    pub fn is_open(&self, channel: u8) -> bool {
        self.slot(channel).is_some_and(|slot| slot.is_some())
    }

    /// Drop the partial message on `channel`, if any.
    pub fn discard(&mut self, channel: u8) {
        if let Some(slot) = self.slots.get_mut(channel as usize) {
            if slot.take().is_some() {
                debug!(channel, "discarded partial segmented message");
            }
        }
    }

    pub fn reset(&mut self) {
        self.slots = std::array::from_fn(|_| None);
    }

    fn slot(&self, channel: u8) -> Option<&Option<Partial>> {
        self.slots.get(channel as usize)
    }

    /// Feed one decoded frame. Returns the message it completes, if any.
    pub fn accept(&mut self, frame: Frame) -> Result<Option<Message>> {
        let channel = frame.channel;
        let Some(slot) = self.slots.get_mut(channel as usize) else {
            return Err(LinkError::InvalidChannel {
                channel,
                max: MAX_CH,
            });
        };

        match frame.kind {
            SegmentKind::Single => Ok(Some(Message {
                channel,
                payload: frame.payload,
            })),
            SegmentKind::Start => {
                if frame.payload.len() < SEGMENT_HEADER {
                    *slot = None;
                    return Err(LinkError::MalformedStart { channel });
                }
                let total = u16::from_le_bytes([frame.payload[0], frame.payload[1]]) as usize;
                let chunk = &frame.payload[SEGMENT_HEADER..];

                let interrupted = slot.take().map(|old| LinkError::SegmentInterrupted {
                    channel,
                    received: old.data.len(),
                    total: old.total,
                });

                if total > self.max_message_len || chunk.len() > total {
                    warn!(channel, total, chunk = chunk.len(), "rejecting segmented message");
                    return Err(LinkError::SegmentOverflow {
                        channel,
                        received: chunk.len(),
                        total,
                    });
                }

                let mut data = BytesMut::with_capacity(total);
                data.extend_from_slice(chunk);
                *slot = Some(Partial { total, data });
                debug!(channel, total, "segmented message started");

                match interrupted {
                    Some(err) => {
                        warn!(channel, "segmented message interrupted by a new start");
                        Err(err)
                    }
                    None => Ok(None),
                }
            }
            SegmentKind::Next | SegmentKind::End => {
                let Some(partial) = slot.as_mut() else {
                    return Err(LinkError::UnexpectedSegment {
                        channel,
                        kind: frame.kind.as_str(),
                    });
                };

                let received = partial.data.len() + frame.payload.len();
                if received > partial.total {
                    let total = partial.total;
                    *slot = None;
                    return Err(LinkError::SegmentOverflow {
                        channel,
                        received,
                        total,
                    });
                }
                partial.data.extend_from_slice(&frame.payload);

                if frame.kind == SegmentKind::Next {
                    return Ok(None);
                }

                let Some(partial) = slot.take() else {
                    return Ok(None);
                };
                if partial.data.len() != partial.total {
                    return Err(LinkError::SegmentTruncated {
                        channel,
                        received: partial.data.len(),
                        total: partial.total,
                    });
                }
                debug!(channel, len = partial.total, "segmented message complete");
                Ok(Some(Message {
                    channel,
                    payload: partial.data.freeze(),
                }))
            }
        }
    }
}
