//! Polling link driver for the lsd serial datagram protocol.
//!
//! This is the "just works" layer: a [`Link`] owns one transport, a channel
//! table and the segmentation state, and exposes the classic operation set
//! (`init`, `ch_enable`/`ch_disable`, `send`, `recv`, `split_start`/
//! `split_next`/`split_end`).
//!
//! Every operation that touches the transport takes a `max_loop_cnt` polling
//! budget and gives up with a retryable framing status once it is spent.
//! There are no threads and no locks. Subscriber callbacks run while the link
//! is mutably borrowed, so calling back into the link from a callback is
//! impossible by construction.

pub mod config;
pub mod error;
pub mod link;
pub mod segment;
pub mod table;

pub use config::{LinkConfig, RECV_PRIO};
pub use error::{LinkError, Result, Status};
pub use link::{Delivery, Link, LinkState};
pub use segment::{Message, Reassembler, TxSegment};
pub use table::{ChannelTable, Subscriber};

pub use lsd_frame::{CONTROL, MAX_CH, MAX_LEN, MAX_SEGMENTED_LEN, OVERHEAD, STX_ETX};
