//! Non-blocking byte transports for the lsd serial datagram link.
//!
//! This is the lowest layer of lsd. It knows nothing about frames: a
//! [`Transport`] moves raw bytes to and from a UART (or something standing in
//! for one) and reports "not ready" instead of blocking. Callers bound their
//! polling with a [`LoopBudget`].
//!
//! Provided transports:
//! - [`ShadowUart`]: in-process UART double with a register shadow
//! - [`StreamTransport`]: any `Read + Write` stream
//! - [`serial::open`]: serial port device

pub mod budget;
pub mod error;
pub mod shadow;
pub mod stream;
pub mod serial;
pub mod traits;

pub use budget::LoopBudget;
pub use error::{Result, TransportError};
pub use shadow::{ShadowConfig, ShadowUart, LSR_DATA_READY, LSR_THR_EMPTY};
pub use stream::StreamTransport;
pub use traits::Transport;
