//! Shadow UART: an in-process stand-in for a 16C550-style UART.
//!
//! Two [`ShadowUart`] ends are cross-connected: bytes written on one end land
//! in the other end's bounded receive FIFO. The transmitter accepts at most
//! `tx_burst` bytes per write call, the way a hardware TX FIFO fills up between
//! polls. The line status register is shadowed so callers can check readiness
//! the same way they would on the real part.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use crate::error::Result;
use crate::traits::Transport;

/// LSR bit 0: at least one byte is waiting in the receive FIFO.
pub const LSR_DATA_READY: u8 = 0x01;
/// LSR bit 1: a byte arrived while the receive FIFO was full.
pub const LSR_OVERRUN: u8 = 0x02;
/// LSR bit 5: the transmitter can take more bytes.
pub const LSR_THR_EMPTY: u8 = 0x20;

/// Shadow UART sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowConfig {
    /// Receive FIFO capacity in bytes, per end.
    pub rx_capacity: usize,
    /// Bytes accepted per `write` call.
    pub tx_burst: usize,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            rx_capacity: 16 * 1024,
            tx_burst: 16,
        }
    }
}

#[derive(Debug)]
struct Port {
    rx: VecDeque<u8>,
    rx_capacity: usize,
    rx_stalled: bool,
    tx_stalled: bool,
    overrun: bool,
}

impl Port {
    fn new(rx_capacity: usize) -> Self {
        Self {
            rx: VecDeque::with_capacity(rx_capacity.min(64 * 1024)),
            rx_capacity,
            rx_stalled: false,
            tx_stalled: false,
            overrun: false,
        }
    }

    fn rx_room(&self) -> usize {
        self.rx_capacity.saturating_sub(self.rx.len())
    }
}

#[derive(Debug)]
struct Wire {
    ports: [Port; 2],
}

/// One end of a shadow UART pair.
#[derive(Debug, Clone)]
pub struct ShadowUart {
    wire: Arc<Mutex<Wire>>,
    side: usize,
    tx_burst: usize,
}

impl ShadowUart {
    /// Create two connected ends with default sizing.
    pub fn pair() -> (Self, Self) {
        Self::pair_with_config(ShadowConfig::default())
    }

    /// Create two connected ends with explicit sizing.
    pub fn pair_with_config(config: ShadowConfig) -> (Self, Self) {
        let wire = Arc::new(Mutex::new(Wire {
            ports: [Port::new(config.rx_capacity), Port::new(config.rx_capacity)],
        }));
        let tx_burst = config.tx_burst.max(1);
        (
            Self {
                wire: Arc::clone(&wire),
                side: 0,
                tx_burst,
            },
            Self {
                wire,
                side: 1,
                tx_burst,
            },
        )
    }

    fn wire(&self) -> MutexGuard<'_, Wire> {
        self.wire.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn peer(&self) -> usize {
        1 - self.side
    }

    /// Line status register shadow.
    pub fn lsr(&self) -> u8 {
        let wire = self.wire();
        let local = &wire.ports[self.side];
        let remote = &wire.ports[self.peer()];

        let mut lsr = 0;
        if !local.rx_stalled && !local.rx.is_empty() {
            lsr |= LSR_DATA_READY;
        }
        if local.overrun {
            lsr |= LSR_OVERRUN;
        }
        if !local.tx_stalled && remote.rx_room() > 0 {
            lsr |= LSR_THR_EMPTY;
        }
        lsr
    }

    /// Hold the transmitter: writes accept nothing until released.
    pub fn set_tx_stalled(&self, stalled: bool) {
        self.wire().ports[self.side].tx_stalled = stalled;
    }

    /// Hold the receiver: reads return nothing until released.
    pub fn set_rx_stalled(&self, stalled: bool) {
        self.wire().ports[self.side].rx_stalled = stalled;
    }

    /// Place bytes directly into this end's receive FIFO.
    ///
    /// Bytes that do not fit are lost and flag an overrun, as on the real UART.
    /// Returns how many bytes were accepted.
    pub fn inject_rx(&self, bytes: &[u8]) -> usize {
        let mut wire = self.wire();
        let port = &mut wire.ports[self.side];
        let accepted = bytes.len().min(port.rx_room());
        port.rx.extend(&bytes[..accepted]);
        if accepted < bytes.len() {
            port.overrun = true;
        }
        accepted
    }

    /// Bytes waiting in this end's receive FIFO.
    pub fn rx_pending(&self) -> usize {
        self.wire().ports[self.side].rx.len()
    }

    /// Drain this end's receive FIFO without going through `read`.
    pub fn take_rx(&self) -> Vec<u8> {
        self.wire().ports[self.side].rx.drain(..).collect()
    }

    /// Clear the overrun flag, returning its previous state.
    pub fn clear_overrun(&self) -> bool {
        std::mem::take(&mut self.wire().ports[self.side].overrun)
    }
}

impl Transport for ShadowUart {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut wire = self.wire();
        let port = &mut wire.ports[self.side];
        if port.rx_stalled {
            return Ok(0);
        }
        let n = buf.len().min(port.rx.len());
        for (slot, byte) in buf.iter_mut().zip(port.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let side = self.side;
        let peer = self.peer();
        let tx_burst = self.tx_burst;
        let mut wire = self.wire();
        if wire.ports[side].tx_stalled {
            return Ok(0);
        }
        let remote = &mut wire.ports[peer];
        let n = buf.len().min(tx_burst).min(remote.rx_room());
        remote.rx.extend(&buf[..n]);
        if n < buf.len() {
            trace!(side, accepted = n, requested = buf.len(), "shadow uart tx short write");
        }
        Ok(n)
    }
}
