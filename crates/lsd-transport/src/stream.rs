use std::io::{ErrorKind, Read, Write};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Adapts any `Read + Write` stream to the non-blocking [`Transport`] contract.
///
/// The stream should be in non-blocking mode (or have short timeouts);
/// `WouldBlock`, `TimedOut` and `Interrupted` are reported as "nothing moved".
/// A read of zero bytes means the peer hung up and maps to
/// [`TransportError::Closed`].
pub struct StreamTransport<T> {
    inner: T,
}

impl<T: Read + Write> StreamTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the transport and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

fn not_ready(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
    )
}

impl<T: Read + Write> Transport for StreamTransport<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.inner.read(buf) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => Ok(n),
            Err(err) if not_ready(err.kind()) => Ok(0),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match self.inner.write(buf) {
            Ok(0) if !buf.is_empty() => Err(TransportError::Closed),
            Ok(n) => Ok(n),
            Err(err) if not_ready(err.kind()) => Ok(0),
            Err(err) if err.kind() == ErrorKind::BrokenPipe => Err(TransportError::Closed),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self.inner.flush() {
            Ok(()) => Ok(()),
            Err(err) if not_ready(err.kind()) => Ok(()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }
}

impl<T> std::fmt::Debug for StreamTransport<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("stream", &std::any::type_name::<T>())
            .finish()
    }
}
