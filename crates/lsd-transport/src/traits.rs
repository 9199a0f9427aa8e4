use crate::error::Result;

/// A raw, non-blocking byte link.
///
/// Implementations never wait for the device: `read` returns `Ok(0)` when no
/// byte is available and `write` returns `Ok(0)` when the transmitter cannot
/// take more right now. Callers decide how many times to retry.
pub trait Transport {
    /// Read whatever bytes are available into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write as many bytes of `buf` as the transmitter accepts.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Push buffered output towards the device.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sink(Vec<u8>);

    impl Transport for Sink {
        fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
            Ok(0)
        }

        fn write(&mut self, buf: &[u8]) -> Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    fn write_through<T: Transport>(mut transport: T, bytes: &[u8]) -> usize {
        transport.write(bytes).unwrap()
    }

    #[test]
    fn mut_ref_forwards_to_inner() {
        let mut sink = Sink(Vec::new());
        assert_eq!(write_through(&mut sink, b"abc"), 3);
        assert_eq!(sink.0, b"abc");
    }

    #[test]
    fn boxed_transport_forwards_to_inner() {
        let mut boxed: Box<dyn Transport> = Box::new(Sink(Vec::new()));
        assert_eq!(boxed.write(b"xy").unwrap(), 2);
        let mut buf = [0u8; 4];
        assert_eq!(boxed.read(&mut buf).unwrap(), 0);
        boxed.flush().unwrap();
    }
}
