//! Lightweight serial datagrams.
//!
//! lsd multiplexes a handful of logical channels over one UART byte stream:
//! delimited, byte-stuffed, CRC-checked frames of up to
//! [`frame::MAX_LEN`] bytes, with Start/Next/End segmentation for larger
//! messages and a polling driver whose every call is bounded by an iteration
//! budget.
//!
//! # Crate Structure
//!
//! - [`transport`]: Non-blocking byte transport (tty, std streams, shadow UART)
//! - [`frame`]: Frame codec and budgeted frame reader/writer
//! - [`link`]: Channel table, segmentation and the link driver
//!
//! ```
//! use lsd::link::Link;
//! use lsd::transport::ShadowUart;
//!
//! let (a, b) = ShadowUart::pair();
//! let mut left = Link::new(a);
//! let mut right = Link::new(b);
//! left.init();
//! right.init();
//! right.ch_enable(1).unwrap();
//!
//! left.send(b"hello", 1, 100).unwrap();
//! let mut buf = [0u8; 16];
//! let got = right.recv(&mut buf, 100).unwrap();
//! assert_eq!(&buf[..got.len], b"hello");
//! ```

/// Re-export transport types.
pub mod transport {
    pub use lsd_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use lsd_frame::*;
}

/// Re-export link driver types.
pub mod link {
    pub use lsd_link::*;
}
