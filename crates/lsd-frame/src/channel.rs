//! Channel ids.
//!
//! A link carries `MAX_CH` logical channels over one byte stream. Channel 0
//! carries control traffic (commands and their replies); the rest carry
//! application data, typically one socket each.

use crate::codec::MAX_CH;

/// Command/reply traffic.
pub const CONTROL: u8 = 0;

/// Returns a human-readable name for a channel id.
pub fn channel_name(id: u8) -> &'static str {
    match id {
        CONTROL => "CONTROL",
        id if id < MAX_CH => "DATA",
        _ => "INVALID",
    }
}

/// Returns true if the channel id can be carried by a frame.
pub fn is_valid(id: u8) -> bool {
    id < MAX_CH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_ranges() {
        assert_eq!(channel_name(CONTROL), "CONTROL");
        assert_eq!(channel_name(1), "DATA");
        assert_eq!(channel_name(MAX_CH), "INVALID");
        assert!(is_valid(MAX_CH - 1));
        assert!(!is_valid(MAX_CH));
    }
}
