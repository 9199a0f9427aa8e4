use std::path::Path;

use lsd_frame::MAX_SEGMENTED_LEN;
use serde::{Deserialize, Serialize};

/// Default number of send loop iterations between receive services.
pub const RECV_PRIO: u32 = 1;

/// Default cap on undecoded bytes held by the receiver.
pub const DEFAULT_RX_BUFFER: usize = 64 * 1024;

/// Link configuration.
///
/// Every field has a default, so a JSON document only needs the keys it
/// changes:
///
/// ```json
/// { "channels_enabled_at_init": true, "recv_prio": 4 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// State every channel takes on `init`.
    pub channels_enabled_at_init: bool,
    /// Send loop iterations between receive services; 0 disables servicing.
    pub recv_prio: u32,
    /// Cap on undecoded receive bytes.
    pub rx_buffer: usize,
    /// Largest segmented message accepted for reassembly.
    pub max_message_len: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            channels_enabled_at_init: false,
            recv_prio: RECV_PRIO,
            rx_buffer: DEFAULT_RX_BUFFER,
            max_message_len: MAX_SEGMENTED_LEN,
        }
    }
}

impl LinkConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Read and parse a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text).map_err(std::io::Error::from)
    }
}
