use std::fmt;

use lsd_frame::{channel_name, MAX_CH};
use tracing::debug;

use crate::error::{LinkError, Result};

/// Callback invoked with `(channel, payload)` for each delivered message.
pub type Subscriber = Box<dyn FnMut(u8, &[u8])>;

/// Per-channel enable flags and subscribers.
pub struct ChannelTable {
    enabled: [bool; MAX_CH as usize],
    subscribers: [Option<Subscriber>; MAX_CH as usize],
}

impl ChannelTable {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: [enabled; MAX_CH as usize],
            subscribers: std::array::from_fn(|_| None),
        }
    }

    /// Return every channel to `enabled` and drop all subscribers.
    pub fn reset(&mut self, enabled: bool) {
        *self = Self::new(enabled);
    }

    pub fn enable(&mut self, channel: u8) -> Result<()> {
        self.set(channel, true)
    }

    pub fn disable(&mut self, channel: u8) -> Result<()> {
        self.set(channel, false)
    }

    fn set(&mut self, channel: u8, enabled: bool) -> Result<()> {
        let slot = index(channel)?;
        if self.enabled[slot] != enabled {
            debug!(channel, name = channel_name(channel), enabled, "channel state changed");
        }
        self.enabled[slot] = enabled;
        Ok(())
    }

    /// False for disabled and out-of-range channels.
    pub fn is_enabled(&self, channel: u8) -> bool {
        index(channel).is_ok_and(|slot| self.enabled[slot])
    }

    /// Enabled channel ids in ascending order.
    pub fn enabled_channels(&self) -> impl Iterator<Item = u8> + '_ {
        (0..MAX_CH).filter(|&channel| self.is_enabled(channel))
    }

    /// Install `handler` for `channel`, replacing any previous one.
    pub fn subscribe(&mut self, channel: u8, handler: Subscriber) -> Result<()> {
        let slot = index(channel)?;
        self.subscribers[slot] = Some(handler);
        Ok(())
    }

    /// Remove the handler for `channel`. Returns whether one was installed.
    pub fn unsubscribe(&mut self, channel: u8) -> Result<bool> {
        let slot = index(channel)?;
        Ok(self.subscribers[slot].take().is_some())
    }

    pub fn has_subscriber(&self, channel: u8) -> bool {
        index(channel).is_ok_and(|slot| self.subscribers[slot].is_some())
    }

    /// Hand `payload` to the channel's subscriber, if any.
    pub fn deliver(&mut self, channel: u8, payload: &[u8]) -> bool {
        let Ok(slot) = index(channel) else {
            return false;
        };
        match self.subscribers[slot].as_mut() {
            Some(handler) => {
                handler(channel, payload);
                true
            }
            None => false,
        }
    }
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::new(false)
    }
}

impl fmt::Debug for ChannelTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscribed: Vec<bool> = self.subscribers.iter().map(Option::is_some).collect();
        f.debug_struct("ChannelTable")
            .field("enabled", &self.enabled)
            .field("subscribed", &subscribed)
            .finish()
    }
}

pub(crate) fn index(channel: u8) -> Result<usize> {
    if channel < MAX_CH {
        Ok(channel as usize)
    } else {
        Err(LinkError::InvalidChannel {
            channel,
            max: MAX_CH,
        })
    }
}
