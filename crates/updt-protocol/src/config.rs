use derive_ctor::ctor;

use crate::{Result, err::Error, payload::wire_size};

/// Body bytes per payload unless configured otherwise.
pub const DEFAULT_PAYLOAD_SIZE: u16 = 256;

/// Zero-progress sends tolerated before a session gives up.
pub const DEFAULT_SEND_RETRIES: u8 = 8;

/// Parameters both sides of a session must agree on out of band.
#[derive(ctor, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Largest body carried by one payload
    pub max_payload_size: u16,
    /// Master side only
    pub send_retries: u8,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PAYLOAD_SIZE, DEFAULT_SEND_RETRIES)
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_payload_size == 0 {
            Err(Error::InvalidConfig("payload size must be greater than zero"))
        } else {
            Ok(())
        }
    }

    /// Buffer size needed to hold one serialized payload.
    pub fn wire_capacity(&self) -> usize {
        wire_size(self.max_payload_size as usize)
    }

    /// Fail unless a session buffer of `available` bytes can hold a full payload.
    pub fn check_buffer(&self, available: usize) -> Result<()> {
        let needed = self.wire_capacity();
        if available < needed {
            Err(Error::BufferTooSmall { needed, available })
        } else {
            Ok(())
        }
    }
}
