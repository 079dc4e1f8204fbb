use derive_more::IsVariant;
use thiserror::Error as TError;

use crate::flash::FlashError;

#[derive(Debug, TError)]
pub enum Error {
    /// Rejected protocol or session parameter
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Nothing to transfer
    #[error("segment set is empty")]
    EmptySegmentSet,
    /// Zero-sized pull from a segment reader
    #[error("pull size must be greater than zero")]
    OutOfRange,
    /// Session buffer can't hold a whole payload
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },
    /// Body longer than the wire length field allows
    #[error("body of {0} bytes does not fit in a payload")]
    PayloadTooLarge(usize),
    /// `run_session` called on a session that already ended
    #[error("session already finished")]
    SessionOver,

    /// `updt-port` error
    #[error("transport error: {0}")]
    Transport(#[from] updt_port::err::Error),

    /// Received checksum doesn't match the payload contents
    #[error(
        "checksum mismatch at {address:#010x}: received {received:#06x}, computed {computed:#06x}"
    )]
    ChecksumMismatch {
        address: u32,
        received: u16,
        computed: u16,
    },
    /// Header announces a body longer than the agreed payload size
    #[error("malformed header at {address:#010x}: length {length}")]
    MalformedHeader { address: u32, length: u16 },

    /// Flash sink refused a write
    #[error("flash write at {address:#010x} failed: {source}")]
    FlashWrite {
        address: u32,
        #[source]
        source: FlashError,
    },
}

/// Broad failure classes, used to decide whether a fresh session is worth trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IsVariant)]
pub enum ErrorKind {
    /// Bad parameters, fatal at construction
    Config,
    /// Link failure or closed peer
    Transport,
    /// Corrupt or malformed data on the wire
    Protocol,
    /// Persistent storage failure
    Flash,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_)
            | Self::EmptySegmentSet
            | Self::OutOfRange
            | Self::BufferTooSmall { .. }
            | Self::PayloadTooLarge(_)
            | Self::SessionOver => ErrorKind::Config,
            Self::Transport(_) => ErrorKind::Transport,
            Self::ChecksumMismatch { .. } | Self::MalformedHeader { .. } => ErrorKind::Protocol,
            Self::FlashWrite { .. } => ErrorKind::Flash,
        }
    }

    /// The session ended because the other side went away.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, Self::Transport(updt_port::err::Error::PeerClosed))
    }
}
