use thiserror::Error as TError;

#[derive(Debug, TError)]
pub enum Error {
    /// The other endpoint was closed and nothing is left to read
    #[error("peer endpoint closed")]
    PeerClosed,

    /// The endpoint was never connected to a peer
    #[error("endpoint is not connected")]
    NotConnected,

    /// The transport accepted no bytes for too many attempts in a row
    #[error("transport made no progress after {0} retries")]
    Stalled(u8),

    #[cfg(feature = "serialport")]
    /// `serialport` crate error
    #[error("serialport error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[cfg(feature = "std")]
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
