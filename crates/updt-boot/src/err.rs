use thiserror::Error as TError;

#[derive(Debug, TError)]
pub enum Error {
    /// More than one candidate serial device is connected
    #[error("Please disconnect other USB serial devices or pick one with --port")]
    MoreThanOneDevice,

    /// Every input binary needs exactly one upload address
    #[error("Got {0} input files but {1} upload addresses")]
    MismatchedInputs(usize, usize),

    /// Committed image differs from the source image
    #[error("Flash image doesn't match the source at {0:#010x}")]
    VerifyFailed(u32),

    /// updt-protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] updt_protocol::err::Error),

    /// updt-port error
    #[error("Port error: {0}")]
    Port(#[from] updt_port::err::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// serialport crate error
    #[error("serialport error: {0}")]
    SerialPort(#[from] serialport::Error),
    /// Any other error
    #[error("{0}")]
    Custom(#[from] Box<dyn std::error::Error>),
}
