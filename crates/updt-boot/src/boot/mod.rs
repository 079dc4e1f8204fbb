use updt_protocol::payload::wire_size;

pub mod loopback;
pub mod master;
pub mod slave;

/// Largest payload body the host accepts on the command line.
pub const MAX_PAYLOAD_SIZE: u16 = 4096;

/// Session buffer for both roles, sized for [`MAX_PAYLOAD_SIZE`].
pub const BUF_SIZE: usize = wire_size(MAX_PAYLOAD_SIZE as usize);
