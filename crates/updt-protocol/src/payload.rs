//! Wire unit of an update session.
//!
//! Layout, all fields big-endian:
//! - target address - u32
//! - body length - u16, `0` marks the end of the stream
//! - body
//! - CRC-16/IBM-3740 over everything above - u16

use core::fmt::Display;

use crc::{CRC_16_IBM_3740, Crc};

use crate::{Result, err::Error};

pub const HEADER_SIZE: usize = 6;
pub const CHECKSUM_SIZE: usize = 2;

const CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Serialized size of a payload carrying `len` body bytes.
pub const fn wire_size(len: usize) -> usize {
    HEADER_SIZE + len + CHECKSUM_SIZE
}

/// Address and length that precede every body on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub address: u32,
    pub length: u16,
}

impl Header {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0; HEADER_SIZE];
        bytes[..4].copy_from_slice(&self.address.to_be_bytes());
        bytes[4..].copy_from_slice(&self.length.to_be_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; HEADER_SIZE] = bytes
            .get(..HEADER_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or(Error::BufferTooSmall {
                needed: HEADER_SIZE,
                available: bytes.len(),
            })?;

        Ok(Self {
            address: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            length: u16::from_be_bytes([bytes[4], bytes[5]]),
        })
    }
}

/// Checksum of a serialized header followed by `body`.
pub fn checksum(header: &[u8; HEADER_SIZE], body: &[u8]) -> u16 {
    let mut digest = CRC.digest();
    digest.update(header);
    digest.update(body);
    digest.finalize()
}

/// Address-tagged chunk of image bytes, or the end-of-stream marker when the body is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payload<'a> {
    address: u32,
    body: &'a [u8],
    checksum: u16,
}

impl<'a> Payload<'a> {
    /// Payload that places `body` at `address`.
    pub fn new(address: u32, body: &'a [u8]) -> Result<Self> {
        if body.len() > u16::MAX as usize {
            return Err(Error::PayloadTooLarge(body.len()));
        }

        Ok(Self::compose(address, body))
    }

    /// End-of-stream marker. `address` is informational, usually one past the image.
    pub fn end_of_stream(address: u32) -> Self {
        Self::compose(address, &[])
    }

    /// `body` must be at most `u16::MAX` bytes long.
    pub(crate) fn compose(address: u32, body: &'a [u8]) -> Self {
        let header = Header {
            address,
            length: body.len() as u16,
        };

        Self {
            address,
            body,
            checksum: checksum(&header.to_bytes(), body),
        }
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn body(&self) -> &'a [u8] {
        self.body
    }

    pub fn len(&self) -> u16 {
        self.body.len() as u16
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.body.is_empty()
    }

    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    pub fn header(&self) -> Header {
        Header {
            address: self.address,
            length: self.len(),
        }
    }

    pub fn wire_size(&self) -> usize {
        wire_size(self.body.len())
    }

    /// Write the wire form into `buf`, returning the number of bytes used.
    pub fn serialize(&self, buf: &mut [u8]) -> Result<usize> {
        let size = self.wire_size();
        let available = buf.len();
        let buf = buf.get_mut(..size).ok_or(Error::BufferTooSmall {
            needed: size,
            available,
        })?;

        let (header, rest) = buf.split_at_mut(HEADER_SIZE);
        let (body, checksum) = rest.split_at_mut(self.body.len());
        header.copy_from_slice(&self.header().to_bytes());
        body.copy_from_slice(self.body);
        checksum.copy_from_slice(&self.checksum.to_be_bytes());

        Ok(size)
    }

    /// Parse and verify the payload at the start of `buf`.
    ///
    /// The body borrows from `buf`.
    pub fn deserialize(buf: &'a [u8]) -> Result<Self> {
        let header = Header::from_bytes(buf)?;
        let len = header.length as usize;
        let size = wire_size(len);
        if buf.len() < size {
            return Err(Error::BufferTooSmall {
                needed: size,
                available: buf.len(),
            });
        }

        let body = &buf[HEADER_SIZE..HEADER_SIZE + len];
        let received = u16::from_be_bytes([buf[size - 2], buf[size - 1]]);
        let computed = checksum(&header.to_bytes(), body);
        if received != computed {
            return Err(Error::ChecksumMismatch {
                address: header.address,
                received,
                computed,
            });
        }

        Ok(Self {
            address: header.address,
            body,
            checksum: received,
        })
    }
}

impl Display for Payload<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_end_of_stream() {
            write!(f, "End of stream @ 0x{:08x}", self.address)
        } else {
            write!(
                f,
                "Payload @ 0x{:08x} for 0x{:x} bytes, crc 0x{:04x}",
                self.address,
                self.body.len(),
                self.checksum
            )
        }
    }
}
