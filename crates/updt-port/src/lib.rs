#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "serialport")]
use serialport::SerialPort;
#[cfg(feature = "serialport")]
use std::io::{ErrorKind, Read, Write};

use crate::err::Error;

pub mod err;
#[cfg(feature = "std")]
pub mod loopback;

#[cfg(feature = "std")]
pub use loopback::Loopback;

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(feature = "serialport")]
pub type Port = Box<dyn SerialPort>;

/// Ordered byte channel between the two sides of an update session.
///
/// Bytes handed to `send` on one end come out of `receive` on the other end in the same
/// order. Both calls may move fewer bytes than asked for, so callers that need a whole
/// buffer use [`Transport::send_all`] and [`Transport::receive_exact`].
pub trait Transport {
    /// Send the head of `buf`, returning how many bytes the transport took.
    fn send(&mut self, buf: &[u8]) -> Result<usize>;

    /// Receive into the head of `buf`, returning how many bytes were filled.
    ///
    /// `Ok(0)` for a non-empty `buf` means the peer has nothing more to give.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Send the whole `buf`, looping on short writes.
    ///
    /// A send that moves no bytes counts against `retries`; any progress resets the
    /// budget.
    fn send_all(&mut self, buf: &[u8], retries: u8) -> Result<()> {
        let mut sent = 0;
        let mut stalls: u16 = 0;

        while sent < buf.len() {
            match self.send(&buf[sent..])? {
                0 => {
                    stalls += 1;
                    if stalls > u16::from(retries) {
                        return Err(Error::Stalled(retries));
                    }
                }
                n => {
                    stalls = 0;
                    sent += n;
                }
            }
        }

        Ok(())
    }

    /// Fill the whole `buf`, looping on short reads.
    fn receive_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;

        while filled < buf.len() {
            match self.receive(&mut buf[filled..])? {
                0 => return Err(Error::PeerClosed),
                n => filled += n,
            }
        }

        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).send(buf)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).receive(buf)
    }
}

#[cfg(feature = "serialport")]
impl Transport for Port {
    fn send(&mut self, buf: &[u8]) -> Result<usize> {
        loop {
            match Write::write(self, buf) {
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                ret => return ret.map_err(|e| e.into()),
            }
        }
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match Read::read(self, buf) {
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                ret => return ret.map_err(|e| e.into()),
            }
        }
    }
}
