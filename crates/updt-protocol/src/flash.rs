//! Persistent storage written by the update service.

#[cfg(feature = "std")]
use std::{
    fs::File,
    io::{Seek, SeekFrom, Write},
};

use derive_ctor::ctor;
use thiserror::Error as TError;

#[derive(Debug, TError)]
pub enum FlashError {
    /// Write doesn't fit in the device
    #[error("write of {len} bytes at {address:#010x} is outside the device")]
    OutOfBounds { address: u32, len: usize },

    /// Device specific failure
    #[error("device error: {0}")]
    Device(&'static str),

    #[cfg(feature = "std")]
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination of received image bytes.
///
/// Writes arrive one at a time in stream order; a sink never sees two writes in
/// flight. Sinks don't erase or roll back anything on their own.
pub trait FlashSink {
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError>;
}

impl<F: FlashSink + ?Sized> FlashSink for &mut F {
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        (**self).write(address, data)
    }
}

/// RAM image where an address is an offset into the slice.
impl FlashSink for [u8] {
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        let start = address as usize;
        let dst = start
            .checked_add(data.len())
            .and_then(|end| self.get_mut(start..end))
            .ok_or(FlashError::OutOfBounds {
                address,
                len: data.len(),
            })?;

        dst.copy_from_slice(data);
        Ok(())
    }
}

/// Window onto `inner` that starts at target address `base`.
///
/// Lets a RAM image cover a high address range without allocating everything below it.
/// Writes below `base` are out of bounds.
#[derive(ctor, Debug)]
pub struct Rebased<F> {
    base: u32,
    inner: F,
}

impl<F> Rebased<F> {
    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F: FlashSink> FlashSink for Rebased<F> {
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        let out_of_bounds = FlashError::OutOfBounds {
            address,
            len: data.len(),
        };
        let offset = address.checked_sub(self.base).ok_or(out_of_bounds)?;

        self.inner.write(offset, data).map_err(|e| match e {
            FlashError::OutOfBounds { len, .. } => FlashError::OutOfBounds { address, len },
            e => e,
        })
    }
}

/// Growable RAM image. Gaps left between writes read back as erased flash (`0xff`).
#[cfg(feature = "std")]
impl FlashSink for Vec<u8> {
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        let end = (address as usize)
            .checked_add(data.len())
            .ok_or(FlashError::OutOfBounds {
                address,
                len: data.len(),
            })?;
        if self.len() < end {
            self.resize(end, 0xff);
        }

        FlashSink::write(self.as_mut_slice(), address, data)
    }
}

/// Image file or block device, addressed by byte offset.
#[cfg(feature = "std")]
impl FlashSink for File {
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        self.seek(SeekFrom::Start(address as u64))?;
        self.write_all(data)?;
        Ok(())
    }
}
