//! Point-to-point firmware update protocol.
//!
//! A master streams an image, described as a set of address-tagged segments, to a slave
//! that commits it to persistent storage:
//!
//! [`SegmentSet`] -> [`SegmentReader`] -> [`Packer`] -> [`Master`] -> transport ->
//! [`UpdateService`] -> [`FlashSink`]
//!
//! Each payload carries its own target address, so non-contiguous images are placed
//! correctly. A zero-length payload marks the end of the stream. Both session loops are
//! plain objects with a `run_session` entry point that can be driven from a thread, a task
//! or a bare main loop. Session buffers are owned const-generic arrays.
//!
//! The transport comes from `updt-port`; with the `std` feature its
//! [`Loopback`](updt_port::Loopback) pair runs both sides in one process.

#![cfg_attr(not(feature = "std"), no_std)]

use crate::{err::Error, payload::Payload};

pub mod config;
pub mod err;
pub mod flash;
pub mod master;
pub mod packer;
pub mod payload;
pub mod segment;
pub mod service;

pub use config::ProtocolConfig;
pub use flash::{FlashError, FlashSink, Rebased};
pub use master::{Master, MasterState};
pub use packer::Packer;
pub use segment::{Segment, SegmentReader, SegmentSet};
pub use service::{ServiceState, UpdateService};

pub type Result<T> = core::result::Result<T, Error>;

/// Totals of a finished session.
///
/// The master counts what it sent, the update service what it committed. On a clean run
/// both sides report the same numbers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionResult {
    /// Payloads carrying image bytes, the end-of-stream marker excluded
    pub payloads: usize,
    /// Body bytes, equal to the image size on success
    pub image_bytes: u64,
    /// Bytes on the wire including framing and the marker
    pub wire_bytes: u64,
}

impl SessionResult {
    pub(crate) fn record(&mut self, payload: &Payload) {
        if !payload.is_end_of_stream() {
            self.payloads += 1;
            self.image_bytes += payload.body().len() as u64;
        }
        self.wire_bytes += payload.wire_size() as u64;
    }
}
