use core::num::{NonZeroU16, NonZeroUsize};

use log::{debug, trace};

use crate::{
    Result,
    err::Error,
    payload::Payload,
    segment::{SegmentReader, SegmentSet},
};

/// Splits a [`SegmentSet`] into payloads of at most `max_payload_size` body bytes.
///
/// Once the image is exhausted every call yields the same end-of-stream marker, so the
/// stream always ends with an explicit marker, even when the image size is a multiple of
/// the payload size.
#[derive(Debug, Clone)]
pub struct Packer<'a> {
    reader: SegmentReader<'a>,
    max_payload_size: NonZeroU16,
    end_address: u32,
    finished: bool,
    emitted: usize,
}

impl<'a> Packer<'a> {
    pub fn new(segments: SegmentSet<'a>, max_payload_size: u16) -> Result<Self> {
        let max_payload_size = NonZeroU16::new(max_payload_size)
            .ok_or(Error::InvalidConfig("payload size must be greater than zero"))?;

        debug!(
            "Packing {} segments, {} bytes, {max_payload_size} bytes per payload",
            segments.len(),
            segments.total_size()
        );

        Ok(Self {
            reader: segments.reader(),
            max_payload_size,
            end_address: 0,
            finished: false,
            emitted: 0,
        })
    }

    /// Next payload of the stream, or the end-of-stream marker once the image is done.
    pub fn next_payload(&mut self) -> Payload<'a> {
        if self.finished {
            return Payload::end_of_stream(self.end_address);
        }

        let pull = self.reader.take(NonZeroUsize::from(self.max_payload_size));
        if pull.data.is_empty() {
            self.finished = true;
            self.end_address = pull.address;
            debug!(
                "Image packed into {} payloads, end marker @ {:#010x}",
                self.emitted, self.end_address
            );
            return Payload::end_of_stream(self.end_address);
        }

        self.emitted += 1;
        trace!("Packed {:#x} bytes @ {:#010x}", pull.data.len(), pull.address);
        Payload::compose(pull.address, pull.data)
    }

    /// The end-of-stream marker has been produced.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Non-marker payloads produced so far.
    pub fn payloads_emitted(&self) -> usize {
        self.emitted
    }

    pub fn max_payload_size(&self) -> u16 {
        self.max_payload_size.get()
    }
}
