//! Image description and the cursor that walks it.

use core::num::NonZeroUsize;

use derive_ctor::ctor;

use crate::{Result, err::Error};

/// Contiguous run of image bytes placed at `address`.
#[derive(ctor, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    address: u32,
    data: &'a [u8],
}

impl<'a> Segment<'a> {
    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// One past the last address covered by this segment.
    pub fn end(&self) -> u64 {
        self.address as u64 + self.data.len() as u64
    }

    fn overlaps(&self, other: &Segment) -> bool {
        (self.address as u64) < other.end() && (other.address as u64) < self.end()
    }
}

/// Validated, ordered list of non-overlapping segments.
///
/// The order of the slice is the order bytes are streamed in; segments are not sorted.
#[derive(Debug, Clone, Copy)]
pub struct SegmentSet<'a> {
    segments: &'a [Segment<'a>],
}

impl<'a> SegmentSet<'a> {
    pub fn new(segments: &'a [Segment<'a>]) -> Result<Self> {
        if segments.is_empty() {
            return Err(Error::EmptySegmentSet);
        }

        for (i, segment) in segments.iter().enumerate() {
            if segment.data.is_empty() {
                return Err(Error::InvalidConfig("segment size must be greater than zero"));
            }
            if segment.end() > u32::MAX as u64 + 1 {
                return Err(Error::InvalidConfig("segment runs past the 32-bit address space"));
            }
            if segments[i + 1..].iter().any(|other| segment.overlaps(other)) {
                return Err(Error::InvalidConfig("segments overlap"));
            }
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &'a [Segment<'a>] {
        self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Sum of all segment sizes.
    pub fn total_size(&self) -> u64 {
        self.segments.iter().map(|s| s.size() as u64).sum()
    }

    pub fn reader(&self) -> SegmentReader<'a> {
        SegmentReader::new(*self)
    }
}

/// Span returned by [`SegmentReader::pull`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pull<'a> {
    /// Address of the first byte of `data`
    pub address: u32,
    /// Bytes from a single segment, empty once the reader is exhausted
    pub data: &'a [u8],
    /// No bytes are left after this pull
    pub is_final: bool,
}

/// Cursor over a [`SegmentSet`] that hands out bounded spans without crossing segments.
#[derive(Debug, Clone)]
pub struct SegmentReader<'a> {
    segments: &'a [Segment<'a>],
    index: usize,
    offset: usize,
}

impl<'a> SegmentReader<'a> {
    pub fn new(set: SegmentSet<'a>) -> Self {
        Self {
            segments: set.segments,
            index: 0,
            offset: 0,
        }
    }

    /// Take up to `max_bytes` from the current segment.
    pub fn pull(&mut self, max_bytes: usize) -> Result<Pull<'a>> {
        let max_bytes = NonZeroUsize::new(max_bytes).ok_or(Error::OutOfRange)?;
        Ok(self.take(max_bytes))
    }

    pub(crate) fn take(&mut self, max_bytes: NonZeroUsize) -> Pull<'a> {
        let Some(segment) = self.segments.get(self.index) else {
            return Pull {
                address: self.end_address(),
                data: &[],
                is_final: true,
            };
        };

        let remaining = &segment.data[self.offset..];
        let n = remaining.len().min(max_bytes.get());
        let pull = Pull {
            address: segment.address.wrapping_add(self.offset as u32),
            data: &remaining[..n],
            is_final: false,
        };

        self.offset += n;
        if self.offset == segment.data.len() {
            self.index += 1;
            self.offset = 0;
        }

        Pull {
            is_final: self.is_finished(),
            ..pull
        }
    }

    pub fn is_finished(&self) -> bool {
        self.index == self.segments.len()
    }

    /// Bytes not yet pulled.
    pub fn remaining(&self) -> u64 {
        self.segments
            .get(self.index..)
            .unwrap_or_default()
            .iter()
            .map(|s| s.size() as u64)
            .sum::<u64>()
            - self.offset as u64
    }

    /// Address just past the last segment, reported once the reader is exhausted.
    fn end_address(&self) -> u32 {
        self.segments
            .last()
            .map(|s| s.end() as u32)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static IMAGE: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

    fn segments() -> [Segment<'static>; 2] {
        [
            Segment::new(0x100, &IMAGE[..10]),
            Segment::new(0x800, &IMAGE[10..]),
        ]
    }

    #[test]
    fn rejects_bad_sets() {
        assert!(matches!(SegmentSet::new(&[]), Err(Error::EmptySegmentSet)));
        assert!(matches!(
            SegmentSet::new(&[Segment::new(0, &[])]),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            SegmentSet::new(&[Segment::new(0, &IMAGE), Segment::new(8, &IMAGE)]),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            SegmentSet::new(&[Segment::new(u32::MAX - 4, &IMAGE)]),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn accepts_segment_ending_at_top_of_address_space() {
        let segments = [Segment::new(u32::MAX - 15, &IMAGE)];
        let set = SegmentSet::new(&segments).unwrap();
        let mut reader = set.reader();

        let pull = reader.pull(64).unwrap();
        assert_eq!(pull.data.len(), 16);
        assert!(pull.is_final);
    }

    #[test]
    fn set_reports_sizes() {
        let segments = segments();
        let set = SegmentSet::new(&segments).unwrap();

        assert_eq!(set.len(), 2);
        assert!(!set.is_empty());
        assert_eq!(set.total_size(), 16);
    }

    #[test]
    fn pull_never_crosses_segments() {
        let segments = segments();
        let set = SegmentSet::new(&segments).unwrap();
        let mut reader = set.reader();

        let pull = reader.pull(4).unwrap();
        assert_eq!((pull.address, pull.data), (0x100, &IMAGE[..4]));
        let pull = reader.pull(4).unwrap();
        assert_eq!((pull.address, pull.data), (0x104, &IMAGE[4..8]));
        let pull = reader.pull(4).unwrap();
        assert_eq!((pull.address, pull.data), (0x108, &IMAGE[8..10]));
        assert!(!pull.is_final);
        assert_eq!(reader.remaining(), 6);

        let pull = reader.pull(100).unwrap();
        assert_eq!((pull.address, pull.data), (0x800, &IMAGE[10..]));
        assert!(pull.is_final);
        assert!(reader.is_finished());
    }

    #[test]
    fn exhausted_reader_returns_empty_pulls() {
        let segments = segments();
        let set = SegmentSet::new(&segments).unwrap();
        let mut reader = set.reader();
        reader.pull(16).unwrap();
        reader.pull(16).unwrap();

        for _ in 0..3 {
            let pull = reader.pull(16).unwrap();
            assert!(pull.data.is_empty());
            assert!(pull.is_final);
            assert_eq!(pull.address, 0x806);
        }
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn zero_sized_pull_is_out_of_range() {
        let segments = segments();
        let set = SegmentSet::new(&segments).unwrap();

        assert!(matches!(set.reader().pull(0), Err(Error::OutOfRange)));
    }

    #[test]
    fn streams_in_given_order_not_address_order() {
        let segments = [
            Segment::new(0x800, &IMAGE[..2]),
            Segment::new(0x100, &IMAGE[2..4]),
        ];
        let set = SegmentSet::new(&segments).unwrap();
        let mut reader = set.reader();

        assert_eq!(reader.pull(8).unwrap().address, 0x800);
        assert_eq!(reader.pull(8).unwrap().address, 0x100);
    }
}
