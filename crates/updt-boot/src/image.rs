use std::{fs, path::PathBuf};

use derive_ctor::ctor;
use updt_protocol::Segment;

use crate::{Result, err::Error};

/// Layout of the built-in test image: `(address, size)` pairs inside 1 KiB.
pub const FIXTURE_LAYOUT: [(u32, usize); 7] = [
    (0x0000, 0x00f8),
    (0x00f8, 0x0050),
    (0x0150, 0x0068),
    (0x0210, 0x0008),
    (0x0218, 0x0010),
    (0x0228, 0x0100),
    (0x0360, 0x00a0),
];

#[derive(ctor, Debug)]
struct Part {
    address: u32,
    data: Vec<u8>,
}

/// Raw binaries placed at fixed target addresses.
#[derive(Debug)]
pub struct Image {
    parts: Vec<Part>,
}

impl Image {
    /// Read every input file, pairing it with the upload address at the same position.
    pub fn load(inputs: &[PathBuf], addresses: &[u32]) -> Result<Self> {
        if inputs.len() != addresses.len() || inputs.is_empty() {
            return Err(Error::MismatchedInputs(inputs.len(), addresses.len()));
        }

        let mut parts = Vec::with_capacity(inputs.len());
        for (path, &address) in inputs.iter().zip(addresses) {
            let data = fs::read(path)?;
            println!(
                "{} -> {address:#010x} ({} bytes)",
                path.display(),
                data.len()
            );
            parts.push(Part::new(address, data));
        }

        Ok(Self { parts })
    }

    /// Seven segments with gaps, each byte holding its offset within its segment.
    pub fn fixture() -> Self {
        let parts = FIXTURE_LAYOUT
            .iter()
            .map(|&(address, size)| Part::new(address, (0..size).map(|i| i as u8).collect()))
            .collect();

        Self { parts }
    }

    /// Borrowed segments in load order, ready for a segment set.
    pub fn segments(&self) -> Vec<Segment<'_>> {
        self.parts
            .iter()
            .map(|p| Segment::new(p.address, &p.data))
            .collect()
    }

    /// Lowest target address of the image.
    pub fn base(&self) -> u32 {
        self.parts.iter().map(|p| p.address).min().unwrap_or_default()
    }

    /// Check that `flash`, a RAM image starting at target address `base`, holds every part
    /// at its address.
    pub fn verify(&self, base: u32, flash: &[u8]) -> Result<()> {
        for part in &self.parts {
            let start = part
                .address
                .checked_sub(base)
                .ok_or(Error::VerifyFailed(part.address))? as usize;
            let committed = flash.get(start..).unwrap_or_default();

            if let Some(offset) =
                (0..part.data.len()).position(|i| committed.get(i) != part.data.get(i))
            {
                return Err(Error::VerifyFailed(part.address + offset as u32));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;
    use updt_protocol::SegmentSet;

    use super::*;

    #[test]
    fn fixture_matches_layout() {
        let image = Image::fixture();
        let segments = image.segments();
        let set = SegmentSet::new(&segments).unwrap();

        assert_eq!(set.len(), 7);
        assert_eq!(set.total_size(), 0x368);
        assert_eq!(segments[1].data()[..3], [0, 1, 2]);
        assert_eq!(segments[5].data()[0xff], 0xff);
        assert_eq!(segments[6].end(), 0x400);
    }

    #[test]
    fn load_pairs_files_with_addresses() {
        let mut first = NamedTempFile::new().unwrap();
        first.write_all(&[1, 2, 3]).unwrap();
        let mut second = NamedTempFile::new().unwrap();
        second.write_all(&[4; 16]).unwrap();

        let inputs = [first.path().to_path_buf(), second.path().to_path_buf()];
        let image = Image::load(&inputs, &[0x8000_0000, 0x100]).unwrap();
        let segments = image.segments();

        assert_eq!(segments[0].address(), 0x8000_0000);
        assert_eq!(segments[0].data(), [1, 2, 3]);
        assert_eq!(segments[1].address(), 0x100);
        assert_eq!(segments[1].size(), 16);
    }

    #[test]
    fn load_rejects_unpaired_inputs() {
        let inputs = [PathBuf::from("a.bin"), PathBuf::from("b.bin")];

        assert!(matches!(
            Image::load(&inputs, &[0x0]),
            Err(Error::MismatchedInputs(2, 1))
        ));
        assert!(matches!(
            Image::load(&[], &[]),
            Err(Error::MismatchedInputs(0, 0))
        ));
    }

    #[test]
    fn verify_points_at_first_difference() {
        let image = Image::fixture();
        let mut flash = vec![0xff; 0x400];
        for segment in image.segments() {
            let start = segment.address() as usize;
            flash[start..start + segment.size()].copy_from_slice(segment.data());
        }
        assert!(image.verify(0, &flash).is_ok());

        flash[0x215] ^= 0x80;
        assert!(matches!(image.verify(0, &flash), Err(Error::VerifyFailed(0x215))));

        assert!(matches!(
            image.verify(0, &flash[..0x3f0]),
            Err(Error::VerifyFailed(0x215))
        ));
    }

    #[test]
    fn verify_against_a_rebased_image() {
        let mut first = NamedTempFile::new().unwrap();
        first.write_all(&[1, 2]).unwrap();
        let mut second = NamedTempFile::new().unwrap();
        second.write_all(&[3]).unwrap();

        let inputs = [first.path().to_path_buf(), second.path().to_path_buf()];
        let image = Image::load(&inputs, &[0x8000_0004, 0x8000_0000]).unwrap();
        assert_eq!(image.base(), 0x8000_0000);

        let flash = [3, 0xff, 0xff, 0xff, 1, 2];
        assert!(image.verify(image.base(), &flash).is_ok());
        assert!(matches!(
            image.verify(0x8000_0001, &flash),
            Err(Error::VerifyFailed(0x8000_0000))
        ));
    }

    #[test]
    fn verify_catches_truncated_flash() {
        let image = Image::fixture();
        let mut flash = vec![0; 0x3f0];
        for segment in image.segments() {
            let start = segment.address() as usize;
            let end = (start + segment.size()).min(flash.len());
            flash[start..end].copy_from_slice(&segment.data()[..end - start]);
        }

        assert!(matches!(image.verify(0, &flash), Err(Error::VerifyFailed(0x3f0))));
    }
}
