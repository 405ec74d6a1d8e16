//! The user-program binary format: a magic number followed by three
//! segment descriptors (code, initialized data, uninitialized data/BSS).
//! Ported from `addrspace.cc`'s `NoffHeader`/`SwapHeader`, with the
//! endian-swap-only-if-needed idiom replaced by fixing the wire format as
//! little-endian.

pub const NOFF_MAGIC: u32 = 0xbadfad;

/// One segment's extent in the executable file and its target virtual
/// address, mirroring the original's `noffH.code`/`initData`/`uninitData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Segment {
    pub size: usize,
    pub virtual_address: usize,
    pub in_file_offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoffHeader {
    pub code: Segment,
    pub init_data: Segment,
    pub uninit_data: Segment,
}

impl NoffHeader {
    const SEGMENT_LEN: usize = 4 * 3;
    pub const ENCODED_LEN: usize = 4 + 3 * Self::SEGMENT_LEN;

    /// Total virtual memory the segments span, not counting the stack the
    /// loader appends past `uninit_data`.
    pub fn image_size(&self) -> usize {
        self.code.size + self.init_data.size + self.uninit_data.size
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NoffError> {
        if bytes.len() < Self::ENCODED_LEN {
            return Err(NoffError::Truncated { have: bytes.len(), need: Self::ENCODED_LEN });
        }
        let mut r = 0;
        let mut get_u32 = |bytes: &[u8], r: &mut usize| {
            let v = u32::from_le_bytes(bytes[*r..*r + 4].try_into().unwrap());
            *r += 4;
            v
        };
        let magic = get_u32(bytes, &mut r);
        if magic != NOFF_MAGIC {
            return Err(NoffError::BadMagic(magic));
        }
        let mut get_segment = |bytes: &[u8], r: &mut usize| Segment {
            size: get_u32(bytes, r) as usize,
            virtual_address: get_u32(bytes, r) as usize,
            in_file_offset: get_u32(bytes, r) as usize,
        };
        let code = get_segment(bytes, &mut r);
        let init_data = get_segment(bytes, &mut r);
        let uninit_data = get_segment(bytes, &mut r);
        Ok(Self { code, init_data, uninit_data })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NoffError {
    #[error("executable header truncated: have {have} bytes, need {need}")]
    Truncated { have: usize, need: usize },

    #[error("bad NOFF magic number: {0:#x}")]
    BadMagic(u32),
}

/// Describes a loadable user program: the parsed header plus the raw
/// executable bytes it indexes into, so the address-space loader can copy
/// code/init-data into physical memory without re-reading a file.
pub trait UserProgramImage {
    fn header(&self) -> &NoffHeader;
    fn bytes(&self) -> &[u8];

    fn code_segment(&self) -> &[u8] {
        let seg = self.header().code;
        &self.bytes()[seg.in_file_offset..seg.in_file_offset + seg.size]
    }

    fn init_data_segment(&self) -> &[u8] {
        let seg = self.header().init_data;
        &self.bytes()[seg.in_file_offset..seg.in_file_offset + seg.size]
    }
}

/// An in-memory executable image, e.g. read from an [`crate::fs::OpenFile`]
/// or held as a test fixture.
pub struct NoffImage {
    header: NoffHeader,
    bytes: Vec<u8>,
}

impl NoffImage {
    pub fn parse(bytes: Vec<u8>) -> Result<Self, NoffError> {
        let header = NoffHeader::decode(&bytes)?;
        Ok(Self { header, bytes })
    }
}

impl UserProgramImage for NoffImage {
    fn header(&self) -> &NoffHeader {
        &self.header
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(header: &NoffHeader) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&NOFF_MAGIC.to_le_bytes());
        for seg in [header.code, header.init_data, header.uninit_data] {
            buf.extend_from_slice(&(seg.size as u32).to_le_bytes());
            buf.extend_from_slice(&(seg.virtual_address as u32).to_le_bytes());
            buf.extend_from_slice(&(seg.in_file_offset as u32).to_le_bytes());
        }
        buf
    }

    #[test]
    fn header_round_trips_through_encode_decode() {
        let header = NoffHeader {
            code: Segment { size: 128, virtual_address: 0, in_file_offset: NoffHeader::ENCODED_LEN },
            init_data: Segment { size: 32, virtual_address: 128, in_file_offset: NoffHeader::ENCODED_LEN + 128 },
            uninit_data: Segment { size: 64, virtual_address: 160, in_file_offset: 0 },
        };
        let bytes = encode(&header);
        let decoded = NoffHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut bytes = encode(&NoffHeader {
            code: Segment::default(),
            init_data: Segment::default(),
            uninit_data: Segment::default(),
        });
        bytes[0] = 0;
        assert!(matches!(NoffHeader::decode(&bytes), Err(NoffError::BadMagic(_))));
    }

    #[test]
    fn truncated_header_is_rejected() {
        assert!(matches!(NoffHeader::decode(&[0u8; 4]), Err(NoffError::Truncated { .. })));
    }

    #[test]
    fn image_size_sums_the_three_segments() {
        let header = NoffHeader {
            code: Segment { size: 10, ..Default::default() },
            init_data: Segment { size: 20, ..Default::default() },
            uninit_data: Segment { size: 30, ..Default::default() },
        };
        assert_eq!(header.image_size(), 60);
    }

    #[test]
    fn code_segment_slices_the_right_bytes() {
        let header = NoffHeader {
            code: Segment { size: 4, virtual_address: 0, in_file_offset: NoffHeader::ENCODED_LEN },
            init_data: Segment::default(),
            uninit_data: Segment::default(),
        };
        let mut bytes = encode(&header);
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        let image = NoffImage::parse(bytes).unwrap();
        assert_eq!(image.code_segment(), &[1, 2, 3, 4]);
    }
}
