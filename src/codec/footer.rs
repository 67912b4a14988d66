//! Zone footer encoding
//!
//! One page at the end of every finished zone. The last 16 bytes locate the
//! metadata block; the 16 bytes before them identify the footer and carry the
//! zone's close sequence plus a checksum of the metadata.
//!
//! ```text
//! offset (from page start)
//!   0 .. 4064   zero padding (reserved)
//!   4064        magic "ZKVF"        (4)
//!   4068        sequence            (8)
//!   4076        metadata crc32      (4)
//!   4080        key count           (4)
//!   4084        metadata size       (4)
//!   4088        metadata offset     (8)
//! ```

use crate::config::{align_to_page, PAGE_SIZE};
use crate::error::{Result, ZoneKvError};
use crate::iobuf::IoBuf;

/// The footer is exactly one page
pub const FOOTER_SIZE: usize = PAGE_SIZE;

/// Identifies a finished zone's footer
pub const FOOTER_MAGIC: &[u8; 4] = b"ZKVF";

const TAIL_SIZE: usize = 16;
const EXT_SIZE: usize = 16;
const EXT_START: usize = FOOTER_SIZE - TAIL_SIZE - EXT_SIZE;
const TAIL_START: usize = FOOTER_SIZE - TAIL_SIZE;

/// Decoded zone footer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneFooter {
    pub key_count: u32,
    /// Unpadded metadata size
    pub metadata_size: u32,
    /// Global byte offset of the metadata block
    pub metadata_offset: u64,
    pub sequence: u64,
    pub metadata_crc: u32,
}

impl ZoneFooter {
    /// Build a footer for `metadata` (unpadded bytes) written at `metadata_offset`
    pub fn new(key_count: u32, metadata: &[u8], metadata_offset: u64, sequence: u64) -> Self {
        Self {
            key_count,
            metadata_size: metadata.len() as u32,
            metadata_offset,
            sequence,
            metadata_crc: crc32fast::hash(metadata),
        }
    }

    /// Encode into a full, page-aligned buffer
    pub fn encode(&self) -> Result<IoBuf> {
        let mut buf = IoBuf::with_capacity(FOOTER_SIZE);
        buf.fill(&[0u8; EXT_START]);
        buf.append(FOOTER_MAGIC)?;
        buf.append(&self.sequence.to_le_bytes())?;
        buf.append(&self.metadata_crc.to_le_bytes())?;
        buf.append(&self.key_count.to_le_bytes())?;
        buf.append(&self.metadata_size.to_le_bytes())?;
        buf.append(&self.metadata_offset.to_le_bytes())?;
        Ok(buf)
    }

    /// True if the page carries a footer at all (finished zone)
    pub fn is_present(page: &[u8]) -> bool {
        page.len() >= FOOTER_SIZE && &page[EXT_START..EXT_START + 4] == FOOTER_MAGIC
    }

    /// Decode a footer page
    pub fn decode(page: &[u8]) -> Result<Self> {
        if page.len() < FOOTER_SIZE {
            return Err(ZoneKvError::Corruption(format!(
                "footer needs {} bytes, got {}",
                FOOTER_SIZE,
                page.len()
            )));
        }
        if !Self::is_present(page) {
            return Err(ZoneKvError::Corruption(format!(
                "invalid footer magic: {:?}",
                &page[EXT_START..EXT_START + 4]
            )));
        }

        let ext = &page[EXT_START..TAIL_START];
        let tail = &page[TAIL_START..FOOTER_SIZE];
        Ok(Self {
            sequence: u64::from_le_bytes(array(&ext[4..12])),
            metadata_crc: u32::from_le_bytes(array(&ext[12..16])),
            key_count: u32::from_le_bytes(array(&tail[0..4])),
            metadata_size: u32::from_le_bytes(array(&tail[4..8])),
            metadata_offset: u64::from_le_bytes(array(&tail[8..16])),
        })
    }

    /// Check the metadata block lies between the zone start and the footer
    pub fn validate_bounds(&self, zone_offset: u64, footer_offset: u64) -> Result<()> {
        let meta_end = self
            .metadata_offset
            .checked_add(align_to_page(self.metadata_size as u64))
            .ok_or_else(|| {
                ZoneKvError::Corruption(format!(
                    "footer metadata offset {} overflows with size {}",
                    self.metadata_offset, self.metadata_size
                ))
            })?;
        if self.metadata_offset < zone_offset
            || self.metadata_offset % PAGE_SIZE as u64 != 0
            || meta_end > footer_offset
        {
            return Err(ZoneKvError::Corruption(format!(
                "footer metadata range [{}, {}) outside zone data [{}, {})",
                self.metadata_offset, meta_end, zone_offset, footer_offset
            )));
        }
        Ok(())
    }

    /// Verify the unpadded metadata bytes against the stored checksum
    pub fn verify_metadata(&self, metadata: &[u8]) -> Result<()> {
        let actual = crc32fast::hash(metadata);
        if actual != self.metadata_crc {
            return Err(ZoneKvError::Corruption(format!(
                "zone metadata checksum mismatch: expected {:08x}, got {:08x}",
                self.metadata_crc, actual
            )));
        }
        Ok(())
    }
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}
