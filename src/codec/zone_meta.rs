//! Zone metadata encoding
//!
//! Key → LBA table of one zone, written just before the zone is finished.
//! `[key_len: u16][lba: u64][key]` repeated, padded to a page boundary.

use bytes::Bytes;

use crate::config::align_to_page;
use crate::error::{Result, ZoneKvError};
use crate::iobuf::IoBuf;

/// KeyLen (2) + Lba (8)
pub const ZONE_META_ENTRY_HEADER: usize = 10;

/// Encoded size of one metadata entry
pub fn meta_entry_len(key_len: usize) -> u64 {
    (ZONE_META_ENTRY_HEADER + key_len) as u64
}

/// Encode the table into a page-aligned buffer
///
/// Returns the buffer (size rounded up to the page) and the unpadded size.
pub fn encode_zone_meta(entries: &[(Bytes, u64)]) -> Result<(IoBuf, u32)> {
    let real_size: u64 = entries.iter().map(|(key, _)| meta_entry_len(key.len())).sum();
    if real_size > u32::MAX as u64 {
        return Err(ZoneKvError::Status(format!(
            "zone metadata of {} bytes exceeds u32",
            real_size
        )));
    }

    let mut buf = IoBuf::with_capacity(align_to_page(real_size) as usize);
    for (key, lba) in entries {
        buf.append(&(key.len() as u16).to_le_bytes())?;
        buf.append(&lba.to_le_bytes())?;
        buf.append(key)?;
    }
    buf.align_to_page();

    Ok((buf, real_size as u32))
}

/// Iterate over the entries of an unpadded metadata block
pub fn decode_zone_meta(bytes: &[u8]) -> ZoneMetaIter<'_> {
    ZoneMetaIter { bytes, pos: 0 }
}

/// Iterator over `(key, lba)` metadata entries
pub struct ZoneMetaIter<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for ZoneMetaIter<'a> {
    type Item = Result<(&'a [u8], u64)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.bytes.len() {
            return None;
        }

        let rest = &self.bytes[self.pos..];
        if rest.len() < ZONE_META_ENTRY_HEADER {
            self.pos = self.bytes.len();
            return Some(Err(ZoneKvError::Corruption(format!(
                "zone metadata entry header truncated at {}",
                self.pos
            ))));
        }

        let key_len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
        let mut lba = [0u8; 8];
        lba.copy_from_slice(&rest[2..10]);
        let lba = u64::from_le_bytes(lba);

        let end = ZONE_META_ENTRY_HEADER + key_len;
        if rest.len() < end {
            self.pos = self.bytes.len();
            return Some(Err(ZoneKvError::Corruption(format!(
                "zone metadata key truncated at {}: need {} bytes, got {}",
                self.pos,
                key_len,
                rest.len() - ZONE_META_ENTRY_HEADER
            ))));
        }

        self.pos += end;
        Some(Ok((&rest[ZONE_META_ENTRY_HEADER..end], lba)))
    }
}
