//! Codec Module
//!
//! Byte layouts of everything the zone manager writes to a zone.
//!
//! ## Zone Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Data Region (records, page-aligned flushes)             │
//! │   [KeyLen: u16][ValLen: u32][Key][Value]                │
//! │   ... repeated, no framing between records ...          │
//! ├─────────────────────────────────────────────────────────┤
//! │ Zone Metadata (page-aligned, written at finish time)    │
//! │   [KeyLen: u16][Lba: u64][Key]                          │
//! │   ... one entry per record in the zone ...              │
//! ├─────────────────────────────────────────────────────────┤
//! │ (unused space)                                          │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (last page of the zone)                          │
//! │   ...zero padding...                                    │
//! │   Magic (4) | Sequence (8) | MetaCRC (4)                │
//! │   KeyCount (4) | MetaSize (4) | MetaOffset (8)          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//! All integers are little-endian.

mod footer;
mod record;
mod zone_meta;

pub use footer::{ZoneFooter, FOOTER_MAGIC, FOOTER_SIZE};
pub use record::{
    decode_record, decode_record_header, encode_record_header, encoded_record_len,
    RECORD_HEADER_SIZE,
};
pub use zone_meta::{
    decode_zone_meta, encode_zone_meta, meta_entry_len, ZoneMetaIter, ZONE_META_ENTRY_HEADER,
};
