//! Record encoding
//!
//! `[key_len: u16][value_len: u32][key][value]`

use bytes::Bytes;

use crate::error::{Result, ZoneKvError};

/// KeyLen (2) + ValLen (4)
pub const RECORD_HEADER_SIZE: usize = 6;

/// Header bytes for a record
pub fn encode_record_header(key_len: u16, value_len: u32) -> [u8; RECORD_HEADER_SIZE] {
    let mut header = [0u8; RECORD_HEADER_SIZE];
    header[0..2].copy_from_slice(&key_len.to_le_bytes());
    header[2..6].copy_from_slice(&value_len.to_le_bytes());
    header
}

/// Parse `(key_len, value_len)` from the first 6 bytes
pub fn decode_record_header(bytes: &[u8]) -> Result<(u16, u32)> {
    if bytes.len() < RECORD_HEADER_SIZE {
        return Err(ZoneKvError::Corruption(format!(
            "record header needs {} bytes, got {}",
            RECORD_HEADER_SIZE,
            bytes.len()
        )));
    }
    let key_len = u16::from_le_bytes([bytes[0], bytes[1]]);
    let value_len = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
    Ok((key_len, value_len))
}

/// Total encoded size of a record
pub fn encoded_record_len(key_len: usize, value_len: usize) -> u64 {
    (RECORD_HEADER_SIZE + key_len + value_len) as u64
}

/// Decode a complete record starting at the beginning of `bytes`
pub fn decode_record(bytes: &[u8]) -> Result<(Bytes, Bytes)> {
    let (key_len, value_len) = decode_record_header(bytes)?;
    let key_end = RECORD_HEADER_SIZE + key_len as usize;
    let value_end = key_end + value_len as usize;
    if bytes.len() < value_end {
        return Err(ZoneKvError::Corruption(format!(
            "record truncated: need {} bytes, got {}",
            value_end,
            bytes.len()
        )));
    }
    Ok((
        Bytes::copy_from_slice(&bytes[RECORD_HEADER_SIZE..key_end]),
        Bytes::copy_from_slice(&bytes[key_end..value_end]),
    ))
}
