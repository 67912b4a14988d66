//! Read path: decoding one record from the device by LBA

use bytes::Bytes;

use super::ZoneManager;
use crate::codec::{decode_record, decode_record_header, encoded_record_len, RECORD_HEADER_SIZE};
use crate::config::{align_to_page, MAX_KEY_SIZE, MAX_VALUE_SIZE, PAGE_SIZE};
use crate::error::{Result, ZoneKvError};
use crate::iobuf::IoBuf;
use crate::metrics::Counter;

impl ZoneManager {
    /// Read the record starting at `lba`
    ///
    /// The first aligned window covers the header and the largest key; a
    /// second read fetches the rest when the value is longer.
    pub fn read_single_item(&self, lba: u64) -> Result<(Bytes, Bytes)> {
        let page = PAGE_SIZE as u64;
        let page_start = lba - lba % page;
        let skip = (lba - page_start) as usize;
        let device_end = self.device.capacity();
        if page_start >= device_end {
            return Err(ZoneKvError::InvalidArgument(format!(
                "lba {} past device end {}",
                lba, device_end
            )));
        }

        let first_len =
            align_to_page((skip + RECORD_HEADER_SIZE + MAX_KEY_SIZE) as u64).min(device_end - page_start);
        let mut window = self.read_window(page_start, first_len, skip)?;

        let (key_len, value_len) = decode_record_header(window.as_slice())?;
        if key_len as usize > MAX_KEY_SIZE || value_len as usize > MAX_VALUE_SIZE {
            return Err(ZoneKvError::Corruption(format!(
                "record at {} has invalid sizes: key {} value {}",
                lba, key_len, value_len
            )));
        }

        let total = encoded_record_len(key_len as usize, value_len as usize) as usize;
        if total > window.size() {
            let full_len = align_to_page((skip + total) as u64);
            if page_start + full_len > device_end {
                return Err(ZoneKvError::Corruption(format!(
                    "record at {} of {} bytes runs past the device end",
                    lba, total
                )));
            }
            window = self.read_window(page_start, full_len, skip)?;
        }

        decode_record(window.as_slice())
    }

    /// Aligned read exposing bytes from `skip` onwards
    fn read_window(&self, offset: u64, len: u64, skip: usize) -> Result<IoBuf> {
        let mut buf = IoBuf::try_with_capacity(len as usize)?;
        self.device.read(offset, &mut buf)?;
        let visible = buf.size() - skip;
        buf.shrink(skip, visible)?;
        self.metrics.incr(Counter::DiskReads);
        Ok(buf)
    }
}
