//! HSPICE data block decoding.
//!
//! One data table is stored as a run of framed blocks terminated by a
//! value >= 1e30 in the table's last slot. Both the 9601 (f32) and 2001
//! (f64) payload layouts decode through the same interface.

use crate::cursor::ByteCursor;
use crate::types::{Result, WaveformError};

/// End-of-table marker for the 9601 format (f32 representation of ~1e30).
pub const END_MARKER_9601: f32 = 1.000_000_015_047_466_2e30_f32;
/// End-of-table marker for the 2001 format.
pub const END_MARKER_2001: f64 = 1.0e30_f64;

/// Post format version, selecting the payload precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostVersion {
    /// 9007/9601 format: 4-byte f32 payloads.
    V9601,
    /// 2001 format: 8-byte f64 payloads.
    V2001,
}

impl PostVersion {
    #[inline]
    pub fn item_size(self) -> usize {
        match self {
            PostVersion::V9601 => 4,
            PostVersion::V2001 => 8,
        }
    }
}

/// One decoded block's payload.
#[derive(Debug)]
pub struct Block {
    pub values: Vec<f64>,
    /// Whether the end-of-table marker was seen (and stripped).
    pub end_of_table: bool,
}

/// Decodes framed HSPICE data blocks from a positioned cursor.
pub struct BlockDecoder<'a> {
    cursor: ByteCursor<'a>,
    version: PostVersion,
}

impl<'a> BlockDecoder<'a> {
    pub fn new(data: &'a [u8], version: PostVersion) -> Self {
        Self {
            cursor: ByteCursor::new(data),
            version,
        }
    }

    /// Resume decoding from an already-positioned cursor (after the header).
    pub fn from_cursor(cursor: ByteCursor<'a>, version: PostVersion) -> Self {
        Self { cursor, version }
    }

    /// Bytes consumed so far, relative to the decoder's start.
    #[inline]
    pub fn bytes_consumed(&self) -> usize {
        self.cursor.position()
    }

    /// Decode the next block. `Ok(None)` only at a clean block boundary
    /// with no bytes left; a short block is `TruncatedData`.
    pub fn next_block(&mut self) -> Result<Option<Block>> {
        if self.cursor.remaining() == 0 {
            return Ok(None);
        }

        let item_size = self.version.item_size();
        let (num_items, payload_len) = self.cursor.read_block_prologue(item_size)?;

        let mut values = Vec::with_capacity(num_items);
        let end_of_table = match self.version {
            PostVersion::V9601 => {
                self.cursor.read_f32_into_f64(num_items, &mut values)?;
                values
                    .last()
                    .map(|&v| v as f32 >= END_MARKER_9601)
                    .unwrap_or(false)
            }
            PostVersion::V2001 => {
                self.cursor.read_f64_into(num_items, &mut values)?;
                values
                    .last()
                    .map(|&v| v >= END_MARKER_2001)
                    .unwrap_or(false)
            }
        };
        self.cursor.read_block_epilogue(payload_len)?;

        if end_of_table {
            values.pop();
        }

        Ok(Some(Block {
            values,
            end_of_table,
        }))
    }

    /// Decode blocks until the end-of-table marker, returning the table's
    /// raw values (marker stripped). Running out of bytes before the
    /// marker is `TruncatedData`.
    pub fn read_table(&mut self) -> Result<Vec<f64>> {
        let estimated = self.cursor.remaining() / (self.version.item_size() + 1);
        let mut values = Vec::with_capacity(estimated);

        loop {
            match self.next_block()? {
                Some(block) => {
                    values.extend(block.values);
                    if block.end_of_table {
                        return Ok(values);
                    }
                }
                None => {
                    return Err(WaveformError::TruncatedData(
                        "end of file before end-of-table marker".into(),
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_9601(values: &[f32]) -> Vec<u8> {
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let mut out = Vec::new();
        out.extend_from_slice(&4i32.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&4i32.to_le_bytes());
        out.extend_from_slice(&(payload.len() as i32).to_le_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&(payload.len() as i32).to_le_bytes());
        out
    }

    #[test]
    fn reads_table_across_blocks() {
        let mut data = block_9601(&[0.0, 1.0, 2.0]);
        data.extend(block_9601(&[3.0, END_MARKER_9601]));

        let mut decoder = BlockDecoder::new(&data, PostVersion::V9601);
        let values = decoder.read_table().unwrap();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn missing_end_marker_is_truncated() {
        let data = block_9601(&[0.0, 1.0]);
        let mut decoder = BlockDecoder::new(&data, PostVersion::V9601);
        let err = decoder.read_table().unwrap_err();
        assert!(matches!(err, WaveformError::TruncatedData(_)));
    }

    #[test]
    fn short_payload_is_truncated() {
        let data = block_9601(&[0.0, 1.0, END_MARKER_9601]);
        let mut decoder = BlockDecoder::new(&data[..data.len() - 8], PostVersion::V9601);
        let err = decoder.read_table().unwrap_err();
        assert!(matches!(err, WaveformError::TruncatedData(_)));
    }
}
