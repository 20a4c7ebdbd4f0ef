//! Positioned, endianness-aware reader over a memory-mapped byte source.
//!
//! Every other component reads through a `ByteCursor`. For the HSPICE
//! binary format it also understands the Fortran-style record framing:
//! a 16-byte prologue whose first and third words are the sentinel 4,
//! a payload, and a trailing length word repeating the payload size.

use crate::types::{Endian, Result, WaveformError};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Sentinel word found twice in every block prologue; used to detect
/// byte order.
const BLOCK_SENTINEL: i32 = 0x0000_0004;

pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Option<Endian>,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            endian: None,
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Byte order, once the first block prologue has been read.
    #[inline]
    pub fn endian(&self) -> Option<Endian> {
        self.endian
    }

    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            return Err(WaveformError::TruncatedData(format!(
                "need {} bytes at offset {}, {} available",
                count,
                self.pos,
                self.remaining()
            )));
        }
        let bytes = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    #[inline]
    fn read_i32_with(&self, bytes: &[u8], endian: Endian) -> i32 {
        match endian {
            Endian::Little => LittleEndian::read_i32(bytes),
            Endian::Big => BigEndian::read_i32(bytes),
        }
    }

    /// Read a 16-byte block prologue, detecting endianness from the two
    /// sentinel words. Returns the item count (payload length divided by
    /// `item_size`) and the payload byte length for trailer verification.
    pub fn read_block_prologue(&mut self, item_size: usize) -> Result<(usize, i32)> {
        let header = self.read_bytes(16)?;

        let endian = if LittleEndian::read_i32(&header[0..4]) == BLOCK_SENTINEL
            && LittleEndian::read_i32(&header[8..12]) == BLOCK_SENTINEL
        {
            Endian::Little
        } else if BigEndian::read_i32(&header[0..4]) == BLOCK_SENTINEL
            && BigEndian::read_i32(&header[8..12]) == BLOCK_SENTINEL
        {
            Endian::Big
        } else {
            return Err(WaveformError::MalformedHeader(
                "corrupted block prologue".into(),
            ));
        };
        self.endian = Some(endian);

        let payload_len = self.read_i32_with(&header[12..16], endian);
        if payload_len < 0 {
            return Err(WaveformError::MalformedHeader(
                "negative block length".into(),
            ));
        }

        Ok((payload_len as usize / item_size.max(1), payload_len))
    }

    /// Read the trailing length word and verify it repeats the prologue's.
    pub fn read_block_epilogue(&mut self, expected: i32) -> Result<()> {
        let endian = self.endian.unwrap_or(Endian::Little);
        let bytes = self.read_bytes(4)?;
        let trailer = self.read_i32_with(bytes, endian);
        if trailer != expected {
            return Err(WaveformError::MalformedHeader(
                "block prologue and trailer length mismatch".into(),
            ));
        }
        Ok(())
    }

    /// Bulk-read `count` f32 values, widening each to f64 (9601 payloads).
    pub fn read_f32_into_f64(&mut self, count: usize, out: &mut Vec<f64>) -> Result<()> {
        let endian = self.endian.unwrap_or(Endian::Little);
        let bytes = self.read_bytes(count * 4)?;
        out.reserve(count);
        match endian {
            Endian::Little => {
                for chunk in bytes.chunks_exact(4) {
                    out.push(LittleEndian::read_f32(chunk) as f64);
                }
            }
            Endian::Big => {
                for chunk in bytes.chunks_exact(4) {
                    out.push(BigEndian::read_f32(chunk) as f64);
                }
            }
        }
        Ok(())
    }

    /// Bulk-read `count` f64 values (2001 payloads).
    pub fn read_f64_into(&mut self, count: usize, out: &mut Vec<f64>) -> Result<()> {
        let endian = self.endian.unwrap_or(Endian::Little);
        let bytes = self.read_bytes(count * 8)?;
        out.reserve(count);
        match endian {
            Endian::Little => {
                for chunk in bytes.chunks_exact(8) {
                    out.push(LittleEndian::read_f64(chunk));
                }
            }
            Endian::Big => {
                for chunk in bytes.chunks_exact(8) {
                    out.push(BigEndian::read_f64(chunk));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&4i32.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&4i32.to_le_bytes());
        out.extend_from_slice(&(payload.len() as i32).to_le_bytes());
        out.extend_from_slice(payload);
        out.extend_from_slice(&(payload.len() as i32).to_le_bytes());
        out
    }

    #[test]
    fn reads_little_endian_block() {
        let payload: Vec<u8> = [1.5f32, -2.0f32]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let data = framed(&payload);

        let mut cursor = ByteCursor::new(&data);
        let (items, len) = cursor.read_block_prologue(4).unwrap();
        assert_eq!(items, 2);
        assert_eq!(cursor.endian(), Some(Endian::Little));

        let mut values = Vec::new();
        cursor.read_f32_into_f64(items, &mut values).unwrap();
        assert_eq!(values, vec![1.5, -2.0]);
        cursor.read_block_epilogue(len).unwrap();
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn reads_big_endian_block() {
        let mut data = Vec::new();
        data.extend_from_slice(&4i32.to_be_bytes());
        data.extend_from_slice(&0i32.to_be_bytes());
        data.extend_from_slice(&4i32.to_be_bytes());
        data.extend_from_slice(&8i32.to_be_bytes());
        data.extend_from_slice(&3.25f64.to_be_bytes());
        data.extend_from_slice(&8i32.to_be_bytes());

        let mut cursor = ByteCursor::new(&data);
        let (items, len) = cursor.read_block_prologue(8).unwrap();
        assert_eq!(items, 1);
        assert_eq!(cursor.endian(), Some(Endian::Big));

        let mut values = Vec::new();
        cursor.read_f64_into(items, &mut values).unwrap();
        assert_eq!(values, vec![3.25]);
        cursor.read_block_epilogue(len).unwrap();
    }

    #[test]
    fn short_read_is_truncated_data() {
        let data = framed(&[0u8; 8]);
        let mut cursor = ByteCursor::new(&data[..20]);
        let err = cursor
            .read_block_prologue(4)
            .and_then(|(items, _)| {
                let mut out = Vec::new();
                cursor.read_f32_into_f64(items, &mut out)
            })
            .unwrap_err();
        assert!(matches!(err, WaveformError::TruncatedData(_)));
    }

    #[test]
    fn garbage_prologue_is_malformed() {
        let data = [0xFFu8; 16];
        let mut cursor = ByteCursor::new(&data);
        let err = cursor.read_block_prologue(4).unwrap_err();
        assert!(matches!(err, WaveformError::MalformedHeader(_)));
    }

    #[test]
    fn trailer_mismatch_is_malformed() {
        let mut data = framed(&[0u8; 4]);
        let len = data.len();
        data[len - 4] = 0xAA;
        let mut cursor = ByteCursor::new(&data);
        let (items, expected) = cursor.read_block_prologue(4).unwrap();
        let mut out = Vec::new();
        cursor.read_f32_into_f64(items, &mut out).unwrap();
        let err = cursor.read_block_epilogue(expected).unwrap_err();
        assert!(matches!(err, WaveformError::MalformedHeader(_)));
    }
}
