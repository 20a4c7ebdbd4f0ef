//! Format detection from the first bytes of a file.

use crate::types::Result;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// How many leading bytes the sniffer inspects for classification.
pub const SNIFF_LEN: usize = 64;

/// Classified on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    HspiceBinary,
    SpiceRawAscii,
    SpiceRawBinary,
    Unknown,
}

/// Find `needle` inside `haystack`.
pub(crate) fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Does the prefix carry the HSPICE framed-block prologue? The first and
/// third words of every block are the sentinel 4, in either byte order.
fn has_block_prologue(prefix: &[u8]) -> bool {
    if prefix.len() < 16 {
        return false;
    }
    (LittleEndian::read_i32(&prefix[0..4]) == 4 && LittleEndian::read_i32(&prefix[8..12]) == 4)
        || (BigEndian::read_i32(&prefix[0..4]) == 4 && BigEndian::read_i32(&prefix[8..12]) == 4)
}

/// Does the prefix look like the textual raw prologue? Raw files open with
/// a `Title:` line.
fn has_raw_prologue(prefix: &[u8]) -> bool {
    let window = &prefix[..prefix.len().min(SNIFF_LEN)];
    find_subsequence(window, b"Title:").is_some()
}

/// Classify a file from its contents. The leading `SNIFF_LEN` bytes pick
/// the format family; for the raw family the whole slice is scanned for a
/// literal `Binary:` marker line to separate the two sub-variants.
pub fn sniff(data: &[u8]) -> FileFormat {
    if has_block_prologue(data) {
        return FileFormat::HspiceBinary;
    }
    if has_raw_prologue(data) {
        let format = if find_subsequence(data, b"\nBinary:").is_some() {
            FileFormat::SpiceRawBinary
        } else {
            FileFormat::SpiceRawAscii
        };
        debug!(?format, "raw prologue detected");
        return format;
    }
    FileFormat::Unknown
}

/// Classify a file on disk without decoding it.
pub fn sniff_file<P: AsRef<Path>>(path: P) -> Result<FileFormat> {
    let file = File::open(path.as_ref())?;
    if file.metadata()?.len() == 0 {
        return Ok(FileFormat::Unknown);
    }
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(sniff(&mmap))
}

/// Classify within the raw family only, for callers that force raw
/// decoding. Non-raw input is `Unknown`.
pub fn sniff_raw(data: &[u8]) -> FileFormat {
    if !has_raw_prologue(data) {
        return FileFormat::Unknown;
    }
    if find_subsequence(data, b"\nBinary:").is_some() {
        FileFormat::SpiceRawBinary
    } else {
        FileFormat::SpiceRawAscii
    }
}
