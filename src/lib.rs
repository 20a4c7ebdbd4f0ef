//! Reader for circuit-simulator waveform files.
//!
//! Decodes HSPICE binary output (`.tr0`, `.ac0`, `.sw0`, 9007/9601 and
//! 2001 post formats) and SPICE3/ngspice rawfiles (ASCII and binary) into
//! one in-memory model, with automatic format and endianness detection.
//!
//! Two decode paths are offered:
//!
//! - [`read`] maps the whole file and returns an immutable
//!   [`WaveformResult`] holding every table.
//! - [`WaveformStream`] delivers the first table in caller-sized chunks,
//!   keeping peak memory independent of file size.
//!
//! ```no_run
//! # fn main() -> waveform_reader::Result<()> {
//! let result = waveform_reader::read("sim.tr0")?;
//! println!("{} points of {}", result.len(), result.scale_name());
//! for chunk in waveform_reader::read_stream_chunked("sim.tr0", 4096)? {
//!     let chunk = chunk?;
//!     println!("points {}..{}", chunk.point_range.0, chunk.point_range.1);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Diagnostics go through [`tracing`]; install a subscriber to see them.

mod block;
mod cursor;
mod hspice;
mod raw;
mod sniff;
mod stream;
mod sweep;
mod types;

pub use sniff::{sniff, sniff_file, FileFormat};
pub use stream::{
    read_stream, read_stream_chunked, DataChunk, StreamMetadata, StreamStatus, WaveformStream,
    DEFAULT_CHUNK_SIZE,
};
pub use types::{
    AnalysisType, DataTable, Endian, Result, SweepInfo, VarType, Variable, VectorData,
    WaveformError, WaveformResult,
};

use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tracing::instrument;

fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Err(WaveformError::UnrecognizedFormat);
    }
    // Read-only map; the file is never written through it.
    Ok(unsafe { Mmap::map(&file)? })
}

/// Decode a whole waveform file, auto-detecting its format.
///
/// All-or-nothing: any malformed or truncated section fails the whole
/// decode and nothing partial is returned.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn read<P: AsRef<Path>>(path: P) -> Result<WaveformResult> {
    let mmap = map_file(path.as_ref())?;
    let extension = path.as_ref().extension().and_then(|e| e.to_str());
    match sniff::sniff(&mmap) {
        FileFormat::HspiceBinary => hspice::decode(&mmap, extension),
        FileFormat::SpiceRawAscii | FileFormat::SpiceRawBinary => raw::decode(&mmap),
        FileFormat::Unknown => Err(WaveformError::UnrecognizedFormat),
    }
}

/// Decode a file as a SPICE rawfile, skipping HSPICE detection. Input
/// without a raw prologue is `UnrecognizedFormat`.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn read_raw<P: AsRef<Path>>(path: P) -> Result<WaveformResult> {
    let mmap = map_file(path.as_ref())?;
    match sniff::sniff_raw(&mmap) {
        FileFormat::SpiceRawAscii | FileFormat::SpiceRawBinary => raw::decode(&mmap),
        _ => Err(WaveformError::UnrecognizedFormat),
    }
}

/// Decode an already-loaded waveform file image.
pub fn read_bytes(data: &[u8]) -> Result<WaveformResult> {
    match sniff::sniff(data) {
        FileFormat::HspiceBinary => hspice::decode(data, None),
        FileFormat::SpiceRawAscii | FileFormat::SpiceRawBinary => raw::decode(data),
        FileFormat::Unknown => Err(WaveformError::UnrecognizedFormat),
    }
}

#[deprecated(note = "diagnostics moved to `tracing`; install a subscriber instead")]
pub fn read_debug<P: AsRef<Path>>(path: P, _debug: i32) -> Result<WaveformResult> {
    read(path)
}

#[deprecated(note = "diagnostics moved to `tracing`; install a subscriber instead")]
pub fn read_raw_debug<P: AsRef<Path>>(path: P, _debug: i32) -> Result<WaveformResult> {
    read_raw(path)
}
