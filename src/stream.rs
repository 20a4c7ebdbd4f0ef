//! Incremental chunked-streaming decode.
//!
//! A `WaveformStream` decodes the header once at open, then delivers the
//! first table's points in bounded chunks on demand. Peak memory is
//! O(chunk_size * signal count), not O(file size), and the concatenation
//! of all chunks equals what a whole-file decode reports for table 0.
//!
//! The cursor carries mutable position state and is not safe for
//! concurrent use; confine it to one thread or synchronize externally.

use crate::block::BlockDecoder;
use crate::cursor::ByteCursor;
use crate::hspice::{self, HspiceHeader};
use crate::raw::{self, AsciiPointScanner, RawPlotHeader};
use crate::sniff::{sniff, FileFormat};
use crate::types::{AnalysisType, Result, VectorData, WaveformError};
use memmap2::Mmap;
use num_complex::Complex64;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::{info, instrument, trace};

/// Default number of points per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 10000;

/// Outcome of one `next_chunk` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// A new chunk is current.
    Ready,
    /// Clean end of data; the stream is now exhausted.
    EndOfData,
}

/// One bounded, contiguous run of whole points.
#[derive(Debug, Clone)]
pub struct DataChunk {
    /// 0-based index of this chunk.
    pub chunk_index: usize,
    /// Point range [start, end) relative to the start of the table.
    pub point_range: (usize, usize),
    /// First and last scale sample within this chunk.
    pub scale_range: (f64, f64),
    /// Per-variable data for this chunk only, keyed by name.
    pub data: HashMap<String, VectorData>,
}

impl DataChunk {
    pub fn point_count(&self) -> usize {
        self.point_range.1 - self.point_range.0
    }

    pub fn get(&self, name: &str) -> Option<&VectorData> {
        self.data.get(name)
    }

    /// Copy a real signal's chunk values into `out`, truncating to its
    /// length. Fails (`None`) for unknown names and for complex signals;
    /// it never substitutes magnitudes.
    pub fn copy_signal_into(&self, name: &str, out: &mut [f64]) -> Option<usize> {
        match self.data.get(name)? {
            VectorData::Real(values) => {
                let count = values.len().min(out.len());
                out[..count].copy_from_slice(&values[..count]);
                Some(count)
            }
            VectorData::Complex(_) => None,
        }
    }

    /// Copy a complex signal's chunk values into matched buffers.
    pub fn copy_signal_complex_into(
        &self,
        name: &str,
        out_re: &mut [f64],
        out_im: &mut [f64],
    ) -> Option<usize> {
        match self.data.get(name)? {
            VectorData::Complex(values) => {
                let count = values.len().min(out_re.len()).min(out_im.len());
                for (i, c) in values.iter().take(count).enumerate() {
                    out_re[i] = c.re;
                    out_im[i] = c.im;
                }
                Some(count)
            }
            VectorData::Real(_) => None,
        }
    }
}

/// Header metadata shared by all chunks of a stream.
#[derive(Debug, Clone)]
pub struct StreamMetadata {
    pub title: String,
    pub date: String,
    pub scale_name: String,
    pub signal_names: Vec<String>,
    pub analysis: AnalysisType,
    pub is_complex: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Opened,
    ChunkReady,
    Exhausted,
    Closed,
    /// Mid-chunk decode failure; only `close` is valid from here.
    Failed,
}

/// Column layout of a flattened point row, shared by chunk building.
#[derive(Debug)]
struct RowLayout {
    scale_name: String,
    signal_names: Vec<String>,
    signal_complex: Vec<bool>,
    columns: usize,
}

#[derive(Debug)]
enum Source {
    Hspice {
        header: HspiceHeader,
        /// Values of an incomplete point carried across block boundaries.
        pending: Vec<f64>,
        first_read: bool,
        table_done: bool,
    },
    RawBinary {
        header: RawPlotHeader,
        total_points: usize,
        /// Trailing bytes that do not form a whole point.
        trailing_partial: bool,
        points_read: usize,
    },
    RawAscii {
        header: RawPlotHeader,
        points_read: usize,
        done: bool,
    },
}

impl Source {
    fn exhausted(&self) -> bool {
        match self {
            Source::Hspice { table_done, .. } => *table_done,
            Source::RawBinary {
                total_points,
                points_read,
                trailing_partial,
                ..
            } => points_read >= total_points && !trailing_partial,
            Source::RawAscii { done, .. } => *done,
        }
    }
}

/// Stateful incremental reader over one waveform file.
#[derive(Debug)]
pub struct WaveformStream {
    mmap: Option<Mmap>,
    data_pos: usize,
    source: Source,
    layout: RowLayout,
    metadata: StreamMetadata,
    chunk_size: usize,
    state: CursorState,
    chunk_index: usize,
    points_delivered: usize,
    /// Decoded rows not yet handed out, at most chunk_size + one block.
    row_buffer: Vec<Vec<f64>>,
    current: Option<DataChunk>,
}

impl WaveformStream {
    /// Open a file for streaming: sniff the format and decode the header,
    /// leaving the stream positioned at the first data block. A format or
    /// header failure fails the whole open.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P, chunk_size: usize) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        if file.metadata()?.len() == 0 {
            return Err(WaveformError::UnrecognizedFormat);
        }
        let mmap = unsafe { Mmap::map(&file)? };

        let (source, layout, metadata, data_pos) = match sniff(&mmap) {
            FileFormat::HspiceBinary => {
                let mut cursor = ByteCursor::new(&mmap);
                let header = hspice::decode_header(&mut cursor)?;
                let data_pos = cursor.position();
                let extension = path.as_ref().extension().and_then(|e| e.to_str());
                let analysis = hspice::infer_analysis(&header, extension);
                let layout = RowLayout {
                    scale_name: header.variables[0].name.clone(),
                    signal_names: header.variables[1..]
                        .iter()
                        .map(|v| v.name.clone())
                        .collect(),
                    signal_complex: (0..header.num_vectors - 1)
                        .map(|i| header.signal_is_complex(i))
                        .collect(),
                    columns: header.columns_per_point(),
                };
                let metadata = StreamMetadata {
                    title: header.title.clone(),
                    date: header.date.clone(),
                    scale_name: layout.scale_name.clone(),
                    signal_names: layout.signal_names.clone(),
                    analysis,
                    is_complex: header.is_complex,
                };
                let source = Source::Hspice {
                    header,
                    pending: Vec::new(),
                    first_read: true,
                    table_done: false,
                };
                (source, layout, metadata, data_pos)
            }
            FileFormat::SpiceRawAscii | FileFormat::SpiceRawBinary => {
                let header = raw::parse_plot_header(&mmap, 0)?;
                let data_pos = header.data_start;
                let layout = RowLayout {
                    scale_name: header.variables[0].name.clone(),
                    signal_names: header.variables[1..]
                        .iter()
                        .map(|v| v.name.clone())
                        .collect(),
                    signal_complex: vec![header.is_complex; header.num_variables - 1],
                    columns: header.columns_per_point(),
                };
                let metadata = StreamMetadata {
                    title: header.title.clone(),
                    date: header.date.clone(),
                    scale_name: layout.scale_name.clone(),
                    signal_names: layout.signal_names.clone(),
                    analysis: AnalysisType::from_plotname(&header.plotname),
                    is_complex: header.is_complex,
                };
                let source = if header.binary {
                    let available = mmap.len() - data_pos;
                    let stride = header.point_stride();
                    let (total_points, trailing_partial) = if header.num_points > 0 {
                        (header.num_points, false)
                    } else {
                        (available / stride, available % stride != 0)
                    };
                    Source::RawBinary {
                        header,
                        total_points,
                        trailing_partial,
                        points_read: 0,
                    }
                } else {
                    Source::RawAscii {
                        header,
                        points_read: 0,
                        done: false,
                    }
                };
                (source, layout, metadata, data_pos)
            }
            FileFormat::Unknown => return Err(WaveformError::UnrecognizedFormat),
        };

        info!(
            scale = %layout.scale_name,
            signals = layout.signal_names.len(),
            chunk_size,
            "stream opened"
        );

        Ok(Self {
            mmap: Some(mmap),
            data_pos,
            source,
            layout,
            metadata,
            chunk_size: chunk_size.max(1),
            state: CursorState::Opened,
            chunk_index: 0,
            points_delivered: 0,
            row_buffer: Vec::new(),
            current: None,
        })
    }

    #[deprecated(note = "diagnostics moved to `tracing`; install a subscriber instead")]
    pub fn open_debug<P: AsRef<Path>>(path: P, chunk_size: usize, _debug: i32) -> Result<Self> {
        Self::open(path, chunk_size)
    }

    pub fn metadata(&self) -> StreamMetadata {
        self.metadata.clone()
    }

    /// The chunk decoded by the last successful `next_chunk`, if any. It
    /// is replaced by the next `next_chunk` call and dropped by `close`.
    pub fn current(&self) -> Option<&DataChunk> {
        self.current.as_ref()
    }

    /// Decode the next chunk of up to `chunk_size` whole points; only the
    /// final chunk may be shorter. `EndOfData` is reported exactly once;
    /// after that (and after `close`) this fails with `InvalidState`. A
    /// `TruncatedData` failure makes the cursor unusable except for
    /// `close`; chunks already delivered remain valid.
    pub fn next_chunk(&mut self) -> Result<StreamStatus> {
        match self.state {
            CursorState::Opened | CursorState::ChunkReady => {}
            CursorState::Exhausted => {
                return Err(WaveformError::InvalidState("stream is exhausted"))
            }
            CursorState::Closed => return Err(WaveformError::InvalidState("stream is closed")),
            CursorState::Failed => {
                return Err(WaveformError::InvalidState(
                    "stream failed and must be closed",
                ))
            }
        }

        let mmap = self
            .mmap
            .as_ref()
            .ok_or(WaveformError::InvalidState("stream is closed"))?;
        let data: &[u8] = &mmap[..];

        if let Err(e) = Self::fill_rows(
            data,
            &mut self.data_pos,
            &mut self.source,
            &mut self.row_buffer,
            self.layout.columns,
            self.chunk_size,
        ) {
            self.state = CursorState::Failed;
            self.current = None;
            return Err(e);
        }

        if self.row_buffer.is_empty() {
            self.state = CursorState::Exhausted;
            self.current = None;
            return Ok(StreamStatus::EndOfData);
        }

        let take = self.chunk_size.min(self.row_buffer.len());
        let rows: Vec<Vec<f64>> = self.row_buffer.drain(..take).collect();
        let chunk = self.build_chunk(&rows);
        trace!(
            chunk = chunk.chunk_index,
            points = chunk.point_count(),
            scale_start = chunk.scale_range.0,
            scale_end = chunk.scale_range.1,
            "chunk built"
        );
        self.current = Some(chunk);
        self.chunk_index += 1;
        self.points_delivered += take;
        self.state = CursorState::ChunkReady;
        Ok(StreamStatus::Ready)
    }

    /// Release the underlying byte source. Idempotent; valid from any
    /// state.
    pub fn close(&mut self) {
        self.current = None;
        self.row_buffer.clear();
        self.mmap = None;
        self.state = CursorState::Closed;
    }

    /// Pull decoded rows from the source until `want` rows are buffered
    /// or the source is exhausted.
    fn fill_rows(
        data: &[u8],
        data_pos: &mut usize,
        source: &mut Source,
        row_buffer: &mut Vec<Vec<f64>>,
        columns: usize,
        want: usize,
    ) -> Result<()> {
        match source {
            Source::Hspice {
                header,
                pending,
                first_read,
                table_done,
            } => {
                while row_buffer.len() < want && !*table_done {
                    if *data_pos >= data.len() {
                        return Err(WaveformError::TruncatedData(
                            "end of file before end-of-table marker".into(),
                        ));
                    }
                    let mut decoder =
                        BlockDecoder::new(&data[*data_pos..], header.post_version);
                    let block = decoder.next_block()?.ok_or_else(|| {
                        WaveformError::TruncatedData(
                            "end of file before end-of-table marker".into(),
                        )
                    })?;
                    *data_pos += decoder.bytes_consumed();
                    pending.extend(block.values);

                    if *first_read && header.sweep_name.is_some() && !pending.is_empty() {
                        pending.remove(0);
                        *first_read = false;
                    }

                    let complete = pending.len() / columns * columns;
                    for row in pending[..complete].chunks(columns) {
                        row_buffer.push(row.to_vec());
                    }
                    pending.drain(..complete);

                    if block.end_of_table {
                        *table_done = true;
                        if !pending.is_empty() {
                            return Err(WaveformError::TruncatedData(
                                "partial point at end of table".into(),
                            ));
                        }
                    }
                }
                Ok(())
            }
            Source::RawBinary {
                header,
                total_points,
                trailing_partial,
                points_read,
            } => {
                while row_buffer.len() < want && *points_read < *total_points {
                    let (row, next) = raw::read_binary_row(data, *data_pos, header)?;
                    row_buffer.push(row);
                    *data_pos = next;
                    *points_read += 1;
                }
                if *points_read >= *total_points && *trailing_partial {
                    return Err(WaveformError::TruncatedData(
                        "binary data section ends mid-point".into(),
                    ));
                }
                Ok(())
            }
            Source::RawAscii {
                header,
                points_read,
                done,
            } => {
                while row_buffer.len() < want && !*done {
                    if header.num_points > 0 && *points_read >= header.num_points {
                        *done = true;
                        break;
                    }
                    let mut scanner = AsciiPointScanner::new(data, *data_pos);
                    match scanner.next_row(header)? {
                        Some(row) => {
                            *data_pos = scanner.position();
                            row_buffer.push(row);
                            *points_read += 1;
                        }
                        None => {
                            if header.num_points > 0 && *points_read < header.num_points {
                                return Err(WaveformError::TruncatedData(format!(
                                    "{} points decoded, prologue declares {}",
                                    points_read, header.num_points
                                )));
                            }
                            *done = true;
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn build_chunk(&self, rows: &[Vec<f64>]) -> DataChunk {
        let scale: Vec<f64> = rows.iter().map(|r| r[0]).collect();
        let scale_range = (
            scale.first().copied().unwrap_or(0.0),
            scale.last().copied().unwrap_or(0.0),
        );

        let mut data = HashMap::with_capacity(1 + self.layout.signal_names.len());
        let mut col = 1;
        for (i, name) in self.layout.signal_names.iter().enumerate() {
            if self.layout.signal_complex[i] {
                let values: Vec<Complex64> = rows
                    .iter()
                    .map(|r| Complex64::new(r[col], r[col + 1]))
                    .collect();
                data.insert(name.clone(), VectorData::Complex(values));
                col += 2;
            } else {
                let values: Vec<f64> = rows.iter().map(|r| r[col]).collect();
                data.insert(name.clone(), VectorData::Real(values));
                col += 1;
            }
        }
        data.insert(self.layout.scale_name.clone(), VectorData::Real(scale));

        DataChunk {
            chunk_index: self.chunk_index,
            point_range: (self.points_delivered, self.points_delivered + rows.len()),
            scale_range,
            data,
        }
    }
}

/// Iterator adapter yielding owned chunks and ending cleanly at EOF.
impl Iterator for WaveformStream {
    type Item = Result<DataChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            CursorState::Exhausted | CursorState::Closed | CursorState::Failed => None,
            CursorState::Opened | CursorState::ChunkReady => match self.next_chunk() {
                Ok(StreamStatus::Ready) => self.current.take().map(Ok),
                Ok(StreamStatus::EndOfData) => None,
                Err(e) => Some(Err(e)),
            },
        }
    }
}

/// Open a file for streaming with the default chunk size.
pub fn read_stream<P: AsRef<Path>>(path: P) -> Result<WaveformStream> {
    WaveformStream::open(path, DEFAULT_CHUNK_SIZE)
}

/// Open a file for streaming with a custom chunk size.
pub fn read_stream_chunked<P: AsRef<Path>>(path: P, chunk_size: usize) -> Result<WaveformStream> {
    WaveformStream::open(path, chunk_size)
}
