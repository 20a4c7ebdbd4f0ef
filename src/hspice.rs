//! HSPICE binary header decoding and whole-file decode.
//!
//! The header is a run of framed blocks holding a fixed-width character
//! record: counts and post-version strings at fixed positions, title and
//! date as padded strings, and a whitespace-separated variable directory
//! terminated by the `$&%#` marker. Data tables follow, one per sweep
//! point.

use crate::block::{BlockDecoder, PostVersion};
use crate::cursor::ByteCursor;
use crate::sniff::find_subsequence;
use crate::sweep::SweepAssembler;
use crate::types::{
    AnalysisType, DataTable, Result, VarType, Variable, VectorData, WaveformError, WaveformResult,
};
use num_complex::Complex64;
use tracing::{debug, info};

// Character positions of the fixed-width header fields.
const POS_NUM_VARS: usize = 0;
const POS_NUM_PROBES: usize = 4;
const POS_NUM_SWEEPS: usize = 8;
const POS_NUM_SWEEPS_END: usize = 12;
const POS_POST1: usize = 16;
const POS_POST2: usize = 20;
const POS_TITLE: usize = 24;
const POS_DATE: usize = 88;
const POS_DATE_END: usize = 112;
const POS_SWEEP_SIZE_9601: usize = 176;
const POS_SWEEP_SIZE_2001: usize = 187;
const POS_VAR_DIRECTORY: usize = 256;

const POST_9007: &str = "9007";
const POST_9601: &str = "9601";
const POST_2001: &str = "2001";

/// Directory type code marking a frequency sweep, i.e. complex data.
const FREQUENCY_TYPE_CODE: i32 = 2;

/// Terminates the header record inside the framed header blocks.
const HEADER_END: &[u8] = b"$&%#";

/// Decoded HSPICE header.
#[derive(Debug, Clone)]
pub struct HspiceHeader {
    pub title: String,
    pub date: String,
    pub post_version: PostVersion,
    /// HSPICE "variable" count: the scale plus the complex-valued signals.
    pub num_complex_vars: usize,
    /// Total vector count: scale plus all signals.
    pub num_vectors: usize,
    pub is_complex: bool,
    /// Scale plus signals, with normalized names and inferred kinds.
    pub variables: Vec<Variable>,
    pub sweep_name: Option<String>,
    /// Declared table count; 1 when no sweep is present.
    pub table_count: usize,
}

impl HspiceHeader {
    /// Flattened values per data point: complex signals occupy two slots.
    pub fn columns_per_point(&self) -> usize {
        if self.is_complex {
            self.num_vectors + self.num_complex_vars.saturating_sub(1)
        } else {
            self.num_vectors
        }
    }

    /// Whether the signal at `index` (0 = first signal after the scale)
    /// carries interleaved real/imaginary pairs.
    #[inline]
    pub fn signal_is_complex(&self, index: usize) -> bool {
        self.is_complex && index < self.num_complex_vars.saturating_sub(1)
    }
}

// ============================================================================
// Field extraction
// ============================================================================

fn extract_string(buf: &[u8], start: usize, end: usize) -> String {
    if start >= buf.len() || start >= end {
        return String::new();
    }
    let slice = &buf[start..end.min(buf.len())];
    let nul = slice.iter().position(|&c| c == 0).unwrap_or(slice.len());
    String::from_utf8_lossy(&slice[..nul]).trim().to_string()
}

fn extract_count(buf: &[u8], start: usize, end: usize, what: &str) -> Result<usize> {
    let text = extract_string(buf, start, end);
    let value: i64 = text
        .parse()
        .map_err(|_| WaveformError::MalformedHeader(format!("unreadable {what}: {text:?}")))?;
    if value < 0 {
        return Err(WaveformError::MalformedHeader(format!(
            "negative {what}: {value}"
        )));
    }
    Ok(value as usize)
}

/// Strip `v(...)` wrapping and lowercase, matching the naming HSPICE
/// viewers use.
fn normalize_name(raw: &str) -> String {
    let mut name = raw.to_lowercase();
    if name.starts_with("v(") {
        name = name[2..].trim_end_matches(')').to_string();
    }
    name
}

// ============================================================================
// Header decoding
// ============================================================================

/// Read framed header blocks until the end marker, returning the header
/// record bytes.
fn read_header_record(cursor: &mut ByteCursor) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(4096);
    loop {
        let (num_items, payload_len) = cursor.read_block_prologue(1)?;
        let bytes = cursor.read_bytes(num_items)?;
        cursor.read_block_epilogue(payload_len)?;
        buffer.extend_from_slice(bytes);

        if let Some(pos) = find_subsequence(&buffer, HEADER_END) {
            buffer.truncate(pos);
            return Ok(buffer);
        }
    }
}

fn parse_header_record(buf: &[u8]) -> Result<HspiceHeader> {
    let post1 = extract_string(buf, POS_POST1, POS_POST1 + 4);
    let post2 = extract_string(buf, POS_POST2, POS_POST2 + 4);
    if post1 != POST_9007 && post1 != POST_9601 && post2 != POST_2001 {
        return Err(WaveformError::MalformedHeader(format!(
            "unknown post format: {post1:?}/{post2:?}"
        )));
    }
    let post_version = if post2 == POST_2001 {
        PostVersion::V2001
    } else {
        PostVersion::V9601
    };

    let num_complex_vars = extract_count(buf, POS_NUM_VARS, POS_NUM_PROBES, "variable count")?;
    let num_probes = extract_count(buf, POS_NUM_PROBES, POS_NUM_SWEEPS, "probe count")?;
    let num_sweeps = extract_count(buf, POS_NUM_SWEEPS, POS_NUM_SWEEPS_END, "sweep count")?;
    if num_sweeps > 1 {
        return Err(WaveformError::MalformedHeader(
            "only one-dimensional sweeps are supported".into(),
        ));
    }

    let num_vectors = num_complex_vars + num_probes;
    if num_vectors == 0 {
        return Err(WaveformError::MalformedHeader(
            "header declares no vectors".into(),
        ));
    }

    let date = extract_string(buf, POS_DATE, POS_DATE_END);
    let title_end = {
        let mut end = POS_DATE.min(buf.len());
        while end > POS_TITLE && buf.get(end - 1) == Some(&b' ') {
            end -= 1;
        }
        end
    };
    let title = extract_string(buf, POS_TITLE, title_end);

    if buf.len() <= POS_VAR_DIRECTORY {
        return Err(WaveformError::MalformedHeader(
            "header record ends before variable directory".into(),
        ));
    }
    let directory = String::from_utf8_lossy(&buf[POS_VAR_DIRECTORY..]);
    let tokens: Vec<&str> = directory.split_whitespace().collect();
    if tokens.len() < 2 * num_vectors {
        return Err(WaveformError::MalformedHeader(
            "variable directory shorter than declared vector count".into(),
        ));
    }

    let type_code: i32 = tokens[0].parse().unwrap_or(0);
    let is_complex = type_code == FREQUENCY_TYPE_CODE;

    // tokens[num_vectors] is the scale name; the signal names follow it.
    let mut variables = Vec::with_capacity(num_vectors);
    let scale_raw = tokens[num_vectors];
    variables.push(Variable::new(
        scale_raw.to_string(),
        VarType::from_name(scale_raw),
    ));
    for raw in &tokens[num_vectors + 1..2 * num_vectors] {
        let var_type = VarType::from_name(raw);
        variables.push(Variable::new(normalize_name(raw), var_type));
    }

    let (sweep_name, table_count) = if num_sweeps == 1 {
        let name = tokens
            .get(2 * num_vectors)
            .map(|s| s.to_string())
            .ok_or_else(|| {
                WaveformError::MalformedHeader("sweep declared but parameter name missing".into())
            })?;
        let pos = match post_version {
            PostVersion::V9601 => POS_SWEEP_SIZE_9601,
            PostVersion::V2001 => POS_SWEEP_SIZE_2001,
        };
        let size = extract_count(buf, pos, pos + 10, "sweep point count")?;
        (Some(name), size.max(1))
    } else {
        (None, 1)
    };

    Ok(HspiceHeader {
        title,
        date,
        post_version,
        num_complex_vars,
        num_vectors,
        is_complex,
        variables,
        sweep_name,
        table_count,
    })
}

/// Decode the header, leaving the cursor at the first data block.
pub fn decode_header(cursor: &mut ByteCursor) -> Result<HspiceHeader> {
    let record = read_header_record(cursor)?;
    let header = parse_header_record(&record)?;
    debug!(
        vectors = header.num_vectors,
        complex = header.is_complex,
        tables = header.table_count,
        "HSPICE header decoded"
    );
    Ok(header)
}

// ============================================================================
// Data decoding
// ============================================================================

/// Split one table's raw values into the leading sweep value (when a sweep
/// is declared) and per-variable vectors.
pub(crate) fn table_from_values(
    values: &[f64],
    header: &HspiceHeader,
) -> Result<(Option<f64>, DataTable)> {
    let (sweep_value, data) = if header.sweep_name.is_some() {
        match values.split_first() {
            Some((&first, rest)) => (Some(first), rest),
            None => {
                return Err(WaveformError::TruncatedData(
                    "table is missing its sweep value".into(),
                ))
            }
        }
    } else {
        (None, values)
    };

    let columns = header.columns_per_point();
    if data.len() % columns != 0 {
        return Err(WaveformError::TruncatedData(format!(
            "{} values do not form whole points of {} columns",
            data.len(),
            columns
        )));
    }
    let rows = data.len() / columns;

    let mut scale = Vec::with_capacity(rows);
    let mut signals: Vec<VectorData> = (0..header.num_vectors - 1)
        .map(|i| {
            if header.signal_is_complex(i) {
                VectorData::Complex(Vec::with_capacity(rows))
            } else {
                VectorData::Real(Vec::with_capacity(rows))
            }
        })
        .collect();

    let mut pos = 0;
    for _ in 0..rows {
        scale.push(data[pos]);
        pos += 1;
        for signal in signals.iter_mut() {
            match signal {
                VectorData::Complex(vec) => {
                    vec.push(Complex64::new(data[pos], data[pos + 1]));
                    pos += 2;
                }
                VectorData::Real(vec) => {
                    vec.push(data[pos]);
                    pos += 1;
                }
            }
        }
    }

    let mut vectors = Vec::with_capacity(header.num_vectors);
    vectors.push(VectorData::Real(scale));
    vectors.extend(signals);
    Ok((sweep_value, DataTable { vectors }))
}

/// Pick the analysis type from the complex flag, the scale name, and as a
/// last resort the file extension.
pub(crate) fn infer_analysis(header: &HspiceHeader, extension_hint: Option<&str>) -> AnalysisType {
    if header.is_complex {
        return AnalysisType::AC;
    }
    let scale_name = header
        .variables
        .first()
        .map(|v| v.name.as_str())
        .unwrap_or("");
    let from_scale = AnalysisType::from_scale_name(scale_name);
    if from_scale != AnalysisType::Unknown {
        return from_scale;
    }
    extension_hint
        .map(AnalysisType::from_extension)
        .unwrap_or(AnalysisType::Unknown)
}

/// Decode a whole HSPICE binary file. All-or-nothing: a failure in any
/// table discards everything decoded so far.
pub fn decode(data: &[u8], extension_hint: Option<&str>) -> Result<WaveformResult> {
    let mut cursor = ByteCursor::new(data);
    let header = decode_header(&mut cursor)?;

    let analysis = infer_analysis(&header, extension_hint);
    let mut blocks = BlockDecoder::from_cursor(cursor, header.post_version);
    let mut assembler = SweepAssembler::new(header.sweep_name.clone());
    let mut tables = Vec::with_capacity(header.table_count);

    for _ in 0..header.table_count {
        let values = blocks.read_table()?;
        let (sweep_value, table) = table_from_values(&values, &header)?;
        if let Some(value) = sweep_value {
            assembler.push(value);
        }
        tables.push(table);
    }
    let sweep = assembler.finish(tables.len())?;

    info!(
        title = %header.title,
        ?analysis,
        tables = tables.len(),
        points = tables.first().map(|t| t.point_count()).unwrap_or(0),
        "HSPICE file decoded"
    );

    Ok(WaveformResult {
        title: header.title,
        date: header.date,
        analysis,
        variables: header.variables,
        tables,
        sweep,
    })
}
