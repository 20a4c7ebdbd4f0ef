//! SPICE3/ngspice raw file decoding, ASCII and binary variants.
//!
//! A raw file is a textual key:value prologue (`Title:`, `Date:`,
//! `Plotname:`, `Flags:`, counts, a `Variables:` directory) followed by a
//! data section introduced by a `Values:` (ASCII) or `Binary:` marker
//! line. ngspice appends further plot sections to the same file; each one
//! becomes another table.

use crate::types::{
    AnalysisType, DataTable, Result, VarType, Variable, VectorData, WaveformError, WaveformResult,
};
use byteorder::{ByteOrder, LittleEndian};
use num_complex::Complex64;
use tracing::{debug, info};

// ============================================================================
// Line scanning
// ============================================================================

/// Byte-offset-tracking line reader over the mapped file, so data decoding
/// can resume mid-file.
pub(crate) struct LineScanner<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> LineScanner<'a> {
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Next line including its terminator; `None` at end of input. Lines
    /// that are not valid UTF-8 read as empty.
    pub fn next_line(&mut self) -> Option<&'a str> {
        if self.pos >= self.data.len() {
            return None;
        }
        let rest = &self.data[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| i + 1)
            .unwrap_or(rest.len());
        self.pos += end;
        Some(std::str::from_utf8(&rest[..end]).unwrap_or(""))
    }
}

// ============================================================================
// Prologue
// ============================================================================

/// Parsed plot prologue.
#[derive(Debug, Clone)]
pub struct RawPlotHeader {
    pub title: String,
    pub date: String,
    pub plotname: String,
    pub flags: Vec<String>,
    pub num_variables: usize,
    /// Declared point count; zero means decode until EOF or the next
    /// section.
    pub num_points: usize,
    pub variables: Vec<Variable>,
    pub is_complex: bool,
    pub binary: bool,
    /// Byte offset of the first data byte.
    pub data_start: usize,
}

impl RawPlotHeader {
    /// Bytes per point in the binary data section.
    pub fn point_stride(&self) -> usize {
        self.num_variables * if self.is_complex { 16 } else { 8 }
    }

    /// Flattened values per point: the scale stays real, complex signals
    /// occupy two slots.
    pub fn columns_per_point(&self) -> usize {
        if self.is_complex {
            1 + 2 * self.num_variables.saturating_sub(1)
        } else {
            self.num_variables
        }
    }
}

fn parse_count(value: &str, what: &str) -> Result<usize> {
    let parsed: i64 = value
        .trim()
        .parse()
        .map_err(|_| WaveformError::MalformedHeader(format!("unreadable {what}: {value:?}")))?;
    if parsed < 0 {
        return Err(WaveformError::MalformedHeader(format!(
            "negative {what}: {parsed}"
        )));
    }
    Ok(parsed as usize)
}

/// Parse one plot prologue starting at `start`, up to and including its
/// data section marker.
pub fn parse_plot_header(data: &[u8], start: usize) -> Result<RawPlotHeader> {
    let mut scanner = LineScanner::new(data, start);
    let mut header = RawPlotHeader {
        title: String::new(),
        date: String::new(),
        plotname: String::new(),
        flags: Vec::new(),
        num_variables: 0,
        num_points: 0,
        variables: Vec::new(),
        is_complex: false,
        binary: false,
        data_start: 0,
    };
    let mut in_variables = false;

    loop {
        let line = scanner.next_line().ok_or_else(|| {
            WaveformError::MalformedHeader("no data section marker in raw prologue".into())
        })?;
        let trimmed = line.trim();

        if trimmed == "Binary:" || trimmed == "Values:" {
            header.binary = trimmed == "Binary:";
            header.data_start = scanner.position();
            break;
        }

        if let Some(value) = trimmed.strip_prefix("Title:") {
            header.title = value.trim().to_string();
            in_variables = false;
        } else if let Some(value) = trimmed.strip_prefix("Date:") {
            header.date = value.trim().to_string();
            in_variables = false;
        } else if let Some(value) = trimmed.strip_prefix("Plotname:") {
            header.plotname = value.trim().to_string();
            in_variables = false;
        } else if let Some(value) = trimmed.strip_prefix("Flags:") {
            header.flags = value.split_whitespace().map(|s| s.to_string()).collect();
            header.is_complex = header.flags.iter().any(|f| f == "complex");
            in_variables = false;
        } else if let Some(value) = trimmed.strip_prefix("No. Variables:") {
            header.num_variables = parse_count(value, "variable count")?;
            in_variables = false;
        } else if let Some(value) = trimmed.strip_prefix("No. Points:") {
            header.num_points = parse_count(value, "point count")?;
            in_variables = false;
        } else if trimmed.starts_with("Variables:") {
            in_variables = true;
        } else if in_variables && !trimmed.is_empty() {
            // Directory line: "index name type"
            let parts: Vec<&str> = trimmed.split_whitespace().collect();
            if parts.len() >= 3 {
                header
                    .variables
                    .push(Variable::new(parts[1], VarType::from_unit(parts[2])));
            }
        }
    }

    if header.num_variables == 0 {
        return Err(WaveformError::MalformedHeader(
            "prologue declares no variables".into(),
        ));
    }
    if header.variables.len() != header.num_variables {
        return Err(WaveformError::MalformedHeader(format!(
            "variable directory lists {} entries, prologue declares {}",
            header.variables.len(),
            header.num_variables
        )));
    }

    debug!(
        plotname = %header.plotname,
        variables = header.num_variables,
        points = header.num_points,
        binary = header.binary,
        "raw plot prologue parsed"
    );
    Ok(header)
}

// ============================================================================
// Data decoding
// ============================================================================

/// Decode one binary data point at `pos` into a flattened row. The scale
/// (variable 0) keeps only its real part.
pub(crate) fn read_binary_row(
    data: &[u8],
    pos: usize,
    header: &RawPlotHeader,
) -> Result<(Vec<f64>, usize)> {
    let stride = header.point_stride();
    if pos + stride > data.len() {
        return Err(WaveformError::TruncatedData(
            "binary data section ends mid-point".into(),
        ));
    }

    let mut row = Vec::with_capacity(header.columns_per_point());
    let mut p = pos;
    for var in 0..header.num_variables {
        if header.is_complex {
            let re = LittleEndian::read_f64(&data[p..p + 8]);
            let im = LittleEndian::read_f64(&data[p + 8..p + 16]);
            row.push(re);
            if var > 0 {
                row.push(im);
            }
            p += 16;
        } else {
            row.push(LittleEndian::read_f64(&data[p..p + 8]));
            p += 8;
        }
    }
    Ok((row, p))
}

/// Parse one ASCII value token: `1.5`, `1.5,2.5`, or `(1.5,2.5)`.
fn parse_ascii_value(token: &str) -> Result<(f64, f64)> {
    let token = token.trim_matches(|c| c == '(' || c == ')');
    let parse = |s: &str| {
        s.trim().parse::<f64>().map_err(|_| {
            WaveformError::TruncatedData(format!("unparsable data value: {token:?}"))
        })
    };
    match token.split_once(',') {
        Some((re, im)) => Ok((parse(re)?, parse(im)?)),
        None => Ok((parse(token)?, 0.0)),
    }
}

/// Scans whole points out of an ASCII data section, one per call.
pub(crate) struct AsciiPointScanner<'a> {
    scanner: LineScanner<'a>,
}

impl<'a> AsciiPointScanner<'a> {
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Self {
            scanner: LineScanner::new(data, pos),
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.scanner.position()
    }

    /// Decode the next point into a flattened row (scale real, complex
    /// signals as re/im pairs). `Ok(None)` at end of input or at the next
    /// plot section, which is left unconsumed. A point cut short mid-way
    /// is `TruncatedData`.
    pub fn next_row(&mut self, header: &RawPlotHeader) -> Result<Option<Vec<f64>>> {
        let mut row: Vec<f64> = Vec::with_capacity(header.columns_per_point());
        let mut vars_read = 0usize;
        let mut started = false;

        loop {
            let before = self.scanner.position();
            let line = match self.scanner.next_line() {
                Some(line) => line,
                None => {
                    if started {
                        return Err(WaveformError::TruncatedData(
                            "ascii data section ends mid-point".into(),
                        ));
                    }
                    return Ok(None);
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with("Title:") {
                if started {
                    return Err(WaveformError::TruncatedData(
                        "plot section starts mid-point".into(),
                    ));
                }
                self.scanner.set_position(before);
                return Ok(None);
            }

            let mut tokens = trimmed.split_whitespace().peekable();
            if !started {
                // Every point opens with its index.
                if tokens
                    .peek()
                    .map(|t| t.parse::<usize>().is_ok())
                    .unwrap_or(false)
                {
                    tokens.next();
                }
                started = true;
            }

            for token in tokens {
                let (re, im) = parse_ascii_value(token)?;
                if vars_read == 0 || !header.is_complex {
                    row.push(re);
                } else {
                    row.push(re);
                    row.push(im);
                }
                vars_read += 1;
                if vars_read == header.num_variables {
                    return Ok(Some(row));
                }
            }
        }
    }
}

/// Decode one plot's data section into a table, returning the byte offset
/// where the next plot section (if any) begins.
fn decode_plot_data(data: &[u8], header: &RawPlotHeader) -> Result<(DataTable, usize)> {
    let mut rows = Vec::with_capacity(header.num_points);

    let end_pos = if header.binary {
        let available = data.len() - header.data_start;
        let stride = header.point_stride();
        let total = if header.num_points > 0 {
            header.num_points
        } else {
            if available % stride != 0 {
                return Err(WaveformError::TruncatedData(
                    "binary data section ends mid-point".into(),
                ));
            }
            available / stride
        };
        let mut pos = header.data_start;
        for _ in 0..total {
            let (row, next) = read_binary_row(data, pos, header)?;
            rows.push(row);
            pos = next;
        }
        pos
    } else {
        let mut scanner = AsciiPointScanner::new(data, header.data_start);
        while header.num_points == 0 || rows.len() < header.num_points {
            match scanner.next_row(header)? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        if header.num_points > 0 && rows.len() < header.num_points {
            return Err(WaveformError::TruncatedData(format!(
                "{} points decoded, prologue declares {}",
                rows.len(),
                header.num_points
            )));
        }
        scanner.position()
    };

    Ok((rows_to_table(&rows, header), end_pos))
}

/// Re-shape flattened rows into per-variable vectors.
pub(crate) fn rows_to_table(rows: &[Vec<f64>], header: &RawPlotHeader) -> DataTable {
    let mut scale = Vec::with_capacity(rows.len());
    let mut signals: Vec<VectorData> = (1..header.num_variables)
        .map(|_| {
            if header.is_complex {
                VectorData::Complex(Vec::with_capacity(rows.len()))
            } else {
                VectorData::Real(Vec::with_capacity(rows.len()))
            }
        })
        .collect();

    for row in rows {
        scale.push(row[0]);
        let mut pos = 1;
        for signal in signals.iter_mut() {
            match signal {
                VectorData::Complex(vec) => {
                    vec.push(Complex64::new(row[pos], row[pos + 1]));
                    pos += 2;
                }
                VectorData::Real(vec) => {
                    vec.push(row[pos]);
                    pos += 1;
                }
            }
        }
    }

    let mut vectors = Vec::with_capacity(header.num_variables);
    vectors.push(VectorData::Real(scale));
    vectors.extend(signals);
    DataTable { vectors }
}

/// Decode a whole raw file. Successive plot sections become successive
/// tables; the first plot supplies the metadata and variable list.
pub fn decode(data: &[u8]) -> Result<WaveformResult> {
    let mut pos = 0usize;
    let mut first_header: Option<RawPlotHeader> = None;
    let mut tables = Vec::new();

    while pos < data.len() {
        if data[pos..].iter().all(|b| b.is_ascii_whitespace()) {
            break;
        }
        let header = parse_plot_header(data, pos)?;
        if let Some(first) = &first_header {
            if header.num_variables != first.num_variables {
                return Err(WaveformError::MalformedHeader(
                    "plot sections declare differing variable counts".into(),
                ));
            }
        }
        let (table, end_pos) = decode_plot_data(data, &header)?;
        tables.push(table);
        pos = end_pos;
        if first_header.is_none() {
            first_header = Some(header);
        }
    }

    let header = first_header
        .ok_or_else(|| WaveformError::MalformedHeader("raw file holds no plot section".into()))?;
    let analysis = AnalysisType::from_plotname(&header.plotname);

    info!(
        title = %header.title,
        ?analysis,
        tables = tables.len(),
        points = tables.first().map(|t| t.point_count()).unwrap_or(0),
        "raw file decoded"
    );

    Ok(WaveformResult {
        title: header.title,
        date: header.date,
        analysis,
        variables: header.variables,
        tables,
        sweep: None,
    })
}
