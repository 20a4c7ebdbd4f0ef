//! Decoded waveform model, shared enums, and the error taxonomy.

use num_complex::Complex64;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Error type for all decoding operations.
#[derive(Debug, Error)]
pub enum WaveformError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Format sniffing matched none of the supported formats. Fatal to the
    /// whole decode or open.
    #[error("unrecognized waveform file format")]
    UnrecognizedFormat,

    /// Header fields out of range or section markers missing. Fatal.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Fewer bytes/tokens than a block or chunk requires. Fatal to the
    /// current table or chunk; a whole-file decode aborts entirely.
    #[error("truncated data: {0}")]
    TruncatedData(String),

    /// Running count of sweep values diverged from the table count. Fatal.
    #[error("sweep mismatch: {values} sweep values for {tables} tables")]
    SweepTableMismatch { values: usize, tables: usize },

    /// Operation called on a closed, exhausted, or failed cursor. The
    /// resource stays in its prior state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

pub type Result<T> = std::result::Result<T, WaveformError>;

// ============================================================================
// Enums
// ============================================================================

/// Byte order detected from the file's block framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Physical kind of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Time,
    Frequency,
    Voltage,
    Current,
    Unknown,
}

impl VarType {
    /// Classify from the type column of a SPICE raw variable directory.
    pub fn from_unit(unit: &str) -> Self {
        match unit.to_ascii_lowercase().as_str() {
            "time" => VarType::Time,
            "frequency" => VarType::Frequency,
            "voltage" => VarType::Voltage,
            "current" => VarType::Current,
            _ => VarType::Unknown,
        }
    }

    /// Classify from HSPICE naming conventions. Unknown kinds are tolerated,
    /// never an error.
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower == "time" {
            VarType::Time
        } else if lower == "hertz" || lower == "frequency" {
            VarType::Frequency
        } else if lower.starts_with("i(") || lower.starts_with("i1(") || lower.starts_with("i2(") {
            VarType::Current
        } else if lower.starts_with("v(") || lower == "volts" {
            VarType::Voltage
        } else {
            VarType::Unknown
        }
    }
}

/// Analysis type derived from header metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisType {
    Transient,
    AC,
    DC,
    OperatingPoint,
    Noise,
    Unknown,
}

impl AnalysisType {
    /// Infer from the scale variable name: TIME means transient, HERTZ
    /// means AC, a voltage scale means DC sweep.
    pub fn from_scale_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "time" => AnalysisType::Transient,
            "hertz" | "frequency" => AnalysisType::AC,
            "volts" | "voltage" => AnalysisType::DC,
            _ => AnalysisType::Unknown,
        }
    }

    /// Infer from an HSPICE output extension (tr0, ac0, sw0).
    pub fn from_extension(ext: &str) -> Self {
        let lower = ext.to_ascii_lowercase();
        if lower.starts_with("tr") {
            AnalysisType::Transient
        } else if lower.starts_with("ac") {
            AnalysisType::AC
        } else if lower.starts_with("sw") {
            AnalysisType::DC
        } else {
            AnalysisType::Unknown
        }
    }

    /// Infer from a SPICE raw `Plotname:` line. Match order matters: "DC
    /// transfer characteristic" contains both "tran" and "ac" as substrings.
    pub fn from_plotname(plotname: &str) -> Self {
        let lower = plotname.to_ascii_lowercase();
        if lower.contains("transient") {
            AnalysisType::Transient
        } else if lower.contains("noise") {
            AnalysisType::Noise
        } else if lower.contains("operating") {
            AnalysisType::OperatingPoint
        } else if lower.contains("dc") {
            AnalysisType::DC
        } else if lower.contains("ac") {
            AnalysisType::AC
        } else if lower.contains("tran") {
            AnalysisType::Transient
        } else {
            AnalysisType::Unknown
        }
    }
}

// ============================================================================
// Data structures
// ============================================================================

/// One named signal or scale, created during header decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub var_type: VarType,
}

impl Variable {
    pub fn new(name: impl Into<String>, var_type: VarType) -> Self {
        Self {
            name: name.into(),
            var_type,
        }
    }

    /// Build a variable whose kind is inferred from its name.
    pub fn from_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let var_type = VarType::from_name(&name);
        Self { name, var_type }
    }
}

/// Sample array for one variable, either real or complex.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorData {
    Real(Vec<f64>),
    Complex(Vec<Complex64>),
}

impl VectorData {
    pub fn len(&self) -> usize {
        match self {
            VectorData::Real(v) => v.len(),
            VectorData::Complex(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, VectorData::Complex(_))
    }
}

/// One decoded data block: per-variable sample arrays, index-aligned with
/// the result's variable list. The scale is index 0 and always real.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    pub vectors: Vec<VectorData>,
}

impl DataTable {
    /// Point count of this table (length of the scale vector).
    pub fn point_count(&self) -> usize {
        self.vectors.first().map(|v| v.len()).unwrap_or(0)
    }
}

/// Swept parameter: name plus one value per table, in table order.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepInfo {
    pub name: String,
    pub values: Vec<f64>,
}

/// Immutable decoded document: metadata, variables, and data tables.
///
/// Built once by the whole-file decode path and never mutated afterwards,
/// so shared read access from multiple threads needs no locking.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformResult {
    pub title: String,
    pub date: String,
    pub analysis: AnalysisType,
    pub variables: Vec<Variable>,
    pub tables: Vec<DataTable>,
    pub sweep: Option<SweepInfo>,
}

impl WaveformResult {
    /// Name of the scale (independent) variable, by convention index 0.
    pub fn scale_name(&self) -> &str {
        self.variables.first().map(|v| v.name.as_str()).unwrap_or("")
    }

    /// Point count of the first table.
    pub fn len(&self) -> usize {
        self.tables.first().map(|t| t.point_count()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn var_count(&self) -> usize {
        self.variables.len()
    }

    pub fn var_name(&self, index: usize) -> Option<&str> {
        self.variables.get(index).map(|v| v.name.as_str())
    }

    pub fn var_type(&self, index: usize) -> Option<VarType> {
        self.variables.get(index).map(|v| v.var_type)
    }

    /// Case-insensitive lookup of a variable index by name.
    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables
            .iter()
            .position(|v| v.name.eq_ignore_ascii_case(name))
    }

    /// Look up a signal's data in the first table by name.
    pub fn get(&self, name: &str) -> Option<&VectorData> {
        self.vector(0, self.variable_index(name)?)
    }

    /// Data vector at (table, variable), or `None` when out of range.
    pub fn vector(&self, table_index: usize, var_index: usize) -> Option<&VectorData> {
        self.tables.get(table_index)?.vectors.get(var_index)
    }

    /// Length of a data vector; zero when out of range.
    pub fn data_len(&self, table_index: usize, var_index: usize) -> usize {
        self.vector(table_index, var_index)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    pub fn is_complex(&self, table_index: usize, var_index: usize) -> Option<bool> {
        self.vector(table_index, var_index).map(|v| v.is_complex())
    }

    pub fn has_sweep(&self) -> bool {
        self.sweep.is_some()
    }

    pub fn sweep_name(&self) -> Option<&str> {
        self.sweep.as_ref().map(|s| s.name.as_str())
    }

    pub fn sweep_value(&self, table_index: usize) -> Option<f64> {
        self.sweep.as_ref()?.values.get(table_index).copied()
    }

    /// Copy sweep values into `out`, truncating to its length. Returns the
    /// count actually copied; zero when there is no sweep.
    pub fn copy_sweep_values(&self, out: &mut [f64]) -> usize {
        match &self.sweep {
            Some(sweep) => {
                let count = sweep.values.len().min(out.len());
                out[..count].copy_from_slice(&sweep.values[..count]);
                count
            }
            None => 0,
        }
    }

    /// Copy a real signal's values into `out`, truncating to its length.
    /// Fails (`None`) for unknown names, out-of-range tables, and complex
    /// signals; it never substitutes magnitudes.
    pub fn copy_real_into(&self, table_index: usize, name: &str, out: &mut [f64]) -> Option<usize> {
        let var_index = self.variable_index(name)?;
        match self.vector(table_index, var_index)? {
            VectorData::Real(values) => {
                let count = values.len().min(out.len());
                out[..count].copy_from_slice(&values[..count]);
                Some(count)
            }
            VectorData::Complex(_) => None,
        }
    }

    /// Copy a complex signal's values into matched real/imaginary buffers.
    /// The copied count is bounded by the shorter output buffer.
    pub fn copy_complex_into(
        &self,
        table_index: usize,
        name: &str,
        out_re: &mut [f64],
        out_im: &mut [f64],
    ) -> Option<usize> {
        let var_index = self.variable_index(name)?;
        match self.vector(table_index, var_index)? {
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
