//! Shared fixture builders: synthetic HSPICE binary and SPICE raw files.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Once;

static DIAGNOSTICS: Once = Once::new();

/// Route decoder diagnostics to the test harness, once per binary.
/// Visible under `--nocapture` with RUST_LOG set.
fn init_diagnostics() {
    DIAGNOSTICS.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Write fixture bytes to a uniquely named temp file.
pub fn write_temp(name: &str, bytes: &[u8]) -> PathBuf {
    init_diagnostics();
    let path = std::env::temp_dir().join(format!("waveform_reader_{}_{}", process::id(), name));
    fs::write(&path, bytes).unwrap();
    path
}

pub fn remove_temp(path: &PathBuf) {
    let _ = fs::remove_file(path);
}

// ============================================================================
// HSPICE binary fixtures
// ============================================================================

/// End-of-table marker as stored in 9601 (f32) payloads.
pub const MARKER_F32: f32 = 1.0e30;
/// End-of-table marker as stored in 2001 (f64) payloads.
pub const MARKER_F64: f64 = 1.0e30;

/// Wrap a payload in the little-endian Fortran block framing.
pub fn frame_block(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 20);
    out.extend_from_slice(&4i32.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&4i32.to_le_bytes());
    out.extend_from_slice(&(payload.len() as i32).to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&(payload.len() as i32).to_le_bytes());
    out
}

/// Big-endian variant of the block framing.
pub fn frame_block_be(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 20);
    out.extend_from_slice(&4i32.to_be_bytes());
    out.extend_from_slice(&0i32.to_be_bytes());
    out.extend_from_slice(&4i32.to_be_bytes());
    out.extend_from_slice(&(payload.len() as i32).to_be_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&(payload.len() as i32).to_be_bytes());
    out
}

/// Build the fixed-width HSPICE header record (without the `$&%#`
/// terminator). `sweep` carries the declared table count; the sweep
/// parameter name goes at the end of `directory`.
pub fn hspice_header_record(
    num_vars: usize,
    num_probes: usize,
    sweep_tables: Option<usize>,
    post_2001: bool,
    directory: &str,
) -> Vec<u8> {
    let mut buf = vec![b' '; 256];
    buf[0..4].copy_from_slice(format!("{num_vars:<4}").as_bytes());
    buf[4..8].copy_from_slice(format!("{num_probes:<4}").as_bytes());
    let num_sweeps = usize::from(sweep_tables.is_some());
    buf[8..12].copy_from_slice(format!("{num_sweeps:<4}").as_bytes());
    buf[16..20].copy_from_slice(b"9601");
    if post_2001 {
        buf[20..24].copy_from_slice(b"2001");
    }
    buf[24..35].copy_from_slice(b"fixture sim");
    buf[88..93].copy_from_slice(b"today");
    if let Some(tables) = sweep_tables {
        let pos = if post_2001 { 187 } else { 176 };
        let text = format!("{tables:<10}");
        buf[pos..pos + 10].copy_from_slice(text.as_bytes());
    }
    buf.extend_from_slice(directory.as_bytes());
    buf
}

/// Assemble a complete little-endian HSPICE file: framed header record
/// plus one framed data block per table, each ending with the marker.
/// Table values are pre-flattened (sweep value first when swept).
pub fn hspice_file(header_record: &[u8], tables: &[Vec<f64>], post_2001: bool) -> Vec<u8> {
    let mut record = header_record.to_vec();
    record.extend_from_slice(b"$&%#");
    let mut out = frame_block(&record);
    for table in tables {
        let payload = if post_2001 {
            let mut p: Vec<u8> = table.iter().flat_map(|v| v.to_le_bytes()).collect();
            p.extend_from_slice(&MARKER_F64.to_le_bytes());
            p
        } else {
            let mut p: Vec<u8> = table
                .iter()
                .flat_map(|&v| (v as f32).to_le_bytes())
                .collect();
            p.extend_from_slice(&MARKER_F32.to_le_bytes());
            p
        };
        out.extend(frame_block(&payload));
    }
    out
}

/// Big-endian 9601 variant of `hspice_file`.
pub fn hspice_file_be(header_record: &[u8], tables: &[Vec<f64>]) -> Vec<u8> {
    let mut record = header_record.to_vec();
    record.extend_from_slice(b"$&%#");
    let mut out = frame_block_be(&record);
    for table in tables {
        let mut payload: Vec<u8> = table
            .iter()
            .flat_map(|&v| (v as f32).to_be_bytes())
            .collect();
        payload.extend_from_slice(&MARKER_F32.to_be_bytes());
        out.extend(frame_block_be(&payload));
    }
    out
}

/// A 3-point transient file: TIME scale plus one voltage, values chosen
/// to be exact in f32.
pub fn hspice_transient_3pt() -> Vec<u8> {
    let record = hspice_header_record(1, 1, None, false, "1 1 TIME v(1)");
    let table = vec![0.0, 0.0, 0.5, 0.25, 1.0, 1.0];
    hspice_file(&record, &[table], false)
}

/// A 5-point transient file for chunking tests.
pub fn hspice_transient_5pt() -> Vec<u8> {
    let record = hspice_header_record(1, 1, None, false, "1 1 TIME v(out)");
    let table = vec![0.0, 1.0, 0.25, 2.0, 0.5, 3.0, 0.75, 4.0, 1.0, 5.0];
    hspice_file(&record, &[table], false)
}

/// A 2-point complex AC file: HERTZ scale plus one complex voltage.
pub fn hspice_ac_2pt() -> Vec<u8> {
    let record = hspice_header_record(2, 0, None, false, "2 1 HERTZ v(out)");
    // Rows of [freq, re, im].
    let table = vec![1.0, 0.5, -0.5, 2.0, 0.25, -0.25];
    hspice_file(&record, &[table], false)
}

/// A two-table vdd sweep, 2 points per table.
pub fn hspice_sweep_2x2() -> Vec<u8> {
    let record = hspice_header_record(1, 1, Some(2), false, "1 1 TIME v(out) vdd");
    let table_a = vec![1.0, 0.0, 0.5, 0.25, 1.0];
    let table_b = vec![1.25, 0.0, 0.75, 0.25, 1.5];
    hspice_file(&record, &[table_a, table_b], false)
}

// ============================================================================
// SPICE raw fixtures
// ============================================================================

pub const RAW_ASCII_REAL: &str = "Title: rc fixture\nDate: today\n\
Plotname: Transient Analysis\nFlags: real\nNo. Variables: 2\nNo. Points: 3\n\
Variables:\n\t0\ttime\ttime\n\t1\tv(out)\tvoltage\nValues:\n\
0\t0.0\n\t1.0\n1\t0.5\n\t2.0\n2\t1.0\n\t3.0\n";

pub const RAW_ASCII_COMPLEX: &str = "Title: ac fixture\nDate: today\n\
Plotname: AC Analysis\nFlags: complex\nNo. Variables: 2\nNo. Points: 2\n\
Variables:\n\t0\tfrequency\tfrequency\n\t1\tv(out)\tvoltage\nValues:\n\
0\t1.0,0.0\n\t0.5,-0.5\n1\t2.0,0.0\n\t0.25,-0.25\n";

fn raw_prologue(plotname: &str, flags: &str, num_vars: usize, num_points: usize) -> String {
    let mut text = format!(
        "Title: binary fixture\nDate: today\nPlotname: {plotname}\nFlags: {flags}\n\
No. Variables: {num_vars}\nNo. Points: {num_points}\nVariables:\n"
    );
    for i in 0..num_vars {
        let (name, unit) = if i == 0 {
            ("time", "time")
        } else {
            ("v(out)", "voltage")
        };
        text.push_str(&format!("\t{i}\t{name}\t{unit}\n"));
    }
    text.push_str("Binary:\n");
    text
}

/// Binary real rawfile from row-major points.
pub fn raw_binary_real(points: &[Vec<f64>]) -> Vec<u8> {
    let num_vars = points.first().map(|p| p.len()).unwrap_or(0);
    let mut out = raw_prologue("Transient Analysis", "real", num_vars, points.len()).into_bytes();
    for point in points {
        for value in point {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
    out
}

/// Binary complex rawfile: each point is rows of (re, im) per variable,
/// the scale's imaginary part stored as zero.
pub fn raw_binary_complex(points: &[Vec<(f64, f64)>]) -> Vec<u8> {
    let num_vars = points.first().map(|p| p.len()).unwrap_or(0);
    let mut out = raw_prologue("AC Analysis", "complex", num_vars, points.len()).into_bytes();
    for point in points {
        for (re, im) in point {
            out.extend_from_slice(&re.to_le_bytes());
            out.extend_from_slice(&im.to_le_bytes());
        }
    }
    out
}
