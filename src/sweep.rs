//! Sweep value collection across data tables.

use crate::types::{Result, SweepInfo, WaveformError};

/// Collects per-table sweep parameter values in table order and checks
/// the value-count-equals-table-count invariant at the end.
pub struct SweepAssembler {
    name: Option<String>,
    values: Vec<f64>,
}

impl SweepAssembler {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            values: Vec::new(),
        }
    }

    /// Append the sweep value decoded from one table.
    pub fn push(&mut self, value: f64) {
        self.values.push(value);
    }

    /// Validate against the decoded table count and build the sweep info.
    pub fn finish(self, table_count: usize) -> Result<Option<SweepInfo>> {
        match self.name {
            Some(name) => {
                if self.values.len() != table_count {
                    return Err(WaveformError::SweepTableMismatch {
                        values: self.values.len(),
                        tables: table_count,
                    });
                }
                Ok(Some(SweepInfo {
                    name,
                    values: self.values,
                }))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_sweep_yields_none() {
        let assembler = SweepAssembler::new(None);
        assert_eq!(assembler.finish(3).unwrap(), None);
    }

    #[test]
    fn matching_counts_build_info() {
        let mut assembler = SweepAssembler::new(Some("vdd".into()));
        assembler.push(1.0);
        assembler.push(1.2);
        let info = assembler.finish(2).unwrap().unwrap();
        assert_eq!(info.name, "vdd");
        assert_eq!(info.values, vec![1.0, 1.2]);
    }

    #[test]
    fn count_mismatch_fails() {
        let mut assembler = SweepAssembler::new(Some("vdd".into()));
        assembler.push(1.0);
        let err = assembler.finish(2).unwrap_err();
        assert!(matches!(err, WaveformError::SweepTableMismatch { .. }));
    }
}
