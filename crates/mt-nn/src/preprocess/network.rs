// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

//! Tabular traffic-record preprocessing.

use super::{min_max_normalize, parse_field, read_text};
use crate::error::{NnError, NnResult};
use mt_tensor::Tensor;
use std::path::Path;

/// Parses comma-separated numeric records and rescales each column into the
/// unit interval.
#[derive(Debug, Clone)]
pub struct NetworkPipeline {
    features: usize,
    drop_columns: Vec<usize>,
}

impl NetworkPipeline {
    pub fn new(features: usize) -> NnResult<Self> {
        if features == 0 {
            return Err(NnError::configuration("feature count must be positive"));
        }
        Ok(Self {
            features,
            drop_columns: Vec::new(),
        })
    }

    /// Ignores the given zero-based columns when parsing, for identifier
    /// fields like timestamps or protocol tags.
    pub fn with_dropped_columns(mut self, columns: Vec<usize>) -> Self {
        self.drop_columns = columns;
        self
    }

    pub fn output_shape(&self) -> Vec<usize> {
        vec![self.features]
    }

    /// Loads a headerless CSV file of numeric records, one sample per line.
    /// Empty fields read as zero.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> NnResult<Vec<Tensor>> {
        let text = read_text(path.as_ref())?;
        let mut records = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut record = Vec::with_capacity(self.features);
            for (column, raw) in line.split(',').enumerate() {
                if self.drop_columns.contains(&column) {
                    continue;
                }
                if raw.trim().is_empty() {
                    record.push(0.0);
                } else {
                    record.push(parse_field(raw, index + 1)?);
                }
            }
            if record.len() != self.features {
                return Err(NnError::conversion(format!(
                    "line {}: expected {} fields, found {}",
                    index + 1,
                    self.features,
                    record.len()
                )));
            }
            records.push(record);
        }
        if records.is_empty() {
            return Err(NnError::conversion("no records in input"));
        }
        self.normalize(records)
    }

    /// Column-wise min-max normalization over a full batch of records.
    pub fn normalize(&self, mut records: Vec<Vec<f32>>) -> NnResult<Vec<Tensor>> {
        for record in &records {
            if record.len() != self.features {
                return Err(NnError::ShapeMismatch {
                    expected: vec![self.features],
                    got: vec![record.len()],
                });
            }
        }
        for feature in 0..self.features {
            let mut column: Vec<f32> = records.iter().map(|record| record[feature]).collect();
            min_max_normalize(&mut column);
            for (record, value) in records.iter_mut().zip(column) {
                record[feature] = value;
            }
        }
        records
            .into_iter()
            .map(|record| Ok(Tensor::from_vec(1, self.features, record)?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rescales_each_column() {
        let pipeline = NetworkPipeline::new(2).unwrap();
        let samples = pipeline
            .normalize(vec![vec![0.0, 10.0], vec![5.0, 20.0], vec![10.0, 30.0]])
            .unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].data(), &[0.0, 0.0]);
        assert_eq!(samples[1].data(), &[0.5, 0.5]);
        assert_eq!(samples[2].data(), &[1.0, 1.0]);
    }

    #[test]
    fn load_parses_csv_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flows.csv");
        std::fs::write(&path, "1,2,3\n4,5,6\n").unwrap();
        let pipeline = NetworkPipeline::new(3).unwrap();
        let samples = pipeline.load(&path).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].shape(), (1, 3));
    }

    #[test]
    fn load_rejects_ragged_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flows.csv");
        std::fs::write(&path, "1,2,3\n4,5\n").unwrap();
        let pipeline = NetworkPipeline::new(3).unwrap();
        assert!(matches!(
            pipeline.load(&path),
            Err(NnError::Conversion { .. })
        ));
    }

    #[test]
    fn load_rejects_non_numeric_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flows.csv");
        std::fs::write(&path, "1,two,3\n").unwrap();
        let pipeline = NetworkPipeline::new(3).unwrap();
        assert!(matches!(
            pipeline.load(&path),
            Err(NnError::Conversion { .. })
        ));
    }

    #[test]
    fn dropped_columns_and_empty_fields_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flows.csv");
        std::fs::write(&path, "2026-08-01,tcp,1,,3\n2026-08-02,udp,4,5,6\n").unwrap();
        let pipeline = NetworkPipeline::new(3)
            .unwrap()
            .with_dropped_columns(vec![0, 1]);
        let samples = pipeline.load(&path).unwrap();
        assert_eq!(samples.len(), 2);
        // The empty field reads as zero, which is also the column minimum.
        assert_eq!(samples[0].data()[1], 0.0);
    }

    #[test]
    fn missing_file_maps_to_not_found() {
        let pipeline = NetworkPipeline::new(3).unwrap();
        assert!(matches!(
            pipeline.load("/nonexistent/flows.csv"),
            Err(NnError::NotFound { .. })
        ));
    }
}
