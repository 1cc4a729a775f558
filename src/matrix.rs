//! Interaction Matrix Builder
//!
//! Turns (plant, hummingbird, weight) records into a dense, labelled
//! bipartite matrix. Rows are plants/morphotypes, columns are hummingbirds.
//!
//! Labels are the sorted distinct entities actually present in the records:
//! no zero-padding of unseen species here. Padding only happens when two
//! periods are aligned for dissimilarity (see `metrics::dissimilarity`).

use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::error::NetworkError;
use crate::records::InteractionRecord;

/// Which record field fills the matrix cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightField {
    /// Analysis weight (may be an effort-corrected rate)
    Weight,
    /// Untransformed detections, for completeness estimation
    RawCount,
}

/// Dense row-major bipartite matrix with ordered, unique labels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionMatrix {
    row_labels: Vec<String>,
    column_labels: Vec<String>,
    values: Vec<f64>,
}

impl InteractionMatrix {
    /// Build from labels plus row-major values
    ///
    /// Labels must be duplicate-free; they are kept in the order given.
    pub fn from_dense(
        row_labels: Vec<String>,
        column_labels: Vec<String>,
        values: Vec<f64>,
    ) -> Result<Self, NetworkError> {
        if row_labels.len() * column_labels.len() != values.len() {
            return Err(NetworkError::ShapeMismatch {
                rows: row_labels.len(),
                columns: column_labels.len(),
                values: values.len(),
            });
        }
        ensure_unique(&row_labels)?;
        ensure_unique(&column_labels)?;

        for (idx, &value) in values.iter().enumerate() {
            let row = &row_labels[idx / column_labels.len()];
            let column = &column_labels[idx % column_labels.len()];
            check_weight(row, column, value)?;
        }

        Ok(Self { row_labels, column_labels, values })
    }

    /// 0×0 matrix: a sampling type that is entirely absent in one period
    pub fn empty() -> Self {
        Self {
            row_labels: Vec::new(),
            column_labels: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.row_labels.len()
    }

    pub fn n_columns(&self) -> usize {
        self.column_labels.len()
    }

    pub fn row_labels(&self) -> &[String] {
        &self.row_labels
    }

    pub fn column_labels(&self) -> &[String] {
        &self.column_labels
    }

    /// Fewer than 2 rows or fewer than 2 columns
    pub fn is_degenerate(&self) -> bool {
        self.n_rows() < 2 || self.n_columns() < 2
    }

    #[inline]
    pub fn value(&self, row: usize, column: usize) -> f64 {
        self.values[row * self.n_columns() + column]
    }

    /// Cell lookup by entity names
    pub fn get(&self, row_label: &str, column_label: &str) -> Option<f64> {
        let row = self.row_labels.iter().position(|l| l == row_label)?;
        let column = self.column_labels.iter().position(|l| l == column_label)?;
        Some(self.value(row, column))
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let n = self.n_columns();
        &self.values[row * n..(row + 1) * n]
    }

    pub fn column(&self, column: usize) -> Vec<f64> {
        (0..self.n_rows()).map(|row| self.value(row, column)).collect()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn row_totals(&self) -> Vec<f64> {
        (0..self.n_rows()).map(|row| self.row(row).iter().sum()).collect()
    }

    pub fn column_totals(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_columns()];
        for row in 0..self.n_rows() {
            for (total, value) in totals.iter_mut().zip(self.row(row)) {
                *total += value;
            }
        }
        totals
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Number of realised links (non-zero cells)
    pub fn n_links(&self) -> usize {
        self.values.iter().filter(|&&v| v > 0.0).count()
    }

    pub fn all_integral(&self) -> bool {
        self.values.iter().all(|v| v.fract() == 0.0)
    }

    /// Presence/absence copy (every positive weight becomes 1)
    pub fn binarized(&self) -> Self {
        Self {
            row_labels: self.row_labels.clone(),
            column_labels: self.column_labels.clone(),
            values: self.values.iter().map(|&v| if v > 0.0 { 1.0 } else { 0.0 }).collect(),
        }
    }
}

/// Builds one matrix per work item
pub struct MatrixBuilder;

impl MatrixBuilder {
    /// Build a matrix from interaction records
    ///
    /// Rows and columns are the lexicographically sorted distinct entities,
    /// so any permutation of the same records gives the same matrix.
    ///
    /// # Errors
    /// - `EmptyInput` if `records` is empty
    /// - `DuplicateCell` if two records share a (row, column) pair; callers
    ///   are expected to sum duplicates beforehand (`data::aggregate_records`)
    /// - `NegativeWeight` / `NonFiniteWeight` for invalid cell values
    pub fn build<'a, I>(records: I, field: WeightField) -> Result<InteractionMatrix, NetworkError>
    where
        I: IntoIterator<Item = &'a InteractionRecord>,
    {
        Self::from_triples(records.into_iter().map(|r| {
            let weight = match field {
                WeightField::Weight => r.weight,
                WeightField::RawCount => r.raw_count,
            };
            (r.row_entity.as_str(), r.column_entity.as_str(), weight)
        }))
    }

    /// Build from bare (row, column, weight) triples
    pub fn from_triples<'a, I>(triples: I) -> Result<InteractionMatrix, NetworkError>
    where
        I: IntoIterator<Item = (&'a str, &'a str, f64)>,
    {
        let triples: Vec<(&str, &str, f64)> = triples.into_iter().collect();
        if triples.is_empty() {
            return Err(NetworkError::EmptyInput);
        }

        let row_set: BTreeSet<&str> = triples.iter().map(|t| t.0).collect();
        let column_set: BTreeSet<&str> = triples.iter().map(|t| t.1).collect();

        let row_index: FxHashMap<&str, usize> =
            row_set.iter().enumerate().map(|(i, &l)| (l, i)).collect();
        let column_index: FxHashMap<&str, usize> =
            column_set.iter().enumerate().map(|(i, &l)| (l, i)).collect();

        let n_columns = column_set.len();
        let mut values = vec![0.0; row_set.len() * n_columns];
        let mut filled = vec![false; values.len()];

        for (row, column, weight) in triples {
            check_weight(row, column, weight)?;
            let idx = row_index[row] * n_columns + column_index[column];
            if filled[idx] {
                return Err(NetworkError::DuplicateCell {
                    row: row.to_string(),
                    column: column.to_string(),
                });
            }
            filled[idx] = true;
            values[idx] = weight;
        }

        Ok(InteractionMatrix {
            row_labels: row_set.into_iter().map(String::from).collect(),
            column_labels: column_set.into_iter().map(String::from).collect(),
            values,
        })
    }
}

fn check_weight(row: &str, column: &str, value: f64) -> Result<(), NetworkError> {
    if !value.is_finite() {
        return Err(NetworkError::NonFiniteWeight {
            row: row.to_string(),
            column: column.to_string(),
        });
    }
    if value < 0.0 {
        return Err(NetworkError::NegativeWeight {
            row: row.to_string(),
            column: column.to_string(),
            value,
        });
    }
    Ok(())
}

fn ensure_unique(labels: &[String]) -> Result<(), NetworkError> {
    let mut seen = BTreeSet::new();
    for label in labels {
        if !seen.insert(label.as_str()) {
            return Err(NetworkError::DuplicateLabel(label.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Period, ReplicateId, SamplingMethod};

    fn record(row: &str, column: &str, weight: f64, raw: f64) -> InteractionRecord {
        InteractionRecord {
            replicate: ReplicateId::new(2017, "P1"),
            period: Period::Pre,
            sampling_method: SamplingMethod::Camera,
            row_entity: row.into(),
            column_entity: column.into(),
            weight,
            raw_count: raw,
        }
    }

    #[test]
    fn test_labels_sorted_and_cells_filled() {
        let records = vec![
            record("Palicourea", "Phaethornis", 3.0, 3.0),
            record("Heliconia", "Thalurania", 1.5, 2.0),
            record("Heliconia", "Phaethornis", 2.0, 4.0),
        ];
        let m = MatrixBuilder::build(&records, WeightField::Weight).unwrap();

        assert_eq!(m.row_labels(), &["Heliconia", "Palicourea"]);
        assert_eq!(m.column_labels(), &["Phaethornis", "Thalurania"]);
        assert_eq!(m.get("Heliconia", "Thalurania"), Some(1.5));
        assert_eq!(m.get("Palicourea", "Thalurania"), Some(0.0));
        assert_eq!(m.row_totals(), vec![3.5, 3.0]);
        assert_eq!(m.column_totals(), vec![5.0, 1.5]);
        assert_eq!(m.n_links(), 3);

        let raw = MatrixBuilder::build(&records, WeightField::RawCount).unwrap();
        assert_eq!(raw.get("Heliconia", "Phaethornis"), Some(4.0));
    }

    #[test]
    fn test_empty_input_fails() {
        let none: Vec<InteractionRecord> = Vec::new();
        let result = MatrixBuilder::build(&none, WeightField::Weight);
        assert_eq!(result.unwrap_err(), NetworkError::EmptyInput);
    }

    #[test]
    fn test_duplicate_cell_fails() {
        let records = vec![record("a", "x", 1.0, 1.0), record("a", "x", 2.0, 2.0)];
        let err = MatrixBuilder::build(&records, WeightField::Weight).unwrap_err();
        assert!(matches!(err, NetworkError::DuplicateCell { .. }));
    }

    #[test]
    fn test_negative_weight_fails() {
        let records = vec![record("a", "x", -1.0, 1.0)];
        let err = MatrixBuilder::build(&records, WeightField::Weight).unwrap_err();
        assert!(matches!(err, NetworkError::NegativeWeight { .. }));
    }

    #[test]
    fn test_degenerate_shapes() {
        let single = MatrixBuilder::from_triples([("a", "x", 1.0)]).unwrap();
        assert!(single.is_degenerate());

        let one_row = MatrixBuilder::from_triples([("a", "x", 1.0), ("a", "y", 1.0)]).unwrap();
        assert!(one_row.is_degenerate());

        let square = MatrixBuilder::from_triples([("a", "x", 1.0), ("b", "y", 1.0)]).unwrap();
        assert!(!square.is_degenerate());
    }

    #[test]
    fn test_from_dense_validates_shape() {
        let err = InteractionMatrix::from_dense(
            vec!["a".into()],
            vec!["x".into(), "y".into()],
            vec![1.0],
        )
        .unwrap_err();
        assert!(matches!(err, NetworkError::ShapeMismatch { .. }));

        let err = InteractionMatrix::from_dense(
            vec!["a".into(), "a".into()],
            vec!["x".into()],
            vec![1.0, 1.0],
        )
        .unwrap_err();
        assert_eq!(err, NetworkError::DuplicateLabel("a".into()));
    }

    #[test]
    fn test_binarized() {
        let m = MatrixBuilder::from_triples([("a", "x", 4.0), ("b", "y", 0.5), ("b", "x", 0.0)])
            .unwrap();
        assert_eq!(m.binarized().values(), &[1.0, 0.0, 0.0, 1.0]);
        assert!(!m.all_integral());
    }
}
