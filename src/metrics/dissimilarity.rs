//! INTERACTION TURNOVER BETWEEN PERIODS (WN = ST + OS)
//!
//! Compares the pre and post networks of one replicate/sampling method with
//! the additive "common denominator" partitioning of Sørensen-family
//! dissimilarity:
//!
//!   a = Σ min(x, y)      b = Σ (x - min)      c = Σ (y - min)
//!   WN = (b + c) / D     D = 2a + b + c (Sørensen / Bray-Curtis)
//!                        D = a + b + c  (Jaccard)
//!
//! Each cell's b and c contribution is charged to OS when both its plant
//! and its hummingbird occur in both periods, otherwise to ST. Because both
//! components share the denominator D, WN = ST + OS holds exactly.
//!
//! The two matrices are first aligned on the union of their labels with
//! zero padding; `AlignedPair` can only be built by [`align`], so unaligned
//! matrices can never reach the partitioning step.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{MetricOutcome, UnavailableReason};
use crate::matrix::InteractionMatrix;

/// Dissimilarity family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DissimilarityIndex {
    /// Sørensen on presence/absence, Bray-Curtis on quantities
    #[default]
    Sorensen,
    Jaccard,
}

impl DissimilarityIndex {
    pub fn name(&self) -> &'static str {
        match self {
            DissimilarityIndex::Sorensen => "sorensen",
            DissimilarityIndex::Jaccard => "jaccard",
        }
    }
}

/// Whole-network dissimilarity and its additive components
///
/// `os` is `None` when the periods share no plant or no hummingbird:
/// rewiring is not applicable there, which is different from zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dissimilarity {
    pub wn: f64,
    pub st: f64,
    pub os: Option<f64>,
    /// ST from links only in the first matrix
    pub st_lost: f64,
    /// ST from links only in the second matrix
    pub st_gained: f64,
    pub os_lost: Option<f64>,
    pub os_gained: Option<f64>,
}

impl Dissimilarity {
    /// |WN - (ST + OS)| relative to WN, with undefined OS counted as 0
    pub fn additivity_error(&self) -> f64 {
        let sum = self.st + self.os.unwrap_or(0.0);
        let scale = self.wn.abs().max(f64::MIN_POSITIVE);
        (self.wn - sum).abs() / scale
    }

    /// Relative additivity error within `tolerance`
    pub fn is_additive(&self, tolerance: f64) -> bool {
        self.additivity_error() <= tolerance
    }
}

/// Two matrices re-expressed on a common label set
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPair {
    row_labels: Vec<String>,
    column_labels: Vec<String>,
    before: Vec<f64>,
    after: Vec<f64>,
}

impl AlignedPair {
    pub fn row_labels(&self) -> &[String] {
        &self.row_labels
    }

    pub fn column_labels(&self) -> &[String] {
        &self.column_labels
    }

    pub fn before(&self) -> &[f64] {
        &self.before
    }

    pub fn after(&self) -> &[f64] {
        &self.after
    }

    fn binarized(&self) -> Self {
        let presence = |v: &f64| if *v > 0.0 { 1.0 } else { 0.0 };
        Self {
            row_labels: self.row_labels.clone(),
            column_labels: self.column_labels.clone(),
            before: self.before.iter().map(presence).collect(),
            after: self.after.iter().map(presence).collect(),
        }
    }

    /// Which rows/columns carry interactions in a period
    fn presence(&self, values: &[f64]) -> (Vec<bool>, Vec<bool>) {
        let n_cols = self.column_labels.len();
        let mut rows = vec![false; self.row_labels.len()];
        let mut cols = vec![false; n_cols];
        for (idx, &v) in values.iter().enumerate() {
            if v > 0.0 {
                rows[idx / n_cols] = true;
                cols[idx % n_cols] = true;
            }
        }
        (rows, cols)
    }
}

/// Re-express both matrices on the union of their labels
///
/// Labels are sorted; entities missing from one period get all-zero rows or
/// columns there.
pub fn align(before: &InteractionMatrix, after: &InteractionMatrix) -> AlignedPair {
    let row_labels: Vec<String> = before
        .row_labels()
        .iter()
        .chain(after.row_labels())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let column_labels: Vec<String> = before
        .column_labels()
        .iter()
        .chain(after.column_labels())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let project = |m: &InteractionMatrix| -> Vec<f64> {
        let row_pos: Vec<usize> = m
            .row_labels()
            .iter()
            .map(|l| row_labels.binary_search(l).unwrap_or_default())
            .collect();
        let col_pos: Vec<usize> = m
            .column_labels()
            .iter()
            .map(|l| column_labels.binary_search(l).unwrap_or_default())
            .collect();

        let mut values = vec![0.0; row_labels.len() * column_labels.len()];
        for (i, &ri) in row_pos.iter().enumerate() {
            for (j, &cj) in col_pos.iter().enumerate() {
                values[ri * column_labels.len() + cj] = m.value(i, j);
            }
        }
        values
    };

    let before_values = project(before);
    let after_values = project(after);

    AlignedPair {
        row_labels,
        column_labels,
        before: before_values,
        after: after_values,
    }
}

/// Compare two periods' networks
///
/// `binary = true` thresholds all weights to presence/absence first.
/// Returns `Unavailable(NoInteractions)` when neither period has a single
/// interaction.
pub fn compare(
    before: &InteractionMatrix,
    after: &InteractionMatrix,
    binary: bool,
    index: DissimilarityIndex,
) -> MetricOutcome<Dissimilarity> {
    let aligned = align(before, after);
    if binary {
        partition(&aligned.binarized(), index)
    } else {
        partition(&aligned, index)
    }
}

/// Additive partition of an aligned pair
pub fn partition(pair: &AlignedPair, index: DissimilarityIndex) -> MetricOutcome<Dissimilarity> {
    debug_assert_eq!(pair.before.len(), pair.after.len());

    let (rows_before, cols_before) = pair.presence(&pair.before);
    let (rows_after, cols_after) = pair.presence(&pair.after);
    let shared_rows: Vec<bool> = rows_before.iter().zip(&rows_after).map(|(a, b)| *a && *b).collect();
    let shared_cols: Vec<bool> = cols_before.iter().zip(&cols_after).map(|(a, b)| *a && *b).collect();
    let rewiring_defined = shared_rows.contains(&true) && shared_cols.contains(&true);

    let n_cols = pair.column_labels.len();
    let mut common = 0.0;
    let (mut st_lost, mut st_gained, mut os_lost, mut os_gained) = (0.0, 0.0, 0.0, 0.0);

    for (idx, (&x, &y)) in pair.before.iter().zip(&pair.after).enumerate() {
        let shared = x.min(y);
        let lost = x - shared;
        let gained = y - shared;
        common += shared;
        if shared_rows[idx / n_cols] && shared_cols[idx % n_cols] {
            os_lost += lost;
            os_gained += gained;
        } else {
            st_lost += lost;
            st_gained += gained;
        }
    }

    let changed = st_lost + st_gained + os_lost + os_gained;
    let denominator = match index {
        DissimilarityIndex::Sorensen => 2.0 * common + changed,
        DissimilarityIndex::Jaccard => common + changed,
    };
    if denominator <= 0.0 {
        return Err(UnavailableReason::NoInteractions.into());
    }

    let rewiring = |v: f64| rewiring_defined.then_some(v / denominator);

    Ok(Dissimilarity {
        wn: changed / denominator,
        st: (st_lost + st_gained) / denominator,
        os: rewiring(os_lost + os_gained),
        st_lost: st_lost / denominator,
        st_gained: st_gained / denominator,
        os_lost: rewiring(os_lost),
        os_gained: rewiring(os_gained),
    })
}
