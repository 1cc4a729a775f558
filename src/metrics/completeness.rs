//! SAMPLING COMPLETENESS (Chao1 on interactions)
//!
//! Treats every plant-hummingbird link as a "species" and its detection
//! count as abundance:
//!
//!   S_obs = number of non-zero cells
//!   f1, f2 = cells with exactly 1 and exactly 2 detections
//!   S_est = S_obs + f1² / (2 f2)              when f2 > 0
//!   S_est = S_obs + f1 (f1 - 1) / (2 (f2 + 1)) when f2 = 0 (bias-corrected)
//!   completeness = S_obs / S_est, in (0, 1]
//!
//! **PRECONDITION**: the matrix must hold raw detection counts
//! (`WeightField::RawCount`), never effort-corrected rates. Singletons and
//! doubletons are meaningless on rescaled weights, so fractional cells fail
//! with `NonCountWeight` instead of being coerced.

use serde::Serialize;

use super::{MetricOutcome, UnavailableReason};
use crate::error::NetworkError;
use crate::matrix::InteractionMatrix;

/// Chao1 completeness of one network
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completeness {
    pub observed_richness: usize,
    pub estimated_richness: f64,
    pub completeness_ratio: f64,
    /// Links seen exactly once
    pub singletons: usize,
    /// Links seen exactly twice
    pub doubletons: usize,
}

/// Estimate interaction richness and sampling completeness
pub fn estimate(matrix: &InteractionMatrix) -> MetricOutcome<Completeness> {
    let n_cols = matrix.n_columns();
    for (idx, &value) in matrix.values().iter().enumerate() {
        if value.fract() != 0.0 {
            return Err(NetworkError::NonCountWeight {
                row: matrix.row_labels()[idx / n_cols].clone(),
                column: matrix.column_labels()[idx % n_cols].clone(),
                value,
            }
            .into());
        }
    }

    let observed = matrix.n_links();
    if observed == 0 {
        return Err(UnavailableReason::NoInteractions.into());
    }
    let singletons = matrix.values().iter().filter(|&&v| v == 1.0).count();
    let doubletons = matrix.values().iter().filter(|&&v| v == 2.0).count();

    let estimated_richness = chao1(observed as f64, singletons as f64, doubletons as f64);
    let completeness_ratio = (observed as f64 / estimated_richness).min(1.0);

    Ok(Completeness {
        observed_richness: observed,
        estimated_richness,
        completeness_ratio,
        singletons,
        doubletons,
    })
}

/// Chao1 richness from observed richness and singleton/doubleton counts
pub fn chao1(observed: f64, f1: f64, f2: f64) -> f64 {
    if f2 > 0.0 {
        observed + f1 * f1 / (2.0 * f2)
    } else {
        observed + f1 * (f1 - 1.0) / (2.0 * (f2 + 1.0))
    }
}
