//! SPECIES-LEVEL SPECIALIZATION (d', SSI)
//!
//! Computed for every column entity (hummingbird) of a matrix, over its
//! interactions with the row entities (plants/morphotypes).
//!
//! **d'** (standardized Kullback-Leibler divergence):
//!   d    = Σ_i p_i ln(p_i / q_i)      p_i = a_ij / A_j,  q_i = N_i / m
//!   d'   = (d - d_min) / (d_max - d_min)
//! d_min spreads the species' A_j interactions over partners as close to q
//! as integers allow; d_max packs them onto the rarest partners, capped by
//! each partner's total. Both extremes need integer counts, so fractional
//! webs follow the configured [`IntegerPolicy`].
//!
//! **Species specificity index** (coefficient-of-variation style, 0 =
//! perfect generalist, 1 = single partner):
//!   SSI = sqrt( Σ_i (x_i - max x)² / (R - 1) ) / max x
//!
//! One species failing (zero marginal, d_max == d_min) is reported for that
//! species only; every other species still gets its values.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{finite_or_degenerate, MetricOutcome, UnavailableReason};
use crate::error::NetworkError;
use crate::matrix::InteractionMatrix;
use crate::utils::{kl_divergence, proportional_integer_fill, rarest_first_fill};

const D_RANGE_EPS: f64 = 1e-12;

/// Species-level indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpeciesIndex {
    #[serde(rename = "d_prime")]
    DPrime,
    #[serde(rename = "species_specificity_index")]
    SpeciesSpecificity,
}

impl SpeciesIndex {
    pub fn name(&self) -> &'static str {
        match self {
            SpeciesIndex::DPrime => "d_prime",
            SpeciesIndex::SpeciesSpecificity => "species_specificity_index",
        }
    }
}

/// How d' treats fractional weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegerPolicy {
    /// Round every cell to the nearest integer before computing
    #[default]
    Round,
    /// Report `NonIntegerWeight` for the species instead
    Reject,
}

/// Compute the requested species-level indices for every column entity
///
/// Returns column entity → index → outcome, in column-label order.
/// A degenerate matrix gives `Unavailable(TooSmall)` for every species.
pub fn species_level(
    matrix: &InteractionMatrix,
    indices: &BTreeSet<SpeciesIndex>,
    policy: IntegerPolicy,
) -> BTreeMap<String, BTreeMap<SpeciesIndex, MetricOutcome<f64>>> {
    let degenerate = matrix.is_degenerate();

    // d' works on the rounded web; computed once for all species
    let rounded = match policy {
        IntegerPolicy::Round if !matrix.all_integral() => Some(rounded_copy(matrix)),
        _ => None,
    };
    let d_web = rounded.as_ref().unwrap_or(matrix);

    let mut results = BTreeMap::new();
    for (column, entity) in matrix.column_labels().iter().enumerate() {
        let mut per_species = BTreeMap::new();
        for &index in indices {
            let outcome = if degenerate {
                Err(UnavailableReason::TooSmall.into())
            } else {
                match index {
                    SpeciesIndex::DPrime => d_prime(d_web, column),
                    SpeciesIndex::SpeciesSpecificity => species_specificity(matrix, column),
                }
            };
            per_species.insert(index, outcome);
        }
        results.insert(entity.clone(), per_species);
    }

    results
}

/// d' for one column entity
///
/// Fails with `NonIntegerWeight` if the species' interactions are fractional
/// (round first, or use [`species_level`] with `IntegerPolicy::Round`).
pub fn d_prime(matrix: &InteractionMatrix, column: usize) -> MetricOutcome<f64> {
    if matrix.is_degenerate() {
        return Err(UnavailableReason::TooSmall.into());
    }
    let interactions = matrix.column(column);
    if let Some(&value) = interactions.iter().find(|v| v.fract() != 0.0) {
        return Err(NetworkError::NonIntegerWeight {
            entity: matrix.column_labels()[column].clone(),
            value,
        }
        .into());
    }

    let species_total: f64 = interactions.iter().sum();
    let availability = matrix.row_totals();
    let total: f64 = availability.iter().sum();
    if species_total <= 0.0 || total <= 0.0 {
        return Err(UnavailableReason::DegenerateMarginal.into());
    }
    let q: Vec<f64> = availability.iter().map(|n| n / total).collect();

    let d = kl_divergence(&interactions, &q);
    let d_min = kl_divergence(&proportional_integer_fill(species_total, &availability), &q).min(d);
    let d_max = kl_divergence(&rarest_first_fill(species_total, &availability), &q).max(d);

    if d_max - d_min <= D_RANGE_EPS {
        return Err(UnavailableReason::DegenerateMarginal.into());
    }

    Ok(finite_or_degenerate((d - d_min) / (d_max - d_min))?.clamp(0.0, 1.0))
}

/// Species specificity index for one column entity
pub fn species_specificity(matrix: &InteractionMatrix, column: usize) -> MetricOutcome<f64> {
    let n_partners = matrix.n_rows();
    if n_partners < 2 {
        return Err(UnavailableReason::TooSmall.into());
    }
    let interactions = matrix.column(column);
    let max = interactions.iter().cloned().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return Err(UnavailableReason::DegenerateMarginal.into());
    }

    let spread: f64 = interactions.iter().map(|x| (x - max).powi(2)).sum();
    finite_or_degenerate((spread / (n_partners - 1) as f64).sqrt() / max)
}

fn rounded_copy(matrix: &InteractionMatrix) -> InteractionMatrix {
    let values = matrix.values().iter().map(|v| v.round()).collect();
    // Labels come from a valid matrix and rounding keeps cells finite and >= 0
    InteractionMatrix::from_dense(
        matrix.row_labels().to_vec(),
        matrix.column_labels().to_vec(),
        values,
    )
    .unwrap_or_else(|_| matrix.clone())
}
