//! NETWORK-LEVEL SPECIALIZATION (H2')
//!
//! H2' compares the observed two-dimensional Shannon entropy of the
//! interaction matrix with the entropies of the most even (H2max) and most
//! concentrated (H2min) matrices that share its marginal totals:
//!
//!   H2' = (H2max - H2) / (H2max - H2min)
//!
//! 0 = interactions as even as the marginals allow, 1 = perfect partitioning.
//!
//! **Integer webs**: H2max is the integer matrix closest to r_i c_j / m,
//! found by the greedy unit fill. Fractional webs (rates) use the continuous
//! expectation directly. H2min is the greedy largest-marginal assignment in
//! both cases.
//!
//! Also provides connectance and links per species, which share the same
//! 2×2 size requirement.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{finite_or_degenerate, MetricOutcome, UnavailableReason};
use crate::matrix::InteractionMatrix;
use crate::utils::{
    continuous_expectation, integer_expectation_fill, max_marginal_assignment, shannon_entropy,
};

/// Spread below which H2max and H2min are treated as equal
const H2_RANGE_EPS: f64 = 1e-12;

/// Network-level indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NetworkIndex {
    #[serde(rename = "H2")]
    H2,
    #[serde(rename = "H2_uncorrected")]
    H2Uncorrected,
    #[serde(rename = "connectance")]
    Connectance,
    #[serde(rename = "links_per_species")]
    LinksPerSpecies,
}

impl NetworkIndex {
    pub fn name(&self) -> &'static str {
        match self {
            NetworkIndex::H2 => "H2",
            NetworkIndex::H2Uncorrected => "H2_uncorrected",
            NetworkIndex::Connectance => "connectance",
            NetworkIndex::LinksPerSpecies => "links_per_species",
        }
    }
}

/// All parts of the H2' computation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct H2Specialization {
    /// Observed entropy
    pub h2: f64,
    pub h2_min: f64,
    pub h2_max: f64,
    /// Standardized specialization in [0, 1]
    pub h2_prime: f64,
}

/// Compute H2' for a whole network
///
/// Returns `Unavailable(TooSmall)` for matrices under 2×2,
/// `Unavailable(NoInteractions)` for all-zero matrices and
/// `Unavailable(DegenerateMarginal)` when the marginals admit only one
/// entropy (H2max == H2min).
pub fn h2_specialization(matrix: &InteractionMatrix) -> MetricOutcome<H2Specialization> {
    if matrix.is_degenerate() {
        return Err(UnavailableReason::TooSmall.into());
    }
    let total = matrix.total();
    if total <= 0.0 {
        return Err(UnavailableReason::NoInteractions.into());
    }

    let row_totals = matrix.row_totals();
    let column_totals = matrix.column_totals();

    let h2 = shannon_entropy(matrix.values(), total);

    let expected = if matrix.all_integral() {
        integer_expectation_fill(&row_totals, &column_totals)
    } else {
        continuous_expectation(&row_totals, &column_totals)
    };
    // The integer fill is a heuristic; never report a maximum below the data
    let h2_max = shannon_entropy(&expected, total).max(h2);

    let concentrated = max_marginal_assignment(&row_totals, &column_totals);
    let h2_min = shannon_entropy(&concentrated, total).min(h2);

    if h2_max - h2_min <= H2_RANGE_EPS {
        return Err(UnavailableReason::DegenerateMarginal.into());
    }

    let h2_prime = finite_or_degenerate((h2_max - h2) / (h2_max - h2_min))?.clamp(0.0, 1.0);

    Ok(H2Specialization { h2, h2_min, h2_max, h2_prime })
}

/// Compute the requested network-level indices
///
/// Degenerate matrices yield `Unavailable(TooSmall)` for every index rather
/// than an error, so a one-species replicate is a warning in the batch.
pub fn network_level(
    matrix: &InteractionMatrix,
    indices: &BTreeSet<NetworkIndex>,
) -> BTreeMap<NetworkIndex, MetricOutcome<f64>> {
    let mut results = BTreeMap::new();
    if matrix.is_degenerate() {
        for &index in indices {
            results.insert(index, Err(UnavailableReason::TooSmall.into()));
        }
        return results;
    }

    let mut h2: Option<MetricOutcome<H2Specialization>> = None;
    let n_links = matrix.n_links() as f64;
    let n_rows = matrix.n_rows() as f64;
    let n_cols = matrix.n_columns() as f64;

    for &index in indices {
        let outcome = match index {
            NetworkIndex::H2 => h2
                .get_or_insert_with(|| h2_specialization(matrix))
                .clone()
                .map(|h| h.h2_prime),
            NetworkIndex::H2Uncorrected => h2
                .get_or_insert_with(|| h2_specialization(matrix))
                .clone()
                .map(|h| h.h2),
            NetworkIndex::Connectance => Ok(n_links / (n_rows * n_cols)),
            NetworkIndex::LinksPerSpecies => Ok(n_links / (n_rows + n_cols)),
        };
        results.insert(index, outcome);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::MatrixBuilder;
    use crate::metrics::MetricIssue;
    use approx::assert_relative_eq;

    fn matrix(rows: &[&str], cols: &[&str], values: &[f64]) -> InteractionMatrix {
        InteractionMatrix::from_dense(
            rows.iter().map(|s| s.to_string()).collect(),
            cols.iter().map(|s| s.to_string()).collect(),
            values.to_vec(),
        )
        .unwrap()
    }

    #[test]
    fn test_perfect_partitioning_is_one() {
        let m = matrix(&["p1", "p2"], &["b1", "b2"], &[5.0, 0.0, 0.0, 5.0]);
        let h2 = h2_specialization(&m).unwrap();
        assert_relative_eq!(h2.h2, 2.0_f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(h2.h2_min, 2.0_f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(h2.h2_prime, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_even_web_is_zero() {
        let m = matrix(&["p1", "p2"], &["b1", "b2"], &[1.0, 1.0, 1.0, 1.0]);
        let h2 = h2_specialization(&m).unwrap();
        assert_relative_eq!(h2.h2_max, 4.0_f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(h2.h2_prime, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_intermediate_value_bounded() {
        let m = matrix(
            &["p1", "p2", "p3"],
            &["b1", "b2", "b3"],
            &[6.0, 1.0, 0.0, 2.0, 4.0, 1.0, 0.0, 1.0, 5.0],
        );
        let h2 = h2_specialization(&m).unwrap();
        assert!(h2.h2_prime > 0.0 && h2.h2_prime < 1.0);
        assert!(h2.h2_min <= h2.h2 && h2.h2 <= h2.h2_max);
    }

    #[test]
    fn test_fractional_weights_use_continuous_expectation() {
        let m = matrix(&["p1", "p2"], &["b1", "b2"], &[0.5, 0.5, 0.5, 0.5]);
        let h2 = h2_specialization(&m).unwrap();
        assert_relative_eq!(h2.h2_prime, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_single_cell_network_is_too_small() {
        let m = MatrixBuilder::from_triples([("Heliconia", "Phaethornis", 4.0)]).unwrap();
        let indices: BTreeSet<_> = [NetworkIndex::H2].into_iter().collect();
        let results = network_level(&m, &indices);
        assert_eq!(
            results[&NetworkIndex::H2],
            Err(MetricIssue::Unavailable(UnavailableReason::TooSmall))
        );
    }

    #[test]
    fn test_all_zero_web() {
        let m = matrix(&["p1", "p2"], &["b1", "b2"], &[0.0; 4]);
        assert_eq!(
            h2_specialization(&m).unwrap_err(),
            MetricIssue::Unavailable(UnavailableReason::NoInteractions)
        );
    }

    #[test]
    fn test_connectance_and_links_per_species() {
        let m = matrix(&["p1", "p2"], &["b1", "b2", "b3"], &[1.0, 0.0, 2.0, 0.0, 3.0, 0.0]);
        let indices: BTreeSet<_> =
            [NetworkIndex::Connectance, NetworkIndex::LinksPerSpecies].into_iter().collect();
        let results = network_level(&m, &indices);
        assert_relative_eq!(*results[&NetworkIndex::Connectance].as_ref().unwrap(), 0.5);
        assert_relative_eq!(*results[&NetworkIndex::LinksPerSpecies].as_ref().unwrap(), 0.6);
        assert!(!results.contains_key(&NetworkIndex::H2));
    }
}
