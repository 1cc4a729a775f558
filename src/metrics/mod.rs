//! Metric modules for interaction networks
//!
//! Each metric family is implemented in its own module:
//! - `network_level`: H2' and marginal network summaries
//! - `species_level`: d' and species specificity index per hummingbird
//! - `dissimilarity`: WN = ST + OS turnover between two periods
//! - `completeness`: Chao1 sampling completeness
//!
//! Every computation returns a [`MetricOutcome`]: a value, or a
//! [`MetricIssue`] explaining why there is none. Unavailable is a normal
//! result (tiny field networks are common), not an error.

pub mod network_level;
pub mod species_level;
pub mod dissimilarity;
pub mod completeness;

// Re-export metric functions
pub use network_level::{network_level, h2_specialization, H2Specialization, NetworkIndex};
pub use species_level::{species_level, d_prime, species_specificity, IntegerPolicy, SpeciesIndex};
pub use dissimilarity::{align, compare, partition, AlignedPair, Dissimilarity, DissimilarityIndex};
pub use completeness::{estimate, chao1, Completeness};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::NetworkError;

/// Why a metric has no value for a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// Fewer than 2 rows or 2 columns
    TooSmall,
    /// Theoretical min and max coincide, or a zero marginal
    DegenerateMarginal,
    /// Aligned periods share no plant or no hummingbird
    NoSharedSpecies,
    /// Every cell is zero
    NoInteractions,
    /// The other period of the replicate has no valid matrix
    MissingPeriod,
    /// The item's matrix could not be built
    BuildFailed,
}

impl UnavailableReason {
    pub fn tag(&self) -> &'static str {
        match self {
            UnavailableReason::TooSmall => "network too small",
            UnavailableReason::DegenerateMarginal => "degenerate marginal",
            UnavailableReason::NoSharedSpecies => "no shared species",
            UnavailableReason::NoInteractions => "no interactions",
            UnavailableReason::MissingPeriod => "missing paired period",
            UnavailableReason::BuildFailed => "matrix build failed",
        }
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// The non-value side of a metric computation
#[derive(Debug, Clone, PartialEq)]
pub enum MetricIssue {
    /// Recoverable: recorded as a warning next to sibling results
    Unavailable(UnavailableReason),
    /// Computation or precondition error isolated to this one metric
    Failed(NetworkError),
}

impl MetricIssue {
    /// Text stored in the `unavailable_reason` column of output tables
    pub fn reason_tag(&self) -> String {
        match self {
            MetricIssue::Unavailable(reason) => reason.tag().to_string(),
            MetricIssue::Failed(err) => format!("computation error: {}", err),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, MetricIssue::Failed(_))
    }
}

impl From<UnavailableReason> for MetricIssue {
    fn from(reason: UnavailableReason) -> Self {
        MetricIssue::Unavailable(reason)
    }
}

impl From<NetworkError> for MetricIssue {
    fn from(err: NetworkError) -> Self {
        MetricIssue::Failed(err)
    }
}

impl fmt::Display for MetricIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason_tag())
    }
}

/// Value or the reason there is none
pub type MetricOutcome<T> = Result<T, MetricIssue>;

/// Turn NaN/inf from a closed form into a degenerate-marginal issue
pub(crate) fn finite_or_degenerate(value: f64) -> MetricOutcome<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(UnavailableReason::DegenerateMarginal.into())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_tags() {
        let issue: MetricIssue = UnavailableReason::TooSmall.into();
        assert_eq!(issue.reason_tag(), "network too small");
        assert!(!issue.is_failure());

        let issue: MetricIssue = NetworkError::EmptyInput.into();
        assert!(issue.reason_tag().starts_with("computation error: empty input"));
        assert!(issue.is_failure());
    }

    #[test]
    fn test_non_finite_is_degenerate() {
        assert_eq!(finite_or_degenerate(0.5), Ok(0.5));
        assert_eq!(
            finite_or_degenerate(f64::NAN),
            Err(MetricIssue::Unavailable(UnavailableReason::DegenerateMarginal))
        );
    }
}
