//! Error taxonomy for network construction and metric computation
//!
//! Input errors (`EmptyInput`, `DuplicateCell`, weight validation) are raised
//! while building a matrix and are fatal to that one work item only.
//! Precondition errors (`NonIntegerWeight`, `NonCountWeight`) mean the caller
//! handed a metric the wrong kind of matrix.
//!
//! "Network too small" and friends are NOT errors; see
//! [`crate::metrics::UnavailableReason`].

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetworkError {
    /// No records, so no row or column labels can be derived.
    #[error("empty input: no interaction records to build a matrix from")]
    EmptyInput,

    /// Two records map to the same cell (caller did not pre-aggregate).
    #[error("duplicate cell: more than one record for ({row}, {column})")]
    DuplicateCell { row: String, column: String },

    #[error("negative weight {value} for ({row}, {column})")]
    NegativeWeight { row: String, column: String, value: f64 },

    /// Dense values do not fit the label dimensions.
    #[error("shape mismatch: {rows}x{columns} labels but {values} values")]
    ShapeMismatch { rows: usize, columns: usize, values: usize },

    #[error("duplicate label '{0}'")]
    DuplicateLabel(String),

    #[error("non-finite weight for ({row}, {column})")]
    NonFiniteWeight { row: String, column: String },

    /// A computation with an integer closed form received fractional weights
    /// and the configured policy is to reject them.
    #[error("non-integer weight {value} in the interactions of '{entity}'")]
    NonIntegerWeight { entity: String, value: f64 },

    /// The completeness estimator needs raw counts, not rates.
    #[error("completeness requires raw counts, found weight {value} for ({row}, {column})")]
    NonCountWeight { row: String, column: String, value: f64 },
}
