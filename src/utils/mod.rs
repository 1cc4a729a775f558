//! Utility modules for network metrics
//!
//! Contains shared functionality used across multiple metrics:
//! - Entropy: Shannon entropy and KL divergence over interaction vectors
//! - Allocation: greedy constrained fills for theoretical index extremes
//! - Frame helpers: column-validated Polars materialization

pub mod entropy;
pub mod allocation;
pub mod frame_helpers;

// Re-export commonly used functions
pub use entropy::{shannon_entropy, kl_divergence};
pub use allocation::{
    integer_expectation_fill, continuous_expectation, max_marginal_assignment,
    proportional_integer_fill, rarest_first_fill,
};
pub use frame_helpers::{materialize_with_columns, string_column, f64_column, i64_column};
