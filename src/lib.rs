//! Hummingbird–Plant Network Engine
//!
//! Batch computation of bipartite interaction-network metrics for a
//! before/after (pre/post) field experiment, per replicate and sampling method.
//!
//! Layout:
//! - `records`: typed interaction records and work-item keys
//! - `matrix`: dense labelled interaction matrices
//! - `metrics/`: H2', d'/SSI, WN = ST + OS dissimilarity, Chao1 completeness
//! - `batch`: orchestration over replicate × method × period (sequential or Rayon)
//! - `tables`: output rows, pairing flags, Polars/CSV export
//! - `data`: CSV loading and duplicate-cell aggregation with Polars
//! - `utils/`: entropy, constrained fills, frame helpers

pub mod error;
pub mod records;
pub mod matrix;
pub mod metrics;
pub mod utils;
pub mod config;
pub mod log;
pub mod batch;
pub mod tables;
pub mod data;

// Re-export commonly used types
pub use error::NetworkError;
pub use records::{InteractionRecord, Period, ReplicateId, SamplingMethod, WorkKey};
pub use matrix::{InteractionMatrix, MatrixBuilder, WeightField};
pub use config::NetworkConfig;
pub use log::{BatchLog, LogEntry, LogLevel};
pub use batch::{BatchOrchestrator, ItemResult, ItemState};
pub use tables::BatchReport;
pub use data::{aggregate_records, load_records, records_from_frame};
pub use metrics::*;
