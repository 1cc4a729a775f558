//! Interaction Records and Work-Item Keys
//!
//! Typed versions of the rows coming out of the field-data filtering step:
//! one record per (replicate, period, sampling method, plant, hummingbird).

use serde::{Deserialize, Serialize};
use std::fmt;

/// One site (patch) in one year
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReplicateId {
    pub year: i32,
    pub patch: String,
}

impl ReplicateId {
    pub fn new(year: i32, patch: impl Into<String>) -> Self {
        Self { year, patch: patch.into() }
    }
}

impl fmt::Display for ReplicateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.year, self.patch)
    }
}

/// Phase relative to the experimental manipulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Pre,
    Post,
}

impl Period {
    pub const ALL: [Period; 2] = [Period::Pre, Period::Post];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Pre => "pre",
            Period::Post => "post",
        }
    }

    /// Parse the period tag used in the field sheets ("pre"/"post", any case)
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "pre" => Some(Period::Pre),
            "post" => Some(Period::Post),
            _ => None,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two parallel ways of inferring the same plant-hummingbird interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMethod {
    /// Pollen loads on captured birds (morphotypes as rows)
    Pollen,
    /// Direct observation from flower cameras
    Camera,
}

impl SamplingMethod {
    pub const ALL: [SamplingMethod; 2] = [SamplingMethod::Pollen, SamplingMethod::Camera];

    pub fn as_str(&self) -> &'static str {
        match self {
            SamplingMethod::Pollen => "pollen",
            SamplingMethod::Camera => "camera",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "pollen" => Some(SamplingMethod::Pollen),
            "camera" | "video" => Some(SamplingMethod::Camera),
            _ => None,
        }
    }
}

impl fmt::Display for SamplingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single filtered, pre-aggregated interaction
///
/// `weight` is whatever the analysis uses (often a sampling-effort corrected
/// rate); `raw_count` is the untransformed number of detections and is the
/// only field the completeness estimator may consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub replicate: ReplicateId,
    pub period: Period,
    pub sampling_method: SamplingMethod,
    /// Plant species or pollen morphotype
    pub row_entity: String,
    /// Hummingbird species
    pub column_entity: String,
    pub weight: f64,
    pub raw_count: f64,
}

impl InteractionRecord {
    pub fn key(&self) -> WorkKey {
        WorkKey {
            replicate: self.replicate.clone(),
            period: self.period,
            sampling_method: self.sampling_method,
        }
    }
}

/// One unit of batch work: replicate × sampling method × period
///
/// Ordering is replicate, then method, then period, so the two periods of a
/// pair sit next to each other in every output table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkKey {
    pub replicate: ReplicateId,
    pub sampling_method: SamplingMethod,
    pub period: Period,
}

impl fmt::Display for WorkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.replicate, self.sampling_method, self.period)
    }
}
