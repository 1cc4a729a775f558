//! Batch Configuration
//!
//! Loaded from JSON; every field has a default so `{}` is a valid config.
//!
//! ```json
//! {
//!   "sampling_methods": ["pollen", "camera"],
//!   "network_indices": ["H2", "connectance"],
//!   "species_indices": ["d_prime", "species_specificity_index"],
//!   "dissimilarity_index": "sorensen",
//!   "binary_variants": [true, false],
//!   "integer_policy": "round",
//!   "parallel": false
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::metrics::{DissimilarityIndex, IntegerPolicy, NetworkIndex, SpeciesIndex};
use crate::records::SamplingMethod;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Methods enumerated for every replicate
    pub sampling_methods: Vec<SamplingMethod>,
    pub network_indices: BTreeSet<NetworkIndex>,
    pub species_indices: BTreeSet<SpeciesIndex>,
    pub dissimilarity_index: DissimilarityIndex,
    /// Weightings compared between periods (true = presence/absence)
    pub binary_variants: Vec<bool>,
    /// Fractional weights in d'
    pub integer_policy: IntegerPolicy,
    /// Run work items on the rayon pool
    pub parallel: bool,
    /// Relative tolerance for WN = ST + OS
    pub additivity_tolerance: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            sampling_methods: SamplingMethod::ALL.to_vec(),
            network_indices: [NetworkIndex::H2].into_iter().collect(),
            species_indices: [SpeciesIndex::DPrime, SpeciesIndex::SpeciesSpecificity]
                .into_iter()
                .collect(),
            dissimilarity_index: DissimilarityIndex::Sorensen,
            binary_variants: vec![true, false],
            integer_policy: IntegerPolicy::Round,
            parallel: false,
            additivity_tolerance: 1e-9,
        }
    }
}

impl NetworkConfig {
    /// Load configuration from JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read network config: {:?}", path))?;

        let config: NetworkConfig = serde_json::from_str(&contents)
            .with_context(|| "Failed to parse network config JSON")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.sampling_methods.is_empty(), "sampling_methods must not be empty");
        anyhow::ensure!(
            !self.network_indices.is_empty() || !self.species_indices.is_empty(),
            "at least one network or species index must be requested"
        );
        anyhow::ensure!(
            self.additivity_tolerance > 0.0,
            "additivity_tolerance must be > 0"
        );
        Ok(())
    }
}
