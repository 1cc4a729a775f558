//! Batch Orchestrator - drives every work item through the metric engines
//!
//! Enumerates replicate × sampling method × period from the records, builds
//! one matrix per item, computes network- and species-level indices, then
//! compares the two periods of each replicate (dissimilarity + completeness).
//!
//! Includes both sequential and parallel (Rayon) implementations. Each item
//! produces an immutable [`ItemResult`] with its own log; results are merged
//! in work-item order, so both paths give identical reports.

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::config::NetworkConfig;
use crate::error::NetworkError;
use crate::log::BatchLog;
use crate::matrix::{InteractionMatrix, MatrixBuilder, WeightField};
use crate::metrics::{
    compare, estimate, network_level, species_level, IntegerPolicy, MetricIssue, SpeciesIndex,
    UnavailableReason,
};
use crate::records::{InteractionRecord, Period, ReplicateId, SamplingMethod, WorkKey};
use crate::tables::{
    flag_unpaired, BatchReport, CompletenessRow, DissimilarityRow, ItemRow, NetworkMetricRow,
    SpeciesMetricRow,
};

/// Lifecycle of one work item
///
/// `Pending → MatrixBuilt | BuildFailed`, `MatrixBuilt → MetricsComputed`,
/// `MetricsComputed → Exported`. `partial` marks items where at least one
/// metric came back Unavailable or Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    MatrixBuilt,
    BuildFailed,
    MetricsComputed { partial: bool },
    Exported { partial: bool },
}

impl ItemState {
    pub fn name(&self) -> &'static str {
        match self {
            ItemState::Pending => "pending",
            ItemState::MatrixBuilt => "matrix_built",
            ItemState::BuildFailed => "build_failed",
            ItemState::MetricsComputed { .. } => "metrics_computed",
            ItemState::Exported { .. } => "exported",
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            ItemState::MetricsComputed { partial: true } | ItemState::Exported { partial: true }
        )
    }

    pub fn can_advance_to(&self, next: ItemState) -> bool {
        matches!(
            (self, next),
            (ItemState::Pending, ItemState::MatrixBuilt)
                | (ItemState::Pending, ItemState::BuildFailed)
                | (ItemState::MatrixBuilt, ItemState::MetricsComputed { .. })
                | (ItemState::MetricsComputed { .. }, ItemState::Exported { .. })
        )
    }

    /// Move to `next`; returns the illegal pair if the transition is not allowed
    pub fn advance(&mut self, next: ItemState) -> Result<(), (ItemState, ItemState)> {
        if !self.can_advance_to(next) {
            return Err((*self, next));
        }
        *self = next;
        Ok(())
    }
}

/// Everything one work item produced
///
/// Built in isolation (possibly on a worker thread) and never mutated after.
#[derive(Debug, Clone)]
pub struct ItemResult {
    pub key: WorkKey,
    pub state: ItemState,
    /// Analysis-weight matrix (None if the build failed)
    pub matrix: Option<InteractionMatrix>,
    /// Raw-count matrix for completeness
    pub raw_matrix: Option<Result<InteractionMatrix, NetworkError>>,
    pub build_error: Option<NetworkError>,
    pub network_rows: Vec<NetworkMetricRow>,
    pub species_rows: Vec<SpeciesMetricRow>,
    pub log: BatchLog,
}

/// Cross-period results for one replicate × method
#[derive(Debug, Clone)]
struct PairResult {
    dissimilarity_rows: Vec<DissimilarityRow>,
    completeness_rows: Vec<CompletenessRow>,
    log: BatchLog,
}

/// Main batch coordinator
pub struct BatchOrchestrator {
    config: NetworkConfig,
}

impl BatchOrchestrator {
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// All work items: distinct replicates × configured methods × both periods
    ///
    /// Sorted, and independent of record order. Every configured method is
    /// enumerated for every replicate, so a method with no records in one
    /// period still shows up (as a failed build).
    pub fn plan(&self, records: &[InteractionRecord]) -> Vec<WorkKey> {
        let replicates: BTreeSet<&ReplicateId> = records.iter().map(|r| &r.replicate).collect();
        let methods: BTreeSet<SamplingMethod> =
            self.config.sampling_methods.iter().copied().collect();

        let mut keys = Vec::with_capacity(replicates.len() * methods.len() * 2);
        for replicate in replicates {
            for &sampling_method in &methods {
                for period in Period::ALL {
                    keys.push(WorkKey {
                        replicate: replicate.clone(),
                        sampling_method,
                        period,
                    });
                }
            }
        }
        keys
    }

    /// Run the whole batch (sequential or parallel per config)
    pub fn run(&self, records: &[InteractionRecord]) -> BatchReport {
        if self.config.parallel {
            self.run_parallel(records)
        } else {
            self.run_sequential(records)
        }
    }

    pub fn run_sequential(&self, records: &[InteractionRecord]) -> BatchReport {
        let keys = self.plan(records);
        let groups = group_records(records);
        let results: Vec<ItemResult> = keys
            .iter()
            .map(|key| self.process_item(key, groups.get(key).map_or(&[][..], |g| g.as_slice())))
            .collect();
        let pairs: Vec<PairResult> = pair_slots(&results)
            .iter()
            .map(|&(pre, post)| self.process_pair(&results[pre], &results[post]))
            .collect();
        self.assemble(results, pairs)
    }

    /// Same as [`run_sequential`](Self::run_sequential) with items on the rayon pool
    ///
    /// `par_iter().collect()` keeps item order, so the report is identical.
    pub fn run_parallel(&self, records: &[InteractionRecord]) -> BatchReport {
        let keys = self.plan(records);
        let groups = group_records(records);
        let results: Vec<ItemResult> = keys
            .par_iter()
            .map(|key| self.process_item(key, groups.get(key).map_or(&[][..], |g| g.as_slice())))
            .collect();
        let pairs: Vec<PairResult> = pair_slots(&results)
            .par_iter()
            .map(|&(pre, post)| self.process_pair(&results[pre], &results[post]))
            .collect();
        self.assemble(results, pairs)
    }

    /// Build the matrix and compute single-network metrics for one item
    pub fn process_item(&self, key: &WorkKey, records: &[&InteractionRecord]) -> ItemResult {
        let mut log = BatchLog::new();
        let mut state = ItemState::Pending;
        let mut network_rows = Vec::new();
        let mut species_rows = Vec::new();

        let matrix = match MatrixBuilder::build(records.iter().copied(), WeightField::Weight) {
            Ok(matrix) => matrix,
            Err(err) => {
                transition(&mut state, ItemState::BuildFailed, key, &mut log);
                log.warn(Some(key), format!("matrix build failed: {}", err));
                for &index in &self.config.network_indices {
                    network_rows.push(NetworkMetricRow::new(
                        key,
                        index,
                        &Err(UnavailableReason::BuildFailed.into()),
                    ));
                }
                for &index in &self.config.species_indices {
                    species_rows.push(SpeciesMetricRow::build_failed(key, index));
                }
                return ItemResult {
                    key: key.clone(),
                    state,
                    matrix: None,
                    raw_matrix: None,
                    build_error: Some(err),
                    network_rows,
                    species_rows,
                    log,
                };
            }
        };
        transition(&mut state, ItemState::MatrixBuilt, key, &mut log);

        let mut partial = false;

        for (index, outcome) in network_level(&matrix, &self.config.network_indices) {
            if let Err(issue) = &outcome {
                partial = true;
                record_issue(&mut log, key, index.name(), issue);
            }
            network_rows.push(NetworkMetricRow::new(key, index, &outcome));
        }

        if !self.config.species_indices.is_empty() {
            if self.config.species_indices.contains(&SpeciesIndex::DPrime)
                && self.config.integer_policy == IntegerPolicy::Round
                && !matrix.is_degenerate()
                && !matrix.all_integral()
            {
                log.warn(Some(key), "fractional weights rounded for d'");
            }

            let per_species =
                species_level(&matrix, &self.config.species_indices, self.config.integer_policy);
            for (entity, indices) in per_species {
                for (index, outcome) in indices {
                    if let Err(issue) = &outcome {
                        partial = true;
                        let label = format!("{} for {}", index.name(), entity);
                        record_issue(&mut log, key, &label, issue);
                    }
                    species_rows.push(SpeciesMetricRow::new(key, &entity, index, &outcome));
                }
            }
        }

        transition(&mut state, ItemState::MetricsComputed { partial }, key, &mut log);

        let raw_matrix = MatrixBuilder::build(records.iter().copied(), WeightField::RawCount);

        ItemResult {
            key: key.clone(),
            state,
            matrix: Some(matrix),
            raw_matrix: Some(raw_matrix),
            build_error: None,
            network_rows,
            species_rows,
            log,
        }
    }

    /// Dissimilarity and completeness for one replicate × method
    ///
    /// Only invoked on the engines when both periods have a matrix; otherwise
    /// every row is emitted as Unavailable.
    fn process_pair(&self, pre: &ItemResult, post: &ItemResult) -> PairResult {
        let mut log = BatchLog::new();
        let replicate = &pre.key.replicate;
        let method = pre.key.sampling_method;
        let index = self.config.dissimilarity_index;

        let (before, after) = match (&pre.matrix, &post.matrix) {
            (Some(before), Some(after)) => (before, after),
            _ => {
                let missing = if pre.matrix.is_none() { Period::Pre } else { Period::Post };
                log.warn(
                    Some(&pre.key),
                    format!(
                        "skipping dissimilarity and completeness: no valid {} matrix",
                        missing
                    ),
                );
                let dissimilarity_rows = self
                    .config
                    .binary_variants
                    .iter()
                    .map(|&binary| {
                        DissimilarityRow::new(
                            replicate,
                            method,
                            binary,
                            index,
                            &Err(UnavailableReason::MissingPeriod.into()),
                        )
                    })
                    .collect();
                let completeness_rows = [pre, post]
                    .iter()
                    .map(|item| {
                        let reason = if item.matrix.is_some() {
                            UnavailableReason::MissingPeriod
                        } else {
                            UnavailableReason::BuildFailed
                        };
                        CompletenessRow::new(&item.key, &Err(reason.into()))
                    })
                    .collect();
                return PairResult {
                    dissimilarity_rows,
                    completeness_rows,
                    log,
                };
            }
        };

        let mut dissimilarity_rows = Vec::with_capacity(self.config.binary_variants.len());
        for &binary in &self.config.binary_variants {
            let outcome = compare(before, after, binary, index);
            let label = if binary { "binary" } else { "weighted" };
            match &outcome {
                Ok(d) => {
                    if !d.is_additive(self.config.additivity_tolerance) {
                        log.error(
                            Some(&pre.key),
                            format!(
                                "{} dissimilarity not additive: relative |WN - (ST + OS)| = {:e}",
                                label,
                                d.additivity_error()
                            ),
                        );
                    }
                    if d.os.is_none() {
                        log.warn(
                            Some(&pre.key),
                            format!(
                                "{} rewiring undefined: {}",
                                label,
                                UnavailableReason::NoSharedSpecies
                            ),
                        );
                    }
                }
                Err(issue) => {
                    record_issue(&mut log, &pre.key, &format!("{} dissimilarity", label), issue)
                }
            }
            dissimilarity_rows.push(DissimilarityRow::new(replicate, method, binary, index, &outcome));
        }

        let mut completeness_rows = Vec::with_capacity(2);
        for item in [pre, post] {
            let outcome = match &item.raw_matrix {
                Some(Ok(raw)) => estimate(raw),
                Some(Err(err)) => Err(MetricIssue::Failed(err.clone())),
                None => Err(UnavailableReason::BuildFailed.into()),
            };
            if let Err(issue) = &outcome {
                record_issue(&mut log, &item.key, "completeness", issue);
            }
            completeness_rows.push(CompletenessRow::new(&item.key, &outcome));
        }

        PairResult {
            dissimilarity_rows,
            completeness_rows,
            log,
        }
    }

    /// Merge item and pair results in order and run the pairing check
    fn assemble(&self, results: Vec<ItemResult>, pairs: Vec<PairResult>) -> BatchReport {
        let mut report = BatchReport::default();
        let n_items = results.len();
        let n_pairs = pairs.len();
        let mut n_failed = 0;
        let mut n_partial = 0;

        for mut item in results {
            if item.state != ItemState::BuildFailed {
                let partial = item.state.is_partial();
                transition(&mut item.state, ItemState::Exported { partial }, &item.key, &mut item.log);
            }
            if item.state == ItemState::BuildFailed {
                n_failed += 1;
            } else if item.state.is_partial() {
                n_partial += 1;
            }
            report.items.push(ItemRow::new(&item));
            report.network_metrics.extend(item.network_rows);
            report.species_metrics.extend(item.species_rows);
            report.log.merge(item.log);
        }

        for pair in pairs {
            report.dissimilarity.extend(pair.dissimilarity_rows);
            report.completeness.extend(pair.completeness_rows);
            report.log.merge(pair.log);
        }

        flag_unpaired(&mut report.network_metrics);
        flag_unpaired(&mut report.species_metrics);
        flag_unpaired(&mut report.completeness);

        report.log.info(
            None,
            format!(
                "batch complete: {} items, {} build failures, {} partial, {} period pairs",
                n_items,
                n_failed,
                n_partial,
                n_pairs
            ),
        );
        report
    }
}

/// Records grouped by work key, in input order within each group
fn group_records(records: &[InteractionRecord]) -> FxHashMap<WorkKey, Vec<&InteractionRecord>> {
    let mut groups: FxHashMap<WorkKey, Vec<&InteractionRecord>> = FxHashMap::default();
    for record in records {
        groups.entry(record.key()).or_default().push(record);
    }
    groups
}

/// (pre, post) result indices for every replicate × method
///
/// `plan` emits the two periods of a pair next to each other.
fn pair_slots(results: &[ItemResult]) -> Vec<(usize, usize)> {
    results
        .chunks_exact(2)
        .enumerate()
        .filter(|(_, chunk)| {
            chunk[0].key.period == Period::Pre
                && chunk[1].key.period == Period::Post
                && chunk[0].key.replicate == chunk[1].key.replicate
                && chunk[0].key.sampling_method == chunk[1].key.sampling_method
        })
        .map(|(i, _)| (2 * i, 2 * i + 1))
        .collect()
}

fn transition(state: &mut ItemState, next: ItemState, key: &WorkKey, log: &mut BatchLog) {
    if let Err((from, to)) = state.advance(next) {
        log.error(
            Some(key),
            format!("illegal item transition {} -> {}", from.name(), to.name()),
        );
    }
}

fn record_issue(log: &mut BatchLog, key: &WorkKey, metric: &str, issue: &MetricIssue) {
    match issue {
        MetricIssue::Unavailable(reason) => {
            log.warn(Some(key), format!("{} unavailable: {}", metric, reason))
        }
        MetricIssue::Failed(err) => log.error(Some(key), format!("{} failed: {}", metric, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogLevel;

    fn record(
        year: i32,
        period: Period,
        method: SamplingMethod,
        row: &str,
        column: &str,
        weight: f64,
    ) -> InteractionRecord {
        InteractionRecord {
            replicate: ReplicateId::new(year, "P1"),
            period,
            sampling_method: method,
            row_entity: row.into(),
            column_entity: column.into(),
            weight,
            raw_count: weight.round(),
        }
    }

    fn square(year: i32, period: Period) -> Vec<InteractionRecord> {
        vec![
            record(year, period, SamplingMethod::Camera, "a", "x", 3.0),
            record(year, period, SamplingMethod::Camera, "a", "y", 1.0),
            record(year, period, SamplingMethod::Camera, "b", "y", 2.0),
        ]
    }

    fn camera_only() -> NetworkConfig {
        NetworkConfig {
            sampling_methods: vec![SamplingMethod::Camera],
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut state = ItemState::Pending;
        assert!(state.advance(ItemState::MatrixBuilt).is_ok());
        assert!(state.advance(ItemState::Exported { partial: false }).is_err());
        assert!(state.advance(ItemState::MetricsComputed { partial: true }).is_ok());
        assert!(state.advance(ItemState::Exported { partial: true }).is_ok());
        assert!(state.is_partial());

        let mut failed = ItemState::Pending;
        failed.advance(ItemState::BuildFailed).unwrap();
        assert!(failed.advance(ItemState::MetricsComputed { partial: false }).is_err());
        assert_eq!(failed, ItemState::BuildFailed);
    }

    #[test]
    fn test_plan_enumerates_every_method_and_period() {
        let records = vec![
            record(2018, Period::Pre, SamplingMethod::Camera, "a", "x", 1.0),
            record(2017, Period::Post, SamplingMethod::Pollen, "a", "x", 1.0),
        ];
        let keys = BatchOrchestrator::new(NetworkConfig::default()).plan(&records);

        assert_eq!(keys.len(), 8);
        assert_eq!(keys[0].replicate.year, 2017);
        assert_eq!(keys[0].sampling_method, SamplingMethod::Pollen);
        assert_eq!(keys[0].period, Period::Pre);
        assert_eq!(keys[1].period, Period::Post);
        assert_eq!(keys[7].replicate.year, 2018);
    }

    #[test]
    fn test_missing_period_is_isolated() {
        let records = square(2017, Period::Pre);
        let report = BatchOrchestrator::new(camera_only()).run(&records);

        assert_eq!(report.items.len(), 2);
        assert_eq!(report.items[0].state, ItemState::Exported { partial: false });
        assert_eq!(report.items[1].state, ItemState::BuildFailed);

        assert!(report
            .dissimilarity
            .iter()
            .all(|row| row.unavailable_reason.as_deref() == Some("missing paired period")));
        assert_eq!(
            report.completeness[0].unavailable_reason.as_deref(),
            Some("missing paired period")
        );
        assert_eq!(
            report.completeness[1].unavailable_reason.as_deref(),
            Some("matrix build failed")
        );

        let failed_species: Vec<_> = report
            .species_metrics
            .iter()
            .filter(|row| row.key.period == Period::Post)
            .collect();
        assert_eq!(failed_species.len(), 2);
        assert!(failed_species.iter().all(|row| row.entity.is_none()
            && row.value.unavailable_reason.as_deref() == Some("matrix build failed")));

        let h2 = &report.network_metrics[0];
        assert!(h2.value.value.is_some());
        assert!(h2.unpaired);
        assert!(report.log.count(LogLevel::Warn) >= 2);
    }

    #[test]
    fn test_paired_replicate_gets_cross_period_rows() {
        let mut records = square(2017, Period::Pre);
        records.extend(square(2017, Period::Post));
        let report = BatchOrchestrator::new(camera_only()).run(&records);

        assert_eq!(report.dissimilarity.len(), 2);
        for row in &report.dissimilarity {
            assert_eq!(row.wn, Some(0.0));
            assert_eq!(row.unavailable_reason, None);
        }
        assert_eq!(report.completeness.len(), 2);
        assert_eq!(report.completeness[0].key.period, Period::Pre);
        assert!(report.completeness[0].observed_richness.is_some());
        assert!(report.network_metrics.iter().all(|row| !row.unpaired));
    }

    #[test]
    fn test_rounding_is_logged() {
        let mut records = square(2017, Period::Pre);
        records[0].weight = 2.5;
        let report = BatchOrchestrator::new(camera_only()).run(&records);
        assert!(report
            .log
            .entries()
            .iter()
            .any(|e| e.message.contains("rounded for d'")));
    }
}
