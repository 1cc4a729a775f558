//! Output Tables
//!
//! Typed rows for each result table, the replicate pairing check, and
//! conversion to Polars DataFrames for CSV export. Unavailable values are
//! nulls in the value columns plus a text tag in `unavailable_reason`.

use anyhow::{Context, Result};
use polars::prelude::*;
use rustc_hash::FxHashMap;
use serde::Serialize;
use smallvec::SmallVec;
use std::fs::{self, File};
use std::path::Path;

use crate::batch::{ItemResult, ItemState};
use crate::log::BatchLog;
use crate::metrics::{
    Completeness, Dissimilarity, DissimilarityIndex, MetricOutcome, NetworkIndex, SpeciesIndex,
    UnavailableReason,
};
use crate::records::{Period, ReplicateId, SamplingMethod, WorkKey};

/// A scalar metric result flattened for export
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricValue {
    pub value: Option<f64>,
    pub unavailable_reason: Option<String>,
}

impl MetricValue {
    pub fn from_outcome(outcome: &MetricOutcome<f64>) -> Self {
        match outcome {
            Ok(value) => Self {
                value: Some(*value),
                unavailable_reason: None,
            },
            Err(issue) => Self {
                value: None,
                unavailable_reason: Some(issue.reason_tag()),
            },
        }
    }

    pub fn is_defined(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemRow {
    pub key: WorkKey,
    pub state: ItemState,
    pub n_rows: Option<usize>,
    pub n_columns: Option<usize>,
    pub n_links: Option<usize>,
    pub build_error: Option<String>,
}

impl ItemRow {
    pub fn new(item: &ItemResult) -> Self {
        Self {
            key: item.key.clone(),
            state: item.state,
            n_rows: item.matrix.as_ref().map(|m| m.n_rows()),
            n_columns: item.matrix.as_ref().map(|m| m.n_columns()),
            n_links: item.matrix.as_ref().map(|m| m.n_links()),
            build_error: item.build_error.as_ref().map(|e| e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkMetricRow {
    pub key: WorkKey,
    pub metric: NetworkIndex,
    #[serde(flatten)]
    pub value: MetricValue,
    pub unpaired: bool,
}

impl NetworkMetricRow {
    pub fn new(key: &WorkKey, metric: NetworkIndex, outcome: &MetricOutcome<f64>) -> Self {
        Self {
            key: key.clone(),
            metric,
            value: MetricValue::from_outcome(outcome),
            unpaired: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeciesMetricRow {
    pub key: WorkKey,
    /// Hummingbird species; None when the matrix never built
    pub entity: Option<String>,
    pub metric: SpeciesIndex,
    #[serde(flatten)]
    pub value: MetricValue,
    pub unpaired: bool,
}

impl SpeciesMetricRow {
    pub fn new(key: &WorkKey, entity: &str, metric: SpeciesIndex, outcome: &MetricOutcome<f64>) -> Self {
        Self {
            key: key.clone(),
            entity: Some(entity.to_string()),
            metric,
            value: MetricValue::from_outcome(outcome),
            unpaired: false,
        }
    }

    /// Placeholder row for an item whose matrix failed to build
    pub fn build_failed(key: &WorkKey, metric: SpeciesIndex) -> Self {
        Self {
            key: key.clone(),
            entity: None,
            metric,
            value: MetricValue::from_outcome(&Err(UnavailableReason::BuildFailed.into())),
            unpaired: false,
        }
    }
}

/// Pre vs post turnover for one replicate × method × weighting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DissimilarityRow {
    pub replicate: ReplicateId,
    pub sampling_method: SamplingMethod,
    pub binary: bool,
    pub index: DissimilarityIndex,
    pub wn: Option<f64>,
    pub st: Option<f64>,
    pub os: Option<f64>,
    pub st_lost: Option<f64>,
    pub st_gained: Option<f64>,
    pub os_lost: Option<f64>,
    pub os_gained: Option<f64>,
    /// Set when WN/ST are defined but OS is not
    pub os_reason: Option<String>,
    pub unavailable_reason: Option<String>,
}

impl DissimilarityRow {
    pub fn new(
        replicate: &ReplicateId,
        sampling_method: SamplingMethod,
        binary: bool,
        index: DissimilarityIndex,
        outcome: &MetricOutcome<Dissimilarity>,
    ) -> Self {
        let mut row = Self {
            replicate: replicate.clone(),
            sampling_method,
            binary,
            index,
            wn: None,
            st: None,
            os: None,
            st_lost: None,
            st_gained: None,
            os_lost: None,
            os_gained: None,
            os_reason: None,
            unavailable_reason: None,
        };
        match outcome {
            Ok(d) => {
                row.wn = Some(d.wn);
                row.st = Some(d.st);
                row.os = d.os;
                row.st_lost = Some(d.st_lost);
                row.st_gained = Some(d.st_gained);
                row.os_lost = d.os_lost;
                row.os_gained = d.os_gained;
                if d.os.is_none() {
                    row.os_reason = Some(UnavailableReason::NoSharedSpecies.tag().to_string());
                }
            }
            Err(issue) => row.unavailable_reason = Some(issue.reason_tag()),
        }
        row
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletenessRow {
    pub key: WorkKey,
    pub observed_richness: Option<usize>,
    pub estimated_richness: Option<f64>,
    pub completeness_ratio: Option<f64>,
    pub singletons: Option<usize>,
    pub doubletons: Option<usize>,
    pub unavailable_reason: Option<String>,
    pub unpaired: bool,
}

impl CompletenessRow {
    pub fn new(key: &WorkKey, outcome: &MetricOutcome<Completeness>) -> Self {
        match outcome {
            Ok(c) => Self {
                key: key.clone(),
                observed_richness: Some(c.observed_richness),
                estimated_richness: Some(c.estimated_richness),
                completeness_ratio: Some(c.completeness_ratio),
                singletons: Some(c.singletons),
                doubletons: Some(c.doubletons),
                unavailable_reason: None,
                unpaired: false,
            },
            Err(issue) => Self {
                key: key.clone(),
                observed_richness: None,
                estimated_richness: None,
                completeness_ratio: None,
                singletons: None,
                doubletons: None,
                unavailable_reason: Some(issue.reason_tag()),
                unpaired: false,
            },
        }
    }
}

/// Grouping key for the pairing check: replicate, method, metric, entity
type PairingKey = (ReplicateId, SamplingMethod, &'static str, Option<String>);

/// Rows that take part in the pre/post pairing check
pub trait PairedRow {
    fn pairing_key(&self) -> PairingKey;
    fn period(&self) -> Period;
    fn is_defined(&self) -> bool;
    fn set_unpaired(&mut self, unpaired: bool);
}

impl PairedRow for NetworkMetricRow {
    fn pairing_key(&self) -> PairingKey {
        (
            self.key.replicate.clone(),
            self.key.sampling_method,
            self.metric.name(),
            None,
        )
    }
    fn period(&self) -> Period {
        self.key.period
    }
    fn is_defined(&self) -> bool {
        self.value.is_defined()
    }
    fn set_unpaired(&mut self, unpaired: bool) {
        self.unpaired = unpaired;
    }
}

impl PairedRow for SpeciesMetricRow {
    fn pairing_key(&self) -> PairingKey {
        (
            self.key.replicate.clone(),
            self.key.sampling_method,
            self.metric.name(),
            self.entity.clone(),
        )
    }
    fn period(&self) -> Period {
        self.key.period
    }
    fn is_defined(&self) -> bool {
        self.value.is_defined()
    }
    fn set_unpaired(&mut self, unpaired: bool) {
        self.unpaired = unpaired;
    }
}

impl PairedRow for CompletenessRow {
    fn pairing_key(&self) -> PairingKey {
        (
            self.key.replicate.clone(),
            self.key.sampling_method,
            "completeness",
            None,
        )
    }
    fn period(&self) -> Period {
        self.key.period
    }
    fn is_defined(&self) -> bool {
        self.completeness_ratio.is_some()
    }
    fn set_unpaired(&mut self, unpaired: bool) {
        self.unpaired = unpaired;
    }
}

/// Flag every row of a group where exactly one period has a defined value
///
/// Groups with zero or two defined periods are left `unpaired = false`.
pub fn flag_unpaired<R: PairedRow>(rows: &mut [R]) {
    let mut defined: FxHashMap<PairingKey, SmallVec<[Period; 2]>> = FxHashMap::default();
    for row in rows.iter() {
        let periods = defined.entry(row.pairing_key()).or_default();
        if row.is_defined() && !periods.contains(&row.period()) {
            periods.push(row.period());
        }
    }
    for row in rows.iter_mut() {
        let unpaired = defined
            .get(&row.pairing_key())
            .map_or(false, |periods| periods.len() == 1);
        row.set_unpaired(unpaired);
    }
}

/// All tables produced by one batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub items: Vec<ItemRow>,
    pub network_metrics: Vec<NetworkMetricRow>,
    pub species_metrics: Vec<SpeciesMetricRow>,
    pub dissimilarity: Vec<DissimilarityRow>,
    pub completeness: Vec<CompletenessRow>,
    pub log: BatchLog,
}

impl BatchReport {
    pub fn items_frame(&self) -> Result<DataFrame> {
        let rows = &self.items;
        let df = df! {
            "year" => rows.iter().map(|r| r.key.replicate.year).collect::<Vec<_>>(),
            "patch" => rows.iter().map(|r| r.key.replicate.patch.as_str()).collect::<Vec<_>>(),
            "sampling_method" => rows.iter().map(|r| r.key.sampling_method.as_str()).collect::<Vec<_>>(),
            "period" => rows.iter().map(|r| r.key.period.as_str()).collect::<Vec<_>>(),
            "state" => rows.iter().map(|r| r.state.name()).collect::<Vec<_>>(),
            "partial" => rows.iter().map(|r| r.state.is_partial()).collect::<Vec<_>>(),
            "n_rows" => rows.iter().map(|r| r.n_rows.map(|n| n as u32)).collect::<Vec<_>>(),
            "n_columns" => rows.iter().map(|r| r.n_columns.map(|n| n as u32)).collect::<Vec<_>>(),
            "n_links" => rows.iter().map(|r| r.n_links.map(|n| n as u32)).collect::<Vec<_>>(),
            "build_error" => rows.iter().map(|r| r.build_error.clone()).collect::<Vec<_>>(),
        }?;
        Ok(df)
    }

    pub fn network_frame(&self) -> Result<DataFrame> {
        let rows = &self.network_metrics;
        let df = df! {
            "year" => rows.iter().map(|r| r.key.replicate.year).collect::<Vec<_>>(),
            "patch" => rows.iter().map(|r| r.key.replicate.patch.as_str()).collect::<Vec<_>>(),
            "sampling_method" => rows.iter().map(|r| r.key.sampling_method.as_str()).collect::<Vec<_>>(),
            "period" => rows.iter().map(|r| r.key.period.as_str()).collect::<Vec<_>>(),
            "metric" => rows.iter().map(|r| r.metric.name()).collect::<Vec<_>>(),
            "value" => rows.iter().map(|r| r.value.value).collect::<Vec<_>>(),
            "unavailable_reason" => rows.iter().map(|r| r.value.unavailable_reason.clone()).collect::<Vec<_>>(),
            "unpaired" => rows.iter().map(|r| r.unpaired).collect::<Vec<_>>(),
        }?;
        Ok(df)
    }

    pub fn species_frame(&self) -> Result<DataFrame> {
        let rows = &self.species_metrics;
        let df = df! {
            "year" => rows.iter().map(|r| r.key.replicate.year).collect::<Vec<_>>(),
            "patch" => rows.iter().map(|r| r.key.replicate.patch.as_str()).collect::<Vec<_>>(),
            "sampling_method" => rows.iter().map(|r| r.key.sampling_method.as_str()).collect::<Vec<_>>(),
            "period" => rows.iter().map(|r| r.key.period.as_str()).collect::<Vec<_>>(),
            "entity" => rows.iter().map(|r| r.entity.as_deref()).collect::<Vec<_>>(),
            "metric" => rows.iter().map(|r| r.metric.name()).collect::<Vec<_>>(),
            "value" => rows.iter().map(|r| r.value.value).collect::<Vec<_>>(),
            "unavailable_reason" => rows.iter().map(|r| r.value.unavailable_reason.clone()).collect::<Vec<_>>(),
            "unpaired" => rows.iter().map(|r| r.unpaired).collect::<Vec<_>>(),
        }?;
        Ok(df)
    }

    pub fn dissimilarity_frame(&self) -> Result<DataFrame> {
        let rows = &self.dissimilarity;
        let df = df! {
            "year" => rows.iter().map(|r| r.replicate.year).collect::<Vec<_>>(),
            "patch" => rows.iter().map(|r| r.replicate.patch.as_str()).collect::<Vec<_>>(),
            "sampling_method" => rows.iter().map(|r| r.sampling_method.as_str()).collect::<Vec<_>>(),
            "binary" => rows.iter().map(|r| r.binary).collect::<Vec<_>>(),
            "index" => rows.iter().map(|r| r.index.name()).collect::<Vec<_>>(),
            "WN" => rows.iter().map(|r| r.wn).collect::<Vec<_>>(),
            "ST" => rows.iter().map(|r| r.st).collect::<Vec<_>>(),
            "OS" => rows.iter().map(|r| r.os).collect::<Vec<_>>(),
            "ST_lost" => rows.iter().map(|r| r.st_lost).collect::<Vec<_>>(),
            "ST_gained" => rows.iter().map(|r| r.st_gained).collect::<Vec<_>>(),
            "OS_lost" => rows.iter().map(|r| r.os_lost).collect::<Vec<_>>(),
            "OS_gained" => rows.iter().map(|r| r.os_gained).collect::<Vec<_>>(),
            "os_reason" => rows.iter().map(|r| r.os_reason.clone()).collect::<Vec<_>>(),
            "unavailable_reason" => rows.iter().map(|r| r.unavailable_reason.clone()).collect::<Vec<_>>(),
        }?;
        Ok(df)
    }

    pub fn completeness_frame(&self) -> Result<DataFrame> {
        let rows = &self.completeness;
        let df = df! {
            "year" => rows.iter().map(|r| r.key.replicate.year).collect::<Vec<_>>(),
            "patch" => rows.iter().map(|r| r.key.replicate.patch.as_str()).collect::<Vec<_>>(),
            "sampling_method" => rows.iter().map(|r| r.key.sampling_method.as_str()).collect::<Vec<_>>(),
            "period" => rows.iter().map(|r| r.key.period.as_str()).collect::<Vec<_>>(),
            "observed_richness" => rows.iter().map(|r| r.observed_richness.map(|n| n as u32)).collect::<Vec<_>>(),
            "estimated_richness" => rows.iter().map(|r| r.estimated_richness).collect::<Vec<_>>(),
            "completeness_ratio" => rows.iter().map(|r| r.completeness_ratio).collect::<Vec<_>>(),
            "singletons" => rows.iter().map(|r| r.singletons.map(|n| n as u32)).collect::<Vec<_>>(),
            "doubletons" => rows.iter().map(|r| r.doubletons.map(|n| n as u32)).collect::<Vec<_>>(),
            "unavailable_reason" => rows.iter().map(|r| r.unavailable_reason.clone()).collect::<Vec<_>>(),
            "unpaired" => rows.iter().map(|r| r.unpaired).collect::<Vec<_>>(),
        }?;
        Ok(df)
    }

    pub fn log_frame(&self) -> Result<DataFrame> {
        let entries = self.log.entries();
        let df = df! {
            "level" => entries.iter().map(|e| e.level.as_str()).collect::<Vec<_>>(),
            "item" => entries.iter().map(|e| e.item.as_ref().map(|k| k.to_string())).collect::<Vec<_>>(),
            "message" => entries.iter().map(|e| e.message.as_str()).collect::<Vec<_>>(),
        }?;
        Ok(df)
    }

    /// Every table by file stem
    pub fn frames(&self) -> Result<Vec<(&'static str, DataFrame)>> {
        Ok(vec![
            ("items", self.items_frame()?),
            ("network_metrics", self.network_frame()?),
            ("species_metrics", self.species_frame()?),
            ("dissimilarity", self.dissimilarity_frame()?),
            ("completeness", self.completeness_frame()?),
            ("log", self.log_frame()?),
        ])
    }

    /// Write every table as `<dir>/<table>.csv`
    pub fn write_csv(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {:?}", dir))?;

        for (name, mut df) in self.frames()? {
            let path = dir.join(format!("{}.csv", name));
            let mut file = File::create(&path)
                .with_context(|| format!("Failed to create {:?}", path))?;
            CsvWriter::new(&mut file)
                .include_header(true)
                .finish(&mut df)
                .with_context(|| format!("Failed to write {:?}", path))?;
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize batch report")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricIssue;

    fn key(period: Period) -> WorkKey {
        WorkKey {
            replicate: ReplicateId::new(2017, "P1"),
            sampling_method: SamplingMethod::Camera,
            period,
        }
    }

    #[test]
    fn test_pre_only_group_is_unpaired() {
        let mut rows = vec![
            NetworkMetricRow::new(&key(Period::Pre), NetworkIndex::H2, &Ok(0.4)),
            NetworkMetricRow::new(
                &key(Period::Post),
                NetworkIndex::H2,
                &Err(UnavailableReason::TooSmall.into()),
            ),
        ];
        flag_unpaired(&mut rows);
        assert!(rows[0].unpaired);
        assert!(rows[1].unpaired);
    }

    #[test]
    fn test_both_or_neither_defined_is_paired() {
        let mut both = vec![
            NetworkMetricRow::new(&key(Period::Pre), NetworkIndex::H2, &Ok(0.4)),
            NetworkMetricRow::new(&key(Period::Post), NetworkIndex::H2, &Ok(0.6)),
        ];
        flag_unpaired(&mut both);
        assert!(both.iter().all(|r| !r.unpaired));

        let too_small: MetricOutcome<f64> = Err(UnavailableReason::TooSmall.into());
        let mut neither = vec![
            NetworkMetricRow::new(&key(Period::Pre), NetworkIndex::H2, &too_small),
            NetworkMetricRow::new(&key(Period::Post), NetworkIndex::H2, &too_small),
        ];
        flag_unpaired(&mut neither);
        assert!(neither.iter().all(|r| !r.unpaired));
    }

    #[test]
    fn test_species_pairing_is_per_entity() {
        let mut rows = vec![
            SpeciesMetricRow::new(&key(Period::Pre), "Phaethornis", SpeciesIndex::DPrime, &Ok(0.2)),
            SpeciesMetricRow::new(&key(Period::Pre), "Thalurania", SpeciesIndex::DPrime, &Ok(0.1)),
            SpeciesMetricRow::new(&key(Period::Post), "Phaethornis", SpeciesIndex::DPrime, &Ok(0.3)),
        ];
        flag_unpaired(&mut rows);
        assert!(!rows[0].unpaired);
        assert!(rows[1].unpaired);
        assert!(!rows[2].unpaired);
    }

    #[test]
    fn test_build_failed_species_row_leaves_survivor_unpaired() {
        let mut rows = vec![
            SpeciesMetricRow::new(&key(Period::Pre), "Phaethornis", SpeciesIndex::DPrime, &Ok(0.2)),
            SpeciesMetricRow::build_failed(&key(Period::Post), SpeciesIndex::DPrime),
        ];
        flag_unpaired(&mut rows);
        assert!(rows[0].unpaired);
        assert!(!rows[1].unpaired);
        assert_eq!(rows[1].entity, None);

        let report = BatchReport {
            species_metrics: rows,
            ..BatchReport::default()
        };
        let df = report.species_frame().unwrap();
        let entities = df.column("entity").unwrap().str().unwrap();
        assert_eq!(entities.get(1), None);
        let reasons = df.column("unavailable_reason").unwrap().str().unwrap();
        assert_eq!(reasons.get(1), Some("matrix build failed"));
    }

    #[test]
    fn test_network_frame_has_nulls_and_reasons() {
        let report = BatchReport {
            network_metrics: vec![
                NetworkMetricRow::new(&key(Period::Pre), NetworkIndex::H2, &Ok(0.4)),
                NetworkMetricRow::new(
                    &key(Period::Post),
                    NetworkIndex::H2,
                    &Err(MetricIssue::Unavailable(UnavailableReason::TooSmall)),
                ),
            ],
            ..BatchReport::default()
        };
        let df = report.network_frame().unwrap();
        assert_eq!(df.height(), 2);

        let values = df.column("value").unwrap().f64().unwrap();
        assert_eq!(values.get(0), Some(0.4));
        assert_eq!(values.get(1), None);

        let reasons = df.column("unavailable_reason").unwrap().str().unwrap();
        assert_eq!(reasons.get(1), Some("network too small"));
    }

    #[test]
    fn test_dissimilarity_row_without_shared_species() {
        let outcome = Ok(Dissimilarity {
            wn: 1.0,
            st: 1.0,
            os: None,
            st_lost: 0.5,
            st_gained: 0.5,
            os_lost: None,
            os_gained: None,
        });
        let row = DissimilarityRow::new(
            &ReplicateId::new(2017, "P1"),
            SamplingMethod::Pollen,
            true,
            DissimilarityIndex::Sorensen,
            &outcome,
        );
        assert_eq!(row.wn, Some(1.0));
        assert_eq!(row.os, None);
        assert_eq!(row.os_reason.as_deref(), Some("no shared species"));
        assert_eq!(row.unavailable_reason, None);
    }

    #[test]
    fn test_empty_report_frames() {
        let frames = BatchReport::default().frames().unwrap();
        assert_eq!(frames.len(), 6);
        assert!(frames.iter().all(|(_, df)| df.height() == 0));
    }
}
