//! Data Loading
//!
//! Reads the filtered interaction table (one row per detection bout or per
//! pre-summed cell) using Polars, sums duplicate cells, and converts the rows
//! into typed [`InteractionRecord`]s.
//!
//! Expected columns:
//! `year, patch, period, sampling_method, row_entity, column_entity, weight, raw_count`

use anyhow::{anyhow, Context, Result};
use polars::prelude::*;
use std::path::Path;

use crate::records::{InteractionRecord, Period, ReplicateId, SamplingMethod};
use crate::utils::{f64_column, i64_column, materialize_with_columns, string_column};

/// Cell identity: rows sharing all of these are summed
const CELL_KEYS: [&str; 6] = [
    "year",
    "patch",
    "period",
    "sampling_method",
    "row_entity",
    "column_entity",
];

const RECORD_COLUMNS: [&str; 8] = [
    "year",
    "patch",
    "period",
    "sampling_method",
    "row_entity",
    "column_entity",
    "weight",
    "raw_count",
];

/// Load, aggregate and convert an interaction CSV
pub fn load_records(path: &Path) -> Result<Vec<InteractionRecord>> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.into()))
        .with_context(|| format!("Failed to create CSV reader: {:?}", path))?
        .finish()
        .with_context(|| format!("Failed to load interaction CSV: {:?}", path))?;

    let records = records_from_frame(&df)?;
    tracing::info!(
        path = ?path,
        rows = df.height(),
        records = records.len(),
        "Loaded interaction records"
    );
    Ok(records)
}

/// Validate columns, sum duplicate cells, and convert to records
pub fn records_from_frame(df: &DataFrame) -> Result<Vec<InteractionRecord>> {
    let lazy = df.clone().lazy();
    let selected = materialize_with_columns(&lazy, &RECORD_COLUMNS, "interaction records")?;
    let aggregated = aggregate_records(normalize_tags(selected.lazy()))?;

    if aggregated.height() < df.height() {
        tracing::info!(
            before = df.height(),
            after = aggregated.height(),
            "Summed duplicate interaction cells"
        );
    }

    frame_to_records(&aggregated)
}

/// Trim and lowercase period/method tags, and map the "video" alias to "camera"
///
/// Runs before aggregation so "PRE", "pre" and "pre " rows land in the same cell.
fn normalize_tags(lazy: LazyFrame) -> LazyFrame {
    let tag = |name: &str| col(name).str().strip_chars(lit(NULL)).str().to_lowercase();
    let method = tag("sampling_method");
    lazy.with_columns([
        tag("period").alias("period"),
        when(method.clone().eq(lit("video")))
            .then(lit("camera"))
            .otherwise(method)
            .alias("sampling_method"),
    ])
}

/// Sum `weight` and `raw_count` over duplicate cells
///
/// Output is sorted by the cell keys so record order never depends on the
/// order rows appear in the file.
pub fn aggregate_records(lazy: LazyFrame) -> Result<DataFrame> {
    let keys: Vec<Expr> = CELL_KEYS.iter().map(|&name| col(name)).collect();

    lazy.group_by(keys)
        .agg([col("weight").sum(), col("raw_count").sum()])
        .sort(CELL_KEYS, SortMultipleOptions::default())
        .collect()
        .context("Failed to aggregate interaction records")
}

fn frame_to_records(df: &DataFrame) -> Result<Vec<InteractionRecord>> {
    const CONTEXT: &str = "interaction records";

    let years = i64_column(df, "year", CONTEXT)?;
    let patches = string_column(df, "patch", CONTEXT)?;
    let periods = string_column(df, "period", CONTEXT)?;
    let methods = string_column(df, "sampling_method", CONTEXT)?;
    let rows = string_column(df, "row_entity", CONTEXT)?;
    let columns = string_column(df, "column_entity", CONTEXT)?;
    let weights = f64_column(df, "weight", CONTEXT)?;
    let raw_counts = f64_column(df, "raw_count", CONTEXT)?;

    let mut records = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let missing = |name: &str| anyhow!("{}: row {} has no {}", CONTEXT, idx, name);

        let year = years[idx].ok_or_else(|| missing("year"))?;
        let year = i32::try_from(year)
            .with_context(|| format!("{}: row {} year {} out of range", CONTEXT, idx, year))?;

        let period_tag = periods[idx].as_deref().ok_or_else(|| missing("period"))?;
        let period = Period::parse(period_tag)
            .ok_or_else(|| anyhow!("{}: row {} unknown period '{}'", CONTEXT, idx, period_tag))?;

        let method_tag = methods[idx].as_deref().ok_or_else(|| missing("sampling_method"))?;
        let sampling_method = SamplingMethod::parse(method_tag).ok_or_else(|| {
            anyhow!("{}: row {} unknown sampling method '{}'", CONTEXT, idx, method_tag)
        })?;

        records.push(InteractionRecord {
            replicate: ReplicateId::new(year, patches[idx].clone().ok_or_else(|| missing("patch"))?),
            period,
            sampling_method,
            row_entity: rows[idx].clone().ok_or_else(|| missing("row_entity"))?,
            column_entity: columns[idx].clone().ok_or_else(|| missing("column_entity"))?,
            weight: weights[idx].ok_or_else(|| missing("weight"))?,
            raw_count: raw_counts[idx].ok_or_else(|| missing("raw_count"))?,
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> DataFrame {
        df! {
            "year" => [2017i64, 2017, 2017, 2017, 2018],
            "patch" => ["P1", "P1", "P1", "P1", "P2"],
            "period" => ["pre", "pre", "PRE", "pre ", "post"],
            "sampling_method" => ["camera", "camera", "Camera", " camera", "video"],
            "row_entity" => ["Heliconia", "Heliconia", "Heliconia", "Heliconia", "Heliconia"],
            "column_entity" => ["Phaethornis", "Phaethornis", "Phaethornis", "Phaethornis", "Thalurania"],
            "weight" => [1.5, 0.5, 3.0, 2.0, 2.0],
            "raw_count" => [1.0, 1.0, 3.0, 2.0, 2.0],
        }
        .unwrap()
    }

    #[test]
    fn test_duplicate_cells_are_summed() {
        let records = records_from_frame(&sample_frame()).unwrap();
        assert_eq!(records.len(), 2);

        // "pre"/"PRE"/"pre " and "camera"/"Camera"/" camera" rows are one cell
        let summed = &records[0];
        assert_eq!(summed.replicate, ReplicateId::new(2017, "P1"));
        assert_eq!(summed.period, Period::Pre);
        assert_eq!(summed.weight, 7.0);
        assert_eq!(summed.raw_count, 7.0);
    }

    #[test]
    fn test_video_alias_maps_to_camera() {
        let records = records_from_frame(&sample_frame()).unwrap();
        let later = &records[1];
        assert_eq!(later.replicate, ReplicateId::new(2018, "P2"));
        assert_eq!(later.sampling_method, SamplingMethod::Camera);
        assert_eq!(later.column_entity, "Thalurania");
    }

    #[test]
    fn test_missing_column_is_reported() {
        let df = sample_frame().drop("raw_count").unwrap();
        let err = records_from_frame(&df).unwrap_err();
        assert!(format!("{:#}", err).contains("interaction records"));
    }

    #[test]
    fn test_unknown_period_fails() {
        let mut df = sample_frame();
        df.replace("period", Series::new("period".into(), ["pre", "pre", "pre", "pre", "during"]))
            .unwrap();
        let err = records_from_frame(&df).unwrap_err();
        assert!(err.to_string().contains("unknown period 'during'"));
    }
}
