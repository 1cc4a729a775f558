//! DataFrame materialization helpers with column validation
//!
//! Provides safe, explicit patterns for working with Polars frames so a
//! renamed or missing column in a field sheet surfaces as a clear error
//! instead of a silently empty network.

use anyhow::{bail, Context, Result};
use polars::prelude::*;

/// Select `columns` from `lazy`, failing with the available column names
/// when any is missing
pub fn materialize_with_columns(
    lazy: &LazyFrame,
    columns: &[&str],
    context: &str,
) -> Result<DataFrame> {
    let mut lazy = lazy.clone();
    let schema = lazy
        .collect_schema()
        .with_context(|| format!("{}: Failed to resolve schema", context))?;

    let missing: Vec<&str> = columns
        .iter()
        .copied()
        .filter(|name| !schema.contains(name))
        .collect();
    if !missing.is_empty() {
        let available: Vec<&str> = schema.iter_names().map(|name| name.as_str()).collect();
        bail!(
            "{}: Missing columns {:?}. Available columns: {:?}",
            context,
            missing,
            available
        );
    }

    let exprs: Vec<Expr> = columns.iter().map(|&name| col(name)).collect();
    lazy.select(exprs)
        .collect()
        .with_context(|| format!("{}: Failed to materialize columns {:?}", context, columns))
}

/// Read a column as strings, casting if necessary
pub fn string_column(df: &DataFrame, name: &str, context: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .with_context(|| format!("{}: Missing {} column", context, name))?
        .cast(&DataType::String)
        .with_context(|| format!("{}: Column '{}' is not convertible to string", context, name))?;

    Ok(column
        .str()?
        .into_iter()
        .map(|opt| opt.map(|s| s.to_string()))
        .collect())
}

/// Read a column as f64, casting integer columns
pub fn f64_column(df: &DataFrame, name: &str, context: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .with_context(|| format!("{}: Missing {} column", context, name))?
        .cast(&DataType::Float64)
        .with_context(|| format!("{}: Column '{}' is not numeric", context, name))?;

    Ok(column.f64()?.into_iter().collect())
}

/// Read a column as i64 (years)
pub fn i64_column(df: &DataFrame, name: &str, context: &str) -> Result<Vec<Option<i64>>> {
    let column = df
        .column(name)
        .with_context(|| format!("{}: Missing {} column", context, name))?
        .cast(&DataType::Int64)
        .with_context(|| format!("{}: Column '{}' is not an integer", context, name))?;

    Ok(column.i64()?.into_iter().collect())
}
