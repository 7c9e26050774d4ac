//! Row filtering over numeric columns.
//!
//! Every filter here is built on [`filter_rows`], which walks the selected
//! columns left to right and narrows the frame after each one. Later columns
//! therefore see the statistics of the rows that survived earlier columns:
//! filtering by `[A, B]` is not the same as filtering by `[B, A]` when the
//! predicate looks at the mean or standard deviation.

use polars::prelude::*;
use thiserror::Error;
use tracing::debug;

use crate::stats::{self, Ddof};
use crate::table::{numeric_column, ColumnError, ColumnSelector};

pub const DEFAULT_SIGMA: f64 = 3.0;
pub const DEFAULT_THRESHOLD: f64 = 0.0;
pub const DEFAULT_EDGE_PERCENT: f64 = 0.05;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PredicateError {
    #[error("column mean is zero; relative deviation is undefined")]
    ZeroMean,
}

#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error("{predicate} filter on column '{column}' returned {found} flags for {expected} rows")]
    ShapeMismatch {
        predicate: String,
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("{predicate} filter on column '{column}' failed: {source}")]
    Predicate {
        predicate: String,
        column: String,
        #[source]
        source: PredicateError,
    },
    #[error("range filter needs at least one of `above` or `below`")]
    EmptyRange,
    #[error(transparent)]
    Polars(#[from] PolarsError),
}

/// A pure keep-mask over one column's values.
pub trait ColumnPredicate {
    fn name(&self) -> &'static str;
    fn evaluate(&self, values: &[f64]) -> Result<Vec<bool>, PredicateError>;
}

impl<F> ColumnPredicate for F
where
    F: Fn(&[f64]) -> Vec<bool>,
{
    fn name(&self) -> &'static str {
        "custom"
    }

    fn evaluate(&self, values: &[f64]) -> Result<Vec<bool>, PredicateError> {
        Ok(self(values))
    }
}

/// Keeps values within `sigma` sample standard deviations of the mean.
///
/// With fewer than two finite values the spread is undefined and every
/// finite value is kept.
pub fn three_sigma(values: &[f64], sigma: f64) -> Vec<bool> {
    let Some(avg) = stats::mean(values) else {
        return vec![false; values.len()];
    };
    match stats::std_dev(values, Ddof::Sample) {
        Some(sd) => values
            .iter()
            .map(|value| (value - avg).abs() <= sigma * sd)
            .collect(),
        None => values.iter().map(|value| !value.is_nan()).collect(),
    }
}

pub fn greater_than(values: &[f64], threshold: f64) -> Vec<bool> {
    values.iter().map(|value| *value > threshold).collect()
}

pub fn less_than(values: &[f64], threshold: f64) -> Vec<bool> {
    values.iter().map(|value| *value < threshold).collect()
}

/// Keeps values whose relative deviation from the mean is at most `pct`.
pub fn edge_percent(values: &[f64], pct: f64) -> Result<Vec<bool>, PredicateError> {
    let Some(avg) = stats::mean(values) else {
        return Ok(vec![false; values.len()]);
    };
    if avg == 0.0 {
        return Err(PredicateError::ZeroMean);
    }
    Ok(values
        .iter()
        .map(|value| ((value - avg) / avg).abs() <= pct)
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThreeSigma {
    pub sigma: f64,
}

impl Default for ThreeSigma {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_SIGMA,
        }
    }
}

impl ColumnPredicate for ThreeSigma {
    fn name(&self) -> &'static str {
        "three_sigma"
    }

    fn evaluate(&self, values: &[f64]) -> Result<Vec<bool>, PredicateError> {
        Ok(three_sigma(values, self.sigma))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GreaterThan {
    pub threshold: f64,
}

impl ColumnPredicate for GreaterThan {
    fn name(&self) -> &'static str {
        "greater_than"
    }

    fn evaluate(&self, values: &[f64]) -> Result<Vec<bool>, PredicateError> {
        Ok(greater_than(values, self.threshold))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LessThan {
    pub threshold: f64,
}

impl ColumnPredicate for LessThan {
    fn name(&self) -> &'static str {
        "less_than"
    }

    fn evaluate(&self, values: &[f64]) -> Result<Vec<bool>, PredicateError> {
        Ok(less_than(values, self.threshold))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgePercent {
    pub pct: f64,
}

impl Default for EdgePercent {
    fn default() -> Self {
        Self {
            pct: DEFAULT_EDGE_PERCENT,
        }
    }
}

impl ColumnPredicate for EdgePercent {
    fn name(&self) -> &'static str {
        "edge_percent"
    }

    fn evaluate(&self, values: &[f64]) -> Result<Vec<bool>, PredicateError> {
        edge_percent(values, self.pct)
    }
}

/// Applies `predicate` to each column in order, narrowing the frame after
/// every column. The input frame is left untouched.
pub fn filter_rows<P>(
    df: &DataFrame,
    predicate: &P,
    columns: &[ColumnSelector],
) -> Result<DataFrame, FilterError>
where
    P: ColumnPredicate + ?Sized,
{
    columns
        .iter()
        .try_fold(df.clone(), |current, selector| {
            narrow(current, predicate, selector)
        })
}

fn narrow<P>(
    current: DataFrame,
    predicate: &P,
    selector: &ColumnSelector,
) -> Result<DataFrame, FilterError>
where
    P: ColumnPredicate + ?Sized,
{
    let column = selector.resolve(&current)?;
    let values = numeric_column(&current, &column)?;

    let keep = predicate
        .evaluate(&values)
        .map_err(|source| FilterError::Predicate {
            predicate: predicate.name().to_string(),
            column: column.clone(),
            source,
        })?;

    if keep.len() != values.len() {
        return Err(FilterError::ShapeMismatch {
            predicate: predicate.name().to_string(),
            column,
            expected: values.len(),
            found: keep.len(),
        });
    }

    let mask = BooleanChunked::from_slice("keep".into(), keep.as_slice());
    let narrowed = current.filter(&mask)?;

    debug!(
        predicate = predicate.name(),
        column = %column,
        removed = current.height() - narrowed.height(),
        remaining = narrowed.height(),
        "Filtered column"
    );

    Ok(narrowed)
}

pub fn filter_three_sigma(
    df: &DataFrame,
    columns: &[ColumnSelector],
    sigma: f64,
) -> Result<DataFrame, FilterError> {
    filter_rows(df, &ThreeSigma { sigma }, columns)
}

pub fn filter_greater_than(
    df: &DataFrame,
    columns: &[ColumnSelector],
    threshold: f64,
) -> Result<DataFrame, FilterError> {
    filter_rows(df, &GreaterThan { threshold }, columns)
}

pub fn filter_less_than(
    df: &DataFrame,
    columns: &[ColumnSelector],
    threshold: f64,
) -> Result<DataFrame, FilterError> {
    filter_rows(df, &LessThan { threshold }, columns)
}

pub fn filter_edge_percent(
    df: &DataFrame,
    columns: &[ColumnSelector],
    pct: f64,
) -> Result<DataFrame, FilterError> {
    filter_rows(df, &EdgePercent { pct }, columns)
}

/// Drops rows at or above `above`, then rows at or below `below`.
pub fn filter_range(
    df: &DataFrame,
    columns: &[ColumnSelector],
    above: Option<f64>,
    below: Option<f64>,
) -> Result<DataFrame, FilterError> {
    if above.is_none() && below.is_none() {
        return Err(FilterError::EmptyRange);
    }

    let mut output = df.clone();
    if let Some(limit) = above {
        output = filter_less_than(&output, columns, limit)?;
    }
    if let Some(limit) = below {
        output = filter_greater_than(&output, columns, limit)?;
    }
    Ok(output)
}
