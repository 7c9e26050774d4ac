use std::fmt;

use polars::prelude::*;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Addresses a column by name, by its position in the frame's current column
/// order, or by a case-insensitive name prefix (first match wins).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnSelector {
    Index(usize),
    Name(String),
    Prefix { prefix: String },
}

impl ColumnSelector {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        ColumnSelector::Prefix {
            prefix: prefix.into(),
        }
    }

    /// Resolves the selector against `df` and returns the column name.
    pub fn resolve(&self, df: &DataFrame) -> Result<String, ColumnError> {
        let resolved = match self {
            ColumnSelector::Name(name) => df.get_column_index(name).map(|_| name.clone()),
            ColumnSelector::Index(idx) => df
                .get_columns()
                .get(*idx)
                .map(|column| column.name().to_string()),
            ColumnSelector::Prefix { prefix } => {
                let pattern = RegexBuilder::new(&format!("^{}", regex::escape(prefix)))
                    .case_insensitive(true)
                    .build()?;
                df.get_column_names()
                    .into_iter()
                    .find(|name| pattern.is_match(name.as_str()))
                    .map(|name| name.to_string())
            }
        };

        resolved.ok_or_else(|| ColumnError::InvalidColumn {
            selector: self.clone(),
            available: df
                .get_column_names()
                .iter()
                .map(|name| name.to_string())
                .collect(),
        })
    }
}

impl fmt::Display for ColumnSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSelector::Name(name) => write!(f, "'{name}'"),
            ColumnSelector::Index(idx) => write!(f, "#{idx}"),
            ColumnSelector::Prefix { prefix } => write!(f, "'{prefix}*'"),
        }
    }
}

impl From<&str> for ColumnSelector {
    fn from(value: &str) -> Self {
        ColumnSelector::Name(value.to_string())
    }
}

impl From<String> for ColumnSelector {
    fn from(value: String) -> Self {
        ColumnSelector::Name(value)
    }
}

impl From<usize> for ColumnSelector {
    fn from(value: usize) -> Self {
        ColumnSelector::Index(value)
    }
}

#[derive(Debug, Error)]
pub enum ColumnError {
    #[error("column {selector} not found; available columns: {available:?}")]
    InvalidColumn {
        selector: ColumnSelector,
        available: Vec<String>,
    },
    #[error("column '{column}' has non-numeric type {dtype}")]
    NonNumericColumn { column: String, dtype: String },
    #[error("invalid column prefix: {0}")]
    Prefix(#[from] regex::Error),
    #[error(transparent)]
    Polars(#[from] PolarsError),
}

/// Measurement step a table came from; decides which parameter is trimmed
/// when none is named explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestStep {
    /// Per-resonator maps, trimmed on the `ResFreq*` column.
    ResonatorMap,
    /// Whole-wafer maps, trimmed on the `CF*` column.
    WaferMap,
}

impl TestStep {
    pub fn target_prefix(self) -> &'static str {
        match self {
            TestStep::ResonatorMap => "ResFreq",
            TestStep::WaferMap => "CF",
        }
    }

    pub fn target_selector(self) -> ColumnSelector {
        ColumnSelector::prefix(self.target_prefix())
    }
}

/// Finds the trim parameter column: the first column starting with
/// `explicit` when given, otherwise the step's standard prefix.
pub fn resolve_target_param(
    df: &DataFrame,
    step: TestStep,
    explicit: Option<&str>,
) -> Result<String, ColumnError> {
    let selector = match explicit {
        Some(prefix) => ColumnSelector::prefix(prefix),
        None => step.target_selector(),
    };
    let column = selector.resolve(df)?;
    info!(column = %column, step = ?step, "Resolved target parameter");
    Ok(column)
}

/// Reads `column` as `f64` values. Nulls come back as `NaN`.
pub fn numeric_column(df: &DataFrame, column: &str) -> Result<Vec<f64>, ColumnError> {
    let source = df.column(column)?;
    let series = source
        .as_materialized_series()
        .strict_cast(&DataType::Float64)
        .map_err(|_| ColumnError::NonNumericColumn {
            column: column.to_string(),
            dtype: source.dtype().to_string(),
        })?;

    Ok(series
        .f64()?
        .iter()
        .map(|value| value.unwrap_or(f64::NAN))
        .collect())
}

/// Inclusive clip range for one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundPair {
    pub lower: f64,
    pub upper: f64,
}

impl BoundPair {
    pub const UNBOUNDED: BoundPair = BoundPair {
        lower: f64::NEG_INFINITY,
        upper: f64::INFINITY,
    };

    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Clamps `value` into the range. The upper bound wins when the range is
    /// inverted; `NaN` passes through.
    pub fn clip(&self, value: f64) -> f64 {
        if value.is_nan() {
            return value;
        }
        value.max(self.lower).min(self.upper)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

impl Default for BoundPair {
    fn default() -> Self {
        BoundPair::UNBOUNDED
    }
}

/// Returns a copy of `df` with each listed column clamped into its bounds.
/// Rows are never dropped and unlisted columns are left untouched.
pub fn clip_columns(
    df: &DataFrame,
    bounds: &[(ColumnSelector, BoundPair)],
) -> Result<DataFrame, ColumnError> {
    let mut output = df.clone();

    for (selector, bound) in bounds {
        let name = selector.resolve(&output)?;
        let clipped: Vec<f64> = numeric_column(&output, &name)?
            .into_iter()
            .map(|value| bound.clip(value))
            .collect();
        output.with_column(Series::new(name.as_str().into(), clipped))?;
    }

    Ok(output)
}
