//! TOML pipeline plans: a filter sequence, trim settings and a rate function.
//!
//! ```toml
//! [[filters]]
//! kind = "three_sigma"
//! columns = ["Freq"]
//! sigma = 3.0
//!
//! [trim]
//! variant = "frequency"
//! target = 1950.0
//! value_column = { prefix = "ResFreq" }
//! flat_location = 180
//!
//! [rate]
//! kind = "polynomial"
//! coefficients = [0.0, 0.5, 0.0]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filters::{
    filter_edge_percent, filter_greater_than, filter_less_than, filter_range,
    filter_three_sigma, FilterError, DEFAULT_EDGE_PERCENT, DEFAULT_SIGMA, DEFAULT_THRESHOLD,
};
use crate::rate::{Identity, Linear, Polynomial, RateError, RateFunction};
use crate::table::{ColumnSelector, TestStep};
use crate::trim::{compute_trim, TrimError, TrimOutcome, TrimSettings, TrimVariant};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("failed to read plan {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse plan TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("plan has no [trim] section")]
    MissingTrim,
    #[error("plan field `{0}` is required for this trim variant")]
    MissingField(&'static str),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Trim(#[from] TrimError),
}

fn default_sigma() -> f64 {
    DEFAULT_SIGMA
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_edge_percent() -> f64 {
    DEFAULT_EDGE_PERCENT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum FilterStep {
    ThreeSigma {
        columns: Vec<ColumnSelector>,
        #[serde(default = "default_sigma")]
        sigma: f64,
    },
    GreaterThan {
        columns: Vec<ColumnSelector>,
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
    LessThan {
        columns: Vec<ColumnSelector>,
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
    EdgePercent {
        columns: Vec<ColumnSelector>,
        #[serde(default = "default_edge_percent")]
        pct: f64,
    },
    Range {
        columns: Vec<ColumnSelector>,
        #[serde(default)]
        above: Option<f64>,
        #[serde(default)]
        below: Option<f64>,
    },
}

impl FilterStep {
    pub fn apply(&self, df: &DataFrame) -> Result<DataFrame, FilterError> {
        match self {
            FilterStep::ThreeSigma { columns, sigma } => filter_three_sigma(df, columns, *sigma),
            FilterStep::GreaterThan { columns, threshold } => {
                filter_greater_than(df, columns, *threshold)
            }
            FilterStep::LessThan { columns, threshold } => {
                filter_less_than(df, columns, *threshold)
            }
            FilterStep::EdgePercent { columns, pct } => filter_edge_percent(df, columns, *pct),
            FilterStep::Range {
                columns,
                above,
                below,
            } => filter_range(df, columns, *above, *below),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrimSection {
    pub variant: TrimVariant,
    pub target: f64,
    #[serde(default)]
    pub value_column: Option<ColumnSelector>,
    /// Picks the value column by the step's standard prefix when
    /// `value_column` is unset.
    #[serde(default)]
    pub test_step: Option<TestStep>,
    #[serde(default)]
    pub x_column: Option<ColumnSelector>,
    #[serde(default)]
    pub y_column: Option<ColumnSelector>,
    #[serde(default)]
    pub coord_divisor: Option<f64>,
    #[serde(default)]
    pub flat_location: Option<i32>,
}

impl TrimSection {
    /// Fills unset fields from the variant's preset.
    pub fn settings(&self) -> Result<TrimSettings, PlanError> {
        let mut settings = match self.variant {
            TrimVariant::Frequency => {
                let value_column = self
                    .value_column
                    .clone()
                    .or_else(|| self.test_step.map(TestStep::target_selector))
                    .ok_or(PlanError::MissingField("trim.value_column"))?;
                TrimSettings::frequency(self.target, value_column)
            }
            TrimVariant::Thickness => {
                let mut settings = TrimSettings::thickness(self.target);
                if let Some(column) = &self.value_column {
                    settings.value_column = column.clone();
                }
                settings
            }
        };

        if let Some(column) = &self.x_column {
            settings.x_column = column.clone();
        }
        if let Some(column) = &self.y_column {
            settings.y_column = column.clone();
        }
        if let Some(divisor) = self.coord_divisor {
            settings.coord_divisor = divisor;
        }
        if let Some(degrees) = self.flat_location {
            settings = settings.with_flat_location(degrees);
        }

        Ok(settings)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateSpec {
    #[default]
    Identity,
    Linear(Linear),
    Polynomial(Polynomial),
}

impl RateFunction for RateSpec {
    fn apply(&self, shift: f64) -> Result<f64, RateError> {
        match self {
            RateSpec::Identity => Identity.apply(shift),
            RateSpec::Linear(linear) => linear.apply(shift),
            RateSpec::Polynomial(polynomial) => polynomial.apply(shift),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    #[serde(default)]
    pub filters: Vec<FilterStep>,
    #[serde(default)]
    pub trim: Option<TrimSection>,
    #[serde(default)]
    pub rate: RateSpec,
}

impl Plan {
    pub fn from_toml_str(toml_str: &str) -> Result<Self, PlanError> {
        Ok(toml::from_str(toml_str)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, PlanError> {
        let contents = fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Runs every filter step in order.
    pub fn apply_filters(&self, df: &DataFrame) -> Result<DataFrame, PlanError> {
        let filtered = self
            .filters
            .iter()
            .try_fold(df.clone(), |current, step| step.apply(&current))?;
        Ok(filtered)
    }

    /// Filters `df`, then builds the trim table.
    pub fn run(&self, df: &DataFrame) -> Result<TrimOutcome, PlanError> {
        let trim = self.trim.as_ref().ok_or(PlanError::MissingTrim)?;
        let settings = trim.settings()?;
        let filtered = self.apply_filters(df)?;
        Ok(compute_trim(&filtered, &settings, &self.rate)?)
    }
}
