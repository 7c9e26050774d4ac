//! Per-die trim corrections.
//!
//! A trim table has one `(x, y, shift)` row per die: the die position in
//! millimetres and the etch or deposition length that brings the die's
//! measured value toward the target. Out-of-range shifts are clipped rather
//! than dropped so that every measured die keeps a correction.

use std::slice;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::filters::{filter_greater_than, FilterError, DEFAULT_THRESHOLD};
use crate::rate::{Identity, RateError, RateFunction};
use crate::stats::{self, Ddof};
use crate::table::{clip_columns, numeric_column, BoundPair, ColumnError, ColumnSelector};

const CLIP_SIGMA: f64 = 3.0;
const ANGSTROM_PER_NM: f64 = 10.0;
const UM_PER_MM: f64 = 1000.0;
const FLIPPED_FLAT_DEGREES: i32 = 180;

pub const FREQUENCY_X_COLUMN: &str = "DieX";
pub const FREQUENCY_Y_COLUMN: &str = "DieY";
pub const THICKNESS_X_COLUMN: &str = "Die x (mm)";
pub const THICKNESS_Y_COLUMN: &str = "Die y (mm)";
pub const THICKNESS_VALUE_COLUMN: &str = "Site 1 Layer 1 Thickness (A)";

pub const X_COLUMN: &str = "x";
pub const Y_COLUMN: &str = "y";
pub const SHIFT_COLUMN: &str = "shift";

#[derive(Debug, Error)]
pub enum TrimError {
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error("x, y and value columns differ in length: {x}, {y} and {values}")]
    ShapeMismatch { x: usize, y: usize, values: usize },
    #[error("rate function rejected shift {input}: {source}")]
    InvalidRateFunction {
        input: f64,
        #[source]
        source: RateError,
    },
    #[error(transparent)]
    Polars(#[from] PolarsError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimVariant {
    /// Resonator frequency against a target frequency, mapped through a rate
    /// function. Non-positive readings are dropped first and the shift floor
    /// is zero.
    Frequency,
    /// Film thickness in Ångström against a target thickness. Shifts are in
    /// nanometres and may be negative.
    Thickness,
}

impl TrimVariant {
    fn raw_shift(self, target: f64, value: f64) -> f64 {
        match self {
            TrimVariant::Frequency => target - value,
            TrimVariant::Thickness => (value - target) / ANGSTROM_PER_NM,
        }
    }

    fn ddof(self) -> Ddof {
        match self {
            TrimVariant::Frequency => Ddof::Population,
            TrimVariant::Thickness => Ddof::Sample,
        }
    }

    /// `mean ± 3·std`, floored at zero for frequency trims.
    pub fn shift_bounds(self, mean: f64, std: f64) -> BoundPair {
        let spread = CLIP_SIGMA * std;
        let lower = mean - spread;
        match self {
            TrimVariant::Frequency => BoundPair::new(lower.max(0.0), mean + spread),
            TrimVariant::Thickness => BoundPair::new(lower, mean + spread),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrimSettings {
    pub variant: TrimVariant,
    pub target: f64,
    pub value_column: ColumnSelector,
    pub x_column: ColumnSelector,
    pub y_column: ColumnSelector,
    /// Coordinates are divided by this to get millimetres.
    pub coord_divisor: f64,
    /// Rotate for a 180° flat: `x' = -y`, `y' = x`.
    pub flip_axes: bool,
}

impl TrimSettings {
    /// Frequency trim over `DieX`/`DieY` given in micrometres.
    pub fn frequency(target: f64, value_column: impl Into<ColumnSelector>) -> Self {
        Self {
            variant: TrimVariant::Frequency,
            target,
            value_column: value_column.into(),
            x_column: FREQUENCY_X_COLUMN.into(),
            y_column: FREQUENCY_Y_COLUMN.into(),
            coord_divisor: UM_PER_MM,
            flip_axes: false,
        }
    }

    /// Thickness trim over the CDE mapper's millimetre columns.
    pub fn thickness(target: f64) -> Self {
        Self {
            variant: TrimVariant::Thickness,
            target,
            value_column: THICKNESS_VALUE_COLUMN.into(),
            x_column: THICKNESS_X_COLUMN.into(),
            y_column: THICKNESS_Y_COLUMN.into(),
            coord_divisor: 1.0,
            flip_axes: false,
        }
    }

    pub fn with_flat_location(mut self, degrees: i32) -> Self {
        self.flip_axes = degrees == FLIPPED_FLAT_DEGREES;
        self
    }

    pub fn with_coordinates(
        mut self,
        x_column: impl Into<ColumnSelector>,
        y_column: impl Into<ColumnSelector>,
        coord_divisor: f64,
    ) -> Self {
        self.x_column = x_column.into();
        self.y_column = y_column.into();
        self.coord_divisor = coord_divisor;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TrimOutcome {
    /// Columns `x`, `y`, `shift`, one row per surviving die, input order.
    pub frame: DataFrame,
    /// Bounds the shift column was clipped to.
    pub bounds: BoundPair,
    /// Mean of the unclipped shifts, `None` for an empty table.
    pub mean: Option<f64>,
    /// Spread of the unclipped shifts, `None` when undefined.
    pub std: Option<f64>,
    /// Number of shifts moved by clipping.
    pub clipped: usize,
}

/// Builds the clipped trim table for `df`.
///
/// `rate` converts frequency shifts into removal lengths; thickness trims do
/// not use it.
pub fn compute_trim<R>(
    df: &DataFrame,
    settings: &TrimSettings,
    rate: &R,
) -> Result<TrimOutcome, TrimError>
where
    R: RateFunction + ?Sized,
{
    let source = match settings.variant {
        TrimVariant::Frequency => filter_greater_than(
            df,
            slice::from_ref(&settings.value_column),
            DEFAULT_THRESHOLD,
        )?,
        TrimVariant::Thickness => df.clone(),
    };

    let x_name = settings.x_column.resolve(&source)?;
    let y_name = settings.y_column.resolve(&source)?;
    let value_name = settings.value_column.resolve(&source)?;

    let x = numeric_column(&source, &x_name)?;
    let y = numeric_column(&source, &y_name)?;
    let values = numeric_column(&source, &value_name)?;

    shift_table(&x, &y, &values, settings, rate)
}

/// Same as [`compute_trim`] but over raw coordinate and value slices.
pub fn shift_table<R>(
    x: &[f64],
    y: &[f64],
    values: &[f64],
    settings: &TrimSettings,
    rate: &R,
) -> Result<TrimOutcome, TrimError>
where
    R: RateFunction + ?Sized,
{
    if x.len() != values.len() || y.len() != values.len() {
        return Err(TrimError::ShapeMismatch {
            x: x.len(),
            y: y.len(),
            values: values.len(),
        });
    }

    let divisor = settings.coord_divisor;
    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .map(|(&xv, &yv)| {
            let (xm, ym) = (xv / divisor, yv / divisor);
            if settings.flip_axes {
                (-ym, xm)
            } else {
                (xm, ym)
            }
        })
        .unzip();

    let shifts = values
        .iter()
        .map(|&value| {
            let raw = settings.variant.raw_shift(settings.target, value);
            match settings.variant {
                TrimVariant::Frequency => apply_rate(rate, raw),
                TrimVariant::Thickness => Ok(raw),
            }
        })
        .collect::<Result<Vec<f64>, TrimError>>()?;

    let mean = stats::mean(&shifts);
    let std = stats::std_dev(&shifts, settings.variant.ddof());
    let bounds = match mean {
        Some(avg) => settings.variant.shift_bounds(avg, std.unwrap_or(0.0)),
        None => BoundPair::UNBOUNDED,
    };
    let clipped = shifts
        .iter()
        .filter(|shift| !shift.is_nan() && !bounds.contains(**shift))
        .count();

    let frame = DataFrame::new(vec![
        Series::new(X_COLUMN.into(), xs).into(),
        Series::new(Y_COLUMN.into(), ys).into(),
        Series::new(SHIFT_COLUMN.into(), shifts).into(),
    ])?;
    let frame = clip_columns(
        &frame,
        &[
            (ColumnSelector::from(X_COLUMN), BoundPair::UNBOUNDED),
            (ColumnSelector::from(Y_COLUMN), BoundPair::UNBOUNDED),
            (ColumnSelector::from(SHIFT_COLUMN), bounds),
        ],
    )?;

    info!(
        variant = ?settings.variant,
        rows = frame.height(),
        mean = ?mean,
        std = ?std,
        lower = bounds.lower,
        upper = bounds.upper,
        "Computed trim table"
    );
    debug!(clipped, "Clipped shifts to bounds");

    Ok(TrimOutcome {
        frame,
        bounds,
        mean,
        std,
        clipped,
    })
}

fn apply_rate<R>(rate: &R, shift: f64) -> Result<f64, TrimError>
where
    R: RateFunction + ?Sized,
{
    let mapped = rate
        .apply(shift)
        .map_err(|source| TrimError::InvalidRateFunction {
            input: shift,
            source,
        })?;
    if !mapped.is_finite() {
        return Err(TrimError::InvalidRateFunction {
            input: shift,
            source: RateError::NonFinite { output: mapped },
        });
    }
    Ok(mapped)
}

/// Frequency trim over `DieX`/`DieY` in micrometres.
pub fn trim_to_frequency<R>(
    df: &DataFrame,
    target: f64,
    value_column: impl Into<ColumnSelector>,
    flat_location: i32,
    rate: &R,
) -> Result<TrimOutcome, TrimError>
where
    R: RateFunction + ?Sized,
{
    let settings = TrimSettings::frequency(target, value_column).with_flat_location(flat_location);
    compute_trim(df, &settings, rate)
}

/// Thickness trim over the CDE mapper's standard columns.
pub fn trim_to_thickness(df: &DataFrame, target: f64) -> Result<TrimOutcome, TrimError> {
    compute_trim(df, &TrimSettings::thickness(target), &Identity)
}
