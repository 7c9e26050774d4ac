//! Least-squares fits used to derive rate functions from calibration runs
//! (measured removal against frequency shift).

use ndarray::{s, Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rate::{Linear, Polynomial};
use crate::stats;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    #[error("x has {x} values but y has {y}")]
    LengthMismatch { x: usize, y: usize },
    #[error("a degree {degree} fit needs at least {needed} points, got {found}")]
    InsufficientData {
        degree: usize,
        needed: usize,
        found: usize,
    },
    #[error("fit is singular; x does not vary enough for degree {degree}")]
    Singular { degree: usize },
}

/// Straight-line fit `y = slope·x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// `1 - var(residuals) / var(y)`; 1.0 when `y` is constant.
    pub r_squared: f64,
}

impl LinearFit {
    pub fn fit(x: &[f64], y: &[f64]) -> Result<Self, FitError> {
        let coefficients = polyfit(x, y, 1)?;
        let (slope, intercept) = (coefficients.coefficients()[0], coefficients.coefficients()[1]);

        let residuals: Vec<f64> = x
            .iter()
            .zip(y)
            .map(|(xv, yv)| slope * xv + intercept - yv)
            .collect();
        let y_var = stats::variance(y).unwrap_or(0.0);
        let residual_var = stats::variance(&residuals).unwrap_or(0.0);
        let r_squared = if y_var == 0.0 {
            1.0
        } else {
            1.0 - residual_var / y_var
        };

        Ok(Self {
            slope,
            intercept,
            r_squared,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    pub fn rate(&self) -> Linear {
        Linear {
            slope: self.slope,
            intercept: self.intercept,
        }
    }
}

/// Least-squares polynomial of `degree`, coefficients highest degree first.
///
/// Builds the Vandermonde design matrix and solves the normal equations
/// `XᵀX·β = Xᵀy` by Cholesky factorization.
pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Result<Polynomial, FitError> {
    if x.len() != y.len() {
        return Err(FitError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    let terms = degree + 1;
    if x.len() < terms {
        return Err(FitError::InsufficientData {
            degree,
            needed: terms,
            found: x.len(),
        });
    }

    // column k holds xᵏ
    let design = Array2::from_shape_fn((x.len(), terms), |(row, power)| {
        x[row].powi(power as i32)
    });
    let targets = ArrayView1::from(y);
    let gram = design.t().dot(&design);
    let moments = design.t().dot(&targets);

    let ascending = cholesky_solve(&gram, &moments).ok_or(FitError::Singular { degree })?;
    Ok(Polynomial::new(ascending.iter().rev().copied().collect()))
}

/// Solves `a·β = b` for a symmetric positive-definite `a`. `None` when a
/// pivot vanishes relative to the largest diagonal entry.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let scale = a.diag().iter().fold(0.0f64, |acc, value| acc.max(value.abs()));
    let tolerance = scale.max(f64::MIN_POSITIVE) * 1e-12;

    let mut lower = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let dot = lower.slice(s![i, ..j]).dot(&lower.slice(s![j, ..j]));
            let value = a[[i, j]] - dot;
            if i == j {
                if value <= tolerance {
                    return None;
                }
                lower[[i, i]] = value.sqrt();
            } else {
                lower[[i, j]] = value / lower[[j, j]];
            }
        }
    }

    // L·z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let dot = lower.slice(s![i, ..i]).dot(&z.slice(s![..i]));
        z[i] = (b[i] - dot) / lower[[i, i]];
    }

    // Lᵀ·β = z
    let mut beta = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let dot = lower.slice(s![i + 1.., i]).dot(&beta.slice(s![i + 1..]));
        beta[i] = (z[i] - dot) / lower[[i, i]];
    }

    Some(beta)
}
