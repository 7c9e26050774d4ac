//! Rate functions map a raw shift (for example a frequency offset in Hz)
//! onto the physical etch or deposition length the trim tool works in.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RateError {
    #[error("rate function failed: {0}")]
    Failed(String),
    #[error("rate function produced non-finite output {output}")]
    NonFinite { output: f64 },
}

impl RateError {
    pub fn failed(message: impl Into<String>) -> Self {
        RateError::Failed(message.into())
    }
}

pub trait RateFunction {
    fn apply(&self, shift: f64) -> Result<f64, RateError>;
}

impl<F> RateFunction for F
where
    F: Fn(f64) -> Result<f64, RateError>,
{
    fn apply(&self, shift: f64) -> Result<f64, RateError> {
        self(shift)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Identity;

impl RateFunction for Identity {
    fn apply(&self, shift: f64) -> Result<f64, RateError> {
        Ok(shift)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Linear {
    pub slope: f64,
    pub intercept: f64,
}

impl RateFunction for Linear {
    fn apply(&self, shift: f64) -> Result<f64, RateError> {
        Ok(self.slope * shift + self.intercept)
    }
}

/// Polynomial in the raw shift, coefficients ordered from the highest degree
/// down. `[a, b, c]` evaluates `a·s² + b·s + c`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Polynomial {
    coefficients: Vec<f64>,
}

impl Polynomial {
    pub fn new(coefficients: Vec<f64>) -> Self {
        Self { coefficients }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .fold(0.0, |acc, coefficient| acc * x + coefficient)
    }
}

impl RateFunction for Polynomial {
    fn apply(&self, shift: f64) -> Result<f64, RateError> {
        Ok(self.evaluate(shift))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polynomial_uses_highest_degree_first() {
        let poly = Polynomial::new(vec![2.0, -3.0, 1.0]);
        assert_eq!(poly.degree(), 2);
        assert_eq!(poly.evaluate(0.0), 1.0);
        assert_eq!(poly.evaluate(2.0), 3.0);
    }

    #[test]
    fn empty_polynomial_is_zero() {
        assert_eq!(Polynomial::new(Vec::new()).evaluate(12.0), 0.0);
    }
}
