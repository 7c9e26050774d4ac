//! Column statistics. `NaN` entries are missing readings and are left out of
//! every statistic.

use ndarray::Array1;

/// Degrees-of-freedom convention for [`std_dev`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ddof {
    /// Divide by `n - 1`.
    Sample,
    /// Divide by `n`.
    Population,
}

impl Ddof {
    fn offset(self) -> usize {
        match self {
            Ddof::Sample => 1,
            Ddof::Population => 0,
        }
    }
}

fn present(values: &[f64]) -> Array1<f64> {
    values.iter().copied().filter(|value| !value.is_nan()).collect()
}

/// Mean of the non-`NaN` values, `None` when there are none.
pub fn mean(values: &[f64]) -> Option<f64> {
    present(values).mean()
}

/// Standard deviation of the non-`NaN` values. `None` when the count does not
/// exceed the degrees-of-freedom offset.
pub fn std_dev(values: &[f64], ddof: Ddof) -> Option<f64> {
    let present = present(values);
    if present.len() <= ddof.offset() {
        return None;
    }
    Some(present.std(ddof.offset() as f64))
}

/// Population variance, used by the fit quality metric.
pub(crate) fn variance(values: &[f64]) -> Option<f64> {
    let present = present(values);
    (!present.is_empty()).then(|| present.var(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_and_population_differ() {
        let values = [1.0, 2.0, 3.0, 100.0];
        assert_eq!(mean(&values), Some(26.5));
        let sample = std_dev(&values, Ddof::Sample).unwrap();
        let population = std_dev(&values, Ddof::Population).unwrap();
        assert!((sample - (7205.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((population - (7205.0f64 / 4.0).sqrt()).abs() < 1e-12);
        assert!((variance(&values).unwrap() - 7205.0 / 4.0).abs() < 1e-9);
    }

    #[test]
    fn nan_values_are_skipped() {
        let values = [f64::NAN, 2.0, 4.0];
        assert_eq!(mean(&values), Some(3.0));
        assert_eq!(std_dev(&values, Ddof::Population), Some(1.0));
    }

    #[test]
    fn too_few_values_have_no_spread() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[f64::NAN]), None);
        assert_eq!(std_dev(&[5.0], Ddof::Sample), None);
        assert_eq!(std_dev(&[5.0], Ddof::Population), Some(0.0));
        assert_eq!(variance(&[]), None);
    }
}
