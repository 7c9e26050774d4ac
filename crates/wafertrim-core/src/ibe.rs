//! Ion-beam-etch (`ibe`) trim files.
//!
//! ```text
//! %ibe-file	target:	1950	a:	0	b:	0.5	c:	0
//! %x	y	removal
//! %mm	mm	nm
//! -3	1	12.5
//! ```
//!
//! The header carries the trim target and the quadratic rate coefficients
//! `a·s² + b·s + c`; the body is the tab-separated `(x, y, shift)` table.
//! Lines end in CRLF, as the etch tool expects.

use std::io::Write;

use polars::prelude::*;
use thiserror::Error;

use crate::plan::RateSpec;
use crate::rate::Polynomial;
use crate::trim::{SHIFT_COLUMN, X_COLUMN, Y_COLUMN};

const LINE_END: &str = "\r\n";

#[derive(Debug, Error)]
pub enum IbeError {
    #[error("ibe headers hold a quadratic rate; got a degree {degree} polynomial")]
    UnsupportedRate { degree: usize },
    #[error("failed to write ibe file: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Polars(#[from] PolarsError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IbeHeader {
    pub target: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl IbeHeader {
    /// Header for a trim toward `target` etched with `rate`. Linear and
    /// identity rates are written as quadratics with `a = 0`.
    pub fn from_rate(target: f64, rate: &RateSpec) -> Result<Self, IbeError> {
        let [a, b, c] = match rate {
            RateSpec::Identity => [0.0, 1.0, 0.0],
            RateSpec::Linear(linear) => [0.0, linear.slope, linear.intercept],
            RateSpec::Polynomial(polynomial) => quadratic(polynomial)?,
        };
        Ok(Self { target, a, b, c })
    }
}

fn quadratic(polynomial: &Polynomial) -> Result<[f64; 3], IbeError> {
    let coefficients = polynomial.coefficients();
    if coefficients.len() > 3 {
        return Err(IbeError::UnsupportedRate {
            degree: polynomial.degree(),
        });
    }
    let mut padded = [0.0; 3];
    padded[3 - coefficients.len()..].copy_from_slice(coefficients);
    Ok(padded)
}

/// Writes the header rows followed by the trim table's `x`, `y` and `shift`
/// columns.
pub fn write_ibe<W: Write>(
    mut writer: W,
    trim: &DataFrame,
    header: &IbeHeader,
) -> Result<(), IbeError> {
    write!(
        writer,
        "%ibe-file\ttarget:\t{}\ta:\t{}\tb:\t{}\tc:\t{}{LINE_END}",
        header.target, header.a, header.b, header.c
    )?;
    write!(writer, "%x\ty\tremoval{LINE_END}")?;
    write!(writer, "%mm\tmm\tnm{LINE_END}")?;

    let mut body = trim.select([X_COLUMN, Y_COLUMN, SHIFT_COLUMN])?;
    CsvWriter::new(&mut writer)
        .include_header(false)
        .with_separator(b'\t')
        .with_line_terminator(LINE_END.to_string())
        .with_quote_style(QuoteStyle::Never)
        .finish(&mut body)?;
    Ok(())
}
