//! Delimited-text tables with a header row, read and written through polars.

use std::io::Write;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableIoError {
    #[error("separator '{0}' must be a single ASCII character")]
    InvalidSeparator(char),
    #[error("failed to read table {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },
    #[error(transparent)]
    Polars(#[from] PolarsError),
}

pub fn separator_byte(separator: char) -> Result<u8, TableIoError> {
    if !separator.is_ascii() {
        return Err(TableIoError::InvalidSeparator(separator));
    }
    Ok(separator as u8)
}

pub fn read_delimited(path: &Path, separator: u8) -> Result<DataFrame, TableIoError> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_separator(separator))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|source| TableIoError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Writes `df` with a header row to `writer`.
pub fn write_delimited<W: Write>(
    writer: W,
    df: &mut DataFrame,
    separator: u8,
) -> Result<(), TableIoError> {
    CsvWriter::new(writer)
        .include_header(true)
        .with_separator(separator)
        .finish(df)?;
    Ok(())
}
