//! Table persistence: Parquet for pipeline tables, CSV for raw provider files
//! and human-readable reports.

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use polars::prelude::{
    CsvReadOptions, NullValues, ParquetReader, ParquetWriter, PlSmallStr, PolarsError, SerReader,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::table::{Table, TableError};

const NULL_TOKENS: [&str; 7] = ["", "NA", "N/A", "NaN", "nan", "null", "NULL"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("dataframe error: {0}")]
    Polars(#[from] PolarsError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("invalid output path: {0}")]
    InvalidPath(String),
}

pub fn write_parquet(path: &Path, table: &Table) -> Result<(), StorageError> {
    let mut frame = table.frame().clone();
    let mut buf = Vec::new();
    ParquetWriter::new(&mut buf).finish(&mut frame)?;

    write_atomic(path, &buf)?;
    info!(
        component = "storage",
        event = "storage.parquet.written",
        path = %path.display(),
        rows = table.num_rows(),
        columns = table.num_columns(),
        bytes = buf.len()
    );
    Ok(())
}

/// Reads a Parquet file. Narrow integers and booleans come back as `Int`,
/// timestamps of any unit as their UTC calendar date.
pub fn read_parquet(path: &Path) -> Result<Table, StorageError> {
    let file = fs::File::open(path)?;
    let frame = ParquetReader::new(file).finish()?;
    let table = Table::from_frame(frame)?;
    debug!(
        component = "storage",
        event = "storage.parquet.read",
        path = %path.display(),
        rows = table.num_rows(),
        columns = table.num_columns()
    );
    Ok(table)
}

/// Reads a provider CSV with the whole file used for type inference. Ragged
/// rows are padded with nulls.
pub fn read_csv_table(path: &Path) -> Result<Table, StorageError> {
    let frame = csv_options().try_into_reader_with_file_path(Some(path.to_path_buf()))?.finish()?;
    let table = Table::from_frame(frame)?;
    debug!(
        component = "storage",
        event = "storage.csv.read",
        path = %path.display(),
        rows = table.num_rows(),
        columns = table.num_columns()
    );
    Ok(table)
}

pub fn read_csv_from<R: Read>(mut source: R) -> Result<Table, StorageError> {
    let mut bytes = Vec::new();
    source.read_to_end(&mut bytes)?;
    let frame = csv_options()
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;
    Ok(Table::from_frame(frame)?)
}

fn csv_options() -> CsvReadOptions {
    let nulls = NULL_TOKENS
        .iter()
        .map(|token| PlSmallStr::from(*token))
        .collect::<Vec<_>>();
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .map_parse_options(|opts| {
            opts.with_null_values(Some(NullValues::AllColumns(nulls.clone())))
                .with_truncate_ragged_lines(true)
        })
}

pub fn write_csv_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), StorageError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| StorageError::Io(err.into_error()))?;
    write_atomic(path, &bytes)?;
    info!(
        component = "storage",
        event = "storage.csv.written",
        path = %path.display(),
        rows = rows.len()
    );
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec(value)?;
    write_atomic(path, &bytes)
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| StorageError::InvalidPath(path.display().to_string()))?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}
