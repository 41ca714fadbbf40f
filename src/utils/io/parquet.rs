//! Parquet file operations
//!
//! This module provides utilities for reading patient tables from Parquet
//! files into Arrow record batches and for writing batches back out.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use itertools::Itertools;
use parquet::arrow::ArrowWriter;
use parquet::arrow::{ProjectionMask, arrow_reader::ParquetRecordBatchReaderBuilder};
use rayon::prelude::*;

use crate::config::DEFAULT_BATCH_SIZE;
use crate::error::{Result, StudyError};
use crate::utils::logging::{log_operation_complete, log_operation_start, log_warning};

/// Validates that a directory exists and is a directory
///
/// # Errors
/// Returns an error if the directory does not exist or is not a directory
pub fn validate_directory(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(StudyError::io(
            dir,
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Directory does not exist: {}", dir.display()),
            ),
        ));
    }
    Ok(())
}

/// Build a projection mask selecting the columns of `schema` present in the file
///
/// Returns `None` when no requested column exists, in which case every
/// column is read.
#[must_use]
pub fn create_projection(
    schema: &Schema,
    file_schema: &Schema,
    parquet_schema: &parquet::schema::types::SchemaDescriptor,
) -> Option<ProjectionMask> {
    let projection = schema
        .fields()
        .iter()
        .filter_map(|f| {
            let field_name = f.name();
            file_schema.index_of(field_name).map_or_else(
                |_| {
                    log_warning(
                        &format!("Field {field_name} not found in parquet file, skipping"),
                        None,
                    );
                    None
                },
                Some,
            )
        })
        .collect_vec();

    if projection.is_empty() {
        log_warning(
            "No matching fields found in schema projection, reading all columns",
            None,
        );
        None
    } else {
        Some(ProjectionMask::roots(parquet_schema, projection))
    }
}

/// Read a parquet file into Arrow record batches
///
/// # Arguments
/// * `path` - Path to the Parquet file
/// * `schema` - Optional Arrow schema for projecting specific columns
/// * `batch_size` - Rows per batch (defaults to [`DEFAULT_BATCH_SIZE`])
pub fn read_parquet(
    path: &Path,
    schema: Option<&Schema>,
    batch_size: Option<usize>,
) -> Result<Vec<RecordBatch>> {
    let start = std::time::Instant::now();
    log_operation_start("Reading parquet file", path);

    let file = File::open(path).map_err(|e| StudyError::io(path, e))?;
    let mut builder = ParquetRecordBatchReaderBuilder::try_new(file)?
        .with_batch_size(batch_size.unwrap_or(DEFAULT_BATCH_SIZE));

    if let Some(schema) = schema {
        let projection = create_projection(schema, builder.schema(), builder.parquet_schema());
        if let Some(mask) = projection {
            builder = builder.with_projection(mask);
        }
    }

    let batches = builder
        .build()?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    log_operation_complete("read", path, batches.len(), Some(start.elapsed()));
    Ok(batches)
}

/// Find all Parquet files in a directory, sorted by file name
pub fn find_parquet_files(dir: &Path) -> Result<Vec<PathBuf>> {
    validate_directory(dir)?;

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| StudyError::io(dir, e))? {
        let path = entry.map_err(|e| StudyError::io(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "parquet") {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        log_warning("No Parquet files found in directory", Some(dir));
    }
    Ok(files)
}

/// Load all parquet files from a directory in parallel
///
/// Batches are returned in file name order.
pub fn load_parquet_files_parallel(
    dir: &Path,
    schema: Option<&Schema>,
    batch_size: Option<usize>,
) -> Result<Vec<RecordBatch>> {
    let files = find_parquet_files(dir)?;
    if files.is_empty() {
        return Ok(Vec::new());
    }

    let per_file: Vec<Result<Vec<RecordBatch>>> = files
        .par_iter()
        .map(|path| read_parquet(path, schema, batch_size))
        .collect();

    let mut combined = Vec::new();
    for result in per_file {
        combined.extend(result?);
    }

    log::info!(
        "Loaded {} batches from {} Parquet files in {}",
        combined.len(),
        files.len(),
        dir.display()
    );
    Ok(combined)
}

/// Write record batches to a single Parquet file
pub fn write_parquet(path: &Path, batches: &[RecordBatch]) -> Result<()> {
    let Some(first) = batches.first() else {
        return Err(StudyError::data(
            path.display().to_string(),
            "no record batches to write",
        ));
    };
    let file = File::create(path).map_err(|e| StudyError::io(path, e))?;
    let mut writer = ArrowWriter::try_new(file, first.schema(), None)?;
    for batch in batches {
        writer.write(batch)?;
    }
    writer.close()?;
    log::debug!("Wrote {} batches to {}", batches.len(), path.display());
    Ok(())
}
