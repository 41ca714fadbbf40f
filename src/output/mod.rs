//! Cohort output
//!
//! A `Cohort` is the extracted table: one row per population member, with
//! `patient_id` first and then every declared column in declaration order.
//! It converts to Arrow record batches and is written as CSV or Parquet.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use serde::Serialize;

use crate::config::OutputFormat;
use crate::error::{Result, StudyError};
use crate::models::{DateFormat, PatientId, Value};
use crate::query::ReturnShape;
use crate::study::{PATIENT_ID_COLUMN, StudyDefinition};
use crate::utils::io::write_parquet;

/// Physical column type in the output table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    /// 64-bit integer (flags, counts, integers)
    Int,
    /// 64-bit float
    Float,
    /// Text (categories)
    Str,
    /// Date rendered as text at the given precision
    Date(DateFormat),
}

impl ColumnType {
    /// Column type used for a variable shape
    #[must_use]
    pub const fn of(shape: ReturnShape) -> Self {
        match shape {
            ReturnShape::Flag | ReturnShape::Int | ReturnShape::Count => Self::Int,
            ReturnShape::Float => Self::Float,
            ReturnShape::Category => Self::Str,
            ReturnShape::Date(format) => Self::Date(format),
        }
    }

    /// Arrow data type of the column
    #[must_use]
    pub const fn data_type(self) -> DataType {
        match self {
            Self::Int => DataType::Int64,
            Self::Float => DataType::Float64,
            Self::Str | Self::Date(_) => DataType::Utf8,
        }
    }
}

/// One output column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,
    /// Shape of the declared value
    pub shape: ReturnShape,
}

impl ColumnSpec {
    /// Physical column type
    #[must_use]
    pub const fn column_type(&self) -> ColumnType {
        ColumnType::of(self.shape)
    }
}

/// One output row
#[derive(Debug, Clone, PartialEq)]
pub struct CohortRow {
    /// Patient identifier
    pub patient_id: PatientId,
    /// Values in column order
    pub values: Vec<Value>,
}

/// The extracted cohort
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cohort {
    /// Columns after `patient_id`
    pub columns: Vec<ColumnSpec>,
    /// Rows ordered by patient id
    pub rows: Vec<CohortRow>,
}

impl Cohort {
    /// An empty cohort with the output columns of `definition`
    #[must_use]
    pub fn for_definition(definition: &StudyDefinition) -> Self {
        Self {
            columns: definition
                .columns()
                .into_iter()
                .map(|(name, shape)| ColumnSpec { name, shape })
                .collect(),
            rows: Vec::new(),
        }
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the cohort has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column among the value columns
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Every value of one column, in row order
    #[must_use]
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r.values[index]).collect())
    }

    /// The row for a patient
    #[must_use]
    pub fn row(&self, patient_id: PatientId) -> Option<&CohortRow> {
        self.rows.iter().find(|r| r.patient_id == patient_id)
    }

    /// Value of `column` for `patient_id`
    #[must_use]
    pub fn value(&self, patient_id: PatientId, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.row(patient_id).map(|r| &r.values[index])
    }

    /// Arrow schema of the output table
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        let mut fields = Vec::with_capacity(self.columns.len() + 1);
        fields.push(Field::new(PATIENT_ID_COLUMN, DataType::Int64, false));
        for column in &self.columns {
            fields.push(Field::new(&column.name, column.column_type().data_type(), true));
        }
        Arc::new(Schema::new(fields))
    }

    /// Convert to record batches of at most `batch_size` rows
    ///
    /// An empty cohort yields one empty batch so the header is still written.
    pub fn to_record_batches(&self, batch_size: usize) -> Result<Vec<RecordBatch>> {
        let schema = self.schema();
        if self.rows.is_empty() {
            return Ok(vec![RecordBatch::new_empty(schema)]);
        }
        self.rows
            .chunks(batch_size.max(1))
            .map(|rows| self.batch(&schema, rows))
            .collect()
    }

    fn batch(&self, schema: &SchemaRef, rows: &[CohortRow]) -> Result<RecordBatch> {
        let mut ids = Int64Builder::with_capacity(rows.len());
        for row in rows {
            ids.append_value(i64::try_from(row.patient_id).map_err(|_| {
                StudyError::data("cohort", format!("patient id {} out of range", row.patient_id))
            })?);
        }

        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.columns.len() + 1);
        arrays.push(Arc::new(ids.finish()));
        for (index, column) in self.columns.iter().enumerate() {
            let values = rows.iter().map(|r| &r.values[index]);
            arrays.push(build_column(column.column_type(), values));
        }

        Ok(RecordBatch::try_new(schema.clone(), arrays)?)
    }
}

fn build_column<'v>(column_type: ColumnType, values: impl Iterator<Item = &'v Value>) -> ArrayRef {
    match column_type {
        ColumnType::Int => {
            let mut builder = Int64Builder::new();
            for value in values {
                builder.append_option(match value {
                    Value::Int(n) => Some(*n),
                    Value::Bool(b) => Some(i64::from(*b)),
                    Value::Str(s) => s.parse().ok(),
                    _ => None,
                });
            }
            Arc::new(builder.finish())
        }
        ColumnType::Float => {
            let mut builder = Float64Builder::new();
            for value in values {
                builder.append_option(value.as_f64());
            }
            Arc::new(builder.finish())
        }
        ColumnType::Str => {
            let mut builder = StringBuilder::new();
            for value in values {
                builder.append_option(value.render(DateFormat::YearMonthDay));
            }
            Arc::new(builder.finish())
        }
        ColumnType::Date(format) => {
            let mut builder = StringBuilder::new();
            for value in values {
                builder.append_option(value.render(format));
            }
            Arc::new(builder.finish())
        }
    }
}

/// Write a cohort as CSV or Parquet
pub fn write_cohort(
    cohort: &Cohort,
    path: &Path,
    format: OutputFormat,
    batch_size: usize,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| StudyError::io(parent, e))?;
    }

    let batches = cohort.to_record_batches(batch_size)?;
    match format {
        OutputFormat::Parquet => write_parquet(path, &batches)?,
        OutputFormat::Csv => {
            let file = File::create(path).map_err(|e| StudyError::io(path, e))?;
            let mut writer = arrow::csv::WriterBuilder::new()
                .with_header(true)
                .build(file);
            for batch in &batches {
                writer.write(batch)?;
            }
        }
    }

    log::info!(
        "Wrote {} rows x {} columns to {} ({format})",
        cohort.len(),
        cohort.columns.len() + 1,
        path.display()
    );
    Ok(())
}
