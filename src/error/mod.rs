//! Error handling for study definitions and cohort extraction.

use std::io;
use std::path::PathBuf;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;

/// Specialized error type for building and running a study definition
#[derive(Debug, thiserror::Error)]
pub enum StudyError {
    /// Two declarations (or a declaration and a companion column) share a name
    #[error("Duplicate column name: {0}")]
    DuplicateVariable(String),

    /// A declaration refers to a variable that is declared later
    #[error("Variable '{variable}' refers to '{reference}', which is declared after it")]
    ForwardReference {
        /// The declaring variable
        variable: String,
        /// The name it refers to
        reference: String,
    },

    /// A declaration refers to itself
    #[error("Variable '{0}' refers to itself")]
    SelfReference(String),

    /// A declaration refers to a name that is never declared
    #[error("Variable '{variable}' refers to unknown variable '{reference}'")]
    UnknownVariable {
        /// The declaring variable
        variable: String,
        /// The unresolved name
        reference: String,
    },

    /// A relative date expression points at a variable that does not return a date
    #[error("Variable '{variable}' uses '{reference}' as a date, but it does not return a date")]
    NotADate {
        /// The declaring variable
        variable: String,
        /// The non-date variable
        reference: String,
    },

    /// The study has no population predicate
    #[error("Study definition has no population")]
    MissingPopulation,

    /// The study declares more than one population
    #[error("Study definition declares more than one population")]
    DuplicatePopulation,

    /// A codelist name could not be resolved
    #[error("Unknown codelist: {0}")]
    UnknownCodelist(String),

    /// A codelist could not be built from its inputs
    #[error("Codelist error in '{name}': {message}")]
    Codelist {
        /// Codelist name
        name: String,
        /// What went wrong
        message: String,
    },

    /// Return expectations hold values outside their domain
    #[error("Invalid return expectations for '{variable}': {message}")]
    InvalidExpectations {
        /// The variable carrying the expectations
        variable: String,
        /// What went wrong
        message: String,
    },

    /// A category ratio names a label the variable can never produce
    #[error("Expectation ratio label '{label}' for '{variable}' is not producible (expected one of {allowed:?})")]
    UnproducibleLabel {
        /// The variable carrying the expectations
        variable: String,
        /// The offending ratio key
        label: String,
        /// Labels the variable can produce
        allowed: Vec<String>,
    },

    /// A care-home categorisation refers to an attribute that does not exist
    #[error("Care home rule for '{variable}' refers to unknown attribute '{attribute}'")]
    UnknownAttribute {
        /// The declaring variable
        variable: String,
        /// The unknown attribute
        attribute: String,
    },

    /// A literal could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Input data does not match the expected table layout
    #[error("Data error in {table}: {message}")]
    DataError {
        /// Table name
        table: String,
        /// What went wrong
        message: String,
    },

    /// Error opening or reading a file
    #[error("IO error at {path}: {source}")]
    IoError {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Arrow error
    #[error("Arrow error: {0}")]
    ArrowError(#[from] ArrowError),

    /// Error processing Parquet data
    #[error("Parquet error: {0}")]
    ParquetError(#[from] ParquetError),

    /// Error converting records to or from Arrow
    #[error("Record conversion error: {0}")]
    ConversionError(#[from] serde_arrow::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl StudyError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            source,
        }
    }

    /// Create a codelist error
    pub fn codelist(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Codelist {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an expectations error
    pub fn expectations(variable: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidExpectations {
            variable: variable.into(),
            message: message.into(),
        }
    }

    /// Create a data error for a table
    pub fn data(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataError {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether this error is raised while building a definition, before any data is read
    #[must_use]
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateVariable(_)
                | Self::ForwardReference { .. }
                | Self::SelfReference(_)
                | Self::UnknownVariable { .. }
                | Self::NotADate { .. }
                | Self::MissingPopulation
                | Self::DuplicatePopulation
                | Self::UnknownCodelist(_)
                | Self::Codelist { .. }
                | Self::InvalidExpectations { .. }
                | Self::UnproducibleLabel { .. }
                | Self::UnknownAttribute { .. }
        )
    }
}

/// Result type for study operations
pub type Result<T> = std::result::Result<T, StudyError>;
