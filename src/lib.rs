//! A typed study definition for extracting a cohort of SARS-CoV-2 positive
//! patients from EHR data, with a reference extractor over Parquet tables and
//! dummy data generation from return expectations.

pub mod codelist;
pub mod config;
pub mod definitions;
pub mod dummy;
pub mod error;
pub mod extract;
pub mod models;
pub mod output;
pub mod query;
pub mod store;
pub mod study;
pub mod utils;

// Re-export the most common types for easier use
// Core types
pub use config::{ExtractionConfig, OutputFormat};
pub use error::{Result, StudyError};
pub use study::{QueryPlan, StudyDefinition, StudyDefinitionBuilder};

// Declaration language
pub use codelist::{Codelist, CodelistRegistry};
pub use query::{DateExpr, Predicate, ReturnExpectations, VariableSpec};

// Execution
pub use dummy::DummyDataGenerator;
pub use extract::Extractor;
pub use output::{Cohort, write_cohort};
pub use store::PatientStore;

// Arrow types
pub use arrow::record_batch::RecordBatch;
