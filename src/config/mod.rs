//! Configuration for cohort extraction runs.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StudyError};

/// Default number of rows per output record batch
pub const DEFAULT_BATCH_SIZE: usize = 16384;

/// Default number of synthetic patients in dummy runs
pub const DEFAULT_POPULATION_SIZE: usize = 1000;

/// Tabular output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Comma separated values with a header row
    #[default]
    Csv,
    /// Apache Parquet
    Parquet,
}

impl OutputFormat {
    /// File extension for this format
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }

    /// Guess the format from a file extension
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "csv" => Some(Self::Csv),
            "parquet" => Some(Self::Parquet),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Configuration for an extraction or dummy data run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Directory holding the patient tables
    pub input_dir: Option<PathBuf>,
    /// Directory holding the codelist CSV files
    pub codelist_dir: PathBuf,
    /// Where the cohort is written
    pub output_path: PathBuf,
    /// Output format
    pub output_format: OutputFormat,
    /// Generate dummy data instead of reading patient tables
    pub dummy_data: bool,
    /// Number of rows to synthesise in dummy runs
    pub population_size: usize,
    /// Seed for dummy data generation (random when absent)
    pub seed: Option<u64>,
    /// Value used for "today" in date expressions and expectations
    pub today: Option<NaiveDate>,
    /// Rows per output record batch
    pub batch_size: usize,
    /// Worker threads for patient evaluation
    pub threads: usize,
    /// Show progress bars
    pub show_progress: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            input_dir: None,
            codelist_dir: PathBuf::from("codelists"),
            output_path: PathBuf::from("output/input.csv"),
            output_format: OutputFormat::Csv,
            dummy_data: false,
            population_size: DEFAULT_POPULATION_SIZE,
            seed: None,
            today: None,
            batch_size: DEFAULT_BATCH_SIZE,
            threads: num_cpus::get(),
            show_progress: true,
        }
    }
}

impl ExtractionConfig {
    /// Load a configuration from a JSON file; absent keys take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| StudyError::io(path, e))?;
        let config: Self = serde_json::from_str(&text)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply `COHORT_BATCH_SIZE` and `COHORT_TODAY` from the environment
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(value) = std::env::var("COHORT_BATCH_SIZE") {
            self.batch_size = value.parse::<usize>().map_err(|e| {
                StudyError::ConfigError(format!("COHORT_BATCH_SIZE '{value}': {e}"))
            })?;
        }
        if let Ok(value) = std::env::var("COHORT_TODAY") {
            let date = NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                .map_err(|e| StudyError::ConfigError(format!("COHORT_TODAY '{value}': {e}")))?;
            self.today = Some(date);
        }
        Ok(self)
    }

    /// The date standing in for "today"
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Check values that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(StudyError::ConfigError("batch_size must be positive".into()));
        }
        if self.threads == 0 {
            return Err(StudyError::ConfigError("threads must be positive".into()));
        }
        if self.dummy_data && self.population_size == 0 {
            return Err(StudyError::ConfigError(
                "population_size must be positive for dummy data".into(),
            ));
        }
        if !self.dummy_data && self.input_dir.is_none() {
            return Err(StudyError::ConfigError(
                "input_dir is required unless dummy_data is set".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Extraction Configuration:")?;
        if self.dummy_data {
            writeln!(f, "  Mode: dummy data ({} patients)", self.population_size)?;
            if let Some(seed) = self.seed {
                writeln!(f, "  Seed: {seed}")?;
            }
        } else if let Some(dir) = &self.input_dir {
            writeln!(f, "  Input Directory: {}", dir.display())?;
        }
        writeln!(f, "  Codelists: {}", self.codelist_dir.display())?;
        writeln!(
            f,
            "  Output: {} ({})",
            self.output_path.display(),
            self.output_format
        )?;
        writeln!(f, "  Today: {}", self.today())?;
        writeln!(f, "  Batch Size: {}", self.batch_size)?;
        writeln!(f, "  Threads: {}", self.threads)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_partial_json() {
        let config: ExtractionConfig =
            serde_json::from_str(r#"{"dummy_data": true, "seed": 7, "output_format": "parquet"}"#)
                .unwrap();
        assert!(config.dummy_data);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.output_format, OutputFormat::Parquet);
        assert_eq!(config.population_size, DEFAULT_POPULATION_SIZE);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_input_for_real_runs() {
        let config = ExtractionConfig::default();
        assert!(config.validate().is_err());

        let config = ExtractionConfig {
            input_dir: Some(PathBuf::from("data")),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            OutputFormat::from_path(Path::new("out/input.parquet")),
            Some(OutputFormat::Parquet)
        );
        assert_eq!(OutputFormat::from_path(Path::new("input.csv")), Some(OutputFormat::Csv));
        assert_eq!(OutputFormat::from_path(Path::new("input")), None);
    }
}
