//! Variable declarations

use super::expectations::ReturnExpectations;
use super::source::{ReturnShape, Source};
use crate::models::DateFormat;

/// A named extraction rule
#[derive(Debug, Clone)]
pub struct VariableSpec {
    name: String,
    source: Source,
    expectations: Option<ReturnExpectations>,
}

impl VariableSpec {
    /// Declare `name` as drawn from `source`
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<Source>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            expectations: None,
        }
    }

    /// Attach return expectations
    #[must_use]
    pub fn expecting(mut self, expectations: ReturnExpectations) -> Self {
        self.expectations = Some(expectations);
        self
    }

    /// Variable name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the value comes from
    #[must_use]
    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Declared return expectations
    #[must_use]
    pub fn expectations(&self) -> Option<&ReturnExpectations> {
        self.expectations.as_ref()
    }

    /// Shape of the main value
    #[must_use]
    pub fn shape(&self) -> ReturnShape {
        self.source.shape()
    }

    /// Name and date format of the companion column, if any
    #[must_use]
    pub fn companion_column(&self) -> Option<(String, DateFormat)> {
        self.source
            .companion()
            .map(|c| (format!("{}{}", self.name, c.suffix), c.format))
    }

    /// Output columns in order: the variable, then its companion
    #[must_use]
    pub fn columns(&self) -> Vec<(String, ReturnShape)> {
        let mut columns = vec![(self.name.clone(), self.shape())];
        if let Some((name, format)) = self.companion_column() {
            columns.push((name, ReturnShape::Date(format)));
        }
        columns
    }
}
