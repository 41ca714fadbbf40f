//! Study definitions
//!
//! A study definition is an ordered list of variable declarations, the
//! study-wide default expectations, and exactly one population predicate.
//! It is validated once when built; after that it is read-only and may be
//! shared between threads.

pub mod validation;

use serde::Serialize;

use crate::error::{Result, StudyError};
use crate::query::{Predicate, ReturnExpectations, ReturnShape, VariableSpec};

pub use validation::{PATIENT_ID_COLUMN, validate};

/// The population predicate and its helpers
#[derive(Debug, Clone)]
pub struct Population {
    /// Membership condition
    pub predicate: Predicate,
    /// Helper variables evaluated after every declared variable
    pub helpers: Vec<VariableSpec>,
}

/// A validated study definition
#[derive(Debug, Clone)]
pub struct StudyDefinition {
    default_expectations: ReturnExpectations,
    variables: Vec<VariableSpec>,
    population: Population,
}

impl StudyDefinition {
    /// Start building a study definition
    #[must_use]
    pub fn builder() -> StudyDefinitionBuilder {
        StudyDefinitionBuilder::default()
    }

    /// Study-wide default expectations
    #[must_use]
    pub fn default_expectations(&self) -> &ReturnExpectations {
        &self.default_expectations
    }

    /// Declared variables in declaration order
    #[must_use]
    pub fn variables(&self) -> &[VariableSpec] {
        &self.variables
    }

    /// Look up a declared variable by name
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&VariableSpec> {
        self.variables.iter().find(|v| v.name() == name)
    }

    /// The population
    #[must_use]
    pub fn population(&self) -> &Population {
        &self.population
    }

    /// Output columns after `patient_id`, in order, with companions
    #[must_use]
    pub fn columns(&self) -> Vec<(String, ReturnShape)> {
        self.variables.iter().flat_map(VariableSpec::columns).collect()
    }

    /// Expectations for `spec` with the defaults filled in
    #[must_use]
    pub fn effective_expectations(&self, spec: &VariableSpec) -> ReturnExpectations {
        spec.expectations()
            .map_or_else(|| self.default_expectations.clone(), |own| {
                own.merged_with(&self.default_expectations)
            })
    }

    /// Earlier variables each declaration depends on, in declaration order
    #[must_use]
    pub fn dependencies(&self) -> Vec<(String, Vec<String>)> {
        self.variables
            .iter()
            .map(|v| (v.name().to_string(), external_references(v)))
            .collect()
    }

    /// Serialisable description of what extraction will do
    #[must_use]
    pub fn plan(&self) -> QueryPlan {
        QueryPlan {
            default_expectations: self.default_expectations.clone(),
            variables: self
                .variables
                .iter()
                .map(|v| self.plan_variable(v, true))
                .collect(),
            population: PlannedPopulation {
                predicate: self.population.predicate.to_string(),
                depends_on: population_references(&self.population),
                helpers: self
                    .population
                    .helpers
                    .iter()
                    .map(|h| self.plan_variable(h, false))
                    .collect(),
            },
        }
    }

    fn plan_variable(&self, spec: &VariableSpec, output: bool) -> PlannedVariable {
        let source = spec.source();
        PlannedVariable {
            name: spec.name().to_string(),
            operation: source.operation(),
            description: source.describe(),
            shape: spec.shape(),
            columns: if output {
                spec.columns().into_iter().map(|(name, _)| name).collect()
            } else {
                Vec::new()
            },
            depends_on: external_references(spec),
            codelists: source
                .codelists()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
            helpers: source
                .helpers()
                .iter()
                .map(|h| self.plan_variable(h, false))
                .collect(),
            expectations: output.then(|| self.effective_expectations(spec)),
        }
    }
}

/// Names a declaration reads from outside its own helper scope
fn external_references(spec: &VariableSpec) -> Vec<String> {
    let source = spec.source();
    let mut names: Vec<String> = source
        .date_references()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut inner = source.predicate_references();
    for helper in source.helpers() {
        inner.extend(external_references(helper));
    }
    let local: Vec<&str> = source.helpers().iter().map(VariableSpec::name).collect();
    for name in inner {
        if !local.contains(&name.as_str()) && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn population_references(population: &Population) -> Vec<String> {
    let local: Vec<&str> = population.helpers.iter().map(VariableSpec::name).collect();
    let mut names = Vec::new();
    let inner = population
        .helpers
        .iter()
        .flat_map(external_references)
        .chain(population.predicate.required_variables());
    for name in inner {
        if !local.contains(&name.as_str()) && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Builder for [`StudyDefinition`]
#[derive(Debug, Default)]
pub struct StudyDefinitionBuilder {
    default_expectations: ReturnExpectations,
    variables: Vec<VariableSpec>,
    populations: Vec<Population>,
}

impl StudyDefinitionBuilder {
    /// Set the study-wide default expectations
    #[must_use]
    pub fn default_expectations(mut self, expectations: ReturnExpectations) -> Self {
        self.default_expectations = expectations;
        self
    }

    /// Declare a variable; declaration order is evaluation order
    #[must_use]
    pub fn variable(mut self, spec: VariableSpec) -> Self {
        self.variables.push(spec);
        self
    }

    /// Declare several variables in order
    #[must_use]
    pub fn variables(mut self, specs: impl IntoIterator<Item = VariableSpec>) -> Self {
        self.variables.extend(specs);
        self
    }

    /// Set the population predicate and its helper variables
    #[must_use]
    pub fn population(mut self, predicate: Predicate, helpers: Vec<VariableSpec>) -> Self {
        self.populations.push(Population { predicate, helpers });
        self
    }

    /// Validate and build the definition
    pub fn build(self) -> Result<StudyDefinition> {
        let mut populations = self.populations.into_iter();
        let population = populations.next().ok_or(StudyError::MissingPopulation)?;
        if populations.next().is_some() {
            return Err(StudyError::DuplicatePopulation);
        }

        let definition = StudyDefinition {
            default_expectations: self.default_expectations,
            variables: self.variables,
            population,
        };
        validate(&definition)?;

        log::debug!(
            "Built study definition with {} variables and {} output columns",
            definition.variables.len(),
            definition.columns().len()
        );
        Ok(definition)
    }
}

/// Serialisable query plan
#[derive(Debug, Clone, Serialize)]
pub struct QueryPlan {
    /// Study-wide defaults
    pub default_expectations: ReturnExpectations,
    /// Declarations in evaluation order
    pub variables: Vec<PlannedVariable>,
    /// Population, evaluated last
    pub population: PlannedPopulation,
}

/// One planned declaration
#[derive(Debug, Clone, Serialize)]
pub struct PlannedVariable {
    /// Variable name
    pub name: String,
    /// Source operation
    pub operation: &'static str,
    /// Human readable description of the query
    pub description: String,
    /// Shape of the main value
    pub shape: ReturnShape,
    /// Output columns; empty for helpers
    pub columns: Vec<String>,
    /// Earlier variables read
    pub depends_on: Vec<String>,
    /// Codelists matched
    pub codelists: Vec<String>,
    /// Helper variables
    pub helpers: Vec<PlannedVariable>,
    /// Effective expectations; absent for helpers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expectations: Option<ReturnExpectations>,
}

/// The planned population
#[derive(Debug, Clone, Serialize)]
pub struct PlannedPopulation {
    /// Membership condition
    pub predicate: String,
    /// Declared variables read
    pub depends_on: Vec<String>,
    /// Helper variables
    pub helpers: Vec<PlannedVariable>,
}
