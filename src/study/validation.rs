//! Definition-time checks
//!
//! Everything that can be known about a study without data is checked
//! here, so a broken definition fails before any table is read.

use rustc_hash::{FxHashMap, FxHashSet};

use super::{Population, StudyDefinition};
use crate::error::{Result, StudyError};
use crate::query::source::{CARE_HOME_ATTRIBUTES, LabelSet, ReturnShape, Source};
use crate::query::{ReturnExpectations, VariableSpec};

/// Reserved output column holding the patient identifier
pub const PATIENT_ID_COLUMN: &str = "patient_id";

/// Owner name used in errors raised for the population
pub const POPULATION: &str = "population";

/// Names visible to one declaration
struct Visible<'a> {
    declared: &'a FxHashMap<&'a str, (usize, ReturnShape)>,
    limit: usize,
    locals: Vec<(&'a str, ReturnShape)>,
}

impl<'a> Visible<'a> {
    fn shape_of(&self, name: &str) -> Option<ReturnShape> {
        if let Some((_, shape)) = self.locals.iter().rev().find(|(n, _)| *n == name) {
            return Some(*shape);
        }
        self.declared
            .get(name)
            .filter(|(index, _)| *index < self.limit)
            .map(|(_, shape)| *shape)
    }

    fn check_reference(&self, owner: &str, name: &str, needs_date: bool) -> Result<()> {
        if name == owner {
            return Err(StudyError::SelfReference(owner.to_string()));
        }
        match self.shape_of(name) {
            Some(shape) if needs_date && !shape.is_date() => Err(StudyError::NotADate {
                variable: owner.to_string(),
                reference: name.to_string(),
            }),
            Some(_) => Ok(()),
            None if self.declared.contains_key(name) => Err(StudyError::ForwardReference {
                variable: owner.to_string(),
                reference: name.to_string(),
            }),
            None => Err(StudyError::UnknownVariable {
                variable: owner.to_string(),
                reference: name.to_string(),
            }),
        }
    }

    fn with_local(&self, name: &'a str, shape: ReturnShape) -> Self {
        let mut locals = self.locals.clone();
        locals.push((name, shape));
        Self {
            declared: self.declared,
            limit: self.limit,
            locals,
        }
    }
}

/// Run every definition-time check
pub fn validate(definition: &StudyDefinition) -> Result<()> {
    check_column_names(definition)?;

    let declared: FxHashMap<&str, (usize, ReturnShape)> = definition
        .variables
        .iter()
        .enumerate()
        .map(|(i, v)| (v.name(), (i, v.shape())))
        .collect();

    for (index, spec) in definition.variables.iter().enumerate() {
        let visible = Visible {
            declared: &declared,
            limit: index,
            locals: Vec::new(),
        };
        check_spec(spec, &visible)?;
    }

    let everything = Visible {
        declared: &declared,
        limit: definition.variables.len(),
        locals: Vec::new(),
    };
    check_population(&definition.population, &everything)?;

    check_expectations(definition)?;
    Ok(())
}

/// Output columns and helpers must all have distinct names
fn check_column_names(definition: &StudyDefinition) -> Result<()> {
    let mut seen = FxHashSet::default();
    seen.insert(PATIENT_ID_COLUMN.to_string());
    for spec in &definition.variables {
        for (name, _) in spec.columns() {
            if !seen.insert(name.clone()) {
                return Err(StudyError::DuplicateVariable(name));
            }
        }
    }

    let mut helpers = Vec::new();
    for spec in &definition.variables {
        collect_helpers(spec.source(), &mut helpers);
    }
    for helper in &definition.population.helpers {
        helpers.push(helper);
        collect_helpers(helper.source(), &mut helpers);
    }
    for helper in helpers {
        if !seen.insert(helper.name().to_string()) {
            return Err(StudyError::DuplicateVariable(helper.name().to_string()));
        }
    }
    Ok(())
}

fn collect_helpers<'a>(source: &'a Source, out: &mut Vec<&'a VariableSpec>) {
    for helper in source.helpers() {
        out.push(helper);
        collect_helpers(helper.source(), out);
    }
}

/// Check one declaration and, recursively, its helpers
fn check_spec<'a>(spec: &'a VariableSpec, visible: &Visible<'a>) -> Result<()> {
    let owner = spec.name();
    let source = spec.source();

    for name in source.date_references() {
        visible.check_reference(owner, name, true)?;
    }

    if let Source::CareHome(query) = source {
        for attribute in query.rule.required_variables() {
            if !CARE_HOME_ATTRIBUTES.contains(&attribute.as_str()) {
                return Err(StudyError::UnknownAttribute {
                    variable: owner.to_string(),
                    attribute,
                });
            }
        }
    }

    let scope = check_helpers(source.helpers(), visible)?;
    for name in source.predicate_references() {
        scope.check_reference(owner, &name, false)?;
    }
    Ok(())
}

/// Check helpers in order; each sees the ones before it
fn check_helpers<'a>(helpers: &'a [VariableSpec], visible: &Visible<'a>) -> Result<Visible<'a>> {
    let mut scope = Visible {
        declared: visible.declared,
        limit: visible.limit,
        locals: visible.locals.clone(),
    };
    for helper in helpers {
        check_spec(helper, &scope)?;
        scope = scope.with_local(helper.name(), helper.shape());
    }
    Ok(scope)
}

fn check_population<'a>(population: &'a Population, visible: &Visible<'a>) -> Result<()> {
    let scope = check_helpers(&population.helpers, visible)?;
    for name in population.predicate.required_variables() {
        scope.check_reference(POPULATION, &name, false)?;
    }
    Ok(())
}

/// Expectations must be in range and name only producible labels
fn check_expectations(definition: &StudyDefinition) -> Result<()> {
    definition
        .default_expectations
        .validate("default_expectations")?;

    for spec in &definition.variables {
        let Some(own) = spec.expectations() else {
            continue;
        };
        own.validate(spec.name())?;
        check_labels(spec, own)?;
    }
    Ok(())
}

fn check_labels(spec: &VariableSpec, expectations: &ReturnExpectations) -> Result<()> {
    let labels = expectations.category_labels();
    if labels.is_empty() {
        return Ok(());
    }

    match spec.shape() {
        ReturnShape::Int | ReturnShape::Count => {
            if let Some(bad) = labels.iter().find(|l| l.parse::<i64>().is_err()) {
                return Err(StudyError::expectations(
                    spec.name(),
                    format!("category '{bad}' is not an integer"),
                ));
            }
        }
        ReturnShape::Float | ReturnShape::Date(_) => {
            return Err(StudyError::expectations(
                spec.name(),
                format!("category ratios given for a {} variable", spec.shape()),
            ));
        }
        ReturnShape::Flag | ReturnShape::Category => {}
    }

    match spec.source().producible_labels() {
        Some(LabelSet::Closed(allowed)) => {
            if let Some(bad) = labels
                .iter()
                .copied()
                .find(|l| !allowed.iter().any(|a| a.as_str() == *l))
            {
                return Err(StudyError::UnproducibleLabel {
                    variable: spec.name().to_string(),
                    label: bad.to_string(),
                    allowed,
                });
            }
        }
        Some(LabelSet::Observed(known)) => {
            let unknown: Vec<&str> = labels
                .iter()
                .copied()
                .filter(|l| !known.iter().any(|k| k.as_str() == *l))
                .collect();
            if !unknown.is_empty() {
                log::warn!(
                    "Expectation labels {unknown:?} for {} do not appear in its codelist categories",
                    spec.name()
                );
            }
        }
        None => {}
    }
    Ok(())
}
