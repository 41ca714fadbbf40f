//! Cohort extraction
//!
//! Evaluates a study definition against every patient in a [`PatientStore`].
//! Variables are evaluated in declaration order into a per-patient scope,
//! so a relative date sees the already truncated value of the variable it
//! names. The population predicate is evaluated last; only members produce
//! a row.

pub mod eval;
pub mod scope;

use std::time::Instant;

use chrono::NaiveDate;
use rayon::prelude::*;

use crate::config::ExtractionConfig;
use crate::error::{Result, StudyError};
use crate::models::Patient;
use crate::output::{Cohort, CohortRow};
use crate::store::PatientStore;
use crate::study::StudyDefinition;
use crate::utils::logging::{create_main_progress_bar, finish_progress_bar, log_stage_complete};

pub use eval::{Evaluated, evaluate_spec};
pub use scope::{CareHomeLookup, Scope};

/// Runs a study definition over a patient store
#[derive(Debug)]
pub struct Extractor<'a> {
    definition: &'a StudyDefinition,
    today: NaiveDate,
    width: usize,
    threads: usize,
    show_progress: bool,
}

impl<'a> Extractor<'a> {
    /// Create an extractor for `definition`
    #[must_use]
    pub fn new(definition: &'a StudyDefinition, config: &ExtractionConfig) -> Self {
        Self {
            definition,
            today: config.today(),
            width: definition.columns().len(),
            threads: config.threads,
            show_progress: config.show_progress,
        }
    }

    /// Evaluate every patient and collect the population members
    ///
    /// Rows are ordered by patient id regardless of thread scheduling.
    pub fn extract(&self, store: &PatientStore) -> Result<Cohort> {
        let start = Instant::now();
        let patients = store.patients();
        let pb = create_main_progress_bar(
            patients.len() as u64,
            Some("Evaluating patients"),
            self.show_progress,
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| StudyError::ConfigError(format!("cannot start worker pool: {e}")))?;

        let rows: Vec<CohortRow> = pool.install(|| {
            patients
                .par_iter()
                .filter_map(|patient| {
                    let row = self.evaluate_patient(patient);
                    pb.inc(1);
                    row
                })
                .collect()
        });

        let summary = format!("{} of {} patients selected", rows.len(), patients.len());
        finish_progress_bar(&pb, Some(&summary));
        log_stage_complete("Extraction", rows.len(), start.elapsed());

        let mut cohort = Cohort::for_definition(self.definition);
        cohort.rows = rows;
        Ok(cohort)
    }

    /// Evaluate one patient; `None` when not in the population
    #[must_use]
    pub fn evaluate_patient(&self, patient: &Patient) -> Option<CohortRow> {
        let mut scope = Scope::new();
        let mut values = Vec::with_capacity(self.width);

        for spec in self.definition.variables() {
            let result = evaluate_spec(spec, patient, &scope, self.today);
            values.push(result.value.clone());
            if let Some(companion) = result.companion {
                values.push(companion);
            }
            scope.set(spec.name(), result.value);
        }

        let population = self.definition.population();
        let mut local = scope.child();
        for helper in &population.helpers {
            let result = evaluate_spec(helper, patient, &local, self.today);
            local.set(helper.name(), result.value);
        }
        if !population.predicate.evaluate(&local) {
            return None;
        }

        Some(CohortRow {
            patient_id: patient.patient_id,
            values,
        })
    }
}
