//! In-memory patient store
//!
//! Holds every patient the extractor evaluates, keyed and ordered by
//! patient id. Tables are read from Parquet, either a single
//! `<table>.parquet` file or a `<table>/` directory of files read in
//! parallel, and folded into per-patient records.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use arrow::record_batch::RecordBatch;

use crate::config::ExtractionConfig;
use crate::error::{Result, StudyError};
use crate::models::records::{
    AddressTableRecord, ClinicalEventRecord, EmergencyCareRecord, HouseholdRecord,
    MedicationRecord, PatientRecord, RegistrationRecord, SgssTestRecord, VaccinationRecord,
};
use crate::models::{ArrowSchema, Patient, PatientId, SgssTest, TestOutcome};
use crate::utils::io::{load_parquet_files_parallel, read_parquet, validate_directory};
use crate::utils::logging::{create_spinner, finish_progress_bar, log_warning};

/// A table row belonging to one patient
pub trait PatientRow {
    /// The owning patient
    fn patient_id(&self) -> PatientId;
}

macro_rules! patient_rows {
    ($($record:ty),* $(,)?) => {
        $(
            impl PatientRow for $record {
                fn patient_id(&self) -> PatientId {
                    self.patient_id
                }
            }
        )*
    };
}

patient_rows!(
    PatientRecord,
    RegistrationRecord,
    AddressTableRecord,
    HouseholdRecord,
    ClinicalEventRecord,
    MedicationRecord,
    SgssTestRecord,
    VaccinationRecord,
    EmergencyCareRecord,
);

/// Patients ordered by id
#[derive(Debug, Clone, Default)]
pub struct PatientStore {
    patients: BTreeMap<PatientId, Patient>,
}

impl PatientStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from patients; records are sorted afterwards
    #[must_use]
    pub fn from_patients(patients: impl IntoIterator<Item = Patient>) -> Self {
        let mut store = Self::new();
        for patient in patients {
            store.insert(patient);
        }
        store.finalize();
        store
    }

    /// Add or replace a patient
    pub fn insert(&mut self, patient: Patient) {
        self.patients.insert(patient.patient_id, patient);
    }

    /// Look up a patient
    #[must_use]
    pub fn get(&self, patient_id: PatientId) -> Option<&Patient> {
        self.patients.get(&patient_id)
    }

    /// Sort every patient's records chronologically
    pub fn finalize(&mut self) {
        for patient in self.patients.values_mut() {
            patient.sort_records();
        }
    }

    /// Number of patients
    #[must_use]
    pub fn len(&self) -> usize {
        self.patients.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    /// Patients in id order
    pub fn iter(&self) -> impl Iterator<Item = &Patient> {
        self.patients.values()
    }

    /// Patients in id order, as a slice of references for parallel work
    #[must_use]
    pub fn patients(&self) -> Vec<&Patient> {
        self.patients.values().collect()
    }

    /// Load every table from `dir`
    ///
    /// `patients` is required; the other tables are optional and skipped with
    /// a warning when absent.
    pub fn load_from_dir(dir: &Path, config: &ExtractionConfig) -> Result<Self> {
        let start = Instant::now();
        validate_directory(dir)?;
        let batch_size = Some(config.batch_size);

        let patients = read_table::<PatientRecord>(dir, batch_size)?.ok_or_else(|| {
            StudyError::data(PatientRecord::TABLE, format!("table not found in {}", dir.display()))
        })?;

        let spinner = config
            .show_progress
            .then(|| create_spinner(Some("Loading patient tables")));

        let mut store = Self::new();
        for record in patients {
            let mut patient = Patient::new(record.patient_id);
            patient.sex = record.sex();
            patient.date_of_birth = record.date_of_birth;
            patient.date_of_death = record.date_of_death;
            store.insert(patient);
        }
        log::info!("Loaded {} patients", store.len());

        store.attach::<RegistrationRecord>(dir, batch_size, |p, r| p.registrations.push(r.into()))?;
        store.attach::<AddressTableRecord>(dir, batch_size, |p, r| p.addresses.push(r.into()))?;
        store.attach::<HouseholdRecord>(dir, batch_size, |p, r| p.households.push(r.into()))?;
        store.attach::<ClinicalEventRecord>(dir, batch_size, |p, r| {
            p.clinical_events.push(r.into());
        })?;
        store.attach::<MedicationRecord>(dir, batch_size, |p, r| p.medications.push(r.into()))?;
        let mut unrecognised = 0usize;
        store.attach::<SgssTestRecord>(dir, batch_size, |p, r| {
            let test = SgssTest::from(r);
            if test.outcome == TestOutcome::Other {
                unrecognised += 1;
            }
            p.sgss_tests.push(test);
        })?;
        if unrecognised > 0 {
            log::warn!(
                "{unrecognised} rows in {} have an unrecognised result and match no outcome",
                SgssTestRecord::TABLE
            );
        }
        store.attach::<VaccinationRecord>(dir, batch_size, |p, r| p.vaccinations.push(r.into()))?;
        store.attach::<EmergencyCareRecord>(dir, batch_size, |p, r| {
            p.emergency_attendances.push(r.into());
        })?;

        store.finalize();
        if let Some(spinner) = &spinner {
            finish_progress_bar(spinner, Some("Patient tables loaded"));
        }
        log::info!(
            "Patient store ready: {} patients, {} records in {:?}",
            store.len(),
            store.iter().map(Patient::record_count).sum::<usize>(),
            start.elapsed()
        );
        Ok(store)
    }

    /// Read an optional table and hand each row to its patient
    fn attach<R>(
        &mut self,
        dir: &Path,
        batch_size: Option<usize>,
        mut add: impl FnMut(&mut Patient, R),
    ) -> Result<()>
    where
        R: ArrowSchema + PatientRow,
    {
        let Some(rows) = read_table::<R>(dir, batch_size)? else {
            log_warning(&format!("Table {} not found, skipping", R::TABLE), Some(dir));
            return Ok(());
        };

        let total = rows.len();
        let mut orphans = 0usize;
        for row in rows {
            match self.patients.get_mut(&row.patient_id()) {
                Some(patient) => add(patient, row),
                None => orphans += 1,
            }
        }
        if orphans > 0 {
            log::warn!(
                "Dropped {orphans} of {total} rows in {} for unknown patients",
                R::TABLE
            );
        }
        log::debug!("Attached {} rows from {}", total - orphans, R::TABLE);
        Ok(())
    }
}

/// Where a table lives: `<table>.parquet` or a `<table>/` directory
fn table_location(dir: &Path, table: &str) -> Option<PathBuf> {
    let file = dir.join(format!("{table}.parquet"));
    if file.is_file() {
        return Some(file);
    }
    let sub = dir.join(table);
    sub.is_dir().then_some(sub)
}

/// Read a table into records; `None` when the table does not exist
pub fn read_table<R: ArrowSchema>(dir: &Path, batch_size: Option<usize>) -> Result<Option<Vec<R>>> {
    let Some(location) = table_location(dir, R::TABLE) else {
        return Ok(None);
    };
    let schema = R::schema();
    let batches: Vec<RecordBatch> = if location.is_dir() {
        load_parquet_files_parallel(&location, Some(&schema), batch_size)?
    } else {
        read_parquet(&location, Some(&schema), batch_size)?
    };

    let mut rows = Vec::with_capacity(batches.iter().map(RecordBatch::num_rows).sum());
    for batch in &batches {
        rows.extend(R::from_record_batch(batch).map_err(|e| {
            StudyError::data(R::TABLE, format!("cannot decode rows: {e}"))
        })?);
    }
    Ok(Some(rows))
}
