use std::path::PathBuf;

use chrono::NaiveDate;
use cohort_definition::codelist::{CodeSystem, CodelistRegistry, categorised_codelist, codelist};
use cohort_definition::definitions::{STUDY_CODELISTS, register_inline, study_definition};
use cohort_definition::models::{
    ClinicalEvent, MedicationIssue, Patient, PracticeRegistration, Sex, SgssTest, TestOutcome,
    Vaccination,
};
use cohort_definition::{ExtractionConfig, StudyDefinition};

/// Build a date, panicking on invalid input
#[must_use]
pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Codes used by the fixture codelists
pub const SMOKER: &str = "137R.";
pub const EX_SMOKER: &str = "137S.";
pub const NEVER_SMOKED: &str = "1371.";
pub const WHITE_BRITISH: &str = "XaJQv";
pub const ASTHMA: &str = "H33..";
pub const PREDNISOLONE: &str = "pred-5mg";

/// A registry holding every codelist the study needs, with small literal contents
#[must_use]
pub fn test_registry() -> CodelistRegistry {
    let mut registry = CodelistRegistry::new();
    for spec in STUDY_CODELISTS {
        let list = match spec.name {
            "clear_smoking_codes" => categorised_codelist(
                spec.name,
                [(SMOKER, "S"), (EX_SMOKER, "E"), (NEVER_SMOKED, "N")],
                spec.system,
            ),
            "ethnicity_codes" => {
                categorised_codelist(spec.name, [(WHITE_BRITISH, "1"), ("XaJR2", "3")], spec.system)
            }
            "ethnicity_codes_16" => {
                categorised_codelist(spec.name, [(WHITE_BRITISH, "1"), ("XaJR2", "5")], spec.system)
            }
            "asthma_codes" => codelist(spec.name, [ASTHMA], spec.system),
            "pred_codes" => codelist(spec.name, [PREDNISOLONE], spec.system),
            "hiv_codes" => codelist(spec.name, ["43C3.", "XaFuL"], spec.system),
            "snomed_covid" => codelist(spec.name, ["1240751000000100"], CodeSystem::Snomed),
            name => codelist(name, [format!("{name}-code")], spec.system),
        };
        registry.insert(spec.name, list);
    }
    register_inline(&mut registry);
    registry
}

/// The study definition built against [`test_registry`]
#[must_use]
pub fn test_study() -> StudyDefinition {
    study_definition(&test_registry()).unwrap()
}

/// Configuration pinned to a fixed "today" with progress bars hidden
#[must_use]
pub fn test_config() -> ExtractionConfig {
    ExtractionConfig {
        today: Some(date(2022, 3, 1)),
        show_progress: false,
        threads: 2,
        ..Default::default()
    }
}

/// A fresh scratch directory under the system temp dir
#[must_use]
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "cohort-definition-{name}-{}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Builder for fixture patients
pub struct PatientBuilder {
    patient: Patient,
}

impl PatientBuilder {
    #[must_use]
    pub fn new(patient_id: u64) -> Self {
        let mut patient = Patient::new(patient_id);
        patient.sex = Sex::Female;
        patient.date_of_birth = Some(date(1970, 5, 20));
        Self { patient }
    }

    /// Registered with one practice from 2015 onwards
    #[must_use]
    pub fn registered(mut self) -> Self {
        self.patient.registrations.push(PracticeRegistration {
            start_date: date(2015, 1, 1),
            end_date: None,
            practice_pseudo_id: 10,
            stp_code: Some("STP3".to_string()),
            msoa_code: Some("E02000003".to_string()),
            region: Some("London".to_string()),
        });
        self
    }

    #[must_use]
    pub fn registration(mut self, start: NaiveDate, end: Option<NaiveDate>) -> Self {
        self.patient.registrations.push(PracticeRegistration {
            start_date: start,
            end_date: end,
            practice_pseudo_id: 20 + self.patient.registrations.len() as i64,
            stp_code: None,
            msoa_code: None,
            region: None,
        });
        self
    }

    #[must_use]
    pub fn positive_test(mut self, on: NaiveDate, sgtf: Option<&str>) -> Self {
        self.patient.sgss_tests.push(SgssTest {
            date: on,
            pathogen: "SARS-CoV-2".to_string(),
            outcome: TestOutcome::Positive,
            s_gene_target_failure: sgtf.map(str::to_string),
        });
        self
    }

    #[must_use]
    pub fn vaccinated(mut self, on: NaiveDate) -> Self {
        self.patient.vaccinations.push(Vaccination {
            date: on,
            target_disease: "SARS-2 CORONAVIRUS".to_string(),
        });
        self
    }

    #[must_use]
    pub fn event(mut self, code: &str, on: NaiveDate, value: Option<f64>) -> Self {
        self.patient.clinical_events.push(ClinicalEvent {
            code: code.to_string(),
            date: on,
            numeric_value: value,
        });
        self
    }

    #[must_use]
    pub fn medication(mut self, code: &str, on: NaiveDate) -> Self {
        self.patient.medications.push(MedicationIssue {
            code: code.to_string(),
            date: on,
        });
        self
    }

    #[must_use]
    pub fn died(mut self, on: NaiveDate) -> Self {
        self.patient.date_of_death = Some(on);
        self
    }

    #[must_use]
    pub fn build(mut self) -> Patient {
        self.patient.sort_records();
        self.patient
    }
}

/// A patient inside the study population: one practice and a positive test in range
#[must_use]
pub fn eligible_patient(patient_id: u64) -> PatientBuilder {
    PatientBuilder::new(patient_id)
        .registered()
        .positive_test(date(2021, 11, 15), Some("1"))
}
