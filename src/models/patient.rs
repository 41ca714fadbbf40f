//! Patient entity model
//!
//! A `Patient` gathers every record the backing store holds for one person.
//! Event lists are sorted by date once loading is complete, so the extractor
//! can take first and last matches without re-sorting.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Patient identifier in the backing store
pub type PatientId = u64;

/// Recorded sex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Sex {
    /// Male
    Male,
    /// Female
    Female,
    /// Indeterminate
    Indeterminate,
    /// Not recorded
    #[default]
    Unknown,
}

impl Sex {
    /// Single letter code as returned by the `sex` source
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
            Self::Indeterminate => "I",
            Self::Unknown => "U",
        }
    }

    /// All sex codes
    #[must_use]
    pub const fn codes() -> [&'static str; 4] {
        ["M", "F", "I", "U"]
    }
}

impl From<&str> for Sex {
    fn from(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "M" | "MALE" => Self::Male,
            "F" | "FEMALE" => Self::Female,
            "I" | "INDETERMINATE" => Self::Indeterminate,
            _ => Self::Unknown,
        }
    }
}

/// Something with a start date and an optional end date
pub trait DateBounded {
    /// First day of validity
    fn start(&self) -> NaiveDate;
    /// Last day of validity, open ended when absent
    fn end(&self) -> Option<NaiveDate>;

    /// Whether the record covers `date`
    fn covers(&self, date: NaiveDate) -> bool {
        self.start() <= date && self.end().is_none_or(|end| end >= date)
    }
}

/// Registration with a general practice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeRegistration {
    /// Registration start
    pub start_date: NaiveDate,
    /// Registration end, open when still registered
    pub end_date: Option<NaiveDate>,
    /// Pseudonymised practice identifier
    pub practice_pseudo_id: i64,
    /// Sustainability and transformation partnership code
    pub stp_code: Option<String>,
    /// Middle layer super output area of the practice
    pub msoa_code: Option<String>,
    /// NUTS1 region name
    pub region: Option<String>,
}

impl DateBounded for PracticeRegistration {
    fn start(&self) -> NaiveDate {
        self.start_date
    }
    fn end(&self) -> Option<NaiveDate> {
        self.end_date
    }
}

/// Care home attributes attached to an address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CareHomeAttributes {
    /// Location requires nursing
    pub location_requires_nursing: Option<bool>,
    /// Location does not require nursing
    pub location_does_not_require_nursing: Option<bool>,
}

/// Residential address history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    /// Address start
    pub start_date: NaiveDate,
    /// Address end, open when current
    pub end_date: Option<NaiveDate>,
    /// Index of multiple deprivation rank
    pub index_of_multiple_deprivation: Option<i64>,
    /// Rural urban classification (1-8)
    pub rural_urban_classification: Option<i64>,
    /// Middle layer super output area
    pub msoa_code: Option<String>,
    /// Set when the address is a potential care home
    pub care_home: Option<CareHomeAttributes>,
}

impl DateBounded for AddressRecord {
    fn start(&self) -> NaiveDate {
        self.start_date
    }
    fn end(&self) -> Option<NaiveDate> {
        self.end_date
    }
}

/// Household membership
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseholdMembership {
    /// Pseudonymised household identifier
    pub household_id: i64,
    /// Number of people in the household
    pub household_size: i64,
    /// Membership start
    pub start_date: NaiveDate,
    /// Membership end
    pub end_date: Option<NaiveDate>,
}

impl DateBounded for HouseholdMembership {
    fn start(&self) -> NaiveDate {
        self.start_date
    }
    fn end(&self) -> Option<NaiveDate> {
        self.end_date
    }
}

/// Coded clinical event in the primary care record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalEvent {
    /// Clinical code
    pub code: String,
    /// Date recorded
    pub date: NaiveDate,
    /// Associated numeric value (test results, measurements)
    pub numeric_value: Option<f64>,
}

/// Medication issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationIssue {
    /// Medication code
    pub code: String,
    /// Date issued
    pub date: NaiveDate,
}

/// Outcome of a pathogen test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestOutcome {
    /// Positive result
    Positive,
    /// Negative result
    Negative,
    /// Void, pending or unrecognised; matches neither query outcome
    Other,
}

impl From<&str> for TestOutcome {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "positive" | "pos" | "1" => Self::Positive,
            "negative" | "neg" | "0" => Self::Negative,
            _ => Self::Other,
        }
    }
}

/// Test result reported to SGSS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgssTest {
    /// Specimen date
    pub date: NaiveDate,
    /// Pathogen tested for
    pub pathogen: String,
    /// Result
    pub outcome: TestOutcome,
    /// S-gene target failure code ("0", "1", "9" or empty)
    pub s_gene_target_failure: Option<String>,
}

/// Vaccination record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vaccination {
    /// Date administered
    pub date: NaiveDate,
    /// Target disease of the vaccine
    pub target_disease: String,
}

/// Emergency care attendance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyAttendance {
    /// Arrival date
    pub arrival_date: NaiveDate,
    /// Diagnosis codes recorded at the attendance
    pub diagnoses: Vec<String>,
    /// Discharge destination code
    pub discharge_destination: Option<String>,
}

/// Everything the backing store holds for one patient
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patient {
    /// Identifier
    pub patient_id: PatientId,
    /// Recorded sex
    pub sex: Sex,
    /// Date of birth
    pub date_of_birth: Option<NaiveDate>,
    /// Date of death registered with ONS
    pub date_of_death: Option<NaiveDate>,
    /// Practice registrations
    pub registrations: SmallVec<[PracticeRegistration; 2]>,
    /// Address history
    pub addresses: SmallVec<[AddressRecord; 2]>,
    /// Household memberships
    pub households: SmallVec<[HouseholdMembership; 1]>,
    /// Clinical events
    pub clinical_events: Vec<ClinicalEvent>,
    /// Medication issues
    pub medications: Vec<MedicationIssue>,
    /// SGSS test results
    pub sgss_tests: Vec<SgssTest>,
    /// Vaccinations
    pub vaccinations: Vec<Vaccination>,
    /// Emergency care attendances
    pub emergency_attendances: Vec<EmergencyAttendance>,
}

impl Patient {
    /// Create a patient with no records
    #[must_use]
    pub fn new(patient_id: PatientId) -> Self {
        Self {
            patient_id,
            ..Default::default()
        }
    }

    /// Age in whole years on `date`
    #[must_use]
    pub fn age_at(&self, date: NaiveDate) -> Option<i64> {
        let dob = self.date_of_birth?;
        if date < dob {
            return None;
        }
        let mut age = i64::from(date.year() - dob.year());
        if (date.month(), date.day()) < (dob.month(), dob.day()) {
            age -= 1;
        }
        Some(age)
    }

    /// Sort every dated record chronologically; ties keep insertion order
    pub fn sort_records(&mut self) {
        self.registrations.sort_by_key(|r| r.start_date);
        self.addresses.sort_by_key(|a| a.start_date);
        self.households.sort_by_key(|h| h.start_date);
        self.clinical_events.sort_by_key(|e| e.date);
        self.medications.sort_by_key(|m| m.date);
        self.sgss_tests.sort_by_key(|t| t.date);
        self.vaccinations.sort_by_key(|v| v.date);
        self.emergency_attendances.sort_by_key(|a| a.arrival_date);
    }

    /// The record covering `date`; the latest starting one wins on overlap
    pub fn active_at<T: DateBounded>(records: &[T], date: NaiveDate) -> Option<&T> {
        records
            .iter()
            .filter(|r| r.covers(date))
            .max_by_key(|r| r.start())
    }

    /// Total number of dated records held for this patient
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.registrations.len()
            + self.addresses.len()
            + self.households.len()
            + self.clinical_events.len()
            + self.medications.len()
            + self.sgss_tests.len()
            + self.vaccinations.len()
            + self.emergency_attendances.len()
    }
}
