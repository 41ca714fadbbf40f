//! Domain models for cohort extraction
//!
//! This module contains the patient entity held by the backing store, the
//! table records it is loaded from, and the `Value` every declared variable
//! produces per patient.

pub mod patient;
pub mod records;
pub mod value;

// Re-export commonly used types
pub use patient::{
    AddressRecord, CareHomeAttributes, ClinicalEvent, DateBounded, EmergencyAttendance,
    HouseholdMembership, MedicationIssue, Patient, PatientId, PracticeRegistration, Sex, SgssTest,
    TestOutcome, Vaccination,
};
pub use records::ArrowSchema;
pub use value::{DateFormat, Literal, Value};
