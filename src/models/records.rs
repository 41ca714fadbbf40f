//! Table records for the backing store
//!
//! Each input table holds one row per record with a `patient_id` column. The
//! records below mirror those rows and convert to and from Arrow record
//! batches through `serde_arrow`, using explicit schemas so that date columns
//! are stored as `Date32`.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, FieldRef, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::models::patient::{
    AddressRecord, CareHomeAttributes, ClinicalEvent, EmergencyAttendance, HouseholdMembership,
    MedicationIssue, PatientId, PracticeRegistration, Sex, SgssTest, TestOutcome, Vaccination,
};

/// A model that can be read from and written to Arrow record batches
pub trait ArrowSchema: Sized + Serialize + DeserializeOwned {
    /// Name of the table holding these records
    const TABLE: &'static str;

    /// Get the Arrow schema for this model
    fn schema() -> Schema;

    /// Convert a `RecordBatch` to a vector of this model
    fn from_record_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        Ok(serde_arrow::from_record_batch(batch)?)
    }

    /// Convert a slice of this model to a `RecordBatch`
    fn to_record_batch(models: &[Self]) -> Result<RecordBatch> {
        let fields: Vec<FieldRef> = Self::schema().fields().iter().map(Arc::clone).collect();
        Ok(serde_arrow::to_record_batch(&fields, &models)?)
    }

    /// Get the schema as `Arc<Schema>`
    fn schema_ref() -> Arc<Schema> {
        Arc::new(Self::schema())
    }
}

/// Row of the `patients` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Identifier
    pub patient_id: PatientId,
    /// Sex code (M, F, I, U)
    pub sex: Option<String>,
    /// Date of birth
    pub date_of_birth: Option<NaiveDate>,
    /// ONS date of death
    pub date_of_death: Option<NaiveDate>,
}

impl PatientRecord {
    /// Parsed sex
    #[must_use]
    pub fn sex(&self) -> Sex {
        self.sex.as_deref().map_or(Sex::Unknown, Sex::from)
    }
}

impl ArrowSchema for PatientRecord {
    const TABLE: &'static str = "patients";

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("patient_id", DataType::UInt64, false),
            Field::new("sex", DataType::Utf8, true),
            Field::new("date_of_birth", DataType::Date32, true),
            Field::new("date_of_death", DataType::Date32, true),
        ])
    }
}

/// Row of the `practice_registrations` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    /// Patient
    pub patient_id: PatientId,
    /// Registration start
    pub start_date: NaiveDate,
    /// Registration end
    pub end_date: Option<NaiveDate>,
    /// Practice identifier
    pub practice_pseudo_id: i64,
    /// STP code
    pub stp_code: Option<String>,
    /// Practice MSOA
    pub msoa_code: Option<String>,
    /// NUTS1 region name
    pub region: Option<String>,
}

impl From<RegistrationRecord> for PracticeRegistration {
    fn from(r: RegistrationRecord) -> Self {
        Self {
            start_date: r.start_date,
            end_date: r.end_date,
            practice_pseudo_id: r.practice_pseudo_id,
            stp_code: r.stp_code,
            msoa_code: r.msoa_code,
            region: r.region,
        }
    }
}

impl ArrowSchema for RegistrationRecord {
    const TABLE: &'static str = "practice_registrations";

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("patient_id", DataType::UInt64, false),
            Field::new("start_date", DataType::Date32, false),
            Field::new("end_date", DataType::Date32, true),
            Field::new("practice_pseudo_id", DataType::Int64, false),
            Field::new("stp_code", DataType::Utf8, true),
            Field::new("msoa_code", DataType::Utf8, true),
            Field::new("region", DataType::Utf8, true),
        ])
    }
}

/// Row of the `addresses` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressTableRecord {
    /// Patient
    pub patient_id: PatientId,
    /// Address start
    pub start_date: NaiveDate,
    /// Address end
    pub end_date: Option<NaiveDate>,
    /// IMD rank
    pub index_of_multiple_deprivation: Option<i64>,
    /// Rural urban classification
    pub rural_urban_classification: Option<i64>,
    /// MSOA
    pub msoa_code: Option<String>,
    /// Whether the address is a potential care home
    pub is_potential_care_home: bool,
    /// Care home requires nursing
    pub location_requires_nursing: Option<bool>,
    /// Care home does not require nursing
    pub location_does_not_require_nursing: Option<bool>,
}

impl From<AddressTableRecord> for AddressRecord {
    fn from(r: AddressTableRecord) -> Self {
        let care_home = r.is_potential_care_home.then(|| CareHomeAttributes {
            location_requires_nursing: r.location_requires_nursing,
            location_does_not_require_nursing: r.location_does_not_require_nursing,
        });
        Self {
            start_date: r.start_date,
            end_date: r.end_date,
            index_of_multiple_deprivation: r.index_of_multiple_deprivation,
            rural_urban_classification: r.rural_urban_classification,
            msoa_code: r.msoa_code,
            care_home,
        }
    }
}

impl ArrowSchema for AddressTableRecord {
    const TABLE: &'static str = "addresses";

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("patient_id", DataType::UInt64, false),
            Field::new("start_date", DataType::Date32, false),
            Field::new("end_date", DataType::Date32, true),
            Field::new("index_of_multiple_deprivation", DataType::Int64, true),
            Field::new("rural_urban_classification", DataType::Int64, true),
            Field::new("msoa_code", DataType::Utf8, true),
            Field::new("is_potential_care_home", DataType::Boolean, false),
            Field::new("location_requires_nursing", DataType::Boolean, true),
            Field::new("location_does_not_require_nursing", DataType::Boolean, true),
        ])
    }
}

/// Row of the `households` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseholdRecord {
    /// Patient
    pub patient_id: PatientId,
    /// Household identifier
    pub household_id: i64,
    /// Household size
    pub household_size: i64,
    /// Membership start
    pub start_date: NaiveDate,
    /// Membership end
    pub end_date: Option<NaiveDate>,
}

impl From<HouseholdRecord> for HouseholdMembership {
    fn from(r: HouseholdRecord) -> Self {
        Self {
            household_id: r.household_id,
            household_size: r.household_size,
            start_date: r.start_date,
            end_date: r.end_date,
        }
    }
}

impl ArrowSchema for HouseholdRecord {
    const TABLE: &'static str = "households";

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("patient_id", DataType::UInt64, false),
            Field::new("household_id", DataType::Int64, false),
            Field::new("household_size", DataType::Int64, false),
            Field::new("start_date", DataType::Date32, false),
            Field::new("end_date", DataType::Date32, true),
        ])
    }
}

/// Row of the `clinical_events` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalEventRecord {
    /// Patient
    pub patient_id: PatientId,
    /// Clinical code
    pub code: String,
    /// Date recorded
    pub date: NaiveDate,
    /// Numeric value
    pub numeric_value: Option<f64>,
}

impl From<ClinicalEventRecord> for ClinicalEvent {
    fn from(r: ClinicalEventRecord) -> Self {
        Self {
            code: r.code,
            date: r.date,
            numeric_value: r.numeric_value,
        }
    }
}

impl ArrowSchema for ClinicalEventRecord {
    const TABLE: &'static str = "clinical_events";

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("patient_id", DataType::UInt64, false),
            Field::new("code", DataType::Utf8, false),
            Field::new("date", DataType::Date32, false),
            Field::new("numeric_value", DataType::Float64, true),
        ])
    }
}

/// Row of the `medications` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationRecord {
    /// Patient
    pub patient_id: PatientId,
    /// Medication code
    pub code: String,
    /// Date issued
    pub date: NaiveDate,
}

impl From<MedicationRecord> for MedicationIssue {
    fn from(r: MedicationRecord) -> Self {
        Self {
            code: r.code,
            date: r.date,
        }
    }
}

impl ArrowSchema for MedicationRecord {
    const TABLE: &'static str = "medications";

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("patient_id", DataType::UInt64, false),
            Field::new("code", DataType::Utf8, false),
            Field::new("date", DataType::Date32, false),
        ])
    }
}

/// Row of the `sgss_tests` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgssTestRecord {
    /// Patient
    pub patient_id: PatientId,
    /// Specimen date
    pub date: NaiveDate,
    /// Pathogen
    pub pathogen: String,
    /// Result ("positive" / "negative")
    pub result: String,
    /// S-gene target failure code
    pub s_gene_target_failure: Option<String>,
}

impl From<SgssTestRecord> for SgssTest {
    fn from(r: SgssTestRecord) -> Self {
        Self {
            date: r.date,
            outcome: TestOutcome::from(r.result.as_str()),
            pathogen: r.pathogen,
            s_gene_target_failure: r.s_gene_target_failure,
        }
    }
}

impl ArrowSchema for SgssTestRecord {
    const TABLE: &'static str = "sgss_tests";

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("patient_id", DataType::UInt64, false),
            Field::new("date", DataType::Date32, false),
            Field::new("pathogen", DataType::Utf8, false),
            Field::new("result", DataType::Utf8, false),
            Field::new("s_gene_target_failure", DataType::Utf8, true),
        ])
    }
}

/// Row of the `vaccinations` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaccinationRecord {
    /// Patient
    pub patient_id: PatientId,
    /// Date administered
    pub date: NaiveDate,
    /// Target disease
    pub target_disease: String,
}

impl From<VaccinationRecord> for Vaccination {
    fn from(r: VaccinationRecord) -> Self {
        Self {
            date: r.date,
            target_disease: r.target_disease,
        }
    }
}

impl ArrowSchema for VaccinationRecord {
    const TABLE: &'static str = "vaccinations";

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("patient_id", DataType::UInt64, false),
            Field::new("date", DataType::Date32, false),
            Field::new("target_disease", DataType::Utf8, false),
        ])
    }
}

/// Row of the `emergency_care` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyCareRecord {
    /// Patient
    pub patient_id: PatientId,
    /// Arrival date
    pub arrival_date: NaiveDate,
    /// Diagnosis codes
    pub diagnoses: Vec<String>,
    /// Discharge destination
    pub discharge_destination: Option<String>,
}

impl From<EmergencyCareRecord> for EmergencyAttendance {
    fn from(r: EmergencyCareRecord) -> Self {
        Self {
            arrival_date: r.arrival_date,
            diagnoses: r.diagnoses,
            discharge_destination: r.discharge_destination,
        }
    }
}

impl ArrowSchema for EmergencyCareRecord {
    const TABLE: &'static str = "emergency_care";

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("patient_id", DataType::UInt64, false),
            Field::new("arrival_date", DataType::Date32, false),
            Field::new(
                "diagnoses",
                DataType::List(Arc::new(Field::new("element", DataType::Utf8, false))),
                false,
            ),
            Field::new("discharge_destination", DataType::Utf8, true),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clinical_events_batch_round_trip() {
        let records = vec![
            ClinicalEventRecord {
                patient_id: 1,
                code: "XaERX".to_string(),
                date: NaiveDate::from_ymd_opt(2021, 3, 4).unwrap(),
                numeric_value: Some(62.0),
            },
            ClinicalEventRecord {
                patient_id: 2,
                code: "22K..".to_string(),
                date: NaiveDate::from_ymd_opt(2020, 1, 9).unwrap(),
                numeric_value: None,
            },
        ];
        let batch = ClinicalEventRecord::to_record_batch(&records).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(2).data_type(), &DataType::Date32);

        let back = ClinicalEventRecord::from_record_batch(&batch).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn test_address_record_care_home_mapping() {
        let record = AddressTableRecord {
            patient_id: 1,
            start_date: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
            end_date: None,
            index_of_multiple_deprivation: Some(12_345),
            rural_urban_classification: Some(3),
            msoa_code: None,
            is_potential_care_home: true,
            location_requires_nursing: Some(true),
            location_does_not_require_nursing: Some(false),
        };
        let address = AddressRecord::from(record);
        let care_home = address.care_home.unwrap();
        assert_eq!(care_home.location_requires_nursing, Some(true));
    }
}
