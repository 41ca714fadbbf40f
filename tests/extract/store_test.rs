use std::path::Path;

use cohort_definition::models::records::{
    AddressTableRecord, ClinicalEventRecord, EmergencyCareRecord, HouseholdRecord,
    MedicationRecord, PatientRecord, RegistrationRecord, SgssTestRecord, VaccinationRecord,
};
use cohort_definition::models::{ArrowSchema, TestOutcome, Value};
use cohort_definition::utils::io::{read_parquet, write_parquet};
use cohort_definition::{Extractor, OutputFormat, PatientStore, write_cohort};

use crate::utils::{ASTHMA, PREDNISOLONE, SMOKER, date, scratch_dir, test_config, test_study};

fn write_table<R: ArrowSchema>(dir: &Path, rows: &[R]) {
    let batch = R::to_record_batch(rows).unwrap();
    write_parquet(&dir.join(format!("{}.parquet", R::TABLE)), &[batch]).unwrap();
}

/// Two patients in the population and one outside it, plus an orphan test row
///
/// Patient 1 lives in a nursing home and has asthma treated with two
/// prednisolone issues. Patient 2 smokes, joined a household after the
/// household reference date and attended A&E with COVID. Patient 3 only
/// has a void test in the study period.
fn write_fixture_tables(dir: &Path) {
    write_table(
        dir,
        &[1, 2, 3].map(|patient_id| PatientRecord {
            patient_id,
            sex: Some(if patient_id == 2 { "M" } else { "F" }.to_string()),
            date_of_birth: Some(date(1980, 1, 1)),
            date_of_death: None,
        }),
    );
    write_table(
        dir,
        &[1, 2, 3].map(|patient_id| RegistrationRecord {
            patient_id,
            start_date: date(2010, 1, 1),
            end_date: None,
            practice_pseudo_id: 100 + patient_id as i64,
            stp_code: Some("STP1".to_string()),
            msoa_code: Some("E02000001".to_string()),
            region: Some("North East".to_string()),
        }),
    );
    write_table(
        dir,
        &[
            (1, date(2021, 10, 20), "positive"),
            (2, date(2021, 12, 24), "positive"),
            (3, date(2020, 12, 24), "positive"),
            (3, date(2021, 11, 5), "void"),
            (99, date(2021, 11, 1), "positive"),
        ]
        .map(|(patient_id, on, result)| SgssTestRecord {
            patient_id,
            date: on,
            pathogen: "SARS-CoV-2".to_string(),
            result: result.to_string(),
            s_gene_target_failure: Some("0".to_string()),
        }),
    );
    write_table(
        dir,
        &[VaccinationRecord {
            patient_id: 2,
            date: date(2021, 2, 2),
            target_disease: "SARS-2 CORONAVIRUS".to_string(),
        }],
    );
    write_table(
        dir,
        &[
            AddressTableRecord {
                patient_id: 1,
                start_date: date(2015, 1, 1),
                end_date: None,
                index_of_multiple_deprivation: Some(12_345),
                rural_urban_classification: Some(3),
                msoa_code: Some("E02000002".to_string()),
                is_potential_care_home: true,
                location_requires_nursing: Some(true),
                location_does_not_require_nursing: Some(false),
            },
            AddressTableRecord {
                patient_id: 2,
                start_date: date(2015, 1, 1),
                end_date: None,
                index_of_multiple_deprivation: Some(30_051),
                rural_urban_classification: Some(1),
                msoa_code: Some("E02000003".to_string()),
                is_potential_care_home: false,
                location_requires_nursing: None,
                location_does_not_require_nursing: None,
            },
        ],
    );
    write_table(
        dir,
        &[
            HouseholdRecord {
                patient_id: 1,
                household_id: 7,
                household_size: 4,
                start_date: date(2019, 1, 1),
                end_date: None,
            },
            HouseholdRecord {
                patient_id: 2,
                household_id: 8,
                household_size: 2,
                start_date: date(2021, 1, 1),
                end_date: None,
            },
        ],
    );
    write_table(
        dir,
        &[
            ClinicalEventRecord {
                patient_id: 1,
                code: ASTHMA.to_string(),
                date: date(2019, 5, 1),
                numeric_value: None,
            },
            ClinicalEventRecord {
                patient_id: 2,
                code: SMOKER.to_string(),
                date: date(2020, 1, 1),
                numeric_value: None,
            },
        ],
    );
    write_table(
        dir,
        &[date(2021, 1, 10), date(2021, 6, 10)].map(|on| MedicationRecord {
            patient_id: 1,
            code: PREDNISOLONE.to_string(),
            date: on,
        }),
    );
    write_table(
        dir,
        &[EmergencyCareRecord {
            patient_id: 2,
            arrival_date: date(2022, 1, 5),
            diagnoses: vec!["1240751000000100".to_string()],
            discharge_destination: Some("3".to_string()),
        }],
    );
}

#[test]
fn test_store_loads_parquet_tables() {
    let dir = scratch_dir("store-load");
    write_fixture_tables(&dir);

    let store = PatientStore::load_from_dir(&dir, &test_config()).unwrap();
    assert_eq!(store.len(), 3);

    let patient = store.get(2).unwrap();
    assert_eq!(patient.registrations.len(), 1);
    assert_eq!(patient.sgss_tests.len(), 1);
    assert_eq!(patient.vaccinations.len(), 1);
    assert_eq!(patient.addresses.len(), 1);
    assert_eq!(patient.households.len(), 1);
    assert_eq!(patient.clinical_events.len(), 1);
    assert!(patient.medications.is_empty());
    assert_eq!(patient.emergency_attendances.len(), 1);
    assert_eq!(patient.emergency_attendances[0].diagnoses, ["1240751000000100"]);

    let patient = store.get(1).unwrap();
    assert_eq!(patient.medications.len(), 2);
    let care_home = patient.addresses[0].care_home.as_ref().unwrap();
    assert_eq!(care_home.location_requires_nursing, Some(true));

    let outcomes: Vec<TestOutcome> =
        store.get(3).unwrap().sgss_tests.iter().map(|t| t.outcome).collect();
    assert_eq!(outcomes, [TestOutcome::Positive, TestOutcome::Other]);
    assert!(store.get(99).is_none());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_store_requires_patients_table() {
    let dir = scratch_dir("store-no-patients");
    write_table(
        &dir,
        &[VaccinationRecord {
            patient_id: 1,
            date: date(2021, 2, 2),
            target_disease: "SARS-2 CORONAVIRUS".to_string(),
        }],
    );

    let err = PatientStore::load_from_dir(&dir, &test_config()).unwrap_err();
    assert!(err.to_string().contains("patients"), "{err}");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_end_to_end_extraction_to_csv_and_parquet() {
    let dir = scratch_dir("end-to-end");
    write_fixture_tables(&dir);

    let study = test_study();
    let config = test_config();
    let store = PatientStore::load_from_dir(&dir, &config).unwrap();
    let cohort = Extractor::new(&study, &config).extract(&store).unwrap();
    // Patient 3's void test does not count as positive
    let ids: Vec<u64> = cohort.rows.iter().map(|r| r.patient_id).collect();
    assert_eq!(ids, [1, 2]);

    // Address as of the index date, rounded to the nearest 100
    assert_eq!(cohort.value(1, "imd"), Some(&Value::Int(12_300)));
    assert_eq!(cohort.value(2, "imd"), Some(&Value::Int(30_100)));
    assert_eq!(cohort.value(1, "care_home_type"), Some(&Value::Str("PN".to_string())));
    assert_eq!(cohort.value(2, "care_home_type"), Some(&Value::Str("U".to_string())));
    // Household as of 2020-02-01
    assert_eq!(cohort.value(1, "household_size"), Some(&Value::Int(4)));
    assert_eq!(cohort.value(2, "household_size"), Some(&Value::Null));
    assert_eq!(cohort.value(1, "asthma"), Some(&Value::Str("2".to_string())));
    assert_eq!(cohort.value(2, "asthma"), Some(&Value::Str("0".to_string())));
    assert_eq!(cohort.value(2, "smoking_status"), Some(&Value::Str("S".to_string())));
    assert_eq!(cohort.value(2, "ae_any_date"), Some(&Value::Date(date(2022, 1, 5))));
    assert_eq!(cohort.value(2, "ae_destination"), Some(&Value::Str("3".to_string())));
    assert_eq!(cohort.value(1, "ae_any_date"), Some(&Value::Null));

    let csv_path = dir.join("out").join("cohort.csv");
    write_cohort(&cohort, &csv_path, OutputFormat::Csv, 1).unwrap();
    let text = std::fs::read_to_string(&csv_path).unwrap();
    let mut lines = text.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("patient_id,dereg_date,sgss_pos_inrange,sgtf,"), "{header}");
    assert_eq!(lines.count(), 2);

    let parquet_path = dir.join("out").join("cohort.parquet");
    write_cohort(&cohort, &parquet_path, OutputFormat::Parquet, 1024).unwrap();
    let batches = read_parquet(&parquet_path, None, None).unwrap();
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    assert_eq!(rows, 2);
    assert_eq!(batches[0].num_columns(), cohort.columns.len() + 1);

    let _ = std::fs::remove_dir_all(&dir);
}
