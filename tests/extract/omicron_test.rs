use cohort_definition::codelist::{CodeSystem, codelist};
use cohort_definition::models::{DateFormat, Value};
use cohort_definition::query::predicate::{gt_eq, var};
use cohort_definition::query::{DateExpr, MatchSelection, VariableSpec, Windowed, patients};
use cohort_definition::{Extractor, PatientStore, StudyDefinition};

use crate::utils::{
    ASTHMA, EX_SMOKER, NEVER_SMOKED, PREDNISOLONE, PatientBuilder, SMOKER, WHITE_BRITISH, date,
    eligible_patient, test_config, test_study,
};

fn date_value(y: i32, m: u32, d: u32) -> Value {
    Value::Date(date(y, m, d))
}

fn str_value(s: &str) -> Value {
    Value::Str(s.to_string())
}

#[test]
fn test_demographics_measured_at_index_date() {
    let study = test_study();
    let store = PatientStore::from_patients([eligible_patient(1).died(date(2022, 1, 20)).build()]);
    let cohort = Extractor::new(&study, &test_config()).extract(&store).unwrap();

    assert_eq!(cohort.len(), 1);
    assert_eq!(cohort.value(1, "sgss_pos_inrange"), Some(&date_value(2021, 11, 15)));
    assert_eq!(cohort.value(1, "sgtf"), Some(&str_value("1")));
    assert_eq!(cohort.value(1, "age"), Some(&Value::Int(51)));
    assert_eq!(cohort.value(1, "sex"), Some(&str_value("F")));
    assert_eq!(cohort.value(1, "stp"), Some(&str_value("STP3")));
    assert_eq!(cohort.value(1, "region"), Some(&str_value("London")));
    assert_eq!(cohort.value(1, "died_date_ons"), Some(&date_value(2022, 1, 20)));
    assert_eq!(cohort.value(1, "dereg_date"), Some(&Value::Null));
    // No address on record
    assert_eq!(cohort.value(1, "imd"), Some(&Value::Null));
    assert_eq!(cohort.value(1, "care_home_type"), Some(&str_value("U")));
}

#[test]
fn test_vaccination_doses_chain_on_previous_dose() {
    let study = test_study();
    let store = PatientStore::from_patients([
        eligible_patient(1).vaccinated(date(2020, 12, 10)).build(),
        eligible_patient(2)
            .vaccinated(date(2021, 6, 1))
            .vaccinated(date(2020, 12, 10))
            .vaccinated(date(2021, 1, 5))
            .build(),
    ]);
    let cohort = Extractor::new(&study, &test_config()).extract(&store).unwrap();

    assert_eq!(cohort.value(1, "vaxdate1"), Some(&date_value(2020, 12, 10)));
    assert_eq!(cohort.value(1, "vaxdate2"), Some(&Value::Null));
    assert_eq!(cohort.value(1, "vaxdate3"), Some(&Value::Null));

    assert_eq!(cohort.value(2, "vaxdate1"), Some(&date_value(2020, 12, 10)));
    assert_eq!(cohort.value(2, "vaxdate2"), Some(&date_value(2021, 1, 5)));
    assert_eq!(cohort.value(2, "vaxdate3"), Some(&date_value(2021, 6, 1)));
}

#[test]
fn test_smoking_status_categories() {
    let study = test_study();
    let store = PatientStore::from_patients([
        // Never recorded after an earlier smoking code
        eligible_patient(1)
            .event(SMOKER, date(2015, 1, 1), None)
            .event(NEVER_SMOKED, date(2021, 1, 1), None)
            .build(),
        eligible_patient(2)
            .event(NEVER_SMOKED, date(2021, 1, 1), None)
            .build(),
        eligible_patient(3)
            .event(EX_SMOKER, date(2019, 4, 2), None)
            .build(),
        eligible_patient(4).event(SMOKER, date(2020, 4, 2), None).build(),
        eligible_patient(5).build(),
        // Only a smoking code after the index date
        eligible_patient(6).event(SMOKER, date(2021, 12, 1), None).build(),
    ]);
    let cohort = Extractor::new(&study, &test_config()).extract(&store).unwrap();

    let smoking: Vec<&Value> = cohort.column("smoking_status").unwrap();
    let expected = ["E", "N", "E", "S", "M", "M"].map(str_value);
    assert_eq!(smoking, expected.iter().collect::<Vec<_>>());
}

#[test]
fn test_asthma_uses_prednisolone_count() {
    let study = test_study();
    let store = PatientStore::from_patients([
        eligible_patient(1).event(ASTHMA, date(2019, 1, 1), None).build(),
        eligible_patient(2)
            .event(ASTHMA, date(2019, 1, 1), None)
            .medication(PREDNISOLONE, date(2021, 2, 1))
            .medication(PREDNISOLONE, date(2021, 8, 1))
            .build(),
        eligible_patient(3).build(),
    ]);
    let cohort = Extractor::new(&study, &test_config()).extract(&store).unwrap();

    assert_eq!(cohort.value(1, "asthma"), Some(&str_value("1")));
    assert_eq!(cohort.value(2, "asthma"), Some(&str_value("2")));
    assert_eq!(cohort.value(3, "asthma"), Some(&str_value("0")));
}

#[test]
fn test_clinical_values_and_companion_dates() {
    let study = test_study();
    let patient = eligible_patient(1)
        .event("XE2q5", date(2021, 1, 1), Some(70.0))
        .event("XE2q5", date(2021, 6, 10), Some(80.0))
        // After the index date
        .event("XE2q5", date(2021, 12, 1), Some(90.0))
        .event("2469.", date(2020, 3, 3), Some(150.0))
        .event("2469.", date(2021, 5, 5), Some(120.0))
        .event("2469.", date(2021, 5, 5), Some(130.0))
        .event("22K..", date(2021, 3, 3), Some(28.5))
        .event(WHITE_BRITISH, date(2010, 7, 4), None)
        .event("43C3.", date(2019, 2, 14), None)
        .event("chronic_cardiac_disease_codes-code", date(2012, 3, 14), None)
        .build();
    let store = PatientStore::from_patients([patient]);
    let cohort = Extractor::new(&study, &test_config()).extract(&store).unwrap();

    assert_eq!(cohort.value(1, "creatinine"), Some(&Value::Float(80.0)));
    assert_eq!(cohort.value(1, "creatinine_date"), Some(&date_value(2021, 6, 1)));
    assert_eq!(cohort.value(1, "bp_sys"), Some(&Value::Float(125.0)));
    assert_eq!(cohort.value(1, "bp_sys_date_measured"), Some(&date_value(2021, 5, 1)));
    assert_eq!(cohort.value(1, "bp_dias"), Some(&Value::Null));
    assert_eq!(cohort.value(1, "bmi"), Some(&Value::Float(28.5)));
    assert_eq!(cohort.value(1, "bmi_date_measured"), Some(&date_value(2021, 3, 1)));
    assert_eq!(cohort.value(1, "ethnicity"), Some(&str_value("1")));
    assert_eq!(cohort.value(1, "ethnicity_date"), Some(&date_value(2010, 1, 1)));
    assert_eq!(cohort.value(1, "hiv"), Some(&str_value("43C3.")));
    assert_eq!(cohort.value(1, "hiv_date"), Some(&date_value(2019, 2, 1)));
    assert_eq!(cohort.value(1, "chronic_cardiac_disease"), Some(&date_value(2012, 3, 1)));
    assert_eq!(cohort.value(1, "diabetes"), Some(&Value::Null));
}

#[test]
fn test_population_excludes_ineligible_patients() {
    let study = test_study();
    let store = PatientStore::from_patients([
        eligible_patient(1).build(),
        // Positive test outside the study window
        PatientBuilder::new(2)
            .registered()
            .positive_test(date(2021, 9, 1), None)
            .build(),
        // Registered for less than a year
        PatientBuilder::new(3)
            .registration(date(2021, 6, 1), None)
            .positive_test(date(2021, 11, 15), None)
            .build(),
        // Never registered
        PatientBuilder::new(4)
            .positive_test(date(2021, 11, 15), None)
            .build(),
        // Changed practice during the year
        PatientBuilder::new(5)
            .registration(date(2015, 1, 1), Some(date(2021, 4, 30)))
            .registration(date(2021, 5, 1), None)
            .positive_test(date(2021, 11, 15), None)
            .build(),
        eligible_patient(6).build(),
    ]);
    let cohort = Extractor::new(&study, &test_config()).extract(&store).unwrap();

    let ids: Vec<u64> = cohort.rows.iter().map(|r| r.patient_id).collect();
    assert_eq!(ids, [1, 6]);
}

#[test]
fn test_missing_s_gene_result_is_empty_label() {
    let study = test_study();
    let store = PatientStore::from_patients([PatientBuilder::new(1)
        .registered()
        .positive_test(date(2021, 12, 1), None)
        .build()]);
    let cohort = Extractor::new(&study, &test_config()).extract(&store).unwrap();
    assert_eq!(cohort.value(1, "sgtf"), Some(&str_value("")));
}

#[test]
fn test_extraction_is_deterministic_across_thread_counts() {
    let study = test_study();
    let store = PatientStore::from_patients((1..=200).map(|id| {
        let mut builder = eligible_patient(id).vaccinated(date(2021, 1, (id % 28) as u32 + 1));
        if id % 3 == 0 {
            builder = builder.event(SMOKER, date(2019, 5, 5), None);
        }
        if id % 7 == 0 {
            builder = builder.died(date(2022, 2, 2));
        }
        builder.build()
    }));

    let mut single = test_config();
    single.threads = 1;
    let mut many = test_config();
    many.threads = 8;

    let first = Extractor::new(&study, &single).extract(&store).unwrap();
    let second = Extractor::new(&study, &many).extract(&store).unwrap();
    assert_eq!(first.len(), 200);
    assert_eq!(first, second);
}

#[test]
fn test_unresolvable_window_gives_zero_flag() {
    let list = codelist("test_codes", ["ABC.."], CodeSystem::Ctv3);
    let study = StudyDefinition::builder()
        .population(gt_eq("age", 0), Vec::new())
        .variable(VariableSpec::new("age", patients::age_as_of(DateExpr::today())))
        .variable(VariableSpec::new(
            "index",
            patients::with_these_clinical_events(&list)
                .find_first_match_in_period()
                .returning_date(DateFormat::YearMonthDay),
        ))
        .variable(VariableSpec::new(
            "after_index",
            patients::with_these_clinical_events(&list)
                .on_or_after(DateExpr::variable("index").plus_days(1)),
        ))
        .variable(VariableSpec::new(
            "has_index",
            patients::satisfying(var("index")),
        ))
        .build()
        .unwrap();

    let store = PatientStore::from_patients([PatientBuilder::new(1).build()]);
    let cohort = Extractor::new(&study, &test_config()).extract(&store).unwrap();
    assert_eq!(cohort.value(1, "index"), Some(&Value::Null));
    assert_eq!(cohort.value(1, "after_index"), Some(&Value::Int(0)));
    assert_eq!(cohort.value(1, "has_index"), Some(&Value::Int(0)));
}
