use std::collections::HashSet;

use cohort_definition::models::Value;
use cohort_definition::{DummyDataGenerator, ExtractionConfig};

use crate::utils::{date, test_config, test_study};

fn dummy_config(seed: u64) -> ExtractionConfig {
    ExtractionConfig {
        dummy_data: true,
        population_size: 500,
        seed: Some(seed),
        ..test_config()
    }
}

#[test]
fn test_seeded_dummy_data_is_reproducible() {
    let study = test_study();
    let first = DummyDataGenerator::new(&study, &dummy_config(7)).generate().unwrap();
    let second = DummyDataGenerator::new(&study, &dummy_config(7)).generate().unwrap();
    let other = DummyDataGenerator::new(&study, &dummy_config(8)).generate().unwrap();

    assert_eq!(first.len(), 500);
    assert_eq!(first, second);
    assert_ne!(first, other);
}

#[test]
fn test_dummy_values_respect_expectations() {
    let study = test_study();
    let cohort = DummyDataGenerator::new(&study, &dummy_config(11)).generate().unwrap();

    let ids: Vec<u64> = cohort.rows.iter().map(|r| r.patient_id).collect();
    assert_eq!(ids.first(), Some(&1));
    assert_eq!(ids.last(), Some(&500));

    for value in cohort.column("sex").unwrap() {
        assert!(matches!(value, Value::Str(s) if s == "M" || s == "F"), "{value}");
    }
    for value in cohort.column("age").unwrap() {
        assert!(matches!(value, Value::Int(age) if (0..=105).contains(age)), "{value}");
    }

    // Categorisations always fall back to a default label
    for (column, labels) in [
        ("smoking_status", &["S", "E", "N", "M"][..]),
        ("asthma", &["0", "1", "2"][..]),
        ("care_home_type", &["PC", "PN", "PS", "U"][..]),
    ] {
        let allowed: HashSet<&str> = labels.iter().copied().collect();
        for value in cohort.column(column).unwrap() {
            match value {
                Value::Str(s) => assert!(allowed.contains(s.as_str()), "{column}: {s}"),
                other => panic!("unexpected {column} value {other}"),
            }
        }
    }

    // Declared window is 2021-10-03 to today
    let earliest = date(2021, 10, 3);
    let latest = date(2022, 3, 1);
    let mut present = 0;
    for value in cohort.column("sgss_pos_inrange").unwrap() {
        if let Value::Date(d) = value {
            assert!(*d >= earliest && *d <= latest, "{d}");
            present += 1;
        }
    }
    // Incidence 0.9
    assert!(present > 400 && present < 490, "{present}");

    // Companion dates appear only with a value
    for row in &cohort.rows {
        let creatinine = &row.values[cohort.column_index("creatinine").unwrap()];
        let measured = &row.values[cohort.column_index("creatinine_date").unwrap()];
        assert_eq!(creatinine.is_null(), measured.is_null());
    }
}
