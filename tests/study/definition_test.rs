use cohort_definition::definitions::{INDEX_DATE, SmokingStatus};
use cohort_definition::query::CategoryLabel;
use cohort_definition::study::PATIENT_ID_COLUMN;

use crate::utils::test_study;

#[test]
fn test_omicron_definition_builds() {
    let study = test_study();
    assert_eq!(study.variables().len(), 52);
    assert!(study.variable(INDEX_DATE).is_some());
    assert!(study.variable("one_practice").is_none(), "helpers are not variables");
}

#[test]
fn test_output_columns_follow_declaration_order() {
    let study = test_study();
    let columns: Vec<String> = study.columns().into_iter().map(|(name, _)| name).collect();

    assert_eq!(&columns[..3], ["dereg_date", INDEX_DATE, "sgtf"]);
    assert!(!columns.iter().any(|c| c == PATIENT_ID_COLUMN));

    // Companion columns sit right after their variable
    let position = |name: &str| columns.iter().position(|c| c == name).unwrap();
    assert_eq!(position("creatinine_date"), position("creatinine") + 1);
    assert_eq!(position("bmi_date_measured"), position("bmi") + 1);
    assert_eq!(position("ethnicity_date"), position("ethnicity") + 1);
    assert_eq!(columns.last().map(String::as_str), Some("ra_sle_psoriasis"));

    // Helpers never reach the output
    for helper in ["most_recent_smoking_code", "ever_smoked", "prednisolone_last_year"] {
        assert!(!columns.iter().any(|c| c == helper), "{helper} leaked");
    }
}

#[test]
fn test_dependencies_point_backwards() {
    let study = test_study();
    let order: Vec<String> = study.variables().iter().map(|v| v.name().to_string()).collect();

    for (name, depends_on) in study.dependencies() {
        let Some(own) = order.iter().position(|n| *n == name) else {
            continue;
        };
        for dependency in depends_on {
            if let Some(dep) = order.iter().position(|n| *n == dependency) {
                assert!(dep < own, "{name} depends on later variable {dependency}");
            }
        }
    }

    let vaxdate3 = study
        .dependencies()
        .into_iter()
        .find(|(name, _)| name == "vaxdate3")
        .unwrap();
    assert_eq!(vaxdate3.1, vec!["vaxdate2".to_string()]);
}

#[test]
fn test_smoking_labels_are_exhaustive() {
    let labels: Vec<&str> = SmokingStatus::variants().iter().map(|l| l.code()).collect();
    assert_eq!(labels, ["S", "E", "N", "M"]);

    let study = test_study();
    let expectations = study
        .variable("smoking_status")
        .and_then(|v| v.expectations())
        .unwrap();
    for label in expectations.category_labels() {
        assert!(labels.contains(&label), "unexpected label {label}");
    }
}

#[test]
fn test_plan_serialises_to_json() {
    let study = test_study();
    let plan = serde_json::to_value(study.plan()).unwrap();

    let variables = plan["variables"].as_array().unwrap();
    assert_eq!(variables.len(), study.variables().len());
    assert_eq!(variables[1]["name"], INDEX_DATE);
    assert_eq!(variables[1]["operation"], "with_test_result_in_sgss");

    let smoking = variables
        .iter()
        .find(|v| v["name"] == "smoking_status")
        .unwrap();
    assert_eq!(smoking["helpers"].as_array().unwrap().len(), 2);
    assert!(plan["population"]["predicate"].as_str().unwrap().contains("one_practice"));
}
