use cohort_definition::codelist::{CodeSystem, codelist};
use cohort_definition::models::{DateFormat, TestOutcome};
use cohort_definition::query::predicate::var;
use cohort_definition::query::{
    DateExpr, MatchSelection, ReturnExpectations, VariableSpec, Windowed, patients,
};
use cohort_definition::{StudyDefinition, StudyError};

fn first_positive(name: &str) -> VariableSpec {
    VariableSpec::new(
        name,
        patients::with_test_result_in_sgss("SARS-CoV-2", TestOutcome::Positive)
            .find_first_match_in_period()
            .returning_date(DateFormat::YearMonthDay),
    )
}

fn event_after(name: &str, after: &str) -> VariableSpec {
    let list = codelist("test_codes", ["ABC.."], CodeSystem::Ctv3);
    VariableSpec::new(
        name,
        patients::with_these_clinical_events(&list).on_or_after(DateExpr::variable(after)),
    )
}

#[test]
fn test_forward_reference_is_rejected() {
    let err = StudyDefinition::builder()
        .population(var("index"), Vec::new())
        .variable(event_after("asthma", "index"))
        .variable(first_positive("index"))
        .build()
        .unwrap_err();
    assert!(matches!(err, StudyError::ForwardReference { .. }), "{err}");
    assert!(err.is_definition_error());
}

#[test]
fn test_unknown_reference_is_rejected() {
    let err = StudyDefinition::builder()
        .population(var("index"), Vec::new())
        .variable(first_positive("index"))
        .variable(event_after("asthma", "no_such_date"))
        .build()
        .unwrap_err();
    assert!(matches!(err, StudyError::UnknownVariable { .. }), "{err}");
}

#[test]
fn test_date_reference_must_be_a_date() {
    let err = StudyDefinition::builder()
        .population(var("index"), Vec::new())
        .variable(first_positive("index"))
        .variable(event_after("flag", "index"))
        .variable(event_after("second", "flag"))
        .build()
        .unwrap_err();
    assert!(matches!(err, StudyError::NotADate { .. }), "{err}");
}

#[test]
fn test_duplicate_names_are_rejected() {
    let err = StudyDefinition::builder()
        .population(var("index"), Vec::new())
        .variable(first_positive("index"))
        .variable(first_positive("index"))
        .build()
        .unwrap_err();
    assert!(matches!(err, StudyError::DuplicateVariable(_)), "{err}");
}

#[test]
fn test_population_is_required() {
    let err = StudyDefinition::builder()
        .variable(first_positive("index"))
        .build()
        .unwrap_err();
    assert!(matches!(err, StudyError::MissingPopulation), "{err}");
}

#[test]
fn test_unproducible_ratio_label_is_rejected() {
    let err = StudyDefinition::builder()
        .population(var("index"), Vec::new())
        .variable(first_positive("index"))
        .variable(
            VariableSpec::new("sex", patients::sex())
                .expecting(ReturnExpectations::new().ratios([("M", 0.5), ("X", 0.5)])),
        )
        .build()
        .unwrap_err();
    match err {
        StudyError::UnproducibleLabel { variable, label, .. } => {
            assert_eq!(variable, "sex");
            assert_eq!(label, "X");
        }
        other => panic!("unexpected error {other}"),
    }
}
