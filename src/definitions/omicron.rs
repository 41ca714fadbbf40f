//! Omicron cohort
//!
//! Patients with a first positive SARS-CoV-2 test in SGSS between 2021-10-03
//! and 2022-01-01 who had been registered with one practice for the year
//! before the test. Every covariate is measured relative to that test date
//! (`sgss_pos_inrange`).

use chrono::NaiveDate;

use super::codelists::covid_primary_care_probable;
use super::dictionaries::{REGION_RATIOS, msoa_ratios, stp_ratios};
use super::labels::{AsthmaStatus, CareHomeType, SmokingStatus};
use crate::codelist::{CodelistRegistry, filter_codes_by_category};
use crate::error::{Result, StudyError};
use crate::models::{DateFormat, TestOutcome};
use crate::query::predicate::{eq, gt, lt, var};
use crate::query::source::{AddressAttribute, HouseholdAttribute, PracticeAttribute};
use crate::query::{
    CategoryRule, DateExpr, Distribution, ExpectedDate, MatchSelection, Rate,
    ReturnExpectations, VariableSpec, Windowed, patients,
};
use crate::study::StudyDefinition;

/// The index date every covariate is measured against
pub const INDEX_DATE: &str = "sgss_pos_inrange";

const PATHOGEN: &str = "SARS-CoV-2";
const COVID_VACCINE: &str = "SARS-2 CORONAVIRUS";

fn day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| StudyError::ParseError(format!("invalid date '{s}': {e}")))
}

fn fixed(s: &str) -> Result<ExpectedDate> {
    day(s).map(ExpectedDate::Fixed)
}

fn index_date() -> DateExpr {
    DateExpr::variable(INDEX_DATE)
}

/// Date-of-first-record comorbidity at month precision
fn first_date(name: &str, codelists: &CodelistRegistry, list: &str) -> Result<VariableSpec> {
    Ok(VariableSpec::new(
        name,
        patients::with_these_clinical_events(&codelists.get(list)?)
            .return_first_date_in_period(DateFormat::YearMonth),
    ))
}

/// Date-of-last-record comorbidity at month precision
fn last_date(name: &str, codelists: &CodelistRegistry, list: &str) -> Result<VariableSpec> {
    Ok(VariableSpec::new(
        name,
        patients::with_these_clinical_events(&codelists.get(list)?)
            .return_last_date_in_period(DateFormat::YearMonth),
    ))
}

/// Most recent numeric test result up to the index date
fn last_value(
    name: &str,
    codelists: &CodelistRegistry,
    list: &str,
    expectations: ReturnExpectations,
) -> Result<VariableSpec> {
    Ok(VariableSpec::new(
        name,
        patients::with_these_clinical_events(&codelists.get(list)?)
            .find_last_match_in_period()
            .on_or_before(index_date())
            .returning_numeric_value()
            .include_date_of_match(DateFormat::YearMonth),
    )
    .expecting(expectations))
}

/// Mean blood pressure on the latest day measured
fn blood_pressure(
    name: &str,
    codelists: &CodelistRegistry,
    list: &str,
    mean: f64,
) -> Result<VariableSpec> {
    Ok(VariableSpec::new(
        name,
        patients::mean_recorded_value(&codelists.get(list)?)
            .on_most_recent_day_of_measurement()
            .on_or_before(index_date())
            .include_measurement_date(DateFormat::YearMonth),
    )
    .expecting(
        ReturnExpectations::new()
            .float(Distribution::Normal { mean, stddev: 10.0 })
            .date_until(fixed("2021-11-16")?)
            .incidence(0.95),
    ))
}

fn smoking_status(codelists: &CodelistRegistry) -> Result<VariableSpec> {
    let smoking = codelists.get("clear_smoking_codes")?;
    let rule = CategoryRule::new(SmokingStatus::Missing)
        .when(eq("most_recent_smoking_code", "S"), SmokingStatus::Smoker)
        .when(
            eq("most_recent_smoking_code", "E")
                .or(eq("most_recent_smoking_code", "N").and(var("ever_smoked"))),
            SmokingStatus::ExSmoker,
        )
        .when(
            eq("most_recent_smoking_code", "N").and(!var("ever_smoked")),
            SmokingStatus::Never,
        );

    Ok(VariableSpec::new(
        "smoking_status",
        patients::categorised_as(rule)
            .helper(VariableSpec::new(
                "most_recent_smoking_code",
                patients::with_these_clinical_events(&smoking)
                    .find_last_match_in_period()
                    .on_or_before(index_date())
                    .returning_category(),
            ))
            .helper(VariableSpec::new(
                "ever_smoked",
                patients::with_these_clinical_events(&filter_codes_by_category(
                    &smoking,
                    &["S", "E"],
                ))
                .on_or_before(index_date()),
            )),
    )
    .expecting(ReturnExpectations::new().ratios([
        ("S", 0.6),
        ("E", 0.1),
        ("N", 0.2),
        ("M", 0.1),
    ])))
}

fn asthma(codelists: &CodelistRegistry) -> Result<VariableSpec> {
    let asthma_codes = codelists.get("asthma_codes")?;
    let has_asthma = var("recent_asthma_code")
        .or(var("asthma_code_ever").and(!var("copd_code_ever")));
    let rule = CategoryRule::new(AsthmaStatus::None)
        .when(
            has_asthma.clone().and(
                eq("prednisolone_last_year", 0).or(gt("prednisolone_last_year", 4)),
            ),
            AsthmaStatus::WithoutSteroids,
        )
        .when(
            has_asthma
                .and(gt("prednisolone_last_year", 0))
                .and(lt("prednisolone_last_year", 5)),
            AsthmaStatus::WithSteroids,
        );

    Ok(VariableSpec::new(
        "asthma",
        patients::categorised_as(rule)
            .helper(VariableSpec::new(
                "recent_asthma_code",
                patients::with_these_clinical_events(&asthma_codes)
                    .between(day("2018-02-01")?, index_date()),
            ))
            .helper(VariableSpec::new(
                "asthma_code_ever",
                patients::with_these_clinical_events(&asthma_codes),
            ))
            .helper(VariableSpec::new(
                "copd_code_ever",
                patients::with_these_clinical_events(
                    &codelists.get("chronic_respiratory_disease_codes")?,
                ),
            ))
            .helper(VariableSpec::new(
                "prednisolone_last_year",
                patients::with_these_medications(&codelists.get("pred_codes")?)
                    .between(day("2020-11-01")?, index_date())
                    .number_of_matches_in_period(),
            )),
    )
    .expecting(ReturnExpectations::new().ratios([("0", 0.8), ("1", 0.1), ("2", 0.1)])))
}

fn care_home_type() -> Result<VariableSpec> {
    let rule = CategoryRule::new(CareHomeType::PrivateHome)
        .when(
            var("IsPotentialCareHome")
                .and(eq("LocationDoesNotRequireNursing", "Y"))
                .and(eq("LocationRequiresNursing", "N")),
            CareHomeType::Residential,
        )
        .when(
            var("IsPotentialCareHome")
                .and(eq("LocationDoesNotRequireNursing", "N"))
                .and(eq("LocationRequiresNursing", "Y")),
            CareHomeType::Nursing,
        )
        .when(var("IsPotentialCareHome"), CareHomeType::Unspecified);

    Ok(VariableSpec::new(
        "care_home_type",
        patients::care_home_status_as_of(index_date(), rule),
    )
    .expecting(ReturnExpectations::new().universal().ratios([
        ("PC", 0.05),
        ("PN", 0.05),
        ("PS", 0.05),
        ("U", 0.85),
    ])))
}

/// Outcome and testing variables, in declaration order
fn outcomes(codelists: &CodelistRegistry) -> Result<Vec<VariableSpec>> {
    let snomed_covid = codelists.get("snomed_covid")?;
    let mut vars = vec![
        VariableSpec::new(
            "dereg_date",
            patients::date_deregistered_from_all_supported_practices(DateFormat::YearMonth)
                .on_or_after(day("2021-11-01")?),
        ),
        VariableSpec::new(
            INDEX_DATE,
            patients::with_test_result_in_sgss(PATHOGEN, TestOutcome::Positive)
                .find_first_match_in_period()
                .between(day("2021-10-03")?, day("2022-01-01")?)
                .returning_date(DateFormat::YearMonthDay),
        )
        .expecting(
            ReturnExpectations::new()
                .date_between(fixed("2021-10-03")?, ExpectedDate::Today)
                .incidence(0.9),
        ),
        VariableSpec::new(
            "sgtf",
            patients::with_test_result_in_sgss(PATHOGEN, TestOutcome::Positive)
                .find_first_match_in_period()
                .between(day("2021-10-03")?, day("2022-01-01")?)
                .returning_s_gene_target_failure(),
        )
        .expecting(ReturnExpectations::new().universal().ratios([
            ("0", 0.7),
            ("1", 0.1),
            ("9", 0.1),
            ("", 0.1),
        ])),
        VariableSpec::new(
            "died_date_ons",
            patients::died_from_any_cause()
                .on_or_after(day("2020-02-01")?)
                .returning_date_of_death(DateFormat::YearMonthDay),
        )
        .expecting(
            ReturnExpectations::new()
                .date_from(fixed("2021-10-01")?)
                .incidence(0.1),
        ),
        VariableSpec::new(
            "ae_covid_date",
            patients::attended_emergency_care()
                .with_these_diagnoses(&snomed_covid)
                .on_or_after(index_date())
                .find_first_match_in_period()
                .returning_date_arrived(DateFormat::YearMonthDay),
        )
        .expecting(
            ReturnExpectations::new()
                .date_from(fixed("2021-10-02")?)
                .incidence(0.2),
        ),
        VariableSpec::new(
            "ae_destination",
            patients::attended_emergency_care()
                .with_these_diagnoses(&snomed_covid)
                .on_or_after(index_date())
                .find_first_match_in_period()
                .returning_discharge_destination(),
        )
        .expecting(ReturnExpectations::new().universal().ratios([
            ("1", 0.1),
            ("2", 0.1),
            ("3", 0.1),
            ("4", 0.1),
            ("5", 0.1),
            ("6", 0.1),
            ("7", 0.2),
            ("8", 0.2),
        ])),
        VariableSpec::new(
            "ae_any_date",
            patients::attended_emergency_care()
                .on_or_after(index_date())
                .find_first_match_in_period()
                .returning_date_arrived(DateFormat::YearMonthDay),
        )
        .expecting(
            ReturnExpectations::new()
                .date_from(fixed("2021-10-02")?)
                .incidence(0.3),
        ),
    ];

    // Each dose is the first vaccination after the previous one
    for (name, after, earliest, incidence) in [
        ("vaxdate1", DateExpr::from(day("2020-12-08")?), "2020-12-08", 0.8),
        ("vaxdate2", DateExpr::variable("vaxdate1").plus_days(1), "2021-01-08", 0.7),
        ("vaxdate3", DateExpr::variable("vaxdate2").plus_days(1), "2021-02-08", 0.5),
    ] {
        vars.push(
            VariableSpec::new(
                name,
                patients::with_tpp_vaccination_record(COVID_VACCINE)
                    .on_or_after(after)
                    .find_first_match_in_period()
                    .returning_date(DateFormat::YearMonthDay),
            )
            .expecting(
                ReturnExpectations::new()
                    .date_between(fixed(earliest)?, ExpectedDate::Today)
                    .incidence(incidence),
            ),
        );
    }

    vars.push(
        VariableSpec::new(
            "last_covid_tpp_probable",
            patients::with_these_clinical_events(&covid_primary_care_probable(codelists)?)
                .between(day("2020-08-01")?, index_date().minus_days(7))
                .return_last_date_in_period(DateFormat::YearMonthDay),
        )
        .expecting(
            ReturnExpectations::new()
                .date_from(fixed("2020-11-01")?)
                .incidence(0.2),
        ),
    );
    vars.push(
        VariableSpec::new(
            "last_pos_test_sgss",
            patients::with_test_result_in_sgss(PATHOGEN, TestOutcome::Positive)
                .find_last_match_in_period()
                .between(day("2020-08-01")?, index_date().minus_days(1))
                .returning_date(DateFormat::YearMonthDay),
        )
        .expecting(
            ReturnExpectations::new()
                .date_from(fixed("2020-11-01")?)
                .incidence(0.1),
        ),
    );
    Ok(vars)
}

/// Demographic and geographic covariates, in declaration order
fn demographics() -> Result<Vec<VariableSpec>> {
    let household_date = day("2020-02-01")?;
    Ok(vec![
        VariableSpec::new("age", patients::age_as_of(index_date())).expecting(
            ReturnExpectations::new()
                .universal()
                .int(Distribution::PopulationAges),
        ),
        VariableSpec::new("sex", patients::sex()).expecting(
            ReturnExpectations::new()
                .universal()
                .ratios([("M", 0.49), ("F", 0.51)]),
        ),
        VariableSpec::new(
            "imd",
            patients::address_as_of(
                index_date(),
                AddressAttribute::IndexOfMultipleDeprivation {
                    round_to_nearest: Some(100),
                },
            ),
        )
        .expecting(ReturnExpectations::new().universal().ratios([
            ("100", 0.1),
            ("200", 0.2),
            ("300", 0.2),
            ("400", 0.2),
            ("500", 0.2),
            ("600", 0.1),
        ])),
        VariableSpec::new(
            "stp",
            patients::registered_practice_as_of(index_date(), PracticeAttribute::StpCode),
        )
        .expecting(ReturnExpectations::new().universal().ratios(stp_ratios())),
        VariableSpec::new(
            "msoa",
            patients::registered_practice_as_of(index_date(), PracticeAttribute::MsoaCode),
        )
        .expecting(ReturnExpectations::new().universal().ratios(msoa_ratios())),
        VariableSpec::new(
            "region",
            patients::registered_practice_as_of(index_date(), PracticeAttribute::Nuts1RegionName),
        )
        .expecting(ReturnExpectations::new().universal().ratios(REGION_RATIOS)),
        VariableSpec::new(
            "rural_urban",
            patients::address_as_of(index_date(), AddressAttribute::RuralUrbanClassification),
        )
        .expecting(ReturnExpectations::new().universal().ratios([
            ("1", 0.1),
            ("2", 0.1),
            ("3", 0.1),
            ("4", 0.1),
            ("5", 0.1),
            ("6", 0.1),
            ("7", 0.2),
            ("8", 0.2),
        ])),
        VariableSpec::new(
            "household_id",
            patients::household_as_of(household_date, HouseholdAttribute::PseudoId),
        )
        .expecting(
            ReturnExpectations::new()
                .int(Distribution::Normal {
                    mean: 1000.0,
                    stddev: 200.0,
                })
                .incidence(1.0),
        ),
        VariableSpec::new(
            "household_size",
            patients::household_as_of(household_date, HouseholdAttribute::HouseholdSize),
        )
        .expecting(
            ReturnExpectations::new()
                .int(Distribution::Normal {
                    mean: 3.0,
                    stddev: 1.0,
                })
                .incidence(1.0),
        ),
        care_home_type()?,
    ])
}

/// Clinical covariates, in declaration order
fn clinical(codelists: &CodelistRegistry) -> Result<Vec<VariableSpec>> {
    let mut vars = vec![
        VariableSpec::new(
            "bmi",
            patients::most_recent_bmi()
                .between(day("2010-02-01")?, index_date())
                .minimum_age_at_measurement(16)
                .include_measurement_date(DateFormat::YearMonth),
        )
        .expecting(
            ReturnExpectations::new()
                .any_date()
                .float(Distribution::Normal {
                    mean: 35.0,
                    stddev: 10.0,
                })
                .incidence(0.95),
        ),
        smoking_status(codelists)?,
        VariableSpec::new(
            "ethnicity",
            patients::with_these_clinical_events(&codelists.get("ethnicity_codes")?)
                .returning_category()
                .find_last_match_in_period()
                .include_date_of_match(DateFormat::Year),
        )
        .expecting(
            ReturnExpectations::new()
                .ratios([("1", 0.75), ("2", 0.05), ("3", 0.05), ("4", 0.05), ("5", 0.1)])
                .incidence(0.75),
        ),
        VariableSpec::new(
            "ethnicity_16",
            patients::with_these_clinical_events(&codelists.get("ethnicity_codes_16")?)
                .returning_category()
                .find_last_match_in_period()
                .include_date_of_match(DateFormat::Year),
        )
        .expecting(
            ReturnExpectations::new()
                .ratios([("1", 0.8), ("5", 0.1), ("3", 0.1)])
                .incidence(0.75),
        ),
        first_date(
            "chronic_respiratory_disease",
            codelists,
            "chronic_respiratory_disease_codes",
        )?,
        asthma(codelists)?,
    ];

    for (name, list) in [
        ("chronic_cardiac_disease", "chronic_cardiac_disease_codes"),
        ("diabetes", "diabetes_codes"),
        ("lung_cancer", "lung_cancer_codes"),
        ("haem_cancer", "haem_cancer_codes"),
        ("other_cancer", "other_cancer_codes"),
        ("chronic_liver_disease", "chronic_liver_disease_codes"),
        ("other_neuro", "other_neuro"),
        ("stroke", "stroke"),
        ("dementia", "dementia"),
    ] {
        vars.push(first_date(name, codelists, list)?);
    }

    vars.push(last_value(
        "creatinine",
        codelists,
        "creatinine_codes",
        ReturnExpectations::new()
            .float(Distribution::Normal {
                mean: 60.0,
                stddev: 15.0,
            })
            .date_between(fixed("2019-02-28")?, fixed("2021-11-16")?)
            .incidence(0.95),
    )?);

    for (name, list) in [
        ("dialysis", "dialysis_codes"),
        ("organ_transplant", "organ_transplant_codes"),
        ("dysplenia", "spleen_codes"),
        ("sickle_cell", "sickle_cell_codes"),
    ] {
        vars.push(first_date(name, codelists, list)?);
    }
    vars.push(last_date("aplastic_anaemia", codelists, "aplastic_codes")?);

    vars.push(
        VariableSpec::new(
            "hiv",
            patients::with_these_clinical_events(&codelists.get("hiv_codes")?)
                .returning_category()
                .find_first_match_in_period()
                .include_date_of_match(DateFormat::YearMonth),
        )
        .expecting(ReturnExpectations::new().ratios([("43C3.", 0.8), ("XaFuL", 0.2)])),
    );
    vars.push(first_date(
        "permanent_immunodeficiency",
        codelists,
        "permanent_immune_codes",
    )?);
    vars.push(last_date(
        "temporary_immunodeficiency",
        codelists,
        "temp_immune_codes",
    )?);
    vars.push(first_date("hypertension", codelists, "hypertension_codes")?);

    vars.push(blood_pressure(
        "bp_sys",
        codelists,
        "systolic_blood_pressure_codes",
        80.0,
    )?);
    vars.push(blood_pressure(
        "bp_dias",
        codelists,
        "diastolic_blood_pressure_codes",
        120.0,
    )?);

    let until = fixed("2021-11-16")?;
    vars.push(last_value(
        "hba1c_mmol_per_mol",
        codelists,
        "hba1c_new_codes",
        ReturnExpectations::new()
            .date_until(until)
            .float(Distribution::Normal {
                mean: 40.0,
                stddev: 20.0,
            })
            .incidence(0.95),
    )?);
    vars.push(last_value(
        "hba1c_percentage",
        codelists,
        "hba1c_old_codes",
        ReturnExpectations::new()
            .date_until(until)
            .float(Distribution::Normal {
                mean: 5.0,
                stddev: 2.0,
            })
            .incidence(0.95),
    )?);

    vars.push(first_date(
        "ra_sle_psoriasis",
        codelists,
        "ra_sle_psoriasis_codes",
    )?);
    Ok(vars)
}

/// Build and validate the study definition
///
/// # Arguments
/// * `codelists` - Registry holding every codelist named in
///   [`STUDY_CODELISTS`](super::codelists::STUDY_CODELISTS) and
///   [`INLINE_CODELISTS`](super::codelists::INLINE_CODELISTS)
pub fn study_definition(codelists: &CodelistRegistry) -> Result<StudyDefinition> {
    let defaults = ReturnExpectations::new()
        .date_between(fixed("1970-01-01")?, ExpectedDate::Today)
        .rate(Rate::Uniform)
        .incidence(0.2);

    let one_practice = VariableSpec::new(
        "one_practice",
        patients::registered_with_one_practice_between(index_date().minus_years(1), index_date()),
    );

    StudyDefinition::builder()
        .default_expectations(defaults)
        .population(var("one_practice").and(var(INDEX_DATE)), vec![one_practice])
        .variables(outcomes(codelists)?)
        .variables(demographics()?)
        .variables(clinical(codelists)?)
        .build()
}
