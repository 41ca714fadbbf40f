//! Codelists used by the study
//!
//! File-backed codelists are read from the codelist directory; a handful of
//! single-purpose lists are small enough to be written out here.

use std::path::Path;
use std::sync::Arc;

use crate::codelist::{
    CodeSystem, Codelist, CodelistRegistry, CodelistSpec, codelist, combine_codelists,
};
use crate::error::Result;

const fn ctv3(name: &'static str, file: &'static str) -> CodelistSpec {
    CodelistSpec {
        name,
        file,
        system: CodeSystem::Ctv3,
        column: "CTV3ID",
        category_column: None,
    }
}

/// Codelists loaded from CSV files
pub const STUDY_CODELISTS: &[CodelistSpec] = &[
    ctv3(
        "covid_identification_in_primary_care_case_codes_clinical",
        "opensafely-covid-identification-in-primary-care-probable-covid-clinical-code.csv",
    ),
    ctv3(
        "covid_identification_in_primary_care_case_codes_test",
        "opensafely-covid-identification-in-primary-care-probable-covid-positive-test.csv",
    ),
    ctv3(
        "covid_identification_in_primary_care_case_codes_seq",
        "opensafely-covid-identification-in-primary-care-probable-covid-sequelae.csv",
    ),
    CodelistSpec {
        name: "snomed_covid",
        file: "opensafely-covid-19-ae-diagnosis-codes.csv",
        system: CodeSystem::Snomed,
        column: "code",
        category_column: None,
    },
    CodelistSpec {
        name: "clear_smoking_codes",
        file: "opensafely-smoking-clear.csv",
        system: CodeSystem::Ctv3,
        column: "CTV3Code",
        category_column: Some("Category"),
    },
    CodelistSpec {
        name: "ethnicity_codes",
        file: "opensafely-ethnicity.csv",
        system: CodeSystem::Ctv3,
        column: "Code",
        category_column: Some("Grouping_6"),
    },
    CodelistSpec {
        name: "ethnicity_codes_16",
        file: "opensafely-ethnicity.csv",
        system: CodeSystem::Ctv3,
        column: "Code",
        category_column: Some("Grouping_16"),
    },
    ctv3(
        "chronic_respiratory_disease_codes",
        "opensafely-chronic-respiratory-disease.csv",
    ),
    ctv3("asthma_codes", "opensafely-asthma-diagnosis.csv"),
    CodelistSpec {
        name: "pred_codes",
        file: "opensafely-asthma-oral-prednisolone-medication.csv",
        system: CodeSystem::Dmd,
        column: "snomed_id",
        category_column: None,
    },
    ctv3(
        "chronic_cardiac_disease_codes",
        "opensafely-chronic-cardiac-disease.csv",
    ),
    ctv3("diabetes_codes", "opensafely-diabetes.csv"),
    ctv3("lung_cancer_codes", "opensafely-lung-cancer.csv"),
    ctv3("haem_cancer_codes", "opensafely-haematological-cancer.csv"),
    ctv3(
        "other_cancer_codes",
        "opensafely-cancer-excluding-lung-and-haematological.csv",
    ),
    ctv3(
        "chronic_liver_disease_codes",
        "opensafely-chronic-liver-disease.csv",
    ),
    ctv3("other_neuro", "opensafely-other-neurological-conditions.csv"),
    ctv3("stroke", "opensafely-stroke-updated.csv"),
    ctv3("dementia", "opensafely-dementia.csv"),
    ctv3("dialysis_codes", "opensafely-dialysis.csv"),
    ctv3(
        "organ_transplant_codes",
        "opensafely-solid-organ-transplantation.csv",
    ),
    ctv3("spleen_codes", "opensafely-asplenia.csv"),
    ctv3("sickle_cell_codes", "opensafely-sickle-cell-disease.csv"),
    ctv3("aplastic_codes", "opensafely-aplastic-anaemia.csv"),
    ctv3("hiv_codes", "opensafely-hiv.csv"),
    ctv3(
        "permanent_immune_codes",
        "opensafely-permanent-immunosuppression.csv",
    ),
    ctv3(
        "temp_immune_codes",
        "opensafely-temporary-immunosuppression.csv",
    ),
    ctv3("hypertension_codes", "opensafely-hypertension.csv"),
    ctv3("ra_sle_psoriasis_codes", "opensafely-ra-sle-psoriasis.csv"),
];

/// Codelists written out in full: `(name, codes)`, all CTV3
pub const INLINE_CODELISTS: &[(&str, &[&str])] = &[
    ("creatinine_codes", &["XE2q5"]),
    ("hba1c_new_codes", &["XaPbt", "Xaeze", "Xaezd"]),
    ("hba1c_old_codes", &["X772q", "XaERo", "XaERp"]),
    ("systolic_blood_pressure_codes", &["2469."]),
    ("diastolic_blood_pressure_codes", &["246A."]),
];

/// Name of the combined primary care probable COVID-19 codelist
pub const COVID_PRIMARY_CARE_PROBABLE: &str = "covid_identification_in_primary_care_case_codes";

/// Add the inline codelists to `registry`
pub fn register_inline(registry: &mut CodelistRegistry) {
    for (name, codes) in INLINE_CODELISTS {
        registry.insert(name, codelist(name, codes.iter().copied(), CodeSystem::Ctv3));
    }
}

/// Load every codelist the study uses
pub fn load_study_codelists(dir: &Path) -> Result<CodelistRegistry> {
    let mut registry = CodelistRegistry::load_from_dir(dir, STUDY_CODELISTS)?;
    register_inline(&mut registry);
    Ok(registry)
}

/// The three primary care probable COVID-19 codelists as one
pub fn covid_primary_care_probable(registry: &CodelistRegistry) -> Result<Arc<Codelist>> {
    let clinical = registry.get("covid_identification_in_primary_care_case_codes_clinical")?;
    let test = registry.get("covid_identification_in_primary_care_case_codes_test")?;
    let sequelae = registry.get("covid_identification_in_primary_care_case_codes_seq")?;
    combine_codelists(COVID_PRIMARY_CARE_PROBABLE, &[&clinical, &test, &sequelae])
}
