//! Per-source evaluation against one patient

use chrono::NaiveDate;

use super::scope::{CareHomeLookup, Scope};
use crate::models::{DateFormat, Patient, Value};
use crate::query::source::{
    AddressAttribute, BmiQuery, DeathReturn, EmergencyCareQuery, EmergencyReturn,
    EventQuery, EventReturn, EventTable, HouseholdAttribute, MeanValueQuery,
    OnePracticeQuery, PracticeAttribute, SgssQuery, SgssReturn, VaccinationQuery,
    VaccinationReturn,
};
use crate::query::{MatchPolicy, ReturnShape, ResolvedWindow, Source, VariableSpec};

/// Codes under which body mass index is recorded (CTV3 and SNOMED CT)
pub const BMI_CODES: [&str; 2] = ["22K..", "60621009"];

/// The value of one declaration and its companion date, if it has one
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluated {
    /// Main value
    pub value: Value,
    /// Companion date column
    pub companion: Option<Value>,
}

impl Evaluated {
    fn value(value: Value) -> Self {
        Self {
            value,
            companion: None,
        }
    }

    fn with_companion(value: Value, date: Option<NaiveDate>) -> Self {
        Self {
            value,
            companion: Some(date.map_or(Value::Null, Value::Date)),
        }
    }

    /// Nothing matched: 0 for flags and counts, null otherwise
    fn absent(shape: ReturnShape) -> Self {
        Self::value(if shape.is_never_null() {
            Value::Int(0)
        } else {
            Value::Null
        })
    }
}

/// Evaluate one declaration for `patient`
///
/// Dates in the result are truncated to their declared precision.
#[must_use]
pub fn evaluate_spec(
    spec: &VariableSpec,
    patient: &Patient,
    scope: &Scope<'_>,
    today: NaiveDate,
) -> Evaluated {
    let mut result = evaluate_source(spec.source(), patient, scope, today);

    if let ReturnShape::Date(format) = spec.shape() {
        result.value = truncate(result.value, format);
    }
    match (spec.companion_column(), result.companion.take()) {
        (Some((_, format)), Some(date)) => result.companion = Some(truncate(date, format)),
        (Some(_), None) => result.companion = Some(Value::Null),
        (None, _) => {}
    }
    if spec.shape().is_never_null() && result.value.is_null() {
        result.value = Value::Int(0);
    }
    result
}

fn truncate(value: Value, format: DateFormat) -> Value {
    match value {
        Value::Date(date) => Value::Date(format.truncate(date)),
        other => other,
    }
}

fn evaluate_source(
    source: &Source,
    patient: &Patient,
    scope: &Scope<'_>,
    today: NaiveDate,
) -> Evaluated {
    let shape = source.shape();
    match source {
        Source::Events(q) => match q.window.resolve(scope, today) {
            Some(window) => events(q, patient, window),
            None => Evaluated::absent(shape),
        },
        Source::SgssTest(q) => match q.window.resolve(scope, today) {
            Some(window) => sgss(q, patient, window),
            None => Evaluated::absent(shape),
        },
        Source::Vaccination(q) => match q.window.resolve(scope, today) {
            Some(window) => vaccination(q, patient, window),
            None => Evaluated::absent(shape),
        },
        Source::EmergencyCare(q) => match q.window.resolve(scope, today) {
            Some(window) => emergency_care(q, patient, window),
            None => Evaluated::absent(shape),
        },
        Source::Death(q) => {
            let died = q
                .window
                .resolve(scope, today)
                .and_then(|w| patient.date_of_death.filter(|d| w.contains(*d)));
            Evaluated::value(match q.returning {
                DeathReturn::Flag => Value::flag(died.is_some()),
                DeathReturn::DateOfDeath(_) => died.map_or(Value::Null, Value::Date),
            })
        }
        Source::Deregistration(q) => match q.window.resolve(scope, today) {
            Some(window) => deregistration(patient, window),
            None => Evaluated::absent(shape),
        },
        Source::OnePractice(q) => one_practice(q, patient, scope, today),
        Source::Age(date) => Evaluated::value(
            date.resolve(scope, today)
                .and_then(|d| patient.age_at(d))
                .map_or(Value::Null, Value::Int),
        ),
        Source::Sex => Evaluated::value(Value::Str(patient.sex.code().to_string())),
        Source::Address(q) => {
            let Some(date) = q.date.resolve(scope, today) else {
                return Evaluated::absent(shape);
            };
            let Some(address) = Patient::active_at(&patient.addresses, date) else {
                return Evaluated::absent(shape);
            };
            Evaluated::value(match q.returning {
                AddressAttribute::IndexOfMultipleDeprivation { round_to_nearest } => address
                    .index_of_multiple_deprivation
                    .map_or(Value::Null, |imd| Value::Int(round_rank(imd, round_to_nearest))),
                AddressAttribute::RuralUrbanClassification => address
                    .rural_urban_classification
                    .map_or(Value::Null, Value::Int),
                AddressAttribute::MsoaCode => string_or_null(address.msoa_code.as_deref()),
            })
        }
        Source::Practice(q) => {
            let Some(date) = q.date.resolve(scope, today) else {
                return Evaluated::absent(shape);
            };
            let Some(registration) = Patient::active_at(&patient.registrations, date) else {
                return Evaluated::absent(shape);
            };
            Evaluated::value(match q.returning {
                PracticeAttribute::PseudoId => Value::Int(registration.practice_pseudo_id),
                PracticeAttribute::StpCode => string_or_null(registration.stp_code.as_deref()),
                PracticeAttribute::MsoaCode => string_or_null(registration.msoa_code.as_deref()),
                PracticeAttribute::Nuts1RegionName => {
                    string_or_null(registration.region.as_deref())
                }
            })
        }
        Source::Household(q) => {
            let membership = q
                .date
                .resolve(scope, today)
                .and_then(|d| Patient::active_at(&patient.households, d));
            Evaluated::value(membership.map_or(Value::Null, |h| match q.returning {
                HouseholdAttribute::PseudoId => Value::Int(h.household_id),
                HouseholdAttribute::HouseholdSize => Value::Int(h.household_size),
            }))
        }
        Source::CareHome(q) => {
            let address = q
                .date
                .resolve(scope, today)
                .and_then(|d| Patient::active_at(&patient.addresses, d));
            let lookup = CareHomeLookup::new(address);
            Evaluated::value(Value::Str(q.rule.categorise(&lookup).to_string()))
        }
        Source::Bmi(q) => match q.window.resolve(scope, today) {
            Some(window) => bmi(q, patient, window),
            None => Evaluated::absent(shape),
        },
        Source::MeanValue(q) => match q.window.resolve(scope, today) {
            Some(window) => mean_value(q, patient, window),
            None => Evaluated::absent(shape),
        },
        Source::Satisfying(q) => {
            let local = evaluate_helpers(&q.helpers, patient, scope, today);
            Evaluated::value(Value::flag(q.predicate.evaluate(&local)))
        }
        Source::Categorised(q) => {
            let local = evaluate_helpers(&q.helpers, patient, scope, today);
            Evaluated::value(Value::Str(q.rule.categorise(&local).to_string()))
        }
    }
}

/// Evaluate helpers in order into a child scope; each sees the ones before it
fn evaluate_helpers<'s>(
    helpers: &[VariableSpec],
    patient: &Patient,
    scope: &'s Scope<'_>,
    today: NaiveDate,
) -> Scope<'s> {
    let mut local = scope.child();
    for helper in helpers {
        let result = evaluate_spec(helper, patient, &local, today);
        local.set(helper.name(), result.value);
    }
    local
}

fn string_or_null(s: Option<&str>) -> Value {
    s.map_or(Value::Null, |s| Value::Str(s.to_string()))
}

fn round_rank(rank: i64, nearest: Option<u32>) -> i64 {
    match nearest {
        Some(n) if n > 0 => {
            let n = f64::from(n);
            ((rank as f64 / n).round() * n) as i64
        }
        _ => rank,
    }
}

/// Pick the match a policy selects from chronologically sorted matches
fn select<T>(matches: &[T], policy: MatchPolicy) -> Option<&T> {
    match policy {
        MatchPolicy::Any | MatchPolicy::First => matches.first(),
        MatchPolicy::Last => matches.last(),
    }
}

/// A clinical event or medication issue, viewed uniformly
#[derive(Debug, Clone, Copy)]
struct EventView<'r> {
    code: &'r str,
    date: NaiveDate,
    numeric_value: Option<f64>,
}

fn events(q: &EventQuery, patient: &Patient, window: ResolvedWindow) -> Evaluated {
    let matches: Vec<EventView<'_>> = match q.table {
        EventTable::ClinicalEvents => patient
            .clinical_events
            .iter()
            .map(|e| EventView {
                code: &e.code,
                date: e.date,
                numeric_value: e.numeric_value,
            })
            .collect(),
        EventTable::Medications => patient
            .medications
            .iter()
            .map(|m| EventView {
                code: &m.code,
                date: m.date,
                numeric_value: None,
            })
            .collect(),
    };
    let matches: Vec<EventView<'_>> = matches
        .into_iter()
        .filter(|e| window.contains(e.date) && q.codelist.contains(e.code))
        .collect();

    let selected = select(&matches, q.policy);
    let value = match q.returning {
        EventReturn::Flag => Value::flag(selected.is_some()),
        EventReturn::Count => Value::Int(matches.len() as i64),
        EventReturn::Date(_) => selected.map_or(Value::Null, |e| Value::Date(e.date)),
        EventReturn::Code => selected.map_or(Value::Null, |e| Value::Str(e.code.to_string())),
        EventReturn::Category => selected.map_or(Value::Null, |e| {
            if q.codelist.is_categorised() {
                string_or_null(q.codelist.category_of(e.code))
            } else {
                Value::Str(e.code.to_string())
            }
        }),
        EventReturn::NumericValue => selected
            .and_then(|e| e.numeric_value)
            .map_or(Value::Null, Value::Float),
    };

    match q.include_date_of_match {
        Some(_) => Evaluated::with_companion(value, selected.map(|e| e.date)),
        None => Evaluated::value(value),
    }
}

fn sgss(q: &SgssQuery, patient: &Patient, window: ResolvedWindow) -> Evaluated {
    let matches: Vec<_> = patient
        .sgss_tests
        .iter()
        .filter(|t| {
            t.outcome == q.result
                && t.pathogen.eq_ignore_ascii_case(&q.pathogen)
                && window.contains(t.date)
        })
        .collect();
    let selected = select(&matches, q.policy);
    Evaluated::value(match q.returning {
        SgssReturn::Flag => Value::flag(selected.is_some()),
        SgssReturn::Date(_) => selected.map_or(Value::Null, |t| Value::Date(t.date)),
        SgssReturn::SGeneTargetFailure => selected.map_or(Value::Null, |t| {
            Value::Str(t.s_gene_target_failure.clone().unwrap_or_default())
        }),
    })
}

fn vaccination(q: &VaccinationQuery, patient: &Patient, window: ResolvedWindow) -> Evaluated {
    let matches: Vec<_> = patient
        .vaccinations
        .iter()
        .filter(|v| v.target_disease.eq_ignore_ascii_case(&q.target_disease) && window.contains(v.date))
        .collect();
    let selected = select(&matches, q.policy);
    Evaluated::value(match q.returning {
        VaccinationReturn::Flag => Value::flag(selected.is_some()),
        VaccinationReturn::Date(_) => selected.map_or(Value::Null, |v| Value::Date(v.date)),
    })
}

fn emergency_care(q: &EmergencyCareQuery, patient: &Patient, window: ResolvedWindow) -> Evaluated {
    let matches: Vec<_> = patient
        .emergency_attendances
        .iter()
        .filter(|a| window.contains(a.arrival_date))
        .filter(|a| {
            q.diagnoses
                .as_ref()
                .is_none_or(|list| a.diagnoses.iter().any(|d| list.contains(d)))
        })
        .collect();
    let selected = select(&matches, q.policy);
    Evaluated::value(match q.returning {
        EmergencyReturn::Flag => Value::flag(selected.is_some()),
        EmergencyReturn::Count => Value::Int(matches.len() as i64),
        EmergencyReturn::DateArrived(_) => {
            selected.map_or(Value::Null, |a| Value::Date(a.arrival_date))
        }
        EmergencyReturn::DischargeDestination => {
            string_or_null(selected.and_then(|a| a.discharge_destination.as_deref()))
        }
    })
}

/// Latest registration end, provided no registration is still open
fn deregistration(patient: &Patient, window: ResolvedWindow) -> Evaluated {
    if patient.registrations.iter().any(|r| r.end_date.is_none()) {
        return Evaluated::value(Value::Null);
    }
    let last_end = patient.registrations.iter().filter_map(|r| r.end_date).max();
    Evaluated::value(
        last_end
            .filter(|d| window.contains(*d))
            .map_or(Value::Null, Value::Date),
    )
}

/// Whether a single registration covers the whole period
fn one_practice(
    q: &OnePracticeQuery,
    patient: &Patient,
    scope: &Scope<'_>,
    today: NaiveDate,
) -> Evaluated {
    let (Some(start), Some(end)) = (q.start.resolve(scope, today), q.end.resolve(scope, today))
    else {
        return Evaluated::value(Value::flag(false));
    };
    let covered = patient
        .registrations
        .iter()
        .any(|r| r.start_date <= start && r.end_date.is_none_or(|e| e >= end));
    Evaluated::value(Value::flag(covered))
}

fn bmi(q: &BmiQuery, patient: &Patient, window: ResolvedWindow) -> Evaluated {
    let latest = patient
        .clinical_events
        .iter()
        .filter(|e| BMI_CODES.contains(&e.code.as_str()) && window.contains(e.date))
        .filter(|e| {
            patient
                .age_at(e.date)
                .is_some_and(|age| age >= i64::from(q.minimum_age_at_measurement))
        })
        .filter_map(|e| e.numeric_value.filter(|v| *v > 0.0).map(|v| (e.date, v)))
        .next_back();

    let value = latest.map_or(Value::Null, |(_, v)| Value::Float(v));
    match q.include_measurement_date {
        Some(_) => Evaluated::with_companion(value, latest.map(|(d, _)| d)),
        None => Evaluated::value(value),
    }
}

fn mean_value(q: &MeanValueQuery, patient: &Patient, window: ResolvedWindow) -> Evaluated {
    let readings: Vec<(NaiveDate, f64)> = patient
        .clinical_events
        .iter()
        .filter(|e| window.contains(e.date) && q.codelist.contains(&e.code))
        .filter_map(|e| e.numeric_value.map(|v| (e.date, v)))
        .collect();

    let latest = readings.iter().map(|(d, _)| *d).max();
    let used: Vec<f64> = readings
        .iter()
        .filter(|(d, _)| !q.on_most_recent_day_of_measurement || Some(*d) == latest)
        .map(|(_, v)| *v)
        .collect();

    let value = if used.is_empty() {
        Value::Null
    } else {
        Value::Float(used.iter().sum::<f64>() / used.len() as f64)
    };
    match q.include_measurement_date {
        Some(_) => Evaluated::with_companion(value, latest),
        None => Evaluated::value(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codelist::{CodeSystem, codelist};
    use crate::models::{ClinicalEvent, PracticeRegistration};
    use crate::query::{DateExpr, MatchSelection, Windowed, patients};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2022, 3, 1)
    }

    fn event(code: &str, when: NaiveDate, value: Option<f64>) -> ClinicalEvent {
        ClinicalEvent {
            code: code.to_string(),
            date: when,
            numeric_value: value,
        }
    }

    #[test]
    fn test_last_numeric_value_with_companion() {
        let list = codelist("creatinine", ["XE2q5"], CodeSystem::Ctv3);
        let mut patient = Patient::new(1);
        patient.clinical_events = vec![
            event("XE2q5", date(2020, 1, 5), Some(80.0)),
            event("XE2q5", date(2021, 6, 17), Some(95.0)),
            event("OTHER", date(2021, 7, 1), Some(1.0)),
        ];
        let spec = VariableSpec::new(
            "creatinine",
            patients::with_these_clinical_events(&list)
                .find_last_match_in_period()
                .returning_numeric_value()
                .include_date_of_match(DateFormat::YearMonth),
        );
        let result = evaluate_spec(&spec, &patient, &Scope::new(), today());
        assert_eq!(result.value, Value::Float(95.0));
        assert_eq!(result.companion, Some(Value::Date(date(2021, 6, 1))));
    }

    #[test]
    fn test_unresolvable_window_is_absent() {
        let list = codelist("x", ["A"], CodeSystem::Ctv3);
        let mut patient = Patient::new(1);
        patient.clinical_events = vec![event("A", date(2021, 1, 1), None)];
        let spec = VariableSpec::new(
            "x",
            patients::with_these_clinical_events(&list)
                .on_or_before(DateExpr::variable("missing"))
                .number_of_matches_in_period(),
        );
        let result = evaluate_spec(&spec, &patient, &Scope::new(), today());
        assert_eq!(result.value, Value::Int(0));
    }

    #[test]
    fn test_one_practice_requires_single_covering_registration() {
        let registration = |start, end| PracticeRegistration {
            start_date: start,
            end_date: end,
            practice_pseudo_id: 1,
            stp_code: None,
            msoa_code: None,
            region: None,
        };
        let spec = VariableSpec::new(
            "one_practice",
            patients::registered_with_one_practice_between(
                DateExpr::from(date(2020, 11, 1)),
                DateExpr::from(date(2021, 11, 1)),
            ),
        );

        let mut split = Patient::new(1);
        split.registrations.push(registration(date(2019, 1, 1), Some(date(2021, 2, 1))));
        split.registrations.push(registration(date(2021, 2, 2), None));
        assert_eq!(
            evaluate_spec(&spec, &split, &Scope::new(), today()).value,
            Value::Int(0)
        );

        let mut single = Patient::new(2);
        single.registrations.push(registration(date(2019, 1, 1), None));
        assert_eq!(
            evaluate_spec(&spec, &single, &Scope::new(), today()).value,
            Value::Int(1)
        );
    }

    #[test]
    fn test_deregistration_uses_last_end_unless_still_registered() {
        let registration = |start, end| PracticeRegistration {
            start_date: start,
            end_date: end,
            practice_pseudo_id: 1,
            stp_code: None,
            msoa_code: None,
            region: None,
        };
        let spec = VariableSpec::new(
            "dereg_date",
            patients::date_deregistered_from_all_supported_practices(DateFormat::YearMonthDay)
                .on_or_after(DateExpr::from(date(2021, 1, 1))),
        );

        let mut left = Patient::new(1);
        left.registrations.push(registration(date(2015, 1, 1), Some(date(2020, 6, 1))));
        left.registrations.push(registration(date(2020, 6, 2), Some(date(2021, 9, 30))));
        assert_eq!(
            evaluate_spec(&spec, &left, &Scope::new(), today()).value,
            Value::Date(date(2021, 9, 30))
        );

        let mut moved = Patient::new(2);
        moved.registrations.push(registration(date(2015, 1, 1), Some(date(2021, 3, 1))));
        moved.registrations.push(registration(date(2021, 3, 2), None));
        assert_eq!(
            evaluate_spec(&spec, &moved, &Scope::new(), today()).value,
            Value::Null
        );

        let mut early = Patient::new(3);
        early.registrations.push(registration(date(2015, 1, 1), Some(date(2020, 6, 1))));
        assert_eq!(
            evaluate_spec(&spec, &early, &Scope::new(), today()).value,
            Value::Null
        );
    }

    #[test]
    fn test_mean_on_most_recent_day() {
        let list = codelist("bp_sys", ["2469."], CodeSystem::Ctv3);
        let mut patient = Patient::new(1);
        patient.clinical_events = vec![
            event("2469.", date(2021, 1, 1), Some(150.0)),
            event("2469.", date(2021, 5, 3), Some(120.0)),
            event("2469.", date(2021, 5, 3), Some(130.0)),
        ];
        let spec = VariableSpec::new(
            "bp_sys",
            patients::mean_recorded_value(&list)
                .on_most_recent_day_of_measurement()
                .include_measurement_date(DateFormat::YearMonth),
        );
        let result = evaluate_spec(&spec, &patient, &Scope::new(), today());
        assert_eq!(result.value, Value::Float(125.0));
        assert_eq!(result.companion, Some(Value::Date(date(2021, 5, 1))));
    }

    #[test]
    fn test_imd_rounding() {
        assert_eq!(round_rank(12_345, Some(100)), 12_300);
        assert_eq!(round_rank(12_351, Some(100)), 12_400);
        assert_eq!(round_rank(12_351, None), 12_351);
    }
}
