//! Variable vocabulary
//!
//! Builder functions named after the source operations of a study
//! definition. Each returns a query struct with sensible defaults (any
//! time, any match, a flag) that is refined with chained calls and turned
//! into a [`VariableSpec`] with [`VariableSpec::new`].
//!
//! ```
//! use cohort_definition::codelist::{CodeSystem, codelist};
//! use cohort_definition::models::DateFormat;
//! use cohort_definition::query::{DateExpr, VariableSpec, Windowed, MatchSelection, patients};
//!
//! let asthma = codelist("asthma", ["H33.."], CodeSystem::Ctv3);
//! let spec = VariableSpec::new(
//!     "asthma_date",
//!     patients::with_these_clinical_events(&asthma)
//!         .on_or_before(DateExpr::variable("index_date"))
//!         .find_last_match_in_period()
//!         .returning_date(DateFormat::YearMonth),
//! );
//! assert_eq!(spec.source().date_references(), vec!["index_date"]);
//! ```

use std::sync::Arc;

use super::categorise::Categorise;
use super::date_expr::DateExpr;
use super::predicate::Predicate;
use super::source::{
    AddressAttribute, AddressQuery, BmiQuery, CareHomeQuery, CategorisedQuery, DeathQuery,
    DeathReturn, DeregistrationQuery, EmergencyCareQuery, EmergencyReturn, EventQuery, EventReturn,
    EventTable, HouseholdAttribute, HouseholdQuery, MatchPolicy, MeanValueQuery, OnePracticeQuery,
    PracticeAttribute, PracticeQuery, SatisfyingQuery, SgssQuery, SgssReturn, Source,
    VaccinationQuery, VaccinationReturn,
};
use super::variable::VariableSpec;
use super::window::TimeWindow;
use crate::codelist::Codelist;
use crate::models::{DateFormat, TestOutcome};

/// Queries restricted to a time window
pub trait Windowed: Sized {
    /// The window to restrict
    fn window_mut(&mut self) -> &mut TimeWindow;

    /// Between two boundaries, inclusive
    #[must_use]
    fn between(mut self, start: impl Into<DateExpr>, end: impl Into<DateExpr>) -> Self {
        *self.window_mut() = TimeWindow::between(start, end);
        self
    }

    /// On or before a boundary
    #[must_use]
    fn on_or_before(mut self, end: impl Into<DateExpr>) -> Self {
        *self.window_mut() = TimeWindow::OnOrBefore(end.into());
        self
    }

    /// On or after a boundary
    #[must_use]
    fn on_or_after(mut self, start: impl Into<DateExpr>) -> Self {
        *self.window_mut() = TimeWindow::OnOrAfter(start.into());
        self
    }
}

/// Queries choosing one of several matches
pub trait MatchSelection: Sized {
    /// The policy to set
    fn policy_mut(&mut self) -> &mut MatchPolicy;

    /// Use the earliest match in the window
    #[must_use]
    fn find_first_match_in_period(mut self) -> Self {
        *self.policy_mut() = MatchPolicy::First;
        self
    }

    /// Use the latest match in the window
    #[must_use]
    fn find_last_match_in_period(mut self) -> Self {
        *self.policy_mut() = MatchPolicy::Last;
        self
    }
}

macro_rules! windowed {
    ($($query:ty),* $(,)?) => {
        $(
            impl Windowed for $query {
                fn window_mut(&mut self) -> &mut TimeWindow {
                    &mut self.window
                }
            }
        )*
    };
}

macro_rules! selectable {
    ($($query:ty),* $(,)?) => {
        $(
            impl MatchSelection for $query {
                fn policy_mut(&mut self) -> &mut MatchPolicy {
                    &mut self.policy
                }
            }
        )*
    };
}

windowed!(
    EventQuery,
    SgssQuery,
    VaccinationQuery,
    EmergencyCareQuery,
    DeathQuery,
    DeregistrationQuery,
    BmiQuery,
    MeanValueQuery,
);

selectable!(EventQuery, SgssQuery, VaccinationQuery, EmergencyCareQuery);

fn event_query(table: EventTable, codelist: &Arc<Codelist>) -> EventQuery {
    EventQuery {
        table,
        codelist: Arc::clone(codelist),
        window: TimeWindow::Any,
        policy: MatchPolicy::Any,
        returning: EventReturn::Flag,
        include_date_of_match: None,
    }
}

/// Coded clinical events in a codelist
#[must_use]
pub fn with_these_clinical_events(codelist: &Arc<Codelist>) -> EventQuery {
    event_query(EventTable::ClinicalEvents, codelist)
}

/// Medication issues in a codelist
#[must_use]
pub fn with_these_medications(codelist: &Arc<Codelist>) -> EventQuery {
    event_query(EventTable::Medications, codelist)
}

impl EventQuery {
    /// Return the date of the selected match
    #[must_use]
    pub fn returning_date(mut self, format: DateFormat) -> Self {
        self.returning = EventReturn::Date(format);
        self
    }

    /// Return the date of the earliest match
    #[must_use]
    pub fn return_first_date_in_period(self, format: DateFormat) -> Self {
        self.find_first_match_in_period().returning_date(format)
    }

    /// Return the date of the latest match
    #[must_use]
    pub fn return_last_date_in_period(self, format: DateFormat) -> Self {
        self.find_last_match_in_period().returning_date(format)
    }

    /// Return the codelist category of the selected match
    #[must_use]
    pub fn returning_category(mut self) -> Self {
        self.returning = EventReturn::Category;
        self
    }

    /// Return the code of the selected match
    #[must_use]
    pub fn returning_code(mut self) -> Self {
        self.returning = EventReturn::Code;
        self
    }

    /// Return the numeric value of the selected match
    #[must_use]
    pub fn returning_numeric_value(mut self) -> Self {
        self.returning = EventReturn::NumericValue;
        self
    }

    /// Return the number of matches
    #[must_use]
    pub fn number_of_matches_in_period(mut self) -> Self {
        self.returning = EventReturn::Count;
        self
    }

    /// Also return the date of the selected match as `<name>_date`
    #[must_use]
    pub fn include_date_of_match(mut self, format: DateFormat) -> Self {
        self.include_date_of_match = Some(format);
        self
    }
}

/// SGSS test results for a pathogen
#[must_use]
pub fn with_test_result_in_sgss(pathogen: &str, result: TestOutcome) -> SgssQuery {
    SgssQuery {
        pathogen: pathogen.to_string(),
        result,
        window: TimeWindow::Any,
        policy: MatchPolicy::Any,
        returning: SgssReturn::Flag,
    }
}

impl SgssQuery {
    /// Return the specimen date
    #[must_use]
    pub fn returning_date(mut self, format: DateFormat) -> Self {
        self.returning = SgssReturn::Date(format);
        self
    }

    /// Return the S-gene target failure marker
    #[must_use]
    pub fn returning_s_gene_target_failure(mut self) -> Self {
        self.returning = SgssReturn::SGeneTargetFailure;
        self
    }
}

/// Vaccination records for a target disease
#[must_use]
pub fn with_tpp_vaccination_record(target_disease: &str) -> VaccinationQuery {
    VaccinationQuery {
        target_disease: target_disease.to_string(),
        window: TimeWindow::Any,
        policy: MatchPolicy::Any,
        returning: VaccinationReturn::Flag,
    }
}

impl VaccinationQuery {
    /// Return the vaccination date
    #[must_use]
    pub fn returning_date(mut self, format: DateFormat) -> Self {
        self.returning = VaccinationReturn::Date(format);
        self
    }
}

/// Emergency care attendances
#[must_use]
pub fn attended_emergency_care() -> EmergencyCareQuery {
    EmergencyCareQuery {
        diagnoses: None,
        window: TimeWindow::Any,
        policy: MatchPolicy::Any,
        returning: EmergencyReturn::Flag,
    }
}

impl EmergencyCareQuery {
    /// Only attendances with a diagnosis in `codelist`
    #[must_use]
    pub fn with_these_diagnoses(mut self, codelist: &Arc<Codelist>) -> Self {
        self.diagnoses = Some(Arc::clone(codelist));
        self
    }

    /// Return the arrival date
    #[must_use]
    pub fn returning_date_arrived(mut self, format: DateFormat) -> Self {
        self.returning = EmergencyReturn::DateArrived(format);
        self
    }

    /// Return the discharge destination
    #[must_use]
    pub fn returning_discharge_destination(mut self) -> Self {
        self.returning = EmergencyReturn::DischargeDestination;
        self
    }

    /// Return the number of attendances
    #[must_use]
    pub fn number_of_matches_in_period(mut self) -> Self {
        self.returning = EmergencyReturn::Count;
        self
    }
}

/// Death from any cause
#[must_use]
pub fn died_from_any_cause() -> DeathQuery {
    DeathQuery {
        window: TimeWindow::Any,
        returning: DeathReturn::Flag,
    }
}

impl DeathQuery {
    /// Return the date of death
    #[must_use]
    pub fn returning_date_of_death(mut self, format: DateFormat) -> Self {
        self.returning = DeathReturn::DateOfDeath(format);
        self
    }
}

/// Date the patient deregistered from their last supported practice
#[must_use]
pub fn date_deregistered_from_all_supported_practices(format: DateFormat) -> DeregistrationQuery {
    DeregistrationQuery {
        window: TimeWindow::Any,
        format,
    }
}

/// Registered with one practice for the whole of a period
#[must_use]
pub fn registered_with_one_practice_between(
    start: impl Into<DateExpr>,
    end: impl Into<DateExpr>,
) -> OnePracticeQuery {
    OnePracticeQuery {
        start: start.into(),
        end: end.into(),
    }
}

/// Age in whole years on a date
#[must_use]
pub fn age_as_of(date: impl Into<DateExpr>) -> Source {
    Source::Age(date.into())
}

/// Recorded sex
#[must_use]
pub fn sex() -> Source {
    Source::Sex
}

/// Attribute of the address active on a date
#[must_use]
pub fn address_as_of(date: impl Into<DateExpr>, returning: AddressAttribute) -> AddressQuery {
    AddressQuery {
        date: date.into(),
        returning,
    }
}

/// Attribute of the practice registration active on a date
#[must_use]
pub fn registered_practice_as_of(
    date: impl Into<DateExpr>,
    returning: PracticeAttribute,
) -> PracticeQuery {
    PracticeQuery {
        date: date.into(),
        returning,
    }
}

/// Attribute of the household active on a date
#[must_use]
pub fn household_as_of(date: impl Into<DateExpr>, returning: HouseholdAttribute) -> HouseholdQuery {
    HouseholdQuery {
        date: date.into(),
        returning,
    }
}

/// Care-home type of the address active on a date
#[must_use]
pub fn care_home_status_as_of(
    date: impl Into<DateExpr>,
    rule: impl Categorise + 'static,
) -> CareHomeQuery {
    CareHomeQuery {
        date: date.into(),
        rule: Arc::new(rule),
    }
}

/// Most recent recorded body mass index
#[must_use]
pub fn most_recent_bmi() -> BmiQuery {
    BmiQuery {
        window: TimeWindow::Any,
        minimum_age_at_measurement: 16,
        include_measurement_date: None,
    }
}

impl BmiQuery {
    /// Ignore measurements taken before `age`
    #[must_use]
    pub fn minimum_age_at_measurement(mut self, age: u32) -> Self {
        self.minimum_age_at_measurement = age;
        self
    }

    /// Also return the measurement date as `<name>_date_measured`
    #[must_use]
    pub fn include_measurement_date(mut self, format: DateFormat) -> Self {
        self.include_measurement_date = Some(format);
        self
    }
}

/// Mean of recorded values for a codelist
#[must_use]
pub fn mean_recorded_value(codelist: &Arc<Codelist>) -> MeanValueQuery {
    MeanValueQuery {
        codelist: Arc::clone(codelist),
        window: TimeWindow::Any,
        on_most_recent_day_of_measurement: false,
        include_measurement_date: None,
    }
}

impl MeanValueQuery {
    /// Average only the values on the latest day with a measurement
    #[must_use]
    pub fn on_most_recent_day_of_measurement(mut self) -> Self {
        self.on_most_recent_day_of_measurement = true;
        self
    }

    /// Also return the measurement date as `<name>_date_measured`
    #[must_use]
    pub fn include_measurement_date(mut self, format: DateFormat) -> Self {
        self.include_measurement_date = Some(format);
        self
    }
}

/// Flag for patients satisfying a predicate
#[must_use]
pub fn satisfying(predicate: Predicate) -> SatisfyingQuery {
    SatisfyingQuery {
        predicate,
        helpers: Vec::new(),
    }
}

impl SatisfyingQuery {
    /// Add a helper variable, evaluated before the predicate
    #[must_use]
    pub fn helper(mut self, spec: VariableSpec) -> Self {
        self.helpers.push(spec);
        self
    }
}

/// Category from an ordered rule
#[must_use]
pub fn categorised_as(rule: impl Categorise + 'static) -> CategorisedQuery {
    CategorisedQuery {
        rule: Arc::new(rule),
        helpers: Vec::new(),
    }
}

impl CategorisedQuery {
    /// Add a helper variable, evaluated before the rule
    #[must_use]
    pub fn helper(mut self, spec: VariableSpec) -> Self {
        self.helpers.push(spec);
        self
    }
}
