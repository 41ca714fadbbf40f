//! Source operations
//!
//! A `Source` says where a variable's value comes from and what shape it
//! is returned in. Each variant carries a query struct with public fields;
//! the builders in [`crate::query::patients`] fill them in.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::categorise::Categorise;
use super::date_expr::DateExpr;
use super::predicate::Predicate;
use super::variable::VariableSpec;
use super::window::TimeWindow;
use crate::codelist::Codelist;
use crate::models::{DateFormat, Sex, TestOutcome};

/// Attributes a care-home categorisation may read
pub const CARE_HOME_ATTRIBUTES: [&str; 3] = [
    "IsPotentialCareHome",
    "LocationRequiresNursing",
    "LocationDoesNotRequireNursing",
];

/// Values reported for S-gene target failure; empty when the test has none
pub const SGTF_LABELS: [&str; 4] = ["0", "1", "9", ""];

/// NUTS1 region names a practice can be registered in
pub const NUTS1_REGIONS: [&str; 9] = [
    "North East",
    "North West",
    "Yorkshire and The Humber",
    "East Midlands",
    "West Midlands",
    "East of England",
    "London",
    "South East",
    "South West",
];

/// Rural-urban classification classes
pub const RURAL_URBAN_CLASSES: [&str; 8] = ["1", "2", "3", "4", "5", "6", "7", "8"];

/// Shape of a variable's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnShape {
    /// 0 or 1, never null
    Flag,
    /// A date at the given precision
    Date(DateFormat),
    /// A category label
    Category,
    /// An integer
    Int,
    /// A floating point number
    Float,
    /// Number of matches, 0 when none
    Count,
}

impl ReturnShape {
    /// Whether this shape is a date
    #[must_use]
    pub const fn is_date(self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// Whether the value is never null
    #[must_use]
    pub const fn is_never_null(self) -> bool {
        matches!(self, Self::Flag | Self::Count)
    }
}

impl fmt::Display for ReturnShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag => f.write_str("flag"),
            Self::Date(format) => write!(f, "date ({})", format.pattern()),
            Self::Category => f.write_str("category"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Count => f.write_str("count"),
        }
    }
}

/// Labels a variable can produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelSet {
    /// Fixed by the schema; expectation ratios outside it are errors
    Closed(Vec<String>),
    /// Derived from codelist categories; ratios outside it are suspicious
    Observed(Vec<String>),
}

impl LabelSet {
    /// The labels
    #[must_use]
    pub fn labels(&self) -> &[String] {
        match self {
            Self::Closed(l) | Self::Observed(l) => l,
        }
    }

    fn closed<I: IntoIterator<Item = S>, S: Into<String>>(labels: I) -> Self {
        Self::Closed(labels.into_iter().map(Into::into).collect())
    }
}

/// Which of several matching records to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Any match; values come from the earliest
    #[default]
    Any,
    /// The earliest match in the window
    First,
    /// The latest match in the window
    Last,
}

/// Event table searched by an [`EventQuery`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTable {
    /// Coded clinical events
    ClinicalEvents,
    /// Medication issues
    Medications,
}

/// What an event query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventReturn {
    /// Whether any event matched
    #[default]
    Flag,
    /// Date of the selected match
    Date(DateFormat),
    /// Codelist category of the selected match, or its code when the
    /// codelist has no categories
    Category,
    /// The code of the selected match
    Code,
    /// Numeric value recorded with the selected match
    NumericValue,
    /// Number of matches in the window
    Count,
}

/// Search clinical events or medications by codelist
#[derive(Debug, Clone)]
pub struct EventQuery {
    /// Table to search
    pub table: EventTable,
    /// Codes to match
    pub codelist: Arc<Codelist>,
    /// Window the event date must fall in
    pub window: TimeWindow,
    /// Which match to use
    pub policy: MatchPolicy,
    /// What to return
    pub returning: EventReturn,
    /// Also return the date of the selected match
    pub include_date_of_match: Option<DateFormat>,
}

/// What an SGSS query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SgssReturn {
    /// Whether any test matched
    #[default]
    Flag,
    /// Specimen date of the selected test
    Date(DateFormat),
    /// S-gene target failure of the selected test
    SGeneTargetFailure,
}

/// Search SGSS test results
#[derive(Debug, Clone)]
pub struct SgssQuery {
    /// Pathogen tested for
    pub pathogen: String,
    /// Required result
    pub result: TestOutcome,
    /// Window the specimen date must fall in
    pub window: TimeWindow,
    /// Which match to use
    pub policy: MatchPolicy,
    /// What to return
    pub returning: SgssReturn,
}

/// What a vaccination query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaccinationReturn {
    /// Whether any vaccination matched
    #[default]
    Flag,
    /// Date of the selected vaccination
    Date(DateFormat),
}

/// Search vaccination records by target disease
#[derive(Debug, Clone)]
pub struct VaccinationQuery {
    /// Target disease, matched case-insensitively
    pub target_disease: String,
    /// Window the vaccination date must fall in
    pub window: TimeWindow,
    /// Which match to use
    pub policy: MatchPolicy,
    /// What to return
    pub returning: VaccinationReturn,
}

/// What an emergency care query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyReturn {
    /// Whether any attendance matched
    #[default]
    Flag,
    /// Arrival date of the selected attendance
    DateArrived(DateFormat),
    /// Discharge destination of the selected attendance
    DischargeDestination,
    /// Number of matching attendances
    Count,
}

/// Search emergency care attendances
#[derive(Debug, Clone)]
pub struct EmergencyCareQuery {
    /// Diagnoses that must appear; any attendance when absent
    pub diagnoses: Option<Arc<Codelist>>,
    /// Window the arrival date must fall in
    pub window: TimeWindow,
    /// Which match to use
    pub policy: MatchPolicy,
    /// What to return
    pub returning: EmergencyReturn,
}

/// What a death query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathReturn {
    /// Whether the patient died in the window
    #[default]
    Flag,
    /// Date of death
    DateOfDeath(DateFormat),
}

/// Death registered with ONS from any cause
#[derive(Debug, Clone)]
pub struct DeathQuery {
    /// Window the date of death must fall in
    pub window: TimeWindow,
    /// What to return
    pub returning: DeathReturn,
}

/// Date the patient left the last supported practice
#[derive(Debug, Clone)]
pub struct DeregistrationQuery {
    /// Window the deregistration date must fall in
    pub window: TimeWindow,
    /// Date precision
    pub format: DateFormat,
}

/// Continuous registration with a single practice
#[derive(Debug, Clone)]
pub struct OnePracticeQuery {
    /// Start of the period
    pub start: DateExpr,
    /// End of the period
    pub end: DateExpr,
}

/// Address attribute to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressAttribute {
    /// Index of multiple deprivation rank, optionally rounded
    IndexOfMultipleDeprivation {
        /// Round to the nearest multiple of this
        round_to_nearest: Option<u32>,
    },
    /// Rural-urban classification, 1 to 8
    RuralUrbanClassification,
    /// Middle layer super output area
    MsoaCode,
}

/// Attributes of the address active on a date
#[derive(Debug, Clone)]
pub struct AddressQuery {
    /// Reference date
    pub date: DateExpr,
    /// What to return
    pub returning: AddressAttribute,
}

/// Practice attribute to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PracticeAttribute {
    /// Pseudonymised practice identifier
    PseudoId,
    /// Sustainability and transformation partnership code
    StpCode,
    /// Practice MSOA
    MsoaCode,
    /// NUTS1 region name
    Nuts1RegionName,
}

/// Attributes of the practice registration active on a date
#[derive(Debug, Clone)]
pub struct PracticeQuery {
    /// Reference date
    pub date: DateExpr,
    /// What to return
    pub returning: PracticeAttribute,
}

/// Household attribute to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HouseholdAttribute {
    /// Pseudonymised household identifier
    PseudoId,
    /// Number of people in the household
    HouseholdSize,
}

/// Attributes of the household active on a date
#[derive(Debug, Clone)]
pub struct HouseholdQuery {
    /// Reference date
    pub date: DateExpr,
    /// What to return
    pub returning: HouseholdAttribute,
}

/// Care-home type of the address active on a date
///
/// The rule's predicates read [`CARE_HOME_ATTRIBUTES`].
#[derive(Debug, Clone)]
pub struct CareHomeQuery {
    /// Reference date
    pub date: DateExpr,
    /// Categorisation over care-home attributes
    pub rule: Arc<dyn Categorise>,
}

/// Most recent body mass index recorded in a window
#[derive(Debug, Clone)]
pub struct BmiQuery {
    /// Window the measurement date must fall in
    pub window: TimeWindow,
    /// Ignore measurements taken before this age
    pub minimum_age_at_measurement: u32,
    /// Also return the measurement date
    pub include_measurement_date: Option<DateFormat>,
}

/// Mean of recorded numeric values for a codelist
#[derive(Debug, Clone)]
pub struct MeanValueQuery {
    /// Codes to match
    pub codelist: Arc<Codelist>,
    /// Window the measurement date must fall in
    pub window: TimeWindow,
    /// Average only the values on the latest measurement day
    pub on_most_recent_day_of_measurement: bool,
    /// Also return the measurement date
    pub include_measurement_date: Option<DateFormat>,
}

/// Flag for a predicate over earlier variables and local helpers
#[derive(Debug, Clone)]
pub struct SatisfyingQuery {
    /// The condition
    pub predicate: Predicate,
    /// Helper variables evaluated first, not output
    pub helpers: Vec<VariableSpec>,
}

/// Category from a rule over earlier variables and local helpers
#[derive(Debug, Clone)]
pub struct CategorisedQuery {
    /// The rule
    pub rule: Arc<dyn Categorise>,
    /// Helper variables evaluated first, not output
    pub helpers: Vec<VariableSpec>,
}

/// Where a variable's value comes from
#[derive(Debug, Clone)]
pub enum Source {
    /// `with_these_clinical_events` / `with_these_medications`
    Events(EventQuery),
    /// `with_test_result_in_sgss`
    SgssTest(SgssQuery),
    /// `with_tpp_vaccination_record`
    Vaccination(VaccinationQuery),
    /// `attended_emergency_care`
    EmergencyCare(EmergencyCareQuery),
    /// `died_from_any_cause`
    Death(DeathQuery),
    /// `date_deregistered_from_all_supported_practices`
    Deregistration(DeregistrationQuery),
    /// `registered_with_one_practice_between`
    OnePractice(OnePracticeQuery),
    /// `age_as_of`
    Age(DateExpr),
    /// `sex`
    Sex,
    /// `address_as_of`
    Address(AddressQuery),
    /// `registered_practice_as_of`
    Practice(PracticeQuery),
    /// `household_as_of`
    Household(HouseholdQuery),
    /// `care_home_status_as_of`
    CareHome(CareHomeQuery),
    /// `most_recent_bmi`
    Bmi(BmiQuery),
    /// `mean_recorded_value`
    MeanValue(MeanValueQuery),
    /// `satisfying`
    Satisfying(SatisfyingQuery),
    /// `categorised_as`
    Categorised(CategorisedQuery),
}

/// An extra output column produced alongside a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Companion {
    /// Appended to the variable name
    pub suffix: &'static str,
    /// Date precision of the companion
    pub format: DateFormat,
}

impl Source {
    /// Name of the source operation
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Events(q) => match q.table {
                EventTable::ClinicalEvents => "with_these_clinical_events",
                EventTable::Medications => "with_these_medications",
            },
            Self::SgssTest(_) => "with_test_result_in_sgss",
            Self::Vaccination(_) => "with_tpp_vaccination_record",
            Self::EmergencyCare(_) => "attended_emergency_care",
            Self::Death(_) => "died_from_any_cause",
            Self::Deregistration(_) => "date_deregistered_from_all_supported_practices",
            Self::OnePractice(_) => "registered_with_one_practice_between",
            Self::Age(_) => "age_as_of",
            Self::Sex => "sex",
            Self::Address(_) => "address_as_of",
            Self::Practice(_) => "registered_practice_as_of",
            Self::Household(_) => "household_as_of",
            Self::CareHome(_) => "care_home_status_as_of",
            Self::Bmi(_) => "most_recent_bmi",
            Self::MeanValue(_) => "mean_recorded_value",
            Self::Satisfying(_) => "satisfying",
            Self::Categorised(_) => "categorised_as",
        }
    }

    /// Shape of the value this source returns
    #[must_use]
    pub fn shape(&self) -> ReturnShape {
        match self {
            Self::Events(q) => match q.returning {
                EventReturn::Flag => ReturnShape::Flag,
                EventReturn::Date(f) => ReturnShape::Date(f),
                EventReturn::Category | EventReturn::Code => ReturnShape::Category,
                EventReturn::NumericValue => ReturnShape::Float,
                EventReturn::Count => ReturnShape::Count,
            },
            Self::SgssTest(q) => match q.returning {
                SgssReturn::Flag => ReturnShape::Flag,
                SgssReturn::Date(f) => ReturnShape::Date(f),
                SgssReturn::SGeneTargetFailure => ReturnShape::Category,
            },
            Self::Vaccination(q) => match q.returning {
                VaccinationReturn::Flag => ReturnShape::Flag,
                VaccinationReturn::Date(f) => ReturnShape::Date(f),
            },
            Self::EmergencyCare(q) => match q.returning {
                EmergencyReturn::Flag => ReturnShape::Flag,
                EmergencyReturn::DateArrived(f) => ReturnShape::Date(f),
                EmergencyReturn::DischargeDestination => ReturnShape::Category,
                EmergencyReturn::Count => ReturnShape::Count,
            },
            Self::Death(q) => match q.returning {
                DeathReturn::Flag => ReturnShape::Flag,
                DeathReturn::DateOfDeath(f) => ReturnShape::Date(f),
            },
            Self::Deregistration(q) => ReturnShape::Date(q.format),
            Self::OnePractice(_) | Self::Satisfying(_) => ReturnShape::Flag,
            Self::Age(_) => ReturnShape::Int,
            Self::Sex | Self::CareHome(_) | Self::Categorised(_) => ReturnShape::Category,
            Self::Address(q) => match q.returning {
                AddressAttribute::IndexOfMultipleDeprivation { .. }
                | AddressAttribute::RuralUrbanClassification => ReturnShape::Int,
                AddressAttribute::MsoaCode => ReturnShape::Category,
            },
            Self::Practice(q) => match q.returning {
                PracticeAttribute::PseudoId => ReturnShape::Int,
                _ => ReturnShape::Category,
            },
            Self::Household(_) => ReturnShape::Int,
            Self::Bmi(_) | Self::MeanValue(_) => ReturnShape::Float,
        }
    }

    /// Whether every patient gets a value; categorisations fall back to
    /// their default label when no rule matches
    #[must_use]
    pub fn is_always_present(&self) -> bool {
        matches!(self, Self::Sex | Self::CareHome(_) | Self::Categorised(_))
            || self.shape().is_never_null()
    }

    /// Companion date column, if requested
    #[must_use]
    pub fn companion(&self) -> Option<Companion> {
        match self {
            Self::Events(q) => q.include_date_of_match.map(|format| Companion {
                suffix: "_date",
                format,
            }),
            Self::Bmi(BmiQuery {
                include_measurement_date,
                ..
            })
            | Self::MeanValue(MeanValueQuery {
                include_measurement_date,
                ..
            }) => include_measurement_date.map(|format| Companion {
                suffix: "_date_measured",
                format,
            }),
            _ => None,
        }
    }

    /// Relative date expressions read by this source itself
    #[must_use]
    pub fn date_expressions(&self) -> Vec<&DateExpr> {
        match self {
            Self::Events(EventQuery { window, .. })
            | Self::SgssTest(SgssQuery { window, .. })
            | Self::Vaccination(VaccinationQuery { window, .. })
            | Self::EmergencyCare(EmergencyCareQuery { window, .. })
            | Self::Death(DeathQuery { window, .. })
            | Self::Deregistration(DeregistrationQuery { window, .. })
            | Self::Bmi(BmiQuery { window, .. })
            | Self::MeanValue(MeanValueQuery { window, .. }) => window.boundaries(),
            Self::OnePractice(q) => vec![&q.start, &q.end],
            Self::Age(date)
            | Self::Address(AddressQuery { date, .. })
            | Self::Practice(PracticeQuery { date, .. })
            | Self::Household(HouseholdQuery { date, .. })
            | Self::CareHome(CareHomeQuery { date, .. }) => vec![date],
            Self::Sex | Self::Satisfying(_) | Self::Categorised(_) => Vec::new(),
        }
    }

    /// Variables named in relative date expressions
    #[must_use]
    pub fn date_references(&self) -> Vec<&str> {
        self.date_expressions()
            .into_iter()
            .filter_map(DateExpr::referenced_variable)
            .collect()
    }

    /// Variables read by a predicate or categorisation rule
    ///
    /// Care-home rules read attributes rather than variables and are not
    /// included.
    #[must_use]
    pub fn predicate_references(&self) -> Vec<String> {
        match self {
            Self::Satisfying(q) => q.predicate.required_variables(),
            Self::Categorised(q) => q.rule.required_variables(),
            _ => Vec::new(),
        }
    }

    /// Helper variables scoped to this source
    #[must_use]
    pub fn helpers(&self) -> &[VariableSpec] {
        match self {
            Self::Satisfying(q) => &q.helpers,
            Self::Categorised(q) => &q.helpers,
            _ => &[],
        }
    }

    /// Codelists this source matches against
    #[must_use]
    pub fn codelists(&self) -> Vec<&Arc<Codelist>> {
        match self {
            Self::Events(q) => vec![&q.codelist],
            Self::MeanValue(q) => vec![&q.codelist],
            Self::EmergencyCare(q) => q.diagnoses.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Labels this source can produce, when known
    #[must_use]
    pub fn producible_labels(&self) -> Option<LabelSet> {
        match self {
            Self::Sex => Some(LabelSet::closed(Sex::codes())),
            Self::CareHome(q) => Some(LabelSet::closed(q.rule.labels())),
            Self::Categorised(q) => Some(LabelSet::closed(q.rule.labels())),
            Self::SgssTest(SgssQuery {
                returning: SgssReturn::SGeneTargetFailure,
                ..
            }) => Some(LabelSet::closed(SGTF_LABELS)),
            Self::Practice(PracticeQuery {
                returning: PracticeAttribute::Nuts1RegionName,
                ..
            }) => Some(LabelSet::closed(NUTS1_REGIONS)),
            Self::Address(AddressQuery {
                returning: AddressAttribute::RuralUrbanClassification,
                ..
            }) => Some(LabelSet::closed(RURAL_URBAN_CLASSES)),
            Self::Events(q)
                if q.returning == EventReturn::Category && q.codelist.is_categorised() =>
            {
                Some(LabelSet::Observed(q.codelist.categories()))
            }
            Self::Events(q) if matches!(q.returning, EventReturn::Category | EventReturn::Code) => {
                Some(LabelSet::Observed(
                    q.codelist.entries().iter().map(|e| e.code.clone()).collect(),
                ))
            }
            Self::Satisfying(_) | Self::OnePractice(_) => Some(LabelSet::closed(["0", "1"])),
            _ => None,
        }
    }

    /// One line description used in query plans
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Events(q) => format!(
                "{} codes from {} ({}), {:?} match {}, returning {:?}",
                q.codelist.len(),
                q.codelist.name(),
                q.codelist.system(),
                q.policy,
                q.window,
                q.returning
            ),
            Self::SgssTest(q) => format!(
                "{} {:?} test, {:?} match {}, returning {:?}",
                q.pathogen, q.result, q.policy, q.window, q.returning
            ),
            Self::Vaccination(q) => format!(
                "vaccination against {}, {:?} match {}, returning {:?}",
                q.target_disease, q.policy, q.window, q.returning
            ),
            Self::EmergencyCare(q) => format!(
                "attendance{}, {:?} match {}, returning {:?}",
                q.diagnoses
                    .as_ref()
                    .map(|c| format!(" with diagnosis in {}", c.name()))
                    .unwrap_or_default(),
                q.policy,
                q.window,
                q.returning
            ),
            Self::Death(q) => format!("death {}, returning {:?}", q.window, q.returning),
            Self::Deregistration(q) => format!("deregistration {}", q.window),
            Self::OnePractice(q) => format!("one practice between {} and {}", q.start, q.end),
            Self::Age(date) => format!("age as of {date}"),
            Self::Sex => "recorded sex".to_string(),
            Self::Address(q) => format!("{:?} of address as of {}", q.returning, q.date),
            Self::Practice(q) => format!("{:?} of practice as of {}", q.returning, q.date),
            Self::Household(q) => format!("{:?} of household as of {}", q.returning, q.date),
            Self::CareHome(q) => format!("care home type as of {}", q.date),
            Self::Bmi(q) => format!(
                "most recent BMI {}, aged at least {}",
                q.window, q.minimum_age_at_measurement
            ),
            Self::MeanValue(q) => format!(
                "mean of {} values {}{}",
                q.codelist.name(),
                q.window,
                if q.on_most_recent_day_of_measurement {
                    " on most recent day"
                } else {
                    ""
                }
            ),
            Self::Satisfying(q) => q.predicate.to_string(),
            Self::Categorised(q) => q
                .rule
                .describe()
                .into_iter()
                .map(|(label, condition)| format!("{label}: {condition}"))
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

macro_rules! impl_from_query {
    ($($query:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$query> for Source {
                fn from(query: $query) -> Self {
                    Self::$variant(query)
                }
            }
        )*
    };
}

impl_from_query! {
    EventQuery => Events,
    SgssQuery => SgssTest,
    VaccinationQuery => Vaccination,
    EmergencyCareQuery => EmergencyCare,
    DeathQuery => Death,
    DeregistrationQuery => Deregistration,
    OnePracticeQuery => OnePractice,
    AddressQuery => Address,
    PracticeQuery => Practice,
    HouseholdQuery => Household,
    CareHomeQuery => CareHome,
    BmiQuery => Bmi,
    MeanValueQuery => MeanValue,
    SatisfyingQuery => Satisfying,
    CategorisedQuery => Categorised,
}
