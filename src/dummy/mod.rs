//! Dummy data generation
//!
//! Synthesises a cohort from return expectations alone, so a study can be
//! run end to end without patient data. Each column is drawn independently;
//! with a seed the output is reproducible.

use std::time::Instant;

use chrono::{NaiveDate, TimeDelta};
use rand::distr::Distribution as _;
use rand::distr::weighted::WeightedIndex;
use rand::prelude::*;
use rand_distr::Normal;

use crate::config::ExtractionConfig;
use crate::error::{Result, StudyError};
use crate::models::{DateFormat, PatientId, Value};
use crate::output::{Cohort, CohortRow};
use crate::query::{Distribution, Rate, ReturnExpectations, ReturnShape, VariableSpec};
use crate::study::StudyDefinition;
use crate::utils::logging::{create_main_progress_bar, finish_progress_bar, log_stage_complete};

/// Age bands `(lowest, highest, weight)` roughly following the population
/// of England
const AGE_BANDS: [(i64, i64, f64); 10] = [
    (0, 9, 0.12),
    (10, 19, 0.11),
    (20, 29, 0.13),
    (30, 39, 0.13),
    (40, 49, 0.13),
    (50, 59, 0.13),
    (60, 69, 0.11),
    (70, 79, 0.08),
    (80, 89, 0.05),
    (90, 105, 0.01),
];

/// Skew used for exponentially increasing dates
const EXPONENTIAL_RATE: f64 = 3.0;

/// How to draw a category
#[derive(Debug)]
enum CategorySampler {
    Weighted(Vec<String>, WeightedIndex<f64>),
    Uniform(Vec<String>),
    Unknown,
}

impl CategorySampler {
    fn sample(&self, rng: &mut StdRng) -> Option<&str> {
        match self {
            Self::Weighted(labels, index) => Some(labels[index.sample(rng)].as_str()),
            Self::Uniform(labels) if !labels.is_empty() => {
                Some(labels[rng.random_range(0..labels.len())].as_str())
            }
            Self::Uniform(_) | Self::Unknown => None,
        }
    }
}

/// Everything needed to draw one variable's columns
#[derive(Debug)]
struct ColumnPlan {
    shape: ReturnShape,
    incidence: f64,
    rate: Rate,
    dates: (NaiveDate, NaiveDate),
    companion: Option<DateFormat>,
    categories: CategorySampler,
    numeric: Option<Distribution>,
}

impl ColumnPlan {
    fn new(spec: &VariableSpec, expectations: &ReturnExpectations, today: NaiveDate) -> Result<Self> {
        let shape = spec.shape();
        let categories = match &expectations.category {
            Some(ratios) => {
                let labels = ratios.iter().map(|(l, _)| l.clone()).collect();
                let index = WeightedIndex::new(ratios.iter().map(|(_, r)| *r))
                    .map_err(|e| StudyError::expectations(spec.name(), e.to_string()))?;
                CategorySampler::Weighted(labels, index)
            }
            None => match spec.source().producible_labels() {
                Some(set) => CategorySampler::Uniform(set.labels().to_vec()),
                None => CategorySampler::Unknown,
            },
        };
        let numeric = match shape {
            ReturnShape::Float => expectations.float.or(expectations.int),
            _ => expectations.int.or(expectations.float),
        };

        let incidence = if spec.source().is_always_present() {
            1.0
        } else {
            expectations.effective_incidence()
        };

        Ok(Self {
            shape,
            incidence,
            rate: expectations.rate.unwrap_or(Rate::Uniform),
            dates: expectations.date.unwrap_or_default().bounds(today),
            companion: spec.companion_column().map(|(_, format)| format),
            categories,
            numeric,
        })
    }

    /// Draw the variable's value and companion, appending them to `row`
    fn draw(&self, rng: &mut StdRng, row: &mut Vec<Value>) {
        let present = rng.random::<f64>() < self.incidence;
        let value = if present {
            self.draw_value(rng)
        } else if self.shape.is_never_null() {
            Value::Int(0)
        } else {
            Value::Null
        };
        let dated = present && !value.is_null();
        row.push(value);

        if let Some(format) = self.companion {
            row.push(if dated {
                Value::Date(format.truncate(self.draw_date(rng)))
            } else {
                Value::Null
            });
        }
    }

    fn draw_value(&self, rng: &mut StdRng) -> Value {
        match self.shape {
            ReturnShape::Flag => Value::Int(1),
            ReturnShape::Date(format) => Value::Date(format.truncate(self.draw_date(rng))),
            ReturnShape::Category => self
                .categories
                .sample(rng)
                .map_or(Value::Null, |label| Value::Str(label.to_string())),
            ReturnShape::Int | ReturnShape::Count => {
                if let CategorySampler::Weighted(..) = self.categories {
                    return self
                        .categories
                        .sample(rng)
                        .and_then(|label| label.parse().ok())
                        .map_or(Value::Null, Value::Int);
                }
                let fallback = if self.shape == ReturnShape::Count {
                    Distribution::Uniform {
                        min: 1.0,
                        max: 10.0,
                    }
                } else {
                    Distribution::Uniform {
                        min: 0.0,
                        max: 100.0,
                    }
                };
                let x = sample_distribution(self.numeric.unwrap_or(fallback), rng);
                Value::Int(x.round() as i64)
            }
            ReturnShape::Float => {
                let distribution = self.numeric.unwrap_or(Distribution::Uniform {
                    min: 0.0,
                    max: 100.0,
                });
                Value::Float(sample_distribution(distribution, rng))
            }
        }
    }

    fn draw_date(&self, rng: &mut StdRng) -> NaiveDate {
        let (earliest, latest) = self.dates;
        let span = (latest - earliest).num_days().max(0);
        let u: f64 = rng.random();
        let fraction = match self.rate {
            Rate::ExponentialIncrease => {
                (u * (EXPONENTIAL_RATE.exp() - 1.0)).ln_1p() / EXPONENTIAL_RATE
            }
            Rate::Uniform | Rate::Universal => u,
        };
        let offset = ((span as f64) * fraction).floor() as i64;
        earliest + TimeDelta::days(offset.clamp(0, span))
    }
}

/// Draw from a numeric distribution
fn sample_distribution(distribution: Distribution, rng: &mut StdRng) -> f64 {
    match distribution {
        // Standard deviation is checked when expectations are validated
        Distribution::Normal { mean, stddev } => {
            Normal::new(mean, stddev).map_or(mean, |normal| normal.sample(rng))
        }
        Distribution::Uniform { min, max } => {
            if min >= max {
                min
            } else {
                rng.random_range(min..=max)
            }
        }
        Distribution::PopulationAges => population_age(rng) as f64,
    }
}

fn population_age(rng: &mut StdRng) -> i64 {
    let total: f64 = AGE_BANDS.iter().map(|(_, _, w)| w).sum();
    let mut target = rng.random::<f64>() * total;
    for (low, high, weight) in AGE_BANDS {
        if target < weight {
            return rng.random_range(low..=high);
        }
        target -= weight;
    }
    rng.random_range(90..=105)
}

/// Generates a synthetic cohort for a study definition
#[derive(Debug)]
pub struct DummyDataGenerator<'a> {
    definition: &'a StudyDefinition,
    today: NaiveDate,
    population_size: usize,
    seed: Option<u64>,
    show_progress: bool,
}

impl<'a> DummyDataGenerator<'a> {
    /// Create a generator using the run settings in `config`
    #[must_use]
    pub fn new(definition: &'a StudyDefinition, config: &ExtractionConfig) -> Self {
        Self {
            definition,
            today: config.today(),
            population_size: config.population_size,
            seed: config.seed,
            show_progress: config.show_progress,
        }
    }

    /// Generate `population_size` rows with patient ids from 1
    pub fn generate(&self) -> Result<Cohort> {
        let start = Instant::now();
        let plans = self
            .definition
            .variables()
            .iter()
            .map(|spec| {
                let expectations = self.definition.effective_expectations(spec);
                ColumnPlan::new(spec, &expectations, self.today)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut cohort = Cohort::for_definition(self.definition);
        let width = cohort.columns.len();
        let pb = create_main_progress_bar(
            self.population_size as u64,
            Some("Generating dummy patients"),
            self.show_progress,
        );

        cohort.rows.reserve(self.population_size);
        for patient_id in 1..=self.population_size as PatientId {
            let mut values = Vec::with_capacity(width);
            for plan in &plans {
                plan.draw(&mut rng, &mut values);
            }
            cohort.rows.push(CohortRow { patient_id, values });
            pb.inc(1);
        }

        finish_progress_bar(&pb, Some("Dummy data complete"));
        log_stage_complete("Dummy data generation", cohort.len(), start.elapsed());
        Ok(cohort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::AsthmaStatus;
    use crate::query::categorise::CategoryRule;
    use crate::query::patients;
    use crate::query::predicate::var;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_exponential_dates_stay_in_range() {
        let plan = ColumnPlan {
            shape: ReturnShape::Date(DateFormat::YearMonthDay),
            incidence: 1.0,
            rate: Rate::ExponentialIncrease,
            dates: (
                NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2021, 12, 31).unwrap(),
            ),
            companion: None,
            categories: CategorySampler::Unknown,
            numeric: None,
        };
        let mut rng = rng();
        let mut late = 0;
        for _ in 0..1000 {
            let d = plan.draw_date(&mut rng);
            assert!(d >= plan.dates.0 && d <= plan.dates.1);
            if d >= NaiveDate::from_ymd_opt(2021, 7, 1).unwrap() {
                late += 1;
            }
        }
        assert!(late > 600, "expected skew towards the end, got {late}");
    }

    #[test]
    fn test_normal_distribution_matches_mean_and_spread() {
        let mut rng = rng();
        let normal = Distribution::Normal {
            mean: 35.0,
            stddev: 10.0,
        };
        let samples: Vec<f64> = (0..5000).map(|_| sample_distribution(normal, &mut rng)).collect();
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let stddev = (samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
        assert!((mean - 35.0).abs() < 1.0, "mean was {mean}");
        assert!((stddev - 10.0).abs() < 1.0, "standard deviation was {stddev}");
    }

    #[test]
    fn test_categorisations_are_never_null() {
        let rule =
            CategoryRule::new(AsthmaStatus::None).when(var("flagged"), AsthmaStatus::WithSteroids);
        let spec = VariableSpec::new(
            "asthma",
            patients::categorised_as(rule).helper(VariableSpec::new("flagged", patients::sex())),
        );
        // Incidence applies to sparse columns only
        let expectations = ReturnExpectations::new()
            .incidence(0.2)
            .ratios([("0", 0.7), ("2", 0.3)]);
        let today = NaiveDate::from_ymd_opt(2022, 3, 1).unwrap();
        let plan = ColumnPlan::new(&spec, &expectations, today).unwrap();
        assert!((plan.incidence - 1.0).abs() < f64::EPSILON);

        let mut rng = rng();
        let mut row = Vec::new();
        for _ in 0..500 {
            plan.draw(&mut rng, &mut row);
        }
        assert_eq!(row.len(), 500);
        for value in &row {
            assert!(matches!(value, Value::Str(s) if s == "0" || s == "2"), "{value}");
        }
    }

    #[test]
    fn test_population_ages_in_bounds() {
        let mut rng = rng();
        for _ in 0..1000 {
            let age = population_age(&mut rng);
            assert!((0..=105).contains(&age));
        }
    }
}
