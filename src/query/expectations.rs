//! Return expectations for dummy data
//!
//! Expectations describe how to synthesise a plausible value for a variable
//! without touching real data: how often a value is present, the date range
//! it falls in, category frequencies and numeric distributions. A variable's
//! own expectations override the study-wide defaults key by key.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StudyError};

/// How often and how values are spread over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rate {
    /// Every patient has a value
    Universal,
    /// Values present with `incidence`, dates uniform over the range
    Uniform,
    /// Values present with `incidence`, dates skewed towards the end of the range
    ExponentialIncrease,
}

/// A date boundary in expectations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedDate {
    /// A literal date
    Fixed(NaiveDate),
    /// The run date
    Today,
}

impl ExpectedDate {
    /// Resolve against the run date
    #[must_use]
    pub fn resolve(self, today: NaiveDate) -> NaiveDate {
        match self {
            Self::Fixed(d) => d,
            Self::Today => today,
        }
    }
}

/// Date range for synthesised dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateExpectation {
    /// Earliest date, defaults to 1900-01-01
    pub earliest: Option<ExpectedDate>,
    /// Latest date, defaults to today
    pub latest: Option<ExpectedDate>,
}

impl DateExpectation {
    /// Earliest date used when none is given
    #[must_use]
    pub fn default_earliest() -> NaiveDate {
        NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Concrete `(earliest, latest)` bounds for a run on `today`
    #[must_use]
    pub fn bounds(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let earliest = self
            .earliest
            .map_or_else(Self::default_earliest, |d| d.resolve(today));
        let latest = self.latest.map_or(today, |d| d.resolve(today));
        (earliest, latest)
    }

    fn merged_with(self, defaults: Self) -> Self {
        Self {
            earliest: self.earliest.or(defaults.earliest),
            latest: self.latest.or(defaults.latest),
        }
    }
}

/// Shape of a synthesised numeric value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "distribution", rename_all = "snake_case")]
pub enum Distribution {
    /// Normal distribution
    Normal {
        /// Mean
        mean: f64,
        /// Standard deviation
        stddev: f64,
    },
    /// Ages following the national population pyramid
    PopulationAges,
    /// Uniform over an inclusive range
    Uniform {
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
    },
}

/// Synthetic data hints for one variable
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReturnExpectations {
    /// Presence rate
    pub rate: Option<Rate>,
    /// Probability a value is present
    pub incidence: Option<f64>,
    /// Date range
    pub date: Option<DateExpectation>,
    /// Category labels with relative frequencies, in declaration order
    pub category: Option<Vec<(String, f64)>>,
    /// Integer distribution
    pub int: Option<Distribution>,
    /// Float distribution
    pub float: Option<Distribution>,
}

impl ReturnExpectations {
    /// Empty expectations
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rate
    #[must_use]
    pub fn rate(mut self, rate: Rate) -> Self {
        self.rate = Some(rate);
        self
    }

    /// Every patient has a value
    #[must_use]
    pub fn universal(self) -> Self {
        self.rate(Rate::Universal)
    }

    /// Set the incidence
    #[must_use]
    pub fn incidence(mut self, incidence: f64) -> Self {
        self.incidence = Some(incidence);
        self
    }

    /// Set both date bounds
    #[must_use]
    pub fn date_between(mut self, earliest: ExpectedDate, latest: ExpectedDate) -> Self {
        self.date = Some(DateExpectation {
            earliest: Some(earliest),
            latest: Some(latest),
        });
        self
    }

    /// Set the earliest date only
    #[must_use]
    pub fn date_from(mut self, earliest: ExpectedDate) -> Self {
        self.date = Some(DateExpectation {
            earliest: Some(earliest),
            latest: None,
        });
        self
    }

    /// Set the latest date only
    #[must_use]
    pub fn date_until(mut self, latest: ExpectedDate) -> Self {
        self.date = Some(DateExpectation {
            earliest: None,
            latest: Some(latest),
        });
        self
    }

    /// Declare a date expectation with no explicit bounds
    #[must_use]
    pub fn any_date(mut self) -> Self {
        self.date = Some(DateExpectation::default());
        self
    }

    /// Set category ratios, keeping their order
    #[must_use]
    pub fn ratios<I, S>(mut self, ratios: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        self.category = Some(ratios.into_iter().map(|(k, v)| (k.into(), v)).collect());
        self
    }

    /// Set the integer distribution
    #[must_use]
    pub fn int(mut self, distribution: Distribution) -> Self {
        self.int = Some(distribution);
        self
    }

    /// Set the float distribution
    #[must_use]
    pub fn float(mut self, distribution: Distribution) -> Self {
        self.float = Some(distribution);
        self
    }

    /// Fill unset keys from `defaults`
    ///
    /// Date bounds merge field by field, so a variable giving only
    /// `earliest` keeps the default `latest`.
    #[must_use]
    pub fn merged_with(&self, defaults: &Self) -> Self {
        Self {
            rate: self.rate.or(defaults.rate),
            incidence: self.incidence.or(defaults.incidence),
            date: match (self.date, defaults.date) {
                (Some(own), Some(def)) => Some(own.merged_with(def)),
                (own, def) => own.or(def),
            },
            category: self.category.clone().or_else(|| defaults.category.clone()),
            int: self.int.or(defaults.int),
            float: self.float.or(defaults.float),
        }
    }

    /// Probability a value is present
    ///
    /// A universal rate always yields a value; otherwise the incidence
    /// applies, defaulting to 1.
    #[must_use]
    pub fn effective_incidence(&self) -> f64 {
        match self.rate {
            Some(Rate::Universal) => 1.0,
            _ => self.incidence.unwrap_or(1.0),
        }
    }

    /// Category labels in declaration order
    #[must_use]
    pub fn category_labels(&self) -> Vec<&str> {
        self.category
            .iter()
            .flatten()
            .map(|(label, _)| label.as_str())
            .collect()
    }

    /// Check values are within their domains
    ///
    /// # Arguments
    /// * `variable` - Name of the declaring variable, used in errors
    pub fn validate(&self, variable: &str) -> Result<()> {
        if let Some(incidence) = self.incidence {
            if !(0.0..=1.0).contains(&incidence) {
                return Err(StudyError::expectations(
                    variable,
                    format!("incidence {incidence} is outside [0, 1]"),
                ));
            }
        }

        if let Some(ratios) = &self.category {
            if ratios.is_empty() {
                return Err(StudyError::expectations(variable, "category ratios are empty"));
            }
            if let Some((label, ratio)) = ratios.iter().find(|(_, r)| !(*r >= 0.0)) {
                return Err(StudyError::expectations(
                    variable,
                    format!("ratio for '{label}' is negative ({ratio})"),
                ));
            }
            let total: f64 = ratios.iter().map(|(_, r)| r).sum();
            if total <= 0.0 {
                return Err(StudyError::expectations(variable, "category ratios sum to zero"));
            }
            if (total - 1.0).abs() > 0.01 {
                log::warn!("Category ratios for {variable} sum to {total:.3}, not 1; they will be normalised");
            }
        }

        for distribution in self.int.iter().chain(self.float.iter()) {
            match *distribution {
                Distribution::Normal { stddev, .. } if !(stddev >= 0.0) => {
                    return Err(StudyError::expectations(
                        variable,
                        format!("standard deviation {stddev} is negative"),
                    ));
                }
                Distribution::Uniform { min, max } if min > max => {
                    return Err(StudyError::expectations(
                        variable,
                        format!("uniform range {min}..{max} is empty"),
                    ));
                }
                _ => {}
            }
        }

        if let Some(DateExpectation {
            earliest: Some(ExpectedDate::Fixed(earliest)),
            latest: Some(ExpectedDate::Fixed(latest)),
        }) = self.date
        {
            if earliest > latest {
                return Err(StudyError::expectations(
                    variable,
                    format!("earliest date {earliest} is after latest date {latest}"),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn study_defaults() -> ReturnExpectations {
        ReturnExpectations::new()
            .date_between(ExpectedDate::Fixed(date(1970, 1, 1)), ExpectedDate::Today)
            .rate(Rate::Uniform)
            .incidence(0.2)
    }

    #[test]
    fn test_merge_overrides_keys() {
        let own = ReturnExpectations::new()
            .date_from(ExpectedDate::Fixed(date(2021, 10, 1)))
            .incidence(0.1);
        let merged = own.merged_with(&study_defaults());
        assert_eq!(merged.incidence, Some(0.1));
        assert_eq!(merged.rate, Some(Rate::Uniform));
        let today = date(2022, 2, 1);
        assert_eq!(
            merged.date.unwrap().bounds(today),
            (date(2021, 10, 1), today)
        );
    }

    #[test]
    fn test_universal_incidence() {
        let e = ReturnExpectations::new().universal().incidence(0.2);
        assert!((e.effective_incidence() - 1.0).abs() < f64::EPSILON);
        assert!((ReturnExpectations::new().effective_incidence() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate() {
        assert!(ReturnExpectations::new().incidence(1.2).validate("x").is_err());
        assert!(
            ReturnExpectations::new()
                .ratios([("a", 0.5), ("b", -0.1)])
                .validate("x")
                .is_err()
        );
        assert!(
            ReturnExpectations::new()
                .float(Distribution::Normal { mean: 1.0, stddev: -1.0 })
                .validate("x")
                .is_err()
        );
        assert!(
            ReturnExpectations::new()
                .date_between(
                    ExpectedDate::Fixed(date(2022, 1, 1)),
                    ExpectedDate::Fixed(date(2021, 1, 1))
                )
                .validate("x")
                .is_err()
        );
        // A sum away from one is only a warning
        assert!(
            ReturnExpectations::new()
                .ratios([("a", 0.5), ("b", 0.9)])
                .validate("x")
                .is_ok()
        );
    }
}
