//! Extracted values
//!
//! Every declared variable yields exactly one `Value` per patient. Absence of
//! a matching record is `Value::Null`, never an error.

use std::cmp::Ordering;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Precision at which a date is returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DateFormat {
    /// `YYYY`
    Year,
    /// `YYYY-MM`
    YearMonth,
    /// `YYYY-MM-DD`
    #[default]
    YearMonthDay,
}

impl DateFormat {
    /// Truncate a date to this precision (first day of the year or month)
    #[must_use]
    pub fn truncate(self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Year => date.with_ordinal(1).unwrap_or(date),
            Self::YearMonth => date.with_day(1).unwrap_or(date),
            Self::YearMonthDay => date,
        }
    }

    /// Render a date at this precision
    #[must_use]
    pub fn format(self, date: NaiveDate) -> String {
        match self {
            Self::Year => date.format("%Y").to_string(),
            Self::YearMonth => date.format("%Y-%m").to_string(),
            Self::YearMonthDay => date.format("%Y-%m-%d").to_string(),
        }
    }

    /// The pattern string used in study definitions
    #[must_use]
    pub const fn pattern(self) -> &'static str {
        match self {
            Self::Year => "YYYY",
            Self::YearMonth => "YYYY-MM",
            Self::YearMonthDay => "YYYY-MM-DD",
        }
    }
}

/// A single extracted value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No matching record
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (flags are 0/1)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Date value, already truncated to its declared format
    Date(NaiveDate),
    /// Category label or code
    Str(String),
}

impl Value {
    /// Flag value for a boolean outcome
    #[must_use]
    pub fn flag(present: bool) -> Self {
        Self::Int(i64::from(present))
    }

    /// Whether this value is null
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Truthiness used by population and categorisation predicates
    ///
    /// Null, zero, false and the empty string are false; dates are true.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(x) => *x != 0.0,
            Self::Date(_) => true,
            Self::Str(s) => !s.is_empty(),
        }
    }

    /// The date held by this value, if any
    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Numeric view of this value, if it has one
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(x) => Some(*x),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Compare against a literal; `None` when either side is null or the types differ
    #[must_use]
    pub fn compare(&self, literal: &Literal) -> Option<Ordering> {
        match (self, literal) {
            (Self::Null, _) => None,
            (Self::Str(a), Literal::Str(b)) => Some(a.as_str().cmp(b.as_str())),
            (Self::Date(a), Literal::Date(b)) => Some(a.cmp(b)),
            (Self::Str(a), Literal::Int(b)) => a.parse::<i64>().ok().map(|a| a.cmp(b)),
            (value, Literal::Int(_) | Literal::Float(_) | Literal::Bool(_)) => {
                let a = value.as_f64()?;
                let b = literal.as_f64()?;
                a.partial_cmp(&b)
            }
            _ => None,
        }
    }

    /// Render this value for tabular output
    #[must_use]
    pub fn render(&self, format: DateFormat) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(i64::from(*b).to_string()),
            Self::Int(n) => Some(n.to_string()),
            Self::Float(x) => Some(x.to_string()),
            Self::Date(d) => Some(format.format(*d)),
            Self::Str(s) => Some(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.render(DateFormat::YearMonthDay) {
            Some(s) => f.write_str(&s),
            None => f.write_str("NULL"),
        }
    }
}

/// A literal on the right hand side of a predicate comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// Boolean literal
    Bool(bool),
    /// Integer literal
    Int(i64),
    /// Floating point literal
    Float(f64),
    /// String literal
    Str(String),
    /// Date literal
    Date(NaiveDate),
}

impl Literal {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(n) => Some(*n as f64),
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "'{s}'"),
            Self::Date(d) => write!(f, "'{d}'"),
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Literal {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Literal {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Literal {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<NaiveDate> for Literal {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_and_format() {
        let date = NaiveDate::from_ymd_opt(2021, 11, 17).unwrap();
        assert_eq!(
            DateFormat::YearMonth.truncate(date),
            NaiveDate::from_ymd_opt(2021, 11, 1).unwrap()
        );
        assert_eq!(
            DateFormat::Year.truncate(date),
            NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()
        );
        assert_eq!(DateFormat::YearMonth.format(date), "2021-11");
        assert_eq!(DateFormat::YearMonthDay.format(date), "2021-11-17");
    }

    #[test]
    fn test_null_comparisons_are_never_true() {
        assert_eq!(Value::Null.compare(&Literal::Int(0)), None);
        assert_eq!(Value::Null.compare(&Literal::from("N")), None);
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn test_numeric_comparison_across_types() {
        assert_eq!(Value::Int(3).compare(&Literal::Float(2.5)), Some(Ordering::Greater));
        assert_eq!(Value::Float(4.0).compare(&Literal::Int(4)), Some(Ordering::Equal));
        assert_eq!(Value::Str("N".into()).compare(&Literal::from("N")), Some(Ordering::Equal));
        assert_eq!(Value::Str("N".into()).compare(&Literal::Int(1)), None);
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::flag(true).is_truthy());
        assert!(!Value::flag(false).is_truthy());
        assert!(Value::Date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
    }
}
