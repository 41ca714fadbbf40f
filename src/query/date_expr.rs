//! Relative date expressions
//!
//! A date boundary in a study definition is either a literal date, "today",
//! or another variable's date shifted by a number of days, months or years.
//! Expressions are typed values rather than strings like
//! `"sgss_pos_inrange - 1 year"`, so a malformed offset cannot reach
//! extraction.

use std::fmt;

use chrono::{Months, NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StudyError};

/// Resolves variable names to the date they hold for the current patient
pub trait DateLookup {
    /// The date held by `name`, or `None` when absent or not a date
    fn date_of(&self, name: &str) -> Option<NaiveDate>;
}

/// Unit of a date offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateUnit {
    /// Calendar days
    Days,
    /// Calendar months, clamped to month end
    Months,
    /// Calendar years, clamped to month end
    Years,
}

/// A signed calendar offset
///
/// Months are applied before days, so `-1 year +1 day` from 2021-03-01
/// yields 2020-03-02.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Offset {
    /// Whole months (years are stored as twelve months)
    pub months: i32,
    /// Whole days
    pub days: i32,
}

impl Offset {
    /// Offset of `n` days
    #[must_use]
    pub const fn days(n: i32) -> Self {
        Self { months: 0, days: n }
    }

    /// Offset of `n` months
    #[must_use]
    pub const fn months(n: i32) -> Self {
        Self { months: n, days: 0 }
    }

    /// Offset of `n` years
    #[must_use]
    pub const fn years(n: i32) -> Self {
        Self {
            months: n * 12,
            days: 0,
        }
    }

    /// Offset of `amount` in `unit`
    #[must_use]
    pub const fn of(amount: i32, unit: DateUnit) -> Self {
        match unit {
            DateUnit::Days => Self::days(amount),
            DateUnit::Months => Self::months(amount),
            DateUnit::Years => Self::years(amount),
        }
    }

    /// Whether the offset is zero
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.months == 0 && self.days == 0
    }

    #[must_use]
    const fn plus(self, other: Self) -> Self {
        Self {
            months: self.months + other.months,
            days: self.days + other.days,
        }
    }

    /// Apply this offset to `date`; `None` on calendar overflow
    #[must_use]
    pub fn apply(self, date: NaiveDate) -> Option<NaiveDate> {
        let shifted = match self.months {
            0 => date,
            m if m > 0 => date.checked_add_months(Months::new(m.unsigned_abs()))?,
            m => date.checked_sub_months(Months::new(m.unsigned_abs()))?,
        };
        shifted.checked_add_signed(TimeDelta::days(i64::from(self.days)))
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn part(f: &mut fmt::Formatter<'_>, n: i32, unit: &str) -> fmt::Result {
            let sign = if n < 0 { '-' } else { '+' };
            let plural = if n.abs() == 1 { "" } else { "s" };
            write!(f, " {sign} {} {unit}{plural}", n.abs())
        }
        if self.months != 0 {
            if self.months % 12 == 0 {
                part(f, self.months / 12, "year")?;
            } else {
                part(f, self.months, "month")?;
            }
        }
        if self.days != 0 {
            part(f, self.days, "day")?;
        }
        Ok(())
    }
}

/// A date boundary in a time window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateExpr {
    /// A literal date
    Fixed(NaiveDate),
    /// The extraction date, shifted by an offset
    Today(Offset),
    /// Another variable's date, shifted by an offset
    Variable {
        /// Name of the referenced variable
        name: String,
        /// Offset applied to the referenced date
        offset: Offset,
    },
}

impl DateExpr {
    /// Parse a literal `YYYY-MM-DD` date, or `today`
    pub fn literal(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("today") {
            return Ok(Self::today());
        }
        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map(Self::Fixed)
            .map_err(|e| StudyError::ParseError(format!("invalid date '{s}': {e}")))
    }

    /// The extraction date
    #[must_use]
    pub const fn today() -> Self {
        Self::Today(Offset::days(0))
    }

    /// Another variable's date
    #[must_use]
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable {
            name: name.into(),
            offset: Offset::default(),
        }
    }

    /// Shift this expression by `offset`
    ///
    /// Literal dates are shifted eagerly; a shift that overflows the
    /// calendar leaves the date unchanged.
    #[must_use]
    pub fn shift(self, by: Offset) -> Self {
        match self {
            Self::Fixed(date) => Self::Fixed(by.apply(date).unwrap_or(date)),
            Self::Today(offset) => Self::Today(offset.plus(by)),
            Self::Variable { name, offset } => Self::Variable {
                name,
                offset: offset.plus(by),
            },
        }
    }

    /// Shift forward by `n` days
    #[must_use]
    pub fn plus_days(self, n: i32) -> Self {
        self.shift(Offset::days(n))
    }

    /// Shift back by `n` days
    #[must_use]
    pub fn minus_days(self, n: i32) -> Self {
        self.shift(Offset::days(-n))
    }

    /// Shift forward by `n` months
    #[must_use]
    pub fn plus_months(self, n: i32) -> Self {
        self.shift(Offset::months(n))
    }

    /// Shift back by `n` months
    #[must_use]
    pub fn minus_months(self, n: i32) -> Self {
        self.shift(Offset::months(-n))
    }

    /// Shift forward by `n` years
    #[must_use]
    pub fn plus_years(self, n: i32) -> Self {
        self.shift(Offset::years(n))
    }

    /// Shift back by `n` years
    #[must_use]
    pub fn minus_years(self, n: i32) -> Self {
        self.shift(Offset::years(-n))
    }

    /// Name of the variable this expression depends on, if any
    #[must_use]
    pub fn referenced_variable(&self) -> Option<&str> {
        match self {
            Self::Variable { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Resolve to a concrete date for one patient
    ///
    /// A reference to a variable that holds no date resolves to `None`.
    pub fn resolve<L: DateLookup + ?Sized>(&self, lookup: &L, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Fixed(date) => Some(*date),
            Self::Today(offset) => offset.apply(today),
            Self::Variable { name, offset } => offset.apply(lookup.date_of(name)?),
        }
    }
}

impl From<NaiveDate> for DateExpr {
    fn from(date: NaiveDate) -> Self {
        Self::Fixed(date)
    }
}

impl fmt::Display for DateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::Today(offset) => write!(f, "today{offset}"),
            Self::Variable { name, offset } => write!(f, "{name}{offset}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Dates(FxHashMap<&'static str, NaiveDate>);

    impl DateLookup for Dates {
        fn date_of(&self, name: &str) -> Option<NaiveDate> {
            self.0.get(name).copied()
        }
    }

    #[test]
    fn test_literal() {
        assert_eq!(
            DateExpr::literal("2021-10-03").unwrap(),
            DateExpr::Fixed(date(2021, 10, 3))
        );
        assert_eq!(DateExpr::literal("today").unwrap(), DateExpr::today());
        assert!(DateExpr::literal("2021-13-03").is_err());
        assert!(DateExpr::literal("sgss_pos_inrange - 1 year").is_err());
    }

    #[test]
    fn test_variable_resolution() {
        let mut map = FxHashMap::default();
        map.insert("sgss_pos_inrange", date(2021, 11, 1));
        let lookup = Dates(map);
        let today = date(2022, 3, 1);

        let year_before = DateExpr::variable("sgss_pos_inrange").minus_years(1);
        assert_eq!(year_before.resolve(&lookup, today), Some(date(2020, 11, 1)));

        let week_before = DateExpr::variable("sgss_pos_inrange").minus_days(7);
        assert_eq!(week_before.resolve(&lookup, today), Some(date(2021, 10, 25)));

        let missing = DateExpr::variable("vaxdate1").plus_days(1);
        assert_eq!(missing.resolve(&lookup, today), None);

        assert_eq!(DateExpr::today().resolve(&lookup, today), Some(today));
    }

    #[test]
    fn test_month_arithmetic_clamps() {
        let expr = DateExpr::Fixed(date(2021, 3, 31)).minus_months(1);
        assert_eq!(expr, DateExpr::Fixed(date(2021, 2, 28)));

        let leap = Offset::years(-1).apply(date(2024, 2, 29));
        assert_eq!(leap, Some(date(2023, 2, 28)));
    }

    #[test]
    fn test_chained_offsets() {
        let expr = DateExpr::variable("x").minus_years(1).plus_days(1);
        assert_eq!(expr.to_string(), "x - 1 year + 1 day");
        let mut map = FxHashMap::default();
        map.insert("x", date(2021, 3, 1));
        assert_eq!(
            expr.resolve(&Dates(map), date(2022, 1, 1)),
            Some(date(2020, 3, 2))
        );
        assert_eq!(expr.referenced_variable(), Some("x"));
    }
}
