//! Time windows over dated records

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::date_expr::{DateExpr, DateLookup};

/// Inclusive time window a record date must fall in
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeWindow {
    /// No restriction
    #[default]
    Any,
    /// On or before the boundary
    OnOrBefore(DateExpr),
    /// On or after the boundary
    OnOrAfter(DateExpr),
    /// Between both boundaries, inclusive
    Between(DateExpr, DateExpr),
}

/// A window resolved to concrete dates for one patient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolvedWindow {
    /// Earliest date, unbounded when `None`
    pub start: Option<NaiveDate>,
    /// Latest date, unbounded when `None`
    pub end: Option<NaiveDate>,
}

impl ResolvedWindow {
    /// Whether `date` falls inside the window
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }
}

impl TimeWindow {
    /// Window between two boundaries
    #[must_use]
    pub fn between(start: impl Into<DateExpr>, end: impl Into<DateExpr>) -> Self {
        Self::Between(start.into(), end.into())
    }

    /// Resolve the boundaries for one patient
    ///
    /// Returns `None` when a boundary refers to a variable with no date, in
    /// which case the window matches nothing.
    pub fn resolve<L: DateLookup + ?Sized>(&self, lookup: &L, today: NaiveDate) -> Option<ResolvedWindow> {
        match self {
            Self::Any => Some(ResolvedWindow::default()),
            Self::OnOrBefore(end) => Some(ResolvedWindow {
                start: None,
                end: Some(end.resolve(lookup, today)?),
            }),
            Self::OnOrAfter(start) => Some(ResolvedWindow {
                start: Some(start.resolve(lookup, today)?),
                end: None,
            }),
            Self::Between(start, end) => Some(ResolvedWindow {
                start: Some(start.resolve(lookup, today)?),
                end: Some(end.resolve(lookup, today)?),
            }),
        }
    }

    /// Boundary expressions in this window
    #[must_use]
    pub fn boundaries(&self) -> Vec<&DateExpr> {
        match self {
            Self::Any => Vec::new(),
            Self::OnOrBefore(e) | Self::OnOrAfter(e) => vec![e],
            Self::Between(a, b) => vec![a, b],
        }
    }

    /// Variables referenced by the boundaries
    #[must_use]
    pub fn referenced_variables(&self) -> Vec<&str> {
        self.boundaries()
            .into_iter()
            .filter_map(DateExpr::referenced_variable)
            .collect()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any time"),
            Self::OnOrBefore(e) => write!(f, "on or before {e}"),
            Self::OnOrAfter(e) => write!(f, "on or after {e}"),
            Self::Between(a, b) => write!(f, "between {a} and {b}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoDates;

    impl DateLookup for NoDates {
        fn date_of(&self, _name: &str) -> Option<NaiveDate> {
            None
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_between_is_inclusive() {
        let window = TimeWindow::between(date(2021, 10, 3), date(2022, 1, 1));
        let resolved = window.resolve(&NoDates, date(2022, 6, 1)).unwrap();
        assert!(resolved.contains(date(2021, 10, 3)));
        assert!(resolved.contains(date(2022, 1, 1)));
        assert!(!resolved.contains(date(2021, 10, 2)));
        assert!(!resolved.contains(date(2022, 1, 2)));
    }

    #[test]
    fn test_unresolvable_boundary() {
        let window = TimeWindow::OnOrAfter(DateExpr::variable("vaxdate1").plus_days(1));
        assert_eq!(window.resolve(&NoDates, date(2022, 6, 1)), None);
        assert_eq!(window.referenced_variables(), vec!["vaxdate1"]);
    }
}
