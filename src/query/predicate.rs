//! Boolean predicates over extracted variables
//!
//! Predicates drive population membership, `satisfying` flags and the
//! branches of categorisation rules. Evaluation follows SQL three-valued
//! logic: a comparison involving a null value is unknown, unknown
//! propagates through `NOT`, and only a definite `true` selects a patient
//! or a category branch.

use std::fmt;
use std::ops::Not;

use serde::{Deserialize, Serialize};

use crate::models::{Literal, Value};

/// Resolves variable names to the value they hold for the current patient
pub trait ValueLookup {
    /// The value held by `name`, or `None` when the name is unknown
    fn value_of(&self, name: &str) -> Option<&Value>;
}

/// A predicate over named values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Variable is truthy (non-zero, non-empty, a date)
    Var(String),

    /// Variable equals a literal value
    Eq(String, Literal),

    /// Variable does not equal a literal value
    NotEq(String, Literal),

    /// Variable is greater than a literal value
    Gt(String, Literal),

    /// Variable is greater than or equal to a literal value
    GtEq(String, Literal),

    /// Variable is less than a literal value
    Lt(String, Literal),

    /// Variable is less than or equal to a literal value
    LtEq(String, Literal),

    /// Variable equals one of a set of literal values
    In(String, Vec<Literal>),

    /// Variable is null
    IsNull(String),

    /// Variable is not null
    IsNotNull(String),

    /// Logical AND of predicates
    And(Vec<Predicate>),

    /// Logical OR of predicates
    Or(Vec<Predicate>),

    /// Logical NOT of a predicate
    Not(Box<Predicate>),

    /// Always evaluates to true
    AlwaysTrue,

    /// Always evaluates to false
    AlwaysFalse,
}

/// Variable is truthy
#[must_use]
pub fn var(name: &str) -> Predicate {
    Predicate::Var(name.to_string())
}

/// Variable equals `value`
#[must_use]
pub fn eq(name: &str, value: impl Into<Literal>) -> Predicate {
    Predicate::Eq(name.to_string(), value.into())
}

/// Variable does not equal `value`
#[must_use]
pub fn not_eq(name: &str, value: impl Into<Literal>) -> Predicate {
    Predicate::NotEq(name.to_string(), value.into())
}

/// Variable is greater than `value`
#[must_use]
pub fn gt(name: &str, value: impl Into<Literal>) -> Predicate {
    Predicate::Gt(name.to_string(), value.into())
}

/// Variable is greater than or equal to `value`
#[must_use]
pub fn gt_eq(name: &str, value: impl Into<Literal>) -> Predicate {
    Predicate::GtEq(name.to_string(), value.into())
}

/// Variable is less than `value`
#[must_use]
pub fn lt(name: &str, value: impl Into<Literal>) -> Predicate {
    Predicate::Lt(name.to_string(), value.into())
}

/// Variable is less than or equal to `value`
#[must_use]
pub fn lt_eq(name: &str, value: impl Into<Literal>) -> Predicate {
    Predicate::LtEq(name.to_string(), value.into())
}

/// Variable is one of `values`
#[must_use]
pub fn is_in<I, T>(name: &str, values: I) -> Predicate
where
    I: IntoIterator<Item = T>,
    T: Into<Literal>,
{
    Predicate::In(name.to_string(), values.into_iter().map(Into::into).collect())
}

fn lookup_value<'a, L: ValueLookup + ?Sized>(lookup: &'a L, name: &str) -> &'a Value {
    const NULL: &Value = &Value::Null;
    lookup.value_of(name).unwrap_or(NULL)
}

impl Predicate {
    /// Conjunction with another predicate, flattening nested ANDs
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), right) => {
                left.push(right);
                Self::And(left)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }

    /// Disjunction with another predicate, flattening nested ORs
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), right) => {
                left.push(right);
                Self::Or(left)
            }
            (left, right) => Self::Or(vec![left, right]),
        }
    }

    /// Evaluate with three-valued logic; `None` means unknown
    pub fn evaluate_tristate<L: ValueLookup + ?Sized>(&self, lookup: &L) -> Option<bool> {
        match self {
            Self::Var(name) => {
                let v = lookup_value(lookup, name);
                if v.is_null() { None } else { Some(v.is_truthy()) }
            }
            Self::Eq(name, lit) => lookup_value(lookup, name).compare(lit).map(|o| o.is_eq()),
            Self::NotEq(name, lit) => lookup_value(lookup, name).compare(lit).map(|o| o.is_ne()),
            Self::Gt(name, lit) => lookup_value(lookup, name).compare(lit).map(|o| o.is_gt()),
            Self::GtEq(name, lit) => lookup_value(lookup, name).compare(lit).map(|o| o.is_ge()),
            Self::Lt(name, lit) => lookup_value(lookup, name).compare(lit).map(|o| o.is_lt()),
            Self::LtEq(name, lit) => lookup_value(lookup, name).compare(lit).map(|o| o.is_le()),
            Self::In(name, lits) => {
                let v = lookup_value(lookup, name);
                if v.is_null() {
                    return None;
                }
                Some(lits.iter().any(|lit| v.compare(lit).is_some_and(|o| o.is_eq())))
            }
            Self::IsNull(name) => Some(lookup_value(lookup, name).is_null()),
            Self::IsNotNull(name) => Some(!lookup_value(lookup, name).is_null()),
            Self::And(preds) => {
                let mut unknown = false;
                for p in preds {
                    match p.evaluate_tristate(lookup) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                if unknown { None } else { Some(true) }
            }
            Self::Or(preds) => {
                let mut unknown = false;
                for p in preds {
                    match p.evaluate_tristate(lookup) {
                        Some(true) => return Some(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                if unknown { None } else { Some(false) }
            }
            Self::Not(p) => p.evaluate_tristate(lookup).map(|b| !b),
            Self::AlwaysTrue => Some(true),
            Self::AlwaysFalse => Some(false),
        }
    }

    /// Whether the predicate is definitely true
    pub fn evaluate<L: ValueLookup + ?Sized>(&self, lookup: &L) -> bool {
        self.evaluate_tristate(lookup) == Some(true)
    }

    /// Returns all variable names this predicate reads, in first-seen order
    #[must_use]
    pub fn required_variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_required_variables(&mut names);
        names
    }

    fn collect_required_variables(&self, names: &mut Vec<String>) {
        match self {
            Self::Var(name)
            | Self::Eq(name, _)
            | Self::NotEq(name, _)
            | Self::Gt(name, _)
            | Self::GtEq(name, _)
            | Self::Lt(name, _)
            | Self::LtEq(name, _)
            | Self::In(name, _)
            | Self::IsNull(name)
            | Self::IsNotNull(name) => {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            Self::And(preds) | Self::Or(preds) => {
                for p in preds {
                    p.collect_required_variables(names);
                }
            }
            Self::Not(p) => p.collect_required_variables(names),
            Self::AlwaysTrue | Self::AlwaysFalse => {}
        }
    }
}

impl Not for Predicate {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, preds: &[Predicate], op: &str) -> fmt::Result {
            f.write_str("(")?;
            for (i, p) in preds.iter().enumerate() {
                if i > 0 {
                    write!(f, " {op} ")?;
                }
                write!(f, "{p}")?;
            }
            f.write_str(")")
        }
        match self {
            Self::Var(name) => f.write_str(name),
            Self::Eq(name, lit) => write!(f, "{name} = {lit}"),
            Self::NotEq(name, lit) => write!(f, "{name} != {lit}"),
            Self::Gt(name, lit) => write!(f, "{name} > {lit}"),
            Self::GtEq(name, lit) => write!(f, "{name} >= {lit}"),
            Self::Lt(name, lit) => write!(f, "{name} < {lit}"),
            Self::LtEq(name, lit) => write!(f, "{name} <= {lit}"),
            Self::In(name, lits) => {
                write!(f, "{name} IN (")?;
                for (i, lit) in lits.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{lit}")?;
                }
                f.write_str(")")
            }
            Self::IsNull(name) => write!(f, "{name} IS NULL"),
            Self::IsNotNull(name) => write!(f, "{name} IS NOT NULL"),
            Self::And(preds) => join(f, preds, "AND"),
            Self::Or(preds) => join(f, preds, "OR"),
            Self::Not(p) => write!(f, "NOT {p}"),
            Self::AlwaysTrue => f.write_str("TRUE"),
            Self::AlwaysFalse => f.write_str("FALSE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    struct Values(FxHashMap<&'static str, Value>);

    impl ValueLookup for Values {
        fn value_of(&self, name: &str) -> Option<&Value> {
            self.0.get(name)
        }
    }

    fn values(pairs: &[(&'static str, Value)]) -> Values {
        Values(pairs.iter().cloned().collect())
    }

    #[test]
    fn test_comparisons() {
        let v = values(&[
            ("code", Value::Str("N".into())),
            ("count", Value::Int(3)),
        ]);
        assert!(eq("code", "N").evaluate(&v));
        assert!(!eq("code", "S").evaluate(&v));
        assert!(not_eq("code", "S").evaluate(&v));
        assert!(gt("count", 0).evaluate(&v));
        assert!(lt("count", 5).evaluate(&v));
        assert!(!gt("count", 4).evaluate(&v));
        assert!(is_in("code", ["S", "N"]).evaluate(&v));
    }

    #[test]
    fn test_null_semantics() {
        let v = values(&[("code", Value::Null)]);
        assert!(!eq("code", "N").evaluate(&v));
        assert!(!not_eq("code", "N").evaluate(&v));
        assert!(!(!eq("code", "N")).evaluate(&v));
        assert!(!var("missing").evaluate(&v));
        assert!(Predicate::IsNull("code".into()).evaluate(&v));
        // Unknown OR true is true
        assert!(eq("code", "N").or(Predicate::AlwaysTrue).evaluate(&v));
        // Unknown AND false is false
        assert_eq!(
            eq("code", "N").and(Predicate::AlwaysFalse).evaluate_tristate(&v),
            Some(false)
        );
    }

    #[test]
    fn test_required_variables_and_display() {
        let p = eq("most_recent_smoking_code", "E")
            .or(eq("most_recent_smoking_code", "N").and(var("ever_smoked")));
        assert_eq!(
            p.required_variables(),
            vec!["most_recent_smoking_code".to_string(), "ever_smoked".to_string()]
        );
        assert_eq!(
            p.to_string(),
            "(most_recent_smoking_code = 'E' OR (most_recent_smoking_code = 'N' AND ever_smoked))"
        );
        assert_eq!(!!var("x"), var("x"));
    }
}
