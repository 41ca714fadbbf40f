//! Categorisation rules
//!
//! A categorisation rule is an ordered list of `(predicate, label)` branches
//! plus a default label supplied when the rule is built. Branches are tried
//! in declaration order and the first one whose predicate is true wins;
//! when none match the default is returned, so every patient gets exactly
//! one label.

use std::fmt;

use super::predicate::{Predicate, ValueLookup};

/// A closed set of category labels
///
/// Implemented by label enums so the set of producible labels is known at
/// compile time.
pub trait CategoryLabel: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Code written to the output column
    fn code(self) -> &'static str;

    /// Every label, in the order it should be reported
    fn variants() -> &'static [Self];
}

/// Ordered predicate to label mapping with a mandatory default
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRule<L: CategoryLabel> {
    branches: Vec<(Predicate, L)>,
    default: L,
}

impl<L: CategoryLabel> CategoryRule<L> {
    /// Create a rule returning `default` until branches are added
    #[must_use]
    pub fn new(default: L) -> Self {
        Self {
            branches: Vec::new(),
            default,
        }
    }

    /// Add a branch; branches are tried in the order they are added
    #[must_use]
    pub fn when(mut self, predicate: Predicate, label: L) -> Self {
        self.branches.push((predicate, label));
        self
    }

    /// The label for one patient
    pub fn evaluate<V: ValueLookup + ?Sized>(&self, lookup: &V) -> L {
        self.branches
            .iter()
            .find(|(predicate, _)| predicate.evaluate(lookup))
            .map_or(self.default, |(_, label)| *label)
    }

    /// The branches in evaluation order
    #[must_use]
    pub fn branches(&self) -> &[(Predicate, L)] {
        &self.branches
    }

    /// The default label
    #[must_use]
    pub fn default_label(&self) -> L {
        self.default
    }
}

/// Object-safe view of a categorisation rule
pub trait Categorise: fmt::Debug + Send + Sync {
    /// The label code for one patient
    fn categorise(&self, lookup: &dyn ValueLookup) -> &'static str;

    /// Every label the rule can produce
    fn labels(&self) -> Vec<&'static str>;

    /// Variables read by any branch
    fn required_variables(&self) -> Vec<String>;

    /// Branch conditions rendered for query plans, default last
    fn describe(&self) -> Vec<(&'static str, String)>;
}

impl<L: CategoryLabel> Categorise for CategoryRule<L> {
    fn categorise(&self, lookup: &dyn ValueLookup) -> &'static str {
        self.evaluate(lookup).code()
    }

    fn labels(&self) -> Vec<&'static str> {
        L::variants().iter().map(|l| l.code()).collect()
    }

    fn required_variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        for (predicate, _) in &self.branches {
            for name in predicate.required_variables() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    fn describe(&self) -> Vec<(&'static str, String)> {
        self.branches
            .iter()
            .map(|(p, l)| (l.code(), p.to_string()))
            .chain(std::iter::once((self.default.code(), "DEFAULT".to_string())))
            .collect()
    }
}
