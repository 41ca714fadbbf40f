//! Name resolution during per-patient evaluation
//!
//! Declared variables live in the root scope; helpers of a `satisfying` or
//! `categorised_as` declaration live in a child scope that falls back to its
//! parent and is discarded once the owning variable is evaluated.

use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use crate::models::{AddressRecord, Value};
use crate::query::{DateLookup, ValueLookup};

/// Values computed so far for one patient
#[derive(Debug, Default)]
pub struct Scope<'p> {
    values: FxHashMap<String, Value>,
    parent: Option<&'p Scope<'p>>,
}

impl<'p> Scope<'p> {
    /// An empty root scope
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A child scope reading through to `self`
    #[must_use]
    pub fn child<'c>(&'c self) -> Scope<'c> {
        Scope {
            values: FxHashMap::default(),
            parent: Some(self),
        }
    }

    /// Bind a name in this scope
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Look a name up here, then in the parents
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .get(name)
            .or_else(|| self.parent.and_then(|p| p.get(name)))
    }
}

impl ValueLookup for Scope<'_> {
    fn value_of(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl DateLookup for Scope<'_> {
    fn date_of(&self, name: &str) -> Option<NaiveDate> {
        self.get(name).and_then(Value::as_date)
    }
}

/// Care-home attributes of one address, as seen by a categorisation rule
///
/// `IsPotentialCareHome` is 0 or 1; the nursing attributes are `"Y"`, `"N"`
/// or null when the address is not a care home.
#[derive(Debug)]
pub struct CareHomeLookup {
    potential: Value,
    requires_nursing: Value,
    no_nursing: Value,
}

impl CareHomeLookup {
    /// Attributes of the address active on the reference date, if any
    #[must_use]
    pub fn new(address: Option<&AddressRecord>) -> Self {
        let care_home = address.and_then(|a| a.care_home.as_ref());
        let yes_no = |flag: Option<bool>| match flag {
            Some(true) => Value::Str("Y".to_string()),
            Some(false) => Value::Str("N".to_string()),
            None => Value::Null,
        };
        Self {
            potential: Value::flag(care_home.is_some()),
            requires_nursing: yes_no(care_home.and_then(|c| c.location_requires_nursing)),
            no_nursing: yes_no(care_home.and_then(|c| c.location_does_not_require_nursing)),
        }
    }
}

impl ValueLookup for CareHomeLookup {
    fn value_of(&self, name: &str) -> Option<&Value> {
        match name {
            "IsPotentialCareHome" => Some(&self.potential),
            "LocationRequiresNursing" => Some(&self.requires_nursing),
            "LocationDoesNotRequireNursing" => Some(&self.no_nursing),
            _ => None,
        }
    }
}
