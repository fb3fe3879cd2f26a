//! Evaluation context: study anchors and per-patient bindings

use chrono::NaiveDate;
use indexmap::IndexMap;
use std::collections::HashMap;
use studydef_types::Value;

/// Name of the study index date anchor
pub const INDEX_DATE: &str = "index_date";

/// Name of the anchor for the extraction date
pub const TODAY: &str = "today";

/// Named fixed dates shared by every patient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchors {
    dates: IndexMap<String, NaiveDate>,
}

impl Anchors {
    /// Anchors with the two built-in names
    pub fn new(index_date: NaiveDate, today: NaiveDate) -> Self {
        let mut dates = IndexMap::new();
        dates.insert(INDEX_DATE.to_string(), index_date);
        dates.insert(TODAY.to_string(), today);
        Self { dates }
    }

    /// Add or replace an anchor
    pub fn insert(&mut self, name: impl Into<String>, date: NaiveDate) {
        self.dates.insert(name.into(), date);
    }

    pub fn get(&self, name: &str) -> Option<NaiveDate> {
        self.dates.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.dates.contains_key(name)
    }

    pub fn index_date(&self) -> Option<NaiveDate> {
        self.get(INDEX_DATE)
    }

    pub fn today(&self) -> Option<NaiveDate> {
        self.get(TODAY)
    }

    /// Anchor names in definition order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.dates.keys().map(String::as_str)
    }
}

/// Values resolved so far for one patient
///
/// A name that was evaluated to null is bound to `Value::Null`; a name that
/// was never evaluated is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    values: HashMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Get a bound value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
