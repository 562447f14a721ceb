use std::collections::BTreeMap;

use crate::value::Value;

/// Whether a matching row is known to exist. A failed probe leaves the state
/// `Unknown`; only a confirmation is ever cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Existence {
    #[default]
    Unknown,
    Confirmed,
}

/// Per-record attribute state: current values, the first-assignment order of
/// every attribute ever written, and the last-persisted snapshot.
#[derive(Debug, Clone, Default)]
pub struct AttributeStore {
    assigned: Vec<String>,
    values: BTreeMap<String, Value>,
    old: BTreeMap<String, Value>,
    existence: Existence,
}

impl AttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: Value) {
        if !self.values.contains_key(name) {
            self.assigned.push(name.to_string());
        }
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Attribute names in first-assignment order.
    pub fn assigned(&self) -> &[String] {
        &self.assigned
    }

    pub fn is_assigned(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn old(&self) -> &BTreeMap<String, Value> {
        &self.old
    }

    pub fn old_value(&self, name: &str) -> Option<&Value> {
        self.old.get(name)
    }

    pub fn replace_old(&mut self, snapshot: BTreeMap<String, Value>) {
        self.old = snapshot;
    }

    /// Copies the current value of each of `names` into the snapshot.
    pub fn snapshot<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            if let Some(value) = self.values.get(name) {
                self.old.insert(name.to_string(), value.clone());
            }
        }
    }

    /// Assigned attributes whose value differs from the snapshot, in
    /// assignment order. An attribute absent from the snapshot is dirty.
    pub fn dirty(&self) -> impl Iterator<Item = &str> {
        self.assigned
            .iter()
            .filter(|name| self.old.get(name.as_str()) != self.values.get(name.as_str()))
            .map(String::as_str)
    }

    pub fn existence(&self) -> Existence {
        self.existence
    }

    pub fn exists(&self) -> bool {
        self.existence == Existence::Confirmed
    }

    pub fn confirm_exists(&mut self) {
        self.existence = Existence::Confirmed;
    }
}
