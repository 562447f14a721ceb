use std::collections::BTreeMap;
use std::sync::Arc;

use crate::attributes::AttributeStore;
use crate::error::CoreError;
use crate::schema::EntityType;
use crate::value::{Criterion, Row, Value};

static NULL: Value = Value::Null;

/// One entity instance: its type descriptor, attribute state and the soft
/// validation errors collected by the last operation.
#[derive(Debug, Clone)]
pub struct Record {
    entity: Arc<EntityType>,
    attributes: AttributeStore,
    errors: Vec<String>,
}

impl Record {
    /// An empty record, destined for creation.
    pub fn new(entity: &Arc<EntityType>) -> Self {
        Self {
            entity: Arc::clone(entity),
            attributes: AttributeStore::new(),
            errors: Vec::new(),
        }
    }

    pub fn with_attributes<I, K, V>(entity: &Arc<EntityType>, attributes: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut record = Self::new(entity);
        record.assign_attributes(attributes)?;
        Ok(record)
    }

    /// A record loaded from storage. Every column of `row` must be a
    /// persisted field; the row seeds the snapshot and confirms existence.
    pub fn from_row(entity: &Arc<EntityType>, row: &Row) -> Result<Self, CoreError> {
        let mut record = Self::new(entity);
        record.refresh_from_row(row)?;
        Ok(record)
    }

    pub fn entity(&self) -> &Arc<EntityType> {
        &self.entity
    }

    pub fn attributes(&self) -> &AttributeStore {
        &self.attributes
    }

    pub fn assign_attribute(&mut self, name: &str, value: impl Into<Value>) -> Result<(), CoreError> {
        self.entity.require_field(name)?;
        self.attributes.set(name, value.into());
        Ok(())
    }

    /// Assigns each pair in order. Stops at the first undeclared name; pairs
    /// before it stay assigned.
    pub fn assign_attributes<I, K, V>(&mut self, attributes: I) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (name, value) in attributes {
            self.assign_attribute(name.as_ref(), value)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// The current value, or `Null` when unassigned.
    pub fn value(&self, name: &str) -> &Value {
        self.attributes.get(name).unwrap_or(&NULL)
    }

    pub fn exists(&self) -> bool {
        self.attributes.exists()
    }

    /// Caches a positive existence probe. A record that has never been
    /// loaded adopts its current values as the persisted snapshot.
    pub fn confirm_exists(&mut self) {
        if self.attributes.old().is_empty() {
            let names: Vec<String> = self.persisted_names().map(str::to_string).collect();
            self.attributes.snapshot(names.iter().map(String::as_str));
        }
        self.attributes.confirm_exists();
    }

    /// Reassigns every column of `row` and makes it the persisted snapshot.
    pub fn refresh_from_row(&mut self, row: &Row) -> Result<(), CoreError> {
        let mut snapshot = BTreeMap::new();
        for (column, stored) in row.iter() {
            let field = self.entity.require_persisted(column)?;
            let value = field.kind.decode(column, stored.clone())?;
            self.attributes.set(column, value.clone());
            snapshot.insert(column.to_string(), value);
        }
        self.attributes.replace_old(snapshot);
        self.attributes.confirm_exists();
        Ok(())
    }

    fn persisted_names(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .assigned()
            .iter()
            .map(String::as_str)
            .filter(|name| self.entity.is_persisted(name))
    }

    /// Assigned persisted attributes in first-assignment order.
    pub fn persisted_assignments(&self) -> Vec<(String, Value)> {
        self.persisted_names()
            .map(|name| (name.to_string(), self.value(name).clone()))
            .collect()
    }

    /// Persisted attributes whose value differs from the snapshot.
    pub fn dirty_columns(&self) -> Vec<String> {
        self.attributes
            .dirty()
            .filter(|name| self.entity.is_persisted(name))
            .map(str::to_string)
            .collect()
    }

    pub fn dirty_assignments(&self) -> Vec<(String, Value)> {
        self.dirty_columns()
            .into_iter()
            .map(|name| {
                let value = self.value(&name).clone();
                (name, value)
            })
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty_columns().is_empty()
    }

    /// The existence probe filter: every assigned persisted attribute plus
    /// each primary-key column, unassigned ones matching `NULL`.
    pub fn identity_filters(&self) -> Vec<(String, Criterion)> {
        let mut filters = self.content_filters();
        for column in self.entity.primary_key().columns() {
            if !self.attributes.is_assigned(column) {
                filters.push((column.clone(), Criterion::null()));
            }
        }
        filters
    }

    /// Equality on every assigned persisted attribute.
    pub fn content_filters(&self) -> Vec<(String, Criterion)> {
        self.persisted_assignments()
            .into_iter()
            .map(|(name, value)| (name, Criterion::Is(value)))
            .collect()
    }

    /// Filters locating the stored row from the snapshot: the primary-key
    /// columns when all are known, otherwise every snapshot column.
    pub fn snapshot_filters(&self) -> Vec<(String, Criterion)> {
        let old = self.attributes.old();
        let key = self.entity.primary_key().columns();
        let key_known = !key.is_empty()
            && key
                .iter()
                .all(|column| old.get(column).is_some_and(|v| !v.is_null()));
        if key_known {
            return key
                .iter()
                .filter_map(|column| old.get(column).map(|v| (column.clone(), Criterion::Is(v.clone()))))
                .collect();
        }
        old.iter()
            .filter(|(name, _)| self.entity.is_persisted(name))
            .map(|(name, value)| (name.clone(), Criterion::Is(value.clone())))
            .collect()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
