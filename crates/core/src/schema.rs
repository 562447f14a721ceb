use std::sync::Arc;

use uuid::Uuid;

use crate::callbacks::{Applicability, Callback, CallbackRegistry, CallbackSet, Hook};
use crate::error::CoreError;
use crate::validation::Rule;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PrimaryKey {
    #[default]
    None,
    Single(String),
    Composite(Vec<String>),
}

impl PrimaryKey {
    pub fn single(column: &str) -> Self {
        Self::Single(column.to_string())
    }

    pub fn composite<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Composite(columns.into_iter().map(Into::into).collect())
    }

    pub fn columns(&self) -> &[String] {
        match self {
            Self::None => &[],
            Self::Single(column) => std::slice::from_ref(column),
            Self::Composite(columns) => columns,
        }
    }
}

/// How a field's stored representation maps back onto a `Value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldKind {
    /// Stored and read back as the database returns it.
    #[default]
    Scalar,
    /// Stored as INTEGER 0/1.
    Boolean,
    /// Stored as a 16-byte blob.
    Uuid,
    /// Stored as a MessagePack blob.
    Array,
}

impl FieldKind {
    pub fn decode(&self, column: &str, value: Value) -> Result<Value, CoreError> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (Self::Scalar, value) => Ok(value),
            (Self::Boolean, Value::Integer(n)) => Ok(Value::Boolean(n != 0)),
            (Self::Boolean, value @ Value::Boolean(_)) => Ok(value),
            (Self::Uuid, Value::Blob(bytes)) => Uuid::from_slice(&bytes)
                .map(Value::Uuid)
                .map_err(|e| CoreError::InvalidData(format!("{column}: {e}"))),
            (Self::Uuid, Value::Text(text)) => Uuid::parse_str(&text)
                .map(Value::Uuid)
                .map_err(|e| CoreError::InvalidData(format!("{column}: {e}"))),
            (Self::Uuid, value @ Value::Uuid(_)) => Ok(value),
            (Self::Array, Value::Blob(bytes)) => match Value::from_msgpack(&bytes) {
                Ok(value @ Value::Array(_)) => Ok(value),
                Ok(_) => Err(CoreError::InvalidData(format!("{column}: not an array"))),
                Err(e) => Err(CoreError::Serialization(e.to_string())),
            },
            (Self::Array, value @ Value::Array(_)) => Ok(value),
            (kind, value) => Err(CoreError::InvalidData(format!(
                "{column}: cannot read {value:?} as {kind:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    /// Tracked on records but never written to or read from the table.
    pub temporary: bool,
    pub rules: Vec<Rule>,
}

/// The immutable descriptor of one entity type: its table, key, fields,
/// validation rules and resolved callbacks.
#[derive(Debug)]
pub struct EntityType {
    name: String,
    table: String,
    primary_key: PrimaryKey,
    fields: Vec<Field>,
    callbacks: CallbackRegistry,
}

impl EntityType {
    pub fn builder(name: &str) -> EntityTypeBuilder {
        EntityTypeBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &PrimaryKey {
        &self.primary_key
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn is_persisted(&self, name: &str) -> bool {
        self.field(name).is_some_and(|f| !f.temporary)
    }

    pub fn persisted_columns(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| !f.temporary)
            .map(|f| f.name.as_str())
    }

    /// Columns carrying at least one validation rule, in declaration order.
    pub fn validated_columns(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| !f.rules.is_empty())
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn rules_for(&self, name: &str) -> &[Rule] {
        self.field(name).map(|f| f.rules.as_slice()).unwrap_or_default()
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    pub fn require_field(&self, name: &str) -> Result<&Field, CoreError> {
        self.field(name).ok_or_else(|| CoreError::UnknownAttribute {
            entity: self.name.clone(),
            attribute: name.to_string(),
        })
    }

    pub fn require_persisted(&self, name: &str) -> Result<&Field, CoreError> {
        match self.require_field(name)? {
            field if field.temporary => Err(CoreError::UnknownAttribute {
                entity: self.name.clone(),
                attribute: name.to_string(),
            }),
            field => Ok(field),
        }
    }
}

pub struct EntityTypeBuilder {
    name: String,
    table: Option<String>,
    primary_key: PrimaryKey,
    fields: Vec<Field>,
    pending_rules: Vec<(String, Rule)>,
    bases: Vec<CallbackSet>,
    own: CallbackSet,
}

impl EntityTypeBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: None,
            primary_key: PrimaryKey::None,
            fields: Vec::new(),
            pending_rules: Vec::new(),
            bases: Vec::new(),
            own: CallbackSet::new(),
        }
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn primary_key(mut self, primary_key: PrimaryKey) -> Self {
        self.primary_key = primary_key;
        self
    }

    pub fn field(self, name: &str) -> Self {
        self.field_of(name, FieldKind::Scalar)
    }

    pub fn bool_field(self, name: &str) -> Self {
        self.field_of(name, FieldKind::Boolean)
    }

    pub fn uuid_field(self, name: &str) -> Self {
        self.field_of(name, FieldKind::Uuid)
    }

    pub fn array_field(self, name: &str) -> Self {
        self.field_of(name, FieldKind::Array)
    }

    pub fn field_of(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(Field {
            name: name.to_string(),
            kind,
            temporary: false,
            rules: Vec::new(),
        });
        self
    }

    pub fn validates(mut self, field: &str, rule: Rule) -> Self {
        self.pending_rules.push((field.to_string(), rule));
        self
    }

    /// Appends a shared declaration level. Levels merge in the order they are
    /// inherited, before the entity's own declarations.
    pub fn inherit(mut self, base: &CallbackSet) -> Self {
        self.bases.push(base.clone());
        self
    }

    pub fn define(mut self, name: &str, callback: Callback) -> Self {
        self.own = self.own.define(name, callback);
        self
    }

    pub fn on(mut self, hook: Hook, name: &str) -> Self {
        self.own = self.own.on(hook, name);
        self
    }

    pub fn on_with(mut self, hook: Hook, name: &str, applicability: Applicability) -> Self {
        self.own = self.own.on_with(hook, name, applicability);
        self
    }

    pub fn skip(mut self, hook: Hook, name: &str) -> Self {
        self.own = self.own.skip(hook, name);
        self
    }

    pub fn skip_with(mut self, hook: Hook, name: &str, applicability: Applicability) -> Self {
        self.own = self.own.skip_with(hook, name, applicability);
        self
    }

    pub fn build(self) -> Result<Arc<EntityType>, CoreError> {
        let simple_name = self.name.rsplit("::").next().unwrap_or(&self.name).to_string();
        let table = match self.table {
            Some(table) => table,
            None => table_name(&simple_name),
        };
        if !is_identifier(&table) {
            return Err(CoreError::InvalidData(format!("invalid table name: {table}")));
        }

        let mut fields: Vec<Field> = Vec::with_capacity(self.fields.len());
        for field in self.fields {
            if !is_identifier(&field.name) {
                return Err(CoreError::InvalidData(format!(
                    "invalid field name: {}",
                    field.name
                )));
            }
            if fields.iter().any(|f| f.name == field.name) {
                return Err(CoreError::DuplicateField {
                    entity: simple_name,
                    field: field.name,
                });
            }
            fields.push(field);
        }

        for (name, rule) in self.pending_rules {
            let Some(index) = fields.iter().position(|f| f.name == name) else {
                return Err(CoreError::UnknownAttribute {
                    entity: simple_name,
                    attribute: name,
                });
            };
            if rule == Rule::Confirmation {
                let shadow = format!("{name}_confirmation");
                let kind = fields[index].kind;
                match fields.iter_mut().find(|f| f.name == shadow) {
                    Some(existing) => existing.temporary = true,
                    None => fields.push(Field {
                        name: shadow,
                        kind,
                        temporary: true,
                        rules: Vec::new(),
                    }),
                }
            }
            fields[index].rules.push(rule);
        }

        validate_primary_key(&simple_name, &self.primary_key, &fields)?;

        let mut levels: Vec<&CallbackSet> = self.bases.iter().collect();
        levels.push(&self.own);
        let callbacks = CallbackRegistry::resolve(&simple_name, &levels)?;

        Ok(Arc::new(EntityType {
            name: simple_name,
            table,
            primary_key: self.primary_key,
            fields,
            callbacks,
        }))
    }
}

fn validate_primary_key(entity: &str, key: &PrimaryKey, fields: &[Field]) -> Result<(), CoreError> {
    let invalid = |reason: String| CoreError::InvalidPrimaryKey {
        entity: entity.to_string(),
        reason,
    };
    if let PrimaryKey::Composite(columns) = key {
        if columns.len() < 2 {
            return Err(invalid("a composite key needs at least two columns".into()));
        }
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].contains(column) {
                return Err(invalid(format!("column {column} repeats")));
            }
        }
    }
    for column in key.columns() {
        match fields.iter().find(|f| &f.name == column) {
            None => return Err(invalid(format!("{column} is not a declared field"))),
            Some(f) if f.temporary => {
                return Err(invalid(format!("{column} is a temporary field")));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// The default table for a type: its simple name pluralized, a trailing `y`
/// becoming `ies` and anything else gaining an `s`. Case is kept.
pub fn table_name(type_name: &str) -> String {
    pluralize(type_name)
}

pub fn pluralize(word: &str) -> String {
    match word.strip_suffix('y').or_else(|| word.strip_suffix('Y')) {
        Some(stem) => format!("{stem}ies"),
        None => format!("{word}s"),
    }
}

/// Plain SQL identifier: ASCII letter or underscore, then letters, digits, underscores.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
