use std::sync::Arc;

use rowforge_core::{
    Action, Applicability, CallbackSet, CoreError, EntityType, Hook, PrimaryKey, Record, Rule, Value,
};

pub const SCHEMA_SQL: &str = "
CREATE TABLE orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    status TEXT,
    total INTEGER,
    tags BLOB,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE memberships (
    team_id INTEGER NOT NULL DEFAULT 1,
    user_id INTEGER NOT NULL DEFAULT 1,
    role TEXT,
    joined_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (team_id, user_id)
);

CREATE TABLE users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT,
    password TEXT,
    age INTEGER,
    active INTEGER NOT NULL DEFAULT 1,
    token BLOB
);

CREATE TABLE event_logs (
    kind TEXT,
    payload TEXT
);

CREATE TABLE products (
    sku TEXT NOT NULL,
    region TEXT NOT NULL,
    price INTEGER,
    stock INTEGER,
    PRIMARY KEY (sku, region)
);

CREATE TABLE widgets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    trail TEXT NOT NULL DEFAULT ''
);
";

/// The entity types matching `SCHEMA_SQL`.
#[derive(Debug, Clone)]
pub struct Fixtures {
    pub orders: Arc<EntityType>,
    pub memberships: Arc<EntityType>,
    pub users: Arc<EntityType>,
    pub event_logs: Arc<EntityType>,
    pub products: Arc<EntityType>,
    pub widgets: Arc<EntityType>,
}

impl Fixtures {
    pub fn build() -> Result<Self, CoreError> {
        Ok(Self {
            orders: orders()?,
            memberships: memberships()?,
            users: users()?,
            event_logs: event_logs()?,
            products: products()?,
            widgets: widgets()?,
        })
    }
}

/// Builds a bulk row from column/value pairs.
pub fn row(pairs: &[(&str, Value)]) -> Vec<(String, Value)> {
    pairs
        .iter()
        .map(|(column, value)| (column.to_string(), value.clone()))
        .collect()
}

fn orders() -> Result<Arc<EntityType>, CoreError> {
    EntityType::builder("shop::Order")
        .primary_key(PrimaryKey::single("id"))
        .field("id")
        .field("status")
        .field("total")
        .array_field("tags")
        .field("created_at")
        .validates("status", Rule::Presence)
        .build()
}

fn memberships() -> Result<Arc<EntityType>, CoreError> {
    EntityType::builder("Membership")
        .primary_key(PrimaryKey::composite(["team_id", "user_id"]))
        .field("team_id")
        .field("user_id")
        .field("role")
        .field("joined_at")
        .build()
}

fn users() -> Result<Arc<EntityType>, CoreError> {
    EntityType::builder("User")
        .primary_key(PrimaryKey::single("id"))
        .field("id")
        .field("email")
        .field("password")
        .field("age")
        .bool_field("active")
        .uuid_field("token")
        .validates("email", Rule::Presence)
        .validates("email", Rule::Uniqueness)
        .validates("password", Rule::Length { minimum: 8 })
        .validates("password", Rule::Confirmation)
        .validates("age", Rule::Numericality { only_integer: true })
        .define("screen_email", screen_email)
        .on(Hook::BeforeValidate, "screen_email")
        .build()
}

fn screen_email(record: &mut Record) -> Result<(), CoreError> {
    if record.value("email").as_text().is_some_and(|email| email.ends_with("@blocked.test")) {
        record.add_error("email domain is blocked.");
    }
    Ok(())
}

fn event_logs() -> Result<Arc<EntityType>, CoreError> {
    EntityType::builder("EventLog")
        .table("event_logs")
        .field("kind")
        .field("payload")
        .build()
}

fn products() -> Result<Arc<EntityType>, CoreError> {
    EntityType::builder("Product")
        .primary_key(PrimaryKey::composite(["sku", "region"]))
        .field("sku")
        .field("region")
        .field("price")
        .field("stock")
        .build()
}

/// Appends `tag` to the widget's comma-separated `trail`.
fn mark(record: &mut Record, tag: &str) -> Result<(), CoreError> {
    let trail = match record.value("trail").as_text() {
        Some(existing) if !existing.is_empty() => format!("{existing},{tag}"),
        _ => tag.to_string(),
    };
    record.assign_attribute("trail", trail)
}

fn audit(record: &mut Record) -> Result<(), CoreError> {
    mark(record, "audit")
}

fn before_validate(record: &mut Record) -> Result<(), CoreError> {
    if record.value("name").as_text() == Some("locked") {
        record.add_error("name is locked.");
    }
    mark(record, "before_validate")
}

fn reject_banned(record: &mut Record) -> Result<(), CoreError> {
    if record.value("name").as_text() == Some("banned") {
        record.add_error("name is not allowed.");
    }
    Ok(())
}

fn after_validate(record: &mut Record) -> Result<(), CoreError> {
    mark(record, "after_validate")
}

fn before_save(record: &mut Record) -> Result<(), CoreError> {
    mark(record, "before_save")
}

fn after_save(record: &mut Record) -> Result<(), CoreError> {
    mark(record, "after_save")
}

fn before_create(record: &mut Record) -> Result<(), CoreError> {
    mark(record, "before_create")
}

fn after_create(record: &mut Record) -> Result<(), CoreError> {
    mark(record, "after_create")
}

fn before_update(record: &mut Record) -> Result<(), CoreError> {
    mark(record, "before_update")
}

fn after_update(record: &mut Record) -> Result<(), CoreError> {
    mark(record, "after_update")
}

fn before_destroy(record: &mut Record) -> Result<(), CoreError> {
    mark(record, "before_destroy")
}

fn after_destroy(record: &mut Record) -> Result<(), CoreError> {
    mark(record, "after_destroy")
}

/// Declarations shared by every application entity.
pub fn application_callbacks() -> CallbackSet {
    CallbackSet::new()
        .define("audit", audit)
        .on(Hook::BeforeSave, "audit")
}

fn widgets() -> Result<Arc<EntityType>, CoreError> {
    EntityType::builder("Widget")
        .inherit(&application_callbacks())
        .primary_key(PrimaryKey::single("id"))
        .field("id")
        .field("name")
        .field("trail")
        .define("before_validate", before_validate)
        .define("reject_banned", reject_banned)
        .define("after_validate", after_validate)
        .define("before_save", before_save)
        .define("after_save", after_save)
        .define("before_create", before_create)
        .define("after_create", after_create)
        .define("before_update", before_update)
        .define("after_update", after_update)
        .define("before_destroy", before_destroy)
        .define("after_destroy", after_destroy)
        .on(Hook::BeforeValidate, "before_validate")
        .on(Hook::Validate, "reject_banned")
        .on(Hook::AfterValidate, "after_validate")
        .on(Hook::BeforeSave, "before_save")
        .on(Hook::BeforeSave, "audit")
        .on_with(Hook::AfterSave, "after_save", Applicability::except([Action::UpdateColumn]))
        .on(Hook::BeforeCreate, "before_create")
        .on(Hook::AfterCreate, "after_create")
        .on(Hook::BeforeUpdate, "before_update")
        .on(Hook::AfterUpdate, "after_update")
        .on(Hook::BeforeDestroy, "before_destroy")
        .on(Hook::AfterDestroy, "after_destroy")
        .skip_with(Hook::BeforeSave, "audit", Applicability::only([Action::Update]))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_types_resolve() {
        let types = Fixtures::build().unwrap();
        // SQLite matches table names case-insensitively.
        assert_eq!(types.orders.table(), "Orders");
        assert_eq!(types.orders.name(), "Order");
        assert_eq!(types.memberships.table(), "Memberships");
        assert_eq!(types.event_logs.table(), "event_logs");

        let names: Vec<&str> = types
            .widgets
            .callbacks()
            .resolved(Hook::BeforeSave)
            .iter()
            .map(|callback| callback.name())
            .collect();
        assert_eq!(names, vec!["audit", "before_save"]);
    }
}
