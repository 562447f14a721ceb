pub mod bulk;
pub mod config;
pub mod error;
pub mod finder;
pub mod reload;
mod validator;

pub use bulk::{BulkOptions, OnDuplicate};
pub use config::EngineConfig;
pub use error::EngineError;
pub use finder::Query;

use std::sync::Arc;

use rowforge_core::query::{build_set, build_values, build_where};
use rowforge_core::{Action, Criterion, Hook, Record, Value};
use rowforge_storage::{Database, SqliteStorage};
use tracing::{debug, info, warn};

/// Runs record persistence against a database.
///
/// Entity types and records carry no connection of their own; every
/// operation borrows the engine's storage for its duration.
pub struct Engine<D: Database = SqliteStorage> {
    storage: D,
    config: EngineConfig,
}

impl<D: Database> Engine<D> {
    pub fn new(storage: D) -> Self {
        Self::with_config(storage, EngineConfig::default())
    }

    pub fn with_config(storage: D, config: EngineConfig) -> Self {
        Self { storage, config }
    }

    pub fn storage(&self) -> &D {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut D {
        &mut self.storage
    }

    pub fn into_storage(self) -> D {
        self.storage
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether a stored row matches the record. Probes with every assigned
    /// attribute plus the primary-key columns; a positive answer is cached
    /// on the record, a negative one is asked again next time.
    pub fn record_exists(&self, record: &mut Record) -> Result<bool, EngineError> {
        if record.exists() {
            return Ok(true);
        }
        if record.persisted_assignments().is_empty() {
            return Ok(false);
        }
        let filter = build_where(&record.identity_filters(), &[]);
        let sql = format!("SELECT 1 FROM {} {} LIMIT 1", record.entity().table(), filter.sql());
        let found = self.storage.fetch_one(&sql, filter.params())?.is_some();
        if found {
            record.confirm_exists();
        }
        Ok(found)
    }

    /// Inserts or updates the record. Returns `Ok(false)` when validation
    /// rejected it; the messages are on `record.errors()`.
    pub fn save(&mut self, record: &mut Record) -> Result<bool, EngineError> {
        record.clear_errors();
        let exists = self.record_exists(record)?;
        let (action, columns) = if exists {
            (Action::Update, record.dirty_columns())
        } else {
            (Action::Create, record.entity().validated_columns())
        };
        if exists && columns.is_empty() {
            debug!(table = record.entity().table(), "nothing to save");
            return Ok(true);
        }

        if !self.run_validation(record, &columns, action)? {
            return Ok(false);
        }
        self.run_hook(Hook::BeforeSave, action, record)?;
        if exists {
            self.run_hook(Hook::BeforeUpdate, action, record)?;
            self.update_row(record)?;
            self.reload_with(record, false)?;
            self.run_hook(Hook::AfterUpdate, action, record)?;
        } else {
            self.run_hook(Hook::BeforeCreate, action, record)?;
            self.insert_row(record)?;
            self.reload_with(record, true)?;
            self.run_hook(Hook::AfterCreate, action, record)?;
        }
        self.run_hook(Hook::AfterSave, action, record)?;
        Ok(true)
    }

    /// Writes a single column of an existing record. Assigning the value the
    /// row already holds succeeds without a write.
    pub fn update_column(
        &mut self,
        record: &mut Record,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<bool, EngineError> {
        record.clear_errors();
        record.entity().require_persisted(column)?;
        let value = value.into();
        if !self.record_exists(record)? {
            let message = format!("{} record does not exist.", record.entity().name());
            record.add_error(message);
            return Ok(false);
        }
        let unchanged = record.attributes().old_value(column) == Some(&value);
        record.assign_attribute(column, value)?;
        if unchanged {
            debug!(table = record.entity().table(), column, "column unchanged");
            return Ok(true);
        }

        let action = Action::UpdateColumn;
        if !self.run_validation(record, &[column.to_string()], action)? {
            return Ok(false);
        }
        self.run_hook(Hook::BeforeSave, action, record)?;
        self.run_hook(Hook::BeforeUpdate, action, record)?;

        let written = record.value(column).clone();
        let set = build_set(&[(column.to_string(), written.clone())]);
        let located = record.snapshot_filters();
        let filter = build_where(&located, &[]);
        if filter.is_empty() {
            return Err(EngineError::UnboundedStatement {
                entity: record.entity().name().to_string(),
                operation: "update",
            });
        }
        let statement = set.join(filter)?;
        let table = record.entity().table().to_string();
        let changed = self
            .storage
            .execute(&format!("UPDATE {table} {}", statement.sql()), statement.params())?;
        info!(table = table.as_str(), column, changed, "update column");

        // Other pending attributes were not written, so the row is found by
        // its snapshot with only this column moved.
        let located: Vec<(String, Criterion)> = located
            .into_iter()
            .map(|(name, criterion)| {
                if name == column {
                    (name, Criterion::Is(written.clone()))
                } else {
                    (name, criterion)
                }
            })
            .collect();
        self.reload_by(record, &located)?;
        self.run_hook(Hook::AfterUpdate, action, record)?;
        self.run_hook(Hook::AfterSave, action, record)?;
        Ok(true)
    }

    /// Deletes the stored row matching every assigned attribute. Returns
    /// `Ok(false)` with an error message when no such row exists.
    pub fn destroy(&mut self, record: &mut Record) -> Result<bool, EngineError> {
        record.clear_errors();
        if !self.record_exists(record)? {
            let message = format!("{} record does not exist.", record.entity().name());
            record.add_error(message);
            return Ok(false);
        }
        // The row is located by the attributes it was confirmed with, before
        // any callback reassigns them.
        let filter = build_where(&record.content_filters(), &[]);
        let action = Action::Destroy;
        self.run_hook(Hook::BeforeDestroy, action, record)?;

        if filter.is_empty() {
            return Err(EngineError::UnboundedStatement {
                entity: record.entity().name().to_string(),
                operation: "delete",
            });
        }
        let table = record.entity().table().to_string();
        let changed = self
            .storage
            .execute(&format!("DELETE FROM {table} {}", filter.sql()), filter.params())?;
        info!(table = table.as_str(), changed, "delete");

        self.run_hook(Hook::AfterDestroy, action, record)?;
        Ok(true)
    }

    /// Runs `f` inside a transaction, committing on `Ok` and rolling back
    /// on `Err`.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut Self) -> Result<T, EngineError>,
    {
        self.storage.begin()?;
        match f(self) {
            Ok(value) => {
                self.storage.commit()?;
                Ok(value)
            }
            Err(err) => {
                match self.storage.rollback() {
                    Ok(()) => warn!(error = %err, "transaction rolled back"),
                    Err(rollback) => warn!(error = %err, %rollback, "rollback failed"),
                }
                Err(err)
            }
        }
    }

    /// Like `transaction`, but joins a transaction that is already open.
    pub(crate) fn atomically<T, F>(&mut self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut Self) -> Result<T, EngineError>,
    {
        if self.storage.in_transaction() {
            f(self)
        } else {
            self.transaction(f)
        }
    }

    fn insert_row(&mut self, record: &Record) -> Result<(), EngineError> {
        let table = record.entity().table();
        let values = build_values(&record.persisted_assignments());
        let sql = if values.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES")
        } else {
            format!("INSERT INTO {table} {}", values.sql())
        };
        self.storage.execute(&sql, values.params())?;
        info!(table, id = self.storage.last_insert_id(), "insert");
        Ok(())
    }

    fn update_row(&mut self, record: &Record) -> Result<(), EngineError> {
        let set = build_set(&record.dirty_assignments());
        if set.is_empty() {
            return Ok(());
        }
        let filter = build_where(&record.snapshot_filters(), &[]);
        if filter.is_empty() {
            return Err(EngineError::UnboundedStatement {
                entity: record.entity().name().to_string(),
                operation: "update",
            });
        }
        let statement = set.join(filter)?;
        let table = record.entity().table();
        let changed = self
            .storage
            .execute(&format!("UPDATE {table} {}", statement.sql()), statement.params())?;
        info!(table, changed, "update");
        Ok(())
    }

    fn run_hook(&self, hook: Hook, action: Action, record: &mut Record) -> Result<(), EngineError> {
        let entity = Arc::clone(record.entity());
        let report = entity.callbacks().run(hook, action, record)?;
        for name in &report.suppressed {
            debug!(entity = entity.name(), %hook, callback = name.as_str(), "callback skipped");
        }
        Ok(())
    }
}
