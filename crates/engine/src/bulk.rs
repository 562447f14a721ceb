use rowforge_core::query::{build_batch_set, build_batch_where, build_values_batch};
use rowforge_core::{EntityType, Value};
use rowforge_storage::Database;
use tracing::{info, warn};

use crate::{Engine, EngineError};

/// What `insert_all` does with a row whose unique key is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnDuplicate {
    /// Keep the stored row.
    #[default]
    Ignore,
    /// Overwrite the stored row's non-key columns.
    Update,
}

#[derive(Debug, Clone, Default)]
pub struct BulkOptions {
    /// Identity columns; the primary key when empty.
    pub unique_by: Vec<String>,
    pub batch_size: Option<usize>,
    pub on_duplicate: OnDuplicate,
}

impl BulkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unique_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn on_duplicate(mut self, on_duplicate: OnDuplicate) -> Self {
        self.on_duplicate = on_duplicate;
        self
    }
}

fn identity_columns(entity: &EntityType, options: &BulkOptions) -> Result<Vec<String>, EngineError> {
    let columns = if options.unique_by.is_empty() {
        entity.primary_key().columns().to_vec()
    } else {
        options.unique_by.clone()
    };
    for column in &columns {
        entity.require_persisted(column)?;
    }
    Ok(columns)
}

fn check_columns(entity: &EntityType, rows: &[Vec<(String, Value)>]) -> Result<(), EngineError> {
    for row in rows {
        for (column, _) in row {
            entity.require_persisted(column)?;
        }
    }
    Ok(())
}

impl<D: Database> Engine<D> {
    /// Inserts `rows` in batches of one multi-row statement each. No
    /// validation or callbacks run. Returns the number of rows written.
    pub fn insert_all(
        &mut self,
        entity: &EntityType,
        rows: &[Vec<(String, Value)>],
        options: &BulkOptions,
    ) -> Result<usize, EngineError> {
        if rows.is_empty() {
            return Ok(0);
        }
        check_columns(entity, rows)?;
        let keys = identity_columns(entity, options)?;
        if options.on_duplicate == OnDuplicate::Update && keys.is_empty() {
            return Err(EngineError::InvalidBulk(format!(
                "{} has no primary key; updating duplicates needs unique_by",
                entity.name()
            )));
        }

        let batch_size = self.config().batch_size(options.batch_size);
        let table = entity.table();
        self.atomically(|engine| {
            let mut written = 0;
            for chunk in rows.chunks(batch_size) {
                let (values, columns) = build_values_batch(chunk)?;
                let sql = match options.on_duplicate {
                    OnDuplicate::Ignore => format!("INSERT OR IGNORE INTO {table} {}", values.sql()),
                    OnDuplicate::Update => {
                        let updates: Vec<String> = columns
                            .iter()
                            .filter(|column| !keys.contains(column))
                            .map(|column| format!("{column} = excluded.{column}"))
                            .collect();
                        let action = if updates.is_empty() {
                            "DO NOTHING".to_string()
                        } else {
                            format!("DO UPDATE SET {}", updates.join(", "))
                        };
                        format!(
                            "INSERT INTO {table} {} ON CONFLICT ({}) {action}",
                            values.sql(),
                            keys.join(", ")
                        )
                    }
                };
                written += engine.storage_mut().execute(&sql, values.params())?;
            }
            info!(table, rows = rows.len(), written, "insert all");
            Ok(written)
        })
    }

    /// Updates stored rows identified by `unique_by` (or the primary key),
    /// one `CASE`-keyed statement per batch. A batch with nothing to set is
    /// skipped. Returns the number of rows changed.
    pub fn update_all(
        &mut self,
        entity: &EntityType,
        rows: &[Vec<(String, Value)>],
        options: &BulkOptions,
    ) -> Result<usize, EngineError> {
        if rows.is_empty() {
            return Ok(0);
        }
        check_columns(entity, rows)?;
        let keys = identity_columns(entity, options)?;
        if keys.is_empty() {
            return Err(EngineError::InvalidBulk(format!(
                "{} has no primary key; update_all needs unique_by",
                entity.name()
            )));
        }

        let batch_size = self.config().batch_size(options.batch_size);
        let table = entity.table();
        self.atomically(|engine| {
            let mut changed = 0;
            for (index, chunk) in rows.chunks(batch_size).enumerate() {
                let batch = build_batch_set(chunk, &keys)?;
                let filter = build_batch_where(&batch.keys)?;
                if batch.fragment.is_empty() || filter.is_empty() {
                    warn!(table, batch = index, "skipping batch with nothing to update");
                    continue;
                }
                let statement = batch.fragment.join(filter)?;
                let sql = format!("UPDATE {table} {}", statement.sql());
                changed += engine.storage_mut().execute(&sql, statement.params())?;
            }
            info!(table, rows = rows.len(), changed, "update all");
            Ok(changed)
        })
    }
}
