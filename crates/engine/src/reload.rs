use rowforge_core::query::build_where;
use rowforge_core::{CoreError, Criterion, PrimaryKey, Record, Value};
use rowforge_storage::Database;
use tracing::debug;

use crate::{Engine, EngineError};

impl<D: Database> Engine<D> {
    /// Re-reads the record's canonical row and makes it the persisted state.
    pub fn reload(&self, record: &mut Record) -> Result<(), EngineError> {
        self.reload_with(record, false)
    }

    /// `after_insert` allows a single-column key with no value to be
    /// located through the last inserted identity.
    pub(crate) fn reload_with(&self, record: &mut Record, after_insert: bool) -> Result<(), EngineError> {
        let filters = self.identity_for_reload(record, after_insert);
        self.reload_by(record, &filters)
    }

    /// Reloads from the single row matching `filters`.
    pub(crate) fn reload_by(&self, record: &mut Record, filters: &[(String, Criterion)]) -> Result<(), EngineError> {
        let entity = record.entity().clone();
        let filter = build_where(filters, &[]);
        if filter.is_empty() {
            return Err(EngineError::UnboundedStatement {
                entity: entity.name().to_string(),
                operation: "reload",
            });
        }

        let columns: Vec<&str> = entity.persisted_columns().collect();
        if columns.is_empty() {
            return Err(CoreError::NoValidColumns.into());
        }
        let sql = format!(
            "SELECT {} FROM {} {} LIMIT 2",
            columns.join(", "),
            entity.table(),
            filter.sql()
        );
        let mut rows = self.storage().fetch_all(&sql, filter.params())?;
        if rows.len() != 1 {
            return Err(EngineError::ReloadAmbiguous {
                entity: entity.name().to_string(),
                matches: rows.len(),
            });
        }
        let row = rows.remove(0);
        record.refresh_from_row(&row)?;
        debug!(table = entity.table(), "reloaded");
        Ok(())
    }

    fn identity_for_reload(&self, record: &Record, after_insert: bool) -> Vec<(String, Criterion)> {
        let populated = |column: &String| {
            record
                .get(column)
                .filter(|value| !value.is_null())
                .map(|value| (column.clone(), Criterion::Is(value.clone())))
        };
        match record.entity().primary_key() {
            PrimaryKey::None => record.content_filters(),
            PrimaryKey::Single(column) => {
                if let Some(filter) = populated(column) {
                    vec![filter]
                } else if after_insert {
                    let id = self.storage().last_insert_id();
                    vec![(column.clone(), Criterion::Is(Value::Integer(id)))]
                } else {
                    record.content_filters()
                }
            }
            PrimaryKey::Composite(columns) => {
                let known: Vec<_> = columns.iter().filter_map(populated).collect();
                if known.is_empty() {
                    record.content_filters()
                } else {
                    known
                }
            }
        }
    }
}
