use std::path::PathBuf;

use rowforge_core::{Params, Value};
use rowforge_engine::{Engine, EngineError};
use rowforge_storage::{Database, SqliteStorage};
use tempfile::TempDir;

use crate::fixtures::{Fixtures, SCHEMA_SQL};

/// An engine over a database holding the fixture schema, plus the fixture
/// entity types.
pub struct TestDb {
    pub engine: Engine,
    pub types: Fixtures,
    dir: Option<TempDir>,
}

impl TestDb {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        crate::init_tracing();
        let storage = SqliteStorage::open_in_memory()?;
        Self::with_storage(storage, None)
    }

    /// A file-backed database in a temporary directory removed on drop.
    pub fn on_disk() -> Result<Self, Box<dyn std::error::Error>> {
        crate::init_tracing();
        let dir = tempfile::tempdir()?;
        let storage = SqliteStorage::open(dir.path().join("rowforge.db"))?;
        Self::with_storage(storage, Some(dir))
    }

    fn with_storage(storage: SqliteStorage, dir: Option<TempDir>) -> Result<Self, Box<dyn std::error::Error>> {
        storage.execute_script(SCHEMA_SQL)?;
        Ok(Self {
            engine: Engine::new(storage),
            types: Fixtures::build()?,
            dir,
        })
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.path().join("rowforge.db"))
    }

    pub fn count(&self, table: &str) -> Result<i64, EngineError> {
        let row = self
            .engine
            .storage()
            .fetch_one(&format!("SELECT COUNT(*) AS n FROM {table}"), &Params::new())?;
        Ok(row.and_then(|row| row.get("n").and_then(Value::as_integer)).unwrap_or(0))
    }

    /// Every row of a raw query, as column/value pairs.
    pub fn select(&self, sql: &str) -> Result<Vec<Vec<(String, Value)>>, EngineError> {
        let rows = self.engine.storage().fetch_all(sql, &Params::new())?;
        Ok(rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(column, value)| (column.to_string(), value.clone()))
                    .collect()
            })
            .collect())
    }

    /// Runs a parameterless statement directly against storage.
    pub fn execute(&mut self, sql: &str) -> Result<usize, EngineError> {
        Ok(self.engine.storage_mut().execute(sql, &Params::new())?)
    }
}
