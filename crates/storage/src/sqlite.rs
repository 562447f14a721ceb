use std::path::Path;

use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{Connection, ToSql};
use tracing::debug;

use rowforge_core::{Params, Row, Value};

use crate::error::StorageError;
use crate::traits::Database;

/// Adapts a `Value` to rusqlite's binding. Booleans bind as INTEGER 0/1,
/// UUIDs as 16-byte blobs and arrays as MessagePack blobs.
struct Bind<'a>(&'a Value);

impl ToSql for Bind<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let output = match self.0 {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(n) => ToSqlOutput::Owned(SqlValue::Integer(*n)),
            Value::Real(x) => ToSqlOutput::Owned(SqlValue::Real(*x)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Boolean(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Blob(bytes) => ToSqlOutput::Borrowed(ValueRef::Blob(bytes)),
            Value::Uuid(id) => ToSqlOutput::Borrowed(ValueRef::Blob(id.as_bytes())),
            Value::Array(_) => {
                let bytes = self
                    .0
                    .to_msgpack()
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                ToSqlOutput::Owned(SqlValue::Blob(bytes))
            }
        };
        Ok(output)
    }
}

fn read_value(value: ValueRef<'_>) -> Result<Value, StorageError> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Integer(n),
        ValueRef::Real(x) => Value::Real(x),
        ValueRef::Text(bytes) => Value::Text(
            std::str::from_utf8(bytes)
                .map_err(|e| StorageError::Serialization(e.to_string()))?
                .to_string(),
        ),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    })
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::configure(&conn, true)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::configure(&conn, false)?;
        Ok(Self { conn })
    }

    /// Runs a batch of semicolon-separated statements without parameters,
    /// typically DDL for an existing schema.
    pub fn execute_script(&self, sql: &str) -> Result<(), StorageError> {
        debug!(len = sql.len(), "execute script");
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn query(&self, sql: &str, params: &Params, limit: Option<usize>) -> Result<Vec<Row>, StorageError> {
        debug!(sql, params = params.len(), "query");
        let binds: Vec<(&str, Bind<'_>)> = params
            .iter()
            .map(|(name, value)| (name.as_str(), Bind(value)))
            .collect();
        let named: Vec<(&str, &dyn ToSql)> = binds
            .iter()
            .map(|(name, bind)| (*name, bind as &dyn ToSql))
            .collect();

        let mut stmt = self.conn.prepare_cached(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let mut rows = stmt.query(named.as_slice())?;

        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut out = Row::new();
            for (index, column) in columns.iter().enumerate() {
                out.push(column.as_str(), read_value(row.get_ref(index)?)?);
            }
            result.push(out);
            if limit.is_some_and(|limit| result.len() >= limit) {
                break;
            }
        }
        Ok(result)
    }
}

impl Database for SqliteStorage {
    fn execute(&mut self, sql: &str, params: &Params) -> Result<usize, StorageError> {
        debug!(sql, params = params.len(), "execute");
        let binds: Vec<(&str, Bind<'_>)> = params
            .iter()
            .map(|(name, value)| (name.as_str(), Bind(value)))
            .collect();
        let named: Vec<(&str, &dyn ToSql)> = binds
            .iter()
            .map(|(name, bind)| (*name, bind as &dyn ToSql))
            .collect();

        let mut stmt = self.conn.prepare_cached(sql)?;
        Ok(stmt.execute(named.as_slice())?)
    }

    fn fetch_one(&self, sql: &str, params: &Params) -> Result<Option<Row>, StorageError> {
        Ok(self.query(sql, params, Some(1))?.into_iter().next())
    }

    fn fetch_all(&self, sql: &str, params: &Params) -> Result<Vec<Row>, StorageError> {
        self.query(sql, params, None)
    }

    fn last_insert_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    fn begin(&mut self) -> Result<(), StorageError> {
        if self.in_transaction() {
            return Err(StorageError::Transaction("a transaction is already open".into()));
        }
        debug!("begin");
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        if !self.in_transaction() {
            return Err(StorageError::Transaction("no open transaction to commit".into()));
        }
        debug!("commit");
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        if !self.in_transaction() {
            return Err(StorageError::Transaction("no open transaction to roll back".into()));
        }
        debug!("rollback");
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("path", &self.conn.path())
            .finish_non_exhaustive()
    }
}
