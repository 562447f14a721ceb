use rowforge_core::{Params, Row};

use crate::error::StorageError;

/// The relational database the persistence engine runs against.
///
/// Every statement binds its values through named placeholders; the names in
/// `params` include the leading `:` and must all occur in `sql`.
pub trait Database {
    /// Runs a statement and returns the number of rows it changed.
    fn execute(&mut self, sql: &str, params: &Params) -> Result<usize, StorageError>;

    fn fetch_one(&self, sql: &str, params: &Params) -> Result<Option<Row>, StorageError>;

    fn fetch_all(&self, sql: &str, params: &Params) -> Result<Vec<Row>, StorageError>;

    /// Identity generated by the most recent successful insert.
    fn last_insert_id(&self) -> i64;

    fn begin(&mut self) -> Result<(), StorageError>;

    fn commit(&mut self) -> Result<(), StorageError>;

    fn rollback(&mut self) -> Result<(), StorageError>;

    fn in_transaction(&self) -> bool;
}
