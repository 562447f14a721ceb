use rusqlite::Connection;

use crate::error::StorageError;

const SHARED_PRAGMAS: &str = "
    PRAGMA foreign_keys = ON;
    PRAGMA busy_timeout = 5000;
";

const FILE_PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA cache_size = -32000;
";

/// Applies connection pragmas. Journal and sync settings only apply to
/// file-backed databases.
pub fn configure(conn: &Connection, file_backed: bool) -> Result<(), StorageError> {
    if file_backed {
        conn.execute_batch(FILE_PRAGMAS)?;
    }
    conn.execute_batch(SHARED_PRAGMAS)?;
    Ok(())
}
