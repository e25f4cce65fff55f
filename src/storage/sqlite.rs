//! SQLite storage implementation

use std::path::Path;
use rusqlite::Connection;
use crate::{Result, Error};
use super::schema;

/// Options controlling how an on-disk database is opened
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    /// Create the file (and the schema) when it does not exist yet
    pub create_as_needed: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self { create_as_needed: true }
    }
}

/// SQLite-backed database holding projects, steps and results.
///
/// Owns the single connection. Every mutation should run inside
/// [`Database::unit_of_work`] so that it commits or rolls back as a whole.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, OpenOptions::default())
    }

    /// Open a database file with explicit options
    pub fn open_with(path: &Path, options: OpenOptions) -> Result<Self> {
        if path.exists() {
            if !path.is_file() {
                return Err(Error::InvalidDatabasePath(format!(
                    "'{}' exists and is not a file",
                    path.display()
                )));
            }
        } else if !options.create_as_needed {
            return Err(Error::DatabaseMissing(path.display().to_string()));
        }

        tracing::debug!("Opening database at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // Foreign keys are off by default in SQLite; cascades depend on them
        conn.execute_batch(schema::PRAGMAS)?;
        let db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        tracing::debug!("Schema ready ({} tables)", schema::TABLES.len());
        Ok(())
    }

    /// Borrow the connection for read-only access
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run `work` inside a transaction.
    ///
    /// Commits when `work` returns `Ok`; rolls back every effect of the
    /// unit when it returns `Err`, and hands that error back to the caller.
    pub fn unit_of_work<T, F>(&mut self, work: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let tx = self.conn.transaction()?;
        match work(&*tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                tracing::warn!("Rolling back unit of work: {}", e);
                if let Err(rollback_err) = tx.rollback() {
                    tracing::error!("Rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Count the rows of one schema table
    pub fn count_rows(&self, table: &str) -> Result<usize> {
        if !schema::TABLES.contains(&table) {
            return Err(Error::NotFound(format!("table '{}'", table)));
        }
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let mut tables = Vec::with_capacity(schema::TABLES.len());
        for table in schema::TABLES {
            tables.push((table.to_string(), self.count_rows(table)?));
        }
        Ok(DbStats { tables })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub tables: Vec<(String, usize)>,
}

impl DbStats {
    pub fn rows(&self, table: &str) -> Option<usize> {
        self.tables.iter().find(|(name, _)| name == table).map(|(_, n)| *n)
    }
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        for (table, rows) in &self.tables {
            writeln!(f, "  {}: {}", table, rows)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert_project(conn: &Connection, name: &str) -> Result<()> {
        conn.execute("INSERT INTO projects (name) VALUES (?1)", [name])?;
        Ok(())
    }

    #[test]
    fn test_schema_created() {
        let db = Database::open_in_memory().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.tables.len(), schema::TABLES.len());
        assert_eq!(stats.rows("results"), Some(0));
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let db = Database::open_in_memory().unwrap();
        let enabled: i64 = db
            .connection()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);

        let orphan = db.connection().execute(
            "INSERT INTO processing_steps (kind, project_id) VALUES ('RHF', 999)",
            [],
        );
        assert!(orphan.is_err());
    }

    #[test]
    fn test_unit_of_work_commits() {
        let mut db = Database::open_in_memory().unwrap();
        db.unit_of_work(|conn| insert_project(conn, "Dummy")).unwrap();
        assert_eq!(db.count_rows("projects").unwrap(), 1);
    }

    #[test]
    fn test_unit_of_work_rolls_back() {
        let mut db = Database::open_in_memory().unwrap();
        let outcome: Result<()> = db.unit_of_work(|conn| {
            insert_project(conn, "Dummy")?;
            Err(Error::NotFound("forced".into()))
        });
        assert!(matches!(outcome, Err(Error::NotFound(_))));
        assert_eq!(db.count_rows("projects").unwrap(), 0);
    }

    #[test]
    fn test_open_missing_without_create() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.sqlite");
        let err = Database::open_with(&path, OpenOptions { create_as_needed: false });
        assert!(matches!(err, Err(Error::DatabaseMissing(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_open_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = Database::open(dir.path());
        assert!(matches!(err, Err(Error::InvalidDatabasePath(_))));
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.sqlite");
        {
            let mut db = Database::open(&path).unwrap();
            db.unit_of_work(|conn| insert_project(conn, "Persisted")).unwrap();
        }
        let db = Database::open_with(&path, OpenOptions { create_as_needed: false }).unwrap();
        assert_eq!(db.count_rows("projects").unwrap(), 1);
    }

    #[test]
    fn test_count_unknown_table() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.count_rows("symbols"), Err(Error::NotFound(_))));
    }
}
