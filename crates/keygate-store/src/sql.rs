//! Relational storage on `SQLite`.
//!
//! One table per collection with `(position, id, body)` columns. A save
//! replaces the table's rows inside a single transaction.

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::schema::{sql_schema, Collection};
use crate::{ensure_unique_ids, CredentialStore, Document, StoreBackend};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed credential store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database file.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the database cannot be opened or
    /// the schema cannot be created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(&sql_schema())?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CredentialStore for SqliteStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Sql
    }

    fn load(&self, collection: Collection) -> Result<Vec<Document>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, body FROM {} ORDER BY position",
            collection.name()
        ))?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (id, body) = row?;
            documents.push(Document {
                id,
                body: serde_json::from_str(&body)?,
            });
        }
        Ok(documents)
    }

    fn save(&self, collection: Collection, snapshot: &[Document]) -> Result<()> {
        ensure_unique_ids(collection, snapshot)?;

        let rows = snapshot
            .iter()
            .map(|doc| Ok((doc.id.as_str(), serde_json::to_string(&doc.body)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(&format!("DELETE FROM {}", collection.name()), [])?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} (position, id, body) VALUES (?1, ?2, ?3)",
                collection.name()
            ))?;
            for (position, (id, body)) in (0_i64..).zip(rows.iter()) {
                insert.execute(params![position, id, body])?;
            }
        }
        tx.commit()?;

        tracing::debug!(
            collection = %collection,
            count = snapshot.len(),
            "Saved snapshot to SQL"
        );

        Ok(())
    }
}
