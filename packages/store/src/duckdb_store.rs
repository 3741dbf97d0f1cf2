//! `DuckDB`-backed document store.
//!
//! Every collection lives in one `documents` table keyed by
//! `(collection, id)`. Bodies are stored as JSON text and `seq` preserves
//! insertion order.

use std::collections::BTreeSet;
use std::path::Path;

use duckdb::Connection;

use crate::{
    CommitResult, Document, DocumentStore, StoreError, WriteMode, assign_id, paths, plan_batch,
};

/// Number of rows per INSERT statement.
const CHUNK_SIZE: usize = 1_000;

/// Number of ids per existence lookup.
const LOOKUP_CHUNK_SIZE: usize = 1_000;

/// A [`DocumentStore`] over a single `DuckDB` connection.
pub struct DuckDbStore {
    conn: Connection,
}

impl DuckDbStore {
    /// Opens (or creates) the store file at `path` and ensures the schema
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the file cannot be opened, or
    /// [`StoreError`] if schema creation fails.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            paths::ensure_dir(parent)?;
        }

        let conn = Connection::open(path).map_err(|e| StoreError::Unavailable {
            message: format!("cannot open {}: {e}", path.display()),
        })?;
        log::debug!("Opened document store at {}", path.display());

        Self::from_connection(conn)
    }

    /// Opens a transient in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the connection or schema creation fails.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Unavailable {
            message: format!("cannot open in-memory database: {e}"),
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        create_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Returns the ids among `ids` already stored in `collection`.
    fn existing_ids(&self, collection: &str, ids: &[String]) -> Result<BTreeSet<String>, StoreError> {
        let mut found = BTreeSet::new();

        for chunk in ids.chunks(LOOKUP_CHUNK_SIZE) {
            let placeholders: String = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            let sql = format!(
                "SELECT id FROM documents WHERE collection = ? AND id IN ({placeholders})"
            );
            let mut stmt = self.conn.prepare(&sql)?;

            stmt.raw_bind_parameter(1, collection)?;
            for (i, id) in chunk.iter().enumerate() {
                stmt.raw_bind_parameter(i + 2, id)?;
            }

            stmt.raw_execute()?;
            let mut rows = stmt.raw_query();
            while let Some(row) = rows.next()? {
                let id: String = row.get(0)?;
                found.insert(id);
            }
        }

        Ok(found)
    }

    /// Writes pre-validated documents inside one transaction.
    fn insert_rows(&self, collection: &str, rows: &[(String, String)]) -> Result<u64, StoreError> {
        self.conn.execute_batch("BEGIN TRANSACTION;")?;

        match self.insert_chunks(collection, rows) {
            Ok(total) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(total)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK;") {
                    log::error!("Rollback failed after insert error: {rollback}");
                }
                Err(e)
            }
        }
    }

    fn insert_chunks(&self, collection: &str, rows: &[(String, String)]) -> Result<u64, StoreError> {
        let mut total = 0u64;

        for chunk in rows.chunks(CHUNK_SIZE) {
            let mut sql = String::from("INSERT INTO documents (collection, id, seq, body) VALUES ");
            for i in 0..chunk.len() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str("(?, ?, nextval('document_seq'), ?)");
            }

            let mut stmt = self.conn.prepare(&sql)?;
            let mut param_idx = 1usize;

            for (id, body) in chunk {
                stmt.raw_bind_parameter(param_idx, collection)?;
                stmt.raw_bind_parameter(param_idx + 1, id)?;
                stmt.raw_bind_parameter(param_idx + 2, body)?;
                param_idx += 3;
            }

            let inserted = stmt.raw_execute()?;
            total += u64::try_from(inserted).unwrap_or(0);
        }

        Ok(total)
    }
}

fn create_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE SEQUENCE IF NOT EXISTS document_seq;

        CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            seq BIGINT NOT NULL,
            body TEXT NOT NULL,
            PRIMARY KEY (collection, id)
        );",
    )?;
    Ok(())
}

fn parse_body(collection: &str, body: &str) -> Result<Document, StoreError> {
    match serde_json::from_str(body)? {
        serde_json::Value::Object(doc) => Ok(doc),
        other => Err(StoreError::Malformed {
            collection: collection.to_string(),
            message: format!("expected an object, found {other}"),
        }),
    }
}

impl DocumentStore for DuckDbStore {
    fn insert_many(
        &self,
        collection: &str,
        mut documents: Vec<Document>,
        mode: WriteMode,
    ) -> Result<CommitResult, StoreError> {
        let attempted = documents.len();
        if attempted == 0 {
            return Ok(CommitResult::default());
        }

        let ids: Vec<String> = documents.iter_mut().map(assign_id).collect();
        let existing = self.existing_ids(collection, &ids)?;
        let mut batch_ids = BTreeSet::new();

        let (accepted, failures) = plan_batch(&ids, mode, |_, id| {
            if existing.contains(id) {
                Some(format!("duplicate key: {id} already exists in {collection}"))
            } else if !batch_ids.insert(id.to_string()) {
                Some(format!("duplicate key: {id} repeated within batch"))
            } else {
                None
            }
        });

        let rows = accepted
            .iter()
            .map(|&i| Ok((ids[i].clone(), serde_json::to_string(&documents[i])?)))
            .collect::<Result<Vec<_>, StoreError>>()?;

        let inserted = self.insert_rows(collection, &rows)?;
        if inserted != rows.len() as u64 {
            log::warn!(
                "{collection}: expected to insert {} documents, DuckDB reported {inserted}",
                rows.len()
            );
        }

        Ok(CommitResult {
            attempted,
            committed: rows.len(),
            last_id: accepted.last().map(|&i| ids[i].clone()),
            failures,
        })
    }

    fn upsert(&self, collection: &str, key: &str, document: Document) -> Result<(), StoreError> {
        let body = serde_json::to_string(&document)?;
        self.conn.execute(
            "INSERT INTO documents (collection, id, seq, body)
             VALUES (?, ?, nextval('document_seq'), ?)
             ON CONFLICT (collection, id) DO UPDATE SET body = EXCLUDED.body",
            duckdb::params![collection, key, body],
        )?;
        Ok(())
    }

    fn find_one(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM documents WHERE collection = ? AND id = ?")?;
        let result = stmt.query_row([collection, key], |row| row.get::<_, String>(0));
        match result {
            Ok(body) => parse_body(collection, &body).map(Some),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::DuckDb(e)),
        }
    }

    fn delete_one(&self, collection: &str, key: &str) -> Result<bool, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM documents WHERE collection = ? AND id = ?", [collection, key])?;
        Ok(removed > 0)
    }

    fn find_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM documents WHERE collection = ? ORDER BY seq")?;
        let bodies = stmt
            .query_map([collection], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|body| parse_body(collection, body))
            .collect()
    }

    fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT COUNT(*) FROM documents WHERE collection = ?")?;
        let count: i64 = stmt.query_row([collection], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn drop_collection(&self, collection: &str) -> Result<u64, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM documents WHERE collection = ?", [collection])?;
        log::info!("Dropped {removed} documents from {collection}");
        Ok(u64::try_from(removed).unwrap_or(0))
    }
}
