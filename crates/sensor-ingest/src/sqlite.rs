// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite document store
//!
//! Each collection is a table holding one JSON document per row.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE <collection> (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     ts REAL NOT NULL,
//!     doc TEXT NOT NULL
//! );
//! CREATE INDEX idx_<collection>_ts ON <collection>(ts);
//! ```

use crate::error::SinkError;
use crate::record::NormalizedRecord;
use crate::sink::{validate_collection, DocumentSink};
use rusqlite::{params, params_from_iter, Connection};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

struct Inner {
    conn: Connection,
    /// Collections whose table already exists.
    known: HashSet<String>,
}

/// SQLite-backed [`DocumentSink`].
///
/// Thread-safe via internal Mutex (SQLite Connection is not Sync). A bulk
/// insert runs in one transaction, so a batch is stored entirely or not at
/// all.
pub struct SqliteDocumentStore {
    inner: Mutex<Inner>,
}

impl SqliteDocumentStore {
    /// Open (or create) a file-based store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        Ok(Self::with_connection(Connection::open(path.as_ref())?))
    }

    /// Create an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self, SinkError> {
        Ok(Self::with_connection(Connection::open_in_memory()?))
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            inner: Mutex::new(Inner {
                conn,
                known: HashSet::new(),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, SinkError> {
        self.inner
            .lock()
            .map_err(|_| SinkError::Unavailable("sqlite connection lock poisoned".into()))
    }

    fn ensure_collection(inner: &mut Inner, collection: &str) -> Result<(), SinkError> {
        validate_collection(collection)?;
        if inner.known.contains(collection) {
            return Ok(());
        }

        inner.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {c} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts REAL NOT NULL,
                doc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{c}_ts ON {c}(ts);",
            c = collection
        ))?;

        inner.known.insert(collection.to_string());
        Ok(())
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> Result<usize, SinkError> {
        let mut inner = self.lock()?;
        Self::ensure_collection(&mut inner, collection)?;

        let sql = format!("SELECT COUNT(*) FROM {}", collection);
        let count: i64 = inner.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// All documents in insertion order.
    pub fn find_all(&self, collection: &str) -> Result<Vec<serde_json::Value>, SinkError> {
        self.query_docs(
            collection,
            &format!("SELECT doc FROM {} ORDER BY id ASC", collection),
            None,
        )
    }

    /// The `limit` most recently inserted documents, oldest first.
    pub fn find_recent(
        &self,
        collection: &str,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>, SinkError> {
        let mut docs = self.query_docs(
            collection,
            &format!("SELECT doc FROM {} ORDER BY id DESC LIMIT ?1", collection),
            Some(limit as i64),
        )?;
        docs.reverse();
        Ok(docs)
    }

    fn query_docs(
        &self,
        collection: &str,
        sql: &str,
        limit: Option<i64>,
    ) -> Result<Vec<serde_json::Value>, SinkError> {
        let mut inner = self.lock()?;
        Self::ensure_collection(&mut inner, collection)?;

        let mut stmt = inner.conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(limit), |row| row.get::<_, String>(0))?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(serde_json::from_str(&row?)?);
        }
        Ok(docs)
    }
}

impl DocumentSink for SqliteDocumentStore {
    fn insert_many(
        &self,
        collection: &str,
        records: &[NormalizedRecord],
    ) -> Result<usize, SinkError> {
        // Encode everything up front so a bad record fails the batch before
        // anything touches the database.
        let rows = records
            .iter()
            .map(|r| -> Result<(f64, String), SinkError> { Ok((r.ts(), r.to_json()?)) })
            .collect::<Result<Vec<_>, SinkError>>()?;

        let mut inner = self.lock()?;
        Self::ensure_collection(&mut inner, collection)?;

        let tx = inner.conn.transaction()?;
        {
            let sql = format!("INSERT INTO {} (ts, doc) VALUES (?1, ?2)", collection);
            let mut stmt = tx.prepare_cached(&sql)?;
            for (ts, doc) in &rows {
                stmt.execute(params![ts, doc])?;
            }
        }
        tx.commit()?;

        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize;
    use serde_json::json;

    #[test]
    fn test_insert_many_and_find_all() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let batch = normalize(br#"[{"seq": 1}, {"seq": 2}, {"seq": 3}]"#, 12.5).unwrap();

        assert_eq!(store.insert_many("portenta_stream", &batch).unwrap(), 3);
        assert_eq!(store.count("portenta_stream").unwrap(), 3);

        let docs = store.find_all("portenta_stream").unwrap();
        assert_eq!(docs[0], json!({"seq": 1, "ts": 12.5}));
        assert_eq!(docs[2]["seq"], json!(3));
    }

    #[test]
    fn test_find_recent_returns_oldest_first() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        for seq in 0..5 {
            let payload = format!(r#"{{"seq": {seq}}}"#);
            let batch = normalize(payload.as_bytes(), seq as f64).unwrap();
            store.insert_many("readings", &batch).unwrap();
        }

        let recent = store.find_recent("readings", 2).unwrap();
        let seqs: Vec<_> = recent.iter().map(|d| d["seq"].as_u64().unwrap()).collect();
        assert_eq!(seqs, vec![3, 4]);
    }

    #[test]
    fn test_collections_are_isolated() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let batch = normalize(br#"{"seq": 1}"#, 1.0).unwrap();

        store.insert_many("a", &batch).unwrap();
        assert_eq!(store.count("a").unwrap(), 1);
        assert_eq!(store.count("b").unwrap(), 0);
    }

    #[test]
    fn test_rejects_invalid_collection() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let batch = normalize(br#"{"seq": 1}"#, 1.0).unwrap();

        let err = store.insert_many("x; DROP TABLE y", &batch).unwrap_err();
        assert!(matches!(err, SinkError::InvalidCollection(_)));
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest.db");
        let batch = normalize(br#"[{"seq": 1}, {"seq": 2}]"#, 3.0).unwrap();

        {
            let store = SqliteDocumentStore::open(&path).unwrap();
            store.insert_many("readings", &batch).unwrap();
        }

        let store = SqliteDocumentStore::open(&path).unwrap();
        assert_eq!(store.count("readings").unwrap(), 2);
    }
}
