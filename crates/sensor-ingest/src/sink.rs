// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Document sink abstraction
//!
//! The flush worker depends on a single capability: insert an ordered batch
//! of records into a named collection, succeeding or failing as a unit.
//!
//! # Implementations
//!
//! - `SqliteDocumentStore` -- On-disk store used by the binary
//! - `MemorySink` -- Records every call, with failure injection for tests

use crate::error::SinkError;
use crate::record::NormalizedRecord;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Bulk-insert capability of a document store.
pub trait DocumentSink: Send {
    /// Insert `records` into `collection` in order.
    ///
    /// Returns the number of records written. Partial writes must be reported
    /// as an error.
    fn insert_many(
        &self,
        collection: &str,
        records: &[NormalizedRecord],
    ) -> Result<usize, SinkError>;
}

impl<S: DocumentSink + Sync + ?Sized> DocumentSink for Arc<S> {
    fn insert_many(
        &self,
        collection: &str,
        records: &[NormalizedRecord],
    ) -> Result<usize, SinkError> {
        (**self).insert_many(collection, records)
    }
}

/// Check that a collection name is a plain identifier.
pub fn validate_collection(name: &str) -> Result<(), SinkError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SinkError::InvalidCollection(name.to_string()))
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    attempts: Vec<(String, Vec<NormalizedRecord>)>,
    stored: Vec<(String, Vec<NormalizedRecord>)>,
    fail_calls: HashSet<usize>,
    fail_always: bool,
}

/// In-memory sink that keeps every batch it is given.
///
/// Clones share state, so a test can keep one handle while the worker owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the call with this zero-based index.
    pub fn fail_on(self, call: usize) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fail_calls.insert(call);
        }
        self
    }

    /// Fail every call.
    pub fn fail_always(self) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fail_always = true;
        }
        self
    }

    /// Every batch passed to `insert_many`, failed ones included.
    pub fn attempts(&self) -> Vec<Vec<NormalizedRecord>> {
        self.state
            .lock()
            .map(|s| s.attempts.iter().map(|(_, b)| b.clone()).collect())
            .unwrap_or_default()
    }

    /// Batches that were accepted.
    pub fn stored(&self) -> Vec<Vec<NormalizedRecord>> {
        self.state
            .lock()
            .map(|s| s.stored.iter().map(|(_, b)| b.clone()).collect())
            .unwrap_or_default()
    }

    /// Collections written to by accepted batches, in call order.
    pub fn collections(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.stored.iter().map(|(c, _)| c.clone()).collect())
            .unwrap_or_default()
    }
}

impl DocumentSink for MemorySink {
    fn insert_many(
        &self,
        collection: &str,
        records: &[NormalizedRecord],
    ) -> Result<usize, SinkError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SinkError::Unavailable("memory sink lock poisoned".into()))?;

        let call = state.attempts.len();
        state
            .attempts
            .push((collection.to_string(), records.to_vec()));

        if state.fail_always || state.fail_calls.contains(&call) {
            return Err(SinkError::Unavailable(format!("injected failure on call {call}")));
        }

        state.stored.push((collection.to_string(), records.to_vec()));
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize;

    #[test]
    fn test_validate_collection() {
        assert!(validate_collection("portenta_stream").is_ok());
        assert!(validate_collection("_raw2").is_ok());
        assert!(validate_collection("").is_err());
        assert!(validate_collection("2fast").is_err());
        assert!(validate_collection("drop table; --").is_err());
    }

    #[test]
    fn test_memory_sink_failure_injection() {
        let sink = MemorySink::new().fail_on(1);
        let batch = normalize(br#"[{"seq": 1}, {"seq": 2}]"#, 1.0).unwrap();

        assert_eq!(sink.insert_many("c", &batch).unwrap(), 2);
        assert!(sink.insert_many("c", &batch).is_err());
        assert_eq!(sink.insert_many("c", &batch[..1]).unwrap(), 1);

        assert_eq!(sink.attempts().len(), 3);
        assert_eq!(sink.stored().len(), 2);
        assert_eq!(sink.collections(), vec!["c", "c"]);
    }

    #[test]
    fn test_arc_sink_delegates() {
        let inner = MemorySink::new();
        let shared: Arc<MemorySink> = Arc::new(inner.clone());
        let batch = normalize(br#"{"seq": 1}"#, 1.0).unwrap();

        shared.insert_many("readings", &batch).unwrap();
        assert_eq!(inner.stored().len(), 1);
    }
}
