// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ingestion counters shared by the normalizer and the flush worker.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters. Every field is updated with relaxed atomics.
#[derive(Debug, Default)]
pub struct IngestStats {
    /// Deliveries handed to the normalizer.
    pub messages_received: AtomicU64,
    /// Records pushed onto the hand-off queue.
    pub records_enqueued: AtomicU64,
    /// Deliveries that were not UTF-8 JSON.
    pub decode_errors: AtomicU64,
    /// Deliveries that were JSON but neither an object nor an array of objects.
    pub shape_errors: AtomicU64,
    /// Records dropped because the worker had already stopped.
    pub records_rejected: AtomicU64,
    /// Successful bulk inserts.
    pub batches_flushed: AtomicU64,
    /// Records written by successful bulk inserts.
    pub records_inserted: AtomicU64,
    /// Failed bulk insert attempts.
    pub flush_failures: AtomicU64,
    /// Records given up on after their batch failed.
    pub records_discarded: AtomicU64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            records_enqueued: self.records_enqueued.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            shape_errors: self.shape_errors.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            records_inserted: self.records_inserted.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            records_discarded: self.records_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`IngestStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub messages_received: u64,
    pub records_enqueued: u64,
    pub decode_errors: u64,
    pub shape_errors: u64,
    pub records_rejected: u64,
    pub batches_flushed: u64,
    pub records_inserted: u64,
    pub flush_failures: u64,
    pub records_discarded: u64,
}

impl StatsSnapshot {
    /// Records accepted into the queue but neither inserted nor discarded yet.
    pub fn in_flight(&self) -> u64 {
        self.records_enqueued
            .saturating_sub(self.records_inserted)
            .saturating_sub(self.records_discarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = IngestStats::new();
        IngestStats::incr(&stats.records_enqueued, 10);
        IngestStats::incr(&stats.records_inserted, 6);
        IngestStats::incr(&stats.records_discarded, 3);

        let snap = stats.snapshot();
        assert_eq!(snap.records_enqueued, 10);
        assert_eq!(snap.in_flight(), 1);
        assert_eq!(snap.decode_errors, 0);
    }
}
