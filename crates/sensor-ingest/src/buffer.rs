// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Batching buffer for normalized records.
//!
//! Accumulates records and hands back a full batch once the configured size
//! is reached. Owned exclusively by the flush worker.

use crate::record::NormalizedRecord;
use std::time::{Duration, Instant};

/// A batching buffer that collects records in arrival order.
///
/// Records are accumulated until either:
/// - The buffer reaches `max_size` (size-based flush)
/// - The optional `max_linger` has elapsed since the first buffered record
///   (time-based flush)
pub struct BatchBuffer {
    records: Vec<NormalizedRecord>,
    max_size: usize,
    max_linger: Option<Duration>,
    first_at: Option<Instant>,
}

impl BatchBuffer {
    /// Create a new batch buffer.
    ///
    /// # Arguments
    /// - `max_size` - Number of records that triggers a flush (at least 1)
    /// - `max_linger` - Longest a partial batch may wait, `None` to disable
    pub fn new(max_size: usize, max_linger: Option<Duration>) -> Self {
        let max_size = max_size.max(1);
        Self {
            records: Vec::with_capacity(max_size),
            max_size,
            max_linger,
            first_at: None,
        }
    }

    /// Add a record to the buffer.
    ///
    /// Returns `Some(batch)` if the buffer is now full and should be flushed,
    /// or `None` if there is still room.
    pub fn add(&mut self, record: NormalizedRecord) -> Option<Vec<NormalizedRecord>> {
        if self.records.is_empty() {
            self.first_at = Some(Instant::now());
        }
        self.records.push(record);
        if self.records.len() >= self.max_size {
            Some(self.take())
        } else {
            None
        }
    }

    /// Time left before a linger flush is due.
    ///
    /// `None` when lingering is disabled or the buffer is empty.
    pub fn linger_remaining(&self) -> Option<Duration> {
        let linger = self.max_linger?;
        let first_at = self.first_at?;
        Some(linger.saturating_sub(first_at.elapsed()))
    }

    /// Check if a time-based flush is due.
    pub fn should_flush(&self) -> bool {
        self.linger_remaining() == Some(Duration::ZERO)
    }

    /// Take all buffered records, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<NormalizedRecord> {
        self.first_at = None;
        std::mem::replace(&mut self.records, Vec::with_capacity(self.max_size))
    }

    /// Get the current number of buffered records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize;

    fn record(seq: u64) -> NormalizedRecord {
        let payload = format!(r#"{{"seq": {seq}}}"#);
        normalize(payload.as_bytes(), 1.0).unwrap().remove(0)
    }

    fn seqs(batch: &[NormalizedRecord]) -> Vec<u64> {
        batch
            .iter()
            .filter_map(|r| r.get("seq")?.as_u64())
            .collect()
    }

    #[test]
    fn test_batch_buffer_returns_none_until_full() {
        let mut buf = BatchBuffer::new(3, None);

        assert!(buf.add(record(1)).is_none());
        assert!(buf.add(record(2)).is_none());
        assert_eq!(buf.len(), 2);
        assert!(!buf.is_empty());
    }

    #[test]
    fn test_batch_buffer_returns_batch_when_full() {
        let mut buf = BatchBuffer::new(3, None);

        buf.add(record(1));
        buf.add(record(2));
        let batch = buf.add(record(3)).expect("full batch");

        assert_eq!(seqs(&batch), vec![1, 2, 3]);
        assert!(buf.is_empty());

        // Next batch starts fresh
        assert!(buf.add(record(4)).is_none());
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_batch_buffer_size_one_flushes_every_record() {
        let mut buf = BatchBuffer::new(1, None);
        assert_eq!(buf.add(record(9)).map(|b| b.len()), Some(1));
    }

    #[test]
    fn test_batch_buffer_zero_size_treated_as_one() {
        let mut buf = BatchBuffer::new(0, None);
        assert!(buf.add(record(1)).is_some());
    }

    #[test]
    fn test_batch_buffer_linger() {
        let mut buf = BatchBuffer::new(1000, Some(Duration::from_millis(0)));
        assert!(!buf.should_flush());
        assert_eq!(buf.linger_remaining(), None);

        buf.add(record(1));
        assert!(buf.should_flush());

        let batch = buf.take();
        assert_eq!(batch.len(), 1);
        assert!(!buf.should_flush());
    }

    #[test]
    fn test_batch_buffer_no_linger_when_disabled() {
        let mut buf = BatchBuffer::new(10, None);
        buf.add(record(1));
        assert!(!buf.should_flush());
        assert_eq!(buf.linger_remaining(), None);
    }
}
