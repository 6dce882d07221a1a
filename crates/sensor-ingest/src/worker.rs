// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flush worker
//!
//! Drains the hand-off queue into a [`BatchBuffer`] and writes full batches
//! to a [`DocumentSink`].
//!
//! # Operation
//!
//! 1. Block on the queue (or until the linger deadline, when enabled)
//! 2. Append each record; flush when the batch reaches its size
//! 3. On `Envelope::Shutdown`, or once every producer is gone, flush the
//!    partial batch and stop
//!
//! A failed flush is reported and the batch is dropped after the attempts
//! allowed by the [`FailurePolicy`]. Sink errors never stop the worker.

use crate::buffer::BatchBuffer;
use crate::config::{BatchConfig, FailurePolicy};
use crate::record::{Envelope, NormalizedRecord};
use crate::sink::DocumentSink;
use crate::stats::IngestStats;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Name of the worker thread.
pub const WORKER_THREAD_NAME: &str = "sensor-ingest-flush";

/// Worker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Collecting records into the current batch.
    Accumulating,
    /// Final flush done; no further pops.
    Stopped,
}

enum Event {
    Envelope(Envelope),
    LingerElapsed,
    Disconnected,
}

/// Consumer side of the pipeline.
pub struct FlushWorker<S: DocumentSink> {
    rx: Receiver<Envelope>,
    sink: S,
    collection: String,
    buffer: BatchBuffer,
    policy: FailurePolicy,
    sequence_field: String,
    stats: Arc<IngestStats>,
    state: WorkerState,
}

impl<S: DocumentSink> FlushWorker<S> {
    /// Create a worker reading from `rx` and writing to `collection`.
    pub fn new(
        rx: Receiver<Envelope>,
        sink: S,
        collection: impl Into<String>,
        config: &BatchConfig,
        stats: Arc<IngestStats>,
    ) -> Self {
        Self {
            rx,
            sink,
            collection: collection.into(),
            buffer: BatchBuffer::new(config.size, config.max_linger()),
            policy: config.on_failure,
            sequence_field: config.sequence_field.clone(),
            stats,
            state: WorkerState::Accumulating,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Records waiting in the current batch.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Handle one queue event. Does nothing once stopped.
    pub fn step(&mut self) -> WorkerState {
        if self.state == WorkerState::Stopped {
            return self.state;
        }

        match self.next_event() {
            Event::Envelope(Envelope::Record(record)) => {
                if let Some(batch) = self.buffer.add(record) {
                    self.flush(batch);
                }
            }
            Event::LingerElapsed => {
                let batch = self.buffer.take();
                tracing::debug!(
                    records = batch.len(),
                    "linger elapsed, flushing partial batch"
                );
                self.flush(batch);
            }
            Event::Envelope(Envelope::Shutdown) => {
                tracing::debug!(records = self.buffer.len(), "shutdown requested");
                self.stop();
            }
            Event::Disconnected => {
                tracing::debug!(records = self.buffer.len(), "all producers gone");
                self.stop();
            }
        }

        self.state
    }

    /// Run until stopped (blocking).
    pub fn run(mut self) {
        tracing::info!(
            collection = %self.collection,
            policy = ?self.policy,
            "flush worker started"
        );

        while self.step() == WorkerState::Accumulating {}

        let stats = self.stats.snapshot();
        tracing::info!(
            batches_flushed = stats.batches_flushed,
            records_inserted = stats.records_inserted,
            flush_failures = stats.flush_failures,
            records_discarded = stats.records_discarded,
            "flush worker stopped"
        );
    }

    /// Run on a dedicated named thread.
    pub fn spawn(self) -> io::Result<JoinHandle<()>>
    where
        S: 'static,
    {
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || self.run())
    }

    fn next_event(&self) -> Event {
        match self.buffer.linger_remaining() {
            Some(wait) => match self.rx.recv_timeout(wait) {
                Ok(envelope) => Event::Envelope(envelope),
                Err(RecvTimeoutError::Timeout) => Event::LingerElapsed,
                Err(RecvTimeoutError::Disconnected) => Event::Disconnected,
            },
            None => match self.rx.recv() {
                Ok(envelope) => Event::Envelope(envelope),
                Err(_) => Event::Disconnected,
            },
        }
    }

    fn stop(&mut self) {
        let batch = self.buffer.take();
        self.flush(batch);
        self.state = WorkerState::Stopped;

        // Records queued behind the marker are not flushed.
        let late = self
            .rx
            .try_iter()
            .filter(|envelope| matches!(envelope, Envelope::Record(_)))
            .count();
        if late > 0 {
            IngestStats::incr(&self.stats.records_discarded, late as u64);
            tracing::warn!(
                collection = %self.collection,
                records = late,
                "records queued after shutdown, discarded"
            );
        }
    }

    /// Write one batch, applying the failure policy. The batch is consumed
    /// whatever the outcome.
    fn flush(&mut self, batch: Vec<NormalizedRecord>) {
        let Some(last) = batch.last() else {
            return;
        };
        let count = batch.len();
        let last_ts = last.ts();
        let last_seq = last
            .get(&self.sequence_field)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());

        let max_attempts = self.policy.max_attempts();
        for attempt in 1..=max_attempts {
            match self.sink.insert_many(&self.collection, &batch) {
                Ok(inserted) => {
                    IngestStats::incr(&self.stats.batches_flushed, 1);
                    IngestStats::incr(&self.stats.records_inserted, inserted as u64);
                    tracing::info!(
                        collection = %self.collection,
                        inserted,
                        last_ts,
                        last_seq = %last_seq,
                        "inserted batch"
                    );
                    return;
                }
                Err(e) => {
                    IngestStats::incr(&self.stats.flush_failures, 1);
                    if attempt < max_attempts {
                        tracing::warn!(
                            collection = %self.collection,
                            batch_size = count,
                            attempt,
                            max_attempts,
                            error = %e,
                            "insert failed, retrying"
                        );
                        thread::sleep(self.policy.backoff());
                    } else {
                        IngestStats::incr(&self.stats.records_discarded, count as u64);
                        tracing::error!(
                            collection = %self.collection,
                            batch_size = count,
                            last_ts,
                            last_seq = %last_seq,
                            attempts = attempt,
                            error = %e,
                            "insert failed, batch discarded"
                        );
                    }
                }
            }
        }
    }
}
