// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pipeline lifecycle: start the flush worker, hand out normalizers, shut
//! down with a final flush.

use crate::config::{BatchConfig, IngestConfig};
use crate::error::PipelineError;
use crate::normalizer::IngressNormalizer;
use crate::record::Envelope;
use crate::sink::DocumentSink;
use crate::stats::{IngestStats, StatsSnapshot};
use crate::worker::FlushWorker;
use crossbeam::channel::{unbounded, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Running ingestion pipeline.
///
/// Stop the transport before calling [`shutdown`](Self::shutdown): records
/// pushed after the shutdown marker are not flushed.
pub struct IngestPipeline {
    normalizer: IngressNormalizer,
    tx: Sender<Envelope>,
    worker: Option<JoinHandle<()>>,
    stats: Arc<IngestStats>,
}

impl IngestPipeline {
    /// Spawn the flush worker writing to `collection` through `sink`.
    pub fn start<S>(
        sink: S,
        collection: impl Into<String>,
        config: &BatchConfig,
    ) -> Result<Self, PipelineError>
    where
        S: DocumentSink + 'static,
    {
        let (tx, rx) = unbounded();
        let stats = Arc::new(IngestStats::new());

        let worker = FlushWorker::new(rx, sink, collection, config, Arc::clone(&stats)).spawn()?;

        Ok(Self {
            normalizer: IngressNormalizer::new(tx.clone(), Arc::clone(&stats)),
            tx,
            worker: Some(worker),
            stats,
        })
    }

    /// Start using the store collection and batch settings of `config`.
    pub fn from_config<S>(sink: S, config: &IngestConfig) -> Result<Self, PipelineError>
    where
        S: DocumentSink + 'static,
    {
        Self::start(sink, config.store.collection.clone(), &config.batch)
    }

    /// Producer handle for the transport.
    pub fn normalizer(&self) -> IngressNormalizer {
        self.normalizer.clone()
    }

    /// Records waiting in the hand-off queue.
    pub fn queue_depth(&self) -> usize {
        self.tx.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Send the shutdown marker and wait for the final flush.
    pub fn shutdown(mut self) -> Result<StatsSnapshot, PipelineError> {
        self.stop()?;
        Ok(self.stats.snapshot())
    }

    fn stop(&mut self) -> Result<(), PipelineError> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };

        // Fails only if the worker is already gone, which join reports.
        let _ = self.tx.send(Envelope::Shutdown);
        handle.join().map_err(|_| PipelineError::WorkerPanicked)
    }
}

impl Drop for IngestPipeline {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!(error = %e, "flush worker did not stop cleanly");
        }
    }
}
