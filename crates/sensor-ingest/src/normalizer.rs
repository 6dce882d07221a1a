// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ingress normalizer
//!
//! Turns one transport delivery into zero or more [`NormalizedRecord`]s and
//! pushes them onto the hand-off queue.
//!
//! # Wire contract
//!
//! A payload is UTF-8 JSON holding either one object or an array of objects.
//! Every record produced from one delivery carries the same `ts`, sampled
//! once when the delivery is processed. A producer-supplied `ts` is
//! overwritten. An array containing any non-object element is rejected as a
//! whole; an empty array yields no records.
//!
//! The normalizer never blocks: the queue is unbounded and storage I/O only
//! happens on the flush worker.

use crate::error::NormalizeError;
use crate::record::{Envelope, NormalizedRecord};
use crate::stats::IngestStats;
use crossbeam::channel::Sender;
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Decode, shape-check and stamp one payload.
pub fn normalize(payload: &[u8], arrival_ts: f64) -> Result<Vec<NormalizedRecord>, NormalizeError> {
    let text = std::str::from_utf8(payload)?;
    let value: Value = serde_json::from_str(text)?;

    match value {
        Value::Object(fields) => Ok(vec![NormalizedRecord::stamp(fields, arrival_ts)]),
        Value::Array(items) => {
            let mut records = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                match item {
                    Value::Object(fields) => {
                        records.push(NormalizedRecord::stamp(fields, arrival_ts));
                    }
                    other => {
                        return Err(NormalizeError::ArrayElement {
                            index,
                            kind: kind_of(&other),
                        })
                    }
                }
            }
            Ok(records)
        }
        other => Err(NormalizeError::Shape(kind_of(&other))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Current wall-clock time in Unix seconds.
pub fn now_epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Producer side of the pipeline, handed to the transport.
///
/// Cheap to clone; every clone feeds the same flush worker.
#[derive(Clone)]
pub struct IngressNormalizer {
    tx: Sender<Envelope>,
    stats: Arc<IngestStats>,
}

impl IngressNormalizer {
    pub(crate) fn new(tx: Sender<Envelope>, stats: Arc<IngestStats>) -> Self {
        Self { tx, stats }
    }

    /// Normalize one payload and enqueue its records.
    ///
    /// Returns the number of records enqueued. Failures are counted in
    /// [`IngestStats`] before being returned.
    pub fn on_message(&self, payload: &[u8]) -> Result<usize, NormalizeError> {
        IngestStats::incr(&self.stats.messages_received, 1);

        let records = match normalize(payload, now_epoch_secs()) {
            Ok(records) => records,
            Err(e) => {
                if e.is_decode() {
                    IngestStats::incr(&self.stats.decode_errors, 1);
                } else if e.is_shape() {
                    IngestStats::incr(&self.stats.shape_errors, 1);
                }
                return Err(e);
            }
        };

        let total = records.len();
        for (sent, record) in records.into_iter().enumerate() {
            if self.tx.send(Envelope::Record(record)).is_err() {
                let dropped = total - sent;
                IngestStats::incr(&self.stats.records_rejected, dropped as u64);
                return Err(NormalizeError::Closed(dropped));
            }
            IngestStats::incr(&self.stats.records_enqueued, 1);
        }

        Ok(total)
    }

    /// Transport callback entry point. Never fails; errors are logged.
    pub fn handle(&self, topic: &str, payload: &[u8]) {
        match self.on_message(payload) {
            Ok(count) => {
                tracing::trace!(topic, records = count, "enqueued delivery");
            }
            Err(e @ NormalizeError::Closed(_)) => {
                tracing::warn!(topic, error = %e, "pipeline stopped, dropping delivery");
            }
            Err(e) => {
                tracing::warn!(
                    topic,
                    payload_size = payload.len(),
                    error = %e,
                    "error parsing message, dropped"
                );
            }
        }
    }

    /// Shared statistics handle.
    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }
}
