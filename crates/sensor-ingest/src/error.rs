// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the ingestion pipeline.

use thiserror::Error;

/// Why a delivery produced no records.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object or an array of objects, got {0}")]
    Shape(&'static str),

    #[error("array element {index} is {kind}, expected an object")]
    ArrayElement { index: usize, kind: &'static str },

    #[error("flush worker stopped, {0} record(s) dropped")]
    Closed(usize),
}

impl NormalizeError {
    /// True for malformed text or JSON syntax.
    pub fn is_decode(&self) -> bool {
        matches!(self, NormalizeError::Utf8(_) | NormalizeError::Json(_))
    }

    /// True for well-formed JSON of the wrong shape.
    pub fn is_shape(&self) -> bool {
        matches!(
            self,
            NormalizeError::Shape(_) | NormalizeError::ArrayElement { .. }
        )
    }
}

/// Bulk insert failures reported by a [`DocumentSink`](crate::sink::DocumentSink).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("cannot encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid collection name: {0:?}")]
    InvalidCollection(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Pipeline lifecycle errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to spawn flush worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("flush worker panicked")]
    WorkerPanicked,
}
