// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sensor Ingest
//!
//! Buffers JSON sensor readings arriving one MQTT message at a time and
//! writes them to a document store in bulk.
//!
//! # Architecture
//!
//! ```text
//! MQTT publish --> IngressNormalizer --> hand-off queue --> FlushWorker --> DocumentSink
//!                  (decode, stamp ts)    (unbounded)        (batch, flush)
//! ```
//!
//! The normalizer runs inside the transport loop and never blocks. The flush
//! worker owns the batch on its own thread and is the only place storage
//! I/O happens. Shutdown is an explicit `Envelope::Shutdown` marker that
//! flushes the partial batch before the worker exits.
//!
//! # Example
//!
//! ```ignore
//! use sensor_ingest::{IngestConfig, IngestPipeline, MqttSubscriber, SqliteDocumentStore};
//!
//! let config = IngestConfig::from_file("ingest.toml")?;
//! let store = SqliteDocumentStore::open(&config.store.path)?;
//! let pipeline = IngestPipeline::from_config(store, &config)?;
//!
//! MqttSubscriber::new(config.mqtt.clone(), pipeline.normalizer())
//!     .run(async { let _ = tokio::signal::ctrl_c().await; })
//!     .await;
//!
//! let stats = pipeline.shutdown()?;
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod mqtt;
pub mod normalizer;
pub mod pipeline;
pub mod record;
pub mod sink;
pub mod sqlite;
pub mod stats;
pub mod worker;

pub use buffer::BatchBuffer;
pub use config::{BatchConfig, ConfigError, FailurePolicy, IngestConfig, MqttConfig, StoreConfig};
pub use error::{NormalizeError, PipelineError, SinkError};
pub use mqtt::MqttSubscriber;
pub use normalizer::{normalize, IngressNormalizer};
pub use pipeline::IngestPipeline;
pub use record::{Envelope, NormalizedRecord, TS_FIELD};
pub use sink::{DocumentSink, MemorySink};
pub use sqlite::SqliteDocumentStore;
pub use stats::{IngestStats, StatsSnapshot};
pub use worker::{FlushWorker, WorkerState};
