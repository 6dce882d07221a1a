// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sensor Ingest CLI
//!
//! Subscribes to an MQTT topic and stores JSON readings in SQLite in batches.
//!
//! # Usage
//!
//! ```bash
//! # Run with defaults (public HiveMQ broker, topic nicla/data)
//! sensor-ingest
//!
//! # Use a config file and override the batch size
//! sensor-ingest --config ingest.toml --batch-size 500
//!
//! # Inspect what has been stored
//! sensor-ingest stats
//! sensor-ingest tail --limit 20
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sensor_ingest::{IngestConfig, IngestPipeline, MqttSubscriber, SqliteDocumentStore};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sensor-ingest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Batch MQTT sensor readings into a document store", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// MQTT broker host
    #[arg(long)]
    host: Option<String>,

    /// MQTT broker port
    #[arg(long)]
    port: Option<u16>,

    /// Topic to subscribe to
    #[arg(short, long)]
    topic: Option<String>,

    /// Database path (SQLite file)
    #[arg(long)]
    db: Option<String>,

    /// Collection receiving the readings
    #[arg(long)]
    collection: Option<String>,

    /// Records per bulk insert
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Verbose mode (debug logs)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest until Ctrl+C (default)
    Run,
    /// Show the number of stored documents
    Stats,
    /// Print the most recent documents as JSON lines
    Tail {
        /// Number of documents to print
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_directive = if args.verbose {
        "sensor_ingest=debug"
    } else {
        "sensor_ingest=info"
    };
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .init();

    let config = build_config(&args)?;
    let store = SqliteDocumentStore::open(&config.store.path)
        .with_context(|| format!("Failed to open store at {}", config.store.path))?;

    match args.command {
        None | Some(Commands::Run) => run(config, store).await,
        Some(Commands::Stats) => {
            let count = store.count(&config.store.collection)?;
            println!("Documents in '{}': {}", config.store.collection, count);
            Ok(())
        }
        Some(Commands::Tail { limit }) => {
            for doc in store.find_recent(&config.store.collection, limit)? {
                println!("{}", doc);
            }
            Ok(())
        }
    }
}

fn build_config(args: &Args) -> Result<IngestConfig> {
    let mut config = match &args.config {
        Some(path) => IngestConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => IngestConfig::default(),
    };

    if let Some(host) = &args.host {
        config.mqtt.host = host.clone();
    }
    if let Some(port) = args.port {
        config.mqtt.port = port;
    }
    if let Some(topic) = &args.topic {
        config.mqtt.topic = topic.clone();
    }
    if let Some(db) = &args.db {
        config.store.path = db.clone();
    }
    if let Some(collection) = &args.collection {
        config.store.collection = collection.clone();
    }
    if let Some(size) = args.batch_size {
        config.batch.size = size;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run(config: IngestConfig, store: SqliteDocumentStore) -> Result<()> {
    tracing::info!("Sensor ingest starting...");
    tracing::info!("  Broker: {}:{}", config.mqtt.host, config.mqtt.port);
    tracing::info!("  Topic: {}", config.mqtt.topic);
    tracing::info!(
        "  Store: {} ({})",
        config.store.path,
        config.store.collection
    );
    tracing::info!("  Batch size: {}", config.batch.size);

    let pipeline =
        IngestPipeline::from_config(store, &config).context("Failed to start flush worker")?;

    let subscriber = MqttSubscriber::new(config.mqtt.clone(), pipeline.normalizer());
    subscriber.run(ctrl_c()).await;

    tracing::info!(queued = pipeline.queue_depth(), "flushing remaining records");
    let stats = tokio::task::spawn_blocking(move || pipeline.shutdown())
        .await
        .context("Shutdown task failed")??;

    tracing::info!(
        messages_received = stats.messages_received,
        records_inserted = stats.records_inserted,
        decode_errors = stats.decode_errors,
        shape_errors = stats.shape_errors,
        flush_failures = stats.flush_failures,
        records_discarded = stats.records_discarded,
        "Sensor ingest shutdown complete"
    );

    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_defaults() {
        let args = Args::parse_from([
            "sensor-ingest",
            "--host",
            "localhost",
            "--topic",
            "lab/+",
            "--batch-size",
            "5",
            "--collection",
            "lab",
        ]);
        let config = build_config(&args).unwrap();

        assert_eq!(config.mqtt.host, "localhost");
        assert_eq!(config.mqtt.topic, "lab/+");
        assert_eq!(config.batch.size, 5);
        assert_eq!(config.store.collection, "lab");
        assert_eq!(config.mqtt.port, 1883);
    }

    #[test]
    fn test_cli_rejects_zero_batch() {
        let args = Args::parse_from(["sensor-ingest", "--batch-size", "0"]);
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn test_tail_subcommand() {
        let args = Args::parse_from(["sensor-ingest", "tail", "--limit", "3"]);
        assert!(matches!(args.command, Some(Commands::Tail { limit: 3 })));
    }
}
