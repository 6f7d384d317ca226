//! relsync demo
//!
//! Wires an adapter to a local and a "remote" in-memory store, starts live
//! replication and a change listener, then writes on both sides and waits
//! until everything has converged.
//!
//! Usage:
//!   relsync-demo --records 5 --docs --verbose

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::Parser;
use relsync_adapter::{Adapter, init_logging};
use relsync_model::{ModelCatalog, ModelRegistry, RecordSnapshot, ModelType};
use relsync_storage::{Direction, DocumentStore, MemoryStore};
use relsync_sync::{AdapterEvent, CacheError, CachedRecord, RecordCache};
use relsync_types::{RecordDocument, RecordKey};
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "relsync-demo")]
#[command(about = "Replicate records between two in-memory stores")]
struct Args {
    /// Number of records to write on the remote side
    #[arg(short, long, default_value = "3")]
    records: usize,

    /// Attach document bodies to change listener events
    #[arg(short, long)]
    docs: bool,

    /// Seconds to wait for the stores to converge
    #[arg(long, default_value = "10")]
    timeout: u64,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Tracks which records the "application" has loaded.
#[derive(Default)]
struct LoadedRecords {
    keys: Mutex<HashSet<RecordKey>>,
}

impl LoadedRecords {
    fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl RecordCache for LoadedRecords {
    fn peek(&self, key: &RecordKey) -> Option<CachedRecord> {
        let keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        keys.contains(key).then_some(CachedRecord { is_deleted: false })
    }

    fn unload(&self, key: &RecordKey) {
        info!("Unloading {}", key);
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    async fn find_record(&self, key: &RecordKey) -> Result<(), CacheError> {
        info!("Reloading {}", key);
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        Ok(())
    }
}

fn describe(event: &AdapterEvent) -> String {
    match event {
        AdapterEvent::ReplicationError { err, .. } | AdapterEvent::ReplicationDenied { err, .. } => {
            format!("{} ({})", event.kind(), err.message)
        }
        AdapterEvent::ReplicationPaused { err: Some(err), .. } => {
            format!("{} (retrying: {})", event.kind(), err.message)
        }
        AdapterEvent::ReplicationComplete { info, .. } => {
            format!("{} ({} docs written)", event.kind(), info.docs_written)
        }
        AdapterEvent::ChangesChange { change } => format!("{} {}", event.kind(), change.id),
        _ => event.kind().to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    info!("relsync demo starting...");

    let catalog = Arc::new(
        ModelCatalog::new()
            .with(
                ModelType::versioned("post")
                    .attribute("title")
                    .belongs_to("author", "author"),
            )
            .with(ModelType::versioned("author").attribute("name")),
    );
    let post = catalog.model_for("post").context("post model")?;
    let author = catalog.model_for("author").context("author model")?;

    let local = MemoryStore::new("local");
    let remote = MemoryStore::new("remote");
    let loaded = Arc::new(LoadedRecords::default());

    let adapter = Adapter::builder(catalog.clone())
        .db(Arc::new(local.clone()))
        .remote(Arc::new(remote.clone()), loaded.clone())
        .build();

    adapter.events().on_any(|event| {
        let direction = event.direction().map(|d| format!("[{d}] ")).unwrap_or_default();
        println!("  event: {direction}{}", describe(event));
    });

    adapter.start_listen_changes(Some(args.docs)).await?;
    adapter.start_default_replication().await?;

    let saved = adapter
        .create_record(
            &author,
            &RecordSnapshot::new()
                .with_id("ada")
                .with_attribute("name", json!("Ada")),
        )
        .await?;
    info!("Saved author {} locally", saved.id().unwrap_or_default());

    for i in 0..args.records {
        let doc = RecordDocument::from_value(json!({
            "id": format!("{i}"),
            "title": format!("Remote post {i}"),
            "author": "ada",
        }))?;
        remote.save("post", doc).await?;
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.timeout);
    loop {
        let payload = adapter.find_all(&post).await?;
        let posts = payload.get("posts").map_or(0, <[_]>::len);
        if posts >= args.records && remote.get("author_ada").is_some() {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("stores did not converge: {posts}/{} posts pulled", args.records);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    println!();
    println!("Converged:");
    println!("  local docs:     {}", local.doc_count());
    println!("  remote docs:    {}", remote.doc_count());
    println!("  loaded records: {}", loaded.len());
    for direction in Direction::ALL {
        println!("  {direction} phase: {}", adapter.replication_phase(direction));
    }

    adapter.stop_listen_changes()?;
    adapter.stop_replication()?;
    adapter.shutdown();
    info!("relsync demo finished");
    Ok(())
}
