//! Demonstrates request coalescing and the generation guard
//!
//! This example shows how to:
//! - Register providers with the aggregator
//! - Serve many concurrent callers with a single provider call
//! - Win over a slow fetch with an optimistic update
//! - Watch cache change events
//!
//! Run with `RUST_LOG=entry_metadata=debug` to see every fetch.

use async_trait::async_trait;
use entry_metadata::{
    CacheConfig, FileEntry, MetadataModel, PropertyBag, PropertyName, PropertyProvider,
    PropertyRequest, PropertyValue, ProviderAggregator,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pretends to stat files over a slow network mount
struct SlowStat {
    delay: Duration,
    calls: AtomicUsize,
}

#[async_trait]
impl PropertyProvider for SlowStat {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn property_names(&self) -> Vec<PropertyName> {
        vec!["size".into(), "modified".into()]
    }

    async fn get(&self, requests: &[PropertyRequest]) -> entry_metadata::Result<Vec<PropertyBag>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        Ok(requests
            .iter()
            .map(|request| {
                PropertyBag::new()
                    .with("size", request.entry.url.len() * 100)
                    .with("modified", chrono::Utc::now().to_rfc3339())
            })
            .collect())
    }
}

/// Only knows about images
struct Thumbnailer;

#[async_trait]
impl PropertyProvider for Thumbnailer {
    fn name(&self) -> &str {
        "thumbnailer"
    }

    fn property_names(&self) -> Vec<PropertyName> {
        vec!["thumbnail".into()]
    }

    fn supports(&self, entry: &FileEntry) -> bool {
        !entry.is_directory && entry.url.ends_with(".png")
    }

    async fn get(&self, requests: &[PropertyRequest]) -> entry_metadata::Result<Vec<PropertyBag>> {
        Ok(requests
            .iter()
            .map(|request| PropertyBag::new().with("thumbnail", format!("{}?thumb", request.entry.url)))
            .collect())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "entry_metadata=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let stat = Arc::new(SlowStat {
        delay: Duration::from_millis(200),
        calls: AtomicUsize::new(0),
    });
    let aggregator = ProviderAggregator::new(vec![stat.clone(), Arc::new(Thumbnailer)])?;
    let model = MetadataModel::new(aggregator, CacheConfig::from_env()?)?;

    let mut events = model.subscribe();
    let watcher = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("   [event] {} {:?} at {}", event.kind, event.keys, event.generation);
        }
    });

    let entries = vec![
        FileEntry::file("file:///photos/cat.png"),
        FileEntry::file("file:///docs/notes.txt"),
        FileEntry::directory("file:///photos"),
    ];
    let names: Vec<PropertyName> = vec!["size".into(), "thumbnail".into()];
    let size = vec![PropertyName::from("size")];

    // 1. Ten callers ask for the same thing at once
    println!("1. Ten concurrent gets...");
    let mut handles = Vec::new();
    for _ in 0..10 {
        let model = model.clone();
        let entries = entries.clone();
        let names = names.clone();
        handles.push(tokio::spawn(async move { model.get(&entries, &names).await }));
    }
    for handle in handles {
        handle.await??;
    }
    println!("   filesystem provider called {} time(s)\n", stat.calls.load(Ordering::SeqCst));

    // 2. Everything is fresh now
    println!("2. Reading from cache...");
    let bags = model.get(&entries, &names).await?;
    for (entry, bag) in entries.iter().zip(&bags) {
        println!(
            "   {} size={:?} thumbnail={:?}",
            entry.url,
            bag.value("size"),
            bag.value("thumbnail")
        );
    }
    println!();

    // 3. An optimistic update beats a fetch that started earlier
    println!("3. Optimistic update during a slow fetch...");
    model.notify_entries_changed(&entries[..1]).await;
    let slow = {
        let model = model.clone();
        let entries = entries[..1].to_vec();
        let size = size.clone();
        tokio::spawn(async move { model.get(&entries, &size).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    model
        .update(&[entries[0].url.clone()], &size, &[vec![PropertyValue::present(1)]])
        .await?;
    slow.await??;

    let cached = model.get_cache(&entries[..1], &size).await?;
    println!("   cached size after the slow fetch landed: {:?}\n", cached[0].value("size"));

    println!("4. Statistics");
    println!("   {}", model.stats().await);

    model.clear_all_cache().await;
    drop(model);
    watcher.await?;

    Ok(())
}
