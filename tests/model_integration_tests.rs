//! Integration tests for the metadata model
//!
//! These tests drive `MetadataModel` through a provider that can be held
//! mid-fetch, and verify:
//! - Fresh-cache fast path
//! - Request coalescing
//! - Generation guard against lost updates
//! - Invalidation and clearing
//! - Snapshot isolation of in-flight fetches
//! - Change events and LRU eviction
//! - Degenerate inputs and misbehaving providers

use async_trait::async_trait;
use entry_metadata::{
    CacheConfig, CacheEventKind, EntryTable, FileEntry, ItemKey, MetadataError, MetadataModel,
    PropertyBag, PropertyName, PropertyProvider, PropertyRequest, PropertyValue, ProviderAggregator,
};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_test::{assert_ready, task};

/// Answers `size` and `owner`, never `thumbnail`, optionally waiting for
/// `release` before each answer
struct GatedProvider {
    size: i64,
    gated: bool,
    gate: Notify,
    calls: AtomicUsize,
    requested: Mutex<Vec<Vec<(ItemKey, Vec<PropertyName>)>>>,
}

impl GatedProvider {
    fn new(size: i64) -> Self {
        Self {
            size,
            gated: false,
            gate: Notify::new(),
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    fn gated(size: i64) -> Self {
        Self {
            gated: true,
            ..Self::new(size)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn release(&self) {
        self.gate.notify_one();
    }

    fn last_request(&self) -> Vec<(ItemKey, Vec<PropertyName>)> {
        self.requested.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl PropertyProvider for GatedProvider {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn property_names(&self) -> Vec<PropertyName> {
        vec!["size".into(), "owner".into(), "thumbnail".into()]
    }

    async fn get(&self, requests: &[PropertyRequest]) -> entry_metadata::Result<Vec<PropertyBag>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(
            requests
                .iter()
                .map(|request| (request.entry.url.clone(), request.names.clone()))
                .collect(),
        );

        if self.gated {
            self.gate.notified().await;
        }

        Ok(requests
            .iter()
            .map(|request| {
                let mut bag = PropertyBag::new();
                for name in &request.names {
                    match name.as_str() {
                        "size" => bag.insert(name.clone(), PropertyValue::present(self.size)),
                        "owner" => bag.insert(name.clone(), PropertyValue::present("alice")),
                        _ => {}
                    }
                }
                bag
            })
            .collect())
    }
}

/// Declares `checksum` and panics whenever asked for it
struct CrashingProvider;

#[async_trait]
impl PropertyProvider for CrashingProvider {
    fn name(&self) -> &str {
        "checksum"
    }

    fn property_names(&self) -> Vec<PropertyName> {
        vec!["checksum".into()]
    }

    async fn get(&self, _requests: &[PropertyRequest]) -> entry_metadata::Result<Vec<PropertyBag>> {
        panic!("checksum backend crashed");
    }
}

fn setup(provider: GatedProvider) -> (MetadataModel, Arc<GatedProvider>) {
    setup_with(provider, CacheConfig::default())
}

fn setup_with(provider: GatedProvider, config: CacheConfig) -> (MetadataModel, Arc<GatedProvider>) {
    let provider = Arc::new(provider);
    let aggregator = ProviderAggregator::new(vec![provider.clone()]).unwrap();
    (MetadataModel::new(aggregator, config).unwrap(), provider)
}

fn names(list: &[&str]) -> Vec<PropertyName> {
    list.iter().map(|name| PropertyName::from(*name)).collect()
}

fn urls(entries: &[FileEntry]) -> Vec<ItemKey> {
    entries.iter().map(|entry| entry.url.clone()).collect()
}

/// Run `get` on its own task so the test can interleave other calls
fn spawn_get(
    model: &MetadataModel,
    entries: Vec<FileEntry>,
    names: Vec<PropertyName>,
) -> tokio::task::JoinHandle<entry_metadata::Result<Vec<PropertyBag>>> {
    let model = model.clone();
    tokio::spawn(async move { model.get(&entries, &names).await })
}

async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}

async fn wait_for_calls(provider: &GatedProvider, calls: usize) {
    within(async {
        while provider.calls() < calls {
            tokio::task::yield_now().await;
        }
    })
    .await
}

async fn wait_for_pending(model: &MetadataModel, pending: usize) {
    within(async {
        while model.pending_requests().await < pending {
            tokio::task::yield_now().await;
        }
    })
    .await
}

#[tokio::test]
async fn test_fresh_get_is_idempotent() {
    let (model, provider) = setup(GatedProvider::new(7));
    let entries = vec![FileEntry::file("file:///a"), FileEntry::file("file:///b")];
    let size = names(&["size"]);

    let first = model.get(&entries, &size).await.unwrap();
    assert_eq!(provider.calls(), 1);

    // Served without suspending
    let mut second = task::spawn(model.get(&entries, &size));
    let second = assert_ready!(second.poll()).unwrap();

    assert_eq!(first, second);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_get_without_names_resolves_immediately() {
    let (model, provider) = setup(GatedProvider::new(7));
    let entries = vec![FileEntry::file("file:///a"), FileEntry::file("file:///b")];

    let mut empty = task::spawn(model.get(&entries, &[]));
    let bags = assert_ready!(empty.poll()).unwrap();

    assert_eq!(bags.len(), 2);
    assert!(bags.iter().all(PropertyBag::is_empty));
    assert_eq!(model.pending_requests().await, 0);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_duplicate_entries_get_one_bag_each() {
    let (model, provider) = setup(GatedProvider::new(7));
    let a = FileEntry::file("file:///a");
    let b = FileEntry::file("file:///b");

    let bags = within(model.get(&[a.clone(), b.clone(), a.clone()], &names(&["size", "owner"])))
        .await
        .unwrap();

    assert_eq!(bags.len(), 3);
    assert_eq!(bags[0], bags[2]);
    assert_eq!(bags[0].value("size"), &PropertyValue::present(7));
    assert_eq!(bags[1].value("owner"), &PropertyValue::present("alice"));

    // Each item is requested once
    assert_eq!(provider.calls(), 1);
    assert_eq!(
        provider.last_request(),
        vec![
            ("file:///a".to_string(), names(&["size", "owner"])),
            ("file:///b".to_string(), names(&["size", "owner"])),
        ]
    );
}

#[tokio::test]
async fn test_panicking_provider_reads_as_absent() {
    let filesystem = Arc::new(GatedProvider::new(7));
    let aggregator = ProviderAggregator::new(vec![filesystem.clone(), Arc::new(CrashingProvider)]).unwrap();
    let model = MetadataModel::new(aggregator, CacheConfig::default()).unwrap();
    let entry = vec![FileEntry::file("A")];
    let wanted = names(&["size", "checksum"]);

    let bags = within(model.get(&entry, &wanted)).await.unwrap();
    assert_eq!(bags[0].value("size"), &PropertyValue::present(7));
    assert!(bags[0].value("checksum").is_absent());
    assert_eq!(model.pending_requests().await, 0);

    // The pair is fresh, so later callers do not wait on anything
    assert!(model.has_fresh_cache(&["A".to_string()], &wanted).await);
    within(model.get(&entry, &wanted)).await.unwrap();
    assert_eq!(filesystem.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_gets_share_one_fetch() {
    let (model, provider) = setup(GatedProvider::gated(7));
    let entries = vec![FileEntry::file("file:///a"), FileEntry::file("file:///b")];

    let first = spawn_get(&model, entries.clone(), names(&["size"]));
    wait_for_calls(&provider, 1).await;

    let second = spawn_get(&model, entries.clone(), names(&["size"]));
    wait_for_pending(&model, 2).await;
    assert_eq!(provider.calls(), 1);

    provider.release();
    let first = within(first).await.unwrap().unwrap();
    let second = within(second).await.unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(first[1].value("size"), &PropertyValue::present(7));
    assert_eq!(provider.calls(), 1);

    let stats = model.stats().await;
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.fetches, 1);
    assert_eq!(stats.coalesced, 1);
}

#[tokio::test]
async fn test_coalescing_is_per_pair() {
    let (model, provider) = setup(GatedProvider::new(7));
    let entry = vec![FileEntry::file("file:///a")];

    model.get(&entry, &names(&["size"])).await.unwrap();
    let bags = model.get(&entry, &names(&["size", "owner"])).await.unwrap();

    assert_eq!(provider.calls(), 2);
    assert_eq!(
        provider.last_request(),
        vec![("file:///a".to_string(), names(&["owner"]))]
    );
    assert_eq!(bags[0].value("size"), &PropertyValue::present(7));
    assert_eq!(bags[0].value("owner"), &PropertyValue::present("alice"));
}

#[tokio::test]
async fn test_overlapping_gets_fetch_only_missing_items() {
    let (model, provider) = setup(GatedProvider::gated(7));
    let a = FileEntry::file("file:///a");
    let b = FileEntry::file("file:///b");
    let c = FileEntry::file("file:///c");

    let first = spawn_get(&model, vec![a.clone(), b.clone()], names(&["size"]));
    wait_for_calls(&provider, 1).await;

    let second = spawn_get(&model, vec![b.clone(), c.clone()], names(&["size"]));
    wait_for_calls(&provider, 2).await;
    assert_eq!(
        provider.last_request(),
        vec![("file:///c".to_string(), names(&["size"]))]
    );

    provider.release();
    provider.release();
    let first = within(first).await.unwrap().unwrap();
    let second = within(second).await.unwrap().unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(second[0].value("size"), &PropertyValue::present(7));
    assert_eq!(second[1].value("size"), &PropertyValue::present(7));
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_update_wins_over_slower_fetch() {
    let (model, provider) = setup(GatedProvider::gated(7));
    let entry = FileEntry::file("A");
    let size = names(&["size"]);

    let fetch = spawn_get(&model, vec![entry.clone()], size.clone());
    wait_for_calls(&provider, 1).await;

    model
        .update(&[entry.url.clone()], &size, &[vec![PropertyValue::present(42)]])
        .await
        .unwrap();

    provider.release();
    within(fetch).await.unwrap().unwrap();

    let cached = model.get_cache(&[entry.clone()], &size).await.unwrap();
    assert_eq!(cached[0].value("size"), &PropertyValue::present(42));
    assert_eq!(model.stats().await.stale_writes_dropped, 1);

    // The optimistic value is fresh; no refetch
    let bags = model.get(&[entry], &size).await.unwrap();
    assert_eq!(bags[0].value("size"), &PropertyValue::present(42));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_invalidation_forces_refetch() {
    let (model, provider) = setup(GatedProvider::new(7));
    let entry = FileEntry::file("A");
    let size = names(&["size"]);

    model.get(&[entry.clone()], &size).await.unwrap();
    assert!(model.has_fresh_cache(&[entry.url.clone()], &size).await);

    model.notify_entries_changed(&[entry.clone()]).await;
    assert!(!model.has_fresh_cache(&[entry.url.clone()], &size).await);

    model.get(&[entry.clone()], &size).await.unwrap();
    assert_eq!(provider.calls(), 2);
    assert!(model.has_fresh_cache(&[entry.url.clone()], &size).await);
}

#[tokio::test]
async fn test_invalidation_drops_in_flight_result() {
    let (model, provider) = setup(GatedProvider::gated(7));
    let entry = FileEntry::file("A");
    let size = names(&["size"]);

    let fetch = spawn_get(&model, vec![entry.clone()], size.clone());
    wait_for_calls(&provider, 1).await;

    model.notify_entries_changed(&[entry.clone()]).await;
    provider.release();

    // The caller still gets the values it waited for
    let bags = within(fetch).await.unwrap().unwrap();
    assert_eq!(bags[0].value("size"), &PropertyValue::present(7));

    // The live row stays stale
    assert!(!model.has_fresh_cache(&[entry.url.clone()], &size).await);
}

#[tokio::test]
async fn test_creation_clears_reused_key() {
    let (model, _provider) = setup(GatedProvider::new(7));
    let entry = FileEntry::file("x");
    let size = names(&["size"]);

    model.get(&[entry.clone()], &size).await.unwrap();
    model.notify_entries_created(&[entry.clone()]).await;

    assert!(!model.has_fresh_cache(&["x".to_string()], &size).await);
    let cached = model.get_cache_by_urls(&["x".to_string()], &size).await.unwrap();
    assert!(cached[0].value("size").is_unknown());
}

#[tokio::test]
async fn test_removal_forgets_entry() {
    let (model, provider) = setup(GatedProvider::new(7));
    let entry = FileEntry::file("x");
    let size = names(&["size"]);

    model.get(&[entry.clone()], &size).await.unwrap();
    model.notify_entries_removed(&[entry.url.clone()]).await;

    assert!(!model.has_fresh_cache(&[entry.url.clone()], &size).await);
    assert_eq!(model.stats().await.entries, 0);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_unknown_property_rejected_before_fetch() {
    let (model, provider) = setup(GatedProvider::new(7));

    let result = model
        .get(&[FileEntry::file("A")], &names(&["not-a-real-property"]))
        .await;

    assert!(matches!(
        result,
        Err(MetadataError::InvalidPropertyName { ref name }) if name == "not-a-real-property"
    ));
    assert_eq!(provider.calls(), 0);

    let result = model
        .update(
            &["A".to_string()],
            &names(&["not-a-real-property"]),
            &[vec![PropertyValue::present(1)]],
        )
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_absent_differs_from_unknown() {
    let (model, provider) = setup(GatedProvider::new(7));
    let fetched = FileEntry::file("A");
    let thumbnail = names(&["thumbnail"]);

    let bags = model.get(&[fetched.clone()], &thumbnail).await.unwrap();
    assert!(bags[0].value("thumbnail").is_absent());

    // Absent is a fresh answer
    model.get(&[fetched.clone()], &thumbnail).await.unwrap();
    assert_eq!(provider.calls(), 1);

    let never_fetched = model
        .get_cache(&[FileEntry::file("B")], &thumbnail)
        .await
        .unwrap();
    assert!(never_fetched[0].value("thumbnail").is_unknown());
}

#[tokio::test]
async fn test_snapshot_survives_clear_all() {
    let (model, provider) = setup(GatedProvider::gated(7));
    let entry = FileEntry::file("A");
    let size = names(&["size"]);

    let fetch = spawn_get(&model, vec![entry.clone()], size.clone());
    wait_for_calls(&provider, 1).await;

    model.clear_all_cache().await;
    provider.release();

    let bags = within(fetch).await.unwrap().unwrap();
    assert_eq!(bags[0].value("size"), &PropertyValue::present(7));

    // The cleared row is not resurrected by the late result
    assert!(!model.has_fresh_cache(&[entry.url.clone()], &size).await);
    assert_eq!(model.stats().await.entries, 0);
}

#[tokio::test]
async fn test_dropped_caller_does_not_strand_others() {
    let (model, provider) = setup(GatedProvider::gated(7));
    let entries = vec![FileEntry::file("A")];
    let size = names(&["size"]);

    let owner = spawn_get(&model, entries.clone(), size.clone());
    wait_for_calls(&provider, 1).await;
    let follower = spawn_get(&model, entries.clone(), size.clone());
    wait_for_pending(&model, 2).await;

    owner.abort();
    provider.release();

    let bags = within(follower).await.unwrap().unwrap();
    assert_eq!(bags[0].value("size"), &PropertyValue::present(7));
    assert_eq!(model.pending_requests().await, 0);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_update_skips_entries_without_live_row() {
    let (model, _provider) = setup(GatedProvider::new(7));
    let size = names(&["size"]);

    model
        .update(&["ghost".to_string()], &size, &[vec![PropertyValue::present(1)]])
        .await
        .unwrap();

    assert!(!model.has_fresh_cache(&["ghost".to_string()], &size).await);
    assert_eq!(model.stats().await.entries, 0);
}

#[tokio::test]
async fn test_update_consults_resolver() {
    let provider = Arc::new(GatedProvider::new(7));
    let aggregator = ProviderAggregator::new(vec![provider.clone()]).unwrap();
    let table = Arc::new(EntryTable::new());
    table.insert(FileEntry::file("A"));

    let model = MetadataModel::with_resolver(aggregator, CacheConfig::default(), table.clone()).unwrap();
    let size = names(&["size"]);

    model
        .update(
            &["A".to_string(), "gone".to_string()],
            &size,
            &[vec![PropertyValue::present(1)], vec![PropertyValue::present(2)]],
        )
        .await
        .unwrap();

    assert!(model.has_fresh_cache(&["A".to_string()], &size).await);
    assert!(!model.has_fresh_cache(&["gone".to_string()], &size).await);

    let bags = model.get(&[FileEntry::file("A")], &size).await.unwrap();
    assert_eq!(bags[0].value("size"), &PropertyValue::present(1));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_update_marks_unlisted_values_absent() {
    let (model, _provider) = setup(GatedProvider::new(7));
    let entry = FileEntry::file("A");
    model.get(&[entry.clone()], &names(&["size"])).await.unwrap();

    model
        .update(
            &[entry.url.clone()],
            &names(&["size", "owner"]),
            &[vec![PropertyValue::present(3), PropertyValue::Unknown]],
        )
        .await
        .unwrap();

    let cached = model
        .get_cache(&[entry], &names(&["size", "owner"]))
        .await
        .unwrap();
    assert_eq!(cached[0].value("size"), &PropertyValue::present(3));
    assert!(cached[0].value("owner").is_absent());
}

#[tokio::test]
async fn test_change_events() {
    let (model, _provider) = setup(GatedProvider::new(7));
    let mut events = model.subscribe();
    let entry = FileEntry::file("A");

    model.get(&[entry.clone()], &names(&["size"])).await.unwrap();
    model.notify_entries_changed(&[entry.clone()]).await;
    model.notify_entries_removed(&[entry.url.clone()]).await;
    model.clear_all_cache().await;

    let updated = events.try_recv().unwrap();
    assert_eq!(updated.kind, CacheEventKind::Updated);
    assert_eq!(updated.keys, vec!["A".to_string()]);

    let invalidated = events.try_recv().unwrap();
    assert_eq!(invalidated.kind, CacheEventKind::Invalidated);
    assert!(invalidated.generation > updated.generation);

    assert_eq!(events.try_recv().unwrap().kind, CacheEventKind::Cleared);

    let cleared = events.try_recv().unwrap();
    assert_eq!(cleared.kind, CacheEventKind::ClearedAll);
    assert!(cleared.keys.is_empty());

    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_lru_eviction_bounds_rows() {
    let config = CacheConfig::builder().max_entries(2).build();
    let (model, provider) = setup_with(GatedProvider::new(7), config);
    let mut events = model.subscribe();
    let size = names(&["size"]);
    let entries = vec![
        FileEntry::file("a"),
        FileEntry::file("b"),
        FileEntry::file("c"),
    ];

    for entry in &entries {
        model.get(&[entry.clone()], &size).await.unwrap();
    }

    let stats = model.stats().await;
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.evictions, 1);
    assert!(!model.has_fresh_cache(&["a".to_string()], &size).await);
    assert!(model.has_fresh_cache(&urls(&entries[1..]), &size).await);

    let evicted = std::iter::from_fn(|| events.try_recv().ok())
        .find(|event| event.kind == CacheEventKind::Evicted)
        .unwrap();
    assert_eq!(evicted.keys, vec!["a".to_string()]);

    // An evicted row is simply fetched again
    model.get(&[entries[0].clone()], &size).await.unwrap();
    assert_eq!(provider.calls(), 4);
}
