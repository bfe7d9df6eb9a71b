use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;

use async_trait::async_trait;
use fnv::FnvHashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{timeout, Duration};

use super::{AssetResolver, MemoryAssetResolver, QueryEngine, SearchHit, SmartCollection};
use crate::cancel::CancellationToken;
use crate::config::SmartCollectionConfig;
use crate::error::{CollectionError, Result};
use crate::query::{FolderFilter, FolderFilterSet, FolderMatchOption};
use crate::rules::{CompositeRuleSet, PredicateRule, RuleMatch, RuleSet};
use crate::types::{Asset, ChangeKind, LibraryItem, SearchState};

/// Returns the same hits for every query and records what it was asked.
#[derive(Default)]
struct FixedEngine {
    hits: Vec<SearchHit>,
    queries: Mutex<Vec<String>>,
}

impl FixedEngine {
    fn new(paths: &[&str]) -> Self {
        Self {
            hits: paths.iter().map(|path| SearchHit::new(*path)).collect(),
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl QueryEngine for FixedEngine {
    async fn execute(&self, query: &str, _cancel: CancellationToken) -> Result<Vec<SearchHit>> {
        self.queries.lock().push(query.to_string());
        Ok(self.hits.clone())
    }
}

/// Holds each query until its gate is opened.
#[derive(Default)]
struct GatedEngine {
    responses: Mutex<FnvHashMap<String, (Arc<Notify>, Vec<SearchHit>)>>,
    calls: AtomicUsize,
}

impl GatedEngine {
    fn respond(&self, query: &str, paths: &[&str]) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        let hits = paths.iter().map(|path| SearchHit::new(*path)).collect();
        self.responses
            .lock()
            .insert(query.to_string(), (gate.clone(), hits));
        gate
    }
}

#[async_trait]
impl QueryEngine for GatedEngine {
    async fn execute(&self, query: &str, _cancel: CancellationToken) -> Result<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.responses.lock().get(query).cloned();
        let Some((gate, hits)) = response else {
            return Ok(Vec::new());
        };
        gate.notified().await;
        Ok(hits)
    }
}

struct FailingEngine;

#[async_trait]
impl QueryEngine for FailingEngine {
    async fn execute(&self, _query: &str, _cancel: CancellationToken) -> Result<Vec<SearchHit>> {
        Err(CollectionError::Query("index unavailable".to_string()))
    }
}

/// Blocks its first lookup until released, holding a completion mid-apply.
struct PausingResolver {
    assets: MemoryAssetResolver,
    pause: Mutex<Option<(std_mpsc::Sender<()>, std_mpsc::Receiver<()>)>>,
}

impl AssetResolver for PausingResolver {
    fn resolve(&self, path: &str) -> Option<Asset> {
        let pause = self.pause.lock().take();
        if let Some((entered, release)) = pause {
            let _ = entered.send(());
            let _ = release.recv();
        }
        self.assets.resolve(path)
    }
}

fn resolver() -> Arc<MemoryAssetResolver> {
    Arc::new(MemoryAssetResolver::with_assets([
        Asset::new("hero", "Assets/Art/hero.png"),
        Asset::new("villain", "Assets/Art/villain.png"),
        Asset::new("theme", "Assets/Audio/theme.ogg"),
        Asset::folder("art", "Assets/Art"),
    ]))
}

fn rules(fragment: &str) -> Arc<dyn RuleSet> {
    Arc::new(
        CompositeRuleSet::new(RuleMatch::All).with_rule(PredicateRule::new(
            fragment.to_string(),
            |item: &LibraryItem| item.asset_path().ends_with(".png"),
        )),
    )
}

fn item(key: &str, path: &str) -> Arc<LibraryItem> {
    Arc::new(LibraryItem::from_asset(&Asset::new(key, path)))
}

fn art_folder() -> SmartCollectionConfig {
    SmartCollectionConfig::new("Art")
        .with_folder(FolderFilter::include("Assets/Art", FolderMatchOption::Recursive))
}

async fn settle(collection: &SmartCollection) {
    timeout(Duration::from_secs(2), collection.wait_for_refresh())
        .await
        .expect("refresh timed out");
}

#[tokio::test]
async fn refresh_skips_stale_hits_and_notifies_once() {
    let engine = Arc::new(FixedEngine::new(&[
        "Assets/Art/hero.png",
        "Assets/Art/deleted.png",
        "Assets/Art/villain.png",
    ]));
    let collection = SmartCollection::builder(engine.clone(), resolver())
        .with_config(art_folder())
        .with_rules(rules("t:texture"))
        .build()
        .expect("build collection");
    let mut events = collection.subscribe();

    collection.trigger_refresh();
    assert!(collection.is_searching());
    settle(&collection).await;

    assert!(!collection.is_searching());
    assert_eq!(
        engine.queries.lock().as_slice(),
        &["p: (Assets/Art/) and (t:texture)".to_string()]
    );
    let members = collection
        .items()
        .iter()
        .map(|item| item.key().to_string())
        .collect::<Vec<_>>();
    assert_eq!(members, vec!["hero", "villain"]);

    let added = events.try_recv().expect("added event");
    assert_eq!(added.kind, ChangeKind::Added);
    assert_eq!(added.items, collection.items());
    assert!(events.try_recv().is_err(), "expected a single notification");

    let status = collection.status();
    assert_eq!(status.state, SearchState::Idle);
    assert_eq!(status.generation, 1);
    assert_eq!(status.members, 2);
    assert_eq!(status.last_hit_count, 3);
    assert_eq!(status.last_skipped, 1);
    assert_eq!(status.refresh_count, 1);
    assert!(status.last_refresh_at.is_some());
}

#[tokio::test]
async fn refresh_replaces_previous_membership() {
    let engine = Arc::new(FixedEngine::new(&["Assets/Art/hero.png"]));
    let collection = SmartCollection::builder(engine, resolver())
        .with_rules(rules("t:texture"))
        .build()
        .expect("build collection");
    assert!(collection.add_item(item("villain", "Assets/Art/villain.png")));

    let mut events = collection.subscribe();
    collection.trigger_refresh();
    settle(&collection).await;

    assert_eq!(collection.len(), 1);
    assert!(collection.contains(&item("hero", "Assets/Art/hero.png")));

    let cleared = events.try_recv().expect("cleared event");
    assert_eq!(cleared.kind, ChangeKind::Cleared);
    let added = events.try_recv().expect("added event");
    assert_eq!(added.kind, ChangeKind::Added);
    assert_eq!(added.items.len(), 1);
}

#[tokio::test]
async fn newer_refresh_supersedes_in_flight_one() {
    let engine = Arc::new(GatedEngine::default());
    let first_gate = engine.respond("p: t:first", &["Assets/Audio/theme.ogg"]);
    let second_gate = engine.respond("p: t:second", &["Assets/Art/hero.png"]);
    let collection = SmartCollection::builder(engine.clone(), resolver())
        .with_rules(rules("t:first"))
        .build()
        .expect("build collection");

    collection.trigger_refresh();
    tokio::task::yield_now().await;
    let first_generation = collection.current_generation();

    collection.set_rules(rules("t:second"));
    collection.trigger_refresh();
    assert!(collection.is_searching());

    second_gate.notify_one();
    settle(&collection).await;
    assert!(engine.calls.load(Ordering::SeqCst) >= 1);
    first_gate.notify_one();
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }

    let members = collection.items();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].key().as_str(), "hero");

    // A late completion of the first session is ignored.
    assert!(!collection.apply_search_results(
        first_generation,
        vec![SearchHit::new("Assets/Audio/theme.ogg")],
    ));
    assert_eq!(collection.items(), members);
    assert_eq!(collection.status().refresh_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn superseded_completion_keeps_newer_search_flag() {
    let (entered_tx, entered_rx) = std_mpsc::channel();
    let (release_tx, release_rx) = std_mpsc::channel();
    let resolver = Arc::new(PausingResolver {
        assets: MemoryAssetResolver::with_assets([
            Asset::new("hero", "Assets/Art/hero.png"),
            Asset::new("villain", "Assets/Art/villain.png"),
        ]),
        pause: Mutex::new(Some((entered_tx, release_rx))),
    });
    let engine = Arc::new(GatedEngine::default());
    engine
        .respond("p: t:first", &["Assets/Art/hero.png"])
        .notify_one();
    let _second_gate = engine.respond("p: t:second", &["Assets/Art/villain.png"]);
    let collection = Arc::new(
        SmartCollection::builder(engine, resolver)
            .with_rules(rules("t:first"))
            .build()
            .expect("build collection"),
    );

    collection.trigger_refresh();
    tokio::task::spawn_blocking(move || entered_rx.recv_timeout(Duration::from_secs(2)))
        .await
        .expect("join")
        .expect("first completion reached the resolver");

    collection.set_rules(rules("t:second"));
    let trigger = {
        let collection = collection.clone();
        tokio::task::spawn_blocking(move || collection.trigger_refresh())
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    release_tx.send(()).expect("release resolver");
    trigger.await.expect("trigger joined");

    assert!(collection.is_searching());
    let status = collection.status();
    assert_eq!(status.state, SearchState::Searching);
    assert_eq!(status.generation, 2);
    assert_eq!(status.refresh_count, 1);
    assert!(
        timeout(Duration::from_millis(100), collection.wait_for_refresh())
            .await
            .is_err(),
        "second refresh is still in flight"
    );
}

#[tokio::test]
async fn completed_refresh_leaves_nothing_to_cancel() {
    let engine = Arc::new(FixedEngine::new(&["Assets/Art/hero.png"]));
    let collection = SmartCollection::builder(engine, resolver())
        .with_rules(rules("t:texture"))
        .build()
        .expect("build collection");

    collection.trigger_refresh();
    settle(&collection).await;
    let generation = collection.current_generation();

    assert!(!collection.cancel_refresh());
    assert_eq!(collection.current_generation(), generation);
    assert!(!collection.is_searching());
    assert_eq!(collection.len(), 1);
}

#[tokio::test]
async fn cancel_refresh_keeps_membership() {
    let engine = Arc::new(GatedEngine::default());
    let gate = engine.respond("p: t:texture", &["Assets/Art/hero.png"]);
    let collection = SmartCollection::builder(engine, resolver())
        .with_rules(rules("t:texture"))
        .build()
        .expect("build collection");
    let villain = item("villain", "Assets/Art/villain.png");
    assert!(collection.incremental_update(&villain));

    collection.trigger_refresh();
    assert!(collection.cancel_refresh());
    assert!(!collection.is_searching());
    assert!(!collection.cancel_refresh());

    gate.notify_one();
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert_eq!(collection.items(), vec![villain]);
}

#[tokio::test]
async fn empty_query_refresh_is_a_noop() {
    let engine = Arc::new(FixedEngine::new(&["Assets/Art/hero.png"]));
    let collection = SmartCollection::builder(engine.clone(), resolver())
        .build()
        .expect("build collection");

    assert_eq!(collection.combined_query(), "");
    collection.trigger_refresh();
    assert!(!collection.is_searching());
    settle(&collection).await;

    assert!(engine.queries.lock().is_empty());
    assert!(collection.is_empty());
}

#[tokio::test]
async fn failed_query_yields_empty_membership() {
    let collection = SmartCollection::builder(Arc::new(FailingEngine), resolver())
        .with_config(art_folder())
        .build()
        .expect("build collection");
    assert!(collection.incremental_update(&item("hero", "Assets/Art/hero.png")));

    collection.trigger_refresh();
    settle(&collection).await;

    assert!(collection.is_empty());
    assert_eq!(collection.status().refresh_count, 1);
    assert_eq!(collection.status().last_hit_count, 0);
}

#[tokio::test]
async fn incremental_update_without_constraints_is_a_noop() {
    let engine = Arc::new(FixedEngine::default());
    let collection = SmartCollection::builder(engine.clone(), resolver())
        .build()
        .expect("build collection");

    assert!(!collection.incremental_update(&item("hero", "Assets/Art/hero.png")));
    assert!(!collection.incremental_update(&item("theme", "Assets/Audio/theme.ogg")));
    assert!(collection.is_empty());
    assert!(engine.queries.lock().is_empty());
}

#[tokio::test]
async fn incremental_update_reports_membership_flips_once() {
    let engine = Arc::new(FixedEngine::default());
    let collection = SmartCollection::builder(engine.clone(), resolver())
        .with_config(art_folder())
        .build()
        .expect("build collection");
    let mut events = collection.subscribe();

    let hero = Asset::new("hero", "Assets/Art/hero.png");
    assert!(collection.update_asset(&hero));
    assert!(!collection.update_asset(&hero));
    assert_eq!(collection.len(), 1);

    let moved = Asset::new("hero", "Assets/Audio/hero.png");
    assert!(collection.update_asset(&moved));
    assert!(!collection.update_asset(&moved));
    assert!(collection.is_empty());

    assert_eq!(events.try_recv().expect("added").kind, ChangeKind::Added);
    assert_eq!(events.try_recv().expect("removed").kind, ChangeKind::Removed);
    assert!(events.try_recv().is_err());
    assert!(engine.queries.lock().is_empty());
}

#[tokio::test]
async fn moved_member_reports_current_path() {
    let collection = SmartCollection::builder(Arc::new(FixedEngine::default()), resolver())
        .with_config(art_folder())
        .build()
        .expect("build collection");
    let mut events = collection.subscribe();

    assert!(collection.update_asset(&Asset::new("hero", "Assets/Art/hero.png")));
    assert!(!collection.update_asset(&Asset::new("hero", "Assets/Art/chars/hero.png")));

    let members = collection.items();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].asset_path(), "Assets/Art/chars/hero.png");
    assert_eq!(events.try_recv().expect("added").kind, ChangeKind::Added);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn incremental_update_requires_rules_and_folders() {
    let collection = SmartCollection::builder(Arc::new(FixedEngine::default()), resolver())
        .with_config(art_folder())
        .with_rules(rules("t:texture"))
        .build()
        .expect("build collection");

    assert!(collection.incremental_update(&item("hero", "Assets/Art/hero.png")));
    assert!(!collection.incremental_update(&item("sheet", "Assets/Art/sheet.psd")));
    assert!(!collection.incremental_update(&item("logo", "Assets/UI/logo.png")));
    assert_eq!(collection.len(), 1);
}

#[tokio::test]
async fn is_addable_requires_rule_text() {
    let collection = SmartCollection::builder(Arc::new(FixedEngine::default()), resolver())
        .with_config(art_folder())
        .build()
        .expect("build collection");
    let hero = item("hero", "Assets/Art/hero.png");

    assert!(!collection.is_addable(&hero));
    assert!(!collection.add_item(hero.clone()));

    collection.set_rules(rules("   "));
    assert!(!collection.is_addable(&hero));

    collection.set_rules(rules("t:texture"));
    assert!(collection.is_addable(&hero));
    assert!(!collection.is_addable(&item("theme", "Assets/Audio/theme.ogg")));
    assert!(collection.add_item(hero.clone()));
    assert!(!collection.is_addable(&hero));

    let folder = Arc::new(LibraryItem::from_asset(&Asset::folder("ui", "Assets/Art/UI")));
    assert!(!collection.is_addable(&folder));
}

#[tokio::test]
async fn folder_filters_can_be_edited() {
    let collection = SmartCollection::builder(Arc::new(FixedEngine::default()), resolver())
        .with_config(art_folder())
        .build()
        .expect("build collection");

    collection
        .add_folder_filter(FolderFilter::exclude(
            "Assets/Art/Temp",
            FolderMatchOption::Recursive,
        ))
        .expect("add filter");
    assert_eq!(
        collection.combined_query(),
        "p: ((Assets/Art/) and (-Assets/Art/Temp/))"
    );

    let error = collection
        .add_folder_filter(FolderFilter::include("Assets/Art/", FolderMatchOption::TopOnly))
        .expect_err("duplicate folder");
    assert!(matches!(error, CollectionError::Config(_)));

    assert!(collection.remove_folder_filter(0).is_some());
    assert_eq!(
        collection.combined_query(),
        "p: (a:assets and (-Assets/Art/Temp/))"
    );

    collection
        .set_folder_filters(FolderFilterSet::default())
        .expect("clear filters");
    assert_eq!(collection.folder_filters().len(), 0);
}

#[test]
fn build_without_runtime_fails() {
    let error = SmartCollection::builder(Arc::new(FixedEngine::default()), resolver())
        .build()
        .expect_err("no runtime");
    assert!(matches!(error, CollectionError::Runtime(_)));
}
