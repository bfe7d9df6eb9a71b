//! SmartCollection - rule and folder driven membership maintenance.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::engine::{AssetResolver, QueryEngine, SearchHit};
use crate::cancel::SearchVersionTracker;
use crate::collection::{LibraryCollection, DEFAULT_EVENT_CAPACITY};
use crate::config::SmartCollectionConfig;
use crate::error::{CollectionError, Result};
use crate::query::{build_combined_query, FolderFilter, FolderFilterSet};
use crate::registry::ItemRegistry;
use crate::rules::{CompositeRuleSet, RuleSet};
use crate::types::{
    Asset, ChangeKind, CollectionEvent, CollectionStatus, LibraryItem, SearchState,
};

/// An in-flight full refresh. Dropping the session aborts its task unless the
/// session already completed.
#[derive(Debug)]
struct SearchSession {
    version: u64,
    task: Option<JoinHandle<()>>,
}

impl SearchSession {
    /// Releases a session whose task is the caller, without aborting it.
    fn complete(mut self) {
        self.task.take();
    }
}

impl Drop for SearchSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[derive(Debug, Default)]
struct RefreshStats {
    last_refresh_at: Option<u64>,
    last_hit_count: usize,
    last_skipped: usize,
    refresh_count: u64,
}

#[derive(Debug)]
struct Membership {
    items: LibraryCollection,
    stats: RefreshStats,
}

struct SmartCollectionInner {
    name: String,
    rules: RwLock<Arc<dyn RuleSet>>,
    folders: RwLock<FolderFilterSet>,
    membership: Mutex<Membership>,
    versions: SearchVersionTracker,
    session: Mutex<Option<SearchSession>>,
    searching: watch::Sender<bool>,
    engine: Arc<dyn QueryEngine>,
    resolver: Arc<dyn AssetResolver>,
    registry: Arc<ItemRegistry>,
    runtime: Handle,
}

impl std::fmt::Debug for SmartCollectionInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartCollectionInner")
            .field("name", &self.name)
            .field("folders", &*self.folders.read())
            .field("generation", &self.versions.current_version())
            .field("engine", &"<query engine>")
            .finish()
    }
}

impl SmartCollectionInner {
    fn combined_query(&self) -> String {
        let folder_fragment = self.folders.read().build_query_fragment();
        let rule_fragment = self.rules.read().search_query();
        build_combined_query(&folder_fragment, &rule_fragment)
    }

    fn is_addable_locked(&self, items: &LibraryCollection, item: &LibraryItem) -> bool {
        items.is_addable(item)
            && self.folders.read().matches(item.asset_path())
            && !self.rules.read().search_query().trim().is_empty()
    }

    /// Replaces membership with the resolved hits of search `version`.
    ///
    /// Returns `false` without touching membership when `version` has been
    /// superseded. Lock order is session, then membership, the same as
    /// `trigger_refresh`; generation bumps and searching flag updates only
    /// happen under both, so a stale session cannot overwrite a newer one.
    fn apply_search_results(&self, version: u64, hits: Vec<SearchHit>, started: Instant) -> bool {
        let mut session = self.session.lock();
        let mut membership = self.membership.lock();
        if !self.versions.is_current(version) {
            log::debug!(
                "smart collection discarding superseded results name={} generation={} current={}",
                self.name,
                version,
                self.versions.current_version(),
            );
            return false;
        }

        if session.as_ref().is_some_and(|current| current.version == version) {
            if let Some(finished) = session.take() {
                finished.complete();
            }
        }

        membership.items.clear_items();

        let mut added = Vec::new();
        let mut skipped = 0usize;
        for hit in &hits {
            let Some(asset) = self.resolver.resolve(&hit.path) else {
                skipped += 1;
                log::debug!(
                    "smart collection skipping stale hit name={} path={}",
                    self.name,
                    hit.path
                );
                continue;
            };
            let item = self.registry.item_for(&asset);
            if membership.items.add_item(item.clone(), false) {
                added.push(item);
            }
        }

        membership.stats = RefreshStats {
            last_refresh_at: Some(unix_now_secs()),
            last_hit_count: hits.len(),
            last_skipped: skipped,
            refresh_count: membership.stats.refresh_count + 1,
        };

        let added_count = added.len();
        if !added.is_empty() {
            membership
                .items
                .notify_items_changed(added, ChangeKind::Added);
        }
        self.searching.send_replace(false);

        log::info!(
            "smart collection refresh applied name={} generation={} hits={} added={} skipped={} elapsed_ms={}",
            self.name,
            version,
            hits.len(),
            added_count,
            skipped,
            started.elapsed().as_millis(),
        );
        true
    }
}

/// Builder for [`SmartCollection`].
pub struct SmartCollectionBuilder {
    config: SmartCollectionConfig,
    engine: Arc<dyn QueryEngine>,
    resolver: Arc<dyn AssetResolver>,
    rules: Arc<dyn RuleSet>,
    registry: Option<Arc<ItemRegistry>>,
    runtime: Option<Handle>,
    event_capacity: usize,
}

impl SmartCollectionBuilder {
    pub fn new(engine: Arc<dyn QueryEngine>, resolver: Arc<dyn AssetResolver>) -> Self {
        Self {
            config: SmartCollectionConfig::default(),
            engine,
            resolver,
            rules: Arc::new(CompositeRuleSet::default()),
            registry: None,
            runtime: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn with_config(mut self, config: SmartCollectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_rules(mut self, rules: Arc<dyn RuleSet>) -> Self {
        self.rules = rules;
        self
    }

    /// Shares an item registry with other collections.
    pub fn with_registry(mut self, registry: Arc<ItemRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Runtime used for search sessions. Defaults to the current runtime.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<SmartCollection> {
        let config = self.config.normalized();
        config.validate()?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|error| {
                CollectionError::Runtime(format!(
                    "smart collection {:?} requires a tokio runtime: {error}",
                    config.name
                ))
            })?,
        };
        let (searching, _) = watch::channel(false);

        log::debug!(
            "smart collection created name={} folders={} rules={}",
            config.name,
            config.folders.len(),
            self.rules.len(),
        );

        Ok(SmartCollection {
            inner: Arc::new(SmartCollectionInner {
                name: config.name,
                rules: RwLock::new(self.rules),
                folders: RwLock::new(config.folders),
                membership: Mutex::new(Membership {
                    items: LibraryCollection::new(self.event_capacity),
                    stats: RefreshStats::default(),
                }),
                versions: SearchVersionTracker::new(),
                session: Mutex::new(None),
                searching,
                engine: self.engine,
                resolver: self.resolver,
                registry: self.registry.unwrap_or_default(),
                runtime,
            }),
        })
    }
}

/// A collection whose membership follows a rule set and folder filters.
///
/// Membership is maintained two ways: [`SmartCollection::trigger_refresh`]
/// re-runs the combined query on the query engine, and
/// [`SmartCollection::incremental_update`] re-evaluates one item in place.
/// Calls are expected to come from a single owner; only the search
/// completion runs elsewhere.
#[derive(Debug)]
pub struct SmartCollection {
    inner: Arc<SmartCollectionInner>,
}

impl SmartCollection {
    pub fn builder(
        engine: Arc<dyn QueryEngine>,
        resolver: Arc<dyn AssetResolver>,
    ) -> SmartCollectionBuilder {
        SmartCollectionBuilder::new(engine, resolver)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The query a full refresh would submit right now.
    pub fn combined_query(&self) -> String {
        self.inner.combined_query()
    }

    /// Starts a full refresh, superseding any refresh still in flight.
    ///
    /// Does nothing beyond cancelling the previous session when neither
    /// rules nor folders produce a query.
    pub fn trigger_refresh(&self) {
        let inner = &self.inner;
        let mut session = inner.session.lock();

        let query = inner.combined_query();
        let version = {
            let _membership = inner.membership.lock();
            let version = inner.versions.next_version();
            inner.searching.send_replace(!query.is_empty());
            version
        };
        if let Some(previous) = session.take() {
            log::debug!(
                "smart collection superseding refresh name={} previous={} next={}",
                inner.name,
                previous.version,
                version,
            );
        }

        if query.is_empty() {
            log::debug!(
                "smart collection refresh skipped name={} generation={} reason=empty-query",
                inner.name,
                version,
            );
            return;
        }

        log::info!(
            "smart collection refresh started name={} generation={} query={:?}",
            inner.name,
            version,
            query,
        );

        let token = inner.versions.token_for_version(version);
        let task_inner = inner.clone();
        let task = inner.runtime.spawn(async move {
            let started = Instant::now();
            let hits = match task_inner.engine.execute(&query, token.clone()).await {
                Ok(hits) => hits,
                Err(error) => {
                    log::warn!(
                        "smart collection query failed name={} generation={}: {}",
                        task_inner.name,
                        version,
                        error
                    );
                    Vec::new()
                }
            };
            if token.is_cancelled().is_none() {
                return;
            }
            task_inner.apply_search_results(version, hits, started);
        });

        *session = Some(SearchSession {
            version,
            task: Some(task),
        });
    }

    /// Cancels the in-flight refresh, if any. Membership is left untouched.
    pub fn cancel_refresh(&self) -> bool {
        let mut session = self.inner.session.lock();
        let Some(previous) = session.take() else {
            return false;
        };
        {
            let _membership = self.inner.membership.lock();
            self.inner.versions.next_version();
            self.inner.searching.send_replace(false);
        }
        log::debug!(
            "smart collection refresh cancelled name={} generation={}",
            self.inner.name,
            previous.version,
        );
        true
    }

    pub fn is_searching(&self) -> bool {
        *self.inner.searching.borrow()
    }

    /// Waits until no refresh is in flight.
    pub async fn wait_for_refresh(&self) {
        let mut searching = self.inner.searching.subscribe();
        let _ = searching.wait_for(|searching| !*searching).await;
    }

    /// Re-evaluates a single item against rules and folders.
    ///
    /// Returns whether membership changed. With no rules and no folders
    /// nothing constrains membership and the item is left alone. A member
    /// that still matches takes the new instance, so a moved asset reports
    /// its current path.
    pub fn incremental_update(&self, item: &Arc<LibraryItem>) -> bool {
        let matched = {
            let rules = self.inner.rules.read();
            let folders = self.inner.folders.read();
            if rules.is_empty() && folders.is_empty() {
                return false;
            }
            rules.evaluate(item) && folders.matches(item.asset_path())
        };

        let mut membership = self.inner.membership.lock();
        if matched {
            if membership.items.add_item(item.clone(), true) {
                return true;
            }
            membership.items.replace_item(item.clone());
            false
        } else {
            membership.items.remove_item(item)
        }
    }

    /// Re-evaluates the canonical item of `asset`, e.g. after it was created,
    /// moved or edited.
    pub fn update_asset(&self, asset: &Asset) -> bool {
        let item = self.inner.registry.item_for(asset);
        self.incremental_update(&item)
    }

    /// Gate for manual additions.
    ///
    /// A collection without rule text never accepts items by hand, even when
    /// the folders match.
    pub fn is_addable(&self, item: &LibraryItem) -> bool {
        let membership = self.inner.membership.lock();
        self.inner.is_addable_locked(&membership.items, item)
    }

    /// Adds an item by hand if [`SmartCollection::is_addable`] allows it.
    pub fn add_item(&self, item: Arc<LibraryItem>) -> bool {
        let mut membership = self.inner.membership.lock();
        if !self.inner.is_addable_locked(&membership.items, &item) {
            return false;
        }
        membership.items.add_item(item, true)
    }

    pub fn remove_item(&self, item: &LibraryItem) -> bool {
        self.inner.membership.lock().items.remove_item(item)
    }

    pub fn contains(&self, item: &LibraryItem) -> bool {
        self.inner.membership.lock().items.contains(item)
    }

    /// Snapshot of the current members in insertion order.
    pub fn items(&self) -> Vec<Arc<LibraryItem>> {
        self.inner.membership.lock().items.items().to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner.membership.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.membership.lock().items.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CollectionEvent> {
        self.inner.membership.lock().items.subscribe()
    }

    pub fn rule_count(&self) -> usize {
        self.inner.rules.read().len()
    }

    /// Replaces the rule set. Membership is not re-evaluated until the next
    /// refresh or incremental update.
    pub fn set_rules(&self, rules: Arc<dyn RuleSet>) {
        *self.inner.rules.write() = rules;
    }

    pub fn folder_filters(&self) -> FolderFilterSet {
        self.inner.folders.read().clone()
    }

    pub fn set_folder_filters(&self, folders: FolderFilterSet) -> Result<()> {
        let config = SmartCollectionConfig {
            name: self.inner.name.clone(),
            folders,
        }
        .normalized();
        config.validate()?;
        *self.inner.folders.write() = config.folders;
        Ok(())
    }

    pub fn add_folder_filter(&self, filter: FolderFilter) -> Result<()> {
        let mut folders = self.folder_filters();
        folders.push(filter);
        self.set_folder_filters(folders)
    }

    pub fn remove_folder_filter(&self, index: usize) -> Option<FolderFilter> {
        self.inner.folders.write().remove(index)
    }

    pub fn status(&self) -> CollectionStatus {
        let membership = self.inner.membership.lock();
        CollectionStatus {
            name: self.inner.name.clone(),
            state: if self.is_searching() {
                SearchState::Searching
            } else {
                SearchState::Idle
            },
            generation: self.inner.versions.current_version(),
            members: membership.items.len(),
            last_refresh_at: membership.stats.last_refresh_at,
            last_hit_count: membership.stats.last_hit_count,
            last_skipped: membership.stats.last_skipped,
            refresh_count: membership.stats.refresh_count,
        }
    }

    #[cfg(test)]
    pub(crate) fn apply_search_results(&self, version: u64, hits: Vec<SearchHit>) -> bool {
        self.inner.apply_search_results(version, hits, Instant::now())
    }

    #[cfg(test)]
    pub(crate) fn current_generation(&self) -> u64 {
        self.inner.versions.current_version()
    }
}

impl Drop for SmartCollection {
    fn drop(&mut self) {
        let mut session = self.inner.session.lock();
        if session.take().is_some() {
            let _membership = self.inner.membership.lock();
            self.inner.versions.next_version();
        }
    }
}

fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
