//! Base library collection: item storage, add/remove primitives and change
//! notifications.

use std::sync::Arc;

use fnv::FnvHashMap;
use tokio::sync::broadcast;

use crate::types::{AssetKey, AssetKind, ChangeKind, CollectionEvent, LibraryItem};

/// Default capacity of the change notification channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Ordered item storage with change notifications.
///
/// Items keep their insertion order; membership is by asset key.
#[derive(Debug)]
pub struct LibraryCollection {
    items: Vec<Arc<LibraryItem>>,
    positions: FnvHashMap<AssetKey, usize>,
    sender: broadcast::Sender<CollectionEvent>,
}

impl Default for LibraryCollection {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl LibraryCollection {
    pub fn new(event_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(event_capacity.max(1));
        Self {
            items: Vec::new(),
            positions: FnvHashMap::default(),
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CollectionEvent> {
        self.sender.subscribe()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item: &LibraryItem) -> bool {
        self.positions.contains_key(item.key())
    }

    pub fn items(&self) -> &[Arc<LibraryItem>] {
        &self.items
    }

    /// Base eligibility: folders are never collected and members are not
    /// added twice.
    pub fn is_addable(&self, item: &LibraryItem) -> bool {
        item.kind() != AssetKind::Folder && !self.contains(item)
    }

    /// Adds `item`, returning whether membership changed.
    pub fn add_item(&mut self, item: Arc<LibraryItem>, notify: bool) -> bool {
        if self.contains(&item) {
            return false;
        }
        self.positions.insert(item.key().clone(), self.items.len());
        self.items.push(item.clone());
        if notify {
            self.notify_items_changed(vec![item], ChangeKind::Added);
        }
        true
    }

    /// Swaps the stored instance of a member for `item`, e.g. after the asset
    /// moved. Membership does not change, so nothing is published.
    ///
    /// Returns whether a stored instance was replaced.
    pub fn replace_item(&mut self, item: Arc<LibraryItem>) -> bool {
        let Some(&position) = self.positions.get(item.key()) else {
            return false;
        };
        if Arc::ptr_eq(&self.items[position], &item) {
            return false;
        }
        self.items[position] = item;
        true
    }

    /// Removes `item`, returning whether membership changed.
    pub fn remove_item(&mut self, item: &LibraryItem) -> bool {
        let Some(position) = self.positions.remove(item.key()) else {
            return false;
        };
        let removed = self.items.remove(position);
        for moved in &self.items[position..] {
            if let Some(slot) = self.positions.get_mut(moved.key()) {
                *slot -= 1;
            }
        }
        self.notify_items_changed(vec![removed], ChangeKind::Removed);
        true
    }

    /// Removes every item, emitting a single `Cleared` event when the
    /// collection was not already empty.
    pub fn clear_items(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let cleared = std::mem::take(&mut self.items);
        self.positions.clear();
        self.notify_items_changed(cleared, ChangeKind::Cleared);
    }

    /// Publishes a change notification. Having no subscribers is not an error.
    pub fn notify_items_changed(&self, items: Vec<Arc<LibraryItem>>, kind: ChangeKind) {
        let _ = self.sender.send(CollectionEvent { kind, items });
    }
}
