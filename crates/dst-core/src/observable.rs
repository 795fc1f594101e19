//! Observable keyed collections
//!
//! Insertion-ordered map plus a broadcast stream of changes. Subscribers get
//! keys, never references; they read values back through snapshots.

use indexmap::IndexMap;
use std::hash::Hash;
use tokio::sync::broadcast;

/// One change to an [`ObservableMap`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionChange<K> {
    Added(K),
    Updated(K),
    Removed(K),
    /// Whole content replaced or cleared
    Reset,
}

/// Ordered keyed collection announcing its changes
#[derive(Debug)]
pub struct ObservableMap<K, V> {
    items: IndexMap<K, V>,
    changes: broadcast::Sender<CollectionChange<K>>,
}

impl<K, V> ObservableMap<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    /// Create empty collection; `capacity` bounds lagging subscribers
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            items: IndexMap::new(),
            changes,
        }
    }

    fn announce(&self, change: CollectionChange<K>) {
        // no subscribers is fine
        let _ = self.changes.send(change);
    }

    /// Insert or replace; returns the previous value
    pub fn upsert(&mut self, key: K, value: V) -> Option<V> {
        let previous = self.items.insert(key.clone(), value);
        self.announce(if previous.is_some() {
            CollectionChange::Updated(key)
        } else {
            CollectionChange::Added(key)
        });
        previous
    }

    /// Mutate an entry in place; returns whether it existed
    pub fn update(&mut self, key: &K, f: impl FnOnce(&mut V)) -> bool {
        match self.items.get_mut(key) {
            Some(value) => {
                f(value);
                self.announce(CollectionChange::Updated(key.clone()));
                true
            }
            None => false,
        }
    }

    /// Remove, keeping the order of the rest
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.items.shift_remove(key);
        if removed.is_some() {
            self.announce(CollectionChange::Removed(key.clone()));
        }
        removed
    }

    /// Keep entries matching `keep`; returns the removed keys
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) -> Vec<K> {
        let removed: Vec<K> = self
            .items
            .iter()
            .filter(|(k, v)| !keep(k, v))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &removed {
            self.remove(key);
        }
        removed
    }

    /// Replace all content
    pub fn reset(&mut self, items: impl IntoIterator<Item = (K, V)>) {
        self.items = items.into_iter().collect();
        self.announce(CollectionChange::Reset);
    }

    pub fn clear(&mut self) {
        if !self.items.is_empty() {
            self.items.clear();
            self.announce(CollectionChange::Reset);
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.items.get(key)
    }

    #[inline]
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.items.contains_key(key)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.items.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.items.iter()
    }

    /// Cloned values in order
    #[must_use]
    pub fn values(&self) -> Vec<V> {
        self.items.values().cloned().collect()
    }

    /// Change stream
    pub fn subscribe(&self) -> broadcast::Receiver<CollectionChange<K>> {
        self.changes.subscribe()
    }
}
