// ── Generic reactive entity collection ──
//
// Concurrent storage keyed by registry-assigned numeric ids, with
// push-based change notification via `watch` channels.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

/// Anything stored in an [`EntityCollection`].
pub(crate) trait Keyed {
    type Id: Copy + Eq + Hash + Ord + Send + Sync + 'static;

    fn key(&self) -> Self::Id;
}

/// A reactive collection for a single entity type.
///
/// Uses `DashMap` for concurrent lookups and a `watch` channel for
/// push-based change notification. Every mutation rebuilds the id-ordered
/// snapshot that subscribers receive.
pub(crate) struct EntityCollection<T: Keyed + Clone + Send + Sync + 'static> {
    by_id: DashMap<T::Id, Arc<T>>,

    /// Full snapshot ordered by id, rebuilt on mutation.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Keyed + Clone + Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_id: DashMap::new(),
            snapshot,
        }
    }

    /// Insert or replace an entity. Returns `true` if the id was new.
    pub(crate) fn upsert(&self, entity: T) -> bool {
        let is_new = self.by_id.insert(entity.key(), Arc::new(entity)).is_none();
        self.publish();
        is_new
    }

    /// Apply `f` to the stored entity under its shard lock.
    ///
    /// Updates to the same id are serialized; different ids proceed in
    /// parallel. `f` must not block. Returns the updated entity and `f`'s
    /// output, or `None` if the id is unknown.
    pub(crate) fn update<R>(&self, id: T::Id, f: impl FnOnce(&mut T) -> R) -> Option<(Arc<T>, R)> {
        let (updated, out) = {
            let mut entry = self.by_id.get_mut(&id)?;
            let mut next = T::clone(entry.value());
            let out = f(&mut next);
            let next = Arc::new(next);
            *entry.value_mut() = Arc::clone(&next);
            (next, out)
        };
        self.publish();
        Some((updated, out))
    }

    /// Apply `f` to every entity, one shard lock at a time, then publish once.
    /// Returns the ids for which `f` reported a change.
    pub(crate) fn update_all(&self, mut f: impl FnMut(&mut T) -> bool) -> Vec<T::Id> {
        let mut changed = Vec::new();
        for mut entry in self.by_id.iter_mut() {
            let mut next = T::clone(entry.value());
            if f(&mut next) {
                changed.push(*entry.key());
                *entry.value_mut() = Arc::new(next);
            }
        }
        if !changed.is_empty() {
            changed.sort_unstable();
            self.publish();
        }
        changed
    }

    /// Remove an entity by id. Returns the removed entity if it existed.
    pub(crate) fn remove(&self, id: T::Id) -> Option<Arc<T>> {
        let removed = self.by_id.remove(&id).map(|(_, v)| v);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    pub(crate) fn get(&self, id: T::Id) -> Option<Arc<T>> {
        self.by_id.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Collect all values into an id-ordered vec and broadcast to subscribers.
    fn publish(&self) {
        let mut values: Vec<Arc<T>> = self.by_id.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_unstable_by_key(|v| v.key());
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: u64,
        value: &'static str,
    }

    impl Keyed for Item {
        type Id = u64;

        fn key(&self) -> u64 {
            self.id
        }
    }

    fn item(id: u64, value: &'static str) -> Item {
        Item { id, value }
    }

    #[test]
    fn upsert_returns_true_for_new_key() {
        let col = EntityCollection::new();
        assert!(col.upsert(item(1, "hello")));
    }

    #[test]
    fn upsert_returns_false_for_existing_key() {
        let col = EntityCollection::new();
        col.upsert(item(1, "hello"));
        assert!(!col.upsert(item(1, "world")));
        assert_eq!(col.get(1).unwrap().value, "world");
    }

    #[test]
    fn update_mutates_in_place_and_reports() {
        let col = EntityCollection::new();
        col.upsert(item(1, "a"));
        let (updated, was) = col
            .update(1, |i| std::mem::replace(&mut i.value, "b"))
            .unwrap();
        assert_eq!(was, "a");
        assert_eq!(updated.value, "b");
        assert_eq!(col.get(1).unwrap().value, "b");
        assert!(col.update(99, |_| ()).is_none());
    }

    #[test]
    fn update_all_only_publishes_changes() {
        let col = EntityCollection::new();
        col.upsert(item(2, "x"));
        col.upsert(item(1, "y"));
        let mut rx = col.subscribe();

        let changed = col.update_all(|_| false);
        assert!(changed.is_empty());
        assert!(!rx.has_changed().unwrap());

        let changed = col.update_all(|i| {
            i.value = "z";
            true
        });
        assert_eq!(changed, vec![1, 2]);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().iter().all(|i| i.value == "z"));
    }

    #[test]
    fn remove_cleans_up() {
        let col = EntityCollection::new();
        col.upsert(item(1, "hello"));

        let removed = col.remove(1);
        assert_eq!(removed.unwrap().value, "hello");
        assert!(col.get(1).is_none());
        assert!(col.is_empty());
        assert!(col.remove(1).is_none());
    }

    #[test]
    fn snapshot_is_ordered_by_id() {
        let col = EntityCollection::new();
        col.upsert(item(3, "c"));
        col.upsert(item(1, "a"));
        col.upsert(item(2, "b"));

        let ids: Vec<u64> = col.snapshot().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(col.len(), 3);
    }

    #[tokio::test]
    async fn subscribers_see_mutations() {
        let col = EntityCollection::new();
        let mut rx = col.subscribe();
        col.upsert(item(1, "a"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().len(), 1);
    }
}
