// ── Coordinator child registry ──
//
// Concurrent storage for the resources a coordinator owns, with a host
// index and push-based change notification via `watch` channels. Writers
// are serialized so snapshots are published in mutation order.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

use crate::error::CoreError;

/// A concurrent, reactive collection keyed by identity.
///
/// Uses `DashMap` for lookups and `watch` channels for change
/// notification. Insertion is insert-if-absent. Every mutation holds the
/// writer lock until its snapshot is published, so the latest snapshot
/// always reflects every completed mutation.
pub(crate) struct EntityCollection<T: Send + Sync + 'static> {
    /// Primary storage: identity -> entity.
    by_key: DashMap<String, Arc<T>>,

    /// Secondary index: host -> identity.
    host_to_key: DashMap<String, String>,

    /// Insertion order, so snapshots are stable.
    order: DashMap<String, u64>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, rebuilt on mutation.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,

    /// Serializes mutations with their snapshot rebuild.
    writer: Mutex<()>,
}

impl<T: Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            host_to_key: DashMap::new(),
            order: DashMap::new(),
            version,
            snapshot,
            writer: Mutex::new(()),
        }
    }

    /// Insert a new entity. A key that is already present is an error and
    /// leaves the existing entity in place.
    pub(crate) fn insert(
        &self,
        key: String,
        host: Option<&str>,
        entity: Arc<T>,
    ) -> Result<(), CoreError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        match self.by_key.entry(key.clone()) {
            Entry::Occupied(_) => {
                return Err(CoreError::semantic(format!(
                    "A resource with identity '{key}' is already registered."
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(entity);
            }
        }

        if let Some(host) = host {
            self.host_to_key.insert(host.to_owned(), key.clone());
        }
        let seq = *self.version.borrow();
        self.order.insert(key, seq);

        self.rebuild_snapshot();
        self.bump_version();
        Ok(())
    }

    /// Remove an entity by identity. Returns the removed entity if it existed.
    pub(crate) fn remove(&self, key: &str) -> Option<Arc<T>> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.host_to_key.retain(|_, k| k != key);
            self.order.remove(key);
            self.rebuild_snapshot();
            self.bump_version();
        }
        removed
    }

    /// Look up an entity by identity.
    pub(crate) fn get_by_key(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Look up an entity by the host it was declared with.
    pub(crate) fn get_by_host(&self, host: &str) -> Option<Arc<T>> {
        let key = self.host_to_key.get(host)?;
        self.by_key
            .get(key.value().as_str())
            .map(|r| Arc::clone(r.value()))
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
        self.by_key.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Collect values in insertion order and broadcast to subscribers.
    fn rebuild_snapshot(&self) {
        let mut ordered: Vec<(u64, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| {
                let seq = self.order.get(r.key()).map_or(u64::MAX, |s| *s.value());
                (seq, Arc::clone(r.value()))
            })
            .collect();
        ordered.sort_by_key(|(seq, _)| *seq);
        let values = ordered.into_iter().map(|(_, v)| v).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn insert_rejects_duplicate_key() {
        let col: EntityCollection<String> = EntityCollection::new();
        col.insert("node1".into(), Some("node1.lab"), Arc::new("first".into()))
            .unwrap();

        let err = col
            .insert("node1".into(), None, Arc::new("second".into()))
            .unwrap_err();
        assert!(matches!(err, CoreError::Semantic { .. }));
        assert_eq!(*col.get_by_key("node1").unwrap(), "first");
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn remove_cleans_up_host_index() {
        let col: EntityCollection<String> = EntityCollection::new();
        col.insert("a".into(), Some("a.lab"), Arc::new("x".into())).unwrap();

        assert_eq!(*col.remove("a").unwrap(), "x");
        assert!(col.get_by_host("a.lab").is_none());
        assert!(col.snapshot().is_empty());
        assert!(col.remove("a").is_none());
    }

    #[test]
    fn host_index_resolves_to_entity() {
        let col: EntityCollection<String> = EntityCollection::new();
        col.insert("green".into(), Some("host-01-green"), Arc::new("dev".into()))
            .unwrap();

        assert_eq!(*col.get_by_host("host-01-green").unwrap(), "dev");
        assert!(col.get_by_host("host-02-blue").is_none());
    }

    #[test]
    fn snapshot_keeps_insertion_order() {
        let col: EntityCollection<String> = EntityCollection::new();
        assert!(col.is_empty());
        for key in ["zeta", "alpha", "mid"] {
            col.insert(key.into(), None, Arc::new(key.into())).unwrap();
        }

        let snap: Vec<String> = col.snapshot().iter().map(|s| (**s).clone()).collect();
        assert_eq!(snap, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn concurrent_inserts_all_reach_the_snapshot() {
        let col: EntityCollection<String> = EntityCollection::new();
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let col = &col;
                scope.spawn(move || {
                    for n in 0..50 {
                        let key = format!("node-{worker}-{n}");
                        col.insert(key.clone(), None, Arc::new(key)).unwrap();
                    }
                });
            }
        });

        assert_eq!(col.len(), 400);
        assert_eq!(col.snapshot().len(), 400);
        assert_eq!(*col.version.borrow(), 400);
    }

    #[tokio::test]
    async fn subscribers_see_inserts() {
        let col: EntityCollection<String> = EntityCollection::new();
        let mut rx = col.subscribe();

        col.insert("a".into(), None, Arc::new("x".into())).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
    }
}
