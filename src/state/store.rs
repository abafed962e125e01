//! Shared Store
//!
//! Holds the reconciled service collection and the pending-operation counter.
//! The collection is only ever replaced wholesale (full reload) or entry by
//! entry (single-service reload); it is never patched with optimistic edits.
//! The counter is a liveness signal for a busy indicator, not a correctness
//! mechanism.

use crate::domain::Service;
use ahash::AHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Reconciled collection plus its name index
#[derive(Debug, Default)]
struct Snapshot {
    /// Services in server-provided order
    services: Vec<Service>,
    /// name -> position in `services`, rebuilt on every replacement
    index: AHashMap<String, usize>,
}

impl Snapshot {
    fn rebuild_index(&mut self) {
        self.index.clear();
        for (pos, service) in self.services.iter().enumerate() {
            self.index.insert(service.name.clone(), pos);
        }
    }
}

/// Shared store handle
///
/// Cheap to clone; all clones observe the same snapshot and counter.
/// Mutated only by the action bus, read by everyone else.
#[derive(Clone, Debug, Default)]
pub struct SharedStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    snapshot: RwLock<Snapshot>,
    pending: AtomicUsize,
}

impl SharedStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Collection ====================

    /// Overwrite the whole collection with a fresh authoritative read
    pub fn replace_all(&self, services: Vec<Service>) {
        let mut snap = self.write_snapshot();
        snap.services = services;
        snap.rebuild_index();
    }

    /// Overwrite the entry for `name`, appending if it does not exist yet
    pub fn replace_one(&self, name: &str, service: Service) {
        let mut snap = self.write_snapshot();
        match snap.index.get(name).copied() {
            Some(pos) => {
                snap.services[pos] = service;
                // The entry may have been fetched under a stale name; keep
                // the index keyed by what the document says.
                snap.rebuild_index();
            }
            None => {
                let pos = snap.services.len();
                snap.index.insert(service.name.clone(), pos);
                snap.services.push(service);
            }
        }
    }

    /// Look up a service by name
    pub fn lookup(&self, name: &str) -> Option<Service> {
        let snap = self.read_snapshot();
        snap.index
            .get(name)
            .copied()
            .map(|pos| snap.services[pos].clone())
    }

    /// Clone the current collection in server order
    pub fn services(&self) -> Vec<Service> {
        self.read_snapshot().services.clone()
    }

    /// Number of services in the collection
    pub fn len(&self) -> usize {
        self.read_snapshot().services.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.read_snapshot().services.is_empty()
    }

    // ==================== Pending counter ====================

    /// Record the start of a network operation
    pub fn begin_operation(&self) {
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
    }

    /// Record the settlement of a network operation
    ///
    /// Saturates at zero: a mismatched call is logged rather than allowed
    /// to wrap the counter.
    pub fn end_operation(&self) {
        let result = self
            .inner
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if result.is_err() {
            tracing::warn!("end_operation called with no operation pending");
        }
    }

    /// RAII guard pairing `begin_operation` with `end_operation`
    ///
    /// The counter is released when the guard drops, on every exit path of
    /// the owning handler.
    pub fn operation(&self) -> OperationGuard {
        self.begin_operation();
        OperationGuard {
            store: self.clone(),
        }
    }

    /// Number of operations currently in flight
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Whether any operation is in flight
    pub fn is_busy(&self) -> bool {
        self.pending() > 0
    }

    fn read_snapshot(&self) -> std::sync::RwLockReadGuard<'_, Snapshot> {
        self.inner
            .snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_snapshot(&self) -> std::sync::RwLockWriteGuard<'_, Snapshot> {
        self.inner
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Guard returned by [`SharedStore::operation`]
#[must_use = "dropping the guard immediately ends the operation"]
pub struct OperationGuard {
    store: SharedStore,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.store.end_operation();
    }
}
