//! Registry of exposed resources.
//!
//! `ExposureRegistry` stores non-owning weak references to resources'
//! dispatch handles under generated [`ResourceId`]s, so transports can
//! route an incoming request to a live resource without keeping dead ones
//! alive. Dead entries can be pruned opportunistically or lazily at lookup
//! time. The registry is always an explicit collaborator handed to
//! [`Resource::expose`](crate::Resource::expose), never an ambient global.

use std::sync::{
    Weak,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;

use crate::resource::{Dispatchable, ResourceHandle};

/// Identifier assigned to an exposed resource.
///
/// How identifiers are rendered into URLs is the embedding server's
/// concern; the registry only guarantees uniqueness within itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId(u64);

impl From<u64> for ResourceId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ResourceId {
    /// Create a new [`ResourceId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResourceId({})", self.0)
    }
}

/// Concurrent registry of dispatch handles keyed by [`ResourceId`].
#[derive(Default)]
pub struct ExposureRegistry {
    entries: DashMap<ResourceId, Weak<dyn Dispatchable>>,
    next_id: AtomicU64,
}

impl ExposureRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Store `handle` under a freshly generated identifier.
    pub fn register(&self, handle: &ResourceHandle) -> ResourceId {
        let id = ResourceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.insert(id, handle.downgrade());
        id
    }

    /// Retrieve a handle for `id` if the resource is still alive.
    pub fn get(&self, id: &ResourceId) -> Option<ResourceHandle> {
        let guard = self.entries.get(id);
        let handle = guard.as_ref().and_then(|weak| weak.upgrade());
        drop(guard);
        if handle.is_none() {
            self.entries.remove_if(id, |_, weak| weak.strong_count() == 0);
        }
        handle.map(ResourceHandle::from_arc)
    }

    /// Remove an entry, typically at resource teardown.
    pub fn remove(&self, id: &ResourceId) { self.entries.remove(id); }

    /// Remove all stale weak references without returning any handles.
    ///
    /// `DashMap::retain` acquires per-bucket write locks, so other
    /// operations may contend briefly while the registry is pruned.
    pub fn prune(&self) { self.entries.retain(|_, weak| weak.strong_count() > 0); }

    /// Prune stale weak references, then return the IDs of the live
    /// resources.
    #[must_use]
    pub fn active_ids(&self) -> Vec<ResourceId> {
        let mut ids = Vec::with_capacity(self.entries.len());
        self.entries.retain(|id, weak| {
            if weak.strong_count() > 0 {
                ids.push(*id);
                true
            } else {
                false
            }
        });
        ids
    }
}
