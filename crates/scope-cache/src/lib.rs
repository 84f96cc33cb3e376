//! # Scope Cache
//!
//! Disk copy of the coordinator's scope, so the context of a session that
//! ended in a native crash is still available when the dump is uploaded on
//! the next launch.

use crash_protocol_types::{Breadcrumb, Scope};
use persisted_store::{PersistedStore, StoreResult};
use std::path::PathBuf;
use tracing::debug;

/// A scope change to replay onto the cached copy.
#[derive(Debug, Clone)]
pub enum ScopeMutation {
    Merge(Scope),
    Breadcrumb(Breadcrumb),
}

/// Scope persisted through a [`PersistedStore`].
pub struct ScopeCache {
    store: PersistedStore<Scope>,
    max_breadcrumbs: usize,
}

impl ScopeCache {
    /// Open the cache. A missing or corrupt file yields an empty scope.
    pub fn open(path: impl Into<PathBuf>, max_breadcrumbs: usize) -> Self {
        Self {
            store: PersistedStore::open_or_default(path),
            max_breadcrumbs,
        }
    }

    /// The cached scope as last written.
    pub fn load(&self) -> Scope {
        self.store.get()
    }

    pub fn max_breadcrumbs(&self) -> usize {
        self.max_breadcrumbs
    }

    /// Merge a scope update into the cache.
    pub fn apply_sync(&self, incoming: Scope) -> StoreResult<Scope> {
        let max = self.max_breadcrumbs;
        self.store.update(move |current| {
            let mut next = current.clone();
            next.merge(incoming, max);
            next
        })
    }

    pub fn add_breadcrumb(&self, crumb: Breadcrumb) -> StoreResult<Scope> {
        let max = self.max_breadcrumbs;
        self.store.update(move |current| {
            let mut next = current.clone();
            next.add_breadcrumb(crumb, max);
            next
        })
    }

    /// Apply one queued mutation.
    pub fn apply(&self, mutation: ScopeMutation) -> StoreResult<Scope> {
        debug!(?mutation, "persisting scope mutation");
        match mutation {
            ScopeMutation::Merge(scope) => self.apply_sync(scope),
            ScopeMutation::Breadcrumb(crumb) => self.add_breadcrumb(crumb),
        }
    }
}
