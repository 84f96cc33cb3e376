//! The coordinator-owned scope and its persistence queue.

use crash_protocol_types::Scope;
use dump_uploader::ContextSource;
use parking_lot::Mutex;
use scope_cache::{ScopeCache, ScopeMutation};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// In-memory scope plus the queue that mirrors every change to disk.
///
/// A mutation is applied in memory and queued for persistence under the
/// same lock, so the cache sees changes in exactly the in-memory order.
pub struct LiveScope {
    scope: Mutex<Scope>,
    max_breadcrumbs: usize,
    persist_tx: Mutex<Option<mpsc::UnboundedSender<ScopeMutation>>>,
}

impl LiveScope {
    /// Live scope seeded from the cache, plus the persist worker.
    pub(crate) fn spawn(cache: Arc<ScopeCache>) -> (Arc<Self>, JoinHandle<()>) {
        let max_breadcrumbs = cache.max_breadcrumbs();
        let mut scope = Scope::default();
        scope.merge(cache.load(), max_breadcrumbs);

        let (tx, rx) = mpsc::unbounded_channel();
        let live = Arc::new(Self {
            scope: Mutex::new(scope),
            max_breadcrumbs,
            persist_tx: Mutex::new(Some(tx)),
        });
        let worker = tokio::spawn(persist_worker(cache, rx));
        (live, worker)
    }

    pub fn snapshot(&self) -> Scope {
        self.scope.lock().clone()
    }

    pub(crate) fn apply(&self, mutation: ScopeMutation) {
        let mut scope = self.scope.lock();
        match &mutation {
            ScopeMutation::Merge(incoming) => scope.merge(incoming.clone(), self.max_breadcrumbs),
            ScopeMutation::Breadcrumb(crumb) => {
                scope.add_breadcrumb(crumb.clone(), self.max_breadcrumbs)
            }
        }

        match self.persist_tx.lock().as_ref() {
            Some(tx) => {
                if tx.send(mutation).is_err() {
                    warn!("Scope persist worker gone, change kept in memory only");
                }
            }
            None => warn!("Scope persistence closed, change kept in memory only"),
        }
    }

    /// Stop accepting persist work; the worker drains what is queued.
    pub(crate) fn close_persistence(&self) {
        self.persist_tx.lock().take();
    }
}

impl ContextSource for LiveScope {
    fn current_scope(&self) -> Scope {
        self.snapshot()
    }
}

async fn persist_worker(cache: Arc<ScopeCache>, mut rx: mpsc::UnboundedReceiver<ScopeMutation>) {
    while let Some(mutation) = rx.recv().await {
        let cache = cache.clone();
        match tokio::task::spawn_blocking(move || cache.apply(mutation)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to persist scope"),
            Err(e) => error!(error = %e, "Scope persist task panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crash_protocol_types::Breadcrumb;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_seeded_from_cache_and_persisted_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scope.json");

        let mut cached = Scope::default();
        cached.set_tag("release", "0.9");
        ScopeCache::open(&path, 5).apply_sync(cached).unwrap();

        let (live, worker) = LiveScope::spawn(Arc::new(ScopeCache::open(&path, 5)));
        assert_eq!(live.snapshot().tags["release"], "0.9");

        for i in 0..3 {
            let mut update = Scope::default();
            update.set_tag("step", i.to_string());
            live.apply(ScopeMutation::Merge(update));
        }
        live.apply(ScopeMutation::Breadcrumb(Breadcrumb::new("done")));
        live.close_persistence();
        worker.await.unwrap();

        let on_disk = ScopeCache::open(&path, 5).load();
        assert_eq!(on_disk, live.snapshot());
        assert_eq!(on_disk.tags["step"], "2");
    }
}
