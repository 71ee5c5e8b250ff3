/*!
 * Worker Registry
 * Process-wide weak index of started workers
 */

use super::lifecycle::{Worker, WorkerInner};
use crate::core::types::WorkerId;
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::{LazyLock, Weak};

static REGISTRY: LazyLock<DashMap<WorkerId, Weak<WorkerInner>, RandomState>> =
    LazyLock::new(|| DashMap::with_hasher(RandomState::new()));

pub(super) fn register(serial: WorkerId, inner: Weak<WorkerInner>) {
    REGISTRY.insert(serial, inner);
}

pub(super) fn deregister(serial: WorkerId) {
    REGISTRY.remove(&serial);
}

/// Non-owning reference to a registered worker
#[derive(Clone)]
pub struct WorkerHandle {
    serial: WorkerId,
    inner: Weak<WorkerInner>,
}

impl WorkerHandle {
    pub fn serial(&self) -> WorkerId {
        self.serial
    }

    /// A strong handle, if the worker is still alive
    pub fn upgrade(&self) -> Option<Worker> {
        self.inner.upgrade().map(Worker::from_inner)
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("serial", &self.serial)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Every started, unclosed worker that is still referenced, by serial
///
/// Entries whose worker has been dropped are pruned on the way.
pub fn list_all() -> Vec<WorkerHandle> {
    REGISTRY.retain(|_, inner| inner.strong_count() > 0);
    let mut handles: Vec<WorkerHandle> = REGISTRY
        .iter()
        .map(|entry| WorkerHandle {
            serial: *entry.key(),
            inner: entry.value().clone(),
        })
        .collect();
    handles.sort_by_key(|h| h.serial);
    handles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;

    fn small_worker() -> Worker {
        Worker::builder()
            .with_config(
                WorkerConfig::default()
                    .with_buffer_size(64 * 1024)
                    .with_return_offset(48 * 1024),
            )
            .build()
    }

    fn listed(serial: WorkerId) -> bool {
        list_all().iter().any(|h| h.serial() == serial)
    }

    #[test]
    fn test_registered_between_start_and_close() {
        let worker = small_worker();
        let serial = worker.serial();
        assert!(!listed(serial));

        worker.start().unwrap();
        assert!(listed(serial));
        let handle = list_all()
            .into_iter()
            .find(|h| h.serial() == serial)
            .unwrap();
        let upgraded = handle.upgrade().unwrap();
        assert_eq!(upgraded.id(), worker.id());
        drop(upgraded);
        // Dropping a clone does not close the worker
        assert!(worker.id().is_some());

        worker.close().unwrap();
        assert!(!listed(serial));
    }

    #[test]
    fn test_dropped_worker_disappears() {
        let worker = small_worker();
        worker.start().unwrap();
        let serial = worker.serial();
        let handle = list_all()
            .into_iter()
            .find(|h| h.serial() == serial)
            .unwrap();
        drop(worker);
        assert!(!handle.is_alive());
        assert!(handle.upgrade().is_none());
        assert!(!listed(serial));
    }
}
