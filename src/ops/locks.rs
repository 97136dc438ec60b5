use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-id mutual exclusion for the check-then-write sequences in [`super::Sector`].
///
/// The store offers no conditional put, so two requests racing on the same id
/// are serialized here instead. Entries are dropped once no guard or waiter
/// refers to them.
#[derive(Default)]
pub struct IdLocks {
    inner: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

pub struct IdGuard<'a> {
    locks: &'a IdLocks,
    id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl IdLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: Uuid) -> IdGuard<'_> {
        let mutex = {
            let mut map = self.inner.lock().unwrap();
            map.entry(id).or_default().clone()
        };
        let guard = mutex.lock_owned().await;
        IdGuard { locks: self, id, guard: Some(guard) }
    }

    /// Number of ids currently locked or waited on.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for IdGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.locks.inner.lock().unwrap();
        if let Some(mutex) = map.get(&self.id) {
            if Arc::strong_count(mutex) == 1 {
                map.remove(&self.id);
            }
        }
    }
}
