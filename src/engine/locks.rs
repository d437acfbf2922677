use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use ulid::Ulid;

type Entries = Arc<DashMap<Ulid, Arc<Mutex<()>>>>;

/// Per-id async mutexes, created on first use and dropped once idle.
#[derive(Default)]
pub(crate) struct LockTable {
    locks: Entries,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every id in ascending order. A single global order means two
    /// callers with overlapping sets can never deadlock.
    pub async fn acquire(&self, ids: &BTreeSet<Ulid>) -> LockSet {
        let mut set = LockSet {
            table: self.locks.clone(),
            guards: Vec::with_capacity(ids.len()),
        };
        for id in ids {
            let lock = self
                .locks
                .entry(*id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            set.guards.push((*id, lock.lock_owned().await));
        }
        set
    }

    /// Ids with a live lock entry.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Held locks. Released on drop, in reverse acquisition order. Owns its
/// guards, so it can move into a spawned task.
pub(crate) struct LockSet {
    table: Entries,
    guards: Vec<(Ulid, OwnedMutexGuard<()>)>,
}

impl Drop for LockSet {
    fn drop(&mut self) {
        while let Some((id, guard)) = self.guards.pop() {
            drop(guard);
            // Strong count 1 means only the table references it: nobody holds
            // or waits on this lock, so the entry can go.
            self.table
                .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}
