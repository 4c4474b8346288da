use dashmap::DashMap;
use proposal_core::ProposalId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// In-process single-writer locks keyed by proposal id.
///
/// Operations on different ids never contend; operations on the same id run
/// one at a time in acquisition order.
#[derive(Debug, Clone, Default)]
pub struct RecordLocks {
    inner: Arc<DashMap<ProposalId, Arc<Mutex<()>>>>
}

/// Held for the duration of one sync operation on a record.
///
/// Dropping the last guard of an id with no waiters removes its entry, so
/// the map only holds ids that are in use.
#[derive(Debug)]
pub struct RecordGuard {
    id: ProposalId,
    locks: Arc<DashMap<ProposalId, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold a clone of the mutex, so a count of one is the map alone.
        self.locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: ProposalId) -> RecordGuard {
        let mutex = self
            .inner
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        RecordGuard {
            id,
            locks: self.inner.clone(),
            guard: Some(mutex.lock_owned().await)
        }
    }

    /// Drops the entries nobody holds or waits on. Returns how many were
    /// removed. Guards already clean up after themselves; this only catches
    /// entries left by a lock future cancelled while waiting.
    pub fn prune(&self) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before - self.inner.len()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn id(n: i64) -> ProposalId {
        ProposalId::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_same_id_is_serialized() {
        let locks = RecordLocks::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let active = active.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(id(1)).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_ids_do_not_block() {
        let locks = RecordLocks::new();
        let _first = locks.lock(id(1)).await;
        let second = tokio::time::timeout(Duration::from_millis(100), locks.lock(id(2))).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_released_locks_leave_no_entries() {
        let locks = RecordLocks::new();
        for n in 1..=100 {
            drop(locks.lock(id(n)).await);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_survives_while_a_waiter_is_queued() {
        let locks = RecordLocks::new();
        let held = locks.lock(id(1)).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(id(1)).await;
                locks.len()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(held);
        assert_eq!(waiter.await.unwrap(), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = RecordLocks::new();
        let held = locks.lock(id(1)).await;

        assert_eq!(locks.len(), 1);
        assert_eq!(locks.prune(), 0);
        assert_eq!(locks.len(), 1);

        drop(held);
        assert!(locks.is_empty());
        assert_eq!(locks.prune(), 0);
    }
}
