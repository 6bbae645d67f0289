//! Per-trajectory async locks.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::OwnedMutexGuard;

/// Hands out one async mutex per trajectory id so that scoring and caching
/// the same trajectory never interleave, while different trajectories run
/// in parallel.
#[derive(Default)]
pub struct TrajectoryLocks {
    locks: Mutex<BTreeMap<i64, Weak<tokio::sync::Mutex<()>>>>,
}

impl TrajectoryLocks {
    /// Waits for and returns the lock of `trajectory_id`.
    pub async fn lock(&self, trajectory_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

            if let Some(existing) = locks.get(&trajectory_id).and_then(Weak::upgrade) {
                existing
            } else {
                locks.retain(|_, weak| weak.strong_count() > 0);
                let fresh = Arc::new(tokio::sync::Mutex::new(()));
                locks.insert(trajectory_id, Arc::downgrade(&fresh));
                fresh
            }
        };

        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_id_is_exclusive() {
        let locks = TrajectoryLocks::default();
        let guard = locks.lock(1).await;

        let second = tokio::time::timeout(Duration::from_millis(50), locks.lock(1)).await;
        assert!(second.is_err());

        drop(guard);
        let third = tokio::time::timeout(Duration::from_millis(50), locks.lock(1)).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn different_ids_do_not_block() {
        let locks = TrajectoryLocks::default();
        let _a = locks.lock(1).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock(2)).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn released_locks_are_pruned() {
        let locks = TrajectoryLocks::default();
        drop(locks.lock(1).await);
        drop(locks.lock(2).await);
        assert_eq!(locks.tracked(), 1);
    }
}
