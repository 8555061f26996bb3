//! Non-blocking named locks.
//!
//! The dispatcher tick and the reconciler sweep each run under a named lock
//! so that at most one instance of either critical section proceeds at a
//! time. Acquisition never waits: a busy lock fails fast with
//! [`JobError::LockBusy`] and the caller skips its turn.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::error::{JobError, Result};

/// Lock provider abstraction. A clustered deployment plugs in its own
/// distributed lock here; [`LocalLockService`] covers a single process.
pub trait LockService: Send + Sync {
    /// Try to take the named lock. Fails fast with [`JobError::LockBusy`]
    /// when it is held; never blocks.
    fn acquire(&self, lock_id: &str) -> Result<LockGuard>;
}

/// Held lock. Released on drop, so no exit path can leak it.
pub struct LockGuard {
    lock_id: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let mut held = self.held.lock().expect("lock table poisoned");
        held.remove(&self.lock_id);
        tracing::trace!(lock_id = %self.lock_id, "Lock released");
    }
}

/// In-process lock table.
#[derive(Clone, Default)]
pub struct LocalLockService {
    held: Arc<Mutex<HashSet<String>>>,
}

impl LocalLockService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockService for LocalLockService {
    fn acquire(&self, lock_id: &str) -> Result<LockGuard> {
        let mut held = self.held.lock().expect("lock table poisoned");
        if !held.insert(lock_id.to_string()) {
            return Err(JobError::LockBusy(lock_id.to_string()));
        }
        tracing::trace!(lock_id, "Lock acquired");
        Ok(LockGuard {
            lock_id: lock_id.to_string(),
            held: self.held.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release() {
        let locks = LocalLockService::new();
        let guard = locks.acquire("poll").unwrap();
        assert!(matches!(locks.acquire("poll"), Err(JobError::LockBusy(_))));
        drop(guard);
        assert!(locks.acquire("poll").is_ok());
    }

    #[test]
    fn distinct_names_do_not_contend() {
        let locks = LocalLockService::new();
        let _a = locks.acquire("poll").unwrap();
        assert!(locks.acquire("sweep").is_ok());
    }
}
