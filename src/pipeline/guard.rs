//! Single-run guard for the sync engine
//!
//! A manual trigger racing a scheduled one is rejected immediately instead of
//! queued. The guard is an injectable value rather than a process-wide static,
//! so two engines sharing one guard exclude each other while independent
//! engines (tests) do not.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct SyncGuard {
    running: AtomicBool,
}

impl SyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard without waiting
    ///
    /// Returns `None` when a run already holds it. The run ends when the
    /// returned permit is dropped.
    pub fn try_acquire(self: &Arc<Self>) -> Option<SyncPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncPermit {
                guard: Arc::clone(self),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Proof that the holder is the only active sync run
#[derive(Debug)]
pub struct SyncPermit {
    guard: Arc<SyncGuard>,
}

impl Drop for SyncPermit {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_rejected() {
        let guard = Arc::new(SyncGuard::new());

        let permit = guard.try_acquire();
        assert!(permit.is_some());
        assert!(guard.is_running());
        assert!(guard.try_acquire().is_none());

        drop(permit);
        assert!(!guard.is_running());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_independent_guards() {
        let a = Arc::new(SyncGuard::new());
        let b = Arc::new(SyncGuard::new());

        let _pa = a.try_acquire().unwrap();
        assert!(b.try_acquire().is_some());
    }
}
