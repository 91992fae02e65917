/*!
 * Reentrant Mutex
 *
 * Exclusive lock with a per-instance hold counter: the state word is the
 * owner's nesting depth, 0 when free. Re-entry by the owner bumps the count
 * with a plain release store (no CAS needed, only the owner writes while
 * held); the lock frees only when the count returns to 0.
 */

use crate::condition::Condition;
use crate::config::SyncConfig;
use crate::errors::AcquireError;
use crate::state::SyncState;
use crate::synchronizer::{AcquireOutcome, RawSynchronizer, SyncPolicy};
use std::sync::Arc;
use std::time::Duration;

/// State transitions for a reentrant exclusive lock
pub struct MutexPolicy;

impl SyncPolicy for MutexPolicy {
    fn try_acquire_exclusive(&self, state: &SyncState, arg: u64) -> bool {
        let holds = state.cell().get_acquire();
        if holds == 0 {
            if state.cell().compare_and_set(0, arg) {
                state.set_owner_current();
                return true;
            }
            return false;
        }
        if state.is_held_by_current() {
            // Owner-only path: no competing writer exists
            state.cell().set_release(holds + arg);
            return true;
        }
        false
    }

    fn try_release_exclusive(&self, state: &SyncState, arg: u64) -> bool {
        assert!(
            state.is_held_by_current(),
            "unlock of a mutex not held by the calling thread"
        );
        let holds = state.cell().get_acquire();
        assert!(holds >= arg, "unlock underflows the hold count");

        let remaining = holds - arg;
        if remaining == 0 {
            // Owner cleared before the state store so the next acquirer
            // never observes a stale owner id
            state.clear_owner();
        }
        state.cell().set_release(remaining);
        remaining == 0
    }

    fn current_holds(&self, state: &SyncState) -> u64 {
        assert!(
            state.is_held_by_current(),
            "hold count read by a thread that does not own the mutex"
        );
        state.cell().get_acquire()
    }
}

/// A reentrant exclusive lock in the explicit lock/unlock style.
///
/// Cloning yields another handle to the same lock. Panics on misuse
/// (unlocking while not the owner); blocking flavors report interruption
/// and timeout as values, never panics.
#[derive(Clone)]
pub struct ReentrantLock {
    raw: Arc<RawSynchronizer<MutexPolicy>>,
}

impl ReentrantLock {
    /// Non-fair lock with default configuration
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    /// Fair lock: queued waiters acquire in FIFO order
    pub fn fair() -> Self {
        Self::with_config(SyncConfig::fair())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self {
            raw: Arc::new(RawSynchronizer::new(MutexPolicy, 0, config)),
        }
    }

    /// Block until the lock is held, deferring interruption
    pub fn lock(&self) {
        self.raw.acquire_exclusive(1);
    }

    /// Block until the lock is held or the wait is interrupted
    pub fn lock_interruptibly(&self) -> Result<(), AcquireError> {
        self.raw.acquire_exclusive_interruptibly(1)
    }

    /// One barging attempt, ignoring fairness
    pub fn try_lock(&self) -> bool {
        self.raw.try_acquire_exclusive(1)
    }

    /// Bounded blocking attempt
    pub fn try_lock_for(&self, timeout: Duration) -> AcquireOutcome {
        self.raw.acquire_exclusive_timed(1, timeout)
    }

    /// Drop one hold. Panics if the calling thread is not the owner.
    pub fn unlock(&self) {
        self.raw.release_exclusive(1);
    }

    /// A condition queue bound to this lock
    pub fn new_condition(&self) -> Condition<MutexPolicy> {
        Condition::new(Arc::clone(&self.raw))
    }

    /// The calling thread's nesting depth, 0 if it is not the owner
    pub fn hold_count(&self) -> u64 {
        if self.raw.is_held_exclusively() {
            self.raw.state().cell().get_acquire()
        } else {
            0
        }
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.raw.is_held_exclusively()
    }

    pub fn is_locked(&self) -> bool {
        self.raw.state().cell().get_acquire() != 0
    }

    pub fn has_queued_threads(&self) -> bool {
        self.raw.has_queued_waiters()
    }
}

impl Default for ReentrantLock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReentrantLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReentrantLock")
            .field("locked", &self.is_locked())
            .field("fairness", &self.raw.fairness())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncontended_lock_unlock() {
        let lock = ReentrantLock::new();
        assert!(!lock.is_locked());

        lock.lock();
        assert!(lock.is_locked());
        assert!(lock.is_held_by_current_thread());
        assert_eq!(lock.hold_count(), 1);

        lock.unlock();
        assert!(!lock.is_locked());
        assert_eq!(lock.hold_count(), 0);
    }

    #[test]
    fn test_reentrancy_counts_holds() {
        let lock = ReentrantLock::new();
        lock.lock();
        lock.lock();
        lock.lock();
        assert_eq!(lock.hold_count(), 3);

        lock.unlock();
        lock.unlock();
        assert!(lock.is_locked());
        lock.unlock();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_try_lock_fails_cross_thread() {
        let lock = ReentrantLock::new();
        lock.lock();

        let contender = lock.clone();
        let acquired = std::thread::spawn(move || contender.try_lock())
            .join()
            .unwrap();
        assert!(!acquired);

        lock.unlock();
    }

    #[test]
    #[should_panic(expected = "not held by the calling thread")]
    fn test_unlock_without_hold_panics() {
        let lock = ReentrantLock::new();
        lock.unlock();
    }
}
