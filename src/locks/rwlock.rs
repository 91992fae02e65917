/*!
 * Read-Write Lock
 *
 * Both modes packed into one state word: the high 32 bits count shared
 * (reader) holds, the low 32 bits the writer's reentrant hold depth. A
 * writer acquires only from 0; readers CAS the reader count up whenever no
 * writer holds. The writer may take the read lock while holding the write
 * lock (downgrade), which is why the reader path checks ownership rather
 * than just the writer count.
 */

use crate::condition::Condition;
use crate::config::SyncConfig;
use crate::errors::AcquireError;
use crate::state::SyncState;
use crate::synchronizer::{AcquireOutcome, RawSynchronizer, SharedAcquire, SyncPolicy};
use std::sync::Arc;
use std::time::Duration;

/// One reader in the packed state word
const READER_UNIT: u64 = 1 << 32;

#[inline]
fn reader_count(state: u64) -> u64 {
    state >> 32
}

#[inline]
fn writer_holds(state: u64) -> u64 {
    state & 0xffff_ffff
}

/// State transitions for the packed reader/writer word
pub struct RwLockPolicy;

impl SyncPolicy for RwLockPolicy {
    fn try_acquire_exclusive(&self, state: &SyncState, arg: u64) -> bool {
        let current = state.cell().get_acquire();
        if current == 0 {
            if state.cell().compare_and_set(0, arg) {
                state.set_owner_current();
                return true;
            }
            return false;
        }
        // Reentrant write while already the writer; readers block a writer
        // even when that writer is us, except for our own read holds taken
        // after the write lock (downgrade), which are fine to coexist with
        if writer_holds(current) > 0 && state.is_held_by_current() {
            state.cell().set_release(current + arg);
            return true;
        }
        false
    }

    fn try_release_exclusive(&self, state: &SyncState, arg: u64) -> bool {
        assert!(
            state.is_held_by_current(),
            "write unlock by a thread that does not hold the write lock"
        );
        let current = state.cell().get_acquire();
        assert!(writer_holds(current) >= arg, "write unlock underflows");

        let next = current - arg;
        let fully_released = writer_holds(next) == 0;
        if fully_released {
            state.clear_owner();
        }
        state.cell().set_release(next);
        fully_released
    }

    fn try_acquire_shared(&self, state: &SyncState, _arg: u64) -> SharedAcquire {
        loop {
            let current = state.cell().get_acquire();
            if writer_holds(current) > 0 && !state.is_held_by_current() {
                return SharedAcquire::Failure;
            }
            if state.cell().compare_and_set(current, current + READER_UNIT) {
                // Cascade to further readers unless a (our own) writer hold
                // still pins the lock
                let remaining = if writer_holds(current) == 0 { 1 } else { 0 };
                return SharedAcquire::Success { remaining };
            }
        }
    }

    fn try_release_shared(&self, state: &SyncState, _arg: u64) -> bool {
        loop {
            let current = state.cell().get_acquire();
            assert!(reader_count(current) > 0, "read unlock with no read hold");
            let next = current - READER_UNIT;
            if state.cell().compare_and_set(current, next) {
                // Wake only when the lock went completely free: the only
                // waiter a reader-exit can unblock is a writer
                return next == 0;
            }
        }
    }

    fn current_holds(&self, state: &SyncState) -> u64 {
        assert!(
            state.is_held_by_current(),
            "condition used without holding the write lock"
        );
        writer_holds(state.cell().get_acquire())
    }
}

/// A read-write lock: any number of concurrent readers, or one reentrant
/// writer. The writer may downgrade by taking the read lock before
/// releasing the write lock.
///
/// Read holds are not tracked per thread, so the lock cannot tell a
/// reentrant read from a new reader. On a [fair](Self::fair) instance a
/// thread that already holds the read lock must not call
/// [`read_lock`](Self::read_lock) again while a writer is queued: the
/// fairness pre-check queues it behind that writer, which in turn waits
/// for the thread's first read hold. Non-fair instances (the default) are
/// unaffected; readers barge past queued writers.
#[derive(Clone)]
pub struct RwLock {
    raw: Arc<RawSynchronizer<RwLockPolicy>>,
}

impl RwLock {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn fair() -> Self {
        Self::with_config(SyncConfig::fair())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self {
            raw: Arc::new(RawSynchronizer::new(RwLockPolicy, 0, config)),
        }
    }

    /// Block until a read hold is granted.
    ///
    /// On a fair instance, reentrant use deadlocks if a writer is queued;
    /// see the type-level note.
    pub fn read_lock(&self) {
        self.raw.acquire_shared(1);
    }

    pub fn read_lock_interruptibly(&self) -> Result<(), AcquireError> {
        self.raw.acquire_shared_interruptibly(1)
    }

    pub fn try_read_lock(&self) -> bool {
        self.raw.try_acquire_shared(1)
    }

    pub fn try_read_lock_for(&self, timeout: Duration) -> AcquireOutcome {
        self.raw.acquire_shared_timed(1, timeout)
    }

    pub fn read_unlock(&self) {
        self.raw.release_shared(1);
    }

    pub fn write_lock(&self) {
        self.raw.acquire_exclusive(1);
    }

    pub fn write_lock_interruptibly(&self) -> Result<(), AcquireError> {
        self.raw.acquire_exclusive_interruptibly(1)
    }

    pub fn try_write_lock(&self) -> bool {
        self.raw.try_acquire_exclusive(1)
    }

    pub fn try_write_lock_for(&self, timeout: Duration) -> AcquireOutcome {
        self.raw.acquire_exclusive_timed(1, timeout)
    }

    pub fn write_unlock(&self) {
        self.raw.release_exclusive(1);
    }

    /// A condition queue bound to the write lock
    pub fn new_condition(&self) -> Condition<RwLockPolicy> {
        Condition::new(Arc::clone(&self.raw))
    }

    pub fn reader_count(&self) -> u64 {
        reader_count(self.raw.state().cell().get_acquire())
    }

    pub fn is_write_locked(&self) -> bool {
        writer_holds(self.raw.state().cell().get_acquire()) > 0
    }

    pub fn is_write_locked_by_current_thread(&self) -> bool {
        self.raw.is_held_exclusively()
    }
}

impl Default for RwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RwLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RwLock")
            .field("readers", &self.reader_count())
            .field("write_locked", &self.is_write_locked())
            .finish()
    }
}
