/*!
 * Counting Semaphore
 *
 * Shared-mode variant: the state word is the remaining permit count. An
 * acquire of `n` permits CAS-decrements by `n` when enough remain; a release
 * adds permits back unconditionally and always wakes, since added permits
 * always make progress possible for someone.
 */

use crate::config::SyncConfig;
use crate::errors::AcquireError;
use crate::state::SyncState;
use crate::synchronizer::{AcquireOutcome, RawSynchronizer, SharedAcquire, SyncPolicy};
use std::sync::Arc;
use std::time::Duration;

/// State transitions for a permit-counting shared lock
pub struct SemaphorePolicy;

impl SyncPolicy for SemaphorePolicy {
    fn try_acquire_shared(&self, state: &SyncState, arg: u64) -> SharedAcquire {
        loop {
            let available = state.cell().get_acquire();
            if available < arg {
                return SharedAcquire::Failure;
            }
            if state.cell().compare_and_set(available, available - arg) {
                return SharedAcquire::Success {
                    remaining: available - arg,
                };
            }
        }
    }

    fn try_release_shared(&self, state: &SyncState, arg: u64) -> bool {
        state.cell().fetch_add_release(arg);
        true
    }
}

/// A counting semaphore. Permits are not owned: any thread may release,
/// and releasing more than was acquired simply grows the permit count.
#[derive(Clone)]
pub struct Semaphore {
    raw: Arc<RawSynchronizer<SemaphorePolicy>>,
}

impl Semaphore {
    /// Non-fair semaphore holding `permits` initially
    pub fn new(permits: u64) -> Self {
        Self::with_config(permits, SyncConfig::default())
    }

    /// Fair semaphore: waiters receive permits in FIFO order
    pub fn fair(permits: u64) -> Self {
        Self::with_config(permits, SyncConfig::fair())
    }

    pub fn with_config(permits: u64, config: SyncConfig) -> Self {
        Self {
            raw: Arc::new(RawSynchronizer::new(SemaphorePolicy, permits, config)),
        }
    }

    /// Block until one permit is taken, deferring interruption
    pub fn acquire(&self) {
        self.raw.acquire_shared(1);
    }

    /// Block until `permits` are taken atomically
    pub fn acquire_many(&self, permits: u64) {
        self.raw.acquire_shared(permits);
    }

    pub fn acquire_interruptibly(&self) -> Result<(), AcquireError> {
        self.raw.acquire_shared_interruptibly(1)
    }

    /// One barging attempt for a single permit
    pub fn try_acquire(&self) -> bool {
        self.raw.try_acquire_shared(1)
    }

    pub fn try_acquire_for(&self, timeout: Duration) -> AcquireOutcome {
        self.raw.acquire_shared_timed(1, timeout)
    }

    /// Return one permit and wake a waiter
    pub fn release(&self) {
        self.raw.release_shared(1);
    }

    pub fn release_many(&self, permits: u64) {
        self.raw.release_shared(permits);
    }

    pub fn available_permits(&self) -> u64 {
        self.raw.state().cell().get_acquire()
    }

    pub fn has_queued_threads(&self) -> bool {
        self.raw.has_queued_waiters()
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("available", &self.available_permits())
            .finish()
    }
}
