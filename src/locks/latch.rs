/*!
 * Countdown Latch
 *
 * One-shot gate: the state word counts down to 0 and stays there. Waiters
 * acquire in shared mode, which succeeds only once the count is exhausted;
 * success always cascades, so a single final `count_down` releases every
 * parked waiter in a wake chain rather than one by one.
 */

use crate::config::SyncConfig;
use crate::errors::AcquireError;
use crate::state::SyncState;
use crate::synchronizer::{AcquireOutcome, RawSynchronizer, SharedAcquire, SyncPolicy};
use std::sync::Arc;
use std::time::Duration;

/// State transitions for a one-shot countdown gate
pub struct LatchPolicy;

impl SyncPolicy for LatchPolicy {
    fn try_acquire_shared(&self, state: &SyncState, _arg: u64) -> SharedAcquire {
        if state.cell().get_acquire() == 0 {
            // Open: propagate so every queued waiter falls through
            SharedAcquire::Success { remaining: 1 }
        } else {
            SharedAcquire::Failure
        }
    }

    fn try_release_shared(&self, state: &SyncState, _arg: u64) -> bool {
        loop {
            let count = state.cell().get_acquire();
            if count == 0 {
                // Already open; further count_downs are no-ops
                return false;
            }
            if state.cell().compare_and_set(count, count - 1) {
                // Wake only on the transition to 0
                return count == 1;
            }
        }
    }
}

/// A one-shot countdown gate. `wait` blocks until `count_down` has been
/// called `count` times; once open it never closes.
#[derive(Clone)]
pub struct CountdownLatch {
    raw: Arc<RawSynchronizer<LatchPolicy>>,
}

impl CountdownLatch {
    pub fn new(count: u64) -> Self {
        Self {
            raw: Arc::new(RawSynchronizer::new(LatchPolicy, count, SyncConfig::default())),
        }
    }

    /// Block until the count reaches 0, deferring interruption
    pub fn wait(&self) {
        self.raw.acquire_shared(1);
    }

    pub fn wait_interruptibly(&self) -> Result<(), AcquireError> {
        self.raw.acquire_shared_interruptibly(1)
    }

    /// Bounded wait; `TimedOut` means the gate is still closed
    pub fn wait_timed(&self, timeout: Duration) -> AcquireOutcome {
        self.raw.acquire_shared_timed(1, timeout)
    }

    /// Decrement the count, opening the gate at 0. No-op once open.
    pub fn count_down(&self) {
        self.raw.release_shared(1);
    }

    pub fn count(&self) -> u64 {
        self.raw.state().cell().get_acquire()
    }
}

impl std::fmt::Debug for CountdownLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountdownLatch")
            .field("count", &self.count())
            .finish()
    }
}
