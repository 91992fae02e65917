/*!
 * Synchronizer Core
 *
 * Variant-agnostic acquire/release engine. A lock variant supplies only the
 * fast-path predicates over the state cell (a [`SyncPolicy`]); the core owns
 * everything hard: the wait queue, fairness, parking, cancellation, and
 * shared-mode wake propagation.
 *
 * # Design
 *
 * The acquire slow path is the classic queued-synchronizer loop: enqueue a
 * node, and while it is not the immediate successor of the head, park.
 * Wakes are advisory: a woken waiter re-runs the policy predicate and may
 * park again (spurious wakeups are part of the contract). Static dispatch
 * over the policy keeps the hot path monomorphized; there is no vtable in
 * the acquire loop.
 */

use crate::config::{Fairness, SyncConfig};
use crate::errors::AcquireError;
use crate::park::interrupt;
use crate::park::ParkOutcome;
use crate::queue::node::{status, Mode, NodeRef};
use crate::queue::WaitQueue;
use crate::state::SyncState;
use std::time::{Duration, Instant};

/// Result of a blocking acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The resource was acquired
    Acquired,
    /// The deadline elapsed first; the caller holds nothing
    TimedOut,
    /// The wait was interrupted; the caller holds nothing
    Interrupted,
}

impl AcquireOutcome {
    /// Convert to a `Result`, treating anything but `Acquired` as an error
    pub fn into_result(self) -> Result<(), AcquireError> {
        match self {
            AcquireOutcome::Acquired => Ok(()),
            AcquireOutcome::TimedOut => Err(AcquireError::TimedOut),
            AcquireOutcome::Interrupted => Err(AcquireError::Interrupted),
        }
    }
}

/// Result of a shared-mode fast-path attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedAcquire {
    /// Insufficient capacity; the caller must queue
    Failure,
    /// Acquired. `remaining > 0` means the state still permits further
    /// shared acquisitions, so the core cascades a wake to the next waiter.
    Success { remaining: u64 },
}

/// Per-variant acquire/release behavior over the shared state cell.
///
/// Implementations are pure state-cell transitions: no blocking, no queue
/// access, no side effects beyond the state word and owner identity. A
/// variant implements only the modes it supports; calling an unsupported
/// mode is a programmer error and panics.
pub trait SyncPolicy: Send + Sync + 'static {
    /// One exclusive fast-path attempt. Must not block or spin unboundedly.
    fn try_acquire_exclusive(&self, state: &SyncState, arg: u64) -> bool {
        let _ = (state, arg);
        panic!("exclusive acquisition is not supported by this synchronizer");
    }

    /// Undo `arg` exclusive holds. Returns true when the resource became
    /// fully free and a waiter should be woken. Panics on misuse (releasing
    /// a hold the caller does not own).
    fn try_release_exclusive(&self, state: &SyncState, arg: u64) -> bool {
        let _ = (state, arg);
        panic!("exclusive release is not supported by this synchronizer");
    }

    /// One shared fast-path attempt.
    fn try_acquire_shared(&self, state: &SyncState, arg: u64) -> SharedAcquire {
        let _ = (state, arg);
        panic!("shared acquisition is not supported by this synchronizer");
    }

    /// Return `arg` units of shared capacity. Returns true when the updated
    /// state permits a waiter to proceed (which triggers a wake).
    fn try_release_shared(&self, state: &SyncState, arg: u64) -> bool {
        let _ = (state, arg);
        panic!("shared release is not supported by this synchronizer");
    }

    /// The calling thread's full exclusive hold count, for condition waits.
    /// Panics unless the caller holds the synchronizer exclusively.
    fn current_holds(&self, state: &SyncState) -> u64 {
        let _ = state;
        panic!("conditions are not supported by this synchronizer");
    }
}

/// Blocking flavor of one acquisition attempt
#[derive(Debug, Clone, Copy)]
pub(crate) enum Blocking {
    /// Park until acquired; interruption either aborts or is remembered
    Block { interruptible: bool },
    /// Park with a deadline; always interruptible
    Until(Instant),
}

/// The queued synchronizer: one atomic state cell, one FIFO wait queue
pub struct RawSynchronizer<P: SyncPolicy> {
    pub(crate) sync: SyncState,
    pub(crate) queue: WaitQueue,
    pub(crate) policy: P,
    config: SyncConfig,
}

impl<P: SyncPolicy> RawSynchronizer<P> {
    pub fn new(policy: P, initial_state: u64, config: SyncConfig) -> Self {
        Self {
            sync: SyncState::new(initial_state),
            queue: WaitQueue::with_capacity(config.waiter_capacity),
            policy,
            config,
        }
    }

    /// The shared state word and owner identity
    #[inline]
    pub fn state(&self) -> &SyncState {
        &self.sync
    }

    #[inline]
    pub fn fairness(&self) -> Fairness {
        self.config.fairness
    }

    /// Whether the calling thread is the exclusive owner
    #[inline]
    pub fn is_held_exclusively(&self) -> bool {
        self.sync.is_held_by_current()
    }

    /// Whether any thread is queued behind the head
    #[inline]
    pub fn has_queued_waiters(&self) -> bool {
        self.queue.has_queued_waiters()
    }

    /// Barging one-shot attempt, deliberately ignoring fairness (matching
    /// the classic `tryLock` contract even on fair instances)
    pub fn try_acquire_exclusive(&self, arg: u64) -> bool {
        self.policy.try_acquire_exclusive(&self.sync, arg)
    }

    /// Barging one-shot shared attempt
    pub fn try_acquire_shared(&self, arg: u64) -> bool {
        matches!(
            self.policy.try_acquire_shared(&self.sync, arg),
            SharedAcquire::Success { .. }
        )
    }

    /// Block until acquired, deferring interruption until after acquisition
    pub fn acquire_exclusive(&self, arg: u64) {
        let outcome = self.acquire(Mode::Exclusive, arg, Blocking::Block { interruptible: false });
        debug_assert_eq!(outcome, AcquireOutcome::Acquired);
    }

    /// Block until acquired or interrupted
    pub fn acquire_exclusive_interruptibly(&self, arg: u64) -> Result<(), AcquireError> {
        self.acquire(Mode::Exclusive, arg, Blocking::Block { interruptible: true })
            .into_result()
    }

    /// Block until acquired, the timeout elapses, or interruption
    pub fn acquire_exclusive_timed(&self, arg: u64, timeout: Duration) -> AcquireOutcome {
        self.acquire(Mode::Exclusive, arg, Blocking::Until(Instant::now() + timeout))
    }

    pub fn acquire_shared(&self, arg: u64) {
        let outcome = self.acquire(Mode::Shared, arg, Blocking::Block { interruptible: false });
        debug_assert_eq!(outcome, AcquireOutcome::Acquired);
    }

    pub fn acquire_shared_interruptibly(&self, arg: u64) -> Result<(), AcquireError> {
        self.acquire(Mode::Shared, arg, Blocking::Block { interruptible: true })
            .into_result()
    }

    pub fn acquire_shared_timed(&self, arg: u64, timeout: Duration) -> AcquireOutcome {
        self.acquire(Mode::Shared, arg, Blocking::Until(Instant::now() + timeout))
    }

    /// Release exclusive holds; wakes the next waiter when fully free
    pub fn release_exclusive(&self, arg: u64) -> bool {
        if self.policy.try_release_exclusive(&self.sync, arg) {
            self.queue.wake_first_waiter();
            true
        } else {
            false
        }
    }

    /// Release shared capacity; wakes conditionally on the policy's answer
    pub fn release_shared(&self, arg: u64) -> bool {
        if self.policy.try_release_shared(&self.sync, arg) {
            self.queue.wake_first_waiter();
            true
        } else {
            false
        }
    }

    /// Whether a brand-new arrival may race the state cell before queueing.
    /// This is the entire difference between the two fairness policies. An
    /// established exclusive owner is always allowed through: reentrant
    /// re-acquisition must not deadlock behind the owner's own queue.
    #[inline]
    fn may_barge(&self) -> bool {
        match self.config.fairness {
            Fairness::Nonfair => true,
            Fairness::Fair => !self.queue.has_queued_waiters() || self.sync.is_held_by_current(),
        }
    }

    fn acquire(&self, mode: Mode, arg: u64, blocking: Blocking) -> AcquireOutcome {
        if self.may_barge() && self.try_policy(mode, arg).is_some() {
            return AcquireOutcome::Acquired;
        }

        // Slab exhaustion degrades to a yield loop, never an unconditional
        // one: the deadline, the interrupt token, and the fast path all stay
        // live while waiting for a slot, so a full slab cannot make a timed
        // or interruptible acquire uncancellable.
        let token = interrupt::current();
        let mut pending_interrupt = false;
        let mut warned = false;
        let node_ref = loop {
            if let Some(r) = self.queue.try_alloc_node(mode, status::WAITING) {
                break r;
            }
            if !warned {
                log::warn!(
                    "wait-node slab exhausted ({} slots); acquirer yielding for a free slot",
                    self.queue.capacity()
                );
                warned = true;
            }
            if token.is_interrupted() {
                token.clear();
                match blocking {
                    Blocking::Block { interruptible: false } => pending_interrupt = true,
                    _ => return AcquireOutcome::Interrupted,
                }
            }
            if let Blocking::Until(deadline) = blocking {
                if Instant::now() >= deadline {
                    return AcquireOutcome::TimedOut;
                }
            }
            // A release may slip by while no slot is free; retry the state
            // cell so the resource is never idle with acquirers yielding
            if self.may_barge() && self.try_policy(mode, arg).is_some() {
                if pending_interrupt {
                    token.interrupt();
                }
                return AcquireOutcome::Acquired;
            }
            std::thread::yield_now();
        };

        if pending_interrupt {
            // Re-raise; the queued loop consumes it again and restores the
            // flag once the acquisition completes
            token.interrupt();
        }
        self.queue.enqueue(node_ref);
        self.acquire_queued(node_ref, mode, arg, blocking)
    }

    #[inline]
    fn try_policy(&self, mode: Mode, arg: u64) -> Option<u64> {
        match mode {
            Mode::Exclusive => self
                .policy
                .try_acquire_exclusive(&self.sync, arg)
                .then_some(0),
            Mode::Shared => match self.policy.try_acquire_shared(&self.sync, arg) {
                SharedAcquire::Success { remaining } => Some(remaining),
                SharedAcquire::Failure => None,
            },
        }
    }

    /// The core loop, shared by every blocking flavor and by condition
    /// re-acquisition. `node_ref` must already be enqueued.
    pub(crate) fn acquire_queued(
        &self,
        node_ref: NodeRef,
        mode: Mode,
        arg: u64,
        blocking: Blocking,
    ) -> AcquireOutcome {
        let token = interrupt::current();
        let mut pending_interrupt = false;
        let mut spins = self.config.spin_limit;

        loop {
            let pred = self.queue.fix_prev_and_reclaim(node_ref);
            if pred == self.queue.head_ref() {
                if let Some(remaining) = self.try_policy(mode, arg) {
                    self.queue.set_head(node_ref);
                    if mode == Mode::Shared && remaining > 0 {
                        // Cascade: the state still has capacity, unblock the
                        // next shared waiter without another release
                        self.queue.wake_next_if_shared(node_ref);
                    }
                    if pending_interrupt {
                        // Uninterruptible flavor: restore the flag only now
                        token.interrupt();
                    }
                    return AcquireOutcome::Acquired;
                }
                if spins > 0 {
                    spins -= 1;
                    std::hint::spin_loop();
                    continue;
                }
            }

            if token.is_interrupted() {
                token.clear();
                match blocking {
                    Blocking::Block { interruptible: false } => {
                        pending_interrupt = true;
                    }
                    _ => return self.cancel_acquire(node_ref, AcquireOutcome::Interrupted),
                }
                continue;
            }

            let deadline = match blocking {
                Blocking::Until(deadline) => {
                    if Instant::now() >= deadline {
                        return self.cancel_acquire(node_ref, AcquireOutcome::TimedOut);
                    }
                    Some(deadline)
                }
                Blocking::Block { .. } => None,
            };

            let node = self
                .queue
                .node(node_ref)
                .expect("own wait node reclaimed while acquiring");
            if node.parker().park(deadline, Some(&token)) == ParkOutcome::TimedOut {
                return self.cancel_acquire(node_ref, AcquireOutcome::TimedOut);
            }
        }
    }

    /// Abort a queued attempt, leaving the state cell untouched and never
    /// swallowing a wake meant for the next waiter
    fn cancel_acquire(&self, node_ref: NodeRef, outcome: AcquireOutcome) -> AcquireOutcome {
        self.queue.cancel(node_ref);
        outcome
    }

    /// Re-acquire with a node already transferred back into the main queue.
    /// Always uninterruptible: a condition waiter must reacquire the lock
    /// before it can report anything, interruption included.
    pub(crate) fn reacquire_after_condition(&self, node_ref: NodeRef, arg: u64) {
        let outcome = self.acquire_queued(
            node_ref,
            Mode::Exclusive,
            arg,
            Blocking::Block { interruptible: false },
        );
        debug_assert_eq!(outcome, AcquireOutcome::Acquired);
    }
}
