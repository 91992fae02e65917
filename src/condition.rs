/*!
 * Condition Queues
 *
 * Monitor-style wait/signal bound to an exclusive synchronizer. Each
 * condition keeps a private singly linked list of waiting nodes; `signal`
 * moves the first of them onto the synchronizer's main wait queue, where it
 * competes for the lock like any other waiter.
 *
 * # Design
 *
 * The private list is only ever relinked while the lock is held, so its
 * manipulation needs no CAS. Status transitions are the one exception:
 * a timing-out or interrupted waiter claims its own node with a
 * `Condition -> Waiting` CAS without the lock, racing any signaller. Whoever
 * wins the CAS performs the transfer; the loser follows the winner's
 * outcome. A node abandoned on the list this way is unlinked lazily, under
 * the lock, by the next thread that walks the list.
 */

use crate::errors::AcquireError;
use crate::park::interrupt;
use crate::queue::node::{status, NodeRef, NIL};
use crate::synchronizer::{RawSynchronizer, SyncPolicy};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const COND_LINKAGE_VIOLATION: &str =
    "condition list corrupted: a listed waiter's slot was reclaimed";

/// How a timed condition wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitOutcome {
    /// Woken by a signal (or a barging wake); the predicate may still be
    /// false and must be rechecked
    Signalled,
    /// The deadline elapsed before any signal arrived
    TimedOut,
}

/// A wait queue bound to one exclusive synchronizer. All operations require
/// the lock to be held by the calling thread and panic otherwise.
pub struct Condition<P: SyncPolicy> {
    owner: Arc<RawSynchronizer<P>>,
    /// Head and tail of the private waiter list, linked via `cond_next`
    first: AtomicU64,
    last: AtomicU64,
}

impl<P: SyncPolicy> Condition<P> {
    pub fn new(owner: Arc<RawSynchronizer<P>>) -> Self {
        Self {
            owner,
            first: AtomicU64::new(NIL.raw()),
            last: AtomicU64::new(NIL.raw()),
        }
    }

    /// Release the lock and block until signalled or interrupted, then
    /// reacquire before returning. Spurious wakeups are possible; callers
    /// recheck their predicate in a loop.
    pub fn wait(&self) -> Result<(), AcquireError> {
        self.wait_inner(None, true).map(|_| ())
    }

    /// Like [`wait`](Self::wait) with a deadline. `Ok(TimedOut)` still means
    /// the lock has been reacquired.
    pub fn wait_timed(&self, timeout: Duration) -> Result<AwaitOutcome, AcquireError> {
        self.wait_inner(Some(Instant::now() + timeout), true)
    }

    /// Wait without observing interruption. An interrupt delivered during
    /// the wait is remembered and the flag restored before returning.
    pub fn wait_uninterruptibly(&self) {
        // Infallible: no deadline and interruption deferred
        let _ = self.wait_inner(None, false);
    }

    /// Move the longest-waiting node to the main queue and wake it
    pub fn signal(&self) {
        self.assert_owned();
        loop {
            let first = self.pop_front();
            if first.is_nil() || self.transfer_for_signal(first) {
                return;
            }
        }
    }

    /// Move every waiting node to the main queue
    pub fn signal_all(&self) {
        self.assert_owned();
        loop {
            let first = self.pop_front();
            if first.is_nil() {
                return;
            }
            self.transfer_for_signal(first);
        }
    }

    /// Whether any thread is waiting on this condition
    pub fn has_waiters(&self) -> bool {
        self.assert_owned();
        let mut cur = NodeRef::from_raw(self.first.load(Ordering::Acquire));
        while !cur.is_nil() {
            let node = self.node(cur);
            if node.status() == status::CONDITION {
                return true;
            }
            cur = node.cond_next();
        }
        false
    }

    fn wait_inner(
        &self,
        deadline: Option<Instant>,
        interruptible: bool,
    ) -> Result<AwaitOutcome, AcquireError> {
        self.assert_owned();
        let token = interrupt::current();
        if interruptible && token.clear() {
            return Err(AcquireError::Interrupted);
        }

        // Waiting for a slot while holding the lock could deadlock (slots
        // free through acquisitions that need this lock), so a full slab
        // degrades to a spurious wake: release, yield, reacquire. The
        // caller's predicate loop absorbs it.
        let Some(node_ref) = self.try_add_waiter() else {
            log::warn!("wait-node slab exhausted; condition wait degraded to a spurious wake");
            let saved_holds = self.owner.policy.current_holds(&self.owner.sync);
            self.owner.release_exclusive(saved_holds);
            std::thread::yield_now();
            self.owner.acquire_exclusive(saved_holds);
            return Ok(AwaitOutcome::Signalled);
        };
        let node = self.node(node_ref);

        // Fully release, however many reentrant holds are stacked
        let saved_holds = self.owner.policy.current_holds(&self.owner.sync);
        self.owner.release_exclusive(saved_holds);

        let mut interrupted_before_signal = false;
        let mut timed_out = false;
        let mut pending_interrupt = false;

        loop {
            if node.status() != status::CONDITION {
                // A signaller claimed the node and is transferring it
                break;
            }

            if token.is_interrupted() {
                token.clear();
                if !interruptible {
                    pending_interrupt = true;
                    continue;
                }
                if node.transition_status(status::CONDITION, status::WAITING) {
                    interrupted_before_signal = true;
                    self.owner.queue.enqueue(node_ref);
                } else {
                    // A signal won the claim: treat as signalled, but keep
                    // the interrupt observable after we return
                    pending_interrupt = true;
                }
                break;
            }

            if let Some(d) = deadline {
                if Instant::now() >= d {
                    if node.transition_status(status::CONDITION, status::WAITING) {
                        timed_out = true;
                        self.owner.queue.enqueue(node_ref);
                    }
                    break;
                }
            }

            node.parker().park(deadline, Some(&token));
        }

        // If a signaller won the claim it may not have published the node
        // into the main queue yet
        while !self.owner.queue.is_enqueued(node_ref) {
            std::hint::spin_loop();
        }

        self.owner.reacquire_after_condition(node_ref, saved_holds);

        // Holding the lock again, and our node cannot be reclaimed while we
        // do: scrub abandoned entries (ours included) off the private list
        self.unlink_cancelled_waiters();

        if pending_interrupt {
            token.interrupt();
        }
        if interrupted_before_signal {
            return Err(AcquireError::Interrupted);
        }
        Ok(if timed_out {
            AwaitOutcome::TimedOut
        } else {
            AwaitOutcome::Signalled
        })
    }

    /// Append a fresh node for the calling thread. Lock held. `None` when
    /// the slab has no free slot.
    fn try_add_waiter(&self) -> Option<NodeRef> {
        let last = NodeRef::from_raw(self.last.load(Ordering::Acquire));
        if !last.is_nil() && self.node(last).status() != status::CONDITION {
            self.unlink_cancelled_waiters();
        }

        let node_ref = self
            .owner
            .queue
            .try_alloc_node(crate::queue::node::Mode::Exclusive, status::CONDITION)?;

        let last = NodeRef::from_raw(self.last.load(Ordering::Acquire));
        if last.is_nil() {
            self.first.store(node_ref.raw(), Ordering::Release);
        } else {
            self.node(last).set_cond_next(node_ref);
        }
        self.last.store(node_ref.raw(), Ordering::Release);
        Some(node_ref)
    }

    /// Detach the list head. Lock held. Returns NIL when the list is empty.
    fn pop_front(&self) -> NodeRef {
        let first = NodeRef::from_raw(self.first.load(Ordering::Acquire));
        if first.is_nil() {
            return first;
        }

        let node = self.node(first);
        let next = node.cond_next();
        node.set_cond_next(NIL);
        self.first.store(next.raw(), Ordering::Release);
        if next.is_nil() {
            self.last.store(NIL.raw(), Ordering::Release);
        }
        first
    }

    /// Claim a popped node and move it to the main queue. Returns false when
    /// the waiter already claimed it itself (timeout or interrupt).
    fn transfer_for_signal(&self, node_ref: NodeRef) -> bool {
        let node = self.node(node_ref);
        if !node.transition_status(status::CONDITION, status::WAITING) {
            return false;
        }
        self.owner.queue.enqueue(node_ref);
        node.parker().unpark();
        true
    }

    /// Drop every node no longer in `Condition` status off the list. Lock
    /// held. On-list nodes are never reclaimed (their owners unlink them
    /// before releasing the lock), so resolution cannot fail.
    fn unlink_cancelled_waiters(&self) {
        let mut trail = NIL;
        let mut cur = NodeRef::from_raw(self.first.load(Ordering::Acquire));

        while !cur.is_nil() {
            let node = self.node(cur);
            let next = node.cond_next();

            if node.status() != status::CONDITION {
                node.set_cond_next(NIL);
                if trail.is_nil() {
                    self.first.store(next.raw(), Ordering::Release);
                } else {
                    self.node(trail).set_cond_next(next);
                }
                if next.is_nil() {
                    self.last.store(trail.raw(), Ordering::Release);
                }
            } else {
                trail = cur;
            }
            cur = next;
        }
    }

    #[inline]
    fn node(&self, r: NodeRef) -> &crate::queue::node::Node {
        self.owner.queue.node(r).expect(COND_LINKAGE_VIOLATION)
    }

    #[inline]
    fn assert_owned(&self) {
        assert!(
            self.owner.is_held_exclusively(),
            "condition used by a thread that does not hold its lock"
        );
    }
}
