/*!
 * Wait Queue
 *
 * Lock-free FIFO of blocked-thread nodes, CLH/MCS style: a doubly linked
 * list over slab slots with CAS-updated head and tail, plus a dummy head
 * node holding the most recent acquirer.
 *
 * # Design
 *
 * - The backward (`prev`) chain is authoritative: it is set before a node is
 *   published as tail, so a traversal from a fresh tail always sees a
 *   consistent, terminated chain. Forward (`next`) links are lagging hints.
 * - Cancelled nodes are tombstones: marked in place, bypassed in the hints,
 *   and reclaimed lazily: by the live successor that repairs its `prev`
 *   across them, or by the canceller itself when it can retreat the tail.
 *   Until reclaimed they keep their own `prev` intact, so the backward
 *   chain never dangles.
 * - Any traversal that observes a recycled slot (generation mismatch)
 *   restarts from a fresh tail read. Unparks aimed at recycled slots are
 *   benign: every waiter re-validates after waking.
 */

pub(crate) mod node;
pub(crate) mod slab;

use node::{status, Mode, Node, NodeRef, NIL};
use slab::NodeSlab;
use std::sync::atomic::{AtomicU64, Ordering};

const LINKAGE_VIOLATION: &str =
    "wait queue linkage corrupted: a live waiter's predecessor was reclaimed";

pub(crate) struct WaitQueue {
    slab: NodeSlab,
    /// Dummy head: the last acquirer's node. Installed at construction.
    head: AtomicU64,
    tail: AtomicU64,
}

impl WaitQueue {
    /// `capacity` counts slab slots; one is consumed up front by the dummy
    /// head, so the queue holds at most `capacity - 1` simultaneous waiters.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity >= 2, "capacity must cover the dummy head plus one waiter");
        let slab = NodeSlab::with_capacity(capacity);

        // Install the dummy head eagerly. This removes the empty-queue
        // special case from enqueue and wake, and keeps node allocation a
        // single fallible attempt with no hidden blocking.
        let dummy = slab.alloc().expect(LINKAGE_VIOLATION);
        slab.node(dummy)
            .expect(LINKAGE_VIOLATION)
            .init(Mode::Exclusive, status::GRANTED);

        Self {
            slab,
            head: AtomicU64::new(dummy.raw()),
            tail: AtomicU64::new(dummy.raw()),
        }
    }

    #[inline]
    pub fn node(&self, r: NodeRef) -> Option<&Node> {
        self.slab.node(r)
    }

    #[inline]
    pub fn head_ref(&self) -> NodeRef {
        NodeRef::from_raw(self.head.load(Ordering::Acquire))
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slab.capacity()
    }

    /// Whether any node sits behind the head. Conservative: a queue holding
    /// only cancelled stragglers still counts, which at worst sends a fair
    /// acquirer through the slow path.
    pub fn has_queued_waiters(&self) -> bool {
        self.head.load(Ordering::Acquire) != self.tail.load(Ordering::Acquire)
    }

    /// Allocate and initialize a slot, or `None` when the slab is exhausted.
    /// Never blocks; callers that can wait for a slot do so in their own
    /// loop where deadline and interrupt checks stay reachable.
    pub fn try_alloc_node(&self, mode: Mode, initial_status: u32) -> Option<NodeRef> {
        let r = self.slab.alloc()?;
        // Exclusive ownership until published
        self.slab
            .node(r)
            .expect(LINKAGE_VIOLATION)
            .init(mode, initial_status);
        Some(r)
    }

    /// Append a node at the tail. The node's `prev` is set before the tail
    /// CAS publishes it, so backward traversal never sees a half-linked
    /// node. Returns the predecessor.
    pub fn enqueue(&self, node_ref: NodeRef) -> NodeRef {
        let node = self.slab.node(node_ref).expect(LINKAGE_VIOLATION);
        loop {
            let tail_raw = self.tail.load(Ordering::Acquire);
            let tail = NodeRef::from_raw(tail_raw);

            node.set_prev(tail);
            if self
                .tail
                .compare_exchange(tail_raw, node_ref.raw(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // The old tail cannot be reclaimed before this hint lands:
                // reclamation requires either a successor repairing across
                // it (we are that successor, and we don't) or a successful
                // tail retreat (our CAS just moved the tail off it).
                self.slab
                    .node(tail)
                    .expect(LINKAGE_VIOLATION)
                    .set_next(node_ref);
                return tail;
            }
        }
    }

    /// Walk the calling waiter's `prev` past cancelled predecessors,
    /// repairing the link and reclaiming each skipped tombstone. Returns the
    /// nearest live predecessor (the head, or a waiting node).
    ///
    /// Only the unique live successor of a cancelled node ever skips it, so
    /// the slots reclaimed here cannot be double-freed, and the caller's own
    /// `prev` can never have been reclaimed by anyone else.
    pub fn fix_prev_and_reclaim(&self, node_ref: NodeRef) -> NodeRef {
        let node = self.slab.node(node_ref).expect(LINKAGE_VIOLATION);
        let mut pred_ref = node.prev();
        loop {
            let pred = self.slab.node(pred_ref).expect(LINKAGE_VIOLATION);
            if pred.status() != status::CANCELLED {
                return pred_ref;
            }

            let skipped_to = pred.prev();
            node.set_prev(skipped_to);
            self.slab.reclaim(pred_ref, status::CANCELLED);
            pred_ref = skipped_to;
        }
    }

    /// Promote an acquiring first node to dummy head and retire the old one.
    /// Called only by the node that just acquired, so at most one promotion
    /// is in flight at a time.
    pub fn set_head(&self, node_ref: NodeRef) {
        let node = self.slab.node(node_ref).expect(LINKAGE_VIOLATION);
        let old = NodeRef::from_raw(self.head.load(Ordering::Acquire));
        debug_assert_eq!(node.prev(), old, "promoting a node that is not first");

        node.set_status(status::GRANTED);
        node.set_prev(NIL);
        self.head.store(node_ref.raw(), Ordering::Release);

        if !old.is_nil() {
            self.slab.reclaim(old, status::GRANTED);
        }
    }

    /// Abandon a queued acquisition attempt: tombstone the node, patch the
    /// forward hint around it, retreat the tail if it has no successor, and
    /// wake onward, since the cancelled node may have been blocking a
    /// pending wake meant for the next live waiter.
    pub fn cancel(&self, node_ref: NodeRef) {
        let node = self.slab.node(node_ref).expect(LINKAGE_VIOLATION);

        // Compact our own stretch of tombstones while we are still the live
        // successor entitled to reclaim them.
        let pred_ref = self.fix_prev_and_reclaim(node_ref);
        let succ = node.next();

        if let Some(pred) = self.slab.node(pred_ref) {
            pred.patch_next(node_ref, succ);
        }

        node.set_status(status::CANCELLED);

        // No successor will ever repair across us if none exists: retreat
        // the tail and reclaim our own slot. A racing enqueuer either beat
        // this CAS (and becomes our reclaiming successor) or re-reads the
        // retreated tail.
        if self
            .tail
            .compare_exchange(node_ref.raw(), pred_ref.raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.slab.reclaim(node_ref, status::CANCELLED);
        }

        log::trace!("wait node cancelled; waking onward");
        self.wake_first_waiter();
    }

    /// Shared-success cascade: wake the new head's successor only when it is
    /// itself a shared waiter. An exclusive successor cannot proceed while
    /// shared holders remain, and will be woken by the final release. An
    /// unusable forward hint falls back to the conservative full wake.
    pub fn wake_next_if_shared(&self, head_ref: NodeRef) {
        if let Some(head) = self.slab.node(head_ref) {
            let hint = head.next();
            if self.slab.validate(head_ref) {
                if let Some(succ) = self.slab.node(hint) {
                    if succ.status() == status::WAITING {
                        if succ.is_shared() {
                            succ.parker().unpark();
                        }
                        return;
                    }
                }
            }
        }
        self.wake_first_waiter();
    }

    /// Whether a node has been published into the main queue, i.e. is
    /// reachable from the tail over the backward chain. Used by condition
    /// waiters to wait out a racing signaller's transfer before reacquiring.
    pub fn is_enqueued(&self, node_ref: NodeRef) -> bool {
        'restart: loop {
            let head = NodeRef::from_raw(self.head.load(Ordering::Acquire));
            let mut cur = NodeRef::from_raw(self.tail.load(Ordering::Acquire));
            let mut steps = 0usize;

            while !cur.is_nil() {
                if cur == node_ref {
                    return true;
                }
                if cur == head {
                    return false;
                }
                let node = match self.slab.node(cur) {
                    Some(n) => n,
                    None => continue 'restart,
                };
                let prev = node.prev();
                if !self.slab.validate(cur) {
                    continue 'restart;
                }
                cur = prev;

                steps += 1;
                if steps > self.slab.capacity() {
                    continue 'restart;
                }
            }
            return false;
        }
    }

    /// Unpark the waiting node nearest the head, if any.
    ///
    /// Tries the forward hint from the head first; falls back to the
    /// authoritative backward scan from a fresh tail (a node's forward link
    /// may not be published yet when its backward link already is). A
    /// generation mismatch anywhere restarts the scan.
    pub fn wake_first_waiter(&self) {
        let head_ref = NodeRef::from_raw(self.head.load(Ordering::Acquire));

        if let Some(head) = self.slab.node(head_ref) {
            let hint = head.next();
            if self.slab.validate(head_ref) {
                if let Some(succ) = self.slab.node(hint) {
                    if succ.status() == status::WAITING {
                        succ.parker().unpark();
                        return;
                    }
                }
            }
        }

        'restart: loop {
            let head = NodeRef::from_raw(self.head.load(Ordering::Acquire));
            let mut cur = NodeRef::from_raw(self.tail.load(Ordering::Acquire));
            let mut candidate = NIL;
            let mut steps = 0usize;

            while !cur.is_nil() && cur != head {
                let node = match self.slab.node(cur) {
                    Some(n) => n,
                    None => continue 'restart,
                };
                let st = node.status();
                let prev = node.prev();
                if !self.slab.validate(cur) {
                    continue 'restart;
                }
                if st == status::WAITING {
                    candidate = cur;
                }
                cur = prev;

                steps += 1;
                if steps > self.slab.capacity() {
                    // Stale links formed a cycle; rescan
                    continue 'restart;
                }
            }

            if let Some(found) = self.slab.node(candidate) {
                if found.status() == status::WAITING {
                    found.parker().unpark();
                }
            }
            return;
        }
    }
}
