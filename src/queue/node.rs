/*!
 * Wait Nodes
 *
 * One node per blocked acquisition attempt. Nodes live in a preallocated
 * slab and are referenced by [`NodeRef`], a packed {generation, index}
 * pair, instead of raw pointers, so a recycled slot is detectable (the
 * generation no longer matches) rather than dangling.
 */

use crate::park::Parker;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Node status values. Transitions:
/// `Waiting -> Granted` (became queue head), `Waiting -> Cancelled`
/// (timeout/interrupt), `Condition -> Waiting` (transferred to the main
/// queue by signal or by the interrupted waiter itself), and
/// `Granted | Cancelled -> Reclaimed` (slot about to return to the slab).
pub(crate) mod status {
    /// Queued in the main queue, blocked or about to block
    pub const WAITING: u32 = 0;
    /// Acquired; now serves as the queue's dummy head
    pub const GRANTED: u32 = 1;
    /// Abandoned by timeout or interruption; unlinked lazily
    pub const CANCELLED: u32 = 2;
    /// Parked on a condition's private list, not in the main queue
    pub const CONDITION: u32 = 3;
    /// Claimed for return to the free list (terminal)
    pub const RECLAIMED: u32 = 4;
}

/// Acquisition mode carried by a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Exclusive,
    Shared,
}

impl Mode {
    fn as_u32(self) -> u32 {
        match self {
            Mode::Exclusive => 0,
            Mode::Shared => 1,
        }
    }
}

/// Packed generation-tagged slab reference: high 32 bits generation,
/// low 32 bits slot index. `NIL` is the all-ones pattern, which no live
/// reference can equal (slot indices are bounded by the slab capacity).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeRef(u64);

pub(crate) const NIL: NodeRef = NodeRef(u64::MAX);

impl NodeRef {
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | index as u64)
    }

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        (self.0 & 0xffff_ffff) as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub fn is_nil(self) -> bool {
        self.0 == u64::MAX
    }
}

/// One slab slot. All fields are atomics: wakers and scanners may read a
/// slot concurrently with (or after) its recycling, and correctness rests on
/// generation validation plus restart, never on exclusion.
#[derive(Debug)]
pub(crate) struct Node {
    /// Bumped on every free; a `NodeRef` is valid iff generations match
    generation: AtomicU32,
    status: AtomicU32,
    mode: AtomicU32,
    /// Backward link (toward head). Authoritative during concurrent
    /// traversal: set before the node is published as tail.
    prev: AtomicU64,
    /// Forward link (toward tail). A lagging hint only; doubles as the
    /// free-list link while the slot is unallocated.
    next: AtomicU64,
    /// Link in a condition's private list; independent of `next` because a
    /// signalled node is re-enqueued while still chained on the list
    cond_next: AtomicU64,
    /// Wake permit for the blocked owner
    parker: Parker,
}

impl Node {
    pub const fn new() -> Self {
        Self {
            generation: AtomicU32::new(0),
            status: AtomicU32::new(status::RECLAIMED),
            mode: AtomicU32::new(0),
            prev: AtomicU64::new(u64::MAX),
            next: AtomicU64::new(u64::MAX),
            cond_next: AtomicU64::new(u64::MAX),
            parker: Parker::new(),
        }
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    /// Invalidate all outstanding refs to this slot and return the new
    /// generation. Called exactly once per free, by the reclaiming thread.
    #[inline]
    pub fn bump_generation(&self) -> u32 {
        self.generation.fetch_add(1, Ordering::Release) + 1
    }

    #[inline]
    pub fn status(&self) -> u32 {
        self.status.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_status(&self, value: u32) {
        self.status.store(value, Ordering::Release);
    }

    #[inline]
    pub fn transition_status(&self, from: u32, to: u32) -> bool {
        self.status
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn is_shared(&self) -> bool {
        self.mode.load(Ordering::Relaxed) == Mode::Shared.as_u32()
    }

    #[inline]
    pub fn prev(&self) -> NodeRef {
        NodeRef::from_raw(self.prev.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_prev(&self, r: NodeRef) {
        self.prev.store(r.raw(), Ordering::Release);
    }

    #[inline]
    pub fn next(&self) -> NodeRef {
        NodeRef::from_raw(self.next.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_next(&self, r: NodeRef) {
        self.next.store(r.raw(), Ordering::Release);
    }

    /// Patch the forward hint `from -> to`; benign if the hint has moved on
    #[inline]
    pub fn patch_next(&self, from: NodeRef, to: NodeRef) -> bool {
        self.next
            .compare_exchange(from.raw(), to.raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn cond_next(&self) -> NodeRef {
        NodeRef::from_raw(self.cond_next.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_cond_next(&self, r: NodeRef) {
        self.cond_next.store(r.raw(), Ordering::Release);
    }

    #[inline]
    pub fn parker(&self) -> &Parker {
        &self.parker
    }

    /// Reinitialize a freshly allocated slot. The allocator owns the slot
    /// exclusively between free-list pop and queue publication.
    pub fn init(&self, mode: Mode, initial_status: u32) {
        self.status.store(initial_status, Ordering::Relaxed);
        self.mode.store(mode.as_u32(), Ordering::Relaxed);
        self.prev.store(NIL.raw(), Ordering::Relaxed);
        self.next.store(NIL.raw(), Ordering::Relaxed);
        self.cond_next.store(NIL.raw(), Ordering::Relaxed);
        self.parker.reset();
    }
}
