/*!
 * Node Slab
 *
 * Fixed-capacity arena of wait nodes with a Treiber-stack free list. Slots
 * never move, so node addresses are stable parking keys for the lifetime of
 * the owning synchronizer. Generation tags defeat ABA on the free-list CAS
 * and let traversals detect recycled slots.
 */

use super::node::{status, Node, NodeRef, NIL};
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct NodeSlab {
    nodes: Box<[Node]>,
    /// Top of the free stack, threaded through each free node's `next` field
    free_head: AtomicU64,
}

impl NodeSlab {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0 && capacity < u32::MAX as usize);

        let nodes: Box<[Node]> = (0..capacity).map(|_| Node::new()).collect();

        // Thread the initial free list through the slots in order
        for (i, node) in nodes.iter().enumerate() {
            let link = if i + 1 < capacity {
                NodeRef::new((i + 1) as u32, 0)
            } else {
                NIL
            };
            node.set_next(link);
        }

        Self {
            nodes,
            free_head: AtomicU64::new(NodeRef::new(0, 0).raw()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Resolve a ref if its slot has not been recycled since the ref was
    /// taken. The check is racy by design: a slot may be recycled right
    /// after it passes, so callers either tolerate stale reads (unpark is
    /// idempotent and spurious wakes are allowed) or re-validate and
    /// restart their traversal.
    #[inline]
    pub fn node(&self, r: NodeRef) -> Option<&Node> {
        if r.is_nil() {
            return None;
        }
        let node = &self.nodes[r.index()];
        if node.generation() == r.generation() {
            Some(node)
        } else {
            None
        }
    }

    /// Whether a previously resolved ref is still current
    #[inline]
    pub fn validate(&self, r: NodeRef) -> bool {
        !r.is_nil() && self.nodes[r.index()].generation() == r.generation()
    }

    /// Pop a free slot, or `None` when the slab is exhausted.
    ///
    /// The returned slot is exclusively owned by the caller until it is
    /// published into a queue.
    pub fn alloc(&self) -> Option<NodeRef> {
        loop {
            let top_raw = self.free_head.load(Ordering::Acquire);
            let top = NodeRef::from_raw(top_raw);
            if top.is_nil() {
                return None;
            }

            // The generation embedded in the stack entry makes this CAS
            // immune to ABA: a popped-and-repushed slot carries a new tag.
            let next = self.nodes[top.index()].next().raw();
            if self
                .free_head
                .compare_exchange(top_raw, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(top);
            }
        }
    }

    /// Return a slot to the free list. The ref is invalidated first, so any
    /// stale holder fails generation validation from this point on.
    pub fn free(&self, r: NodeRef) {
        let node = &self.nodes[r.index()];
        debug_assert_eq!(node.status(), status::RECLAIMED, "freeing a live node");

        let new_gen = node.bump_generation();
        let new_ref = NodeRef::new(r.index() as u32, new_gen);

        loop {
            let top = self.free_head.load(Ordering::Acquire);
            node.set_next(NodeRef::from_raw(top));
            if self
                .free_head
                .compare_exchange(top, new_ref.raw(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Claim a node for reclamation (CAS to `Reclaimed`) and free it.
    /// The claim serializes racing reclaimers; the loser does nothing.
    pub fn reclaim(&self, r: NodeRef, expected_status: u32) -> bool {
        if let Some(node) = self.node(r) {
            if node.transition_status(expected_status, status::RECLAIMED) {
                self.free(r);
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::node::Mode;

    #[test]
    fn test_alloc_until_exhaustion() {
        let slab = NodeSlab::with_capacity(4);
        let refs: Vec<_> = (0..4).map(|_| slab.alloc().unwrap()).collect();
        assert!(slab.alloc().is_none());

        // Distinct slots
        let mut indices: Vec<_> = refs.iter().map(|r| r.index()).collect();
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), 4);
    }

    #[test]
    fn test_recycled_ref_fails_validation() {
        let slab = NodeSlab::with_capacity(2);
        let r = slab.alloc().unwrap();
        let node = slab.node(r).unwrap();
        node.init(Mode::Exclusive, status::WAITING);
        assert!(slab.validate(r));

        node.set_status(status::RECLAIMED);
        slab.free(r);
        assert!(!slab.validate(r));
        assert!(slab.node(r).is_none());

        // The slot comes back with a fresh generation
        let r2 = slab.alloc().unwrap();
        let r3 = slab.alloc().unwrap();
        assert!(r2.generation() > 0 || r3.generation() > 0);
        assert_ne!(r2, r);
        assert_ne!(r3, r);
    }
}
