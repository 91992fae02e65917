/*!
 * Atomic State Cell
 *
 * The single shared word every synchronization variant is built on. Its
 * meaning is defined per variant (0/1 for a mutex, remaining permits for a
 * semaphore, remaining count for a latch, packed reader/writer counts for a
 * read-write lock). It is only ever modified through compare-and-swap or
 * acquire/release-ordered loads and stores; no lock guards it.
 *
 * # Memory ordering
 *
 * A `set_release` store is visible, together with everything program-ordered
 * before it, to any thread whose `get_acquire` load observes it. CAS uses
 * AcqRel on success so a successful transition both publishes prior writes
 * and observes the writes published by the previous transition.
 */

use std::sync::atomic::{AtomicU64, Ordering};

use crate::park::interrupt::current_thread_id;

/// A 64-bit atomic state word with documented fence semantics
#[derive(Debug)]
pub struct StateCell(AtomicU64);

impl StateCell {
    /// Create a cell holding `initial`
    pub const fn new(initial: u64) -> Self {
        Self(AtomicU64::new(initial))
    }

    /// Atomically replace `expected` with `desired`.
    ///
    /// Returns `true` iff the current value equaled `expected`. Failure has
    /// no side effect and never panics.
    #[inline]
    pub fn compare_and_set(&self, expected: u64, desired: u64) -> bool {
        self.0
            .compare_exchange(expected, desired, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Acquire-ordered load
    #[inline]
    pub fn get_acquire(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Release-ordered store
    #[inline]
    pub fn set_release(&self, value: u64) {
        self.0.store(value, Ordering::Release);
    }

    /// Release-ordered add, returning the previous value
    #[inline]
    pub fn fetch_add_release(&self, delta: u64) -> u64 {
        self.0.fetch_add(delta, Ordering::Release)
    }
}

/// State cell plus exclusive-owner identity, shared by the core and the
/// per-variant acquire/release policies.
///
/// The owner word holds the acquiring thread's id (nonzero) while an
/// exclusive hold is in effect, or 0 when free. Only the owning thread
/// writes it while held, so reentrant variants may read-modify the state
/// cell without CAS once ownership is established.
#[derive(Debug)]
pub struct SyncState {
    cell: StateCell,
    owner: AtomicU64,
}

impl SyncState {
    pub fn new(initial: u64) -> Self {
        Self {
            cell: StateCell::new(initial),
            owner: AtomicU64::new(0),
        }
    }

    /// The raw state word
    #[inline]
    pub fn cell(&self) -> &StateCell {
        &self.cell
    }

    /// Current exclusive owner id, 0 if none
    #[inline]
    pub fn owner(&self) -> u64 {
        self.owner.load(Ordering::Acquire)
    }

    /// Record the calling thread as exclusive owner
    #[inline]
    pub fn set_owner_current(&self) {
        self.owner.store(current_thread_id(), Ordering::Release);
    }

    /// Clear exclusive ownership. Must precede the state-cell release write
    /// so a new owner never observes a stale owner id after acquiring.
    #[inline]
    pub fn clear_owner(&self) {
        self.owner.store(0, Ordering::Release);
    }

    /// Whether the calling thread holds exclusive ownership
    #[inline]
    pub fn is_held_by_current(&self) -> bool {
        self.owner() == current_thread_id()
    }
}
