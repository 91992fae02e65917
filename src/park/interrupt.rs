/*!
 * Thread Interruption
 *
 * Rust threads carry no interrupt status, so blocked acquires get one here:
 * every thread owns an [`InterruptToken`] (lazily created, thread-local) and
 * hands clones of it to whoever may need to abort its blocking waits.
 *
 * Interruption is cooperative: `interrupt()` raises the flag and delivers a
 * wake to whatever parker the thread is currently blocked on. Interruptible
 * operations observe the flag, consume it, and return
 * [`AcquireError::Interrupted`](crate::errors::AcquireError); uninterruptible
 * operations remember it and restore the flag once they finally acquire.
 */

use parking_lot_core::UnparkToken;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-thread interrupt status plus the parking key the thread is currently
/// blocked on (0 when not parked).
#[derive(Debug)]
pub struct InterruptToken {
    interrupted: AtomicBool,
    park_key: AtomicUsize,
}

impl InterruptToken {
    fn new() -> Self {
        Self {
            interrupted: AtomicBool::new(false),
            park_key: AtomicUsize::new(0),
        }
    }

    /// Raise the interrupt flag and wake the owning thread if it is parked.
    ///
    /// SeqCst ordering on the flag store and key load pairs with the
    /// key-publish/flag-check sequence in [`Parker::park`](crate::park::Parker::park):
    /// either the parker observes the flag before sleeping, or this call
    /// observes the published key and delivers the wake.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        let key = self.park_key.load(Ordering::SeqCst);
        if key != 0 {
            unsafe {
                parking_lot_core::unpark_one(key, |_| UnparkToken(0));
            }
        }
    }

    /// Whether the flag is currently raised
    #[inline]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Consume the flag, returning its previous value
    #[inline]
    pub fn clear(&self) -> bool {
        self.interrupted.swap(false, Ordering::SeqCst)
    }

    #[inline]
    pub(crate) fn set_park_key(&self, key: usize) {
        self.park_key.store(key, Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn clear_park_key(&self) {
        self.park_key.store(0, Ordering::SeqCst);
    }
}

thread_local! {
    static TOKEN: Arc<InterruptToken> = Arc::new(InterruptToken::new());
}

/// The calling thread's interrupt token
pub fn current() -> Arc<InterruptToken> {
    TOKEN.with(Arc::clone)
}

/// Alias of [`current`]; reads better when the clone is handed to another
/// thread as an interrupt handle.
pub fn handle() -> Arc<InterruptToken> {
    current()
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Stable nonzero id for the calling thread, used as the exclusive-owner
/// identity. Ids are never reused within a process run.
#[inline]
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}
