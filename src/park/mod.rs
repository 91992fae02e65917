/*!
 * Thread Parking
 *
 * Single-permit block/wake primitive built on `parking_lot_core`. On Linux
 * the underlying parking maps to futex syscalls; elsewhere it uses the
 * portable keyed parking lot. The parker's own address is the parking key,
 * so parking costs no allocation and needs no registry.
 *
 * # Permit semantics
 *
 * A parker holds at most one wake-up permit. `unpark` stores the permit and
 * wakes the parked thread if there is one; a second `unpark` before the
 * matching `park` is a no-op. Permits never accumulate; callers that rely
 * on counted wakes must count themselves.
 *
 * # Spurious wakeups
 *
 * `park` may return [`ParkOutcome::Spurious`] when woken without a permit
 * (interruption probes and recycled wait-queue slots both cause this).
 * Callers always re-check their condition in a loop.
 */

pub mod interrupt;

use parking_lot_core::{ParkResult, ParkToken, UnparkToken};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use interrupt::InterruptToken;

const EMPTY: usize = 0;
const NOTIFIED: usize = 1;
const PARKED: usize = 2;

/// Outcome of a single `park` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParkOutcome {
    /// A permit was consumed (wake was intended for this parker)
    Unparked,
    /// The deadline elapsed with no permit delivered
    TimedOut,
    /// Woken without a permit; the caller must re-check its condition
    Spurious,
}

/// Single-permit thread parker with deadline support
#[derive(Debug)]
pub struct Parker {
    state: AtomicUsize,
}

impl Parker {
    pub const fn new() -> Self {
        Self {
            state: AtomicUsize::new(EMPTY),
        }
    }

    /// Parking-lot key: the stable address of the state word
    #[inline]
    fn key(&self) -> usize {
        &self.state as *const AtomicUsize as usize
    }

    /// Block the calling thread until a permit arrives, the deadline passes,
    /// or a spurious wake occurs.
    ///
    /// When `interrupt` is supplied, the token is registered as parked at
    /// this key for the duration of the call so [`InterruptToken::interrupt`]
    /// can deliver a wake, and a pending interrupt prevents going to sleep
    /// (returned as `Spurious`; the caller reads the flag itself).
    pub fn park(&self, deadline: Option<Instant>, interrupt: Option<&InterruptToken>) -> ParkOutcome {
        // Consume a pending permit without sleeping
        if self
            .state
            .compare_exchange(NOTIFIED, EMPTY, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return ParkOutcome::Unparked;
        }

        if let Some(token) = interrupt {
            if token.is_interrupted() {
                return ParkOutcome::Spurious;
            }
        }

        if self
            .state
            .compare_exchange(EMPTY, PARKED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // A permit landed between the two checks
            return if self.state.swap(EMPTY, Ordering::SeqCst) == NOTIFIED {
                ParkOutcome::Unparked
            } else {
                ParkOutcome::Spurious
            };
        }

        if let Some(token) = interrupt {
            token.set_park_key(self.key());
        }

        // The validate closure runs under the parking-lot bucket lock, so it
        // is ordered against both unpark() and InterruptToken::interrupt():
        // whichever fires first is either observed here or wakes us.
        let result = unsafe {
            parking_lot_core::park(
                self.key(),
                || {
                    self.state.load(Ordering::SeqCst) == PARKED
                        && interrupt.map_or(true, |t| !t.is_interrupted())
                },
                || {},
                |_, _| {},
                ParkToken(0),
                deadline,
            )
        };

        if let Some(token) = interrupt {
            token.clear_park_key();
        }

        // Only a delivered permit counts as Unparked. An interrupt wakes
        // through parking_lot_core's unpark too, but leaves no permit, so it
        // reports Spurious and the caller reads the flag itself.
        let prev = self.state.swap(EMPTY, Ordering::SeqCst);
        match result {
            _ if prev == NOTIFIED => ParkOutcome::Unparked,
            ParkResult::TimedOut => ParkOutcome::TimedOut,
            _ => ParkOutcome::Spurious,
        }
    }

    /// Deliver one wake-up permit, waking the parked thread if any.
    ///
    /// Idempotent while the permit is unconsumed; never blocks.
    pub fn unpark(&self) {
        if self.state.swap(NOTIFIED, Ordering::SeqCst) == PARKED {
            unsafe {
                parking_lot_core::unpark_one(self.key(), |_| UnparkToken(0));
            }
        }
    }

    /// Drop any pending permit. Used when a wait-queue slot is recycled so a
    /// stale wake aimed at the previous occupant is not inherited.
    pub(crate) fn reset(&self) {
        self.state.store(EMPTY, Ordering::SeqCst);
    }
}

impl Default for Parker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_unpark_before_park_is_consumed() {
        let parker = Parker::new();
        parker.unpark();
        assert_eq!(parker.park(None, None), ParkOutcome::Unparked);
    }

    #[test]
    fn test_permits_do_not_accumulate() {
        let parker = Parker::new();
        parker.unpark();
        parker.unpark();
        assert_eq!(parker.park(None, None), ParkOutcome::Unparked);

        // Second permit was a no-op: this park must time out
        let deadline = Instant::now() + Duration::from_millis(50);
        assert_eq!(parker.park(Some(deadline), None), ParkOutcome::TimedOut);
    }

    #[test]
    fn test_park_timeout() {
        let parker = Parker::new();
        let start = Instant::now();
        let outcome = parker.park(Some(Instant::now() + Duration::from_millis(50)), None);
        assert_eq!(outcome, ParkOutcome::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_unpark_wakes_parked_thread() {
        let parker = Arc::new(Parker::new());
        let parker_clone = parker.clone();

        let handle = thread::spawn(move || parker_clone.park(None, None));

        thread::sleep(Duration::from_millis(50));
        parker.unpark();

        assert_eq!(handle.join().unwrap(), ParkOutcome::Unparked);
    }

    #[test]
    fn test_interrupt_wakes_parked_thread() {
        let parker = Arc::new(Parker::new());
        let parker_clone = parker.clone();

        let (tx, rx) = std::sync::mpsc::channel();
        let handle = thread::spawn(move || {
            let token = interrupt::current();
            tx.send(interrupt::handle()).unwrap();
            let outcome = parker_clone.park(None, Some(&token));
            (outcome, token.is_interrupted())
        });

        let token = rx.recv().unwrap();
        thread::sleep(Duration::from_millis(50));
        token.interrupt();

        let (outcome, interrupted) = handle.join().unwrap();
        assert_eq!(outcome, ParkOutcome::Spurious);
        assert!(interrupted);
    }
}
