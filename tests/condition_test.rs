/*!
 * Condition queue tests: wakeup discipline, timeout, interruption
 */

use qsync::{interrupt, AcquireError, AwaitOutcome, ReentrantLock, SyncConfig};
use serial_test::serial;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

/// Lock + condition + guarded ticket counter, shared across waiter threads
struct Gate {
    lock: ReentrantLock,
    tickets: AtomicU64,
}

impl Gate {
    fn new() -> Self {
        Self {
            lock: ReentrantLock::new(),
            tickets: AtomicU64::new(0),
        }
    }
}

#[test]
#[serial]
fn test_signal_wakes_exactly_one() {
    let gate = Arc::new(Gate::new());
    let cond = Arc::new(gate.lock.new_condition());
    let through = Arc::new(AtomicU64::new(0));

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let gate = Arc::clone(&gate);
            let cond = Arc::clone(&cond);
            let through = Arc::clone(&through);
            thread::spawn(move || {
                gate.lock.lock();
                // Guarded predicate loop: spurious wakes must re-wait
                while gate.tickets.load(Ordering::SeqCst) == 0 {
                    cond.wait().unwrap();
                }
                gate.tickets.fetch_sub(1, Ordering::SeqCst);
                gate.lock.unlock();
                through.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(100));

    gate.lock.lock();
    gate.tickets.store(1, Ordering::SeqCst);
    cond.signal();
    gate.lock.unlock();

    thread::sleep(Duration::from_millis(200));
    assert_eq!(through.load(Ordering::SeqCst), 1, "signal woke != 1 waiter");

    // signal_all releases the rest
    gate.lock.lock();
    gate.tickets.store(2, Ordering::SeqCst);
    cond.signal_all();
    gate.lock.unlock();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(through.load(Ordering::SeqCst), 3);
}

#[test]
#[serial]
fn test_waiter_rechecks_predicate_and_proceeds_once() {
    let gate = Arc::new(Gate::new());
    let cond = Arc::new(gate.lock.new_condition());
    let proceeded = Arc::new(AtomicU64::new(0));

    let waiter = {
        let gate = Arc::clone(&gate);
        let cond = Arc::clone(&cond);
        let proceeded = Arc::clone(&proceeded);
        thread::spawn(move || {
            gate.lock.lock();
            while gate.tickets.load(Ordering::SeqCst) == 0 {
                cond.wait().unwrap();
            }
            // Predicate is true and the lock is held
            assert!(gate.lock.is_held_by_current_thread());
            assert_eq!(gate.tickets.load(Ordering::SeqCst), 1);
            proceeded.fetch_add(1, Ordering::SeqCst);
            gate.lock.unlock();
        })
    };

    thread::sleep(Duration::from_millis(100));
    gate.lock.lock();
    gate.tickets.store(1, Ordering::SeqCst);
    cond.signal();
    gate.lock.unlock();

    waiter.join().unwrap();
    assert_eq!(proceeded.load(Ordering::SeqCst), 1);
}

#[test]
#[serial]
fn test_timed_wait_times_out_with_lock_reacquired() {
    let lock = ReentrantLock::new();
    let cond = lock.new_condition();

    lock.lock();
    let outcome = cond.wait_timed(Duration::from_millis(100)).unwrap();
    assert_eq!(outcome, AwaitOutcome::TimedOut);

    // Returned holding the lock, whatever the outcome
    assert!(lock.is_held_by_current_thread());
    assert_eq!(lock.hold_count(), 1);
    lock.unlock();
}

#[test]
#[serial]
fn test_timed_wait_signalled_before_deadline() {
    let lock = ReentrantLock::new();
    let cond = Arc::new(lock.new_condition());

    let waiter_lock = lock.clone();
    let waiter_cond = Arc::clone(&cond);
    let waiter = thread::spawn(move || {
        waiter_lock.lock();
        let outcome = waiter_cond.wait_timed(Duration::from_secs(5)).unwrap();
        waiter_lock.unlock();
        outcome
    });

    thread::sleep(Duration::from_millis(100));
    lock.lock();
    cond.signal();
    lock.unlock();

    assert_eq!(waiter.join().unwrap(), AwaitOutcome::Signalled);
}

#[test]
#[serial]
fn test_wait_interrupted_reports_after_reacquiring() {
    let lock = ReentrantLock::new();
    let cond = Arc::new(lock.new_condition());

    let waiter_lock = lock.clone();
    let waiter_cond = Arc::clone(&cond);
    let (tx, rx) = mpsc::channel();
    let waiter = thread::spawn(move || {
        tx.send(interrupt::handle()).unwrap();
        waiter_lock.lock();
        let result = waiter_cond.wait();
        // Even the error path returns with the lock held
        let held = waiter_lock.is_held_by_current_thread();
        waiter_lock.unlock();
        (result, held)
    });

    let token = rx.recv().unwrap();
    thread::sleep(Duration::from_millis(100));
    token.interrupt();

    let (result, held) = waiter.join().unwrap();
    assert_eq!(result, Err(AcquireError::Interrupted));
    assert!(held);
}

#[test]
#[serial]
fn test_wait_with_reentrant_holds_releases_fully() {
    let lock = ReentrantLock::new();
    let cond = Arc::new(lock.new_condition());
    let observed_free = Arc::new(AtomicU64::new(0));

    let waiter_lock = lock.clone();
    let waiter_cond = Arc::clone(&cond);
    let waiter = thread::spawn(move || {
        waiter_lock.lock();
        waiter_lock.lock();
        assert_eq!(waiter_lock.hold_count(), 2);
        waiter_cond.wait().unwrap();
        // Both holds restored on wakeup
        assert_eq!(waiter_lock.hold_count(), 2);
        waiter_lock.unlock();
        waiter_lock.unlock();
    });

    // The signaller can take the lock, proving both holds were released
    thread::sleep(Duration::from_millis(100));
    lock.lock();
    observed_free.fetch_add(1, Ordering::SeqCst);
    cond.signal();
    lock.unlock();

    waiter.join().unwrap();
    assert_eq!(observed_free.load(Ordering::SeqCst), 1);
}

#[test]
#[serial]
fn test_uninterruptible_wait_defers_and_restores_flag() {
    let gate = Arc::new(Gate::new());
    let cond = Arc::new(gate.lock.new_condition());

    gate.lock.lock();
    assert!(!cond.has_waiters());
    gate.lock.unlock();

    let (tx, rx) = mpsc::channel();
    let waiter = {
        let gate = Arc::clone(&gate);
        let cond = Arc::clone(&cond);
        thread::spawn(move || {
            tx.send(interrupt::handle()).unwrap();
            gate.lock.lock();
            while gate.tickets.load(Ordering::SeqCst) == 0 {
                cond.wait_uninterruptibly();
            }
            // The interrupt becomes observable only after the signalled
            // wait completed
            let flag = interrupt::current().clear();
            gate.lock.unlock();
            flag
        })
    };

    let token = rx.recv().unwrap();
    thread::sleep(Duration::from_millis(100));

    gate.lock.lock();
    assert!(cond.has_waiters());
    gate.lock.unlock();

    // The interrupt alone must not end the wait
    token.interrupt();
    thread::sleep(Duration::from_millis(100));

    gate.lock.lock();
    assert!(cond.has_waiters(), "interrupt ended an uninterruptible wait");
    gate.tickets.store(1, Ordering::SeqCst);
    cond.signal();
    gate.lock.unlock();

    assert!(waiter.join().unwrap(), "interrupt flag was not restored");
}

#[test]
#[serial]
fn test_wait_returns_spuriously_when_waiter_slab_is_full() {
    let lock = ReentrantLock::with_config(SyncConfig {
        waiter_capacity: 2,
        ..Default::default()
    });
    let cond = lock.new_condition();

    // Occupy the only waiter slot with a blocked acquirer
    lock.lock();
    let filler = {
        let lock = lock.clone();
        thread::spawn(move || {
            lock.lock();
            lock.unlock();
        })
    };
    thread::sleep(Duration::from_millis(100));

    // With no slot for the condition node the wait must come back as a
    // spurious wake, lock held, instead of parking forever
    let start = Instant::now();
    let outcome = cond.wait_timed(Duration::from_secs(5)).unwrap();
    assert_eq!(outcome, AwaitOutcome::Signalled);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(lock.is_held_by_current_thread());

    lock.unlock();
    filler.join().unwrap();
}

#[test]
#[serial]
#[should_panic(expected = "does not hold its lock")]
fn test_signal_without_lock_panics() {
    let lock = ReentrantLock::new();
    let cond = lock.new_condition();
    cond.signal();
}
