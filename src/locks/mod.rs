/*!
 * Lock Variants
 *
 * The concrete synchronization primitives built on the core: each one is a
 * thin handle around an `Arc<RawSynchronizer<Policy>>`, where the policy is
 * a stateless strategy defining what the state word means and how it
 * transitions. All blocking, queueing, fairness, and cancellation behavior
 * comes from the core.
 */

mod latch;
mod mutex;
mod rwlock;
mod semaphore;

pub use latch::{CountdownLatch, LatchPolicy};
pub use mutex::{MutexPolicy, ReentrantLock};
pub use rwlock::{RwLock, RwLockPolicy};
pub use semaphore::{Semaphore, SemaphorePolicy};
