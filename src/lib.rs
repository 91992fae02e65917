/*!
 * Queued Synchronizer Library
 * Blocking synchronization primitives built on one atomic state cell and one
 * lock-free FIFO wait queue
 */

pub mod condition;
pub mod config;
pub mod errors;
pub mod locks;
pub mod park;
pub mod state;
pub mod synchronizer;

pub(crate) mod queue;

// Re-exports
pub use condition::{AwaitOutcome, Condition};
pub use config::{Fairness, SyncConfig};
pub use errors::AcquireError;
pub use locks::{CountdownLatch, ReentrantLock, RwLock, Semaphore};
pub use park::{interrupt, ParkOutcome, Parker};
pub use state::{StateCell, SyncState};
pub use synchronizer::{AcquireOutcome, RawSynchronizer, SharedAcquire, SyncPolicy};
