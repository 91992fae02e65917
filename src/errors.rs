/*!
 * Error Types
 *
 * Recoverable outcomes of blocking operations. Programmer misuse (releasing
 * a lock that is not held, waiting on a condition without holding its lock)
 * is not represented here: it panics immediately at the call site, since it
 * indicates corrupt caller logic that must never be retried.
 */

use thiserror::Error;

/// Errors returned by interruptible blocking operations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireError {
    /// The blocking wait was aborted by external interruption.
    /// The caller holds nothing; the interrupt status has been consumed.
    #[error("blocking wait was interrupted")]
    Interrupted,

    /// The deadline elapsed before acquisition. The caller holds nothing.
    #[error("blocking wait timed out")]
    TimedOut,
}
