/*!
 * Synchronizer Configuration
 *
 * Runtime configuration for fairness policy and blocking behavior
 */

/// Acquisition ordering policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fairness {
    /// New arrivals must defer to already-queued waiters before attempting
    /// the state fast path. FIFO order among queued, non-cancelled waiters.
    Fair,
    /// New arrivals race the queue head directly ("barging"). Better
    /// throughput under contention, no ordering guarantee.
    Nonfair,
}

/// Per-instance synchronizer configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Fairness policy
    pub fairness: Fairness,
    /// Maximum simultaneously blocked threads per instance. The wait-node
    /// slab is preallocated at this size (one slot goes to the queue head);
    /// threads beyond it yield for a slot instead of enqueueing, with
    /// deadlines and interruption still honored while they wait.
    pub waiter_capacity: usize,
    /// Spin attempts at the head of the queue before committing to a park
    pub spin_limit: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fairness: Fairness::Nonfair,
            waiter_capacity: 64,
            spin_limit: 32,
        }
    }
}

impl SyncConfig {
    /// Default configuration with the fair policy
    pub fn fair() -> Self {
        Self {
            fairness: Fairness::Fair,
            ..Default::default()
        }
    }

    /// Configuration for heavily contended instances: larger waiter slab,
    /// longer spin budget before parking
    pub fn contended() -> Self {
        Self {
            fairness: Fairness::Nonfair,
            waiter_capacity: 256,
            spin_limit: 128,
        }
    }
}
