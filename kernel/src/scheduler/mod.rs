//! Scheduler subsystem
//!
//! Clutch run queue: hierarchical thread selection for one cluster.
//! Tier arbitration by virtual deadline, thread group fairness by
//! interactivity score, thread order by priority then FIFO.

pub mod clutch;
pub mod core;
pub mod thread;

// Re-exports
pub use self::clutch::{ClutchRunQueue, ThreadSelectTrace, TraceSink, TraverseMode};
pub use self::core::{
    AffinityDomain, HandoffResult, Rejected, RootBucketId, RootBucketParams, RunQueueConfig, RunQueueStatsSnapshot,
    SchedulerError, SchedulerResult,
};
pub use thread::{EnqueuePosition, Thread, ThreadGroupId, ThreadId};
