//! Scheduler core module
//!
//! Shared vocabulary of the run queue:
//! - `policy`: tiers, affinity domains and priority bands
//! - `config`: per-tier latency budgets and cluster identity
//! - `error`: caller-facing errors and the fatal invariant macro
//! - `statistics`: selection counters

pub mod config;
pub mod error;
pub mod policy;
pub mod statistics;

pub use config::{RootBucketParams, RunQueueConfig, DEFAULT_ROOT_BUCKETS, MAX_CLUSTER_ID};
pub use error::{HandoffResult, Rejected, SchedulerError, SchedulerResult};
pub use policy::{AffinityDomain, RootBucketId, ROOT_BUCKET_COUNT};
pub use statistics::{RunQueueStats, RunQueueStatsSnapshot};
