//! Run queue configuration
//!
//! Per-tier latency budgets and the cluster identity stamped into traces.
//! Loading these values from anywhere is the embedder's business; the stock
//! tables are what `Default` returns.

use crate::scheduler::core::error::{SchedulerError, SchedulerResult};
use crate::scheduler::core::policy::{
    RootBucketId, BASEPRI_DEFAULT, BASEPRI_USER_INITIATED, BASEPRI_UTILITY, MAXPRI, MAXPRI_THROTTLE,
    MAXPRI_USER, ROOT_BUCKET_COUNT,
};
use crate::time::Duration;

/// Largest cluster id representable in a trace record (6 bits)
pub const MAX_CLUSTER_ID: u8 = 63;

/// Static parameters of one root bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootBucketParams {
    /// Highest legal priority for threads placed in this tier
    pub ceiling_priority: u8,
    /// Worst-case execution latency: how long the tier may wait once runnable
    pub wcel_us: u64,
    /// Budget for being picked ahead of the natural deadline order
    pub warp_us: u64,
    /// Length of a starvation-avoidance window
    pub starvation_window_us: u64,
}

impl RootBucketParams {
    pub const fn new(ceiling_priority: u8, wcel_us: u64, warp_us: u64, starvation_window_us: u64) -> Self {
        Self {
            ceiling_priority,
            wcel_us,
            warp_us,
            starvation_window_us,
        }
    }

    pub const fn wcel(&self) -> Duration {
        Duration::from_us(self.wcel_us)
    }

    pub const fn warp(&self) -> Duration {
        Duration::from_us(self.warp_us)
    }

    pub const fn starvation_window(&self) -> Duration {
        Duration::from_us(self.starvation_window_us)
    }
}

/// Stock tier table, indexed by [`RootBucketId`]
pub const DEFAULT_ROOT_BUCKETS: [RootBucketParams; ROOT_BUCKET_COUNT] = [
    // FixPri: strict priority, no deadline
    RootBucketParams::new(MAXPRI, 0, 0, 0),
    RootBucketParams::new(MAXPRI_USER, 0, 8_000, 10_000),
    RootBucketParams::new(BASEPRI_USER_INITIATED, 37_500, 4_000, 8_000),
    RootBucketParams::new(BASEPRI_DEFAULT, 75_000, 2_000, 6_000),
    RootBucketParams::new(BASEPRI_UTILITY, 150_000, 1_000, 4_000),
    RootBucketParams::new(MAXPRI_THROTTLE, 250_000, 0, 2_000),
];

/// Configuration of one run queue (one scheduling domain)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunQueueConfig {
    /// Cluster this run queue serves
    pub cluster_id: u8,
    /// Tier parameters, indexed by [`RootBucketId`]
    pub root_buckets: [RootBucketParams; ROOT_BUCKET_COUNT],
    /// Capacity hint for the clutch bucket arena
    pub expected_thread_groups: usize,
}

impl RunQueueConfig {
    pub fn for_cluster(cluster_id: u8) -> Self {
        Self {
            cluster_id,
            ..Self::default()
        }
    }

    pub fn params(&self, bucket: RootBucketId) -> &RootBucketParams {
        &self.root_buckets[bucket.index()]
    }

    pub fn params_mut(&mut self, bucket: RootBucketId) -> &mut RootBucketParams {
        &mut self.root_buckets[bucket.index()]
    }

    /// Validate parameters
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.cluster_id > MAX_CLUSTER_ID {
            return Err(SchedulerError::InvalidConfig {
                reason: "cluster id must fit in 6 bits",
            });
        }
        if self.params(RootBucketId::FixPri).ceiling_priority > MAXPRI {
            return Err(SchedulerError::InvalidConfig {
                reason: "FixPri ceiling above MAXPRI",
            });
        }
        let mut above = MAXPRI.saturating_add(1);
        for tier in RootBucketId::TIMESHARE {
            let params = self.params(tier);
            if params.ceiling_priority >= above {
                return Err(SchedulerError::InvalidConfig {
                    reason: "timeshare ceilings must strictly descend and stay within MAXPRI",
                });
            }
            if params.starvation_window_us == 0 {
                return Err(SchedulerError::InvalidConfig {
                    reason: "starvation-avoidance window must be non-zero",
                });
            }
            above = params.ceiling_priority;
        }
        Ok(())
    }
}

impl Default for RunQueueConfig {
    fn default() -> Self {
        Self {
            cluster_id: 0,
            root_buckets: DEFAULT_ROOT_BUCKETS,
            expected_thread_groups: 32,
        }
    }
}
