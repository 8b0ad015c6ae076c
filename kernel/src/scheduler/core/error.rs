//! Scheduler Error Handling
//!
//! Typed errors for the caller-facing run queue operations. Only input the
//! integration point can legitimately get wrong is reported here; broken
//! internal invariants go through [`sched_assert!`] and halt instead.

use core::fmt;

use crate::scheduler::core::policy::RootBucketId;
use crate::scheduler::thread::{Thread, ThreadGroupId, ThreadId};

/// Scheduler error types with detailed context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    // ═══════════════════════════════════════════════════════════════
    // Enqueue Errors
    // ═══════════════════════════════════════════════════════════════

    /// Thread priority exceeds the ceiling of its root bucket
    PriorityAboveCeiling {
        thread_id: ThreadId,
        bucket: RootBucketId,
        priority: u8,
        ceiling: u8,
    },

    /// Thread is already sitting in this run queue
    ThreadAlreadyQueued { thread_id: ThreadId },

    // ═══════════════════════════════════════════════════════════════
    // Lookup Errors
    // ═══════════════════════════════════════════════════════════════

    /// Thread not found in the run queue
    ThreadNotFound { thread_id: ThreadId },

    // ═══════════════════════════════════════════════════════════════
    // Thread Group Errors
    // ═══════════════════════════════════════════════════════════════

    /// Interactivity score outside `[0, max]`
    InvalidScore { score: u8, max: u8 },

    /// Thread group still has runnable threads
    GroupStillRunnable { group: ThreadGroupId, runnable: usize },

    // ═══════════════════════════════════════════════════════════════
    // Configuration Errors
    // ═══════════════════════════════════════════════════════════════

    /// Run queue configuration rejected
    InvalidConfig { reason: &'static str },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PriorityAboveCeiling {
                thread_id,
                bucket,
                priority,
                ceiling,
            } => write!(
                f,
                "Thread {} priority {} above {:?} ceiling {}",
                thread_id, priority, bucket, ceiling
            ),
            Self::ThreadAlreadyQueued { thread_id } => {
                write!(f, "Thread {} already queued", thread_id)
            }
            Self::ThreadNotFound { thread_id } => {
                write!(f, "Thread {} not found", thread_id)
            }
            Self::InvalidScore { score, max } => {
                write!(f, "Interactivity score {} out of range (max {})", score, max)
            }
            Self::GroupStillRunnable { group, runnable } => {
                write!(f, "Thread group {} still has {} runnable threads", group, runnable)
            }
            Self::InvalidConfig { reason } => write!(f, "Invalid run queue config: {}", reason),
        }
    }
}

impl SchedulerError {
    /// Get recovery hint for this error
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            Self::PriorityAboveCeiling { .. } => "Clamp the priority or place the thread in a higher tier",
            Self::ThreadAlreadyQueued { .. } => "Dequeue or remove the thread before re-enqueueing it",
            Self::ThreadNotFound { .. } => "Thread may have already been selected or removed",
            Self::InvalidScore { .. } => "Clamp the score to SCORE_MAX",
            Self::GroupStillRunnable { .. } => "Remove the group's threads first",
            Self::InvalidConfig { .. } => "Check root bucket parameters and cluster id",
        }
    }

    /// Is this a recoverable error?
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidConfig { .. })
    }

    /// Should this error be logged?
    pub fn should_log(&self) -> bool {
        // Common during teardown races
        !matches!(self, Self::ThreadNotFound { .. })
    }

    /// Get error severity (0-3)
    pub fn severity(&self) -> u8 {
        match self {
            Self::InvalidConfig { .. } => 3,
            Self::ThreadAlreadyQueued { .. } => 2,
            Self::PriorityAboveCeiling { .. } => 1,
            Self::GroupStillRunnable { .. } => 1,
            Self::InvalidScore { .. } => 1,
            Self::ThreadNotFound { .. } => 0,
        }
    }
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// A thread the run queue refused, handed back to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    pub error: SchedulerError,
    pub thread: Thread,
}

impl Rejected {
    pub fn new(error: SchedulerError, thread: Thread) -> Self {
        Self { error, thread }
    }

    pub fn into_thread(self) -> Thread {
        self.thread
    }
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (handed back {})", self.error, self.thread)
    }
}

impl From<Rejected> for SchedulerError {
    fn from(rejected: Rejected) -> Self {
        rejected.error
    }
}

/// Result of an operation that takes ownership of a thread
pub type HandoffResult<T> = Result<T, Rejected>;

/// Log a scheduler error with its recovery hint and hand it back
#[macro_export]
macro_rules! sched_error {
    ($err:expr) => {{
        let err = $err;
        if err.should_log() {
            log::warn!("[SCHED] Error: {} (hint: {})", err, err.recovery_hint());
        }
        err
    }};
}

/// Critical scheduler assertion: a failure means run queue state is corrupt
#[macro_export]
macro_rules! sched_assert {
    ($cond:expr, $reason:expr) => {
        if !$cond {
            panic!("[SCHED CRITICAL] Invariant violated: {}", $reason);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)+) => {
        if !$cond {
            panic!(concat!("[SCHED CRITICAL] Invariant violated: ", $fmt), $($arg)+);
        }
    };
}
