//! Root bucket state machine
//!
//! One root bucket exists per (tier, affinity domain) pair for the whole life
//! of the run queue. Its dynamic state is a virtual deadline, a remaining warp
//! budget and at most one open window:
//!
//! ```text
//!            open warp                    warp lapses (budget -> 0)
//!   Idle ---------------> WarpOpen ---------------------------------> Idle
//!     |                                 bucket empties (keep rest)
//!     | open starvation avoidance       window lapses (deadline = now + wcel)
//!     +-------------------> StarvationAvoidance ----------------------> Idle
//! ```
//!
//! Buckets without runnable threads are always `Idle`.

use core::fmt;

use super::edf::RootDecision;
use crate::scheduler::core::config::RootBucketParams;
use crate::scheduler::core::policy::{AffinityDomain, RootBucketId};
use crate::time::{Duration, Timestamp};

/// Window currently open on a root bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootBucketWindow {
    Idle,
    /// Selected ahead of its deadline turn until `expires`
    WarpOpen { expires: Timestamp },
    /// Guaranteed reselection until `expires`
    StarvationAvoidance { expires: Timestamp },
}

impl RootBucketWindow {
    pub fn is_warp(&self) -> bool {
        matches!(self, Self::WarpOpen { .. })
    }

    pub fn is_starvation_avoidance(&self) -> bool {
        matches!(self, Self::StarvationAvoidance { .. })
    }
}

/// Window that ran out while time passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowLapse {
    Warp,
    StarvationAvoidance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootBucket {
    id: RootBucketId,
    domain: AffinityDomain,
    params: RootBucketParams,
    deadline: Timestamp,
    warp_remaining: Duration,
    window: RootBucketWindow,
}

impl RootBucket {
    pub fn new(id: RootBucketId, domain: AffinityDomain, params: RootBucketParams) -> Self {
        Self {
            id,
            domain,
            params,
            deadline: Timestamp::ZERO,
            warp_remaining: params.warp(),
            window: RootBucketWindow::Idle,
        }
    }

    pub fn id(&self) -> RootBucketId {
        self.id
    }

    pub fn domain(&self) -> AffinityDomain {
        self.domain
    }

    pub fn params(&self) -> &RootBucketParams {
        &self.params
    }

    /// Virtual deadline
    pub fn deadline(&self) -> Timestamp {
        self.deadline
    }

    pub fn warp_remaining(&self) -> Duration {
        self.warp_remaining
    }

    pub fn window(&self) -> RootBucketWindow {
        self.window
    }

    pub fn is_overdue(&self, now: Timestamp) -> bool {
        self.deadline < now
    }

    /// First runnable thread arrived
    pub fn on_runnable(&mut self, now: Timestamp) {
        crate::sched_assert!(
            self.window == RootBucketWindow::Idle,
            "empty root bucket {} had window {:?}",
            self,
            self.window
        );
        self.deadline = now + self.params.wcel();
    }

    /// Last runnable thread left; any open window closes without a trace
    pub fn on_empty(&mut self, now: Timestamp) {
        if let RootBucketWindow::WarpOpen { expires } = self.window {
            self.warp_remaining = expires.saturating_since(now);
        }
        self.window = RootBucketWindow::Idle;
    }

    /// Close a window whose time is up
    pub fn settle(&mut self, now: Timestamp) -> Option<WindowLapse> {
        match self.window {
            RootBucketWindow::WarpOpen { expires } if expires <= now => {
                self.warp_remaining = Duration::ZERO;
                self.window = RootBucketWindow::Idle;
                Some(WindowLapse::Warp)
            }
            RootBucketWindow::StarvationAvoidance { expires } if expires <= now => {
                self.deadline = now + self.params.wcel();
                self.window = RootBucketWindow::Idle;
                Some(WindowLapse::StarvationAvoidance)
            }
            _ => None,
        }
    }

    /// Apply the effects of being selected
    pub fn apply(&mut self, decision: RootDecision, now: Timestamp) {
        match decision {
            RootDecision::NaturalEdf => {
                crate::sched_assert!(
                    self.window == RootBucketWindow::Idle,
                    "natural EDF pick of {} with open window {:?}",
                    self,
                    self.window
                );
                self.deadline = now + self.params.wcel();
                self.warp_remaining = self.params.warp();
            }
            RootDecision::OpenWarp => {
                crate::sched_assert!(
                    !self.warp_remaining.is_zero(),
                    "warp window opened on {} with no budget",
                    self
                );
                self.window = RootBucketWindow::WarpOpen {
                    expires: now + self.warp_remaining,
                };
                self.deadline = now + self.params.wcel();
            }
            RootDecision::ReuseWarp => {
                crate::sched_assert!(self.window.is_warp(), "warp reuse of {} without a window", self);
                self.deadline = now + self.params.wcel();
            }
            RootDecision::OpenStarvation => {
                self.window = RootBucketWindow::StarvationAvoidance {
                    expires: now + self.params.starvation_window(),
                };
            }
            RootDecision::ReuseStarvation => {
                crate::sched_assert!(
                    self.window.is_starvation_avoidance(),
                    "starvation reuse of {} without a window",
                    self
                );
            }
            RootDecision::AboveUi => {}
        }
    }
}

impl fmt::Display for RootBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.domain {
            AffinityDomain::Unbound => write!(f, "{}", self.id),
            AffinityDomain::Bound => write!(f, "{}(bound)", self.id),
        }
    }
}
