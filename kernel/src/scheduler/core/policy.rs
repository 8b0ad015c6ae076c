//! Scheduling tiers and priority bands
//!
//! The run queue is split into six root buckets, one per tier, walked in a
//! fixed natural order:
//! - FixPri: fixed-priority threads, arbitrated by strict priority ("above UI")
//! - Foreground / UserInitiated / Default / Utility / Background: timeshare
//!   tiers arbitrated by earliest virtual deadline
//!
//! Each tier exists once per affinity domain (unbound and processor-bound).

use core::fmt;

/// Highest schedulable priority
pub const MAXPRI: u8 = 127;
/// Highest priority a user thread may request
pub const MAXPRI_USER: u8 = 63;
pub const BASEPRI_FOREGROUND: u8 = 47;
pub const BASEPRI_USER_INITIATED: u8 = 37;
pub const BASEPRI_DEFAULT: u8 = 31;
pub const BASEPRI_UTILITY: u8 = 20;
/// Ceiling of the throttled (background) band
pub const MAXPRI_THROTTLE: u8 = 4;
pub const MINPRI: u8 = 0;

/// Number of root buckets per affinity domain
pub const ROOT_BUCKET_COUNT: usize = 6;

/// Root bucket (scheduling tier) identifiers, in natural order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum RootBucketId {
    /// Fixed priority, outside deadline arbitration
    FixPri = 0,
    Foreground = 1,
    UserInitiated = 2,
    Default = 3,
    Utility = 4,
    Background = 5,
}

impl RootBucketId {
    /// All tiers in natural order
    pub const ALL: [RootBucketId; ROOT_BUCKET_COUNT] = [
        Self::FixPri,
        Self::Foreground,
        Self::UserInitiated,
        Self::Default,
        Self::Utility,
        Self::Background,
    ];

    /// Timeshare tiers in natural order
    pub const TIMESHARE: [RootBucketId; ROOT_BUCKET_COUNT - 1] = [
        Self::Foreground,
        Self::UserInitiated,
        Self::Default,
        Self::Utility,
        Self::Background,
    ];

    /// Create from raw value
    pub fn from_raw(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Is this tier arbitrated by virtual deadline?
    pub const fn is_timeshare(self) -> bool {
        !matches!(self, Self::FixPri)
    }

    /// Timeshare tier for a base priority
    ///
    /// FixPri is never returned: fixed-priority placement is a policy
    /// decision of the thread owner, not a function of priority.
    pub fn for_base_priority(priority: u8) -> Self {
        if priority > BASEPRI_USER_INITIATED {
            Self::Foreground
        } else if priority > BASEPRI_DEFAULT {
            Self::UserInitiated
        } else if priority > BASEPRI_UTILITY {
            Self::Default
        } else if priority > MAXPRI_THROTTLE {
            Self::Utility
        } else {
            Self::Background
        }
    }
}

impl fmt::Display for RootBucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FixPri => "FIXPRI",
            Self::Foreground => "FG",
            Self::UserInitiated => "IN",
            Self::Default => "DF",
            Self::Utility => "UT",
            Self::Background => "BG",
        };
        f.write_str(name)
    }
}

/// Affinity domain of a root bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum AffinityDomain {
    /// Threads free to run on any core of the cluster, grouped in clutch buckets
    Unbound = 0,
    /// Threads pinned to a core, queued directly
    Bound = 1,
}

impl AffinityDomain {
    pub const ALL: [AffinityDomain; 2] = [Self::Unbound, Self::Bound];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn of(processor_bound: bool) -> Self {
        if processor_bound {
            Self::Bound
        } else {
            Self::Unbound
        }
    }
}
