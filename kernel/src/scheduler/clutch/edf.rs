//! Root bucket arbitration
//!
//! Decides which (tier, affinity domain) root bucket supplies the next
//! thread. The engine works on a copy of the root bucket states: callers
//! commit [`EnginePlan::buckets`] only when the traversal is allowed to
//! change state, so preemption checks and peeks share the exact same code.
//!
//! Order of precedence:
//! 1. FixPri ("above UI") when its best thread is at least as urgent as any
//!    timeshare thread.
//! 2. Per domain: an open starvation-avoidance window, or a new one for an
//!    overdue earliest-deadline bucket that some higher tier keeps waiting.
//! 3. Per domain: an open warp window.
//! 4. Per domain: a warp window for a higher tier with budget left, else the
//!    earliest deadline.
//! 5. Across domains: starvation first, then tier, then thread priority,
//!    bound wins exact ties.

use core::cmp::{Ordering as CmpOrdering, Reverse};

use super::root_bucket::{RootBucket, WindowLapse};
use super::trace::{SelectFlags, WindowMask};
use crate::scheduler::core::policy::{AffinityDomain, RootBucketId, ROOT_BUCKET_COUNT};
use crate::time::Timestamp;

/// Root buckets of one affinity domain, indexed by tier
pub type DomainBuckets = [RootBucket; ROOT_BUCKET_COUNT];

/// Highest runnable priority per tier (`None` = nothing runnable)
pub type TierPriorities = [Option<u8>; ROOT_BUCKET_COUNT];

/// Why a root bucket was picked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootDecision {
    /// Earliest virtual deadline
    NaturalEdf,
    /// FixPri outranking every timeshare thread
    AboveUi,
    /// Picked ahead of its deadline turn, opening a warp window
    OpenWarp,
    /// Still inside its warp window
    ReuseWarp,
    /// Overdue while higher tiers kept running
    OpenStarvation,
    /// Still inside its starvation-avoidance window
    ReuseStarvation,
}

impl RootDecision {
    pub fn flags(self) -> SelectFlags {
        match self {
            Self::NaturalEdf | Self::ReuseStarvation => SelectFlags::EDF,
            Self::OpenStarvation => SelectFlags::EDF | SelectFlags::STARVATION_OPENED,
            Self::OpenWarp => SelectFlags::WARP_OPENED,
            Self::ReuseWarp | Self::AboveUi => SelectFlags::empty(),
        }
    }

    pub fn is_starvation_avoidance(self) -> bool {
        matches!(self, Self::OpenStarvation | Self::ReuseStarvation)
    }
}

/// Root bucket chosen by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootSelection {
    pub domain: AffinityDomain,
    pub bucket: RootBucketId,
    pub decision: RootDecision,
}

/// Windows that lapsed while settling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lapses {
    pub warp: WindowMask,
    pub starvation: WindowMask,
}

impl Lapses {
    pub fn none() -> Self {
        Self {
            warp: WindowMask::empty(),
            starvation: WindowMask::empty(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.warp.is_empty() && self.starvation.is_empty()
    }
}

/// Outcome of one evaluation
#[derive(Debug, Clone, Copy)]
pub struct EnginePlan {
    pub selection: Option<RootSelection>,
    pub lapses: Lapses,
    /// Root bucket states after settling and applying the selection
    pub buckets: [DomainBuckets; 2],
}

/// Evaluate the root buckets at `now`
pub fn plan(buckets: &[DomainBuckets; 2], priorities: &[TierPriorities; 2], now: Timestamp) -> EnginePlan {
    let mut next = *buckets;
    let mut lapses = Lapses::none();
    for domain in AffinityDomain::ALL {
        for bucket in next[domain.index()].iter_mut() {
            match bucket.settle(now) {
                Some(WindowLapse::Warp) => lapses.warp |= WindowMask::of(bucket.id(), domain),
                Some(WindowLapse::StarvationAvoidance) => {
                    lapses.starvation |= WindowMask::of(bucket.id(), domain)
                }
                None => {}
            }
        }
    }

    let selection = match above_ui(priorities) {
        Some(domain) => Some(RootSelection {
            domain,
            bucket: RootBucketId::FixPri,
            decision: RootDecision::AboveUi,
        }),
        None => {
            let top = top_timeshare(priorities);
            let unbound = evaluate(&next[AffinityDomain::Unbound.index()], &priorities[0], top, now);
            let bound = evaluate(&next[AffinityDomain::Bound.index()], &priorities[1], top, now);
            arbitrate(unbound, bound, priorities)
        }
    };

    if let Some(sel) = selection {
        next[sel.domain.index()][sel.bucket.index()].apply(sel.decision, now);
    }

    EnginePlan {
        selection,
        lapses,
        buckets: next,
    }
}

/// FixPri domain to run, if FixPri outranks all timeshare work
fn above_ui(priorities: &[TierPriorities; 2]) -> Option<AffinityDomain> {
    let fixpri = RootBucketId::FixPri.index();
    let (domain, fix_pri) = match (priorities[0][fixpri], priorities[1][fixpri]) {
        (None, None) => return None,
        (Some(unbound), Some(bound)) if unbound > bound => (AffinityDomain::Unbound, unbound),
        (_, Some(bound)) => (AffinityDomain::Bound, bound),
        (Some(unbound), None) => (AffinityDomain::Unbound, unbound),
    };
    let timeshare = priorities
        .iter()
        .flat_map(|domain| domain[1..].iter().flatten())
        .copied()
        .max();
    match timeshare {
        Some(pri) if pri > fix_pri => None,
        _ => Some(domain),
    }
}

/// Highest runnable timeshare tier in either domain
fn top_timeshare(priorities: &[TierPriorities; 2]) -> Option<RootBucketId> {
    RootBucketId::TIMESHARE
        .into_iter()
        .find(|tier| priorities.iter().any(|domain| domain[tier.index()].is_some()))
}

/// Timeshare choice of one domain
fn evaluate(
    buckets: &DomainBuckets,
    priorities: &TierPriorities,
    top: Option<RootBucketId>,
    now: Timestamp,
) -> Option<(RootBucketId, RootDecision)> {
    let runnable = || {
        RootBucketId::TIMESHARE
            .into_iter()
            .filter(|tier| priorities[tier.index()].is_some())
    };
    let state = |tier: RootBucketId| &buckets[tier.index()];

    if let Some(tier) = runnable().find(|&tier| state(tier).window().is_starvation_avoidance()) {
        return Some((tier, RootDecision::ReuseStarvation));
    }

    // min_by_key keeps the first of equal deadlines: natural order
    let edf = runnable().min_by_key(|&tier| state(tier).deadline())?;
    if state(edf).is_overdue(now) && top.is_some_and(|top| top < edf) {
        return Some((edf, RootDecision::OpenStarvation));
    }

    if let Some(tier) = runnable().find(|&tier| state(tier).window().is_warp()) {
        return Some((tier, RootDecision::ReuseWarp));
    }

    if let Some(tier) = runnable()
        .take_while(|&tier| tier < edf)
        .find(|&tier| !state(tier).warp_remaining().is_zero())
    {
        return Some((tier, RootDecision::OpenWarp));
    }

    Some((edf, RootDecision::NaturalEdf))
}

/// Pick between the two domains' candidates
fn arbitrate(
    unbound: Option<(RootBucketId, RootDecision)>,
    bound: Option<(RootBucketId, RootDecision)>,
    priorities: &[TierPriorities; 2],
) -> Option<RootSelection> {
    let select = |domain: AffinityDomain, (bucket, decision): (RootBucketId, RootDecision)| RootSelection {
        domain,
        bucket,
        decision,
    };
    match (unbound, bound) {
        (None, None) => None,
        (Some(u), None) => Some(select(AffinityDomain::Unbound, u)),
        (None, Some(b)) => Some(select(AffinityDomain::Bound, b)),
        (Some(u), Some(b)) => {
            let rank = |domain: AffinityDomain, (bucket, decision): (RootBucketId, RootDecision)| {
                (
                    Reverse(decision.is_starvation_avoidance()),
                    bucket,
                    Reverse(priorities[domain.index()][bucket.index()]),
                )
            };
            match rank(AffinityDomain::Unbound, u).cmp(&rank(AffinityDomain::Bound, b)) {
                CmpOrdering::Less => Some(select(AffinityDomain::Unbound, u)),
                CmpOrdering::Equal | CmpOrdering::Greater => Some(select(AffinityDomain::Bound, b)),
            }
        }
    }
}
