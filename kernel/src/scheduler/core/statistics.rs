//! Statistics - Run queue selection tracking
//!
//! Tracks selection outcomes, window churn and preemption checks. Counters
//! are relaxed atomics so that read-only paths (preemption checks) can
//! account for themselves.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::scheduler::clutch::edf::RootDecision;

/// Ordering used for relaxed counters (statistics don't need strict ordering)
const RELAXED: Ordering = Ordering::Relaxed;

/// Per run queue statistics
#[derive(Debug, Default)]
pub struct RunQueueStats {
    /// Total selections that returned a thread (all traversal modes that mutate)
    pub selections: AtomicU64,

    /// Selections on an empty run queue
    pub empty_selections: AtomicU64,

    /// Root bucket picked in natural deadline order
    pub natural_edf: AtomicU64,

    /// FixPri picked by strict priority
    pub above_ui: AtomicU64,

    /// Warp windows opened
    pub warp_opened: AtomicU64,

    /// Warp windows closed because their budget ran out
    pub warp_closed: AtomicU64,

    /// Starvation-avoidance windows opened
    pub starvation_opened: AtomicU64,

    /// Starvation-avoidance windows closed after running their course
    pub starvation_closed: AtomicU64,

    /// Preemption checks performed
    pub preempt_checks: AtomicU64,

    /// Preemption checks that asked for a context switch
    pub preemptions_signalled: AtomicU64,

    /// Remove-consider-current traversals where the running thread kept the core
    pub current_kept: AtomicU64,
}

/// Plain copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunQueueStatsSnapshot {
    pub selections: u64,
    pub empty_selections: u64,
    pub natural_edf: u64,
    pub above_ui: u64,
    pub warp_opened: u64,
    pub warp_closed: u64,
    pub starvation_opened: u64,
    pub starvation_closed: u64,
    pub preempt_checks: u64,
    pub preemptions_signalled: u64,
    pub current_kept: u64,
}

impl RunQueueStats {
    pub const fn new() -> Self {
        Self {
            selections: AtomicU64::new(0),
            empty_selections: AtomicU64::new(0),
            natural_edf: AtomicU64::new(0),
            above_ui: AtomicU64::new(0),
            warp_opened: AtomicU64::new(0),
            warp_closed: AtomicU64::new(0),
            starvation_opened: AtomicU64::new(0),
            starvation_closed: AtomicU64::new(0),
            preempt_checks: AtomicU64::new(0),
            preemptions_signalled: AtomicU64::new(0),
            current_kept: AtomicU64::new(0),
        }
    }

    /// Record a committed root bucket decision
    pub fn record_decision(&self, decision: RootDecision) {
        self.selections.fetch_add(1, RELAXED);
        match decision {
            RootDecision::NaturalEdf => {
                self.natural_edf.fetch_add(1, RELAXED);
            }
            RootDecision::AboveUi => {
                self.above_ui.fetch_add(1, RELAXED);
            }
            RootDecision::OpenWarp => {
                self.warp_opened.fetch_add(1, RELAXED);
            }
            RootDecision::OpenStarvation => {
                self.starvation_opened.fetch_add(1, RELAXED);
            }
            RootDecision::ReuseWarp | RootDecision::ReuseStarvation => {}
        }
    }

    /// Record windows that lapsed during a committed traversal
    pub fn record_lapses(&self, warp_closed: u32, starvation_closed: u32) {
        if warp_closed > 0 {
            self.warp_closed.fetch_add(u64::from(warp_closed), RELAXED);
        }
        if starvation_closed > 0 {
            self.starvation_closed.fetch_add(u64::from(starvation_closed), RELAXED);
        }
    }

    pub fn record_empty(&self) {
        self.empty_selections.fetch_add(1, RELAXED);
    }

    pub fn record_preempt_check(&self, preempt: bool) {
        self.preempt_checks.fetch_add(1, RELAXED);
        if preempt {
            self.preemptions_signalled.fetch_add(1, RELAXED);
        }
    }

    pub fn record_current_kept(&self) {
        self.current_kept.fetch_add(1, RELAXED);
    }

    /// Get a consistent-enough copy of all counters
    pub fn snapshot(&self) -> RunQueueStatsSnapshot {
        RunQueueStatsSnapshot {
            selections: self.selections.load(RELAXED),
            empty_selections: self.empty_selections.load(RELAXED),
            natural_edf: self.natural_edf.load(RELAXED),
            above_ui: self.above_ui.load(RELAXED),
            warp_opened: self.warp_opened.load(RELAXED),
            warp_closed: self.warp_closed.load(RELAXED),
            starvation_opened: self.starvation_opened.load(RELAXED),
            starvation_closed: self.starvation_closed.load(RELAXED),
            preempt_checks: self.preempt_checks.load(RELAXED),
            preemptions_signalled: self.preemptions_signalled.load(RELAXED),
            current_kept: self.current_kept.load(RELAXED),
        }
    }

    /// Reset statistics
    pub fn reset(&self) {
        for counter in [
            &self.selections,
            &self.empty_selections,
            &self.natural_edf,
            &self.above_ui,
            &self.warp_opened,
            &self.warp_closed,
            &self.starvation_opened,
            &self.starvation_closed,
            &self.preempt_checks,
            &self.preemptions_signalled,
            &self.current_kept,
        ] {
            counter.store(0, RELAXED);
        }
    }
}
