//! Thread group interactivity scoring
//!
//! Each (thread group, root bucket) pairing carries a score in
//! `[0, SCORE_MAX]`. Among clutch buckets of equal priority in one root
//! bucket, the higher score runs first. A pairing seen for the first time
//! starts at `SCORE_MAX`.
//!
//! How the score evolves is a policy decision left to [`InteractivityPolicy`]
//! implementations. The run queue only calls it when the thread lifecycle
//! layer reports usage.

/// Score below which a group counts as CPU bound
pub const INTERACTIVE_PRI: u8 = 8;

/// Highest interactivity score
pub const SCORE_MAX: u8 = 2 * INTERACTIVE_PRI;

/// CPU accounting accumulated by one clutch bucket group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupUsage {
    /// Time the group's threads spent running
    pub cpu_used_us: u64,
    /// Time the group spent with no runnable thread
    pub cpu_blocked_us: u64,
}

impl GroupUsage {
    pub fn accumulate(&mut self, used_us: u64, blocked_us: u64) {
        self.cpu_used_us = self.cpu_used_us.saturating_add(used_us);
        self.cpu_blocked_us = self.cpu_blocked_us.saturating_add(blocked_us);
    }
}

/// Score evolution policy
pub trait InteractivityPolicy {
    /// Score of a pairing with no history
    fn initial_score(&self) -> u8 {
        SCORE_MAX
    }

    /// New score after `usage` was updated
    ///
    /// Results above `SCORE_MAX` are clamped by the run queue.
    fn rescore(&self, usage: &GroupUsage, current: u8) -> u8;
}

/// Bring a policy-provided score back into `[0, SCORE_MAX]`
pub(crate) fn clamp_score(score: u8) -> u8 {
    if score > SCORE_MAX {
        log::warn!("clutch: policy score {} above {}, clamped", score, SCORE_MAX);
    }
    score.min(SCORE_MAX)
}

/// Scores only change through explicit updates
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedScore;

impl InteractivityPolicy for FixedScore {
    fn rescore(&self, _usage: &GroupUsage, current: u8) -> u8 {
        current
    }
}

/// Blocked-versus-used ratio scoring
///
/// Groups that block more than they run land in
/// `(interactive_pri, 2 * interactive_pri]`; groups that run more than they
/// block land in `[0, interactive_pri]`.
#[derive(Debug, Clone, Copy)]
pub struct CpuRatioPolicy {
    interactive_pri: u8,
}

impl CpuRatioPolicy {
    /// `interactive_pri` is clamped so the score never exceeds `SCORE_MAX`
    pub fn new(interactive_pri: u8) -> Self {
        Self {
            interactive_pri: interactive_pri.min(INTERACTIVE_PRI),
        }
    }
}

impl Default for CpuRatioPolicy {
    fn default() -> Self {
        Self::new(INTERACTIVE_PRI)
    }
}

impl InteractivityPolicy for CpuRatioPolicy {
    fn rescore(&self, usage: &GroupUsage, current: u8) -> u8 {
        // usage saturates at u64::MAX: widen so pri * usage cannot overflow
        let pri = u128::from(self.interactive_pri);
        let used = u128::from(usage.cpu_used_us);
        let blocked = u128::from(usage.cpu_blocked_us);
        if used == 0 && blocked == 0 {
            return current;
        }
        let score = if blocked > used {
            pri + (pri * (blocked - used)) / blocked
        } else {
            (pri * blocked) / used
        };
        // score <= 2 * interactive_pri <= SCORE_MAX
        score.min(u128::from(SCORE_MAX)) as u8
    }
}
