//! Clutch run queue
//!
//! Three-level thread selection for one scheduling domain:
//! root bucket (tier × affinity domain) by EDF with warp and starvation
//! avoidance, then clutch bucket (thread group) by priority, interactivity
//! and FIFO, then thread by priority and FIFO.
//!
//! Every traversal mode goes through the same [`ClutchRunQueue::plan`]
//! evaluation. Modes only differ in what they do with the plan afterwards:
//! - `dequeue`: commit root bucket state, pop the picked thread
//! - `dequeue_consider_current`: commit, keep or replace the running thread
//! - `check_preempt` / `peek`: discard
//!
//! The caller serializes access (run queue lock). Nothing here blocks, and
//! allocation only happens when the arena or the thread index grow.

use core::fmt;

use super::arena::{ClutchArena, SipHashMap};
use super::bucket::{ClutchBucket, ClutchKey, GroupKey};
use super::edf::{self, EnginePlan, RootDecision, RootSelection, TierPriorities};
use super::interactivity::{clamp_score, FixedScore, InteractivityPolicy, SCORE_MAX};
use super::root_bucket::RootBucket;
use super::trace::{NullSink, SelectFlags, ThreadSelectTrace, TraceSink, TraverseMode};
use crate::scheduler::core::config::RunQueueConfig;
use crate::scheduler::core::error::{HandoffResult, Rejected, SchedulerError, SchedulerResult};
use crate::scheduler::core::policy::{AffinityDomain, RootBucketId, ROOT_BUCKET_COUNT};
use crate::scheduler::core::statistics::{RunQueueStats, RunQueueStatsSnapshot};
use crate::scheduler::thread::{
    EnqueuePosition, EnqueueSequence, SequenceAllocator, Thread, ThreadGroupId, ThreadId, ThreadKey, ThreadQueue,
};
use crate::time::{ClockSource, Timestamp};

/// Where a queued thread sits
#[derive(Debug, Clone, Copy)]
struct ThreadLocation {
    group: GroupKey,
    domain: AffinityDomain,
    key: ThreadKey,
}

/// Thread picked by a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pick {
    /// The running thread keeps the core
    Current,
    Queued(ThreadId),
}

#[derive(Debug)]
struct Plan {
    engine: EnginePlan,
    pick: Option<Pick>,
}

/// Run queue of one cluster
pub struct ClutchRunQueue<C, S = NullSink, P = FixedScore> {
    config: RunQueueConfig,
    clock: C,
    sink: S,
    policy: P,
    root_buckets: [[RootBucket; ROOT_BUCKET_COUNT]; 2],
    clutch: ClutchArena,
    bound: [ThreadQueue; ROOT_BUCKET_COUNT],
    index: SipHashMap<ThreadId, ThreadLocation>,
    sequences: SequenceAllocator,
    last_timestamp: Timestamp,
    stats: RunQueueStats,
}

impl<C: ClockSource> ClutchRunQueue<C> {
    /// Create an empty run queue reading time from `clock`
    pub fn new(config: RunQueueConfig, clock: C) -> SchedulerResult<Self> {
        config.validate().map_err(|err| crate::sched_error!(err))?;

        let root_buckets = AffinityDomain::ALL
            .map(|domain| RootBucketId::ALL.map(|id| RootBucket::new(id, domain, *config.params(id))));
        let capacity = config.expected_thread_groups;
        let last_timestamp = clock.now();

        log::debug!(
            "clutch: run queue for cluster {} ready at {} ({} groups expected)",
            config.cluster_id,
            last_timestamp,
            capacity
        );

        Ok(Self {
            clutch: ClutchArena::with_capacity(capacity),
            bound: Default::default(),
            index: SipHashMap::with_capacity_and_hasher(capacity, Default::default()),
            sequences: SequenceAllocator::new(),
            stats: RunQueueStats::new(),
            sink: NullSink,
            policy: FixedScore,
            root_buckets,
            last_timestamp,
            config,
            clock,
        })
    }
}

impl<C: ClockSource, S: TraceSink, P: InteractivityPolicy> ClutchRunQueue<C, S, P> {
    /// Send selection records to `sink`
    pub fn with_trace_sink<T: TraceSink>(self, sink: T) -> ClutchRunQueue<C, T, P> {
        ClutchRunQueue {
            sink,
            config: self.config,
            clock: self.clock,
            policy: self.policy,
            root_buckets: self.root_buckets,
            clutch: self.clutch,
            bound: self.bound,
            index: self.index,
            sequences: self.sequences,
            last_timestamp: self.last_timestamp,
            stats: self.stats,
        }
    }

    /// Let `policy` evolve interactivity scores from reported usage
    pub fn with_interactivity_policy<Q: InteractivityPolicy>(self, policy: Q) -> ClutchRunQueue<C, S, Q> {
        ClutchRunQueue {
            policy,
            config: self.config,
            clock: self.clock,
            sink: self.sink,
            root_buckets: self.root_buckets,
            clutch: self.clutch,
            bound: self.bound,
            index: self.index,
            sequences: self.sequences,
            last_timestamp: self.last_timestamp,
            stats: self.stats,
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // Enqueue / removal
    // ═══════════════════════════════════════════════════════════════

    /// Queue a runnable thread behind its equal-priority peers
    ///
    /// A refused thread comes back inside the error.
    pub fn enqueue(&mut self, thread: Thread) -> HandoffResult<()> {
        self.enqueue_at(thread, EnqueuePosition::Tail)
    }

    pub fn enqueue_at(&mut self, thread: Thread, position: EnqueuePosition) -> HandoffResult<()> {
        let now = self.tick();
        let thread = self.admit(thread)?;
        self.insert(thread, position, now);
        Ok(())
    }

    /// Withdraw a queued thread that stopped being runnable
    pub fn remove(&mut self, id: ThreadId) -> SchedulerResult<Thread> {
        let now = self.tick();
        self.take(id, now)
            .ok_or_else(|| crate::sched_error!(SchedulerError::ThreadNotFound { thread_id: id }))
    }

    // ═══════════════════════════════════════════════════════════════
    // Traversals
    // ═══════════════════════════════════════════════════════════════

    /// Pick and remove the next thread to run; `None` when nothing is runnable
    pub fn dequeue(&mut self) -> Option<Thread> {
        let now = self.tick();
        let plan = self.plan(now, None);
        self.commit(&plan, now);
        self.emit(TraverseMode::Remove, &plan);

        let Some(Pick::Queued(id)) = plan.pick else {
            self.stats.record_empty();
            return None;
        };
        Some(self.take_selected(id, now))
    }

    /// Re-evaluate the running thread against the queue
    ///
    /// Returns the thread that should run. When a queued thread wins, it is
    /// removed and `current` is queued ahead of its equal-priority peers.
    /// If `current` is refused, it comes back inside the error untouched.
    pub fn dequeue_consider_current(&mut self, current: Thread) -> HandoffResult<Thread> {
        let now = self.tick();
        let current = self.admit(current)?;
        let plan = self.plan(now, Some(&current));
        self.commit(&plan, now);
        self.emit(TraverseMode::RemoveConsiderCurrent, &plan);

        if let Some(Pick::Queued(id)) = plan.pick {
            let winner = self.take_selected(id, now);
            log::trace!("clutch: {} replaces running {}", winner, current);
            self.insert(current, EnqueuePosition::Head, now);
            return Ok(winner);
        }

        // current was only a virtual entry: its root bucket may be empty
        let (domain, bucket) = (current.domain(), current.root_bucket());
        if self.is_root_bucket_empty(domain, bucket) {
            self.root_buckets[domain.index()][bucket.index()].on_empty(now);
        }
        self.stats.record_current_kept();
        Ok(current)
    }

    /// Would a queued thread take the core from `current`?
    ///
    /// Nothing changes: windows, deadlines, scores and the queue are left
    /// as they are. The hypothetical decision is still traced.
    pub fn check_preempt(&self, current: &Thread) -> bool {
        let now = self.observe();
        let plan = self.plan(now, Some(current));
        self.emit(TraverseMode::CheckPreempt, &plan);
        let preempt = matches!(plan.pick, Some(Pick::Queued(_)));
        self.stats.record_preempt_check(preempt);
        preempt
    }

    /// Thread `dequeue` would return right now
    pub fn peek(&self) -> Option<ThreadId> {
        let now = self.observe();
        match self.plan(now, None).pick {
            Some(Pick::Queued(id)) => Some(id),
            _ => None,
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // Thread groups
    // ═══════════════════════════════════════════════════════════════

    /// Overwrite the interactivity score of a (group, tier) pairing
    pub fn set_interactivity_score(&mut self, group: ThreadGroupId, bucket: RootBucketId, score: u8) -> SchedulerResult<()> {
        if score > SCORE_MAX {
            return Err(crate::sched_error!(SchedulerError::InvalidScore { score, max: SCORE_MAX }));
        }
        self.clutch
            .set_score(GroupKey::new(group, bucket), score, self.initial_score());
        log::debug!("clutch: {} {} score set to {}", group, bucket, score);
        Ok(())
    }

    /// Report CPU usage of a (group, tier) pairing; returns the new score
    pub fn account_usage(&mut self, group: ThreadGroupId, bucket: RootBucketId, cpu_used_us: u64, cpu_blocked_us: u64) -> u8 {
        let score = self
            .clutch
            .account(GroupKey::new(group, bucket), cpu_used_us, cpu_blocked_us, &self.policy);
        log::trace!(
            "clutch: {} {} used {}us blocked {}us -> score {}",
            group,
            bucket,
            cpu_used_us,
            cpu_blocked_us,
            score
        );
        score
    }

    pub fn interactivity_score(&self, group: ThreadGroupId, bucket: RootBucketId) -> u8 {
        self.clutch
            .score_for(GroupKey::new(group, bucket), self.initial_score())
    }

    /// Release the history of a group that has no runnable thread left
    pub fn forget_thread_group(&mut self, group: ThreadGroupId) -> SchedulerResult<usize> {
        let released = self.clutch.forget_group(group).map_err(|err| crate::sched_error!(err))?;
        log::debug!("clutch: forgot {} ({} records)", group, released);
        Ok(released)
    }

    // ═══════════════════════════════════════════════════════════════
    // Introspection
    // ═══════════════════════════════════════════════════════════════

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: ThreadId) -> bool {
        self.index.contains_key(&id)
    }

    /// Highest priority among queued threads
    pub fn highest_priority(&self) -> Option<u8> {
        self.tier_priorities()
            .iter()
            .flat_map(|domain| domain.iter().flatten())
            .copied()
            .max()
    }

    pub fn root_bucket(&self, bucket: RootBucketId, domain: AffinityDomain) -> &RootBucket {
        &self.root_buckets[domain.index()][bucket.index()]
    }

    pub fn stats(&self) -> RunQueueStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &RunQueueConfig {
        &self.config
    }

    pub fn trace_sink(&self) -> &S {
        &self.sink
    }

    // ═══════════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════════

    fn tick(&mut self) -> Timestamp {
        let now = self.observe();
        self.last_timestamp = now;
        now
    }

    fn observe(&self) -> Timestamp {
        let now = self.clock.now();
        crate::sched_assert!(
            now >= self.last_timestamp,
            "clock moved backwards ({} < {})",
            now,
            self.last_timestamp
        );
        now
    }

    fn initial_score(&self) -> u8 {
        clamp_score(self.policy.initial_score())
    }

    /// Validate a thread handed over by the caller, giving it back on refusal
    fn admit(&self, thread: Thread) -> HandoffResult<Thread> {
        match self.validate(&thread) {
            Ok(()) => Ok(thread),
            Err(err) => Err(Rejected::new(crate::sched_error!(err), thread)),
        }
    }

    fn validate(&self, thread: &Thread) -> SchedulerResult<()> {
        let bucket = thread.root_bucket();
        let ceiling = self.config.params(bucket).ceiling_priority;
        if thread.sched_priority() > ceiling {
            return Err(SchedulerError::PriorityAboveCeiling {
                thread_id: thread.id(),
                bucket,
                priority: thread.sched_priority(),
                ceiling,
            });
        }
        if self.index.contains_key(&thread.id()) {
            return Err(SchedulerError::ThreadAlreadyQueued { thread_id: thread.id() });
        }
        Ok(())
    }

    fn insert(&mut self, thread: Thread, position: EnqueuePosition, now: Timestamp) {
        let id = thread.id();
        let domain = thread.domain();
        let group = GroupKey::of(&thread);
        let sequence = self.sequences.next(position);

        let (key, became_runnable) = match domain {
            AffinityDomain::Unbound => self.clutch.insert(thread, sequence, self.initial_score()),
            AffinityDomain::Bound => {
                let queue = &mut self.bound[group.bucket.index()];
                let was_empty = queue.is_empty();
                (queue.insert(thread, sequence), was_empty)
            }
        };
        self.index.insert(id, ThreadLocation { group, domain, key });

        if became_runnable {
            let root = &mut self.root_buckets[domain.index()][group.bucket.index()];
            root.on_runnable(now);
            log::debug!("clutch: {} runnable, deadline {}", root, root.deadline());
        }
    }

    fn take(&mut self, id: ThreadId, now: Timestamp) -> Option<Thread> {
        let loc = self.index.remove(&id)?;
        let bucket = loc.group.bucket;
        let removed = match loc.domain {
            AffinityDomain::Unbound => self.clutch.remove(loc.group, &loc.key),
            AffinityDomain::Bound => {
                let queue = &mut self.bound[bucket.index()];
                queue.remove(&loc.key).map(|thread| (thread, queue.is_empty()))
            }
        };
        crate::sched_assert!(removed.is_some(), "thread {} indexed but not queued", id);
        let (thread, emptied) = removed?;

        if emptied {
            let root = &mut self.root_buckets[loc.domain.index()][bucket.index()];
            root.on_empty(now);
            log::debug!("clutch: {} empty", root);
        }
        Some(thread)
    }

    fn take_selected(&mut self, id: ThreadId, now: Timestamp) -> Thread {
        match self.take(id, now) {
            Some(thread) => thread,
            None => panic!("[SCHED CRITICAL] Invariant violated: selected thread {} is not queued", id),
        }
    }

    fn is_root_bucket_empty(&self, domain: AffinityDomain, bucket: RootBucketId) -> bool {
        match domain {
            AffinityDomain::Unbound => self.clutch.is_empty(bucket),
            AffinityDomain::Bound => self.bound[bucket.index()].is_empty(),
        }
    }

    fn tier_priorities(&self) -> [TierPriorities; 2] {
        let mut priorities = [[None; ROOT_BUCKET_COUNT]; 2];
        for bucket in RootBucketId::ALL {
            priorities[AffinityDomain::Unbound.index()][bucket.index()] = self.clutch.highest_priority(bucket);
            priorities[AffinityDomain::Bound.index()][bucket.index()] = self.bound[bucket.index()].highest_priority();
        }
        priorities
    }

    /// Evaluate a selection without touching any state
    ///
    /// `current`, when given, competes as a virtual head-of-queue entry of
    /// its own root bucket and clutch bucket.
    fn plan(&self, now: Timestamp, current: Option<&Thread>) -> Plan {
        let mut buckets = self.root_buckets;
        let mut priorities = self.tier_priorities();

        if let Some(cur) = current {
            let (d, b) = (cur.domain().index(), cur.root_bucket().index());
            priorities[d][b] = match priorities[d][b] {
                Some(pri) => Some(pri.max(cur.sched_priority())),
                None => {
                    buckets[d][b].on_runnable(now);
                    Some(cur.sched_priority())
                }
            };
        }

        let engine = edf::plan(&buckets, &priorities, now);
        let pick = engine.selection.map(|sel| self.pick_thread(sel, current));
        Plan { engine, pick }
    }

    fn pick_thread(&self, sel: RootSelection, current: Option<&Thread>) -> Pick {
        let current = current.filter(|cur| cur.domain() == sel.domain && cur.root_bucket() == sel.bucket);
        match sel.domain {
            AffinityDomain::Bound => match (self.bound[sel.bucket.index()].head(), current) {
                (Some((key, thread)), Some(cur)) if key.priority > cur.sched_priority() => Pick::Queued(thread.id()),
                (_, Some(_)) => Pick::Current,
                (Some((_, thread)), None) => Pick::Queued(thread.id()),
                (None, None) => panic!("[SCHED CRITICAL] Invariant violated: selected {:?} is empty", sel),
            },
            AffinityDomain::Unbound => self.pick_unbound(sel, current),
        }
    }

    fn pick_unbound(&self, sel: RootSelection, current: Option<&Thread>) -> Pick {
        let Some(cur) = current else {
            return match self.clutch.best(sel.bucket).and_then(ClutchBucket::head) {
                Some(thread) => Pick::Queued(thread.id()),
                None => panic!("[SCHED CRITICAL] Invariant violated: selected {:?} is empty", sel),
            };
        };

        // running thread ranks its clutch bucket as if it were queued at the head
        let own = GroupKey::of(cur);
        let own_bucket = self.clutch.bucket(own);
        let own_key = ClutchKey {
            priority: own_bucket
                .and_then(|bucket| bucket.threads().highest_priority())
                .map_or(cur.sched_priority(), |pri| pri.max(cur.sched_priority())),
            score: own_bucket.map_or_else(
                || self.clutch.score_for(own, self.initial_score()),
                ClutchBucket::score,
            ),
            head_sequence: EnqueueSequence::RUNNING,
            group: cur.group(),
        };

        if let Some(other) = self.clutch.best_excluding(sel.bucket, cur.group()) {
            if other.order_key() < own_key {
                if let Some(thread) = other.head() {
                    return Pick::Queued(thread.id());
                }
            }
        }

        match own_bucket.and_then(ClutchBucket::head) {
            Some(head) if head.sched_priority() > cur.sched_priority() => Pick::Queued(head.id()),
            _ => Pick::Current,
        }
    }

    fn commit(&mut self, plan: &Plan, now: Timestamp) {
        self.root_buckets = plan.engine.buckets;

        let lapses = plan.engine.lapses;
        if !lapses.is_empty() {
            log::debug!(
                "clutch: windows lapsed at {} (warp {:#05x}, starvation {:#05x})",
                now,
                lapses.warp.bits(),
                lapses.starvation.bits()
            );
            self.stats
                .record_lapses(lapses.warp.bits().count_ones(), lapses.starvation.bits().count_ones());
        }

        if let Some(sel) = plan.engine.selection {
            self.stats.record_decision(sel.decision);
            let root = &self.root_buckets[sel.domain.index()][sel.bucket.index()];
            match sel.decision {
                RootDecision::OpenWarp | RootDecision::OpenStarvation => {
                    log::debug!("clutch: {} at {} opened {:?}", root, now, root.window());
                }
                _ => {}
            }
        }
    }

    fn emit(&self, mode: TraverseMode, plan: &Plan) {
        let mut trace = ThreadSelectTrace::new(mode, self.config.cluster_id);
        trace.starvation_closed = plan.engine.lapses.starvation;
        trace.warp_closed = plan.engine.lapses.warp;
        if let Some(sel) = plan.engine.selection {
            trace.flags = sel.decision.flags();
            if sel.domain == AffinityDomain::Bound {
                trace.flags |= SelectFlags::CLUSTER_BOUND;
            }
            trace.root_bucket = Some(sel.bucket);
        }
        log::trace!("clutch: {}", trace);
        self.sink.emit(trace);
    }
}

impl<C, S, P> fmt::Debug for ClutchRunQueue<C, S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClutchRunQueue")
            .field("cluster_id", &self.config.cluster_id)
            .field("threads", &self.index.len())
            .field("clutch_buckets", &self.clutch.live_buckets())
            .field("last_timestamp", &self.last_timestamp)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::clutch::trace::TraceRing;
    use crate::time::{Duration, ManualClock};

    fn thread(id: u64, group: u64, bucket: RootBucketId, pri: u8) -> Thread {
        Thread::new(ThreadId(id), ThreadGroupId(group), bucket, pri)
    }

    fn runqueue(clock: &ManualClock) -> ClutchRunQueue<&ManualClock> {
        ClutchRunQueue::new(RunQueueConfig::default(), clock).unwrap()
    }

    #[test]
    fn test_rejects_bad_enqueues() {
        let clock = ManualClock::new();
        let mut rq = runqueue(&clock);
        let rejected = rq.enqueue(thread(1, 1, RootBucketId::Utility, 21)).unwrap_err();
        assert_eq!(
            rejected.error,
            SchedulerError::PriorityAboveCeiling {
                thread_id: ThreadId(1),
                bucket: RootBucketId::Utility,
                priority: 21,
                ceiling: 20,
            }
        );
        // refused thread is handed back intact
        assert_eq!(rejected.into_thread(), thread(1, 1, RootBucketId::Utility, 21));

        rq.enqueue(thread(1, 1, RootBucketId::Utility, 20)).unwrap();
        assert_eq!(
            rq.enqueue(thread(1, 1, RootBucketId::Utility, 20)).map_err(SchedulerError::from),
            Err(SchedulerError::ThreadAlreadyQueued { thread_id: ThreadId(1) })
        );
        assert_eq!(rq.len(), 1);
    }

    #[test]
    fn test_refused_current_is_handed_back() {
        let clock = ManualClock::new();
        let mut rq = runqueue(&clock);
        rq.enqueue(thread(2, 1, RootBucketId::Default, 31)).unwrap();

        let running = thread(1, 1, RootBucketId::Default, 50);
        let rejected = rq.dequeue_consider_current(running.clone()).unwrap_err();
        assert!(matches!(rejected.error, SchedulerError::PriorityAboveCeiling { .. }));
        assert_eq!(rejected.thread, running);

        // an already queued id is refused the same way
        let twin = thread(2, 1, RootBucketId::Default, 31);
        let rejected = rq.dequeue_consider_current(twin.clone()).unwrap_err();
        assert_eq!(rejected.error, SchedulerError::ThreadAlreadyQueued { thread_id: ThreadId(2) });
        assert_eq!(rejected.into_thread(), twin);
        assert_eq!(rq.len(), 1);
        assert_eq!(rq.stats().current_kept, 0);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let clock = ManualClock::new();
        let result = ClutchRunQueue::new(RunQueueConfig::for_cluster(99), &clock);
        assert!(matches!(result, Err(SchedulerError::InvalidConfig { .. })));
    }

    #[test]
    fn test_remove_updates_root_bucket() {
        let clock = ManualClock::new();
        let mut rq = runqueue(&clock);
        rq.enqueue(thread(1, 1, RootBucketId::Default, 31)).unwrap();
        clock.advance_us(10);
        assert_eq!(rq.remove(ThreadId(1)).map(|t| t.id()), Ok(ThreadId(1)));
        assert_eq!(rq.remove(ThreadId(1)), Err(SchedulerError::ThreadNotFound { thread_id: ThreadId(1) }));
        assert!(rq.is_empty());
        assert_eq!(rq.dequeue(), None);
        assert_eq!(rq.stats().empty_selections, 1);
    }

    #[test]
    fn test_peek_matches_dequeue() {
        let clock = ManualClock::new();
        let mut rq = runqueue(&clock);
        rq.enqueue(thread(1, 1, RootBucketId::Utility, 15)).unwrap();
        rq.enqueue(thread(2, 2, RootBucketId::Default, 25)).unwrap();
        rq.enqueue(thread(3, 2, RootBucketId::Default, 28)).unwrap();
        assert_eq!(rq.highest_priority(), Some(28));
        while let Some(id) = rq.peek() {
            assert_eq!(rq.dequeue().map(|t| t.id()), Some(id));
        }
        assert!(rq.is_empty());
    }

    #[test]
    fn test_current_keeps_core_against_equal_priority() {
        let clock = ManualClock::new();
        let mut rq = runqueue(&clock);
        rq.enqueue(thread(2, 1, RootBucketId::Default, 31)).unwrap();
        let running = thread(1, 1, RootBucketId::Default, 31);

        assert!(!rq.check_preempt(&running));
        let kept = rq.dequeue_consider_current(running).unwrap();
        assert_eq!(kept.id(), ThreadId(1));
        assert_eq!(rq.len(), 1);
        assert_eq!(rq.stats().current_kept, 1);
    }

    #[test]
    fn test_current_loses_to_higher_priority_and_goes_to_head() {
        let clock = ManualClock::new();
        let mut rq = runqueue(&clock);
        rq.enqueue(thread(2, 1, RootBucketId::Default, 31)).unwrap();
        rq.enqueue(thread(3, 1, RootBucketId::Default, 25)).unwrap();
        rq.enqueue(thread(4, 1, RootBucketId::Default, 25)).unwrap();
        let running = thread(1, 1, RootBucketId::Default, 25);

        assert!(rq.check_preempt(&running));
        let winner = rq.dequeue_consider_current(running).unwrap();
        assert_eq!(winner.id(), ThreadId(2));
        assert!(rq.contains(ThreadId(1)));
        // preempted thread runs before its equal-priority peers
        assert_eq!(rq.dequeue().map(|t| t.id()), Some(ThreadId(1)));
        assert_eq!(rq.dequeue().map(|t| t.id()), Some(ThreadId(3)));
    }

    #[test]
    fn test_current_alone_leaves_its_bucket_idle() {
        let clock = ManualClock::new();
        let mut rq = runqueue(&clock);
        let running = thread(1, 1, RootBucketId::UserInitiated, 37);
        let kept = rq.dequeue_consider_current(running).unwrap();
        assert_eq!(kept.id(), ThreadId(1));
        assert!(rq.is_empty());

        // bucket was empty: re-enqueueing must find it idle
        clock.advance_us(5);
        rq.enqueue(kept).unwrap();
        assert_eq!(
            rq.root_bucket(RootBucketId::UserInitiated, AffinityDomain::Unbound).deadline(),
            Timestamp::from_us(37_505)
        );
    }

    #[test]
    fn test_check_preempt_changes_nothing() {
        let clock = ManualClock::new();
        let ring: TraceRing<8> = TraceRing::new();
        let mut rq = runqueue(&clock).with_trace_sink(&ring);
        rq.enqueue(thread(1, 1, RootBucketId::Utility, 20)).unwrap();
        clock.set_us(120_000);
        rq.enqueue(thread(2, 2, RootBucketId::UserInitiated, 37)).unwrap();

        let before = *rq.root_bucket(RootBucketId::UserInitiated, AffinityDomain::Unbound);
        let running = thread(9, 3, RootBucketId::Background, 4);
        assert!(rq.check_preempt(&running));
        assert_eq!(*rq.root_bucket(RootBucketId::UserInitiated, AffinityDomain::Unbound), before);
        assert_eq!(rq.len(), 2);

        let trace = ring.last().unwrap();
        assert_eq!(trace.mode, TraverseMode::CheckPreempt);
        assert!(trace.opened_warp());
        assert_eq!(rq.stats().warp_opened, 0);
        assert_eq!(rq.stats().preemptions_signalled, 1);
    }

    #[test]
    fn test_interactivity_score_bounds() {
        let clock = ManualClock::new();
        let mut rq = runqueue(&clock);
        assert_eq!(rq.interactivity_score(ThreadGroupId(1), RootBucketId::Default), SCORE_MAX);
        assert_eq!(
            rq.set_interactivity_score(ThreadGroupId(1), RootBucketId::Default, SCORE_MAX + 1),
            Err(SchedulerError::InvalidScore { score: 17, max: SCORE_MAX })
        );
        rq.set_interactivity_score(ThreadGroupId(1), RootBucketId::Default, 3).unwrap();
        assert_eq!(rq.interactivity_score(ThreadGroupId(1), RootBucketId::Default), 3);
        // fixed policy ignores usage
        assert_eq!(rq.account_usage(ThreadGroupId(1), RootBucketId::Default, 500, 0), 3);
        assert_eq!(rq.forget_thread_group(ThreadGroupId(1)), Ok(1));
        assert_eq!(rq.interactivity_score(ThreadGroupId(1), RootBucketId::Default), SCORE_MAX);
    }

    #[test]
    #[should_panic(expected = "clock moved backwards")]
    fn test_backwards_clock_is_fatal() {
        let clock = ManualClock::starting_at(Timestamp::from_us(100));
        let mut rq = runqueue(&clock);
        clock.set(Timestamp::from_us(100) - Duration::from_us(1));
        rq.dequeue();
    }
}
