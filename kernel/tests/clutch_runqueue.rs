//! Conformance tests of the Clutch run queue
//!
//! Time is driven explicitly through a `ManualClock`; every selection is
//! checked against the record left in a `TraceRing`.

use clutch_sched::scheduler::clutch::{
    ClutchRunQueue, CpuRatioPolicy, GroupUsage, InteractivityPolicy, SelectFlags, ThreadSelectTrace, TraceRing,
    TraceWire, TraverseMode, WindowMask, SCORE_MAX,
};
use clutch_sched::scheduler::core::{AffinityDomain, RootBucketId, RunQueueConfig};
use clutch_sched::scheduler::thread::{EnqueuePosition, Thread, ThreadGroupId, ThreadId};
use clutch_sched::time::ManualClock;
use proptest::prelude::*;
use zerocopy::FromBytes;

type Ring = TraceRing<64>;
type TestQueue<'a> = ClutchRunQueue<&'a ManualClock, &'a Ring>;

const MS: u64 = 1_000;

fn runqueue<'a>(clock: &'a ManualClock, ring: &'a Ring) -> TestQueue<'a> {
    ClutchRunQueue::new(RunQueueConfig::for_cluster(3), clock)
        .unwrap()
        .with_trace_sink(ring)
}

fn thread(id: u64, group: u64, bucket: RootBucketId, pri: u8) -> Thread {
    Thread::new(ThreadId(id), ThreadGroupId(group), bucket, pri)
}

fn ceiling(bucket: RootBucketId) -> u8 {
    RunQueueConfig::default().params(bucket).ceiling_priority
}

/// Queue `count` threads of one group at the tier ceiling
fn fill(rq: &mut TestQueue<'_>, first_id: u64, count: u64, group: u64, bucket: RootBucketId, bound: bool) {
    for id in first_id..first_id + count {
        let t = thread(id, group, bucket, ceiling(bucket)).with_processor_bound(bound);
        rq.enqueue(t).unwrap();
    }
}

fn select_at(rq: &mut TestQueue<'_>, clock: &ManualClock, ring: &Ring, at_us: u64) -> (Thread, ThreadSelectTrace) {
    clock.set_us(at_us);
    let picked = rq.dequeue().expect("run queue unexpectedly empty");
    let trace = ring.last().expect("selection left no trace");
    (picked, trace)
}

// ═══════════════════════════════════════════════════════════════
// Affinity tie-break
// ═══════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn bound_thread_wins_priority_tie(
        tier in 0u8..6,
        pri_seed in any::<u8>(),
        bound_first in any::<bool>(),
    ) {
        let bucket = RootBucketId::from_raw(tier).unwrap();
        let pri = pri_seed % (ceiling(bucket) + 1);
        let clock = ManualClock::new();
        let ring = Ring::new();
        let mut rq = runqueue(&clock, &ring);

        let bound = thread(1, 1, bucket, pri).with_processor_bound(true);
        let unbound = thread(2, 2, bucket, pri);
        if bound_first {
            rq.enqueue(bound).unwrap();
            rq.enqueue(unbound).unwrap();
        } else {
            rq.enqueue(unbound).unwrap();
            rq.enqueue(bound).unwrap();
        }

        let first = rq.dequeue().unwrap();
        prop_assert_eq!(first.id(), ThreadId(1));
        prop_assert!(ring.last().unwrap().is_cluster_bound());
        prop_assert_eq!(rq.dequeue().unwrap().id(), ThreadId(2));
        prop_assert!(!ring.last().unwrap().is_cluster_bound());
    }
}

#[test]
fn higher_priority_unbound_beats_bound() {
    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring);
    rq.enqueue(thread(1, 1, RootBucketId::Default, 25).with_processor_bound(true)).unwrap();
    rq.enqueue(thread(2, 2, RootBucketId::Default, 26)).unwrap();
    assert_eq!(rq.dequeue().map(|t| t.id()), Some(ThreadId(2)));
}

// ═══════════════════════════════════════════════════════════════
// Tier order
// ═══════════════════════════════════════════════════════════════

const TIER_ORDER: [RootBucketId; 6] = RootBucketId::ALL;

fn dequeue_tiers(order: &[RootBucketId]) -> Vec<(RootBucketId, ThreadSelectTrace)> {
    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring);
    for (i, &bucket) in order.iter().enumerate() {
        rq.enqueue(thread(i as u64 + 1, 10 + i as u64, bucket, ceiling(bucket))).unwrap();
    }
    let picked: Vec<_> = core::iter::from_fn(|| rq.dequeue())
        .map(|t| (t.root_bucket(), ring.last().unwrap()))
        .collect();
    assert_eq!(rq.dequeue(), None);
    picked
}

#[test]
fn tiers_dequeue_in_natural_order_for_fixed_shuffles() {
    use RootBucketId::*;
    let shuffles = [
        [Background, Utility, Default, UserInitiated, Foreground, FixPri],
        [Default, FixPri, Background, Foreground, Utility, UserInitiated],
        [UserInitiated, Background, FixPri, Utility, Default, Foreground],
        [Utility, Foreground, UserInitiated, Background, FixPri, Default],
        [Foreground, Default, Utility, FixPri, UserInitiated, Background],
    ];
    for order in shuffles {
        let picked = dequeue_tiers(&order);
        let tiers: Vec<_> = picked.iter().map(|(bucket, _)| *bucket).collect();
        assert_eq!(tiers, TIER_ORDER, "enqueue order {:?}", order);

        // FixPri runs above UI, the rest by plain EDF
        assert_eq!(picked[0].1.flags, SelectFlags::empty());
        for (_, trace) in &picked[1..] {
            assert_eq!(trace.flags, SelectFlags::EDF);
            assert!(trace.warp_closed.is_empty());
            assert!(trace.starvation_closed.is_empty());
        }
    }
}

proptest! {
    #[test]
    fn tiers_dequeue_in_natural_order(order in Just(TIER_ORDER.to_vec()).prop_shuffle()) {
        let tiers: Vec<_> = dequeue_tiers(&order).into_iter().map(|(bucket, _)| bucket).collect();
        prop_assert_eq!(tiers, TIER_ORDER.to_vec());
    }
}

#[test]
fn fixpri_yields_to_more_urgent_timeshare() {
    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring);
    rq.enqueue(thread(1, 1, RootBucketId::FixPri, 40)).unwrap();
    rq.enqueue(thread(2, 2, RootBucketId::Foreground, 50)).unwrap();
    assert_eq!(rq.dequeue().map(|t| t.id()), Some(ThreadId(2)));
    assert_eq!(rq.dequeue().map(|t| t.id()), Some(ThreadId(1)));
}

// ═══════════════════════════════════════════════════════════════
// Warp and starvation avoidance
// ═══════════════════════════════════════════════════════════════

#[test]
fn warp_window_lasts_exactly_its_budget() {
    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring);
    fill(&mut rq, 100, 8, 1, RootBucketId::Utility, false);
    clock.set_us(120 * MS);
    fill(&mut rq, 200, 8, 2, RootBucketId::UserInitiated, false);

    let (t, trace) = select_at(&mut rq, &clock, &ring, 120 * MS);
    assert_eq!(t.root_bucket(), RootBucketId::UserInitiated);
    assert_eq!(trace.flags, SelectFlags::WARP_OPENED);

    let (t, trace) = select_at(&mut rq, &clock, &ring, 122 * MS);
    assert_eq!(t.root_bucket(), RootBucketId::UserInitiated);
    assert_eq!(trace.flags, SelectFlags::empty());

    let (t, trace) = select_at(&mut rq, &clock, &ring, 124 * MS - 1);
    assert_eq!(t.root_bucket(), RootBucketId::UserInitiated);
    assert!(trace.warp_closed.is_empty());

    // budget spent: the displaced bucket runs next
    let (t, trace) = select_at(&mut rq, &clock, &ring, 124 * MS);
    assert_eq!(t.root_bucket(), RootBucketId::Utility);
    assert_eq!(trace.flags, SelectFlags::EDF);
    assert_eq!(trace.warp_closed, WindowMask::IN);

    let (t, trace) = select_at(&mut rq, &clock, &ring, 126 * MS);
    assert_eq!(t.root_bucket(), RootBucketId::UserInitiated);
    assert_eq!(trace.flags, SelectFlags::EDF);
    assert!(trace.warp_closed.is_empty());

    let stats = rq.stats();
    assert_eq!(stats.warp_opened, 1);
    assert_eq!(stats.warp_closed, 1);
}

#[test]
fn starvation_avoidance_preempts_open_warp() {
    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring);
    fill(&mut rq, 100, 8, 1, RootBucketId::Utility, false);
    clock.set_us(148 * MS);
    fill(&mut rq, 200, 8, 2, RootBucketId::UserInitiated, false);

    let (t, trace) = select_at(&mut rq, &clock, &ring, 148 * MS);
    assert_eq!(t.root_bucket(), RootBucketId::UserInitiated);
    assert!(trace.opened_warp());

    // UT overdue since 150ms, IN still mid-window
    let (t, trace) = select_at(&mut rq, &clock, &ring, 151 * MS);
    assert_eq!(t.root_bucket(), RootBucketId::Utility);
    assert_eq!(trace.flags, SelectFlags::EDF | SelectFlags::STARVATION_OPENED);

    let (t, trace) = select_at(&mut rq, &clock, &ring, 153 * MS);
    assert_eq!(t.root_bucket(), RootBucketId::Utility);
    assert_eq!(trace.flags, SelectFlags::EDF);
    assert_eq!(trace.warp_closed, WindowMask::IN);

    let (t, trace) = select_at(&mut rq, &clock, &ring, 156 * MS);
    assert_eq!(t.root_bucket(), RootBucketId::UserInitiated);
    assert_eq!(trace.flags, SelectFlags::EDF);
    assert_eq!(trace.starvation_closed, WindowMask::UT);
    assert_eq!(
        rq.root_bucket(RootBucketId::Utility, AffinityDomain::Unbound).deadline(),
        clutch_sched::Timestamp::from_us(306 * MS)
    );
}

#[test]
fn bound_domain_windows_use_bound_bits() {
    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring);
    fill(&mut rq, 100, 4, 1, RootBucketId::Utility, true);
    clock.set_us(120 * MS);
    fill(&mut rq, 200, 4, 2, RootBucketId::UserInitiated, true);

    let (t, trace) = select_at(&mut rq, &clock, &ring, 120 * MS);
    assert!(t.is_processor_bound());
    assert_eq!(trace.flags, SelectFlags::WARP_OPENED | SelectFlags::CLUSTER_BOUND);
    assert_eq!(trace.root_bucket, Some(RootBucketId::UserInitiated));

    let (t, trace) = select_at(&mut rq, &clock, &ring, 124 * MS);
    assert_eq!(t.root_bucket(), RootBucketId::Utility);
    assert_eq!(trace.warp_closed, WindowMask::BOUND_IN);
    assert_eq!(trace.flags, SelectFlags::EDF | SelectFlags::CLUSTER_BOUND);
}

#[test]
fn starving_bound_bucket_beats_higher_unbound_tier() {
    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring);
    fill(&mut rq, 100, 4, 1, RootBucketId::Utility, true);
    clock.set_us(148 * MS);
    fill(&mut rq, 200, 4, 2, RootBucketId::UserInitiated, false);

    let (t, trace) = select_at(&mut rq, &clock, &ring, 148 * MS);
    assert_eq!(t.root_bucket(), RootBucketId::UserInitiated);
    assert_eq!(trace.flags, SelectFlags::EDF);

    let (t, trace) = select_at(&mut rq, &clock, &ring, 151 * MS);
    assert_eq!(t.root_bucket(), RootBucketId::Utility);
    assert!(t.is_processor_bound());
    assert_eq!(
        trace.flags,
        SelectFlags::EDF | SelectFlags::STARVATION_OPENED | SelectFlags::CLUSTER_BOUND
    );
}

// ═══════════════════════════════════════════════════════════════
// Thread groups
// ═══════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn higher_score_group_runs_first(
        score_a in 0u8..=SCORE_MAX,
        score_b in 0u8..=SCORE_MAX,
        a_first in any::<bool>(),
    ) {
        prop_assume!(score_a != score_b);
        let clock = ManualClock::new();
        let ring = Ring::new();
        let mut rq = runqueue(&clock, &ring);
        rq.set_interactivity_score(ThreadGroupId(1), RootBucketId::Default, score_a).unwrap();
        rq.set_interactivity_score(ThreadGroupId(2), RootBucketId::Default, score_b).unwrap();

        let a = thread(1, 1, RootBucketId::Default, 28);
        let b = thread(2, 2, RootBucketId::Default, 28);
        if a_first {
            rq.enqueue(a).unwrap();
            rq.enqueue(b).unwrap();
        } else {
            rq.enqueue(b).unwrap();
            rq.enqueue(a).unwrap();
        }

        let expected = if score_a > score_b { ThreadGroupId(1) } else { ThreadGroupId(2) };
        prop_assert_eq!(rq.dequeue().unwrap().group(), expected);
    }
}

#[test]
fn priority_still_beats_score() {
    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring);
    rq.set_interactivity_score(ThreadGroupId(1), RootBucketId::Default, 0).unwrap();
    rq.enqueue(thread(1, 1, RootBucketId::Default, 30)).unwrap();
    rq.enqueue(thread(2, 2, RootBucketId::Default, 29)).unwrap();
    assert_eq!(rq.dequeue().map(|t| t.id()), Some(ThreadId(1)));
}

#[test]
fn new_group_starts_with_max_score() {
    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring);
    rq.enqueue(thread(1, 1, RootBucketId::Utility, 18)).unwrap();
    rq.set_interactivity_score(ThreadGroupId(1), RootBucketId::Utility, 4).unwrap();

    // never seen in this tier before
    assert_eq!(rq.interactivity_score(ThreadGroupId(2), RootBucketId::Utility), SCORE_MAX);
    rq.enqueue(thread(2, 2, RootBucketId::Utility, 18)).unwrap();
    assert_eq!(rq.dequeue().map(|t| t.group()), Some(ThreadGroupId(2)));
    assert_eq!(rq.dequeue().map(|t| t.group()), Some(ThreadGroupId(1)));

    // history survives the empty clutch bucket
    assert_eq!(rq.interactivity_score(ThreadGroupId(1), RootBucketId::Utility), 4);
}

#[test]
fn usage_policy_favours_interactive_groups() {
    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring).with_interactivity_policy(CpuRatioPolicy::default());

    assert_eq!(rq.account_usage(ThreadGroupId(1), RootBucketId::Default, 9_000, 1_000), 0);
    assert_eq!(rq.account_usage(ThreadGroupId(2), RootBucketId::Default, 1_000, 9_000), 15);

    rq.enqueue(thread(1, 1, RootBucketId::Default, 31)).unwrap();
    rq.enqueue(thread(2, 2, RootBucketId::Default, 31)).unwrap();
    assert_eq!(rq.dequeue().map(|t| t.group()), Some(ThreadGroupId(2)));
}

#[test]
fn usage_policy_survives_saturated_counters() {
    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring).with_interactivity_policy(CpuRatioPolicy::default());

    assert_eq!(rq.account_usage(ThreadGroupId(1), RootBucketId::Default, 0, u64::MAX / 2), SCORE_MAX);
    // used saturates at u64::MAX, blocked stays at u64::MAX / 2
    assert_eq!(rq.account_usage(ThreadGroupId(1), RootBucketId::Default, u64::MAX, 0), 3);
    // both saturated: balanced
    assert_eq!(rq.account_usage(ThreadGroupId(1), RootBucketId::Default, u64::MAX, u64::MAX), 8);
}

/// Policy that ignores the score range
struct Overshoot;

impl InteractivityPolicy for Overshoot {
    fn initial_score(&self) -> u8 {
        90
    }

    fn rescore(&self, _usage: &GroupUsage, _current: u8) -> u8 {
        200
    }
}

#[test]
fn out_of_range_policy_scores_are_clamped() {
    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring).with_interactivity_policy(Overshoot);

    assert_eq!(rq.interactivity_score(ThreadGroupId(1), RootBucketId::Default), SCORE_MAX);
    assert_eq!(rq.account_usage(ThreadGroupId(1), RootBucketId::Default, 10, 10), SCORE_MAX);
    assert_eq!(rq.interactivity_score(ThreadGroupId(1), RootBucketId::Default), SCORE_MAX);

    // a fresh group starts at SCORE_MAX, not above it: ties fall back to FIFO
    rq.set_interactivity_score(ThreadGroupId(2), RootBucketId::Default, SCORE_MAX).unwrap();
    rq.enqueue(thread(2, 2, RootBucketId::Default, 31)).unwrap();
    rq.enqueue(thread(3, 3, RootBucketId::Default, 31)).unwrap();
    assert_eq!(rq.interactivity_score(ThreadGroupId(3), RootBucketId::Default), SCORE_MAX);
    assert_eq!(rq.dequeue().map(|t| t.group()), Some(ThreadGroupId(2)));
}

#[test]
fn busy_group_cannot_be_forgotten() {
    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring);
    rq.enqueue(thread(1, 7, RootBucketId::Default, 31)).unwrap();
    assert!(rq.forget_thread_group(ThreadGroupId(7)).is_err());
    rq.remove(ThreadId(1)).unwrap();
    assert_eq!(rq.forget_thread_group(ThreadGroupId(7)), Ok(1));
}

// ═══════════════════════════════════════════════════════════════
// FIFO
// ═══════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn equal_rank_threads_keep_enqueue_order(
        ids in proptest::collection::hash_set(1u64..1_000, 2..8),
        pri in 21u8..=31,
    ) {
        let clock = ManualClock::new();
        let ring = Ring::new();
        let mut rq = runqueue(&clock, &ring);
        let ids: Vec<u64> = ids.into_iter().collect();
        for &id in &ids {
            rq.enqueue(thread(id, 1, RootBucketId::Default, pri)).unwrap();
        }
        let order: Vec<u64> = core::iter::from_fn(|| rq.dequeue()).map(|t| t.id().0).collect();
        prop_assert_eq!(order, ids);
    }
}

#[test]
fn head_enqueue_jumps_equal_priority_peers() {
    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring);
    rq.enqueue(thread(1, 1, RootBucketId::Default, 31)).unwrap();
    rq.enqueue(thread(2, 1, RootBucketId::Default, 31)).unwrap();
    rq.enqueue_at(thread(3, 1, RootBucketId::Default, 31), EnqueuePosition::Head).unwrap();
    let order: Vec<u64> = core::iter::from_fn(|| rq.dequeue()).map(|t| t.id().0).collect();
    assert_eq!(order, [3, 1, 2]);
}

// ═══════════════════════════════════════════════════════════════
// Trace fidelity
// ═══════════════════════════════════════════════════════════════

struct Expect {
    at_ms: u64,
    bucket: RootBucketId,
    flags: SelectFlags,
    warp_closed: WindowMask,
    starvation_closed: WindowMask,
}

const fn expect(at_ms: u64, bucket: RootBucketId, flags: SelectFlags) -> Expect {
    Expect {
        at_ms,
        bucket,
        flags,
        warp_closed: WindowMask::empty(),
        starvation_closed: WindowMask::empty(),
    }
}

#[test]
fn trace_follows_full_warp_and_starvation_cycle() {
    use RootBucketId::*;
    const EDF: SelectFlags = SelectFlags::EDF;
    const NONE: SelectFlags = SelectFlags::empty();
    const WARP: SelectFlags = SelectFlags::WARP_OPENED;
    const STARVE: SelectFlags = EDF.union(SelectFlags::STARVATION_OPENED);

    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring);
    fill(&mut rq, 300, 6, 3, Utility, false);
    fill(&mut rq, 400, 6, 4, Background, false);

    let timeline = [
        expect(0, Utility, EDF),
        // Default shows up at 100ms and warps ahead of Utility
        expect(100, Default, WARP),
        expect(101, Default, NONE),
        Expect { warp_closed: WindowMask::DF, ..expect(102, Utility, EDF) },
        expect(150, Default, EDF),
        // UserInitiated shows up at 200ms
        expect(200, UserInitiated, WARP),
        expect(203, UserInitiated, NONE),
        Expect { warp_closed: WindowMask::IN, ..expect(204, Default, EDF) },
        expect(251, UserInitiated, EDF),
        expect(252, Background, STARVE),
        expect(253, Background, EDF),
        Expect { starvation_closed: WindowMask::BG, ..expect(254, Utility, STARVE) },
        Expect { starvation_closed: WindowMask::UT, ..expect(258, UserInitiated, WARP) },
        Expect { warp_closed: WindowMask::IN, ..expect(262, Default, EDF) },
    ];

    for (step, want) in timeline.iter().enumerate() {
        clock.set_us(want.at_ms * MS);
        match want.at_ms {
            100 => fill(&mut rq, 500, 6, 5, Default, false),
            200 => fill(&mut rq, 600, 6, 6, UserInitiated, false),
            _ => {}
        }
        let picked = rq.dequeue().expect("runnable");
        let trace = ring.last().unwrap();
        assert_eq!(picked.root_bucket(), want.bucket, "step {} at {}ms", step, want.at_ms);
        assert_eq!(trace.root_bucket, Some(want.bucket), "step {}", step);
        assert_eq!(trace.flags, want.flags, "step {} at {}ms", step, want.at_ms);
        assert_eq!(trace.warp_closed, want.warp_closed, "step {} at {}ms", step, want.at_ms);
        assert_eq!(trace.starvation_closed, want.starvation_closed, "step {} at {}ms", step, want.at_ms);
        assert_eq!(trace.mode, TraverseMode::Remove);
        assert_eq!(trace.cluster_id, 3);
    }

    let stats = rq.stats();
    assert_eq!(stats.selections, timeline.len() as u64);
    assert_eq!(stats.warp_opened, 3);
    assert_eq!(stats.warp_closed, 3);
    assert_eq!(stats.starvation_opened, 2);
    assert_eq!(stats.starvation_closed, 2);
}

#[test]
fn every_traversal_leaves_one_record() {
    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring);

    assert_eq!(rq.dequeue(), None);
    rq.enqueue(thread(1, 1, RootBucketId::Default, 30)).unwrap();
    let running = thread(2, 2, RootBucketId::Default, 31);
    assert!(!rq.check_preempt(&running));
    let running = rq.dequeue_consider_current(running).unwrap();
    assert_eq!(running.id(), ThreadId(2));
    assert_eq!(rq.peek(), Some(ThreadId(1)));

    let records = ring.drain();
    let modes: Vec<_> = records.iter().map(|r| r.mode).collect();
    assert_eq!(
        modes,
        [TraverseMode::Remove, TraverseMode::CheckPreempt, TraverseMode::RemoveConsiderCurrent]
    );
    assert_eq!(records[0].root_bucket, None);
    assert_eq!(records[0].pack() >> 41, 7);
    for record in &records[1..] {
        assert_eq!(record.root_bucket, Some(RootBucketId::Default));
    }
}

#[test]
fn records_survive_the_wire() {
    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring);
    rq.enqueue(thread(1, 1, RootBucketId::Background, 4).with_processor_bound(true)).unwrap();
    rq.dequeue().unwrap();

    let record = ring.last().unwrap();
    let bytes = record.to_wire();
    let wire = TraceWire::read_from(zerocopy::AsBytes::as_bytes(&bytes)).unwrap();
    assert_eq!(wire.decode(), Some(record));
    assert_eq!(wire.raw() & 0xf, 1);
    assert_eq!((wire.raw() >> 7) & 0x3f, 3);
    assert_eq!((wire.raw() >> 41) & 0x7, RootBucketId::Background as u64);
}

// ═══════════════════════════════════════════════════════════════
// Running thread
// ═══════════════════════════════════════════════════════════════

#[test]
fn check_preempt_leaves_windows_alone() {
    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring);
    fill(&mut rq, 100, 2, 1, RootBucketId::Utility, false);
    clock.set_us(151 * MS);
    fill(&mut rq, 200, 2, 2, RootBucketId::UserInitiated, false);

    let snapshot = |rq: &TestQueue<'_>| {
        RootBucketId::ALL.map(|b| *rq.root_bucket(b, AffinityDomain::Unbound))
    };
    let before = snapshot(&rq);
    let running = thread(9, 9, RootBucketId::Background, 2);
    for _ in 0..3 {
        assert!(rq.check_preempt(&running));
    }
    assert_eq!(snapshot(&rq), before);
    assert_eq!(rq.stats().starvation_opened, 0);
    assert_eq!(rq.stats().preempt_checks, 3);

    // the committed traversal reaches the same verdict
    let (t, trace) = select_at(&mut rq, &clock, &ring, 151 * MS);
    assert_eq!(t.root_bucket(), RootBucketId::Utility);
    assert!(trace.opened_starvation_avoidance());
}

#[test]
fn running_thread_of_higher_tier_keeps_core() {
    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring);
    fill(&mut rq, 100, 2, 1, RootBucketId::Utility, false);

    let running = thread(7, 2, RootBucketId::Foreground, 50);
    assert!(!rq.check_preempt(&running));
    let kept = rq.dequeue_consider_current(running).unwrap();
    assert_eq!(kept.id(), ThreadId(7));
    assert_eq!(rq.len(), 2);
    assert!(!rq.contains(ThreadId(7)));
}

#[test]
fn running_thread_loses_to_interactive_group() {
    let clock = ManualClock::new();
    let ring = Ring::new();
    let mut rq = runqueue(&clock, &ring);
    rq.set_interactivity_score(ThreadGroupId(1), RootBucketId::Default, 2).unwrap();
    rq.enqueue(thread(2, 2, RootBucketId::Default, 30)).unwrap();

    let running = thread(1, 1, RootBucketId::Default, 30);
    assert!(rq.check_preempt(&running));
    let winner = rq.dequeue_consider_current(running).unwrap();
    assert_eq!(winner.id(), ThreadId(2));
    assert!(rq.contains(ThreadId(1)));
    assert_eq!(rq.dequeue().map(|t| t.id()), Some(ThreadId(1)));
}
