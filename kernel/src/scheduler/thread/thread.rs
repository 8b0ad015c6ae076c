//! Thread Structure
//!
//! The run queue only needs a thread's scheduling identity: who it is, which
//! group it accounts to, which tier it was placed in, its effective priority
//! and whether it is pinned to a core. Everything else (context, stack,
//! signals) stays with the owner of the thread.

use core::cmp::Ordering as CmpOrdering;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::scheduler::core::policy::{AffinityDomain, RootBucketId};

/// Thread ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread group ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadGroupId(pub u64);

impl fmt::Display for ThreadGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tg{}", self.0)
    }
}

/// Next thread ID to allocate
static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a new unique thread ID
pub fn alloc_thread_id() -> ThreadId {
    ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
}

/// Position of an enqueue within its priority level
///
/// Tail inserts count up from the midpoint of the `u64` range and head
/// inserts count down from just below it, so one ascending order gives
/// "head inserts newest-first, then tail inserts oldest-first".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EnqueueSequence(pub u64);

impl EnqueueSequence {
    const MIDPOINT: u64 = 1 << 63;

    /// Sorts ahead of every sequence the allocator hands out; reserved for
    /// the running thread when it competes against the queue.
    pub const RUNNING: Self = Self(0);
}

/// Where a thread lands among peers of equal priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnqueuePosition {
    /// Behind every equal-priority peer (wakeups, yields)
    #[default]
    Tail,
    /// Ahead of every equal-priority peer (preempted threads)
    Head,
}

/// Per run queue enqueue sequence allocator
#[derive(Debug, Clone)]
pub struct SequenceAllocator {
    next_tail: u64,
    next_head: u64,
}

impl SequenceAllocator {
    pub const fn new() -> Self {
        Self {
            next_tail: EnqueueSequence::MIDPOINT,
            next_head: EnqueueSequence::MIDPOINT - 1,
        }
    }

    pub fn next(&mut self, position: EnqueuePosition) -> EnqueueSequence {
        match position {
            EnqueuePosition::Tail => {
                let seq = self.next_tail;
                self.next_tail += 1;
                EnqueueSequence(seq)
            }
            EnqueuePosition::Head => {
                let seq = self.next_head;
                self.next_head -= 1;
                EnqueueSequence(seq)
            }
        }
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Schedulable thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    id: ThreadId,
    group: ThreadGroupId,
    root_bucket: RootBucketId,
    sched_priority: u8,
    processor_bound: bool,
    enqueue_sequence: Option<EnqueueSequence>,
}

impl Thread {
    /// Create a runnable thread placed in `root_bucket`
    pub fn new(id: ThreadId, group: ThreadGroupId, root_bucket: RootBucketId, sched_priority: u8) -> Self {
        Self {
            id,
            group,
            root_bucket,
            sched_priority,
            processor_bound: false,
            enqueue_sequence: None,
        }
    }

    /// Create a timeshare thread whose tier follows from its base priority
    pub fn timeshare(id: ThreadId, group: ThreadGroupId, base_priority: u8) -> Self {
        Self::new(id, group, RootBucketId::for_base_priority(base_priority), base_priority)
    }

    /// Pin (or unpin) the thread to a core
    pub fn with_processor_bound(mut self, bound: bool) -> Self {
        self.processor_bound = bound;
        self
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn group(&self) -> ThreadGroupId {
        self.group
    }

    pub fn root_bucket(&self) -> RootBucketId {
        self.root_bucket
    }

    pub fn sched_priority(&self) -> u8 {
        self.sched_priority
    }

    pub fn is_processor_bound(&self) -> bool {
        self.processor_bound
    }

    pub fn domain(&self) -> AffinityDomain {
        AffinityDomain::of(self.processor_bound)
    }

    /// Sequence assigned by the most recent enqueue, if any
    pub fn enqueue_sequence(&self) -> Option<EnqueueSequence> {
        self.enqueue_sequence
    }

    pub(crate) fn stamp(&mut self, sequence: EnqueueSequence) {
        self.enqueue_sequence = Some(sequence);
    }
}

impl fmt::Display for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "thread {} ({} {} pri {}{})",
            self.id,
            self.group,
            self.root_bucket,
            self.sched_priority,
            if self.processor_bound { " bound" } else { "" }
        )
    }
}

/// Ordering key of a queued thread: higher priority first, then FIFO
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadKey {
    pub priority: u8,
    pub sequence: EnqueueSequence,
}

impl ThreadKey {
    pub fn of(thread: &Thread, sequence: EnqueueSequence) -> Self {
        Self {
            priority: thread.sched_priority,
            sequence,
        }
    }
}

impl Ord for ThreadKey {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .priority
            .cmp(&self.priority)
            .then(self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for ThreadKey {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_sequences_sort_before_tail_sequences() {
        let mut seq = SequenceAllocator::new();
        let t1 = seq.next(EnqueuePosition::Tail);
        let t2 = seq.next(EnqueuePosition::Tail);
        let h1 = seq.next(EnqueuePosition::Head);
        let h2 = seq.next(EnqueuePosition::Head);
        assert!(t1 < t2);
        assert!(h1 < t1);
        assert!(h2 < h1);
        assert!(EnqueueSequence::RUNNING < h2);
    }

    #[test]
    fn test_thread_key_orders_priority_then_fifo() {
        let thread = |pri| Thread::new(ThreadId(1), ThreadGroupId(1), RootBucketId::Default, pri);
        let hi = ThreadKey::of(&thread(31), EnqueueSequence(10));
        let lo_early = ThreadKey::of(&thread(20), EnqueueSequence(1));
        let hi_late = ThreadKey::of(&thread(31), EnqueueSequence(11));
        assert!(hi < lo_early);
        assert!(hi < hi_late);
    }

    #[test]
    fn test_timeshare_placement() {
        let t = Thread::timeshare(alloc_thread_id(), ThreadGroupId(3), 45);
        assert_eq!(t.root_bucket(), RootBucketId::Foreground);
        assert_eq!(t.domain(), AffinityDomain::Unbound);
        assert_eq!(t.with_processor_bound(true).domain(), AffinityDomain::Bound);
    }
}
