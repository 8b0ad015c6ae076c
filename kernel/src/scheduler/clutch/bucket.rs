//! Clutch buckets and clutch bucket groups
//!
//! A clutch bucket holds the runnable unbound threads of one thread group in
//! one root bucket. It lives only while it has threads. The group record
//! keyed by the same (thread group, root bucket) pair outlives it and keeps
//! the interactivity history.

use core::cmp::Ordering as CmpOrdering;

use super::interactivity::GroupUsage;
use crate::scheduler::core::policy::RootBucketId;
use crate::scheduler::thread::{EnqueueSequence, Thread, ThreadGroupId, ThreadKey, ThreadQueue};

/// Identity of a clutch bucket (and of its group record)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub group: ThreadGroupId,
    pub bucket: RootBucketId,
}

impl GroupKey {
    pub const fn new(group: ThreadGroupId, bucket: RootBucketId) -> Self {
        Self { group, bucket }
    }

    pub fn of(thread: &Thread) -> Self {
        Self::new(thread.group(), thread.root_bucket())
    }
}

/// Interactivity history of a (thread group, root bucket) pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClutchBucketGroup {
    pub score: u8,
    pub usage: GroupUsage,
}

impl ClutchBucketGroup {
    pub fn new(score: u8) -> Self {
        Self {
            score,
            usage: GroupUsage::default(),
        }
    }
}

/// Ordering key of a clutch bucket inside its root bucket
///
/// Smallest sorts first: highest thread priority, then highest score, then
/// the earliest-enqueued head thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClutchKey {
    pub priority: u8,
    pub score: u8,
    pub head_sequence: EnqueueSequence,
    pub group: ThreadGroupId,
}

impl Ord for ClutchKey {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .priority
            .cmp(&self.priority)
            .then(other.score.cmp(&self.score))
            .then(self.head_sequence.cmp(&other.head_sequence))
            .then(self.group.cmp(&other.group))
    }
}

impl PartialOrd for ClutchKey {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// Runnable threads of one group in one root bucket
#[derive(Debug)]
pub struct ClutchBucket {
    key: GroupKey,
    score: u8,
    threads: ThreadQueue,
}

impl ClutchBucket {
    pub fn new(key: GroupKey, score: u8) -> Self {
        Self {
            key,
            score,
            threads: ThreadQueue::new(),
        }
    }

    pub fn key(&self) -> GroupKey {
        self.key
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn set_score(&mut self, score: u8) {
        self.score = score;
    }

    pub fn threads(&self) -> &ThreadQueue {
        &self.threads
    }

    pub fn insert(&mut self, thread: Thread, sequence: EnqueueSequence) -> ThreadKey {
        crate::sched_assert!(
            GroupKey::of(&thread) == self.key,
            "thread {} enqueued into foreign clutch bucket {:?}",
            thread.id(),
            self.key
        );
        self.threads.insert(thread, sequence)
    }

    pub fn remove(&mut self, key: &ThreadKey) -> Option<Thread> {
        self.threads.remove(key)
    }

    pub fn head(&self) -> Option<&Thread> {
        self.threads.head().map(|(_, thread)| thread)
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Current ordering key; only meaningful while the bucket has threads
    pub fn order_key(&self) -> ClutchKey {
        let head = self.threads.head_key();
        crate::sched_assert!(head.is_some(), "ordering key of empty clutch bucket {:?}", self.key);
        let head = head.unwrap_or(ThreadKey {
            priority: 0,
            sequence: EnqueueSequence::RUNNING,
        });
        ClutchKey {
            priority: head.priority,
            score: self.score,
            head_sequence: head.sequence,
            group: self.key.group,
        }
    }
}
