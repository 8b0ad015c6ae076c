//! Clutch bucket arena
//!
//! Clutch buckets live in a slot arena addressed through their
//! (thread group, root bucket) key. A bucket is created on the first enqueue
//! for its key and its slot is recycled as soon as its last thread leaves.
//! Group records (interactivity history) are kept separately and survive
//! their buckets.
//!
//! Each root bucket keeps an ordered index of its live clutch buckets so the
//! best one is always the first entry.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use core::hash::BuildHasherDefault;

use hashbrown::HashMap;
use siphasher::sip::SipHasher13;

use super::bucket::{ClutchBucket, ClutchBucketGroup, ClutchKey, GroupKey};
use super::interactivity::{clamp_score, InteractivityPolicy};
use crate::scheduler::core::error::{SchedulerError, SchedulerResult};
use crate::scheduler::core::policy::{RootBucketId, ROOT_BUCKET_COUNT};
use crate::scheduler::thread::{EnqueueSequence, Thread, ThreadGroupId, ThreadKey};

/// Hash map with a deterministic, allocation-free hasher
pub type SipHashMap<K, V> = HashMap<K, V, BuildHasherDefault<SipHasher13>>;

pub struct ClutchArena {
    slots: Vec<Option<ClutchBucket>>,
    free: Vec<usize>,
    live: SipHashMap<GroupKey, usize>,
    groups: SipHashMap<GroupKey, ClutchBucketGroup>,
    order: [BTreeSet<ClutchKey>; ROOT_BUCKET_COUNT],
}

impl ClutchArena {
    pub fn with_capacity(groups: usize) -> Self {
        Self {
            slots: Vec::with_capacity(groups),
            free: Vec::with_capacity(groups),
            live: SipHashMap::with_capacity_and_hasher(groups, Default::default()),
            groups: SipHashMap::with_capacity_and_hasher(groups, Default::default()),
            order: Default::default(),
        }
    }

    /// Queue an unbound thread into its clutch bucket
    ///
    /// Returns the thread's key and whether the root bucket went from empty
    /// to runnable.
    pub fn insert(&mut self, thread: Thread, sequence: EnqueueSequence, initial_score: u8) -> (ThreadKey, bool) {
        let gk = GroupKey::of(&thread);
        let tier = gk.bucket.index();
        let became_runnable = self.order[tier].is_empty();

        let slot = match self.live.get(&gk).copied() {
            Some(slot) => {
                let old = self.bucket_at(slot).order_key();
                let removed = self.order[tier].remove(&old);
                crate::sched_assert!(removed, "clutch bucket {:?} missing from its root bucket index", gk);
                slot
            }
            None => {
                let score = self
                    .groups
                    .entry(gk)
                    .or_insert_with(|| ClutchBucketGroup::new(initial_score))
                    .score;
                let slot = self.alloc_slot(ClutchBucket::new(gk, score));
                self.live.insert(gk, slot);
                log::debug!("clutch: bucket {} {} created in slot {} (score {})", gk.group, gk.bucket, slot, score);
                slot
            }
        };

        let bucket = self.bucket_at_mut(slot);
        let key = bucket.insert(thread, sequence);
        let order_key = bucket.order_key();
        self.order[tier].insert(order_key);
        (key, became_runnable)
    }

    /// Withdraw a queued thread
    ///
    /// Returns the thread and whether its root bucket is now empty.
    pub fn remove(&mut self, gk: GroupKey, key: &ThreadKey) -> Option<(Thread, bool)> {
        let slot = self.live.get(&gk).copied()?;
        let tier = gk.bucket.index();

        let old = self.bucket_at(slot).order_key();
        let thread = self.bucket_at_mut(slot).remove(key)?;
        let removed = self.order[tier].remove(&old);
        crate::sched_assert!(removed, "clutch bucket {:?} missing from its root bucket index", gk);

        let bucket = self.bucket_at(slot);
        if bucket.is_empty() {
            self.live.remove(&gk);
            self.slots[slot] = None;
            self.free.push(slot);
            log::debug!("clutch: bucket {} {} destroyed, slot {} recycled", gk.group, gk.bucket, slot);
        } else {
            let order_key = bucket.order_key();
            self.order[tier].insert(order_key);
        }
        Some((thread, self.order[tier].is_empty()))
    }

    /// Best clutch bucket of a root bucket
    pub fn best(&self, bucket: RootBucketId) -> Option<&ClutchBucket> {
        let key = self.order[bucket.index()].iter().next()?;
        self.bucket(GroupKey::new(key.group, bucket))
    }

    /// Best clutch bucket of a root bucket, ignoring one thread group's bucket
    pub fn best_excluding(&self, bucket: RootBucketId, group: ThreadGroupId) -> Option<&ClutchBucket> {
        let key = self.order[bucket.index()].iter().find(|key| key.group != group)?;
        self.bucket(GroupKey::new(key.group, bucket))
    }

    pub fn bucket(&self, gk: GroupKey) -> Option<&ClutchBucket> {
        let slot = self.live.get(&gk).copied()?;
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Highest thread priority queued in a root bucket
    pub fn highest_priority(&self, bucket: RootBucketId) -> Option<u8> {
        self.order[bucket.index()].iter().next().map(|key| key.priority)
    }

    pub fn is_empty(&self, bucket: RootBucketId) -> bool {
        self.order[bucket.index()].is_empty()
    }

    pub fn live_buckets(&self) -> usize {
        self.live.len()
    }

    /// Current score of a pairing, or the score it would start with
    pub fn score_for(&self, gk: GroupKey, initial_score: u8) -> u8 {
        self.groups.get(&gk).map_or(initial_score, |group| group.score)
    }

    pub fn group(&self, gk: GroupKey) -> Option<&ClutchBucketGroup> {
        self.groups.get(&gk)
    }

    /// Overwrite a pairing's score, re-ranking its live bucket
    pub fn set_score(&mut self, gk: GroupKey, score: u8, initial_score: u8) {
        self.groups
            .entry(gk)
            .or_insert_with(|| ClutchBucketGroup::new(initial_score))
            .score = score;
        self.rerank(gk, score);
    }

    /// Fold usage into a pairing and let the policy rescore it
    pub fn account<P: InteractivityPolicy>(
        &mut self,
        gk: GroupKey,
        used_us: u64,
        blocked_us: u64,
        policy: &P,
    ) -> u8 {
        let group = self
            .groups
            .entry(gk)
            .or_insert_with(|| ClutchBucketGroup::new(clamp_score(policy.initial_score())));
        group.usage.accumulate(used_us, blocked_us);
        let score = clamp_score(policy.rescore(&group.usage, group.score));
        group.score = score;
        self.rerank(gk, score);
        score
    }

    /// Drop every record of a thread group
    ///
    /// Returns the number of group records released.
    pub fn forget_group(&mut self, group: ThreadGroupId) -> SchedulerResult<usize> {
        let runnable: usize = RootBucketId::ALL
            .iter()
            .filter_map(|&bucket| self.bucket(GroupKey::new(group, bucket)))
            .map(ClutchBucket::len)
            .sum();
        if runnable > 0 {
            return Err(SchedulerError::GroupStillRunnable { group, runnable });
        }
        let released = RootBucketId::ALL
            .iter()
            .filter(|&&bucket| self.groups.remove(&GroupKey::new(group, bucket)).is_some())
            .count();
        Ok(released)
    }

    fn rerank(&mut self, gk: GroupKey, score: u8) {
        let Some(slot) = self.live.get(&gk).copied() else {
            return;
        };
        let tier = gk.bucket.index();
        let old = self.bucket_at(slot).order_key();
        let removed = self.order[tier].remove(&old);
        crate::sched_assert!(removed, "clutch bucket {:?} missing from its root bucket index", gk);
        let bucket = self.bucket_at_mut(slot);
        bucket.set_score(score);
        let order_key = bucket.order_key();
        self.order[tier].insert(order_key);
    }

    fn alloc_slot(&mut self, bucket: ClutchBucket) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(bucket);
                slot
            }
            None => {
                self.slots.push(Some(bucket));
                self.slots.len() - 1
            }
        }
    }

    fn bucket_at(&self, slot: usize) -> &ClutchBucket {
        match self.slots.get(slot).and_then(Option::as_ref) {
            Some(bucket) => bucket,
            None => panic!("[SCHED CRITICAL] Invariant violated: clutch slot {} is vacant", slot),
        }
    }

    fn bucket_at_mut(&mut self, slot: usize) -> &mut ClutchBucket {
        match self.slots.get_mut(slot).and_then(Option::as_mut) {
            Some(bucket) => bucket,
            None => panic!("[SCHED CRITICAL] Invariant violated: clutch slot {} is vacant", slot),
        }
    }
}
