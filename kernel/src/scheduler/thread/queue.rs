//! Priority-ordered thread queue
//!
//! Shared by clutch buckets (unbound threads of one group) and bound root
//! buckets (pinned threads of one tier). Higher priority first; equal
//! priorities keep enqueue order.

use alloc::collections::BTreeMap;

use super::thread::{EnqueueSequence, Thread, ThreadKey};

#[derive(Debug, Default)]
pub struct ThreadQueue {
    threads: BTreeMap<ThreadKey, Thread>,
}

impl ThreadQueue {
    pub const fn new() -> Self {
        Self {
            threads: BTreeMap::new(),
        }
    }

    /// Insert a thread, stamping it with `sequence`
    pub fn insert(&mut self, mut thread: Thread, sequence: EnqueueSequence) -> ThreadKey {
        let key = ThreadKey::of(&thread, sequence);
        thread.stamp(sequence);
        let prev = self.threads.insert(key, thread);
        crate::sched_assert!(prev.is_none(), "duplicate enqueue sequence {:?}", sequence);
        key
    }

    pub fn remove(&mut self, key: &ThreadKey) -> Option<Thread> {
        self.threads.remove(key)
    }

    pub fn head(&self) -> Option<(&ThreadKey, &Thread)> {
        self.threads.iter().next()
    }

    pub fn head_key(&self) -> Option<ThreadKey> {
        self.threads.keys().next().copied()
    }

    pub fn pop_head(&mut self) -> Option<Thread> {
        self.threads.pop_first().map(|(_, thread)| thread)
    }

    pub fn highest_priority(&self) -> Option<u8> {
        self.head_key().map(|key| key.priority)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.threads.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::core::policy::RootBucketId;
    use crate::scheduler::thread::{ThreadGroupId, ThreadId};

    fn thread(id: u64, pri: u8) -> Thread {
        Thread::new(ThreadId(id), ThreadGroupId(1), RootBucketId::Default, pri)
    }

    #[test]
    fn test_priority_then_fifo() {
        let mut queue = ThreadQueue::new();
        queue.insert(thread(1, 20), EnqueueSequence(100));
        queue.insert(thread(2, 25), EnqueueSequence(101));
        queue.insert(thread(3, 25), EnqueueSequence(102));
        assert_eq!(queue.highest_priority(), Some(25));

        let order: alloc::vec::Vec<u64> = core::iter::from_fn(|| queue.pop_head()).map(|t| t.id().0).collect();
        assert_eq!(order, [2, 3, 1]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_insert_stamps_sequence() {
        let mut queue = ThreadQueue::new();
        let key = queue.insert(thread(7, 10), EnqueueSequence(55));
        let removed = queue.remove(&key).unwrap();
        assert_eq!(removed.enqueue_sequence(), Some(EnqueueSequence(55)));
    }
}
