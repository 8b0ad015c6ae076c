//! Thread module

pub mod queue;
pub mod thread;

pub use queue::ThreadQueue;
pub use thread::{
    alloc_thread_id, EnqueuePosition, EnqueueSequence, SequenceAllocator, Thread, ThreadGroupId, ThreadId, ThreadKey,
};
