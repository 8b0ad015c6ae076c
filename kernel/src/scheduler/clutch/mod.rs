//! Clutch thread selection
//!
//! - `root_bucket` / `edf`: tier arbitration (EDF, warp, starvation avoidance)
//! - `bucket` / `arena`: per thread group clutch buckets and their history
//! - `interactivity`: score policies
//! - `trace`: selection tracepoint and sinks
//! - `runqueue`: the run queue tying it all together

pub mod arena;
pub mod bucket;
pub mod edf;
pub mod interactivity;
pub mod root_bucket;
pub mod runqueue;
pub mod trace;

pub use bucket::{ClutchBucketGroup, GroupKey};
pub use edf::RootDecision;
pub use interactivity::{CpuRatioPolicy, FixedScore, GroupUsage, InteractivityPolicy, INTERACTIVE_PRI, SCORE_MAX};
pub use root_bucket::{RootBucket, RootBucketWindow};
pub use runqueue::ClutchRunQueue;
pub use trace::{
    NullSink, SelectFlags, ThreadSelectTrace, TraceRing, TraceSink, TraceWire, TraverseMode, WindowMask, TRACE_VERSION,
};
