//! Time management
//!
//! Monotonic timestamps and the injectable clock consumed by the scheduler.

pub mod clock;

// Re-exports
pub use clock::{ClockSource, Duration, ManualClock, Timestamp};

#[cfg(feature = "std")]
pub use clock::StdClock;
