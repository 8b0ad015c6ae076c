//! Monotonic clock abstraction
//!
//! The run queue never samples hardware time itself: every instance owns a
//! [`ClockSource`] handed over at construction. Kernels plug their monotonic
//! counter in here; tests drive a [`ManualClock`] explicitly so that every
//! window opening and expiry lands on an exact, repeatable instant.

use core::fmt;
use core::ops::{Add, Sub};
use core::sync::atomic::{AtomicU64, Ordering};

/// Monotonic timestamp (nanoseconds since an arbitrary origin)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Origin of the clock
    pub const ZERO: Self = Self(0);

    /// Get timestamp from nanoseconds
    pub const fn from_ns(ns: u64) -> Self {
        Self(ns)
    }

    /// Get timestamp from microseconds
    pub const fn from_us(us: u64) -> Self {
        Self(us.saturating_mul(1_000))
    }

    /// Get timestamp as nanoseconds
    pub const fn as_ns(&self) -> u64 {
        self.0
    }

    /// Get timestamp as microseconds
    pub const fn as_us(&self) -> u64 {
        self.0 / 1_000
    }

    /// Time elapsed between `earlier` and `self`, zero if `earlier` is later
    pub fn saturating_since(&self, earlier: Timestamp) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0.saturating_add(rhs.0))
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0.saturating_sub(rhs.0))
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = Duration;

    fn sub(self, rhs: Timestamp) -> Self::Output {
        Duration(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}us", self.0 / 1_000, self.0 % 1_000)
    }
}

/// Time duration (nanoseconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(pub u64);

impl Duration {
    /// Zero duration
    pub const ZERO: Self = Self(0);

    /// Create duration from nanoseconds
    pub const fn from_ns(ns: u64) -> Self {
        Self(ns)
    }

    /// Create duration from microseconds
    pub const fn from_us(us: u64) -> Self {
        Self(us.saturating_mul(1_000))
    }

    /// Create duration from milliseconds
    pub const fn from_ms(ms: u64) -> Self {
        Self(ms.saturating_mul(1_000_000))
    }

    /// Get duration as nanoseconds
    pub const fn as_ns(&self) -> u64 {
        self.0
    }

    /// Get duration as microseconds
    pub const fn as_us(&self) -> u64 {
        self.0 / 1_000
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Self::Output {
        Duration(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Self::Output {
        Duration(self.0.saturating_sub(rhs.0))
    }
}

/// Source of monotonic time for a run queue
///
/// Implementations must never go backwards; the run queue asserts on it.
pub trait ClockSource {
    fn now(&self) -> Timestamp;
}

impl<C: ClockSource + ?Sized> ClockSource for &C {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

impl<C: ClockSource + ?Sized> ClockSource for alloc::sync::Arc<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// Clock that only moves when told to
///
/// Shared by reference between a test and the run queue under test.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ns: AtomicU64,
}

impl ManualClock {
    pub const fn new() -> Self {
        Self {
            now_ns: AtomicU64::new(0),
        }
    }

    pub const fn starting_at(start: Timestamp) -> Self {
        Self {
            now_ns: AtomicU64::new(start.0),
        }
    }

    /// Move time forward by `delta`
    pub fn advance(&self, delta: Duration) -> Timestamp {
        let prev = self.now_ns.fetch_add(delta.0, Ordering::Relaxed);
        Timestamp(prev.saturating_add(delta.0))
    }

    pub fn advance_us(&self, us: u64) -> Timestamp {
        self.advance(Duration::from_us(us))
    }

    /// Jump to an absolute instant. Going backwards is allowed here so tests
    /// can exercise the run queue's clock assertions.
    pub fn set(&self, at: Timestamp) {
        self.now_ns.store(at.0, Ordering::Relaxed);
    }

    pub fn set_us(&self, us: u64) {
        self.set(Timestamp::from_us(us));
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now_ns.load(Ordering::Relaxed))
    }
}

/// Host monotonic clock backed by `std::time::Instant`
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl ClockSource for StdClock {
    fn now(&self) -> Timestamp {
        let elapsed = self.origin.elapsed();
        Timestamp(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
    }
}
