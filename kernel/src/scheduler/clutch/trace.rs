//! Thread selection tracepoint
//!
//! Every selection (and every preemption check) produces one
//! [`ThreadSelectTrace`]. Analysis tools consume it as a single little-endian
//! `u64`, so the bit layout below is frozen:
//!
//! | bits  | field                                             |
//! |-------|---------------------------------------------------|
//! | 0-3   | version                                           |
//! | 4-6   | traverse mode                                     |
//! | 7-12  | cluster id                                        |
//! | 13    | natural EDF selection                             |
//! | 14    | cluster bound selection                           |
//! | 15    | starvation-avoidance window opened                |
//! | 16    | warp window opened                                |
//! | 17-28 | starvation-avoidance windows closed (tier×domain) |
//! | 29-40 | warp windows closed (tier×domain)                 |
//! | 41-43 | root bucket, 7 when the run queue was empty       |
//! | 44-63 | zero                                              |

use core::fmt;

use bitflags::bitflags;
use static_assertions::const_assert;
use zerocopy::byteorder::{LittleEndian, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::scheduler::core::policy::{AffinityDomain, RootBucketId, ROOT_BUCKET_COUNT};

// ═══════════════════════════════════════════════════════════════
// Layout
// ═══════════════════════════════════════════════════════════════

const VERSION_SHIFT: u32 = 0;
const VERSION_BITS: u32 = 4;
const MODE_SHIFT: u32 = 4;
const MODE_BITS: u32 = 3;
const CLUSTER_SHIFT: u32 = 7;
const CLUSTER_BITS: u32 = 6;
const FLAGS_SHIFT: u32 = 13;
const FLAGS_BITS: u32 = 4;
const STARVATION_CLOSED_SHIFT: u32 = 17;
const WARP_CLOSED_SHIFT: u32 = 29;
const MASK_BITS: u32 = 12;
const BUCKET_SHIFT: u32 = 41;
const BUCKET_BITS: u32 = 3;
const LAYOUT_END: u32 = BUCKET_SHIFT + BUCKET_BITS;

const_assert!(MODE_SHIFT == VERSION_SHIFT + VERSION_BITS);
const_assert!(CLUSTER_SHIFT == MODE_SHIFT + MODE_BITS);
const_assert!(FLAGS_SHIFT == CLUSTER_SHIFT + CLUSTER_BITS);
const_assert!(STARVATION_CLOSED_SHIFT == FLAGS_SHIFT + FLAGS_BITS);
const_assert!(WARP_CLOSED_SHIFT == STARVATION_CLOSED_SHIFT + MASK_BITS);
const_assert!(BUCKET_SHIFT == WARP_CLOSED_SHIFT + MASK_BITS);
const_assert!(LAYOUT_END <= u64::BITS);
// one mask bit per (tier, domain)
const_assert!(MASK_BITS as usize == 2 * ROOT_BUCKET_COUNT);
const_assert!(core::mem::size_of::<TraceWire>() == 8);

/// Root bucket field value of an empty selection
const BUCKET_EMPTY: u64 = 7;

const fn field(bits: u32) -> u64 {
    (1u64 << bits) - 1
}

/// Format version written into every record
pub const TRACE_VERSION: u8 = 1;

/// How the run queue was walked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TraverseMode {
    /// Pick and remove the best queued thread
    Remove = 0,
    /// The running thread competes with the queue
    RemoveConsiderCurrent = 1,
    /// Would a queued thread beat the running one? Nothing changes.
    CheckPreempt = 2,
}

impl TraverseMode {
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Remove),
            1 => Some(Self::RemoveConsiderCurrent),
            2 => Some(Self::CheckPreempt),
            _ => None,
        }
    }
}

bitflags! {
    /// Outcome flags of a selection
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SelectFlags: u8 {
        /// Root bucket picked by natural deadline order
        const EDF = 1 << 0;
        /// Picked from the processor-bound domain
        const CLUSTER_BOUND = 1 << 1;
        const STARVATION_OPENED = 1 << 2;
        const WARP_OPENED = 1 << 3;
    }
}

bitflags! {
    /// One bit per (tier, affinity domain) root bucket
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WindowMask: u16 {
        const FIXPRI = 1 << 0;
        const FG = 1 << 1;
        const IN = 1 << 2;
        const DF = 1 << 3;
        const UT = 1 << 4;
        const BG = 1 << 5;
        const BOUND_FIXPRI = 1 << 6;
        const BOUND_FG = 1 << 7;
        const BOUND_IN = 1 << 8;
        const BOUND_DF = 1 << 9;
        const BOUND_UT = 1 << 10;
        const BOUND_BG = 1 << 11;
    }
}

impl WindowMask {
    pub fn of(bucket: RootBucketId, domain: AffinityDomain) -> Self {
        Self::from_bits_truncate(1 << (domain.index() * ROOT_BUCKET_COUNT + bucket.index()))
    }
}

/// Decoded thread selection record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadSelectTrace {
    pub version: u8,
    pub mode: TraverseMode,
    pub cluster_id: u8,
    pub flags: SelectFlags,
    pub starvation_closed: WindowMask,
    pub warp_closed: WindowMask,
    /// `None` when the run queue had nothing to run
    pub root_bucket: Option<RootBucketId>,
}

impl ThreadSelectTrace {
    pub fn new(mode: TraverseMode, cluster_id: u8) -> Self {
        Self {
            version: TRACE_VERSION,
            mode,
            cluster_id,
            flags: SelectFlags::empty(),
            starvation_closed: WindowMask::empty(),
            warp_closed: WindowMask::empty(),
            root_bucket: None,
        }
    }

    pub fn is_edf(&self) -> bool {
        self.flags.contains(SelectFlags::EDF)
    }

    pub fn is_cluster_bound(&self) -> bool {
        self.flags.contains(SelectFlags::CLUSTER_BOUND)
    }

    pub fn opened_warp(&self) -> bool {
        self.flags.contains(SelectFlags::WARP_OPENED)
    }

    pub fn opened_starvation_avoidance(&self) -> bool {
        self.flags.contains(SelectFlags::STARVATION_OPENED)
    }

    pub fn pack(&self) -> u64 {
        let bucket = self.root_bucket.map_or(BUCKET_EMPTY, |b| b as u64);
        (u64::from(self.version) & field(VERSION_BITS)) << VERSION_SHIFT
            | (self.mode as u64 & field(MODE_BITS)) << MODE_SHIFT
            | (u64::from(self.cluster_id) & field(CLUSTER_BITS)) << CLUSTER_SHIFT
            | u64::from(self.flags.bits()) << FLAGS_SHIFT
            | u64::from(self.starvation_closed.bits()) << STARVATION_CLOSED_SHIFT
            | u64::from(self.warp_closed.bits()) << WARP_CLOSED_SHIFT
            | bucket << BUCKET_SHIFT
    }

    /// Decode a packed record; `None` for unknown versions or malformed fields
    pub fn unpack(raw: u64) -> Option<Self> {
        let get = |shift: u32, bits: u32| (raw >> shift) & field(bits);
        if raw >> LAYOUT_END != 0 {
            return None;
        }
        let version = get(VERSION_SHIFT, VERSION_BITS) as u8;
        if version != TRACE_VERSION {
            return None;
        }
        let root_bucket = match get(BUCKET_SHIFT, BUCKET_BITS) {
            BUCKET_EMPTY => None,
            raw_bucket => Some(RootBucketId::from_raw(raw_bucket as u8)?),
        };
        Some(Self {
            version,
            mode: TraverseMode::from_raw(get(MODE_SHIFT, MODE_BITS) as u8)?,
            cluster_id: get(CLUSTER_SHIFT, CLUSTER_BITS) as u8,
            flags: SelectFlags::from_bits_truncate(get(FLAGS_SHIFT, FLAGS_BITS) as u8),
            starvation_closed: WindowMask::from_bits_truncate(get(STARVATION_CLOSED_SHIFT, MASK_BITS) as u16),
            warp_closed: WindowMask::from_bits_truncate(get(WARP_CLOSED_SHIFT, MASK_BITS) as u16),
            root_bucket,
        })
    }

    pub fn to_wire(&self) -> TraceWire {
        TraceWire {
            packed: U64::new(self.pack()),
        }
    }
}

impl fmt::Display for ThreadSelectTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "select[{:?} c{}] ", self.mode, self.cluster_id)?;
        match self.root_bucket {
            Some(bucket) => write!(f, "{}", bucket)?,
            None => f.write_str("empty")?,
        }
        write!(
            f,
            " flags={:#x} starv_closed={:#05x} warp_closed={:#05x}",
            self.flags.bits(),
            self.starvation_closed.bits(),
            self.warp_closed.bits()
        )
    }
}

/// Wire form of a record: 8 bytes, little-endian, no alignment requirement
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct TraceWire {
    packed: U64<LittleEndian>,
}

impl TraceWire {
    pub fn raw(&self) -> u64 {
        self.packed.get()
    }

    pub fn decode(&self) -> Option<ThreadSelectTrace> {
        ThreadSelectTrace::unpack(self.raw())
    }
}

// ═══════════════════════════════════════════════════════════════
// Sinks
// ═══════════════════════════════════════════════════════════════

/// Consumer of selection records
///
/// Called with the run queue lock held: implementations must not block or
/// allocate.
pub trait TraceSink {
    fn emit(&self, trace: ThreadSelectTrace);
}

impl<T: TraceSink + ?Sized> TraceSink for &T {
    fn emit(&self, trace: ThreadSelectTrace) {
        (**self).emit(trace)
    }
}

impl<T: TraceSink + ?Sized> TraceSink for alloc::sync::Arc<T> {
    fn emit(&self, trace: ThreadSelectTrace) {
        (**self).emit(trace)
    }
}

/// Drops every record
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn emit(&self, _trace: ThreadSelectTrace) {}
}

struct RingState<const N: usize> {
    records: [Option<ThreadSelectTrace>; N],
    /// Index of the oldest record
    head: usize,
    len: usize,
    overwritten: u64,
}

/// Fixed-capacity record ring; the oldest record is overwritten when full
pub struct TraceRing<const N: usize> {
    state: spin::Mutex<RingState<N>>,
}

impl<const N: usize> TraceRing<N> {
    pub const fn new() -> Self {
        Self {
            state: spin::Mutex::new(RingState {
                records: [None; N],
                head: 0,
                len: 0,
                overwritten: 0,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records lost to wrap-around
    pub fn overwritten(&self) -> u64 {
        self.state.lock().overwritten
    }

    /// Most recent record
    pub fn last(&self) -> Option<ThreadSelectTrace> {
        let state = self.state.lock();
        if state.len == 0 {
            return None;
        }
        state.records[(state.head + state.len - 1) % N]
    }

    /// Take every buffered record, oldest first
    pub fn drain(&self) -> alloc::vec::Vec<ThreadSelectTrace> {
        let mut state = self.state.lock();
        let mut out = alloc::vec::Vec::with_capacity(state.len);
        while state.len > 0 {
            let head = state.head;
            if let Some(trace) = state.records[head].take() {
                out.push(trace);
            }
            state.head = (head + 1) % N;
            state.len -= 1;
        }
        state.head = 0;
        out
    }
}

impl<const N: usize> Default for TraceRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TraceSink for TraceRing<N> {
    fn emit(&self, trace: ThreadSelectTrace) {
        if N == 0 {
            return;
        }
        let mut state = self.state.lock();
        let tail = (state.head + state.len) % N;
        state.records[tail] = Some(trace);
        if state.len == N {
            state.head = (state.head + 1) % N;
            state.overwritten += 1;
        } else {
            state.len += 1;
        }
    }
}
