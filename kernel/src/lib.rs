// src/lib.rs
// Point d'entrée de la bibliothèque clutch-sched
//
// Run queue "Clutch" : sélection hiérarchique des threads d'un cluster
// (root bucket -> clutch bucket -> thread). no_std + alloc ; la feature `std`
// n'ajoute qu'une horloge hôte.
#![cfg_attr(not(any(test, feature = "std")), no_std)]

// Import de alloc pour les allocations dynamiques
extern crate alloc;

pub mod scheduler;
pub mod time;

pub use scheduler::clutch::{ClutchRunQueue, NullSink, ThreadSelectTrace, TraceRing, TraceSink, TraverseMode};
pub use scheduler::core::{HandoffResult, Rejected, RunQueueConfig, SchedulerError, SchedulerResult};
pub use scheduler::thread::{Thread, ThreadGroupId, ThreadId};
pub use time::{ClockSource, ManualClock, Timestamp};
