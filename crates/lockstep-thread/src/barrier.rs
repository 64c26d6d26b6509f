//! Sense-reversing barrier parked on futex-style atomic waits.
//!
//! Waiters publish a phase tag before arriving so the last arriver can
//! detect processors that entered different collective operations, the
//! classic symptom of an asymmetric program. A poisoned barrier releases
//! every waiter, current and future, with [`BarrierWait::Poisoned`].

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Outcome of one barrier wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BarrierWait {
    /// This waiter was the last to arrive and released the others.
    Leader,
    /// Released by the leader of this round.
    Member,
    /// The barrier was poisoned; the collective run cannot continue.
    Poisoned,
}

pub(crate) struct SenseBarrier {
    participants: u32,
    arrived: AtomicU32,
    generation: AtomicU32,
    poisoned: AtomicBool,
    tags: Vec<AtomicU32>,
}

impl SenseBarrier {
    pub(crate) fn new(participants: usize) -> Self {
        Self {
            participants: participants as u32,
            arrived: AtomicU32::new(0),
            generation: AtomicU32::new(0),
            poisoned: AtomicBool::new(false),
            tags: (0..participants).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Blocks until all participants have arrived with this generation.
    ///
    /// `tag` names the collective operation the caller is entering; when
    /// the round completes with differing tags the barrier poisons itself.
    pub(crate) fn wait(&self, rank: usize, tag: u32) -> BarrierWait {
        if self.poisoned.load(Ordering::Acquire) {
            return BarrierWait::Poisoned;
        }
        // Ordered before the arrival below; the last arriver's
        // read-modify-write makes it visible to the tag scan.
        self.tags[rank].store(tag, Ordering::Relaxed);

        let generation = self.generation.load(Ordering::Acquire);
        let arrived = self.arrived.fetch_add(1, Ordering::AcqRel) + 1;
        if arrived == self.participants {
            // All tags of this round are published; members cannot start
            // the next round until the generation advances.
            let mismatch = self
                .tags
                .iter()
                .any(|slot| slot.load(Ordering::Relaxed) != tag);
            self.arrived.store(0, Ordering::Release);
            if mismatch {
                tracing::error!(
                    "asymmetric collective: processors entered different barrier operations"
                );
                self.poison();
                return BarrierWait::Poisoned;
            }
            self.generation.fetch_add(1, Ordering::Release);
            atomic_wait::wake_all(&self.generation as *const AtomicU32);
            if self.poisoned.load(Ordering::Acquire) {
                BarrierWait::Poisoned
            } else {
                BarrierWait::Leader
            }
        } else {
            while self.generation.load(Ordering::Acquire) == generation {
                atomic_wait::wait(&self.generation, generation);
            }
            if self.poisoned.load(Ordering::Acquire) {
                BarrierWait::Poisoned
            } else {
                BarrierWait::Member
            }
        }
    }

    /// Marks the collective run as failed and releases every waiter.
    pub(crate) fn poison(&self) {
        self.poisoned.store(true, Ordering::Release);
        self.generation.fetch_add(1, Ordering::Release);
        atomic_wait::wake_all(&self.generation as *const AtomicU32);
    }
}
