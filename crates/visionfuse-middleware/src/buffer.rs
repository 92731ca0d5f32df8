//! [`SourceBuffer`] – per-source queue of scored observations.
//!
//! One buffer exists per configured vision source. The vision task pushes
//! into it and the drive task empties it with a single [`SourceBuffer::drain`]
//! call per control cycle. Both operations hold the internal lock only for
//! the queue manipulation itself, never across scoring or I/O.
//!
//! # Overflow policies
//!
//! | Policy | Behaviour when a push arrives |
//! |---|---|
//! | [`OverflowPolicy::DropOldest`] | At capacity, the oldest entry is discarded (and counted) to make room. |
//! | [`OverflowPolicy::Unbounded`] | Always stored; the queue grows until the next drain. |
//!
//! A deployment picks exactly one policy for every buffer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;
use visionfuse_types::{ScoredObservation, SourceId};

/// Default capacity of a drop-oldest buffer.
pub const DEFAULT_CAPACITY: usize = 8;

/// What a buffer does when a push would exceed its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Keep at most `capacity` entries, discarding the oldest on overflow.
    DropOldest { capacity: usize },
    /// Keep everything until the next drain.
    Unbounded,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::DropOldest {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl OverflowPolicy {
    /// The fixed capacity, or `None` for [`OverflowPolicy::Unbounded`].
    pub fn capacity(&self) -> Option<usize> {
        match self {
            OverflowPolicy::DropOldest { capacity } => Some(*capacity),
            OverflowPolicy::Unbounded => None,
        }
    }
}

/// Result of a single push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The observation was appended without displacing anything.
    Stored,
    /// The buffer was full; the oldest observation was dropped to make room.
    DisplacedOldest,
}

/// Point-in-time counters of one [`SourceBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferStats {
    pub source: SourceId,
    /// Observations accepted by `push` since startup.
    pub pushed: u64,
    /// Observations discarded by the overflow policy since startup.
    pub dropped: u64,
    /// Observations handed out by `drain` since startup.
    pub drained: u64,
    /// Entries currently buffered.
    pub depth: usize,
    /// Largest depth ever observed.
    pub high_water: usize,
}

/// Bounded (or explicitly unbounded) FIFO of [`ScoredObservation`]s for one
/// vision source.
#[derive(Debug)]
pub struct SourceBuffer {
    source: SourceId,
    policy: OverflowPolicy,
    queue: Mutex<VecDeque<ScoredObservation>>,
    pushed: AtomicU64,
    dropped: AtomicU64,
    drained: AtomicU64,
    high_water: AtomicUsize,
}

impl SourceBuffer {
    /// Create an empty buffer. A drop-oldest capacity of zero is raised to one.
    pub fn new(source: SourceId, policy: OverflowPolicy) -> Self {
        let policy = match policy {
            OverflowPolicy::DropOldest { capacity } => OverflowPolicy::DropOldest {
                capacity: capacity.max(1),
            },
            OverflowPolicy::Unbounded => OverflowPolicy::Unbounded,
        };
        let queue = match policy {
            OverflowPolicy::DropOldest { capacity } => VecDeque::with_capacity(capacity),
            OverflowPolicy::Unbounded => VecDeque::new(),
        };
        Self {
            source,
            policy,
            queue: Mutex::new(queue),
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            drained: AtomicU64::new(0),
            high_water: AtomicUsize::new(0),
        }
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Append `scored`, applying the overflow policy.
    pub fn push(&self, scored: ScoredObservation) -> PushOutcome {
        let (outcome, depth) = {
            let mut queue = self.lock();
            let outcome = match self.policy {
                OverflowPolicy::DropOldest { capacity } if queue.len() >= capacity => {
                    queue.pop_front();
                    PushOutcome::DisplacedOldest
                }
                _ => PushOutcome::Stored,
            };
            queue.push_back(scored);
            (outcome, queue.len())
        };

        self.pushed.fetch_add(1, Ordering::Relaxed);
        self.high_water.fetch_max(depth, Ordering::Relaxed);
        if outcome == PushOutcome::DisplacedOldest {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(source = %self.source, dropped, "buffer full; displaced oldest observation");
        }
        outcome
    }

    /// Remove and return everything buffered, oldest first.
    pub fn drain(&self) -> Vec<ScoredObservation> {
        let items: Vec<ScoredObservation> = self.lock().drain(..).collect();
        self.drained.fetch_add(items.len() as u64, Ordering::Relaxed);
        items
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            source: self.source.clone(),
            pushed: self.pushed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            depth: self.len(),
            high_water: self.high_water.load(Ordering::Relaxed),
        }
    }

    // A panic while holding the lock cannot leave the queue half-written
    // (push and drain are single VecDeque calls), so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, VecDeque<ScoredObservation>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
