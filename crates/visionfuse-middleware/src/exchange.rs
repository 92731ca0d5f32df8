//! [`ExchangeRegistry`] – the only state shared between the vision task and
//! the drive task.
//!
//! The registry holds:
//!
//! * one [`SourceBuffer`] per configured vision source, in configured order;
//! * the most recently published [`MotionState`], stored as an atomically
//!   swapped immutable snapshot (`arc-swap`), so publishing and reading never
//!   take a lock.
//!
//! The source set is closed: it is fixed when the registry is built and any
//! later reference to an unconfigured source is a [`FusionError::UnknownSource`].
//! Build one registry at startup and hand an `Arc` of it to both tasks.
//!
//! # Example
//!
//! ```rust
//! use visionfuse_middleware::{ExchangeRegistry, OverflowPolicy};
//! use visionfuse_types::SourceId;
//!
//! let registry = ExchangeRegistry::new(
//!     [SourceId::new("front"), SourceId::new("rear")],
//!     OverflowPolicy::default(),
//! )
//! .unwrap();
//!
//! assert!(registry.current_motion_state().is_none());
//! assert!(registry.drain_all(&SourceId::new("front")).unwrap().is_empty());
//! assert!(registry.drain_all(&SourceId::new("side")).is_err());
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use tracing::{info, warn};
use visionfuse_types::{FusionError, MotionState, ScoredObservation, SourceId};

use crate::buffer::{BufferStats, OverflowPolicy, PushOutcome, SourceBuffer};

/// Snapshot of every counter the registry keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeStats {
    /// Number of motion-state publishes since startup.
    pub motion_publishes: u64,
    /// Per-source buffer counters, in configured order.
    pub buffers: Vec<BufferStats>,
}

impl ExchangeStats {
    pub fn total_dropped(&self) -> u64 {
        self.buffers.iter().map(|b| b.dropped).sum()
    }
}

/// Per-source buffers plus the latest motion snapshot.
#[derive(Debug)]
pub struct ExchangeRegistry {
    buffers: Vec<SourceBuffer>,
    motion: ArcSwapOption<MotionState>,
    motion_publishes: AtomicU64,
}

impl ExchangeRegistry {
    /// Build a registry for exactly `sources`, all sharing `policy`.
    ///
    /// # Errors
    ///
    /// * [`FusionError::EmptySourceSet`] when `sources` is empty.
    /// * [`FusionError::DuplicateSource`] when a source appears twice.
    /// * [`FusionError::InvalidConfig`] for a drop-oldest capacity of zero.
    pub fn new<I>(sources: I, policy: OverflowPolicy) -> Result<Self, FusionError>
    where
        I: IntoIterator<Item = SourceId>,
    {
        if policy.capacity() == Some(0) {
            return Err(FusionError::InvalidConfig(
                "buffer capacity must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut buffers = Vec::new();
        for source in sources {
            if !seen.insert(source.clone()) {
                return Err(FusionError::DuplicateSource(source));
            }
            buffers.push(SourceBuffer::new(source, policy));
        }
        if buffers.is_empty() {
            return Err(FusionError::EmptySourceSet);
        }

        info!(
            sources = ?buffers.iter().map(|b| b.source().as_str()).collect::<Vec<_>>(),
            ?policy,
            "exchange registry ready"
        );

        Ok(Self {
            buffers,
            motion: ArcSwapOption::empty(),
            motion_publishes: AtomicU64::new(0),
        })
    }

    /// Convenience for sharing the registry between tasks.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Configured sources, in the fixed order drains should follow.
    pub fn sources(&self) -> impl Iterator<Item = &SourceId> {
        self.buffers.iter().map(SourceBuffer::source)
    }

    pub fn contains(&self, source: &SourceId) -> bool {
        self.buffer(source).is_ok()
    }

    // ------------------------------------------------------------------
    // Motion state
    // ------------------------------------------------------------------

    /// Replace the current motion state. Never blocks.
    pub fn publish_motion_state(&self, state: MotionState) {
        let previous = self.motion.swap(Some(Arc::new(state)));
        self.motion_publishes.fetch_add(1, Ordering::Relaxed);
        if let Some(previous) = previous
            && previous.timestamp > state.timestamp
        {
            warn!(
                previous = previous.timestamp,
                current = state.timestamp,
                "motion state timestamp went backwards"
            );
        }
    }

    /// The most recently published motion state, or `None` before the drive
    /// task's first publish.
    pub fn current_motion_state(&self) -> Option<MotionState> {
        self.motion.load().as_deref().copied()
    }

    // ------------------------------------------------------------------
    // Observation buffers
    // ------------------------------------------------------------------

    /// Queue `scored` on `source`'s buffer.
    ///
    /// # Errors
    ///
    /// * [`FusionError::UnknownSource`] if `source` was not configured.
    /// * [`FusionError::SourceMismatch`] if the observation was produced by a
    ///   different source than `source`.
    pub fn push_observation(
        &self,
        source: &SourceId,
        scored: ScoredObservation,
    ) -> Result<PushOutcome, FusionError> {
        let buffer = self.buffer(source)?;
        if scored.source() != source {
            return Err(FusionError::SourceMismatch {
                expected: source.clone(),
                actual: scored.source().clone(),
            });
        }
        Ok(buffer.push(scored))
    }

    /// Atomically empty `source`'s buffer and return its contents, oldest
    /// first. An empty buffer yields an empty vector.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::UnknownSource`] if `source` was not configured.
    pub fn drain_all(&self, source: &SourceId) -> Result<Vec<ScoredObservation>, FusionError> {
        Ok(self.buffer(source)?.drain())
    }

    pub fn stats(&self) -> ExchangeStats {
        ExchangeStats {
            motion_publishes: self.motion_publishes.load(Ordering::Relaxed),
            buffers: self.buffers.iter().map(SourceBuffer::stats).collect(),
        }
    }

    // Linear scan: source sets are a handful of cameras.
    fn buffer(&self, source: &SourceId) -> Result<&SourceBuffer, FusionError> {
        self.buffers
            .iter()
            .find(|b| b.source() == source)
            .ok_or_else(|| FusionError::UnknownSource(source.clone()))
    }
}
