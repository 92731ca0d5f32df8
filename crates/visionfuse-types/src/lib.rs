//! `visionfuse-types` – shared data model.
//!
//! Every crate in the workspace exchanges the types defined here: planar
//! poses, the drivetrain's published [`MotionState`], raw vision
//! [`Observation`]s, and the [`ScoredObservation`]s that flow through the
//! exchange registry.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ────────────────────────────────────────────────────────────────────────────
// Geometry
// ────────────────────────────────────────────────────────────────────────────

/// Planar robot pose in the field frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2d {
    /// X position (metres).
    pub x: f64,
    /// Y position (metres).
    pub y: f64,
    /// Heading, counter-clockwise from +X (radians).
    pub heading_rad: f64,
}

impl Pose2d {
    pub fn new(x: f64, y: f64, heading_rad: f64) -> Self {
        Self { x, y, heading_rad }
    }

    /// Euclidean distance to `other` in the x/y plane. Heading is ignored.
    pub fn distance_to(&self, other: &Pose2d) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.heading_rad.is_finite()
    }
}

/// Field-relative chassis velocity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChassisSpeeds {
    /// Velocity along field X (m/s).
    pub vx: f64,
    /// Velocity along field Y (m/s).
    pub vy: f64,
    /// Angular velocity (rad/s).
    pub omega: f64,
}

impl ChassisSpeeds {
    pub fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }

    /// Combined planar speed `|vx| + |vy|` used by the trust heuristics.
    pub fn planar_speed(&self) -> f64 {
        self.vx.abs() + self.vy.abs()
    }

    pub fn is_finite(&self) -> bool {
        self.vx.is_finite() && self.vy.is_finite() && self.omega.is_finite()
    }
}

/// Snapshot of the drivetrain's kinematic state.
///
/// Published by the drive task once per control cycle and read by the
/// vision task as scoring context. A published snapshot is never mutated;
/// the next publish replaces it whole.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionState {
    pub pose: Pose2d,
    pub speeds: ChassisSpeeds,
    /// Seconds on the process-wide monotonic clock.
    pub timestamp: f64,
}

/// Shared time base for motion-state and capture timestamps.
///
/// Both tasks and every simulated driver hold a copy of the same clock, so
/// their timestamps are directly comparable.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Start a clock whose zero is now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Seconds elapsed since the clock was started.
    pub fn now_seconds(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::start()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sources
// ────────────────────────────────────────────────────────────────────────────

/// Identifier of one vision source (a camera and its pipeline), e.g.
/// `"front_left"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Observations
// ────────────────────────────────────────────────────────────────────────────

/// Quality metadata for one fiducial target that contributed to a pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetInfo {
    /// Fiducial (AprilTag) id reported by the pipeline.
    pub fiducial_id: i32,
    /// Pose ambiguity in `[0, 1]`; higher is worse.
    pub ambiguity: f64,
    /// Area of the target in the image, as a percentage of the frame.
    pub area: f64,
}

impl TargetInfo {
    /// `false` if the pipeline reported a NaN or infinite area or ambiguity.
    pub fn is_finite(&self) -> bool {
        self.ambiguity.is_finite() && self.area.is_finite()
    }
}

/// A single vision-derived pose candidate, as delivered by the external
/// processing pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub source: SourceId,
    pub pose: Pose2d,
    /// Capture time in seconds on the process-wide monotonic clock.
    pub timestamp: f64,
    pub targets: Vec<TargetInfo>,
}

impl Observation {
    /// Largest target area among the contributing targets, `0.0` if none.
    pub fn max_target_area(&self) -> f64 {
        self.targets.iter().map(|t| t.area).fold(0.0, f64::max)
    }

    /// Worst (largest) ambiguity among the contributing targets, `0.0` if none.
    pub fn highest_ambiguity(&self) -> f64 {
        self.targets.iter().map(|t| t.ambiguity).fold(0.0, f64::max)
    }
}

/// Per-axis standard-deviation equivalents attached to an accepted
/// observation. Lower values mean more trust downstream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Uncertainty {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl Uncertainty {
    /// Build a vector that shares one value between x and y.
    pub fn new(xy: f64, heading: f64) -> Self {
        Self {
            x: xy,
            y: xy,
            heading,
        }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.heading]
    }
}

/// An [`Observation`] paired with the trust the confidence model assigned it.
/// This is the unit stored in the exchange buffers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredObservation {
    pub observation: Observation,
    pub uncertainty: Uncertainty,
}

impl ScoredObservation {
    pub fn source(&self) -> &SourceId {
        &self.observation.source
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Global error type for configuration faults and collaborator failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    #[error("Unknown vision source: {0}")]
    UnknownSource(SourceId),

    #[error("Vision source configured twice: {0}")]
    DuplicateSource(SourceId),

    #[error("At least one vision source must be configured")]
    EmptySourceSet,

    #[error("Fault on vision source {source_id}: {details}")]
    SourceFault { source_id: SourceId, details: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Observation from {actual} pushed into the buffer of {expected}")]
    SourceMismatch { expected: SourceId, actual: SourceId },
}
