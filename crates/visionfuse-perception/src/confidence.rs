//! Confidence Model.
//!
//! Maps the geometric quality of a vision [`Observation`] and the robot's
//! current [`MotionState`] to an [`Uncertainty`] vector the drivetrain's
//! state estimator consumes as measurement noise.
//!
//! The model is a tiered heuristic on the largest target area in the image
//! (a proxy for distance to the tags):
//!
//! | Largest target area | Robot still (`|vx|+|vy| < 0.2`) | Moving, pose within 0.5 m | Otherwise |
//! |---|---|---|---|
//! | `> 2.0 %` | xy 0.05, heading 0.05 (0.5 if `|ω| ≥ 0.1`) | 0.15 / 0.15 | 0.5 / 0.5 |
//! | `0.5 – 2.0 %` | 0.1 / 0.1 | 0.25 / 0.25 | 0.5 / 0.5 |
//! | `≤ 0.5 %` | 0.75 / 0.75 when ambiguity > 0.1, else 0.5 / 0.5 | | |
//!
//! A still robot that is turning slowly keeps the default heading trust in
//! the large tier even though the medium tier would give 0.1.
//!
//! Observations whose target metadata or reference motion is not finite are
//! rejected before tiering.
//!
//! After tiering, rotation can only make things worse: above
//! `rotation_penalty_threshold` the heading trust drops to 0.75, and above
//! `max_angular_velocity` the observation is rejected outright.
//!
//! # Example
//!
//! ```rust
//! use visionfuse_perception::confidence::ConfidenceModel;
//! use visionfuse_types::{ChassisSpeeds, MotionState, Observation, Pose2d, SourceId, TargetInfo};
//!
//! let model = ConfidenceModel::default();
//! let motion = MotionState {
//!     pose: Pose2d::new(1.0, 1.0, 0.0),
//!     speeds: ChassisSpeeds::default(),
//!     timestamp: 0.0,
//! };
//! let obs = Observation {
//!     source: SourceId::new("front"),
//!     pose: Pose2d::new(1.02, 0.98, 0.01),
//!     timestamp: 0.0,
//!     targets: vec![TargetInfo { fiducial_id: 4, ambiguity: 0.05, area: 3.0 }],
//! };
//!
//! let trust = model.score(&obs, &motion).unwrap();
//! assert_eq!(trust.as_array(), [0.05, 0.05, 0.05]);
//! ```

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;
use visionfuse_types::{MotionState, Observation, ScoredObservation, Uncertainty};

// ────────────────────────────────────────────────────────────────────────────
// Tier constants
// ────────────────────────────────────────────────────────────────────────────

const DEFAULT_STD: f64 = 0.5;

const LARGE_TARGET_AREA: f64 = 2.0;
const MEDIUM_TARGET_AREA: f64 = 0.5;

/// Below this combined planar speed (m/s) the robot counts as still.
const STILL_PLANAR_SPEED: f64 = 0.2;
/// Below this |ω| (rad/s) the robot counts as not rotating.
const STILL_ANGULAR_SPEED: f64 = 0.1;
/// Observations closer than this to the reference pose (m) get the
/// "consistent" trust band while moving.
const CONSISTENT_POSE_DISTANCE: f64 = 0.5;
/// Far targets above this ambiguity get the low-confidence band.
const FAR_TARGET_AMBIGUITY: f64 = 0.1;

const LARGE_STILL_STD: f64 = 0.05;
const LARGE_CONSISTENT_STD: f64 = 0.15;
const MEDIUM_STILL_STD: f64 = 0.1;
const MEDIUM_CONSISTENT_STD: f64 = 0.25;
const LOW_CONFIDENCE_STD: f64 = 0.75;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Tunable thresholds of the [`ConfidenceModel`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Observations whose worst target ambiguity exceeds this are rejected.
    pub max_allowed_ambiguity: f64,
    /// Above this |ω| (rad/s) no observation is trusted at all.
    pub max_angular_velocity: f64,
    /// Above this |ω| (rad/s) heading trust is forced to the low band.
    pub rotation_penalty_threshold: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            max_allowed_ambiguity: 0.9,
            max_angular_velocity: PI,
            rotation_penalty_threshold: 0.5,
        }
    }
}

impl ConfidenceConfig {
    /// Check that every threshold lies in its domain.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.max_allowed_ambiguity) {
            return Err(format!(
                "max_allowed_ambiguity must lie in [0, 1], got {}",
                self.max_allowed_ambiguity
            ));
        }
        if !(self.rotation_penalty_threshold > 0.0) {
            return Err(format!(
                "rotation_penalty_threshold must be positive, got {}",
                self.rotation_penalty_threshold
            ));
        }
        if !(self.max_angular_velocity >= self.rotation_penalty_threshold) {
            return Err(format!(
                "max_angular_velocity ({}) must not be below rotation_penalty_threshold ({})",
                self.max_angular_velocity, self.rotation_penalty_threshold
            ));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rejections
// ────────────────────────────────────────────────────────────────────────────

/// Why the model declined to score an observation.
///
/// A rejection is an expected outcome: the observation is discarded and the
/// drivetrain simply gets no correction from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    /// The worst target ambiguity exceeded `max_allowed_ambiguity`.
    Ambiguous { ambiguity: f64 },
    /// The robot was rotating faster than `max_angular_velocity`.
    Spinning { omega: f64 },
    /// The pipeline reported a pose without any contributing target.
    NoTargets,
    /// The pose contained NaN or infinite components.
    NonFinitePose,
    /// A target reported a NaN or infinite area or ambiguity.
    MalformedTarget { fiducial_id: i32 },
    /// The reference motion state contained NaN or infinite components.
    NonFiniteMotion,
}

impl Rejection {
    /// Short stable label, used as a structured-log field.
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::Ambiguous { .. } => "ambiguous",
            Rejection::Spinning { .. } => "spinning",
            Rejection::NoTargets => "no_targets",
            Rejection::NonFinitePose => "non_finite_pose",
            Rejection::MalformedTarget { .. } => "malformed_target",
            Rejection::NonFiniteMotion => "non_finite_motion",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Ambiguous { ambiguity } => write!(f, "target ambiguity {ambiguity:.3} too high"),
            Rejection::Spinning { omega } => write!(f, "rotating too fast ({omega:.2} rad/s)"),
            Rejection::NoTargets => f.write_str("no contributing targets"),
            Rejection::NonFinitePose => f.write_str("pose is not finite"),
            Rejection::MalformedTarget { fiducial_id } => {
                write!(f, "target {fiducial_id} has non-finite area or ambiguity")
            }
            Rejection::NonFiniteMotion => f.write_str("reference motion is not finite"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ConfidenceModel
// ────────────────────────────────────────────────────────────────────────────

/// Deterministic trust scorer for vision observations.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceModel {
    config: ConfidenceConfig,
}

impl ConfidenceModel {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConfidenceConfig {
        &self.config
    }

    /// Return the uncertainty for `observation`, or `None` when it must not
    /// be fused.
    pub fn score(&self, observation: &Observation, motion: &MotionState) -> Option<Uncertainty> {
        self.uncertainty_for(observation, motion).ok()
    }

    /// Score `observation` and pair it, unchanged, with its uncertainty.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] reason when the observation must be
    /// discarded.
    pub fn evaluate(
        &self,
        observation: Observation,
        motion: &MotionState,
    ) -> Result<ScoredObservation, Rejection> {
        let uncertainty = self.uncertainty_for(&observation, motion)?;
        Ok(ScoredObservation {
            observation,
            uncertainty,
        })
    }

    fn uncertainty_for(
        &self,
        observation: &Observation,
        motion: &MotionState,
    ) -> Result<Uncertainty, Rejection> {
        if observation.targets.is_empty() {
            return Err(Rejection::NoTargets);
        }
        if !observation.pose.is_finite() {
            return Err(Rejection::NonFinitePose);
        }
        if let Some(target) = observation.targets.iter().find(|t| !t.is_finite()) {
            return Err(Rejection::MalformedTarget {
                fiducial_id: target.fiducial_id,
            });
        }
        if !(motion.pose.is_finite() && motion.speeds.is_finite()) {
            return Err(Rejection::NonFiniteMotion);
        }

        let max_target_area = observation.max_target_area();
        let highest_ambiguity = observation.highest_ambiguity();

        if highest_ambiguity > self.config.max_allowed_ambiguity {
            return Err(Rejection::Ambiguous {
                ambiguity: highest_ambiguity,
            });
        }

        let mut xy_std = DEFAULT_STD;
        let mut heading_std = DEFAULT_STD;

        let pose_distance = observation.pose.distance_to(&motion.pose);
        let still = motion.speeds.planar_speed() < STILL_PLANAR_SPEED;
        let omega = motion.speeds.omega.abs();

        if max_target_area > LARGE_TARGET_AREA {
            if still {
                xy_std = LARGE_STILL_STD;
                if omega < STILL_ANGULAR_SPEED {
                    heading_std = LARGE_STILL_STD;
                }
            } else if pose_distance < CONSISTENT_POSE_DISTANCE {
                xy_std = LARGE_CONSISTENT_STD;
                heading_std = LARGE_CONSISTENT_STD;
            }
        } else if max_target_area > MEDIUM_TARGET_AREA {
            if still {
                xy_std = MEDIUM_STILL_STD;
                heading_std = MEDIUM_STILL_STD;
            } else if pose_distance < CONSISTENT_POSE_DISTANCE {
                xy_std = MEDIUM_CONSISTENT_STD;
                heading_std = MEDIUM_CONSISTENT_STD;
            }
        } else if highest_ambiguity > FAR_TARGET_AMBIGUITY {
            xy_std = LOW_CONFIDENCE_STD;
            heading_std = LOW_CONFIDENCE_STD;
        }

        if omega > self.config.max_angular_velocity {
            return Err(Rejection::Spinning {
                omega: motion.speeds.omega,
            });
        } else if omega > self.config.rotation_penalty_threshold {
            heading_std = LOW_CONFIDENCE_STD;
        }

        trace!(
            source = %observation.source,
            max_target_area,
            highest_ambiguity,
            pose_distance,
            xy_std,
            heading_std,
            "scored observation"
        );

        Ok(Uncertainty::new(xy_std, heading_std))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
