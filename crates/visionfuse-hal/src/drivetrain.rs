//! Generic [`Drivetrain`] trait: the state-estimator side of the exchange.
//!
//! The drive task reads the drivetrain's pose and velocity to build each
//! published [`MotionState`][visionfuse_types::MotionState], and feeds every
//! accepted vision observation back through
//! [`Drivetrain::apply_vision_correction`].

use visionfuse_types::{ChassisSpeeds, Pose2d, Uncertainty};

/// A drivetrain with its own pose estimator.
pub trait Drivetrain: Send {
    /// Advance the drivetrain's own estimate by one control period of `dt`
    /// seconds. Drivetrains that update on their own thread leave this empty.
    fn update(&mut self, _dt: f64) {}

    /// Best current pose estimate.
    fn current_pose(&self) -> Pose2d;

    /// Current field-relative chassis velocity.
    fn current_velocity(&self) -> ChassisSpeeds;

    /// Fuse one vision pose captured at `timestamp` with the given per-axis
    /// standard deviations.
    fn apply_vision_correction(&mut self, pose: Pose2d, timestamp: f64, uncertainty: Uncertainty);
}
