//! Dead-reckoning pose estimator behind [`SimDrivetrain`](crate::sim::SimDrivetrain).
//!
//! Dead-reckons the robot pose from chassis speeds and blends in scored
//! vision corrections with a per-axis variance-weighted gain:
//!
//! ```text
//! k     = σ_odom² / (σ_odom² + σ_vision²)
//! pose' = pose + k * (measured − pose)
//! ```
//!
//! so a tightly trusted vision pose (small σ_vision) pulls the estimate hard
//! while a loosely trusted one only nudges it. Heading residuals are wrapped
//! to `(−π, π]` before blending.
//!
//! A real robot plugs in its own filter behind the
//! [`Drivetrain`](crate::Drivetrain) trait.
//!
//! # Example
//!
//! ```rust
//! use visionfuse_hal::estimator::PoseEstimator;
//! use visionfuse_types::{ChassisSpeeds, Pose2d, Uncertainty};
//!
//! let mut est = PoseEstimator::new(Pose2d::default(), Uncertainty::new(0.1, 0.1));
//! est.predict(ChassisSpeeds::new(1.0, 0.0, 0.0), 0.5);
//! assert!((est.pose().x - 0.5).abs() < 1e-9);
//!
//! // Equal odometry and vision trust → halfway to the measurement.
//! est.add_vision_measurement(Pose2d::new(1.5, 0.0, 0.0), 0.5, Uncertainty::new(0.1, 0.1));
//! assert!((est.pose().x - 1.0).abs() < 1e-9);
//! ```

use std::f64::consts::PI;

use visionfuse_types::{ChassisSpeeds, Pose2d, Uncertainty};

/// Wrap `angle` into `(−π, π]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI { wrapped + 2.0 * PI } else { wrapped }
}

/// Variance-weighted blend of odometry and vision poses.
#[derive(Debug, Clone)]
pub struct PoseEstimator {
    pose: Pose2d,
    /// Process noise of the dead-reckoning step, as standard deviations.
    odometry_std: Uncertainty,
    /// Capture time of the most recently applied vision measurement.
    last_correction_timestamp: Option<f64>,
    corrections_applied: u64,
}

impl PoseEstimator {
    /// Create an estimator starting at `initial`.
    ///
    /// Non-positive `odometry_std` components are treated as "odometry is
    /// perfect" and disable vision corrections on that axis.
    pub fn new(initial: Pose2d, odometry_std: Uncertainty) -> Self {
        Self {
            pose: initial,
            odometry_std,
            last_correction_timestamp: None,
            corrections_applied: 0,
        }
    }

    pub fn pose(&self) -> Pose2d {
        self.pose
    }

    /// Integrate field-relative `speeds` over `dt` seconds. Negative `dt` is
    /// treated as zero.
    pub fn predict(&mut self, speeds: ChassisSpeeds, dt: f64) {
        let dt = dt.max(0.0);
        self.pose.x += speeds.vx * dt;
        self.pose.y += speeds.vy * dt;
        self.pose.heading_rad = wrap_angle(self.pose.heading_rad + speeds.omega * dt);
    }

    /// Blend a vision pose into the estimate.
    pub fn add_vision_measurement(
        &mut self,
        measured: Pose2d,
        timestamp: f64,
        uncertainty: Uncertainty,
    ) {
        let kx = gain(self.odometry_std.x, uncertainty.x);
        let ky = gain(self.odometry_std.y, uncertainty.y);
        let kh = gain(self.odometry_std.heading, uncertainty.heading);

        self.pose.x += kx * (measured.x - self.pose.x);
        self.pose.y += ky * (measured.y - self.pose.y);
        let heading_residual = wrap_angle(measured.heading_rad - self.pose.heading_rad);
        self.pose.heading_rad = wrap_angle(self.pose.heading_rad + kh * heading_residual);

        self.last_correction_timestamp = Some(timestamp);
        self.corrections_applied += 1;
    }

    pub fn last_correction_timestamp(&self) -> Option<f64> {
        self.last_correction_timestamp
    }

    pub fn corrections_applied(&self) -> u64 {
        self.corrections_applied
    }
}

fn gain(odometry_std: f64, vision_std: f64) -> f64 {
    let q = odometry_std.max(0.0).powi(2);
    let r = vision_std.max(0.0).powi(2);
    if q + r == 0.0 { 0.0 } else { q / (q + r) }
}
