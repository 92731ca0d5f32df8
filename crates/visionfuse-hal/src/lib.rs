//! `visionfuse-hal` – collaborator interfaces at the edge of the fusion core.
//!
//! # Modules
//!
//! - [`vision_source`] – [`VisionSource`]: a camera pipeline polled for
//!   finished pose candidates.
//! - [`drivetrain`] – [`Drivetrain`]: the drivetrain's state estimator, which
//!   reports pose and velocity and accepts vision corrections.
//! - [`estimator`] – [`PoseEstimator`][estimator::PoseEstimator]:
//!   dead-reckoning estimator that blends scored vision corrections with a
//!   variance-weighted gain.
//! - [`sim`] – simulated drivers ([`SimDrivetrain`][sim::SimDrivetrain],
//!   [`SimVisionSource`][sim::SimVisionSource]) so the full pipeline runs
//!   without hardware.

pub mod drivetrain;
pub mod estimator;
pub mod sim;
pub mod vision_source;

pub use drivetrain::Drivetrain;
pub use vision_source::VisionSource;
