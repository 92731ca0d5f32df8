//! `visionfuse-perception` – trust scoring for vision observations.
//!
//! # Modules
//!
//! - [`confidence`] – [`ConfidenceModel`][confidence::ConfidenceModel]: turns
//!   a vision [`Observation`][visionfuse_types::Observation] plus the current
//!   [`MotionState`][visionfuse_types::MotionState] into an
//!   [`Uncertainty`][visionfuse_types::Uncertainty] vector, or rejects it.

pub mod confidence;

pub use confidence::{ConfidenceConfig, ConfidenceModel, Rejection};
