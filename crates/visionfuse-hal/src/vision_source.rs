//! Generic [`VisionSource`] trait for camera pose pipelines.
//!
//! A vision source is one camera plus the external processing pipeline that
//! turns its frames into ranked pose candidates. The runtime never sees
//! images; it only polls for finished [`Observation`]s.

use visionfuse_types::{FusionError, Observation, Pose2d, SourceId};

/// A camera pipeline that produces pose candidates.
///
/// Implementations must not block: `poll_unread_results` returns whatever is
/// ready right now, possibly nothing.
pub trait VisionSource: Send {
    /// Identifier this source was configured under, e.g. `"front_left"`.
    fn id(&self) -> &SourceId;

    /// Return every result produced since the previous poll, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::SourceFault`] when the pipeline cannot be read
    /// (e.g. the coprocessor is disconnected).
    fn poll_unread_results(&mut self) -> Result<Vec<Observation>, FusionError>;

    /// Hand the pipeline the drivetrain's current pose as a seed for its pose
    /// solver. Pipelines that do not use a reference pose ignore it.
    fn set_reference_pose(&mut self, _pose: Pose2d) {}

    /// Switch the processing pipeline (e.g. AprilTag vs. driver camera).
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::SourceFault`] when the pipeline does not support
    /// switching or rejects the index.
    fn set_pipeline_index(&mut self, index: u32) -> Result<(), FusionError> {
        Err(FusionError::SourceFault {
            source_id: self.id().clone(),
            details: format!("pipeline switching not supported (requested {index})"),
        })
    }
}
