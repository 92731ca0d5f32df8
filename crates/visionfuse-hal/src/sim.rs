//! In-process simulated drivers for headless tests and the CLI demo.
//!
//! * [`SimDrivetrain`] dead-reckons from commanded speeds with a configurable
//!   odometry scale error, so its estimate drifts away from the
//!   [`GroundTruth`] unless vision corrections pull it back.
//! * [`SimVisionSource`] delivers observations pushed through its
//!   [`SimFeed`] handle and, in tracking mode, one observation of the ground
//!   truth per poll.
//!
//! # Example
//!
//! ```rust
//! use visionfuse_hal::sim::{SimDrivetrain, SimVisionSource};
//! use visionfuse_hal::{Drivetrain, VisionSource};
//! use visionfuse_types::{ChassisSpeeds, MonotonicClock, Pose2d, SourceId, TargetInfo};
//!
//! let mut drive = SimDrivetrain::new(Pose2d::default()).with_odometry_scale(1.05);
//! drive.set_speeds(ChassisSpeeds::new(1.0, 0.0, 0.0));
//! drive.update(1.0);
//! assert!((drive.truth().get().x - 1.0).abs() < 1e-9);
//! assert!((drive.current_pose().x - 1.05).abs() < 1e-9);
//!
//! let target = TargetInfo { fiducial_id: 7, ambiguity: 0.05, area: 1.5 };
//! let mut camera = SimVisionSource::tracking(
//!     SourceId::new("front"),
//!     drive.truth(),
//!     vec![target],
//!     MonotonicClock::start(),
//! );
//! let seen = camera.poll_unread_results().unwrap();
//! assert_eq!(seen.len(), 1);
//! assert!((seen[0].pose.x - 1.0).abs() < 1e-9);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use tracing::trace;
use visionfuse_types::{
    ChassisSpeeds, FusionError, MonotonicClock, Observation, Pose2d, SourceId, TargetInfo,
    Uncertainty,
};

use crate::drivetrain::Drivetrain;
use crate::estimator::{PoseEstimator, wrap_angle};
use crate::vision_source::VisionSource;

/// Number of applied corrections a [`SimDrivetrain`] remembers.
const CORRECTION_HISTORY_LIMIT: usize = 1024;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ────────────────────────────────────────────────────────────────────────────
// Ground truth
// ────────────────────────────────────────────────────────────────────────────

/// Shared handle to the simulated robot's true pose. Clone it freely.
#[derive(Debug, Clone, Default)]
pub struct GroundTruth(Arc<ArcSwap<Pose2d>>);

impl GroundTruth {
    pub fn new(pose: Pose2d) -> Self {
        Self(Arc::new(ArcSwap::from_pointee(pose)))
    }

    pub fn get(&self) -> Pose2d {
        **self.0.load()
    }

    pub fn set(&self, pose: Pose2d) {
        self.0.store(Arc::new(pose));
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated drivetrain
// ────────────────────────────────────────────────────────────────────────────

/// One vision correction as received by [`SimDrivetrain`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedCorrection {
    pub pose: Pose2d,
    pub timestamp: f64,
    pub uncertainty: Uncertainty,
}

/// Drivetrain whose odometry over- or under-reports distance travelled.
pub struct SimDrivetrain {
    estimator: PoseEstimator,
    speeds: ChassisSpeeds,
    truth: GroundTruth,
    odometry_scale: f64,
    history: VecDeque<AppliedCorrection>,
}

impl SimDrivetrain {
    /// Start at `initial` with perfect odometry and 0.1 m / 0.1 rad
    /// odometry noise.
    pub fn new(initial: Pose2d) -> Self {
        Self {
            estimator: PoseEstimator::new(initial, Uncertainty::new(0.1, 0.1)),
            speeds: ChassisSpeeds::default(),
            truth: GroundTruth::new(initial),
            odometry_scale: 1.0,
            history: VecDeque::new(),
        }
    }

    /// Multiply every odometry step by `scale` (e.g. `1.02` for 2 % wheel slip).
    pub fn with_odometry_scale(mut self, scale: f64) -> Self {
        self.odometry_scale = scale;
        self
    }

    /// Command new field-relative chassis speeds.
    pub fn set_speeds(&mut self, speeds: ChassisSpeeds) {
        self.speeds = speeds;
    }

    pub fn truth(&self) -> GroundTruth {
        self.truth.clone()
    }

    /// Recently applied corrections, oldest first.
    pub fn corrections(&self) -> impl Iterator<Item = &AppliedCorrection> {
        self.history.iter()
    }

    pub fn corrections_applied(&self) -> u64 {
        self.estimator.corrections_applied()
    }

    /// Planar distance between the estimate and the ground truth.
    pub fn position_error(&self) -> f64 {
        self.estimator.pose().distance_to(&self.truth.get())
    }
}

impl Drivetrain for SimDrivetrain {
    fn update(&mut self, dt: f64) {
        let dt = dt.max(0.0);
        let truth = self.truth.get();
        self.truth.set(Pose2d::new(
            truth.x + self.speeds.vx * dt,
            truth.y + self.speeds.vy * dt,
            wrap_angle(truth.heading_rad + self.speeds.omega * dt),
        ));

        let measured = ChassisSpeeds::new(
            self.speeds.vx * self.odometry_scale,
            self.speeds.vy * self.odometry_scale,
            self.speeds.omega * self.odometry_scale,
        );
        self.estimator.predict(measured, dt);
    }

    fn current_pose(&self) -> Pose2d {
        self.estimator.pose()
    }

    fn current_velocity(&self) -> ChassisSpeeds {
        self.speeds
    }

    fn apply_vision_correction(&mut self, pose: Pose2d, timestamp: f64, uncertainty: Uncertainty) {
        self.estimator.add_vision_measurement(pose, timestamp, uncertainty);
        if self.history.len() == CORRECTION_HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(AppliedCorrection {
            pose,
            timestamp,
            uncertainty,
        });
        trace!(x = pose.x, y = pose.y, timestamp, "sim drivetrain applied correction");
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated vision source
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct FeedState {
    pending: Mutex<VecDeque<Observation>>,
    fault: Mutex<Option<String>>,
    reference_pose: Mutex<Option<Pose2d>>,
    pipeline_index: AtomicU32,
    polls: AtomicU32,
}

/// Test-side handle of a [`SimVisionSource`]: inject observations and
/// faults, and inspect what the runtime told the source.
#[derive(Debug, Clone)]
pub struct SimFeed {
    source: SourceId,
    state: Arc<FeedState>,
}

impl SimFeed {
    /// Queue an observation for the next poll.
    pub fn push(&self, pose: Pose2d, timestamp: f64, targets: Vec<TargetInfo>) {
        self.push_observation(Observation {
            source: self.source.clone(),
            pose,
            timestamp,
            targets,
        });
    }

    /// Queue a fully formed observation for the next poll.
    pub fn push_observation(&self, observation: Observation) {
        lock(&self.state.pending).push_back(observation);
    }

    /// Make the next poll fail with `details`. Queued observations survive
    /// and are delivered by the poll after that.
    pub fn fail_next_poll(&self, details: impl Into<String>) {
        *lock(&self.state.fault) = Some(details.into());
    }

    /// Last reference pose the runtime handed to the source.
    pub fn reference_pose(&self) -> Option<Pose2d> {
        *lock(&self.state.reference_pose)
    }

    pub fn pipeline_index(&self) -> u32 {
        self.state.pipeline_index.load(Ordering::Relaxed)
    }

    /// Number of polls so far, including failed ones.
    pub fn polls(&self) -> u32 {
        self.state.polls.load(Ordering::Relaxed)
    }

    pub fn pending(&self) -> usize {
        lock(&self.state.pending).len()
    }
}

#[derive(Debug)]
struct Tracking {
    truth: GroundTruth,
    targets: Vec<TargetInfo>,
    clock: MonotonicClock,
}

/// Simulated camera pipeline.
#[derive(Debug)]
pub struct SimVisionSource {
    id: SourceId,
    feed: SimFeed,
    tracking: Option<Tracking>,
}

impl SimVisionSource {
    /// A source that only delivers what is pushed through its [`SimFeed`].
    pub fn scripted(id: SourceId) -> Self {
        Self {
            feed: SimFeed {
                source: id.clone(),
                state: Arc::default(),
            },
            id,
            tracking: None,
        }
    }

    /// A source that additionally reports the ground-truth pose, seen through
    /// `targets`, on every poll.
    pub fn tracking(
        id: SourceId,
        truth: GroundTruth,
        targets: Vec<TargetInfo>,
        clock: MonotonicClock,
    ) -> Self {
        Self {
            tracking: Some(Tracking {
                truth,
                targets,
                clock,
            }),
            ..Self::scripted(id)
        }
    }

    /// Handle for injecting observations and inspecting runtime calls.
    pub fn feed(&self) -> SimFeed {
        self.feed.clone()
    }
}

impl VisionSource for SimVisionSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn poll_unread_results(&mut self) -> Result<Vec<Observation>, FusionError> {
        let state = &self.feed.state;
        state.polls.fetch_add(1, Ordering::Relaxed);

        if let Some(details) = lock(&state.fault).take() {
            return Err(FusionError::SourceFault {
                source_id: self.id.clone(),
                details,
            });
        }

        let mut results: Vec<Observation> = lock(&state.pending).drain(..).collect();
        if let Some(tracking) = &self.tracking {
            results.push(Observation {
                source: self.id.clone(),
                pose: tracking.truth.get(),
                timestamp: tracking.clock.now_seconds(),
                targets: tracking.targets.clone(),
            });
        }
        Ok(results)
    }

    fn set_reference_pose(&mut self, pose: Pose2d) {
        *lock(&self.feed.state.reference_pose) = Some(pose);
    }

    fn set_pipeline_index(&mut self, index: u32) -> Result<(), FusionError> {
        self.feed.state.pipeline_index.store(index, Ordering::Relaxed);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
