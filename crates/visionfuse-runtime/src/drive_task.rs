//! [`DriveTask`] – the consumer side of the exchange.
//!
//! Each control cycle the task advances the drivetrain by one period, drains
//! every source's buffer in configured order, applies each drained
//! observation as a vision correction, and finally publishes a fresh
//! [`MotionState`] for the vision task to score against.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, instrument, trace};
use visionfuse_hal::Drivetrain;
use visionfuse_middleware::ExchangeRegistry;
use visionfuse_types::{MonotonicClock, MotionState, SourceId};

use crate::scheduler::PeriodicTask;

/// Cumulative counters of a [`DriveTask`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveStats {
    pub cycles: u64,
    /// Vision corrections handed to the drivetrain.
    pub corrections_applied: u64,
    /// Motion states published to the exchange.
    pub motion_published: u64,
}

/// Applies buffered vision corrections and publishes motion state.
pub struct DriveTask<D> {
    exchange: Arc<ExchangeRegistry>,
    drivetrain: D,
    clock: MonotonicClock,
    period: Duration,
    // Cached once; the exchange's source set never changes.
    sources: Vec<SourceId>,
    stats: DriveStats,
}

impl<D: Drivetrain> DriveTask<D> {
    /// `period` is the control period; the drivetrain is advanced by exactly
    /// that much every cycle. `clock` stamps published motion states and
    /// must be the clock vision timestamps are expressed in.
    pub fn new(
        exchange: Arc<ExchangeRegistry>,
        drivetrain: D,
        clock: MonotonicClock,
        period: Duration,
    ) -> Self {
        let sources = exchange.sources().cloned().collect();
        Self {
            exchange,
            drivetrain,
            clock,
            period,
            sources,
            stats: DriveStats::default(),
        }
    }

    pub fn drivetrain(&self) -> &D {
        &self.drivetrain
    }

    pub fn drivetrain_mut(&mut self) -> &mut D {
        &mut self.drivetrain
    }

    /// Consume the task, handing the drivetrain back.
    pub fn into_drivetrain(self) -> D {
        self.drivetrain
    }

    pub fn stats(&self) -> DriveStats {
        self.stats
    }

    /// Run one control cycle and return the published motion state.
    #[instrument(level = "trace", skip(self), fields(cycle = self.stats.cycles))]
    pub fn run_cycle(&mut self) -> MotionState {
        self.drivetrain.update(self.period.as_secs_f64());

        for source in &self.sources {
            let batch = match self.exchange.drain_all(source) {
                Ok(batch) => batch,
                Err(e) => {
                    error!(source = %source, error = %e, "drain failed");
                    continue;
                }
            };
            if batch.is_empty() {
                continue;
            }
            trace!(source = %source, count = batch.len(), "applying vision corrections");
            for scored in batch {
                self.drivetrain.apply_vision_correction(
                    scored.observation.pose,
                    scored.observation.timestamp,
                    scored.uncertainty,
                );
                self.stats.corrections_applied += 1;
            }
        }

        let state = MotionState {
            pose: self.drivetrain.current_pose(),
            speeds: self.drivetrain.current_velocity(),
            timestamp: self.clock.now_seconds(),
        };
        self.exchange.publish_motion_state(state);
        self.stats.motion_published += 1;
        self.stats.cycles += 1;
        state
    }
}

impl<D: Drivetrain + 'static> PeriodicTask for DriveTask<D> {
    fn name(&self) -> &'static str {
        "drive"
    }

    fn tick(&mut self) {
        self.run_cycle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use visionfuse_hal::sim::SimDrivetrain;
    use visionfuse_middleware::OverflowPolicy;
    use visionfuse_types::{
        ChassisSpeeds, Observation, Pose2d, ScoredObservation, TargetInfo, Uncertainty,
    };

    fn exchange() -> Arc<ExchangeRegistry> {
        ExchangeRegistry::new(["front", "rear"].map(SourceId::new), OverflowPolicy::default())
            .unwrap()
            .into_shared()
    }

    fn scored(source: &str, x: f64, timestamp: f64) -> ScoredObservation {
        ScoredObservation {
            observation: Observation {
                source: SourceId::new(source),
                pose: Pose2d::new(x, 0.0, 0.0),
                timestamp,
                targets: vec![TargetInfo {
                    fiducial_id: 2,
                    ambiguity: 0.05,
                    area: 3.0,
                }],
            },
            uncertainty: Uncertainty::new(0.1, 0.1),
        }
    }

    fn task(exchange: &Arc<ExchangeRegistry>) -> DriveTask<SimDrivetrain> {
        DriveTask::new(
            Arc::clone(exchange),
            SimDrivetrain::new(Pose2d::default()),
            MonotonicClock::start(),
            Duration::from_millis(20),
        )
    }

    #[test]
    fn every_cycle_publishes_motion_state() {
        let exchange = exchange();
        let mut drive = task(&exchange);
        drive.drivetrain_mut().set_speeds(ChassisSpeeds::new(1.0, 0.0, 0.0));

        let published = drive.run_cycle();
        assert_eq!(exchange.current_motion_state(), Some(published));
        assert!((published.pose.x - 0.02).abs() < 1e-9);
        assert_eq!(published.speeds, ChassisSpeeds::new(1.0, 0.0, 0.0));

        let next = drive.run_cycle();
        assert!(next.timestamp >= published.timestamp);
        assert_eq!(drive.stats().motion_published, 2);
    }

    #[test]
    fn drains_sources_in_configured_order() {
        let exchange = exchange();
        let mut drive = task(&exchange);
        exchange.push_observation(&SourceId::new("rear"), scored("rear", 0.3, 3.0)).unwrap();
        exchange.push_observation(&SourceId::new("front"), scored("front", 0.1, 1.0)).unwrap();
        exchange.push_observation(&SourceId::new("front"), scored("front", 0.2, 2.0)).unwrap();

        drive.run_cycle();
        let order: Vec<f64> = drive.drivetrain().corrections().map(|c| c.timestamp).collect();
        assert_eq!(order, vec![1.0, 2.0, 3.0]);
        assert_eq!(drive.stats().corrections_applied, 3);
        assert_eq!(exchange.stats().buffers.iter().map(|b| b.depth).sum::<usize>(), 0);
    }

    #[test]
    fn correction_passes_pose_timestamp_and_uncertainty_through() {
        let exchange = exchange();
        let mut drive = task(&exchange);
        exchange.push_observation(&SourceId::new("front"), scored("front", 0.4, 7.5)).unwrap();

        drive.run_cycle();
        let applied = drive.drivetrain().corrections().next().copied().unwrap();
        assert_eq!(applied.pose, Pose2d::new(0.4, 0.0, 0.0));
        assert_eq!(applied.timestamp, 7.5);
        assert_eq!(applied.uncertainty, Uncertainty::new(0.1, 0.1));
    }

    #[test]
    fn empty_buffers_leave_estimate_to_odometry() {
        let exchange = exchange();
        let mut drive = task(&exchange);
        for _ in 0..5 {
            drive.run_cycle();
        }
        assert_eq!(drive.drivetrain().corrections_applied(), 0);
        assert_eq!(drive.into_drivetrain().current_pose(), Pose2d::default());
    }
}
