//! [`VisionTask`] – the producer side of the exchange.
//!
//! Each cycle, for every configured source in order:
//!
//! 1. **Reference** – read the latest [`MotionState`] from the
//!    [`ExchangeRegistry`] and hand its pose to the source as a solver seed.
//! 2. **Poll** – collect every unread result, oldest first. A faulted source
//!    is logged and skipped for this cycle.
//! 3. **Score** – with no motion state yet published there is nothing to
//!    score against, so the results are discarded. Otherwise every result
//!    goes through the [`ConfidenceModel`] exactly once.
//! 4. **Publish** – accepted observations are pushed to the source's buffer
//!    in delivery order; rejected ones are dropped and counted.
//!
//! Nothing in a cycle blocks or retries, and no error escapes it.

use std::sync::Arc;

use tracing::{debug, error, instrument, warn};
use visionfuse_hal::VisionSource;
use visionfuse_middleware::{ExchangeRegistry, PushOutcome};
use visionfuse_perception::{ConfidenceModel, Rejection};
use visionfuse_types::{FusionError, MotionState, Observation, SourceId};

use crate::scheduler::PeriodicTask;

/// Cumulative counters of a [`VisionTask`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisionStats {
    pub cycles: u64,
    /// Results returned by all sources.
    pub polled: u64,
    /// Results scored and pushed to the exchange.
    pub accepted: u64,
    pub rejected_ambiguous: u64,
    pub rejected_spinning: u64,
    /// Results without targets, or with non-finite pose or target metadata,
    /// or scored against a non-finite motion state.
    pub rejected_malformed: u64,
    /// Results discarded because no motion state had been published yet.
    pub skipped_without_reference: u64,
    /// Polls that failed, plus results a driver labelled with another
    /// source's id.
    pub source_faults: u64,
    /// Pushes that displaced an older, undrained observation.
    pub displaced: u64,
}

impl VisionStats {
    pub fn rejected(&self) -> u64 {
        self.rejected_ambiguous + self.rejected_spinning + self.rejected_malformed
    }

    fn record_rejection(&mut self, rejection: &Rejection) {
        match rejection {
            Rejection::Ambiguous { .. } => self.rejected_ambiguous += 1,
            Rejection::Spinning { .. } => self.rejected_spinning += 1,
            Rejection::NoTargets
            | Rejection::NonFinitePose
            | Rejection::MalformedTarget { .. }
            | Rejection::NonFiniteMotion => self.rejected_malformed += 1,
        }
    }
}

/// Result of one [`VisionTask::run_cycle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisionCycle {
    pub polled: usize,
    pub accepted: usize,
}

/// Polls vision sources, scores their results, and feeds the exchange.
pub struct VisionTask {
    exchange: Arc<ExchangeRegistry>,
    sources: Vec<Box<dyn VisionSource>>,
    model: ConfidenceModel,
    stats: VisionStats,
}

impl VisionTask {
    /// Bind `sources` to `exchange`.
    ///
    /// # Errors
    ///
    /// * [`FusionError::UnknownSource`] if a source is not configured in the
    ///   exchange.
    /// * [`FusionError::DuplicateSource`] if two sources share an id.
    pub fn new(
        exchange: Arc<ExchangeRegistry>,
        sources: Vec<Box<dyn VisionSource>>,
        model: ConfidenceModel,
    ) -> Result<Self, FusionError> {
        let mut bound: Vec<&SourceId> = Vec::with_capacity(sources.len());
        for source in &sources {
            let id = source.id();
            if !exchange.contains(id) {
                return Err(FusionError::UnknownSource(id.clone()));
            }
            if bound.contains(&id) {
                return Err(FusionError::DuplicateSource(id.clone()));
            }
            bound.push(id);
        }
        for configured in exchange.sources() {
            if !bound.contains(&configured) {
                warn!(source = %configured, "configured source has no vision driver; its buffer will stay empty");
            }
        }

        Ok(Self {
            exchange,
            sources,
            model,
            stats: VisionStats::default(),
        })
    }

    pub fn stats(&self) -> VisionStats {
        self.stats
    }

    /// Run one poll/score/publish pass over every source.
    #[instrument(level = "trace", skip(self), fields(cycle = self.stats.cycles))]
    pub fn run_cycle(&mut self) -> VisionCycle {
        let mut cycle = VisionCycle::default();

        for source in &mut self.sources {
            let motion = self.exchange.current_motion_state();
            if let Some(motion) = &motion {
                source.set_reference_pose(motion.pose);
            }

            let results = match source.poll_unread_results() {
                Ok(results) => results,
                Err(e) => {
                    self.stats.source_faults += 1;
                    warn!(source = %source.id(), error = %e, "vision poll failed; skipping source this cycle");
                    continue;
                }
            };
            if results.is_empty() {
                continue;
            }
            cycle.polled += results.len();
            self.stats.polled += results.len() as u64;

            let Some(motion) = motion else {
                self.stats.skipped_without_reference += results.len() as u64;
                debug!(source = %source.id(), discarded = results.len(), "no motion state yet; vision fusion inactive");
                continue;
            };

            cycle.accepted += score_and_publish(
                &self.exchange,
                &self.model,
                &mut self.stats,
                source.id(),
                results,
                &motion,
            );
        }

        self.stats.cycles += 1;
        cycle
    }

    /// Switch every source to pipeline `index`.
    ///
    /// All sources are attempted even if one fails.
    ///
    /// # Errors
    ///
    /// Returns the first failure encountered.
    pub fn set_pipeline(&mut self, index: u32) -> Result<(), FusionError> {
        let mut first_error = None;
        for source in &mut self.sources {
            if let Err(e) = source.set_pipeline_index(index) {
                warn!(source = %source.id(), index, error = %e, "pipeline switch failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Switch only `source` to pipeline `index`.
    ///
    /// # Errors
    ///
    /// * [`FusionError::UnknownSource`] if no driver with that id is bound.
    /// * Whatever the driver reports if the switch fails.
    pub fn set_source_pipeline(&mut self, source: &SourceId, index: u32) -> Result<(), FusionError> {
        let driver = self
            .sources
            .iter_mut()
            .find(|s| s.id() == source)
            .ok_or_else(|| FusionError::UnknownSource(source.clone()))?;
        driver.set_pipeline_index(index).inspect_err(|e| {
            warn!(source = %source, index, error = %e, "pipeline switch failed");
        })
    }
}

/// Score `results` in order and push the accepted ones. Returns how many
/// were accepted.
fn score_and_publish(
    exchange: &ExchangeRegistry,
    model: &ConfidenceModel,
    stats: &mut VisionStats,
    source: &SourceId,
    results: Vec<Observation>,
    motion: &MotionState,
) -> usize {
    let mut accepted = 0;
    for observation in results {
        let scored = match model.evaluate(observation, motion) {
            Ok(scored) => scored,
            Err(rejection) => {
                stats.record_rejection(&rejection);
                debug!(source = %source, reason = rejection.label(), %rejection, "observation rejected");
                continue;
            }
        };
        match exchange.push_observation(source, scored) {
            Ok(outcome) => {
                if outcome == PushOutcome::DisplacedOldest {
                    stats.displaced += 1;
                }
                stats.accepted += 1;
                accepted += 1;
            }
            Err(e @ FusionError::SourceMismatch { .. }) => {
                stats.source_faults += 1;
                warn!(source = %source, error = %e, "driver returned a mislabelled observation");
            }
            // Sources are validated against the exchange at construction.
            Err(e) => error!(source = %source, error = %e, "exchange refused observation"),
        }
    }
    accepted
}

impl PeriodicTask for VisionTask {
    fn name(&self) -> &'static str {
        "vision"
    }

    fn tick(&mut self) {
        self.run_cycle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use visionfuse_hal::sim::{SimFeed, SimVisionSource};
    use visionfuse_middleware::OverflowPolicy;
    use visionfuse_types::{ChassisSpeeds, Pose2d, TargetInfo};

    fn still_at(x: f64) -> MotionState {
        MotionState {
            pose: Pose2d::new(x, 0.0, 0.0),
            speeds: ChassisSpeeds::default(),
            timestamp: 1.0,
        }
    }

    fn target(ambiguity: f64, area: f64) -> Vec<TargetInfo> {
        vec![TargetInfo {
            fiducial_id: 4,
            ambiguity,
            area,
        }]
    }

    fn setup(names: &[&str]) -> (Arc<ExchangeRegistry>, VisionTask, Vec<SimFeed>) {
        let exchange = ExchangeRegistry::new(
            names.iter().map(|n| SourceId::new(*n)),
            OverflowPolicy::default(),
        )
        .unwrap()
        .into_shared();
        let sources: Vec<SimVisionSource> = names
            .iter()
            .map(|n| SimVisionSource::scripted(SourceId::new(*n)))
            .collect();
        let feeds = sources.iter().map(SimVisionSource::feed).collect();
        let boxed = sources
            .into_iter()
            .map(|s| Box::new(s) as Box<dyn VisionSource>)
            .collect();
        let task = VisionTask::new(Arc::clone(&exchange), boxed, ConfidenceModel::default()).unwrap();
        (exchange, task, feeds)
    }

    #[test]
    fn skips_scoring_without_motion_state() {
        let (exchange, mut task, feeds) = setup(&["front"]);
        feeds[0].push(Pose2d::default(), 0.1, target(0.05, 3.0));

        let cycle = task.run_cycle();
        assert_eq!(cycle, VisionCycle { polled: 1, accepted: 0 });
        assert_eq!(task.stats().skipped_without_reference, 1);
        assert!(exchange.drain_all(&SourceId::new("front")).unwrap().is_empty());

        // The discarded result is never scored later.
        exchange.publish_motion_state(still_at(0.0));
        assert_eq!(task.run_cycle().polled, 0);
    }

    #[test]
    fn accepted_results_reach_the_exchange_in_order() {
        let (exchange, mut task, feeds) = setup(&["front"]);
        exchange.publish_motion_state(still_at(0.0));
        for i in 0..3 {
            feeds[0].push(Pose2d::new(f64::from(i) * 0.01, 0.0, 0.0), f64::from(i), target(0.05, 3.0));
        }

        assert_eq!(task.run_cycle().accepted, 3);
        let drained = exchange.drain_all(&SourceId::new("front")).unwrap();
        let stamps: Vec<f64> = drained.iter().map(|s| s.observation.timestamp).collect();
        assert_eq!(stamps, vec![0.0, 1.0, 2.0]);
        assert!(drained.iter().all(|s| s.uncertainty.as_array() == [0.05, 0.05, 0.05]));
    }

    #[test]
    fn rejections_are_counted_not_pushed() {
        let (exchange, mut task, feeds) = setup(&["front"]);
        exchange.publish_motion_state(still_at(0.0));
        feeds[0].push(Pose2d::default(), 0.0, target(0.95, 3.0));
        feeds[0].push(Pose2d::default(), 0.1, Vec::new());
        feeds[0].push(Pose2d::default(), 0.2, target(0.05, 1.0));

        task.run_cycle();
        let stats = task.stats();
        assert_eq!(stats.rejected_ambiguous, 1);
        assert_eq!(stats.rejected_malformed, 1);
        assert_eq!(stats.accepted, 1);
        assert_eq!(exchange.drain_all(&SourceId::new("front")).unwrap().len(), 1);
    }

    #[test]
    fn spinning_robot_accepts_nothing() {
        let (exchange, mut task, feeds) = setup(&["front"]);
        let mut spinning = still_at(0.0);
        spinning.speeds.omega = 4.0;
        exchange.publish_motion_state(spinning);
        feeds[0].push(Pose2d::default(), 0.0, target(0.0, 5.0));

        task.run_cycle();
        assert_eq!(task.stats().rejected_spinning, 1);
        assert!(exchange.drain_all(&SourceId::new("front")).unwrap().is_empty());
    }

    #[test]
    fn reference_pose_handed_to_sources_before_polling() {
        let (exchange, mut task, feeds) = setup(&["front", "rear"]);
        task.run_cycle();
        assert_eq!(feeds[0].reference_pose(), None);

        exchange.publish_motion_state(still_at(2.5));
        task.run_cycle();
        for feed in &feeds {
            assert_eq!(feed.reference_pose(), Some(Pose2d::new(2.5, 0.0, 0.0)));
        }
    }

    #[test]
    fn faulted_source_does_not_stop_the_others() {
        let (exchange, mut task, feeds) = setup(&["front", "rear"]);
        exchange.publish_motion_state(still_at(0.0));
        feeds[0].fail_next_poll("disconnected");
        feeds[1].push(Pose2d::default(), 0.0, target(0.05, 3.0));

        let cycle = task.run_cycle();
        assert_eq!(cycle.accepted, 1);
        assert_eq!(task.stats().source_faults, 1);
        assert_eq!(exchange.drain_all(&SourceId::new("rear")).unwrap().len(), 1);
    }

    #[test]
    fn unknown_source_fails_construction() {
        let exchange = ExchangeRegistry::new([SourceId::new("front")], OverflowPolicy::default())
            .unwrap()
            .into_shared();
        let sources: Vec<Box<dyn VisionSource>> =
            vec![Box::new(SimVisionSource::scripted(SourceId::new("side")))];
        let result = VisionTask::new(exchange, sources, ConfidenceModel::default());
        assert!(matches!(result, Err(FusionError::UnknownSource(_))));
    }

    #[test]
    fn duplicate_driver_fails_construction() {
        let exchange = ExchangeRegistry::new([SourceId::new("front")], OverflowPolicy::default())
            .unwrap()
            .into_shared();
        let sources: Vec<Box<dyn VisionSource>> = vec![
            Box::new(SimVisionSource::scripted(SourceId::new("front"))),
            Box::new(SimVisionSource::scripted(SourceId::new("front"))),
        ];
        let result = VisionTask::new(exchange, sources, ConfidenceModel::default());
        assert!(matches!(result, Err(FusionError::DuplicateSource(_))));
    }

    #[test]
    fn set_pipeline_reaches_every_source() {
        let (_exchange, mut task, feeds) = setup(&["front", "rear"]);
        task.set_pipeline(3).unwrap();
        assert!(feeds.iter().all(|f| f.pipeline_index() == 3));
    }

    #[test]
    fn set_source_pipeline_touches_only_that_source() {
        let (_exchange, mut task, feeds) = setup(&["front", "rear"]);
        task.set_source_pipeline(&SourceId::new("rear"), 2).unwrap();
        assert_eq!(feeds[0].pipeline_index(), 0);
        assert_eq!(feeds[1].pipeline_index(), 2);

        let result = task.set_source_pipeline(&SourceId::new("side"), 1);
        assert!(matches!(result, Err(FusionError::UnknownSource(_))));
    }

    #[test]
    fn non_finite_results_and_motion_are_malformed() {
        let (exchange, mut task, feeds) = setup(&["front"]);
        exchange.publish_motion_state(still_at(0.0));
        feeds[0].push(Pose2d::default(), 0.0, target(f64::NAN, 3.0));
        feeds[0].push(Pose2d::default(), 0.1, target(0.05, f64::NAN));
        task.run_cycle();
        assert_eq!(task.stats().rejected_malformed, 2);

        let mut broken = still_at(0.0);
        broken.speeds.omega = f64::NAN;
        exchange.publish_motion_state(broken);
        feeds[0].push(Pose2d::default(), 0.2, target(0.05, 3.0));
        task.run_cycle();

        let stats = task.stats();
        assert_eq!(stats.rejected_malformed, 3);
        assert_eq!(stats.accepted, 0);
        assert!(exchange.drain_all(&SourceId::new("front")).unwrap().is_empty());
    }

    #[test]
    fn mislabelled_result_is_not_pushed() {
        let (exchange, mut task, feeds) = setup(&["front", "rear"]);
        exchange.publish_motion_state(still_at(0.0));
        feeds[0].push_observation(Observation {
            source: SourceId::new("rear"),
            pose: Pose2d::default(),
            timestamp: 0.0,
            targets: target(0.05, 3.0),
        });

        assert_eq!(task.run_cycle().accepted, 0);
        assert_eq!(task.stats().source_faults, 1);
        assert!(exchange.drain_all(&SourceId::new("front")).unwrap().is_empty());
        assert!(exchange.drain_all(&SourceId::new("rear")).unwrap().is_empty());
    }

    #[test]
    fn overflowing_buffer_counts_displacements() {
        let (exchange, mut task, feeds) = setup(&["front"]);
        exchange.publish_motion_state(still_at(0.0));
        for i in 0..10 {
            feeds[0].push(Pose2d::default(), f64::from(i), target(0.05, 3.0));
        }
        task.run_cycle();
        assert_eq!(task.stats().displaced, 2);
        assert_eq!(exchange.drain_all(&SourceId::new("front")).unwrap().len(), 8);
    }
}
