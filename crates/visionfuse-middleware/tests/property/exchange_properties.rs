use std::collections::VecDeque;

use proptest::prelude::*;
use visionfuse_middleware::{ExchangeRegistry, OverflowPolicy};
use visionfuse_types::{Observation, Pose2d, ScoredObservation, SourceId, TargetInfo, Uncertainty};

const SOURCES: [&str; 2] = ["front", "rear"];

#[derive(Debug, Clone)]
enum Op {
    Push(usize),
    Drain(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..SOURCES.len()).prop_map(Op::Push),
        1 => (0..SOURCES.len()).prop_map(Op::Drain),
    ]
}

fn scored(source: &str, seq: u64) -> ScoredObservation {
    ScoredObservation {
        observation: Observation {
            source: SourceId::new(source),
            pose: Pose2d::new(seq as f64, 0.0, 0.0),
            timestamp: seq as f64,
            targets: vec![TargetInfo {
                fiducial_id: 9,
                ambiguity: 0.0,
                area: 1.0,
            }],
        },
        uncertainty: Uncertainty::new(0.1, 0.1),
    }
}

fn policy() -> impl Strategy<Value = OverflowPolicy> {
    prop_oneof![
        (1..12usize).prop_map(|capacity| OverflowPolicy::DropOldest { capacity }),
        Just(OverflowPolicy::Unbounded),
    ]
}

proptest! {
    /// Every drain returns exactly what a reference FIFO model predicts, and
    /// pushed = drained + dropped + still buffered for every source.
    #[test]
    fn interleaved_push_and_drain_match_model(
        policy in policy(),
        ops in prop::collection::vec(op(), 0..200),
    ) {
        let registry = ExchangeRegistry::new(SOURCES.map(SourceId::new), policy).unwrap();
        let mut model: Vec<VecDeque<u64>> = vec![VecDeque::new(); SOURCES.len()];
        let mut model_dropped = vec![0u64; SOURCES.len()];
        let mut seq = 0u64;

        for op in ops {
            match op {
                Op::Push(i) => {
                    registry.push_observation(&SourceId::new(SOURCES[i]), scored(SOURCES[i], seq)).unwrap();
                    if policy.capacity().is_some_and(|cap| model[i].len() >= cap) {
                        model[i].pop_front();
                        model_dropped[i] += 1;
                    }
                    model[i].push_back(seq);
                    seq += 1;
                }
                Op::Drain(i) => {
                    let drained: Vec<u64> = registry
                        .drain_all(&SourceId::new(SOURCES[i]))
                        .unwrap()
                        .iter()
                        .map(|s| s.observation.timestamp as u64)
                        .collect();
                    let expected: Vec<u64> = model[i].drain(..).collect();
                    prop_assert_eq!(drained, expected);
                }
            }
            if let Some(cap) = policy.capacity() {
                for stats in registry.stats().buffers {
                    prop_assert!(stats.depth <= cap);
                }
            }
        }

        for (i, stats) in registry.stats().buffers.iter().enumerate() {
            prop_assert_eq!(stats.dropped, model_dropped[i]);
            prop_assert_eq!(stats.pushed, stats.drained + stats.dropped + stats.depth as u64);
        }
    }
}
