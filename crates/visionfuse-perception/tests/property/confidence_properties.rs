use proptest::prelude::*;
use visionfuse_perception::ConfidenceModel;
use visionfuse_types::{ChassisSpeeds, MotionState, Observation, Pose2d, SourceId, TargetInfo};

fn motion(vx: f64, vy: f64, omega: f64) -> MotionState {
    MotionState {
        pose: Pose2d::new(4.0, 2.0, 0.3),
        speeds: ChassisSpeeds::new(vx, vy, omega),
        timestamp: 1.0,
    }
}

fn observation(area: f64, ambiguity: f64, distance: f64) -> Observation {
    Observation {
        source: SourceId::new("front"),
        pose: Pose2d::new(4.0 + distance, 2.0, 0.3),
        timestamp: 1.0,
        targets: vec![TargetInfo {
            fiducial_id: 3,
            ambiguity,
            area,
        }],
    }
}

/// Linear speeds biased toward the "still" band so every tier is exercised.
fn linear_speed() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.0), -0.1..0.1f64, -2.0..2.0f64]
}

fn angular_speed() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.0), -0.6..0.6f64, -3.0..3.0f64]
}

// ── Hard rejections ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn non_finite_target_metadata_is_always_rejected(
        bad in prop_oneof![Just(f64::NAN), Just(f64::INFINITY), Just(f64::NEG_INFINITY)],
        in_area in any::<bool>(),
        vx in linear_speed(),
        omega in angular_speed(),
    ) {
        let model = ConfidenceModel::default();
        let obs = if in_area { observation(bad, 0.05, 0.0) } else { observation(3.0, bad, 0.0) };
        prop_assert!(model.score(&obs, &motion(vx, 0.0, omega)).is_none());
    }

    #[test]
    fn too_ambiguous_is_always_rejected(
        ambiguity in 0.9001..1.0f64,
        area in 0.0..10.0f64,
        distance in 0.0..3.0f64,
        vx in linear_speed(),
        vy in linear_speed(),
        omega in angular_speed(),
    ) {
        let model = ConfidenceModel::default();
        prop_assert!(model.score(&observation(area, ambiguity, distance), &motion(vx, vy, omega)).is_none());
    }

    #[test]
    fn spinning_is_always_rejected(
        omega_mag in 3.1416..20.0f64,
        negative in any::<bool>(),
        area in 0.0..10.0f64,
        ambiguity in 0.0..0.9f64,
        vx in linear_speed(),
    ) {
        let omega = if negative { -omega_mag } else { omega_mag };
        let model = ConfidenceModel::default();
        prop_assert!(model.score(&observation(area, ambiguity, 0.0), &motion(vx, 0.0, omega)).is_none());
    }
}

// ── Monotonicity ──────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn trust_never_improves_with_pose_distance(
        area in 0.0..10.0f64,
        ambiguity in 0.0..0.9f64,
        near in 0.0..2.0f64,
        extra in 0.0..2.0f64,
        vx in linear_speed(),
        vy in linear_speed(),
        omega in angular_speed(),
    ) {
        let model = ConfidenceModel::default();
        let state = motion(vx, vy, omega);
        let close = model.score(&observation(area, ambiguity, near), &state);
        let far = model.score(&observation(area, ambiguity, near + extra), &state);
        prop_assert_eq!(close.is_some(), far.is_some());
        if let (Some(close), Some(far)) = (close, far) {
            prop_assert!(far.x >= close.x && far.y >= close.y && far.heading >= close.heading,
                "close {:?} far {:?}", close, far);
        }
    }

    #[test]
    fn trust_never_improves_as_targets_shrink(
        small in 0.0..10.0f64,
        extra in 0.0..10.0f64,
        ambiguity in 0.0..0.9f64,
        distance in 0.0..2.0f64,
        vx in linear_speed(),
        vy in linear_speed(),
        omega in angular_speed(),
    ) {
        let model = ConfidenceModel::default();
        let state = motion(vx, vy, omega);
        let large = model.score(&observation(small + extra, ambiguity, distance), &state);
        let shrunk = model.score(&observation(small, ambiguity, distance), &state);
        prop_assert_eq!(large.is_some(), shrunk.is_some());
        // A still, slowly turning robot keeps the default heading on large
        // targets while medium targets get 0.1, so only xy is ordered there.
        let large_still_turning = small + extra > 2.0
            && vx.abs() + vy.abs() < 0.2
            && (0.1..=0.5).contains(&omega.abs());
        if let (Some(large), Some(shrunk)) = (large, shrunk) {
            prop_assert!(shrunk.x >= large.x && shrunk.y >= large.y,
                "large {:?} shrunk {:?}", large, shrunk);
            if !large_still_turning {
                prop_assert!(shrunk.heading >= large.heading,
                    "large {:?} shrunk {:?}", large, shrunk);
            }
        }
    }

    #[test]
    fn accepted_uncertainty_is_one_of_the_bands(
        area in 0.0..10.0f64,
        ambiguity in 0.0..0.9f64,
        distance in 0.0..2.0f64,
        vx in linear_speed(),
        omega in angular_speed(),
    ) {
        const BANDS: [f64; 6] = [0.05, 0.1, 0.15, 0.25, 0.5, 0.75];
        let model = ConfidenceModel::default();
        if let Some(trust) = model.score(&observation(area, ambiguity, distance), &motion(vx, 0.0, omega)) {
            prop_assert_eq!(trust.x, trust.y);
            prop_assert!(BANDS.contains(&trust.x));
            prop_assert!(BANDS.contains(&trust.heading));
        }
    }
}
