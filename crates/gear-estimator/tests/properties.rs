use gear_estimator::{estimate, Gear, GearConfig, GearEstimator};
use proptest::prelude::*;

fn any_gear() -> impl Strategy<Value = Gear> {
    prop_oneof![
        Just(Gear::Neutral),
        Just(Gear::Unknown),
        (1u8..=5).prop_map(Gear::Forward),
    ]
}

proptest! {
    #[test]
    fn estimate_is_deterministic(
        rpm in prop::option::of(0.0f64..7_000.0),
        speed in prop::option::of(0.0f64..200.0),
        last in any_gear(),
    ) {
        let config = GearConfig::default();
        prop_assert_eq!(
            estimate(&config, rpm, speed, last),
            estimate(&config, rpm, speed, last)
        );
    }

    #[test]
    fn result_is_always_a_configured_gear(
        rpm in 0.0f64..7_000.0,
        speed in 0.0f64..200.0,
        last in any_gear(),
    ) {
        let config = GearConfig::default();
        match estimate(&config, Some(rpm), Some(speed), last) {
            Gear::Forward(g) => prop_assert!((1..=5).contains(&g)),
            Gear::Neutral => prop_assert!(speed < config.min_speed_kmh),
            Gear::Unknown => {}
        }
    }

    #[test]
    fn below_idle_is_never_a_gear(rpm in 0.0f64..599.0, speed in 0.0f64..200.0) {
        let mut est = GearEstimator::new(GearConfig::default()).unwrap();
        prop_assert_eq!(est.update(Some(rpm), Some(speed)), Gear::Unknown);
    }

    #[test]
    fn small_jitter_inside_a_band_never_switches(jitter in prop::collection::vec(-0.02f64..0.02, 1..50)) {
        let mut est = GearEstimator::new(GearConfig::default()).unwrap();
        // Ratio 50 sits in the middle of third gear
        prop_assert_eq!(est.update(Some(3_000.0), Some(60.0)), Gear::Forward(3));
        for j in jitter {
            prop_assert_eq!(est.update(Some(3_000.0 * (1.0 + j)), Some(60.0)), Gear::Forward(3));
        }
    }
}
