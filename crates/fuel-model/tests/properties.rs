use fuel_model::{FastSamples, FuelConfig, FuelModel, Step, TrapezoidIntegrator};
use proptest::prelude::*;

proptest! {
    #[test]
    fn cumulative_totals_never_decrease(
        ticks in prop::collection::vec(
            (1u64..4_000, 0.0f64..200.0, -30.0f64..30.0, -30.0f64..30.0),
            1..200,
        )
    ) {
        let mut model = FuelModel::new(FuelConfig::default()).unwrap();
        let mut t = 0u64;
        let mut last_base = 0.0;
        let mut last_corrected = 0.0;

        for (dt, maf, stft, ltft) in ticks {
            t += dt;
            let state = model.on_fast_tick(t, &FastSamples::new(Some(maf), Some(stft), Some(ltft)));
            prop_assert!(state.cumulative_base_ml >= last_base);
            prop_assert!(state.cumulative_corrected_ml >= last_corrected);
            prop_assert!(state.cumulative_base_ml.is_finite());
            last_base = state.cumulative_base_ml;
            last_corrected = state.cumulative_corrected_ml;
        }
    }

    #[test]
    fn arbitrary_timestamps_never_produce_negative_or_nan(
        ticks in prop::collection::vec((0u64..20_000, prop::option::of(0.0f64..100.0)), 1..100)
    ) {
        let mut model = FuelModel::new(FuelConfig::default()).unwrap();
        let mut last_base = 0.0;
        for (t, maf) in ticks {
            let state = model.on_fast_tick(t, &FastSamples::new(maf, Some(0.0), Some(0.0)));
            prop_assert!(state.cumulative_base_ml >= last_base);
            prop_assert!(!state.cumulative_corrected_ml.is_nan());
            last_base = state.cumulative_base_ml;
        }
    }

    #[test]
    fn constant_rate_integrates_to_rate_times_duration(
        rate in 0.0f64..500.0,
        duration_ms in 1u64..5_000,
    ) {
        let mut integ = TrapezoidIntegrator::new();
        integ.step(0, Some(rate), None);
        let step = integ.step(duration_ms, Some(rate), None);
        let expected = rate * (duration_ms as f64 / 1000.0);
        prop_assert_eq!(step, Step::Integrated(expected));
        prop_assert_eq!(integ.total(), expected);
    }
}

#[test]
fn two_tick_scenario_adds_twelve_units() {
    let mut integ = TrapezoidIntegrator::new();
    integ.step(0, Some(5.0), None);
    integ.step(2_000, Some(7.0), None);
    assert_eq!(integ.total(), 12.0);
}

#[test]
fn maf_ten_with_zero_trims() {
    let mut model = FuelModel::new(FuelConfig::default()).unwrap();
    let state = model
        .on_fast_tick(0, &FastSamples::new(Some(10.0), Some(0.0), Some(0.0)))
        .clone();
    let base = state.inst_flow_base_ml_min.unwrap();
    assert!((base - 10.0 / 14.7 / 0.745 * 60.0).abs() < 1e-9);
    assert_eq!(state.inst_flow_corrected_ml_min, Some(base));
}

#[test]
fn custom_constants_change_the_scale() {
    let config = FuelConfig {
        air_fuel_ratio: 15.0,
        fuel_density_g_per_ml: 0.5,
        ..FuelConfig::default()
    };
    let model = FuelModel::new(config).unwrap();
    // 15 g/s air -> 1 g/s fuel -> 2 ml/s -> 120 ml/min
    assert!((model.base_flow_ml_min(15.0) - 120.0).abs() < 1e-9);
}
