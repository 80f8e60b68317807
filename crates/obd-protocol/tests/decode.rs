use obd_protocol::{ParameterId, PidResponse};
use proptest::prelude::*;

fn any_pid_parameter() -> impl Strategy<Value = ParameterId> {
    prop::sample::select(
        ParameterId::ALL
            .iter()
            .copied()
            .filter(|p| p.pid().is_some())
            .collect::<Vec<_>>(),
    )
}

proptest! {
    #[test]
    fn decoded_values_are_finite(
        parameter in any_pid_parameter(),
        bytes in prop::collection::vec(any::<u8>(), 2..6),
    ) {
        let response = PidResponse::decode(parameter, bytes, 0).unwrap();
        prop_assert!(response.value.is_finite());
    }

    #[test]
    fn short_responses_never_decode_to_a_value(parameter in any_pid_parameter()) {
        let needed = parameter.response_bytes();
        let bytes = vec![0xFF; needed - 1];
        prop_assert!(PidResponse::decode(parameter, bytes, 0).is_err());
    }

    #[test]
    fn rpm_is_a_quarter_of_the_word(a in any::<u8>(), b in any::<u8>()) {
        let response = PidResponse::decode(ParameterId::Rpm, vec![a, b], 0).unwrap();
        prop_assert_eq!(response.value, (a as f64 * 256.0 + b as f64) / 4.0);
    }
}

#[test]
fn voltage_has_no_mode_01_decoding() {
    assert!(PidResponse::decode(ParameterId::ElmVoltage, vec![1, 2], 0).is_err());
}
