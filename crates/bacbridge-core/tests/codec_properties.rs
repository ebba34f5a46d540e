use bacbridge_core::codec::{self, HostValue};
use bacbridge_core::point::{PointKind, PointType};
use bacbridge_core::types::ObjectId;
use proptest::prelude::*;

fn spelled(name: &str, upper: bool, separator: &str) -> String {
    let text = name.replace('-', separator);
    if upper {
        text.to_uppercase()
    } else {
        text
    }
}

proptest! {
    #[test]
    fn classification_ignores_case_and_separators(
        idx in 0usize..PointType::ALL.len(),
        upper in any::<bool>(),
        separator in prop::sample::select(vec!["-", "_", " ", ""]),
        prefix in prop::sample::select(vec!["", "OBJECT_", "ObjectType.", "enum "]),
    ) {
        let ty = PointType::ALL[idx];
        let token = format!("{prefix}{}", spelled(ty.canonical_name(), upper, separator));
        prop_assert_eq!(PointType::classify(&token), Some(ty));
    }

    #[test]
    fn object_id_text_form_parses_back(idx in 0usize..PointType::ALL.len(), instance in 0u32..=0x3F_FFFF) {
        let id = ObjectId::new(PointType::ALL[idx].object_type(), instance);
        prop_assert_eq!(id.to_string().parse::<ObjectId>(), Ok(id));
    }

    #[test]
    fn multistate_index_stays_in_range(
        labels in prop::collection::vec("[a-z]{0,6}", 0..6),
        wanted in "[a-zA-Z]{0,6}",
    ) {
        let states = codec::normalize_states(&labels);
        let index = codec::multistate_index(&states, &wanted);
        prop_assert!(index >= 1);
        prop_assert!(index as usize <= states.len());
    }

    #[test]
    fn analog_rounding_is_close_and_never_negative_zero(value in -1.0e6f64..1.0e6) {
        let rounded = codec::round_analog(value);
        prop_assert!((rounded - value).abs() <= 0.0005 + 1e-6);
        prop_assert!(rounded != 0.0 || rounded.is_sign_positive());
    }

    #[test]
    fn multistate_writes_are_valid_indices(labels in prop::collection::vec("[a-z]{1,6}", 2..6), pick in 0usize..6) {
        let kind = PointKind::MultiState {
            state_text: Some(labels.clone()),
            number_of_states: Some(labels.len() as u32),
        };
        let wanted = HostValue::Text(labels[pick % labels.len()].to_uppercase());
        let encoded = kind.encode(&wanted);
        let index = encoded.and_then(|value| value.as_u32());
        prop_assert!(index.is_some_and(|idx| idx >= 1 && idx as usize <= labels.len()));
    }
}
