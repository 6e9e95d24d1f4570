//! Property-based tests for condition folding, path lookup and selection
//!
//! Uses proptest to check invariants across many random inputs

use jsonpolicy_rs::core::condition::compute;
use jsonpolicy_rs::{get_value_by_xpath, Manager, Operator, Options, Resource, Verdict};
use proptest::prelude::*;
use serde_json::json;

fn operator() -> impl Strategy<Value = Operator> {
    prop_oneof![Just(Operator::And), Just(Operator::Or)]
}

fn key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,7}"
}

proptest! {
    #[test]
    fn prop_undetermined_seeds_the_fold(value in any::<bool>(), op in operator()) {
        prop_assert_eq!(compute(Verdict::Undetermined, value.into(), op), Verdict::from(value));
        prop_assert_eq!(compute(value.into(), Verdict::Undetermined, op), Verdict::from(value));
    }

    #[test]
    fn prop_compute_matches_boolean_logic(a in any::<bool>(), b in any::<bool>()) {
        prop_assert_eq!(compute(a.into(), b.into(), Operator::And), Verdict::from(a && b));
        prop_assert_eq!(compute(a.into(), b.into(), Operator::Or), Verdict::from(a || b));
    }

    #[test]
    fn prop_dotted_and_bracket_paths_agree(
        a in key(),
        b in key(),
        c in key(),
        index in 0usize..4,
        leaf in any::<i64>()
    ) {
        let mut items = vec![json!({}); 4];
        items[index] = json!({ c.clone(): leaf });
        let object = json!({ a.clone(): { b.clone(): items } });

        let dotted = format!("{a}.{b}[{index}].{c}");
        let bracket = format!("{a}[\"{b}\"][{index}]['{c}']");

        let expected = json!(leaf);
        prop_assert_eq!(get_value_by_xpath(&object, &dotted), Some(&expected));
        prop_assert_eq!(get_value_by_xpath(&object, &bracket), Some(&expected));
    }

    #[test]
    fn prop_missing_paths_are_absent(a in key(), missing in key()) {
        prop_assume!(a != missing && missing != "x");
        let object = json!({ a.clone(): {"x": 1} });
        prop_assert_eq!(get_value_by_xpath(&object, &format!("{missing}.x.y")), None);
        prop_assert_eq!(get_value_by_xpath(&object, &format!("{a}.{missing}")), None);
    }

    #[test]
    fn prop_between_matches_inclusive_range(
        low in -1000i64..1000,
        span in 0i64..1000,
        left in -3000i64..3000
    ) {
        let high = low + span;
        let manager = Manager::bootstrap(Options::new(vec![json!({
            "Statement": [{"Resource": "R", "Effect": "allow",
                "Condition": {"Between": [{"left": "${ARGS.n}", "right": [low, high]}]}}]
        })])).unwrap();

        let args = json!({"n": left});
        let verdict = manager.is_allowed(&Resource::named("R"), None, Some(&args)).unwrap();
        let inside = low <= left && left <= high;
        prop_assert_eq!(verdict.is_yes(), inside);
        prop_assert_eq!(verdict.is_undetermined(), !inside);
    }

    #[test]
    fn prop_last_enforced_match_wins(flags in prop::collection::vec(any::<bool>(), 1..12)) {
        let statements: Vec<_> = flags
            .iter()
            .enumerate()
            .map(|(i, enforce)| json!({
                "Resource": "R",
                "Effect": format!("e{i}"),
                "Enforce": enforce
            }))
            .collect();
        let manager = Manager::bootstrap(Options::new(vec![json!({"Statement": statements})]))
            .unwrap();

        // all candidates apply: the last enforced one wins, or the last one if none is enforced
        let expected = flags
            .iter()
            .rposition(|enforce| *enforce)
            .unwrap_or(flags.len() - 1);
        let resource = Resource::named("R");
        for i in 0..flags.len() {
            let verdict = manager
                .is(&resource, &format!("e{i}"), None, Verdict::Undetermined, None)
                .unwrap();
            prop_assert_eq!(verdict.is_yes(), i == expected);
        }
    }
}
