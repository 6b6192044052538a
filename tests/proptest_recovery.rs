use proptest::prelude::*;
use serde_json::{json, Value};
use trazar::recovery::{attempt_truncated_json_parse, extract_json, order_steps};
use trazar::PlanStep;

fn arb_json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        // Printable ASCII on purpose: braces, quotes, and backslashes inside
        // string values must not confuse the balanced scan
        "[ -~]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn arb_json_object() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z]{1,8}", arb_json_value(), 1..4)
        .prop_map(|m| Value::Object(m.into_iter().collect()))
}

proptest! {
    #[test]
    fn extraction_never_panics(text in "[ -~\\n]{0,200}") {
        let _ = extract_json(&text);
        let _ = attempt_truncated_json_parse(&text);
    }

    #[test]
    fn extracted_slice_is_balanced(text in "[ -~\\n]{0,200}") {
        if let Some(slice) = extract_json(&text) {
            prop_assert!(slice.starts_with('{'), "slice must start with an opening brace");
            prop_assert!(slice.ends_with('}'), "slice must end with a closing brace");
        }
    }

    #[test]
    fn embedded_object_survives_prose(
        object in arb_json_object(),
        prefix in "[a-zA-Z0-9 .,:\\n]{0,40}",
        suffix in "[ -~\\n]{0,40}",
    ) {
        let rendered = serde_json::to_string(&object).unwrap();
        let text = format!("{prefix}{rendered}{suffix}");
        let slice = extract_json(&text).expect("object should be found");
        let decoded: Value = serde_json::from_str(slice).unwrap();
        prop_assert_eq!(decoded, object);
    }

    #[test]
    fn truncation_repair_never_panics(object in arb_json_object(), keep in 1usize..200) {
        let rendered = serde_json::to_string(&object).unwrap();
        let cut = keep.min(rendered.len());
        // Cut on a char boundary; ASCII-only values make every byte one
        let _ = attempt_truncated_json_parse(&rendered[..cut]);
    }

    #[test]
    fn untruncated_object_roundtrips(object in arb_json_object()) {
        let rendered = serde_json::to_string(&object).unwrap();
        let recovered = attempt_truncated_json_parse(&rendered).expect("complete object parses");
        prop_assert_eq!(recovered, object);
    }
}

fn arb_plan() -> impl Strategy<Value = Vec<PlanStep>> {
    (1usize..8).prop_flat_map(|n| {
        let deps: Vec<BoxedStrategy<Vec<usize>>> = (0..n)
            .map(|i| {
                if i == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    prop::collection::vec(0..i, 0..=i.min(3)).boxed()
                }
            })
            .collect();
        deps.prop_map(|deps| {
            deps.into_iter()
                .enumerate()
                .map(|(i, d)| PlanStep {
                    id: format!("step-{i}"),
                    depends_on: {
                        let mut ids: Vec<String> =
                            d.into_iter().map(|j| format!("step-{j}")).collect();
                        ids.sort();
                        ids.dedup();
                        ids
                    },
                    ..PlanStep::default()
                })
                .collect()
        })
    })
}

proptest! {
    #[test]
    fn ordering_is_input_order_independent(plan in arb_plan()) {
        let ordered = order_steps(&plan).unwrap();
        prop_assert_eq!(ordered.len(), plan.len());

        let mut reversed = plan.clone();
        reversed.reverse();
        let reordered = order_steps(&reversed).unwrap();

        let ids: Vec<&str> = ordered.iter().map(|s| s.id.as_str()).collect();
        let rids: Vec<&str> = reordered.iter().map(|s| s.id.as_str()).collect();
        prop_assert_eq!(ids, rids);
    }

    #[test]
    fn ordering_respects_dependencies(plan in arb_plan()) {
        let ordered = order_steps(&plan).unwrap();
        let position: std::collections::HashMap<&str, usize> = ordered
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();
        for step in &ordered {
            for dep in &step.depends_on {
                prop_assert!(position[dep.as_str()] < position[step.id.as_str()]);
            }
        }
    }
}
