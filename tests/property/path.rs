use formstate::Value;
use formstate::path;
use proptest::prelude::*;
use serde_json::json;

/// Key or small index segments.
fn arb_segment() -> impl Strategy<Value = String> {
    prop_oneof!["[a-z]{1,6}", (0usize..4).prop_map(|i| i.to_string())]
}

fn arb_path() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_segment(), 1..5).prop_map(|segs| segs.join("."))
}

fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z ]{0,8}".prop_map(Value::from),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    // get(set(tree, p, v), p) == v, whatever the tree held before
    #[test]
    fn set_then_get(p in arb_path(), v in arb_leaf()) {
        let tree: Value = json!({ "a": [1, { "b": "x" }], "c": "scalar" }).into();
        let next = path::set(&tree, &p, v.clone());
        prop_assert_eq!(path::get(&next, &p), Some(&v), "path {:?}", p);
    }

    // writes never mutate the input tree
    #[test]
    fn set_is_pure(p in arb_path(), v in arb_leaf()) {
        let tree: Value = json!({ "a": [1, 2], "c": { "d": true } }).into();
        let copy = tree.to_json();
        let _ = path::set(&tree, &p, v);
        prop_assert_eq!(tree.to_json(), copy);
    }

    // siblings off the written spine keep identity
    #[test]
    fn untouched_branches_are_shared(rest in arb_path(), v in arb_leaf()) {
        let tree: Value = json!({ "left": { "x": 1 }, "right": { "y": [1, 2] } }).into();
        let next = path::set(&tree, &path::join("left", &rest), v);
        prop_assert!(Value::ptr_eq(
            tree.child("right").unwrap(),
            next.child("right").unwrap()
        ));
    }

    // removing something that is not there returns the same tree
    #[test]
    fn removing_missing_path_keeps_identity(rest in arb_path()) {
        let tree: Value = json!({ "present": 1 }).into();
        let next = path::remove(&tree, &path::join("absent", &rest));
        prop_assert!(Value::ptr_eq(&tree, &next));
    }

    #[test]
    fn joined_segments_validate(p in arb_path()) {
        prop_assert!(path::validate(&p).is_ok());
        prop_assert_eq!(path::parse(&p).unwrap().join("."), p);
    }

    #[test]
    fn empty_segments_are_rejected(a in arb_path(), b in arb_path()) {
        let leading = format!(".{a}");
        let trailing = format!("{a}.");
        let doubled = format!("{a}..{b}");
        prop_assert!(path::validate(&leading).is_err());
        prop_assert!(path::validate(&trailing).is_err());
        prop_assert!(path::validate(&doubled).is_err());
    }

    // every path is within each of its ancestors
    #[test]
    fn ancestors_contain_path(p in arb_path()) {
        for ancestor in path::ancestors(&p) {
            prop_assert!(path::is_within(&p, ancestor));
            prop_assert!(path::is_related(ancestor, &p));
        }
        prop_assert!(path::is_within(&p, ""));
    }

    // rebasing leaves paths outside the array alone
    #[test]
    fn rebase_outside_array_is_identity(p in arb_path()) {
        let outside = path::join("other", &p);
        prop_assert_eq!(
            path::rebase_index(&outside, "items", |i| Some(i + 1)),
            Some(outside.clone())
        );
    }

    // indices far past the end drop the write instead of padding
    #[test]
    fn far_indices_leave_tree_unchanged(
        index in (path::MAX_PAD as u64 + 1)..=u64::MAX,
        rest in prop::option::of(arb_path()),
    ) {
        let tree: Value = json!({ "tags": ["a"] }).into();
        let target = match rest {
            Some(rest) => format!("tags.{index}.{rest}"),
            None => format!("tags.{index}"),
        };
        let next = path::set(&tree, &target, Value::from("x"));
        prop_assert!(Value::ptr_eq(&tree, &next), "path {:?}", target);
    }

    // padding within the bound still lands the value
    #[test]
    fn near_indices_pad_with_null(index in 1usize..path::MAX_PAD) {
        let tree: Value = json!({ "tags": ["a"] }).into();
        let next = path::set(&tree, &format!("tags.{index}"), Value::from("x"));
        let items = next.child("tags").unwrap().as_array().unwrap();
        prop_assert_eq!(items.len(), index + 1);
        prop_assert!(items[1..index].iter().all(Value::is_null));
    }
}

#[test]
fn max_usize_index_does_not_overflow() {
    let tree: Value = json!({ "tags": ["a"] }).into();
    let next = path::set(&tree, "tags.18446744073709551615", Value::from("x"));
    assert!(Value::ptr_eq(&tree, &next));

    let fresh = path::set(&Value::object(), "list.99999999999", Value::from("x"));
    assert!(path::get(&fresh, "list.99999999999").is_none());
}
