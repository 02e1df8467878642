#![no_main]

use formstate::{Value, path};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // The first byte picks the split point between path and JSON tree.
    let split = data[0] as usize % data.len();
    let (path_bytes, tree_bytes) = data[1..].split_at(split.min(data.len() - 1));
    let target = String::from_utf8_lossy(path_bytes);

    let Ok(json) = serde_json::from_slice::<serde_json::Value>(tree_bytes) else {
        return;
    };
    let tree = Value::from(json);

    let _ = path::get(&tree, &target);
    if path::validate(&target).is_err() {
        return;
    }
    let marker = Value::from("fuzz");
    let written = path::set(&tree, &target, marker.clone());
    // A write past the padding bound is dropped whole.
    if path::get(&written, &target) != Some(&marker) {
        assert!(Value::ptr_eq(&tree, &written));
        return;
    }
    let _ = path::remove(&written, &target);
});
