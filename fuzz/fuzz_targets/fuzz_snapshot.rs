#![no_main]

use formstate::{FormEngine, Snapshot};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let s = String::from_utf8_lossy(data);
    let Ok(snapshot) = Snapshot::from_json(&s) else {
        return;
    };

    let Ok(form) = FormEngine::builder(serde_json::json!({})).build() else {
        return;
    };
    form.restore_snapshot(&snapshot);

    // A restored snapshot must capture back to the same state.
    let captured = form.get_snapshot();
    assert!(
        captured.same_state(&snapshot),
        "restore/capture mismatch for input {:?}",
        s.get(..200).unwrap_or(&s)
    );
    let _ = captured.to_json();
});
