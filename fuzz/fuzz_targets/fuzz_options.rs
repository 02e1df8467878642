#![no_main]

use formstate::FormOptions;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let s = String::from_utf8_lossy(data);
    let _ = FormOptions::from_yaml(&s);
    let _ = FormOptions::from_json(&s);
});
