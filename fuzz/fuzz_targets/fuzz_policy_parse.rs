#![no_main]
use jsonpolicy_rs::{Manager, Options, Resource, Verdict};
use libfuzzer_sys::fuzz_target;
use serde_json::{json, Value};

// Arbitrary JSON as a policy document: bootstrap may reject it, but must not
// panic, and any tree it accepts must answer queries.
fuzz_target!(|data: &[u8]| {
    let Ok(document) = serde_json::from_slice::<Value>(data) else {
        return;
    };

    let manager = match Manager::bootstrap(Options::new(vec![document])) {
        Ok(m) => m,
        Err(_) => return,
    };

    let args = json!({"role": "admin", "n": 5, "email": "a@example.com"});
    let keys: Vec<String> = manager
        .tree()
        .statement_keys()
        .into_iter()
        .map(str::to_string)
        .collect();

    for key in keys {
        let (resource, action) = key.split_once("::").unwrap_or((key.as_str(), "*"));
        // Malformed patterns are reported as errors, never panics
        let _ = manager.is(
            &Resource::named(resource),
            "allowed",
            Some(action),
            Verdict::Undetermined,
            Some(&args),
        );
    }
});
