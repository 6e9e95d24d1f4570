#![no_main]
use arbitrary::Arbitrary;
use jsonpolicy_rs::get_value_by_xpath;
use libfuzzer_sys::fuzz_target;
use serde_json::json;

#[derive(Arbitrary, Debug)]
struct Input {
    path: String,
}

fuzz_target!(|input: Input| {
    let object = json!({
        "a": {"b": [{"c": 1}, {"c": [true, null]}]},
        "list": [0, 1, 2],
        "empty": {}
    });
    let _ = get_value_by_xpath(&object, &input.path);
});
