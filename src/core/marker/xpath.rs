//! Dotted-path lookups into JSON object graphs
//!
//! Paths accept both `a.b.0.c` and bracket forms such as `a["b"][0]['c']`.
//! Objects and arrays are walked the same way: object members by name,
//! array elements by numeric index.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn bracket_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\[\s*["']?([^\]"']*)["']?\s*\]"#).expect("bracket regex"))
}

/// Split a path into its components.
///
/// Bracket indices become dotted components, repeated separators collapse
/// and leading/trailing separators are dropped.
pub fn normalize_path(path: &str) -> Vec<String> {
    let dotted = bracket_regex().replace_all(path, ".$1");
    dotted
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Walk already-normalized components, stopping at the first missing one
pub fn walk<'v, S: AsRef<str>>(obj: &'v Value, segments: &[S]) -> Option<&'v Value> {
    let mut current = obj;
    for seg in segments {
        let seg = seg.as_ref();
        current = match current {
            Value::Object(map) => map.get(seg)?,
            Value::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Read the value at `path` inside `obj`; `None` when any component is missing
pub fn get_value_by_xpath<'v>(obj: &'v Value, path: &str) -> Option<&'v Value> {
    walk(obj, &normalize_path(path))
}
