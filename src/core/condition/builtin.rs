//! Built-in condition types
//!
//! Each row is true when its left value matches *any* of its right values.
//! Rows are then folded with the condition's own operator.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::Value;

use super::pattern::PatternCache;
use super::{fold_rows, ConditionEvaluator, Operator, ResolvedRow};
use crate::error::Result;

/// Condition types registered by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// Strict equality with some right value
    Equals,
    NotEquals,
    Greater,
    Less,
    GreaterOrEquals,
    LessOrEquals,
    /// Strict membership in the right list
    In,
    NotIn,
    /// Inclusive `[min, max]` ranges
    Between,
    /// `*` wildcard patterns
    Like,
    NotLike,
    /// Regular expressions, bare or delimiter-wrapped
    RegEx,
}

impl Builtin {
    pub const ALL: [Builtin; 12] = [
        Builtin::Equals,
        Builtin::NotEquals,
        Builtin::Greater,
        Builtin::Less,
        Builtin::GreaterOrEquals,
        Builtin::LessOrEquals,
        Builtin::In,
        Builtin::NotIn,
        Builtin::Between,
        Builtin::Like,
        Builtin::NotLike,
        Builtin::RegEx,
    ];

    /// Name used in policy documents
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Equals => "Equals",
            Builtin::NotEquals => "NotEquals",
            Builtin::Greater => "Greater",
            Builtin::Less => "Less",
            Builtin::GreaterOrEquals => "GreaterOrEquals",
            Builtin::LessOrEquals => "LessOrEquals",
            Builtin::In => "In",
            Builtin::NotIn => "NotIn",
            Builtin::Between => "Between",
            Builtin::Like => "Like",
            Builtin::NotLike => "NotLike",
            Builtin::RegEx => "RegEx",
        }
    }

    pub(crate) fn evaluator(self, patterns: Arc<PatternCache>) -> BuiltinEvaluator {
        BuiltinEvaluator {
            kind: self,
            patterns,
        }
    }

    /// Truth of a single row
    pub fn test_row(self, row: &ResolvedRow, patterns: &PatternCache) -> Result<bool> {
        let left = &row.left;
        let right = &row.right;

        Ok(match self {
            Builtin::Equals | Builtin::In => right.iter().any(|r| r == left),
            Builtin::NotEquals | Builtin::NotIn => !right.iter().any(|r| r == left),
            Builtin::Greater => any_ordering(left, right, |o| o == Ordering::Greater),
            Builtin::Less => any_ordering(left, right, |o| o == Ordering::Less),
            Builtin::GreaterOrEquals => any_ordering(left, right, |o| o != Ordering::Less),
            Builtin::LessOrEquals => any_ordering(left, right, |o| o != Ordering::Greater),
            Builtin::Between => ranges(right).into_iter().any(|(min, max)| {
                matches!(compare(left, min), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(compare(left, max), Some(Ordering::Less | Ordering::Equal))
            }),
            Builtin::Like => like(left, right, patterns)?,
            Builtin::NotLike => !like(left, right, patterns)?,
            Builtin::RegEx => {
                let Some(text) = as_text(left) else {
                    return Ok(false);
                };
                for pattern in right.iter().filter_map(Value::as_str) {
                    if patterns.regex(pattern)?.is_match(&text) {
                        return Ok(true);
                    }
                }
                false
            }
        })
    }
}

pub(crate) struct BuiltinEvaluator {
    kind: Builtin,
    patterns: Arc<PatternCache>,
}

impl ConditionEvaluator for BuiltinEvaluator {
    fn evaluate(&self, rows: &[ResolvedRow], operator: Operator) -> Result<bool> {
        fold_rows(rows, operator, |row| self.kind.test_row(row, &self.patterns))
    }
}

/// Numbers compare numerically, strings lexicographically, anything else not at all
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn any_ordering(left: &Value, right: &[Value], accept: impl Fn(Ordering) -> bool) -> bool {
    right
        .iter()
        .any(|r| compare(left, r).is_some_and(&accept))
}

/// A bare `[min, max]` is one range, otherwise every pair in the list is one
fn ranges(right: &[Value]) -> Vec<(&Value, &Value)> {
    match right {
        [min, max] if !min.is_array() && !max.is_array() => vec![(min, max)],
        _ => right
            .iter()
            .filter_map(|v| match v.as_array().map(Vec::as_slice) {
                Some([min, max]) => Some((min, max)),
                _ => None,
            })
            .collect(),
    }
}

fn as_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s)),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        _ => None,
    }
}

fn like(left: &Value, right: &[Value], patterns: &PatternCache) -> Result<bool> {
    let Some(text) = as_text(left) else {
        return Ok(false);
    };
    for pattern in right.iter().filter_map(Value::as_str) {
        if patterns.like(pattern)?.is_match(&text) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(kind: Builtin, left: Value, right: Vec<Value>) -> bool {
        let patterns = PatternCache::default();
        kind.test_row(&ResolvedRow { left, right }, &patterns).unwrap()
    }

    #[test]
    fn test_equals_any_right_value() {
        assert!(check(Builtin::Equals, json!("manager"), vec![json!("admin"), json!("manager")]));
        assert!(!check(Builtin::Equals, json!("guest"), vec![json!("admin"), json!("manager")]));
        assert!(check(Builtin::NotEquals, json!("guest"), vec![json!("admin")]));
    }

    #[test]
    fn test_equals_is_strict() {
        assert!(!check(Builtin::Equals, json!("1"), vec![json!(1)]));
        assert!(!check(Builtin::Equals, json!(1), vec![json!(true)]));
        assert!(!check(Builtin::Equals, Value::Null, vec![json!("")]));
    }

    #[test]
    fn test_numeric_comparisons() {
        assert!(check(Builtin::Greater, json!(10), vec![json!(5)]));
        assert!(!check(Builtin::Greater, json!(5), vec![json!(5)]));
        assert!(check(Builtin::GreaterOrEquals, json!(5), vec![json!(5)]));
        assert!(check(Builtin::Less, json!(1.5), vec![json!(2)]));
        assert!(check(Builtin::LessOrEquals, json!(2), vec![json!(2.0)]));
        // any right value satisfies the row
        assert!(check(Builtin::Greater, json!(3), vec![json!(10), json!(1)]));
    }

    #[test]
    fn test_comparison_of_mixed_types_is_false() {
        assert!(!check(Builtin::Greater, json!("10"), vec![json!(5)]));
        assert!(!check(Builtin::Less, Value::Null, vec![json!(5)]));
        assert!(check(Builtin::Less, json!("2024-01-01"), vec![json!("2024-12-31")]));
    }

    #[test]
    fn test_in_and_not_in() {
        assert!(check(Builtin::In, json!("b"), vec![json!("a"), json!("b")]));
        assert!(!check(Builtin::In, json!("c"), vec![json!("a"), json!("b")]));
        assert!(check(Builtin::NotIn, json!("c"), vec![json!("a"), json!("b")]));
        assert!(!check(Builtin::In, json!(1), vec![json!("1")]));
    }

    #[test]
    fn test_between_single_range() {
        assert!(check(Builtin::Between, json!(5), vec![json!(1), json!(10)]));
        assert!(check(Builtin::Between, json!(1), vec![json!(1), json!(10)]));
        assert!(check(Builtin::Between, json!(10), vec![json!(1), json!(10)]));
        assert!(!check(Builtin::Between, json!(11), vec![json!(1), json!(10)]));
    }

    #[test]
    fn test_between_multiple_ranges() {
        let ranges = vec![json!([0, 5]), json!([8, 12])];
        assert!(check(Builtin::Between, json!(9), ranges.clone()));
        assert!(check(Builtin::Between, json!(3), ranges.clone()));
        assert!(!check(Builtin::Between, json!(6), ranges));
    }

    #[test]
    fn test_like() {
        assert!(check(Builtin::Like, json!("abc"), vec![json!("a*c")]));
        assert!(check(Builtin::Like, json!("ac"), vec![json!("a*c")]));
        assert!(!check(Builtin::Like, json!("abx"), vec![json!("a*c")]));
        assert!(check(Builtin::Like, json!("abx"), vec![json!("a*c"), json!("ab*")]));
        assert!(check(Builtin::NotLike, json!("abx"), vec![json!("a*c")]));
        assert!(check(Builtin::Like, json!(2024), vec![json!("20*")]));
    }

    #[test]
    fn test_regex() {
        assert!(check(Builtin::RegEx, json!("42"), vec![json!("^[0-9]+$")]));
        assert!(!check(Builtin::RegEx, json!("4a"), vec![json!("^[0-9]+$")]));
        assert!(check(Builtin::RegEx, json!("Alice"), vec![json!("/^alice$/i")]));
        assert!(!check(Builtin::RegEx, json!({"a": 1}), vec![json!(".*")]));
    }

    #[test]
    fn test_regex_malformed_propagates() {
        let patterns = PatternCache::default();
        let row = ResolvedRow {
            left: json!("x"),
            right: vec![json!("[a-")],
        };
        assert!(Builtin::RegEx.test_row(&row, &patterns).is_err());
    }

    #[test]
    fn test_row_operator_folding() {
        let evaluator = Builtin::Equals.evaluator(Arc::new(PatternCache::default()));
        let rows = vec![
            ResolvedRow {
                left: json!(1),
                right: vec![json!(1)],
            },
            ResolvedRow {
                left: json!(2),
                right: vec![json!(3)],
            },
        ];
        assert!(!evaluator.evaluate(&rows, Operator::And).unwrap());
        assert!(evaluator.evaluate(&rows, Operator::Or).unwrap());
        assert!(!evaluator.evaluate(&[], Operator::And).unwrap());
    }
}
