//! Condition groups and their evaluation
//!
//! A condition group maps condition-type names (`Equals`, `Like`, ...) to
//! lists of `{left, right}` rows. Nested groups live under the reserved key
//! `Group` or `Group:<label>`. Siblings combine with the group's `Operator`
//! (AND unless stated), rows of one type combine with that type's own
//! `Operator`.
//!
//! Groups are stored exactly as declared. Before evaluation every row is
//! resolved into a [`ResolvedGroup`], so the declared tree stays untouched
//! and reusable across queries.

mod builtin;
mod pattern;

pub use builtin::Builtin;
pub use pattern::{like_to_regex, regex_source, PatternCache, DEFAULT_PATTERN_CACHE};

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use super::verdict::Verdict;
use crate::error::{PolicyError, Result};

/// Reserved group key selecting the combining operator
pub const OPERATOR_KEY: &str = "Operator";

/// Reserved key for nested groups, optionally labelled as `Group:<label>`
pub const GROUP_KEY: &str = "Group";

fn is_group_key(key: &str) -> bool {
    key == GROUP_KEY
        || key
            .strip_prefix(GROUP_KEY)
            .is_some_and(|rest| rest.starts_with(':'))
}

/// Logical operator combining rows or sibling conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Operator {
    #[default]
    And,
    Or,
}

impl FromStr for Operator {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("and") {
            Ok(Operator::And)
        } else if s.eq_ignore_ascii_case("or") {
            Ok(Operator::Or)
        } else {
            Err(PolicyError::InvalidOperator(s.to_string()))
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::And => f.write_str("AND"),
            Operator::Or => f.write_str("OR"),
        }
    }
}

/// Fold `next` into `accumulated`.
///
/// An undetermined side contributes nothing: the first determined value
/// seeds the fold, later ones combine through `operator`.
pub fn compute(accumulated: Verdict, next: Verdict, operator: Operator) -> Verdict {
    match (accumulated.as_bool(), next.as_bool()) {
        (None, _) => next,
        (_, None) => accumulated,
        (Some(a), Some(b)) => match operator {
            Operator::And => (a && b).into(),
            Operator::Or => (a || b).into(),
        },
    }
}

/// One `{left, right}` comparison as declared
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub left: Value,
    pub right: Value,
}

impl Row {
    fn from_object(obj: &Map<String, Value>) -> Result<Self> {
        let left = obj
            .get("left")
            .cloned()
            .ok_or_else(|| PolicyError::InvalidCondition("row is missing `left`".into()))?;
        Ok(Row {
            left,
            right: obj.get("right").cloned().unwrap_or(Value::Null),
        })
    }
}

/// What a condition key maps to
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    /// Rows for the condition type named by the key
    Rows { operator: Operator, rows: Vec<Row> },
    /// Nested group under a `Group` key
    Group(ConditionGroup),
    /// Object under a condition type that holds no rows; never matches
    Unsupported,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionEntry {
    pub key: String,
    pub node: ConditionNode,
}

/// Declared condition tree
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionGroup {
    pub operator: Operator,
    pub entries: Vec<ConditionEntry>,
}

impl ConditionGroup {
    /// Parse the JSON form of a `Condition` block
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => Self::from_map(map),
            _ => Err(PolicyError::InvalidCondition(
                "condition must be an object".into(),
            )),
        }
    }

    fn from_map(map: &Map<String, Value>) -> Result<Self> {
        let mut group = ConditionGroup {
            operator: parse_operator(map)?,
            entries: Vec::new(),
        };

        for (key, value) in map {
            if key == OPERATOR_KEY {
                continue;
            }
            if is_group_key(key) {
                let nested = value.as_object().ok_or_else(|| {
                    PolicyError::InvalidCondition(format!("group `{key}` must be an object"))
                })?;
                group.entries.push(ConditionEntry {
                    key: key.clone(),
                    node: ConditionNode::Group(Self::from_map(nested)?),
                });
                continue;
            }

            let node = match value {
                Value::Array(items) => ConditionNode::Rows {
                    operator: Operator::And,
                    rows: parse_rows(key, items)?,
                },
                Value::Object(obj) if is_row(value) => ConditionNode::Rows {
                    operator: Operator::And,
                    rows: vec![Row::from_object(obj)?],
                },
                Value::Object(obj) if is_row_set(obj) => {
                    let rows = obj
                        .iter()
                        .filter(|(k, _)| k.as_str() != OPERATOR_KEY)
                        .filter_map(|(_, v)| v.as_object())
                        .map(Row::from_object)
                        .collect::<Result<Vec<_>>>()?;
                    ConditionNode::Rows {
                        operator: parse_operator(obj)?,
                        rows,
                    }
                }
                Value::Object(_) => ConditionNode::Unsupported,
                _ => {
                    return Err(PolicyError::InvalidCondition(format!(
                        "condition `{key}` must be a list of rows or an object"
                    )))
                }
            };
            group.entries.push(ConditionEntry {
                key: key.clone(),
                node,
            });
        }

        Ok(group)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_operator(map: &Map<String, Value>) -> Result<Operator> {
    match map.get(OPERATOR_KEY) {
        None => Ok(Operator::And),
        Some(Value::String(s)) => s.parse(),
        Some(other) => Err(PolicyError::InvalidOperator(other.to_string())),
    }
}

fn is_row(value: &Value) -> bool {
    value.as_object().is_some_and(|o| o.contains_key("left"))
}

/// `{"Operator": "OR", "0": {row}, "1": {row}}`: rows keyed by position
fn is_row_set(obj: &Map<String, Value>) -> bool {
    let mut rows = obj
        .iter()
        .filter(|(k, _)| k.as_str() != OPERATOR_KEY)
        .peekable();
    rows.peek().is_some() && rows.all(|(_, v)| is_row(v))
}

fn parse_rows(key: &str, items: &[Value]) -> Result<Vec<Row>> {
    items
        .iter()
        .map(|item| match item {
            Value::Object(obj) => Row::from_object(obj),
            _ => Err(PolicyError::InvalidCondition(format!(
                "rows of `{key}` must be objects with `left` and `right`"
            ))),
        })
        .collect()
}

/// Row with both sides resolved to runtime values
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRow {
    pub left: Value,
    /// Always a list; a single right-hand value is wrapped
    pub right: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedEntry {
    Rows {
        condition: String,
        operator: Operator,
        rows: Vec<ResolvedRow>,
    },
    Group(ResolvedGroup),
    Unsupported { condition: String },
}

/// Condition tree ready for evaluation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedGroup {
    pub operator: Operator,
    pub entries: Vec<ResolvedEntry>,
}

/// Evaluates the rows of one condition type
pub trait ConditionEvaluator: Send + Sync {
    fn evaluate(&self, rows: &[ResolvedRow], operator: Operator) -> Result<bool>;
}

impl<F> ConditionEvaluator for F
where
    F: Fn(&[ResolvedRow], Operator) -> Result<bool> + Send + Sync,
{
    fn evaluate(&self, rows: &[ResolvedRow], operator: Operator) -> Result<bool> {
        self(rows, operator)
    }
}

/// Fold per-row outcomes with `operator`; no rows means no match
pub fn fold_rows<F>(rows: &[ResolvedRow], operator: Operator, mut test: F) -> Result<bool>
where
    F: FnMut(&ResolvedRow) -> Result<bool>,
{
    let mut acc = Verdict::Undetermined;
    for row in rows {
        let next = Verdict::from(test(row)?);
        acc = compute(acc, next, operator);
    }
    Ok(acc.is_yes())
}

/// Registry of condition types
#[derive(Clone)]
pub struct ConditionManager {
    evaluators: HashMap<String, Arc<dyn ConditionEvaluator>>,
    patterns: Arc<PatternCache>,
}

impl ConditionManager {
    /// Manager with the built-in condition types registered
    pub fn new(pattern_cache_capacity: usize) -> Self {
        let patterns = Arc::new(PatternCache::new(pattern_cache_capacity));
        let evaluators = Builtin::ALL
            .iter()
            .map(|kind| {
                let evaluator: Arc<dyn ConditionEvaluator> =
                    Arc::new(kind.evaluator(patterns.clone()));
                (kind.name().to_string(), evaluator)
            })
            .collect();
        ConditionManager {
            evaluators,
            patterns,
        }
    }

    /// Built-ins with `custom` merged over them, later entries winning
    pub fn with_custom<I>(custom: I, pattern_cache_capacity: usize) -> Self
    where
        I: IntoIterator<Item = (String, Arc<dyn ConditionEvaluator>)>,
    {
        let mut manager = Self::new(pattern_cache_capacity);
        for (name, evaluator) in custom {
            manager.register(name, evaluator);
        }
        manager
    }

    /// Register a condition type, replacing any evaluator with the same name
    pub fn register(&mut self, name: impl Into<String>, evaluator: Arc<dyn ConditionEvaluator>) {
        self.evaluators.insert(name.into(), evaluator);
    }

    pub fn has_condition(&self, name: &str) -> bool {
        self.evaluators.contains_key(name)
    }

    /// Compiled-pattern cache shared by the Like / RegEx evaluators
    pub fn patterns(&self) -> &PatternCache {
        &self.patterns
    }

    /// Evaluate a resolved group.
    ///
    /// Unknown condition types and types without rows count as false. An
    /// empty group is undetermined.
    pub fn evaluate(&self, group: &ResolvedGroup) -> Result<Verdict> {
        let mut result = Verdict::Undetermined;

        for entry in &group.entries {
            let next = match entry {
                ResolvedEntry::Rows {
                    condition,
                    operator,
                    rows,
                } => match self.evaluators.get(condition) {
                    Some(evaluator) => evaluator.evaluate(rows, *operator)?.into(),
                    None => {
                        warn!(condition = %condition, "unknown condition type, failing closed");
                        Verdict::No
                    }
                },
                ResolvedEntry::Group(nested) => self.evaluate(nested)?,
                ResolvedEntry::Unsupported { condition } => {
                    warn!(condition = %condition, "condition holds no rows, failing closed");
                    Verdict::No
                }
            };
            result = compute(result, next, group.operator);
        }

        Ok(result)
    }
}

impl Default for ConditionManager {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERN_CACHE)
    }
}

impl fmt::Debug for ConditionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.evaluators.keys().collect();
        names.sort();
        f.debug_struct("ConditionManager")
            .field("conditions", &names)
            .field("patterns", &self.patterns)
            .finish()
    }
}
