//! Policy document structure
//!
//! A policy document is a JSON object with an optional `Statement` list and
//! an optional `Param` map:
//!
//! ```json
//! {
//!   "Statement": [
//!     { "Resource": "Report", "Action": "view", "Effect": "allow",
//!       "Condition": { "Equals": [ { "left": "${ARGS.role}", "right": ["admin"] } ] } }
//!   ],
//!   "Param": {
//!     "page.size": { "Value": 50 }
//!   }
//! }
//! ```

mod parser;

pub use parser::{statement_key, PolicyParser, Tree, WILDCARD};

use serde_json::{Map, Value};

use super::condition::ConditionGroup;
use crate::error::{PolicyError, Result};

/// Something the best-candidate selection can rank
pub trait Candidate {
    fn condition(&self) -> Option<&ConditionGroup>;
    fn is_enforced(&self) -> bool;
}

/// One rule binding resources and actions to an effect
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Optional statement id, only used for diagnostics
    pub sid: Option<String>,
    pub resources: Vec<String>,
    /// Empty means every action
    pub actions: Vec<String>,
    /// Free-form effect label such as `allow` or `deny`
    pub effect: String,
    pub condition: Option<ConditionGroup>,
    pub enforce: bool,
}

impl Candidate for Statement {
    fn condition(&self) -> Option<&ConditionGroup> {
        self.condition.as_ref()
    }

    fn is_enforced(&self) -> bool {
        self.enforce
    }
}

/// One conditional definition of a named parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub value: Value,
    pub condition: Option<ConditionGroup>,
    pub enforce: bool,
}

impl Candidate for Param {
    fn condition(&self) -> Option<&ConditionGroup> {
        self.condition.as_ref()
    }

    fn is_enforced(&self) -> bool {
        self.enforce
    }
}

impl Statement {
    pub(crate) fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| PolicyError::InvalidStatement("statement must be an object".into()))?;

        let resources = match obj.get("Resource") {
            Some(v) => string_list(v, "Resource")?,
            None => return Err(PolicyError::InvalidStatement("statement has no `Resource`".into())),
        };
        if resources.is_empty() {
            return Err(PolicyError::InvalidStatement(
                "statement `Resource` is empty".into(),
            ));
        }

        let actions = match obj.get("Action") {
            None | Some(Value::Null) => Vec::new(),
            Some(v) => string_list(v, "Action")?,
        };
        // `*::<action>` is never looked up
        if resources.iter().any(|r| r == WILDCARD) && actions.iter().any(|a| a != WILDCARD) {
            return Err(PolicyError::InvalidStatement(
                "wildcard resource requires a wildcard action".into(),
            ));
        }

        let effect = match obj.get("Effect") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(_) => {
                return Err(PolicyError::InvalidStatement(
                    "statement `Effect` must be a non-empty string".into(),
                ))
            }
            None => return Err(PolicyError::InvalidStatement("statement has no `Effect`".into())),
        };

        let sid = match obj.get("Sid") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(PolicyError::InvalidStatement(
                    "statement `Sid` must be a string".into(),
                ))
            }
        };

        Ok(Statement {
            sid,
            resources,
            actions,
            effect,
            condition: parse_condition(obj)?,
            enforce: parse_enforce(obj)?,
        })
    }
}

impl Param {
    pub(crate) fn from_value(name: &str, value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            PolicyError::InvalidStatement(format!("param `{name}` must be an object"))
        })?;

        Ok(Param {
            name: name.to_string(),
            value: obj.get("Value").cloned().unwrap_or(Value::Null),
            condition: parse_condition(obj)?,
            enforce: parse_enforce(obj)?,
        })
    }
}

fn string_list(value: &Value, field: &str) -> Result<Vec<String>> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    PolicyError::InvalidStatement(format!("`{field}` entries must be strings"))
                })
            })
            .collect(),
        _ => Err(PolicyError::InvalidStatement(format!(
            "`{field}` must be a string or a list of strings"
        ))),
    }
}

/// An empty group is the same as no condition
fn parse_condition(obj: &Map<String, Value>) -> Result<Option<ConditionGroup>> {
    match obj.get("Condition") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let group = ConditionGroup::from_value(v)?;
            Ok((!group.is_empty()).then_some(group))
        }
    }
}

fn parse_enforce(obj: &Map<String, Value>) -> Result<bool> {
    match obj.get("Enforce") {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(PolicyError::InvalidStatement(
            "`Enforce` must be a boolean".into(),
        )),
    }
}
