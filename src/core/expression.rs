//! Expression resolution
//!
//! A policy expression is either a literal JSON value or a marker string of
//! the form `${SOURCE.path}`, where `SOURCE` is an upper-case tag such as
//! `ARGS`, `ENV` or `HTTP_GET`. Anything else, `README.md` or `V1.2`
//! included, is literal text. A leading backslash keeps a marker string
//! literal: `\${ARGS.role}` is the text `${ARGS.role}`.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::condition::{ConditionGroup, ConditionNode, ResolvedEntry, ResolvedGroup, ResolvedRow};
use super::context::Context;
use super::marker::MarkerManager;

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\$\{([A-Z][A-Z0-9_]*)\.(.+)\}$").expect("marker regex"))
}

/// A parsed `${SOURCE.path}` reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerRef<'e> {
    pub source: &'e str,
    pub path: &'e str,
}

/// Detect a marker inside an expression string
pub fn parse_marker(expression: &str) -> Option<MarkerRef<'_>> {
    let caps = marker_regex().captures(expression)?;
    Some(MarkerRef {
        source: caps.get(1)?.as_str(),
        path: caps.get(2)?.as_str(),
    })
}

/// Turns expressions into runtime values
#[derive(Debug, Clone, Copy)]
pub struct ExpressionParser<'m> {
    markers: &'m MarkerManager,
}

impl<'m> ExpressionParser<'m> {
    pub fn new(markers: &'m MarkerManager) -> Self {
        ExpressionParser { markers }
    }

    /// Resolve one expression; an unresolvable marker yields `Null`
    pub fn convert_to_value(&self, expression: &Value, context: &Context<'_>) -> Value {
        let Value::String(text) = expression else {
            return expression.clone();
        };

        if let Some(rest) = text.strip_prefix('\\') {
            if parse_marker(rest).is_some() {
                return Value::String(rest.to_string());
            }
            return expression.clone();
        }

        match parse_marker(text) {
            Some(marker) => self
                .markers
                .get_value(marker.source, marker.path, context)
                .unwrap_or(Value::Null),
            None => expression.clone(),
        }
    }

    /// Resolve a right-hand side, always producing a list.
    ///
    /// A literal list resolves element by element; a single expression that
    /// resolves to a list is used as the list; anything else is wrapped.
    pub fn convert_to_list(&self, expression: &Value, context: &Context<'_>) -> Vec<Value> {
        match expression {
            Value::Array(items) => items
                .iter()
                .map(|item| self.convert_to_value(item, context))
                .collect(),
            single => match self.convert_to_value(single, context) {
                Value::Array(items) => items,
                value => vec![value],
            },
        }
    }

    /// Resolve every row of a declared group into a new tree
    pub fn resolve_group(&self, group: &ConditionGroup, context: &Context<'_>) -> ResolvedGroup {
        let entries = group
            .entries
            .iter()
            .map(|entry| match &entry.node {
                ConditionNode::Rows { operator, rows } => ResolvedEntry::Rows {
                    condition: entry.key.clone(),
                    operator: *operator,
                    rows: rows
                        .iter()
                        .map(|row| ResolvedRow {
                            left: self.convert_to_value(&row.left, context),
                            right: self.convert_to_list(&row.right, context),
                        })
                        .collect(),
                },
                ConditionNode::Group(nested) => {
                    ResolvedEntry::Group(self.resolve_group(nested, context))
                }
                ConditionNode::Unsupported => ResolvedEntry::Unsupported {
                    condition: entry.key.clone(),
                },
            })
            .collect();

        ResolvedGroup {
            operator: group.operator,
            entries,
        }
    }
}
