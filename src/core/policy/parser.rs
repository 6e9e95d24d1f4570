//! Compiles raw policy documents into lookup indices
//!
//! Statements are indexed under `"<resource>::<action>"` (one entry per
//! resource/action pair, `*` when no action is given) and params under their
//! name. Buckets keep declaration order across all documents.

use std::sync::Arc;

use ahash::AHashMap;
use serde_json::Value;

use super::{Param, Statement};
use crate::error::{PolicyError, Result};

/// Wildcard resource or action
pub const WILDCARD: &str = "*";

/// Index key for a resource/action pair
pub fn statement_key(resource: &str, action: &str) -> String {
    format!("{resource}::{action}")
}

/// Indexed policy tree, immutable once built
#[derive(Debug, Clone, Default)]
pub struct Tree {
    statements: AHashMap<String, Vec<Arc<Statement>>>,
    params: AHashMap<String, Vec<Param>>,
    statement_count: usize,
}

impl Tree {
    /// Candidates indexed under `key`, in declaration order
    pub fn statements(&self, key: &str) -> &[Arc<Statement>] {
        self.statements
            .get(key)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Definitions of param `name`, in declaration order
    pub fn params(&self, name: &str) -> &[Param] {
        self.params.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Sorted statement keys
    pub fn statement_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.statements.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Sorted param names
    pub fn param_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.params.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of declared statements (before key expansion)
    pub fn statement_count(&self) -> usize {
        self.statement_count
    }

    /// Number of declared param definitions
    pub fn param_count(&self) -> usize {
        self.params.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty() && self.params.is_empty()
    }

    fn insert_statement(&mut self, statement: Statement) {
        let statement = Arc::new(statement);
        let actions: Vec<&str> = if statement.actions.is_empty() {
            vec![WILDCARD]
        } else {
            statement.actions.iter().map(String::as_str).collect()
        };

        for resource in &statement.resources {
            for action in &actions {
                self.statements
                    .entry(statement_key(resource, action))
                    .or_default()
                    .push(statement.clone());
            }
        }
        self.statement_count += 1;
    }

    fn insert_param(&mut self, param: Param) {
        self.params
            .entry(param.name.clone())
            .or_default()
            .push(param);
    }
}

/// Structural compiler for policy documents
pub struct PolicyParser;

impl PolicyParser {
    /// Build the tree from documents in declaration order.
    ///
    /// Fails on structurally invalid documents; conditions are parsed but
    /// never evaluated here.
    pub fn parse(documents: &[Value]) -> Result<Tree> {
        let mut tree = Tree::default();

        for (index, document) in documents.iter().enumerate() {
            let obj = document
                .as_object()
                .ok_or_else(|| PolicyError::document(index, "document must be an object"))?;

            match obj.get("Statement") {
                None | Some(Value::Null) => {}
                Some(Value::Array(items)) => {
                    for (pos, item) in items.iter().enumerate() {
                        let statement = Statement::from_value(item).map_err(|e| {
                            PolicyError::document(index, format!("statement {pos}: {e}"))
                        })?;
                        tree.insert_statement(statement);
                    }
                }
                Some(single @ Value::Object(_)) => {
                    let statement = Statement::from_value(single)
                        .map_err(|e| PolicyError::document(index, e.to_string()))?;
                    tree.insert_statement(statement);
                }
                Some(_) => {
                    return Err(PolicyError::document(
                        index,
                        "`Statement` must be a list of statements",
                    ))
                }
            }

            match obj.get("Param") {
                None | Some(Value::Null) => {}
                Some(Value::Object(params)) => {
                    for (name, definition) in params {
                        let definitions = match definition {
                            Value::Array(items) => items.as_slice(),
                            single => std::slice::from_ref(single),
                        };
                        for def in definitions {
                            let param = Param::from_value(name, def)
                                .map_err(|e| PolicyError::document(index, e.to_string()))?;
                            tree.insert_param(param);
                        }
                    }
                }
                Some(_) => {
                    return Err(PolicyError::document(
                        index,
                        "`Param` must map names to definitions",
                    ))
                }
            }
        }

        Ok(tree)
    }
}
