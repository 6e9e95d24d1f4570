//! Declarative engine configuration
//!
//! The parts of the bootstrap options that are plain data can live in a TOML
//! file and be applied with [`Options::with_config`](crate::Options::with_config):
//!
//! ```toml
//! pattern_cache_capacity = 512
//!
//! [context]
//! tenant = "acme"
//!
//! [effects]
//! audited = "audit"
//!
//! [env]
//! APP_STAGE = "prod"
//! ```
//!
//! Policy documents are not part of the configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::marker::Environment;
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Extra properties visible to every query context
    pub context: Map<String, Value>,
    /// Query word → effect stem
    pub effects: BTreeMap<String, String>,
    /// Environment variables visible to `ENV` markers
    pub env: Environment,
    /// Compiled Like/RegEx patterns kept in memory
    pub pattern_cache_capacity: Option<usize>,
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}
