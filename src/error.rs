//! Error types for policy bootstrap and evaluation

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Invalid policy document #{document}: {reason}")]
    InvalidDocument { document: usize, reason: String },

    #[error("Invalid statement: {0}")]
    InvalidStatement(String),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Invalid condition operator: {0} (expected AND or OR)")]
    InvalidOperator(String),

    #[error("Invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Policy supplier failed: {0}")]
    PolicySupplier(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

impl PolicyError {
    pub(crate) fn document(document: usize, reason: impl Into<String>) -> Self {
        PolicyError::InvalidDocument {
            document,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PolicyError>;
