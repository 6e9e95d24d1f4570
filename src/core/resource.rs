//! Resources under test and resource-name resolution
//!
//! A resource is either a bare scalar (its value is its name) or a typed
//! object graph (its declared type name is its name). Hosts can put a chain
//! of [`ResourceNameResolver`]s in front of that default.

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// The resource a query is asked about
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    /// Plain value, e.g. `"Report"`
    Scalar(Value),
    /// Structured value with a declared type name
    Typed { type_name: String, data: Value },
}

impl Resource {
    /// Resource identified by a plain name
    pub fn named(name: impl Into<String>) -> Self {
        Resource::Scalar(Value::String(name.into()))
    }

    /// Structured resource with an explicit type name
    pub fn typed(type_name: impl Into<String>, data: Value) -> Self {
        Resource::Typed {
            type_name: type_name.into(),
            data,
        }
    }

    /// Structured resource built from any serializable host value.
    ///
    /// The declared type name is the last path segment of `T`'s Rust type
    /// name, so `my_app::model::Invoice` becomes `Invoice`.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        let full = std::any::type_name::<T>();
        let base = full.split('<').next().unwrap_or(full);
        let type_name = base.rsplit("::").next().unwrap_or(base).to_string();
        Ok(Resource::Typed {
            type_name,
            data: serde_json::to_value(value)?,
        })
    }

    /// Object graph walked by path lookups
    pub fn data(&self) -> &Value {
        match self {
            Resource::Scalar(v) => v,
            Resource::Typed { data, .. } => data,
        }
    }

    /// Name used when no custom resolver claims the resource
    pub fn default_name(&self) -> String {
        match self {
            Resource::Typed { type_name, .. } => type_name.clone(),
            Resource::Scalar(Value::String(s)) => s.clone(),
            Resource::Scalar(other) => other.to_string(),
        }
    }
}

impl From<&str> for Resource {
    fn from(name: &str) -> Self {
        Resource::named(name)
    }
}

impl From<String> for Resource {
    fn from(name: String) -> Self {
        Resource::named(name)
    }
}

/// Maps a resource to the name its statements are indexed under.
///
/// Returning `None` defers to the next resolver in the chain.
pub trait ResourceNameResolver: Send + Sync {
    fn resolve(&self, resource: &Resource) -> Option<String>;
}

impl<F> ResourceNameResolver for F
where
    F: Fn(&Resource) -> Option<String> + Send + Sync,
{
    fn resolve(&self, resource: &Resource) -> Option<String> {
        self(resource)
    }
}
