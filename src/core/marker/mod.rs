//! Marker resolution
//!
//! A marker names a runtime value source (`ARGS`, `ENV`, `HTTP_GET`, ...)
//! plus a path inside it. [`MarkerManager`] maps source tags to
//! [`MarkerResolver`]s. Tags without a resolver are looked up in the
//! resource object graph instead.
//!
//! Every source reads injected state only: request data and environment
//! come from the engine options or the query, the clock is pinned in the
//! [`Context`].

mod xpath;

pub use xpath::{get_value_by_xpath, normalize_path, walk};

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use super::context::Context;

/// Request data maps supplied by the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestData {
    #[serde(default)]
    pub cookie: Value,
    #[serde(default)]
    pub get: Value,
    #[serde(default)]
    pub post: Value,
    #[serde(default)]
    pub request: Value,
}

impl RequestData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookie(mut self, cookie: Value) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn with_get(mut self, get: Value) -> Self {
        self.get = get;
        self
    }

    pub fn with_post(mut self, post: Value) -> Self {
        self.post = post;
        self
    }

    pub fn with_request(mut self, request: Value) -> Self {
        self.request = request;
        self
    }
}

/// Snapshot of environment variables visible to `ENV` markers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current process environment
    pub fn from_process() -> Self {
        Environment {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Environment {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Merge `other` over this snapshot
    pub fn extend(&mut self, other: Environment) {
        self.vars.extend(other.vars);
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Resolves the path part of a marker for one source tag
pub trait MarkerResolver: Send + Sync {
    fn resolve(&self, path: &str, context: &Context<'_>) -> Option<Value>;
}

impl<F> MarkerResolver for F
where
    F: Fn(&str, &Context<'_>) -> Option<Value> + Send + Sync,
{
    fn resolve(&self, path: &str, context: &Context<'_>) -> Option<Value> {
        self(path, context)
    }
}

/// `ARGS`: inline query arguments
struct ArgsMarker;

impl MarkerResolver for ArgsMarker {
    fn resolve(&self, path: &str, context: &Context<'_>) -> Option<Value> {
        get_value_by_xpath(context.args(), path).cloned()
    }
}

/// `DATETIME`: evaluation instant rendered with a strftime pattern
struct DateTimeMarker;

impl MarkerResolver for DateTimeMarker {
    fn resolve(&self, path: &str, context: &Context<'_>) -> Option<Value> {
        if StrftimeItems::new(path).any(|item| matches!(item, Item::Error)) {
            return None;
        }
        let mut out = String::new();
        write!(
            out,
            "{}",
            context.now().format_with_items(StrftimeItems::new(path))
        )
        .ok()?;
        Some(Value::String(out))
    }
}

/// `ENV`: injected environment snapshot
struct EnvMarker;

impl MarkerResolver for EnvMarker {
    fn resolve(&self, path: &str, context: &Context<'_>) -> Option<Value> {
        context
            .env()?
            .get(path)
            .map(|v| Value::String(v.to_string()))
    }
}

#[derive(Clone, Copy)]
enum RequestSource {
    Cookie,
    Get,
    Post,
    Request,
}

/// `HTTP_*`: injected request data maps
struct RequestMarker(RequestSource);

impl MarkerResolver for RequestMarker {
    fn resolve(&self, path: &str, context: &Context<'_>) -> Option<Value> {
        let request = context.request()?;
        let map = match self.0 {
            RequestSource::Cookie => &request.cookie,
            RequestSource::Get => &request.get,
            RequestSource::Post => &request.post,
            RequestSource::Request => &request.request,
        };
        get_value_by_xpath(map, path).cloned()
    }
}

/// Registry of marker sources
#[derive(Clone)]
pub struct MarkerManager {
    resolvers: HashMap<String, Arc<dyn MarkerResolver>>,
}

impl MarkerManager {
    /// Manager with the built-in sources registered
    pub fn new() -> Self {
        let mut resolvers: HashMap<String, Arc<dyn MarkerResolver>> = HashMap::new();
        resolvers.insert("ARGS".into(), Arc::new(ArgsMarker));
        resolvers.insert("DATETIME".into(), Arc::new(DateTimeMarker));
        resolvers.insert("ENV".into(), Arc::new(EnvMarker));
        resolvers.insert(
            "HTTP_COOKIE".into(),
            Arc::new(RequestMarker(RequestSource::Cookie)),
        );
        resolvers.insert("HTTP_GET".into(), Arc::new(RequestMarker(RequestSource::Get)));
        resolvers.insert(
            "HTTP_POST".into(),
            Arc::new(RequestMarker(RequestSource::Post)),
        );
        resolvers.insert(
            "HTTP_REQUEST".into(),
            Arc::new(RequestMarker(RequestSource::Request)),
        );
        MarkerManager { resolvers }
    }

    /// Built-ins with `custom` merged over them, later entries winning
    pub fn with_custom<I>(custom: I) -> Self
    where
        I: IntoIterator<Item = (String, Arc<dyn MarkerResolver>)>,
    {
        let mut manager = Self::new();
        for (tag, resolver) in custom {
            manager.register(tag, resolver);
        }
        manager
    }

    /// Register a source, replacing any resolver with the same tag
    pub fn register(&mut self, tag: impl Into<String>, resolver: Arc<dyn MarkerResolver>) {
        self.resolvers.insert(tag.into(), resolver);
    }

    pub fn has_source(&self, tag: &str) -> bool {
        self.resolvers.contains_key(tag)
    }

    /// Resolve `path` from the source named `source`.
    ///
    /// Unknown sources fall back to `resource.<path>` inside the resource
    /// object graph.
    pub fn get_value(&self, source: &str, path: &str, context: &Context<'_>) -> Option<Value> {
        match self.resolvers.get(source) {
            Some(resolver) => resolver.resolve(path, context),
            None => {
                trace!(source, path, "no marker source registered, reading resource");
                Self::resource_value(path, context)
            }
        }
    }

    fn resource_value(path: &str, context: &Context<'_>) -> Option<Value> {
        let resource = context.resource()?;
        let segments = normalize_path(&format!("resource.{path}"));
        // The leading `resource` component addresses the resource itself
        walk(resource.data(), &segments[1..]).cloned()
    }
}

impl Default for MarkerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MarkerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<&String> = self.resolvers.keys().collect();
        tags.sort();
        f.debug_struct("MarkerManager").field("sources", &tags).finish()
    }
}
