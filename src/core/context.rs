//! Per-query evaluation context
//!
//! A [`Context`] is a read-only snapshot of everything markers and
//! conditions may look at while one query runs. It borrows from the
//! caller and the engine, is built fresh per query and is never mutated by
//! evaluators.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::manager::Manager;
use super::marker::{Environment, RequestData};
use super::resource::Resource;

static NULL: Value = Value::Null;

#[derive(Clone, Copy)]
pub struct Context<'a> {
    engine: Option<&'a Manager>,
    resource: Option<&'a Resource>,
    action: Option<&'a str>,
    args: Option<&'a Value>,
    extra: Option<&'a Map<String, Value>>,
    request: Option<&'a RequestData>,
    env: Option<&'a Environment>,
    now: DateTime<Utc>,
}

impl<'a> Context<'a> {
    /// Empty context pinned to the given instant
    pub fn new(now: DateTime<Utc>) -> Self {
        Context {
            engine: None,
            resource: None,
            action: None,
            args: None,
            extra: None,
            request: None,
            env: None,
            now,
        }
    }

    pub fn with_engine(mut self, engine: &'a Manager) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_resource(mut self, resource: &'a Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_action(mut self, action: Option<&'a str>) -> Self {
        self.action = action;
        self
    }

    pub fn with_args(mut self, args: &'a Value) -> Self {
        self.args = Some(args);
        self
    }

    /// Custom properties configured at bootstrap
    pub fn with_extra(mut self, extra: &'a Map<String, Value>) -> Self {
        self.extra = Some(extra);
        self
    }

    pub fn with_request(mut self, request: &'a RequestData) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_env(mut self, env: &'a Environment) -> Self {
        self.env = Some(env);
        self
    }

    /// Engine that built this context, if any
    pub fn engine(&self) -> Option<&'a Manager> {
        self.engine
    }

    pub fn resource(&self) -> Option<&'a Resource> {
        self.resource
    }

    pub fn action(&self) -> Option<&'a str> {
        self.action
    }

    /// Inline query arguments (`Null` when none were given)
    pub fn args(&self) -> &'a Value {
        self.args.unwrap_or(&NULL)
    }

    /// A custom property configured at bootstrap
    pub fn extra(&self, key: &str) -> Option<&'a Value> {
        self.extra.and_then(|m| m.get(key))
    }

    pub fn request(&self) -> Option<&'a RequestData> {
        self.request
    }

    pub fn env(&self) -> Option<&'a Environment> {
        self.env
    }

    /// Evaluation instant, fixed for the whole query
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("resource", &self.resource)
            .field("action", &self.action)
            .field("args", &self.args)
            .field("extra", &self.extra)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_context_defaults() {
        let ctx = Context::new(Utc::now());
        assert!(ctx.resource().is_none());
        assert!(ctx.action().is_none());
        assert_eq!(ctx.args(), &Value::Null);
        assert!(ctx.extra("tenant").is_none());
    }

    #[test]
    fn test_builder_borrows_values() {
        let resource = Resource::named("Report");
        let args = json!({"role": "admin"});
        let mut extra = Map::new();
        extra.insert("tenant".into(), json!("acme"));

        let ctx = Context::new(Utc::now())
            .with_resource(&resource)
            .with_action(Some("view"))
            .with_args(&args)
            .with_extra(&extra);

        assert_eq!(ctx.resource(), Some(&resource));
        assert_eq!(ctx.action(), Some("view"));
        assert_eq!(ctx.args()["role"], json!("admin"));
        assert_eq!(ctx.extra("tenant"), Some(&json!("acme")));
    }
}
