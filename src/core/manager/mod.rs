//! Policy engine entry point
//!
//! [`Manager`] builds the policy tree once at bootstrap and answers queries
//! against it:
//!
//! 1. the resource is mapped to a name (custom resolver chain, then the
//!    resource's own name)
//! 2. candidates are looked up under `name::action`, then `name::*`, then
//!    `*::*`; the first non-empty bucket is used
//! 3. the best applicable candidate is selected: the last applicable one
//!    wins, except that an enforced match can only be replaced by another
//!    enforced match
//! 4. its effect is compared with the stemmed query word
//!
//! Nothing is cached between queries except compiled patterns.

mod effect;

pub use effect::EffectStemmer;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::condition::{ConditionEvaluator, ConditionManager, DEFAULT_PATTERN_CACHE};
use super::context::Context;
use super::expression::ExpressionParser;
use super::marker::{Environment, MarkerManager, MarkerResolver, RequestData};
use super::policy::{statement_key, Candidate, PolicyParser, Tree, WILDCARD};
use super::resource::{Resource, ResourceNameResolver};
use super::verdict::Verdict;
use crate::config::EngineConfig;
use crate::error::{PolicyError, Result};

/// Wall-clock source used for `DATETIME` markers
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Error type a deferred policy supplier may fail with
pub type SupplierError = Box<dyn std::error::Error + Send + Sync>;

type Supplier = Box<dyn FnOnce() -> std::result::Result<Vec<Value>, SupplierError> + Send>;

/// Where bootstrap gets its policy documents from
pub enum PolicySource {
    Documents(Vec<Value>),
    /// Called exactly once, during bootstrap
    Supplier(Supplier),
}

impl fmt::Debug for PolicySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicySource::Documents(docs) => f.debug_tuple("Documents").field(&docs.len()).finish(),
            PolicySource::Supplier(_) => f.write_str("Supplier"),
        }
    }
}

/// Bootstrap configuration
pub struct Options {
    pub policies: PolicySource,
    /// Extra properties visible to every query context
    pub context: Map<String, Value>,
    /// Resource-name resolvers, tried in order
    pub custom_resources: Vec<Arc<dyn ResourceNameResolver>>,
    /// Query word → effect stem
    pub custom_effects: Vec<(String, String)>,
    pub custom_conditions: Vec<(String, Arc<dyn ConditionEvaluator>)>,
    pub custom_markers: Vec<(String, Arc<dyn MarkerResolver>)>,
    /// Default request data for `HTTP_*` markers
    pub request: RequestData,
    /// Environment snapshot for `ENV` markers
    pub env: Environment,
    pub clock: Clock,
    pub pattern_cache_capacity: usize,
}

impl Options {
    pub fn new(documents: Vec<Value>) -> Self {
        Self::with_source(PolicySource::Documents(documents))
    }

    /// Defer loading the documents to bootstrap
    pub fn from_supplier<F>(supplier: F) -> Self
    where
        F: FnOnce() -> std::result::Result<Vec<Value>, SupplierError> + Send + 'static,
    {
        Self::with_source(PolicySource::Supplier(Box::new(supplier)))
    }

    fn with_source(policies: PolicySource) -> Self {
        Options {
            policies,
            context: Map::new(),
            custom_resources: Vec::new(),
            custom_effects: Vec::new(),
            custom_conditions: Vec::new(),
            custom_markers: Vec::new(),
            request: RequestData::default(),
            env: Environment::default(),
            clock: Arc::new(Utc::now),
            pattern_cache_capacity: DEFAULT_PATTERN_CACHE,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_resource_resolver(mut self, resolver: Arc<dyn ResourceNameResolver>) -> Self {
        self.custom_resources.push(resolver);
        self
    }

    pub fn with_effect(mut self, word: impl Into<String>, stem: impl Into<String>) -> Self {
        self.custom_effects.push((word.into(), stem.into()));
        self
    }

    pub fn with_condition(
        mut self,
        name: impl Into<String>,
        evaluator: Arc<dyn ConditionEvaluator>,
    ) -> Self {
        self.custom_conditions.push((name.into(), evaluator));
        self
    }

    pub fn with_marker(mut self, tag: impl Into<String>, resolver: Arc<dyn MarkerResolver>) -> Self {
        self.custom_markers.push((tag.into(), resolver));
        self
    }

    pub fn with_request(mut self, request: RequestData) -> Self {
        self.request = request;
        self
    }

    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_pattern_cache_capacity(mut self, capacity: usize) -> Self {
        self.pattern_cache_capacity = capacity;
        self
    }

    /// Apply the declarative parts of a loaded configuration.
    ///
    /// Context entries and effects are added, environment variables are
    /// merged over the current snapshot.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.context.extend(config.context);
        self.custom_effects.extend(config.effects);
        self.env.extend(config.env);
        if let Some(capacity) = config.pattern_cache_capacity {
            self.pattern_cache_capacity = capacity;
        }
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("policies", &self.policies)
            .field("context", &self.context)
            .field("custom_resources", &self.custom_resources.len())
            .field("custom_effects", &self.custom_effects)
            .field("pattern_cache_capacity", &self.pattern_cache_capacity)
            .finish_non_exhaustive()
    }
}

/// Declarative policy engine
pub struct Manager {
    tree: Tree,
    markers: MarkerManager,
    conditions: ConditionManager,
    effects: EffectStemmer,
    resolvers: Vec<Arc<dyn ResourceNameResolver>>,
    context: Map<String, Value>,
    request: RequestData,
    env: Environment,
    clock: Clock,
}

impl Manager {
    /// Build the policy tree and registries.
    ///
    /// Fails when the supplier fails or a document is structurally invalid.
    pub fn bootstrap(options: Options) -> Result<Self> {
        let Options {
            policies,
            context,
            custom_resources,
            custom_effects,
            custom_conditions,
            custom_markers,
            request,
            env,
            clock,
            pattern_cache_capacity,
        } = options;

        let documents = match policies {
            PolicySource::Documents(documents) => documents,
            PolicySource::Supplier(supply) => {
                supply().map_err(|e| PolicyError::PolicySupplier(e.to_string()))?
            }
        };

        let tree = PolicyParser::parse(&documents)?;
        info!(
            documents = documents.len(),
            statement_keys = tree.statement_keys().len(),
            statements = tree.statement_count(),
            params = tree.param_count(),
            "policy tree built"
        );

        Ok(Manager {
            tree,
            markers: MarkerManager::with_custom(custom_markers),
            conditions: ConditionManager::with_custom(custom_conditions, pattern_cache_capacity),
            effects: EffectStemmer::with_custom(custom_effects),
            resolvers: custom_resources,
            context,
            request,
            env,
            clock,
        })
    }

    /// Does `effect` apply to `action` on `resource`?
    ///
    /// Returns `default` when no bucket holds candidates or no candidate is
    /// applicable.
    pub fn is(
        &self,
        resource: &Resource,
        effect: &str,
        action: Option<&str>,
        default: Verdict,
        args: Option<&Value>,
    ) -> Result<Verdict> {
        self.decide(resource, effect, action, default, args, None)
    }

    /// Builder form of [`Manager::is`]
    pub fn query<'q>(&self, effect: &'q str, resource: impl Into<Resource>) -> Query<'_, 'q> {
        Query {
            manager: self,
            effect,
            resource: resource.into(),
            action: None,
            default: Verdict::Undetermined,
            args: None,
            request: None,
        }
    }

    pub fn is_allowed(
        &self,
        resource: &Resource,
        action: Option<&str>,
        args: Option<&Value>,
    ) -> Result<Verdict> {
        self.is(resource, "allowed", action, Verdict::Undetermined, args)
    }

    pub fn is_denied(
        &self,
        resource: &Resource,
        action: Option<&str>,
        args: Option<&Value>,
    ) -> Result<Verdict> {
        self.is(resource, "denied", action, Verdict::Undetermined, args)
    }

    /// Value of the best applicable definition of `name`, or `default`
    pub fn get_param(&self, name: &str, default: Value, args: Option<&Value>) -> Result<Value> {
        self.resolve_param(name, default, args, None)
    }

    /// Builder form of [`Manager::get_param`]
    pub fn param<'q>(&self, name: &'q str) -> ParamQuery<'_, 'q> {
        ParamQuery {
            manager: self,
            name,
            default: Value::Null,
            args: None,
            request: None,
        }
    }

    /// Name a resource's statements are indexed under
    pub fn resource_name(&self, resource: &Resource) -> String {
        self.resolvers
            .iter()
            .find_map(|resolver| resolver.resolve(resource))
            .unwrap_or_else(|| resource.default_name())
    }

    /// Stem of a query effect word
    pub fn stem(&self, effect: &str) -> String {
        self.effects.stem(effect)
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn markers(&self) -> &MarkerManager {
        &self.markers
    }

    pub fn conditions(&self) -> &ConditionManager {
        &self.conditions
    }

    fn context<'a>(
        &'a self,
        resource: Option<&'a Resource>,
        action: Option<&'a str>,
        args: Option<&'a Value>,
        request: Option<&'a RequestData>,
    ) -> Context<'a> {
        let mut context = Context::new((self.clock)())
            .with_engine(self)
            .with_action(action)
            .with_extra(&self.context)
            .with_request(request.unwrap_or(&self.request))
            .with_env(&self.env);
        if let Some(resource) = resource {
            context = context.with_resource(resource);
        }
        if let Some(args) = args {
            context = context.with_args(args);
        }
        context
    }

    fn decide(
        &self,
        resource: &Resource,
        effect: &str,
        action: Option<&str>,
        default: Verdict,
        args: Option<&Value>,
        request: Option<&RequestData>,
    ) -> Result<Verdict> {
        let name = self.resource_name(resource);
        let action_key = action.unwrap_or(WILDCARD);

        let keys = [
            statement_key(&name, action_key),
            statement_key(&name, WILDCARD),
            statement_key(WILDCARD, WILDCARD),
        ];
        let Some((key, bucket)) = keys.iter().find_map(|key| {
            let bucket = self.tree.statements(key);
            (!bucket.is_empty()).then_some((key, bucket))
        }) else {
            debug!(resource = %name, action = action_key, "no statements, using default");
            return Ok(default);
        };

        let context = self.context(Some(resource), action, args, request);
        let winner = self.best_candidate(bucket.iter().map(Arc::as_ref), &context)?;

        let Some((index, statement)) = winner else {
            debug!(resource = %name, key = %key, "no applicable statement, using default");
            return Ok(default);
        };

        let wanted = self.effects.stem(effect);
        let verdict = Verdict::from(statement.effect == wanted);
        debug!(
            resource = %name,
            key = %key,
            index,
            sid = statement.sid.as_deref().unwrap_or(""),
            enforced = statement.enforce,
            effect = %statement.effect,
            wanted = %wanted,
            ?verdict,
            "statement selected"
        );
        Ok(verdict)
    }

    fn resolve_param(
        &self,
        name: &str,
        default: Value,
        args: Option<&Value>,
        request: Option<&RequestData>,
    ) -> Result<Value> {
        let definitions = self.tree.params(name);
        if definitions.is_empty() {
            return Ok(default);
        }

        let context = self.context(None, None, args, request);
        match self.best_candidate(definitions, &context)? {
            Some((index, param)) => {
                debug!(param = name, index, enforced = param.enforce, "param selected");
                Ok(param.value.clone())
            }
            None => {
                debug!(param = name, "no applicable definition, using default");
                Ok(default)
            }
        }
    }

    /// Pick the winning candidate of a bucket.
    ///
    /// The first applicable candidate becomes the winner. A later applicable
    /// candidate replaces it if it is enforced itself or the current winner
    /// is not.
    fn best_candidate<'c, C, I>(
        &self,
        candidates: I,
        context: &Context<'_>,
    ) -> Result<Option<(usize, &'c C)>>
    where
        C: Candidate + 'c,
        I: IntoIterator<Item = &'c C>,
    {
        let mut winner: Option<(usize, &'c C)> = None;

        for (index, candidate) in candidates.into_iter().enumerate() {
            if !self.is_applicable(candidate, context)? {
                continue;
            }
            let replace = match winner {
                None => true,
                Some((_, current)) => candidate.is_enforced() || !current.is_enforced(),
            };
            if replace {
                winner = Some((index, candidate));
            }
        }

        Ok(winner)
    }

    /// No condition means applicable; otherwise the condition must hold
    fn is_applicable<C: Candidate>(&self, candidate: &C, context: &Context<'_>) -> Result<bool> {
        let Some(group) = candidate.condition() else {
            return Ok(true);
        };
        let resolved = ExpressionParser::new(&self.markers).resolve_group(group, context);
        Ok(self.conditions.evaluate(&resolved)?.is_yes())
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("statements", &self.tree.statement_count())
            .field("params", &self.tree.param_count())
            .field("markers", &self.markers)
            .field("conditions", &self.conditions)
            .field("effects", &self.effects)
            .field("resolvers", &self.resolvers.len())
            .finish_non_exhaustive()
    }
}

/// Statement query under construction
#[must_use = "a query does nothing until `check` is called"]
pub struct Query<'m, 'q> {
    manager: &'m Manager,
    effect: &'q str,
    resource: Resource,
    action: Option<&'q str>,
    default: Verdict,
    args: Option<&'q Value>,
    request: Option<&'q RequestData>,
}

impl<'m, 'q> Query<'m, 'q> {
    pub fn action(mut self, action: &'q str) -> Self {
        self.action = Some(action);
        self
    }

    /// Result when no statement applies (undetermined unless set)
    pub fn default(mut self, default: impl Into<Verdict>) -> Self {
        self.default = default.into();
        self
    }

    pub fn args(mut self, args: &'q Value) -> Self {
        self.args = Some(args);
        self
    }

    /// Request data for this query only
    pub fn request(mut self, request: &'q RequestData) -> Self {
        self.request = Some(request);
        self
    }

    pub fn check(self) -> Result<Verdict> {
        self.manager.decide(
            &self.resource,
            self.effect,
            self.action,
            self.default,
            self.args,
            self.request,
        )
    }
}

/// Param query under construction
#[must_use = "a param query does nothing until `get` is called"]
pub struct ParamQuery<'m, 'q> {
    manager: &'m Manager,
    name: &'q str,
    default: Value,
    args: Option<&'q Value>,
    request: Option<&'q RequestData>,
}

impl<'m, 'q> ParamQuery<'m, 'q> {
    pub fn default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }

    pub fn args(mut self, args: &'q Value) -> Self {
        self.args = Some(args);
        self
    }

    pub fn request(mut self, request: &'q RequestData) -> Self {
        self.request = Some(request);
        self
    }

    pub fn get(self) -> Result<Value> {
        self.manager
            .resolve_param(self.name, self.default, self.args, self.request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::condition::{Operator, ResolvedRow};
    use chrono::TimeZone;
    use serde_json::json;

    fn engine(documents: Vec<Value>) -> Manager {
        Manager::bootstrap(Options::new(documents)).unwrap()
    }

    #[test]
    fn test_manager_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Manager>();
    }

    #[test]
    fn test_unconditioned_statement_applies() {
        let manager = engine(vec![json!({
            "Statement": [{"Resource": "Doc", "Action": "read", "Effect": "allow"}]
        })]);
        let doc = Resource::named("Doc");

        assert_eq!(manager.is_allowed(&doc, Some("read"), None).unwrap(), Verdict::Yes);
        assert_eq!(manager.is_denied(&doc, Some("read"), None).unwrap(), Verdict::No);
        assert_eq!(
            manager.is_allowed(&doc, Some("write"), None).unwrap(),
            Verdict::Undetermined
        );
    }

    #[test]
    fn test_default_is_returned_without_candidates() {
        let manager = engine(vec![]);
        let verdict = manager
            .query("allowed", "Doc")
            .action("read")
            .default(false)
            .check()
            .unwrap();
        assert_eq!(verdict, Verdict::No);
    }

    #[test]
    fn test_first_non_empty_bucket_wins() {
        let manager = engine(vec![json!({
            "Statement": [
                {"Resource": "Doc", "Action": "read", "Effect": "allow",
                 "Condition": {"Equals": [{"left": "${ARGS.ok}", "right": true}]}},
                {"Resource": "Doc", "Effect": "deny"}
            ]
        })]);
        let args = json!({"ok": false});

        // `Doc::read` has candidates, so `Doc::*` is never consulted
        let verdict = manager
            .query("denied", "Doc")
            .action("read")
            .args(&args)
            .check()
            .unwrap();
        assert_eq!(verdict, Verdict::Undetermined);
    }

    #[test]
    fn test_enforced_tier() {
        let manager = engine(vec![json!({
            "Statement": [
                {"Resource": "Doc", "Effect": "deny", "Enforce": true},
                {"Resource": "Doc", "Effect": "allow"},
                {"Resource": "Doc", "Effect": "audit", "Enforce": true},
            ]
        })]);
        let doc = Resource::named("Doc");

        assert_eq!(
            manager.is(&doc, "audit", None, Verdict::Undetermined, None).unwrap(),
            Verdict::Yes
        );
    }

    #[test]
    fn test_resource_resolver_chain() {
        let by_kind: Arc<dyn ResourceNameResolver> = Arc::new(|r: &Resource| match r {
            Resource::Typed { data, .. } => data["kind"].as_str().map(str::to_string),
            _ => None,
        });
        let manager = Manager::bootstrap(
            Options::new(vec![json!({
                "Statement": [
                    {"Resource": "Contract", "Effect": "allow"},
                    {"Resource": "Doc", "Effect": "deny"}
                ]
            })])
            .with_resource_resolver(by_kind),
        )
        .unwrap();

        let contract = Resource::typed("Doc", json!({"kind": "Contract"}));
        let plain = Resource::typed("Doc", json!({}));
        assert_eq!(manager.resource_name(&contract), "Contract");
        assert_eq!(manager.is_allowed(&contract, None, None).unwrap(), Verdict::Yes);
        assert_eq!(manager.is_allowed(&plain, None, None).unwrap(), Verdict::No);
    }

    #[test]
    fn test_custom_effect_word() {
        let manager = Manager::bootstrap(
            Options::new(vec![json!({
                "Statement": [{"Resource": "Doc", "Effect": "audit"}]
            })])
            .with_effect("Audited", "audit"),
        )
        .unwrap();

        let verdict = manager.query("Audited", "Doc").check().unwrap();
        assert_eq!(verdict, Verdict::Yes);
    }

    #[test]
    fn test_custom_condition_and_marker() {
        let even: Arc<dyn ConditionEvaluator> =
            Arc::new(|rows: &[ResolvedRow], _op: Operator| -> Result<bool> {
                Ok(rows.iter().all(|r| r.left.as_i64().is_some_and(|n| n % 2 == 0)))
            });
        let tenant: Arc<dyn MarkerResolver> = Arc::new(|path: &str, ctx: &Context<'_>| {
            ctx.extra("tenant").and_then(|t| t.get(path)).cloned()
        });

        let manager = Manager::bootstrap(
            Options::new(vec![json!({
                "Statement": [{"Resource": "Doc", "Effect": "allow", "Condition": {
                    "IsEven": [{"left": "${ARGS.n}", "right": null}],
                    "Equals": [{"left": "${TENANT.plan}", "right": "pro"}]
                }}]
            })])
            .with_condition("IsEven", even)
            .with_marker("TENANT", tenant)
            .with_context("tenant", json!({"plan": "pro"})),
        )
        .unwrap();

        let even_args = json!({"n": 4});
        let odd_args = json!({"n": 3});
        let doc = Resource::named("Doc");
        assert_eq!(manager.is_allowed(&doc, None, Some(&even_args)).unwrap(), Verdict::Yes);
        assert_eq!(
            manager.is_allowed(&doc, None, Some(&odd_args)).unwrap(),
            Verdict::Undetermined
        );
    }

    #[test]
    fn test_clock_injection() {
        let clock: Clock = Arc::new(|| Utc.with_ymd_and_hms(2024, 1, 6, 12, 0, 0).unwrap());
        let manager = Manager::bootstrap(
            Options::new(vec![json!({
                "Statement": [{"Resource": "Shop", "Action": "open", "Effect": "allow",
                    "Condition": {"In": [{"left": "${DATETIME.%a}", "right": ["Sat", "Sun"]}]}}]
            })])
            .with_clock(clock),
        )
        .unwrap();

        let verdict = manager.query("allowed", "Shop").action("open").check().unwrap();
        assert_eq!(verdict, Verdict::Yes);
    }

    #[test]
    fn test_supplier() {
        let manager = Manager::bootstrap(Options::from_supplier(|| {
            Ok(vec![json!({"Statement": [{"Resource": "*", "Effect": "deny"}]})])
        }))
        .unwrap();
        assert_eq!(manager.tree().statement_count(), 1);

        let err = Manager::bootstrap(Options::from_supplier(|| Err("store offline".into())))
            .unwrap_err();
        assert!(matches!(err, PolicyError::PolicySupplier(ref msg) if msg == "store offline"));
    }

    #[test]
    fn test_bootstrap_rejects_invalid_documents() {
        let err = Manager::bootstrap(Options::new(vec![json!({
            "Statement": [{"Resource": "Doc"}]
        })]))
        .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidDocument { document: 0, .. }));
    }

    #[test]
    fn test_param_default_and_override() {
        let manager = engine(vec![json!({
            "Param": {
                "page.size": [
                    {"Value": 20},
                    {"Value": 100, "Condition": {"Equals": [{"left": "${ARGS.role}", "right": "admin"}]}}
                ]
            }
        })]);
        let admin = json!({"role": "admin"});
        let guest = json!({"role": "guest"});

        assert_eq!(manager.get_param("page.size", json!(10), Some(&admin)).unwrap(), json!(100));
        assert_eq!(manager.get_param("page.size", json!(10), Some(&guest)).unwrap(), json!(20));
        assert_eq!(manager.param("missing").default(json!("x")).get().unwrap(), json!("x"));
    }

    #[test]
    fn test_per_query_request_override() {
        let manager = Manager::bootstrap(
            Options::new(vec![json!({
                "Statement": [{"Resource": "Api", "Effect": "allow",
                    "Condition": {"Equals": [{"left": "${HTTP_GET.token}", "right": "s3cret"}]}}]
            })])
            .with_request(RequestData::new().with_get(json!({"token": "nope"}))),
        )
        .unwrap();

        assert_eq!(
            manager.query("allowed", "Api").check().unwrap(),
            Verdict::Undetermined
        );
        let request = RequestData::new().with_get(json!({"token": "s3cret"}));
        assert_eq!(
            manager.query("allowed", "Api").request(&request).check().unwrap(),
            Verdict::Yes
        );
    }
}
