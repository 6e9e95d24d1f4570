//! # jsonpolicy-rs - Declarative JSON Policy Engine
//!
//! `jsonpolicy-rs` answers "does effect E apply to action A on resource R?"
//! from JSON policy documents, and resolves conditional configuration
//! parameters with the same rules.
//!
//! - **Statements** bind resources and actions to a free-form effect, gated by
//!   an optional condition tree and an `Enforce` flag
//! - **Params** are named values selected exactly like statements
//! - **Markers** (`${ARGS.role}`, `${ENV.APP_STAGE}`, `${DATETIME.%H}`, ...)
//!   pull runtime values into conditions
//! - Outcomes are tri-state: [`Verdict::Yes`], [`Verdict::No`] or
//!   [`Verdict::Undetermined`] when no rule applies
//!
//! ## Quick Start
//!
//! ```rust
//! use jsonpolicy_rs::{Manager, Options, Resource, Result, Verdict};
//! use serde_json::json;
//!
//! # fn main() -> Result<()> {
//! let manager = Manager::bootstrap(Options::new(vec![json!({
//!     "Statement": [{
//!         "Resource": "Report",
//!         "Action": "view",
//!         "Effect": "allow",
//!         "Condition": {
//!             "Equals": [{"left": "${ARGS.role}", "right": ["admin", "manager"]}]
//!         }
//!     }]
//! })]))?;
//!
//! let args = json!({"role": "manager"});
//! let verdict = manager
//!     .query("allowed", "Report")
//!     .action("view")
//!     .args(&args)
//!     .check()?;
//! assert_eq!(verdict, Verdict::Yes);
//!
//! let guest = json!({"role": "guest"});
//! let report = Resource::named("Report");
//! assert_eq!(
//!     manager.is_allowed(&report, Some("view"), Some(&guest))?,
//!     Verdict::Undetermined
//! );
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;

pub use crate::config::EngineConfig;
pub use crate::core::{
    condition::{ConditionEvaluator, ConditionGroup, Operator, ResolvedRow},
    context::Context,
    expression::ExpressionParser,
    manager::{
        Clock, EffectStemmer, Manager, Options, ParamQuery, PolicySource, Query, SupplierError,
    },
    marker::{get_value_by_xpath, Environment, MarkerManager, MarkerResolver, RequestData},
    policy::{Param, PolicyParser, Statement, Tree},
    resource::{Resource, ResourceNameResolver},
    verdict::Verdict,
};
pub use crate::error::{PolicyError, Result};
