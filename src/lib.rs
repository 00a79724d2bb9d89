//! # rampart
//!
//! Transaction-scoped web application firewall engine in pure Rust.
//!
//! The engine evaluates HTTP transactions against a compiled rule group in
//! the five classic phases: request headers, request body, response headers,
//! response body and logging. Rules combine variable selectors, a
//! transformation pipeline, an operator and actions; a disruptive action
//! raises an [`Interruption`] that tells the embedding host what to do with
//! the transaction.
//!
//! ## Quick start
//!
//! ```ignore
//! use rampart::{Rule, RuleGroup, Waf, WafConfig};
//! use rampart::variables::VariableKind;
//!
//! let mut rule = Rule::new();
//! rule.add_variable(VariableKind::Args, "", false)?;
//! rule.set_operator("detectSQLi", "", false)?;
//! rule.add_action("id", "9421")?;
//! rule.add_action("phase", "2")?;
//! rule.add_action("deny", "")?;
//! rule.add_action("status", "403")?;
//!
//! let mut rules = RuleGroup::new();
//! rules.add(rule)?;
//! let waf = Waf::new(WafConfig::default(), rules);
//!
//! let mut tx = waf.new_transaction();
//! tx.process_connection("203.0.113.7", 54321, "198.51.100.1", 443);
//! tx.process_uri("/search?q=1%27%20OR%201=1--", "GET", "HTTP/1.1");
//! tx.process_request_headers();
//! if let Some(interruption) = tx.process_request_body() {
//!     println!("blocked: status={}", interruption.status);
//! }
//! tx.process_logging();
//! tx.close()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod actions;
pub mod audit;
pub mod bodybuffer;
pub mod bodyprocessors;
pub mod engine;
pub mod error;
pub mod injection;
pub mod macros;
pub mod operators;
pub mod transformations;
pub mod variables;

// Re-export the embedding surface at the crate root
pub use audit::{AuditLog, AuditParts, AuditWriter, TracingAuditWriter};
pub use engine::{
    AllowType, AuditEngineStatus, BodyLimitAction, Interruption, InterruptionKind, MatchedRule,
    Phase, Rule, RuleEngineStatus, RuleGroup, Severity, Transaction, Waf, WafConfig,
};
pub use error::{Error, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
