//! Transaction engine: configuration, rule groups, phase evaluation.

pub mod group;
pub mod interruption;
pub mod phase;
pub mod rule;
pub mod severity;
pub mod transaction;

pub use group::RuleGroup;
pub use interruption::{Interruption, InterruptionKind};
pub use phase::Phase;
pub use rule::{MatchedRule, Rule};
pub use severity::Severity;
pub use transaction::Transaction;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use regex::Regex;

use crate::audit::{AuditParts, AuditWriter, TracingAuditWriter};
use crate::error::{Error, Result};
use crate::variables::TransactionVariables;

/// Rule-engine switch, settable globally and per transaction via
/// `ctl:ruleEngine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleEngineStatus {
    /// Evaluate rules and enforce disruptive actions.
    #[default]
    On,
    /// Do not evaluate rules at all.
    Off,
    /// Evaluate rules but suppress disruptive actions.
    DetectionOnly,
}

impl RuleEngineStatus {
    /// Parse a mode name, case-insensitive.
    pub fn parse(value: &str) -> Result<RuleEngineStatus> {
        match value.to_ascii_lowercase().as_str() {
            "on" => Ok(RuleEngineStatus::On),
            "off" => Ok(RuleEngineStatus::Off),
            "detectiononly" => Ok(RuleEngineStatus::DetectionOnly),
            other => Err(Error::config(format!("invalid rule engine mode {other:?}"))),
        }
    }

    /// Canonical mode name.
    pub fn name(&self) -> &'static str {
        match self {
            RuleEngineStatus::On => "On",
            RuleEngineStatus::Off => "Off",
            RuleEngineStatus::DetectionOnly => "DetectionOnly",
        }
    }
}

/// Audit-engine switch, settable via `ctl:auditEngine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditEngineStatus {
    /// Log every transaction.
    On,
    /// Log nothing.
    #[default]
    Off,
    /// Log only transactions that matched an auditable rule and whose
    /// status matches the configured relevant-status pattern.
    RelevantOnly,
}

impl AuditEngineStatus {
    /// Parse a mode name, case-insensitive.
    pub fn parse(value: &str) -> Result<AuditEngineStatus> {
        match value.to_ascii_lowercase().as_str() {
            "on" => Ok(AuditEngineStatus::On),
            "off" => Ok(AuditEngineStatus::Off),
            "relevantonly" => Ok(AuditEngineStatus::RelevantOnly),
            other => Err(Error::config(format!("invalid audit engine mode {other:?}"))),
        }
    }
}

/// What to do when a body write would exceed its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyLimitAction {
    /// Interrupt the transaction (413 for requests, 500 for responses).
    #[default]
    Reject,
    /// Keep the bytes that fit and evaluate the body phase on them.
    ProcessPartial,
}

/// Scope of a granted `allow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllowType {
    /// No allow in effect.
    #[default]
    Unset,
    /// Skip the remainder of the current phase.
    Phase,
    /// Skip through the end of phase 2.
    Request,
    /// Skip phases 2 through 4.
    All,
}

/// Engine-wide configuration. Each transaction copies the mutable knobs at
/// creation so `ctl` can override them per request.
#[derive(Clone)]
pub struct WafConfig {
    /// Initial rule engine mode.
    pub rule_engine: RuleEngineStatus,
    /// Initial audit engine mode.
    pub audit_engine: AuditEngineStatus,
    /// Sections of the audit record to assemble.
    pub audit_log_parts: AuditParts,
    /// Response statuses considered relevant when the audit engine is in
    /// `RelevantOnly` mode.
    pub audit_log_relevant_status: Option<Regex>,
    /// Destination for finished audit records.
    pub audit_writer: Arc<dyn AuditWriter>,
    /// Whether request bodies are buffered and inspected.
    pub request_body_access: bool,
    /// Whether response bodies are buffered and inspected.
    pub response_body_access: bool,
    /// Hard cap on buffered request body bytes.
    pub request_body_limit: u64,
    /// Bytes of request body kept in memory before spilling to disk.
    pub request_body_in_memory_limit: usize,
    /// What an over-limit request body does to the transaction.
    pub request_body_limit_action: BodyLimitAction,
    /// Hard cap on buffered response body bytes.
    pub response_body_limit: u64,
    /// What an over-limit response body does to the transaction.
    pub response_body_limit_action: BodyLimitAction,
    /// Content types whose response bodies are inspected.
    pub response_body_mime_types: Vec<String>,
    /// Maximum entries per argument map; excess is dropped with a warning.
    pub argument_limit: usize,
    /// Spill directory for body buffers. `None` keeps bodies in memory
    /// and makes the memory limit a hard limit.
    pub temp_dir: Option<PathBuf>,
    /// Component signatures reported in the audit trailer.
    pub component_names: Vec<String>,
}

impl Default for WafConfig {
    fn default() -> Self {
        WafConfig {
            rule_engine: RuleEngineStatus::On,
            audit_engine: AuditEngineStatus::Off,
            audit_log_parts: AuditParts::default(),
            audit_log_relevant_status: None,
            audit_writer: Arc::new(TracingAuditWriter),
            request_body_access: false,
            response_body_access: false,
            request_body_limit: 134_217_728,
            request_body_in_memory_limit: 131_072,
            request_body_limit_action: BodyLimitAction::Reject,
            response_body_limit: 524_288,
            response_body_limit_action: BodyLimitAction::ProcessPartial,
            response_body_mime_types: vec!["text/html".to_string(), "text/plain".to_string()],
            argument_limit: 1000,
            temp_dir: Some(std::env::temp_dir()),
            component_names: Vec::new(),
        }
    }
}

impl std::fmt::Debug for WafConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WafConfig")
            .field("rule_engine", &self.rule_engine)
            .field("audit_engine", &self.audit_engine)
            .field("request_body_limit", &self.request_body_limit)
            .field("response_body_limit", &self.response_body_limit)
            .finish_non_exhaustive()
    }
}

pub(crate) struct WafInner {
    pub(crate) config: WafConfig,
    pub(crate) rules: RuleGroup,
    /// Recycled variable stores; the maps inside are the expensive part of
    /// a transaction.
    pool: Mutex<Vec<TransactionVariables>>,
}

/// The engine: immutable rules plus configuration, shareable across
/// threads. Each request gets its own [`Transaction`].
#[derive(Clone)]
pub struct Waf {
    inner: Arc<WafInner>,
}

impl Waf {
    /// Build an engine from configuration and a rule group.
    pub fn new(config: WafConfig, rules: RuleGroup) -> Waf {
        Waf {
            inner: Arc::new(WafInner {
                config,
                rules,
                pool: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Begin processing one HTTP transaction.
    pub fn new_transaction(&self) -> Transaction {
        let variables = self
            .inner
            .pool
            .lock()
            .ok()
            .and_then(|mut pool| pool.pop())
            .unwrap_or_else(|| TransactionVariables::new(self.inner.config.argument_limit));
        Transaction::new(Arc::clone(&self.inner), variables)
    }

    /// The engine configuration.
    pub fn config(&self) -> &WafConfig {
        &self.inner.config
    }

    /// The compiled rule group.
    pub fn rules(&self) -> &RuleGroup {
        &self.inner.rules
    }
}

impl WafInner {
    /// Take a recycled variable store back. The caller has already reset it.
    pub(crate) fn recycle(&self, variables: TransactionVariables) {
        if let Ok(mut pool) = self.pool.lock() {
            if pool.len() < 64 {
                pool.push(variables);
            }
        }
    }
}

impl std::fmt::Debug for Waf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waf")
            .field("rules", &self.inner.rules.len())
            .field("config", &self.inner.config)
            .finish()
    }
}
