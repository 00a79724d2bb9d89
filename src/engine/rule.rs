//! Rules: selectors, operator, transformations, actions, chains.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::actions::{create_action, Action, ActionKind, TargetFilter};
use crate::error::Result;
use crate::macros::Macro;
use crate::operators::{create_operator, Operator, OperatorOptions};
use crate::transformations::{CacheKey, TransformationPipeline};
use crate::variables::{MatchData, SelectorKey, VariableKind};

use super::phase::Phase;
use super::severity::Severity;
use super::{RuleEngineStatus, Transaction};

/// One variable reference in a rule target list.
#[derive(Debug, Clone)]
pub(crate) struct Selector {
    pub kind: VariableKind,
    pub key: SelectorKey,
    /// Original key text, kept for display and the count form.
    pub raw_key: String,
    /// `&VAR` counts entries instead of matching them.
    pub count: bool,
}

impl Selector {
    #[cfg(feature = "multiphase")]
    fn min_phase(&self) -> Phase {
        self.kind.min_phase()
    }
}

/// A negated target (`!VAR` or `!VAR:key`) attached to a rule.
#[derive(Debug, Clone)]
struct Negation {
    kind: VariableKind,
    key: SelectorKey,
}

/// A rule assembled by the external policy parser.
///
/// Construction reports every configuration problem immediately; a built
/// rule cannot fail during evaluation.
#[derive(Clone, Default)]
pub struct Rule {
    id: u32,
    parent_id: u32,
    phase: Option<Phase>,
    marker: Option<String>,
    selectors: Vec<Selector>,
    negations: Vec<Negation>,
    operator: Option<Arc<dyn Operator>>,
    operator_negated: bool,
    transformations: TransformationPipeline,
    actions: Vec<Action>,
    msg: Option<Macro>,
    logdata: Option<Macro>,
    rev: String,
    ver: String,
    severity: Option<Severity>,
    tags: Vec<String>,
    maturity: u8,
    accuracy: u8,
    status: Option<u16>,
    capture: bool,
    multi_match: bool,
    log: bool,
    audit_log: bool,
    raw: String,
    chain: Option<Box<Rule>>,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("selectors", &self.selectors.len())
            .field("operator", &self.operator.as_ref().map(|o| o.name()))
            .field("chain", &self.chain.is_some())
            .finish()
    }
}

impl Rule {
    /// An empty rule: phase 2, always logging, no operator.
    pub fn new() -> Rule {
        Rule {
            phase: Some(Phase::default()),
            log: true,
            audit_log: true,
            ..Rule::default()
        }
    }

    /// A marker rule for `skipAfter`. Markers run in every phase and have
    /// no other effect.
    pub fn new_marker(name: impl Into<String>) -> Rule {
        Rule {
            marker: Some(name.into()),
            phase: None,
            ..Rule::new()
        }
    }

    /// Rule id, 0 when the rule has none.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Id of the owning chain parent, 0 outside chains.
    pub fn parent_id(&self) -> u32 {
        self.parent_id
    }

    /// Declared phase; `None` runs in every phase.
    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    /// Marker name for `SecMark`-style rules.
    pub fn marker_name(&self) -> Option<&str> {
        self.marker.as_deref()
    }

    /// Status set by the `status` action.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Unexpanded message template.
    pub fn msg_raw(&self) -> &str {
        self.msg.as_ref().map(Macro::raw).unwrap_or("")
    }

    /// Tags attached via the `tag` action.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Whether the rule writes to the error log.
    pub fn logs(&self) -> bool {
        self.log
    }

    /// Raw policy text the rule was built from, when the parser supplied it.
    pub fn raw_directive(&self) -> &str {
        &self.raw
    }

    /// Record the policy text this rule came from.
    pub fn set_raw(&mut self, raw: impl Into<String>) {
        self.raw = raw.into();
    }

    /// Add a target. `key` may be empty (whole collection), a literal, or a
    /// `/regex/`. `count` selects the `&VAR` form.
    pub fn add_variable(&mut self, kind: VariableKind, key: &str, count: bool) -> Result<()> {
        #[cfg(feature = "multiphase")]
        if matches!(kind, VariableKind::Args | VariableKind::ArgsNames) {
            let (get, post) = if kind == VariableKind::Args {
                (VariableKind::ArgsGet, VariableKind::ArgsPost)
            } else {
                (VariableKind::ArgsGetNames, VariableKind::ArgsPostNames)
            };
            self.push_selector(get, key, count)?;
            self.push_selector(post, key, count)?;
            return Ok(());
        }
        self.push_selector(kind, key, count)
    }

    fn push_selector(&mut self, kind: VariableKind, key: &str, count: bool) -> Result<()> {
        self.selectors.push(Selector {
            kind,
            key: SelectorKey::parse(key)?,
            raw_key: key.to_string(),
            count,
        });
        Ok(())
    }

    /// Exclude a key (or a whole variable, with an empty key) from this
    /// rule's targets.
    pub fn add_variable_negation(&mut self, kind: VariableKind, key: &str) -> Result<()> {
        self.negations.push(Negation {
            kind,
            key: SelectorKey::parse(&key.to_ascii_lowercase())?,
        });
        Ok(())
    }

    /// Append a transformation by name. `none` clears the pipeline.
    pub fn add_transformation(&mut self, name: &str) -> Result<()> {
        self.transformations.push(name)
    }

    /// Drop all transformations accumulated so far.
    pub fn clear_transformations(&mut self) {
        self.transformations.clear();
    }

    /// Set the operator from its name and raw argument.
    pub fn set_operator(&mut self, name: &str, arguments: &str, negated: bool) -> Result<()> {
        self.set_operator_with_options(
            name,
            OperatorOptions {
                arguments: arguments.to_string(),
                ..OperatorOptions::default()
            },
            negated,
        )
    }

    /// Set the operator with full options (datasets, search paths).
    pub fn set_operator_with_options(
        &mut self,
        name: &str,
        options: OperatorOptions,
        negated: bool,
    ) -> Result<()> {
        self.operator = Some(create_operator(name, options)?);
        self.operator_negated = negated;
        Ok(())
    }

    /// Add an action by name and raw argument. Metadata actions fold into
    /// the rule; the rest are stored for evaluation.
    pub fn add_action(&mut self, name: &str, argument: &str) -> Result<()> {
        let action = create_action(name, argument)?;
        match action {
            Action::Id(id) => self.id = id,
            Action::Phase(phase) => self.phase = Some(phase),
            Action::Rev(rev) => self.rev = rev,
            Action::Ver(ver) => self.ver = ver,
            Action::Severity(severity) => self.severity = Some(severity),
            Action::Msg(msg) => self.msg = Some(Macro::compile(&msg)?),
            Action::LogData(data) => self.logdata = Some(Macro::compile(&data)?),
            Action::Tag(tag) => self.tags.push(tag),
            Action::Maturity(m) => self.maturity = m,
            Action::Accuracy(a) => self.accuracy = a,
            Action::Status(status) => self.status = Some(status),
            Action::Capture => self.capture = true,
            Action::MultiMatch => self.multi_match = true,
            Action::Log => {
                self.log = true;
                self.audit_log = true;
            }
            Action::NoLog => {
                self.log = false;
                self.audit_log = false;
            }
            Action::AuditLog => self.audit_log = true,
            Action::NoAuditLog => self.audit_log = false,
            Action::Transform(name) => self.add_transformation(&name)?,
            Action::Chain => {}
            other => self.actions.push(other),
        }
        Ok(())
    }

    /// Append the next link of a chain. The chained rule inherits this
    /// rule's id as its parent id.
    pub fn add_chained_rule(&mut self, mut rule: Rule) {
        rule.parent_id = if self.parent_id != 0 {
            self.parent_id
        } else {
            self.id
        };
        match &mut self.chain {
            Some(next) => next.add_chained_rule(rule),
            None => self.chain = Some(Box::new(rule)),
        }
    }

    /// Whether this rule starts a chain.
    pub fn has_chain(&self) -> bool {
        self.chain.is_some()
    }

    fn levels(&self) -> impl Iterator<Item = &Rule> {
        std::iter::successors(Some(self), |rule| rule.chain.as_deref())
    }

    /// Whether the scheduler should run this rule in `phase`.
    pub(crate) fn runs_in(&self, phase: Phase) -> bool {
        match self.phase {
            None => true,
            Some(own) if own == phase => true,
            #[cfg(feature = "multiphase")]
            Some(_) => self.eligible_multiphase(phase),
            #[cfg(not(feature = "multiphase"))]
            Some(_) => false,
        }
    }

    #[cfg(feature = "multiphase")]
    fn level_floor(&self) -> Phase {
        self.selectors
            .iter()
            .map(Selector::min_phase)
            .min()
            .or(self.phase)
            .unwrap_or_default()
    }

    /// Earliest phase at which every chain level has at least one variable
    /// populated.
    #[cfg(feature = "multiphase")]
    fn chain_floor(&self) -> Phase {
        self.levels()
            .map(Rule::level_floor)
            .max()
            .unwrap_or_default()
    }

    #[cfg(feature = "multiphase")]
    fn eligible_multiphase(&self, phase: Phase) -> bool {
        let floor = self.chain_floor();
        if phase > Phase::ResponseBody || phase < floor {
            return false;
        }
        phase == floor
            || self
                .levels()
                .any(|rule| rule.selectors.iter().any(|s| s.min_phase() == phase))
    }

    #[cfg(feature = "multiphase")]
    fn selector_skipped(&self, selector: &Selector, phase: Phase) -> bool {
        if self.phase == Some(phase) {
            return false;
        }
        selector.min_phase() > phase
    }

    fn filter_applies(&self, filter: &TargetFilter) -> bool {
        match filter {
            TargetFilter::ById(id) => {
                *id != 0 && (*id == self.id || *id == self.parent_id)
            }
            TargetFilter::ByMsg(msg) => !msg.is_empty() && self.msg_raw().contains(msg.as_str()),
            TargetFilter::ByTag(tag) => self.tags.iter().any(|t| t == tag),
        }
    }

    /// Whether `key` (already lower-cased) is excluded for `kind`.
    fn key_excluded(kind: VariableKind, key: &str, negations: &[Negation]) -> bool {
        negations.iter().any(|n| {
            n.kind == kind
                && match &n.key {
                    SelectorKey::All => false,
                    SelectorKey::Str(s) => key == s.as_str(),
                    SelectorKey::Rx(re) => re.is_match(key),
                }
        })
    }

    fn whole_selector_removed(kind: VariableKind, negations: &[Negation]) -> bool {
        negations
            .iter()
            .any(|n| n.kind == kind && matches!(n.key, SelectorKey::All))
    }

    /// Transformed argument strings for one resolved value.
    fn derive_arguments(&self, md: &MatchData, index: usize, tx: &mut Transaction) -> Vec<String> {
        if self.multi_match {
            let (values, _errors) = self.transformations.apply_multi(&md.value);
            return values;
        }
        if self.transformations.is_empty() {
            return vec![md.value.clone()];
        }
        // TX entries mutate mid-phase, their transforms are never cached
        if md.variable == VariableKind::Tx {
            let (value, _errors) = self.transformations.apply(&md.value);
            return vec![value];
        }
        let key = CacheKey {
            variable: md.variable,
            index,
            key: md.key.clone(),
            set_id: self.transformations.set_id(),
        };
        if let Some(entry) = tx.transformation_cache.get(&key) {
            return vec![entry.value.clone()];
        }
        let (value, errors) = self.transformations.apply(&md.value);
        tx.transformation_cache.insert(key, value.clone(), errors);
        vec![value]
    }

    fn expand_into(&self, md: &mut MatchData, tx: &Transaction) {
        if let Some(msg) = &self.msg {
            md.message = msg.expand(tx.variables());
        }
        if let Some(data) = &self.logdata {
            md.data = data.expand(tx.variables());
        }
    }

    fn run_actions(&self, kind: ActionKind, tx: &mut Transaction) {
        for action in self.actions.iter().filter(|a| a.kind() == kind) {
            action.evaluate(self, tx);
        }
    }

    /// Evaluate one chain level, returning its matches.
    ///
    /// `defer_expansion` postpones message expansion for chain parents until
    /// the whole chain has matched.
    fn evaluate_level(
        &self,
        phase: Phase,
        tx: &mut Transaction,
        level: usize,
        defer_expansion: bool,
    ) -> Vec<MatchData> {
        tx.capture = self.capture;
        if self.capture {
            tx.variables_mut().reset_capture_slots();
        }

        let Some(operator) = self.operator.clone() else {
            // SecAction / marker: one synthetic match
            let mut md = MatchData {
                chain_level: level,
                ..MatchData::default()
            };
            if !defer_expansion {
                self.expand_into(&mut md, tx);
            }
            #[cfg(not(feature = "multiphase"))]
            self.run_actions(ActionKind::NonDisruptive, tx);
            return vec![md];
        };

        let _ = phase;
        let mut out = Vec::new();
        for selector in &self.selectors {
            #[cfg(feature = "multiphase")]
            if self.selector_skipped(selector, phase) {
                continue;
            }

            // dynamic target removals for this rule, unioned with the
            // rule's own negations
            let mut negations = self.negations.clone();
            let mut removed = Self::whole_selector_removed(selector.kind, &negations);
            for exception in tx
                .removed_targets
                .iter()
                .filter(|e| e.covers(selector.kind))
            {
                if !self.filter_applies(&exception.filter) {
                    continue;
                }
                if exception.key.is_empty() {
                    removed = true;
                    break;
                }
                negations.push(Negation {
                    kind: selector.kind,
                    key: SelectorKey::Str(exception.key.clone()),
                });
            }
            if removed {
                trace!(variable = selector.kind.name(), "selector removed by exception");
                continue;
            }

            let found = tx.variables().find(selector.kind, &selector.key);
            let pre_filter = found.len();
            let mut targets: Vec<MatchData> = found
                .into_iter()
                .filter(|md| {
                    !Self::key_excluded(selector.kind, &md.key.to_ascii_lowercase(), &negations)
                })
                .collect();
            if selector.count {
                targets = vec![MatchData {
                    variable: selector.kind,
                    key: selector.raw_key.clone(),
                    value: pre_filter.to_string(),
                    ..MatchData::default()
                }];
            }

            for (index, target) in targets.into_iter().enumerate() {
                for argument in self.derive_arguments(&target, index, tx) {
                    let hit = operator.evaluate(tx, &argument) != self.operator_negated;
                    if !hit {
                        continue;
                    }
                    let mut md = MatchData {
                        variable: target.variable,
                        key: target.key.clone(),
                        value: argument,
                        chain_level: level,
                        ..MatchData::default()
                    };
                    tx.variables_mut().match_variable(&md);
                    if !defer_expansion {
                        self.expand_into(&mut md, tx);
                    }
                    trace!(
                        variable = md.full_name().as_str(),
                        operator = operator.name(),
                        "rule target matched"
                    );
                    #[cfg(not(feature = "multiphase"))]
                    self.run_actions(ActionKind::NonDisruptive, tx);
                    out.push(md);
                }
            }
        }
        out
    }

    /// Evaluate the rule (and its chain) in `phase`. Returns whether the
    /// whole chain matched.
    pub(crate) fn evaluate(&self, phase: Phase, tx: &mut Transaction) -> bool {
        self.populate_rule_variables(tx);

        let mut combined: Vec<MatchData> = Vec::new();
        let mut level = 0usize;
        let mut current = Some(self);
        while let Some(rule) = current {
            let defer = level == 0 && self.has_chain();
            let mut matches = rule.evaluate_level(phase, tx, level, defer);
            if matches.is_empty() {
                return false;
            }
            combined.append(&mut matches);
            current = rule.chain.as_deref();
            level += 1;
        }

        // chain complete: expand the postponed parent messages
        if self.has_chain() {
            for md in combined.iter_mut().filter(|md| md.chain_level == 0) {
                self.expand_into(md, tx);
            }
        }

        #[cfg(feature = "multiphase")]
        {
            if self.id != 0 && tx.has_equivalent_match(self.id, &combined) {
                debug!(rule_id = self.id, "chain re-match dropped by dedup");
                return true;
            }
            for rule in self.levels() {
                rule.run_actions(ActionKind::NonDisruptive, tx);
            }
        }

        self.run_actions(ActionKind::Flow, tx);
        match tx.rule_engine {
            RuleEngineStatus::On => self.run_actions(ActionKind::Disruptive, tx),
            RuleEngineStatus::DetectionOnly => {
                for action in self.actions.iter().filter(|a| a.kind() == ActionKind::Disruptive) {
                    if let Some(interruption) = action.interruption_for(self, tx) {
                        debug!(
                            rule_id = self.id,
                            action = interruption.action.name(),
                            "detection only, disruptive action suppressed"
                        );
                        tx.detect_interruption(interruption);
                    }
                }
            }
            RuleEngineStatus::Off => {}
        }

        if self.id != 0 {
            tx.register_match(MatchedRule {
                rule_id: self.id,
                phase,
                severity: self.severity,
                msg: combined
                    .iter()
                    .find(|md| md.chain_level == 0)
                    .map(|md| md.message.clone())
                    .unwrap_or_default(),
                rev: self.rev.clone(),
                ver: self.ver.clone(),
                maturity: self.maturity,
                accuracy: self.accuracy,
                tags: self.tags.clone(),
                log: self.log,
                audit_log: self.audit_log,
                raw: self.raw.clone(),
                matches: combined,
            });
        }
        true
    }

    /// Fill the `RULE` collection so macros can reference the running rule.
    fn populate_rule_variables(&self, tx: &mut Transaction) {
        let severity = self.severity.map(|s| s.number().to_string());
        let msg = self.msg_raw().to_string();
        let logdata = self
            .logdata
            .as_ref()
            .map(Macro::raw)
            .unwrap_or("")
            .to_string();
        if let Some(map) = tx.variables_mut().map_mut(VariableKind::Rule) {
            map.clear();
            map.set("id", &self.id.to_string());
            map.set("msg", &msg);
            map.set("rev", &self.rev);
            map.set("logdata", &logdata);
            map.set("severity", severity.as_deref().unwrap_or(""));
        }
    }
}

/// Record of one fully matched rule.
#[derive(Debug, Clone)]
pub struct MatchedRule {
    /// Parent rule id.
    pub rule_id: u32,
    /// Phase the match happened in.
    pub phase: Phase,
    /// Severity from the rule, if any.
    pub severity: Option<Severity>,
    /// Expanded message of the parent level.
    pub msg: String,
    /// Revision string.
    pub rev: String,
    /// Version string.
    pub ver: String,
    /// Maturity level.
    pub maturity: u8,
    /// Accuracy level.
    pub accuracy: u8,
    /// Rule tags.
    pub tags: Vec<String>,
    /// Whether the rule logs.
    pub log: bool,
    /// Whether the rule takes part in audit logging.
    pub audit_log: bool,
    /// Raw policy text, when supplied.
    pub raw: String,
    /// One entry per matched target, across all chain levels.
    pub matches: Vec<MatchData>,
}

impl MatchedRule {
    /// Bracketed one-line summary in the classic error-log style.
    pub fn error_log(&self) -> String {
        let mut parts = vec![format!("[id \"{}\"]", self.rule_id)];
        if !self.msg.is_empty() {
            parts.push(format!("[msg \"{}\"]", self.msg));
        }
        if let Some(md) = self.matches.first() {
            if !md.data.is_empty() {
                parts.push(format!("[data \"{}\"]", md.data));
            }
            parts.push(format!("[matched \"{}\"]", md.full_name()));
        }
        if let Some(severity) = self.severity {
            parts.push(format!("[severity \"{}\"]", severity.name()));
        }
        if !self.rev.is_empty() {
            parts.push(format!("[rev \"{}\"]", self.rev));
        }
        if !self.ver.is_empty() {
            parts.push(format!("[ver \"{}\"]", self.ver));
        }
        for tag in &self.tags {
            parts.push(format!("[tag \"{tag}\"]"));
        }
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RuleGroup, Waf, WafConfig};

    fn waf_with(rule: Rule) -> Waf {
        let mut group = RuleGroup::new();
        group.add(rule).unwrap();
        Waf::new(WafConfig::default(), group)
    }

    fn arg_rule(id: u32, pattern: &str) -> Rule {
        let mut rule = Rule::new();
        rule.add_variable(VariableKind::ArgsGet, "", false).unwrap();
        rule.set_operator("rx", pattern, false).unwrap();
        rule.add_action("id", &id.to_string()).unwrap();
        rule.add_action("phase", "1").unwrap();
        rule
    }

    #[test]
    fn match_writes_matched_vars_and_registers() {
        let mut rule = arg_rule(1001, "attack");
        rule.add_action("msg", "found %{MATCHED_VAR}").unwrap();
        let waf = waf_with(rule);
        let mut tx = waf.new_transaction();
        tx.variables_mut().add_get_argument("q", "an attack here");
        tx.process_request_headers();

        assert_eq!(tx.matched_rules().len(), 1);
        let matched = &tx.matched_rules()[0];
        assert_eq!(matched.rule_id, 1001);
        assert_eq!(matched.msg, "found an attack here");
        assert_eq!(matched.matches[0].full_name(), "ARGS_GET:q");
        assert_eq!(
            tx.variables().single(VariableKind::MatchedVar),
            "an attack here"
        );
    }

    #[test]
    fn negated_key_is_filtered() {
        let mut rule = arg_rule(1002, "secret");
        rule.add_variable_negation(VariableKind::ArgsGet, "Password")
            .unwrap();
        let waf = waf_with(rule);
        let mut tx = waf.new_transaction();
        tx.variables_mut().add_get_argument("password", "secret");
        tx.process_request_headers();
        assert!(tx.matched_rules().is_empty());

        let mut tx = waf.new_transaction();
        tx.variables_mut().add_get_argument("other", "secret");
        tx.process_request_headers();
        assert_eq!(tx.matched_rules().len(), 1);
    }

    #[test]
    fn count_selector_uses_pre_filter_count() {
        let mut rule = Rule::new();
        rule.add_variable(VariableKind::ArgsGet, "", true).unwrap();
        rule.add_variable_negation(VariableKind::ArgsGet, "a").unwrap();
        rule.set_operator("gt", "2", false).unwrap();
        rule.add_action("id", "1003").unwrap();
        rule.add_action("phase", "1").unwrap();
        let waf = waf_with(rule);
        let mut tx = waf.new_transaction();
        tx.variables_mut().add_get_argument("a", "1");
        tx.variables_mut().add_get_argument("b", "2");
        tx.variables_mut().add_get_argument("c", "3");
        tx.process_request_headers();
        // the negation does not shrink the count
        assert_eq!(tx.matched_rules().len(), 1);
        assert_eq!(tx.matched_rules()[0].matches[0].value, "3");
    }

    #[test]
    fn transformations_apply_before_operator() {
        let mut rule = Rule::new();
        rule.add_variable(VariableKind::ArgsGet, "q", false).unwrap();
        rule.add_transformation("urlDecode").unwrap();
        rule.add_transformation("lowercase").unwrap();
        rule.set_operator("contains", "union select", false).unwrap();
        rule.add_action("id", "1004").unwrap();
        rule.add_action("phase", "1").unwrap();
        let waf = waf_with(rule);
        let mut tx = waf.new_transaction();
        tx.variables_mut()
            .add_get_argument("q", "UNION%20SELECT%20name");
        tx.process_request_headers();
        assert_eq!(tx.matched_rules().len(), 1);
        assert_eq!(tx.matched_rules()[0].matches[0].value, "union select name");
    }

    fn chained_pair() -> Rule {
        let mut parent = arg_rule(1005, "admin");
        parent.add_action("setvar", "TX.seen=1").unwrap();
        let mut child = Rule::new();
        child
            .add_variable(VariableKind::RequestHeaders, "User-Agent", false)
            .unwrap();
        child.set_operator("contains", "curl", false).unwrap();
        parent.add_chained_rule(child);
        parent
    }

    #[test]
    fn chain_requires_every_level() {
        let waf = waf_with(chained_pair());

        // parent hits, child does not: no registration
        let mut tx = waf.new_transaction();
        tx.variables_mut().add_get_argument("user", "admin");
        if let Some(map) = tx.variables_mut().map_mut(VariableKind::RequestHeaders) {
            map.add("User-Agent", "Mozilla");
        }
        tx.process_request_headers();
        assert!(tx.matched_rules().is_empty());

        // both levels hit: one registration holding both matches
        let mut tx = waf.new_transaction();
        tx.variables_mut().add_get_argument("user", "admin");
        if let Some(map) = tx.variables_mut().map_mut(VariableKind::RequestHeaders) {
            map.add("User-Agent", "curl/8.0");
        }
        tx.process_request_headers();
        assert_eq!(tx.matched_rules().len(), 1);
        let matched = &tx.matched_rules()[0];
        assert_eq!(matched.rule_id, 1005);
        assert_eq!(matched.matches.len(), 2);
        assert_eq!(matched.matches[0].chain_level, 0);
        assert_eq!(matched.matches[1].chain_level, 1);
        assert_eq!(
            tx.variables().first_value(VariableKind::Tx, "seen"),
            "1"
        );
    }

    /// Per-level actions fire as soon as their own level matches, even when
    /// a later link fails the chain.
    #[cfg(not(feature = "multiphase"))]
    #[test]
    fn chain_parent_actions_fire_on_partial_match() {
        let waf = waf_with(chained_pair());
        let mut tx = waf.new_transaction();
        tx.variables_mut().add_get_argument("user", "admin");
        if let Some(map) = tx.variables_mut().map_mut(VariableKind::RequestHeaders) {
            map.add("User-Agent", "Mozilla");
        }
        tx.process_request_headers();
        assert!(tx.matched_rules().is_empty());
        assert_eq!(
            tx.variables().first_value(VariableKind::Tx, "seen"),
            "1"
        );
    }

    #[test]
    fn chain_parent_message_sees_inner_match() {
        let mut parent = arg_rule(1006, "x");
        parent.add_action("msg", "last match %{MATCHED_VAR}").unwrap();
        let mut child = Rule::new();
        child.add_variable(VariableKind::ArgsGet, "", false).unwrap();
        child.set_operator("contains", "inner", false).unwrap();
        parent.add_chained_rule(child);
        let waf = waf_with(parent);
        let mut tx = waf.new_transaction();
        tx.variables_mut().add_get_argument("a", "x inner");
        tx.process_request_headers();
        assert_eq!(tx.matched_rules().len(), 1);
        // expansion was postponed past the chain, so the child's match is
        // what MATCHED_VAR holds
        assert_eq!(tx.matched_rules()[0].msg, "last match x inner");
    }

    #[test]
    fn capture_flag_gates_slot_writes() {
        let mut rule = Rule::new();
        rule.add_variable(VariableKind::ArgsGet, "", false).unwrap();
        rule.set_operator("rx", "(at)tack", false).unwrap();
        rule.add_action("id", "1007").unwrap();
        rule.add_action("phase", "1").unwrap();
        let waf = waf_with(rule);
        let mut tx = waf.new_transaction();
        tx.variables_mut().add_get_argument("q", "attack");
        tx.process_request_headers();
        assert_eq!(tx.variables().first_value(VariableKind::Tx, "0"), "");

        let mut rule = Rule::new();
        rule.add_variable(VariableKind::ArgsGet, "", false).unwrap();
        rule.set_operator("rx", "(at)tack", false).unwrap();
        rule.add_action("id", "1008").unwrap();
        rule.add_action("phase", "1").unwrap();
        rule.add_action("capture", "").unwrap();
        let waf = waf_with(rule);
        let mut tx = waf.new_transaction();
        tx.variables_mut().add_get_argument("q", "attack");
        tx.process_request_headers();
        assert_eq!(tx.variables().first_value(VariableKind::Tx, "0"), "attack");
        assert_eq!(tx.variables().first_value(VariableKind::Tx, "1"), "at");
    }

    #[test]
    fn negated_operator_inverts_per_value() {
        let mut rule = Rule::new();
        rule.add_variable(VariableKind::RequestMethod, "", false)
            .unwrap();
        rule.set_operator("streq", "GET", true).unwrap();
        rule.add_action("id", "1009").unwrap();
        rule.add_action("phase", "1").unwrap();
        let waf = waf_with(rule);

        let mut tx = waf.new_transaction();
        tx.variables_mut()
            .set_single(VariableKind::RequestMethod, "POST");
        tx.process_request_headers();
        assert_eq!(tx.matched_rules().len(), 1);

        let mut tx = waf.new_transaction();
        tx.variables_mut()
            .set_single(VariableKind::RequestMethod, "GET");
        tx.process_request_headers();
        assert!(tx.matched_rules().is_empty());
    }

    #[test]
    fn operatorless_rule_matches_synthetically() {
        let mut rule = Rule::new();
        rule.add_action("id", "900000").unwrap();
        rule.add_action("phase", "1").unwrap();
        rule.add_action("setvar", "TX.paranoia=2").unwrap();
        let waf = waf_with(rule);
        let mut tx = waf.new_transaction();
        tx.process_request_headers();
        assert_eq!(tx.matched_rules().len(), 1);
        assert_eq!(
            tx.variables().first_value(VariableKind::Tx, "paranoia"),
            "2"
        );
    }

    #[test]
    fn dynamic_target_exception_removes_key() {
        use crate::actions::{TargetException, TargetFilter};
        let rule = arg_rule(1010, "secret");
        let waf = waf_with(rule);
        let mut tx = waf.new_transaction();
        tx.removed_targets.push(TargetException {
            filter: TargetFilter::ById(1010),
            variable: VariableKind::ArgsGet,
            key: "token".to_string(),
        });
        tx.variables_mut().add_get_argument("token", "secret");
        tx.process_request_headers();
        assert!(tx.matched_rules().is_empty());

        // a different rule id is unaffected
        let rule = arg_rule(1011, "secret");
        let waf = waf_with(rule);
        let mut tx = waf.new_transaction();
        tx.removed_targets.push(TargetException {
            filter: TargetFilter::ById(9999),
            variable: VariableKind::ArgsGet,
            key: "token".to_string(),
        });
        tx.variables_mut().add_get_argument("token", "secret");
        tx.process_request_headers();
        assert_eq!(tx.matched_rules().len(), 1);
    }

    #[test]
    fn detection_only_suppresses_disruptive() {
        let mut rule = arg_rule(1012, "attack");
        rule.add_action("deny", "").unwrap();
        let waf = waf_with(rule);
        let mut tx = waf.new_transaction();
        tx.rule_engine = RuleEngineStatus::DetectionOnly;
        tx.variables_mut().add_get_argument("q", "attack");
        tx.process_request_headers();
        assert!(tx.interruption().is_none());
        assert_eq!(tx.matched_rules().len(), 1);
        // what an enforcing engine would have done is still recorded
        let detected = tx.detected_interruption().unwrap();
        assert_eq!(detected.status, 503);
    }

    #[test]
    fn error_log_lines_carry_rule_detail() {
        let mut rule = arg_rule(942100, "attack");
        rule.add_action("msg", "Injection attempt").unwrap();
        rule.add_action("severity", "CRITICAL").unwrap();
        rule.add_action("tag", "attack-sqli").unwrap();
        let waf = waf_with(rule);
        let mut tx = waf.new_transaction();
        tx.variables_mut().add_get_argument("q", "attack");
        tx.process_request_headers();
        let line = tx.matched_rules()[0].error_log();
        assert!(line.contains("[id \"942100\"]"));
        assert!(line.contains("[msg \"Injection attempt\"]"));
        assert!(line.contains("[severity \"CRITICAL\"]"));
        assert!(line.contains("[tag \"attack-sqli\"]"));
    }
}
