//! Ordered rule container with per-phase dispatch.

use std::time::Instant;

use tracing::{debug, trace};

use super::phase::Phase;
use super::rule::Rule;
use super::{AllowType, Transaction};
use crate::error::{Error, Result};

/// All rules of a policy, in registration order.
///
/// The order is significant: `skip` and `skipAfter` count and scan over it,
/// and rules run in it within each phase.
#[derive(Debug, Default)]
pub struct RuleGroup {
    rules: Vec<Rule>,
}

impl RuleGroup {
    /// An empty group.
    pub fn new() -> RuleGroup {
        RuleGroup::default()
    }

    /// Append a rule. Non-zero ids must be unique.
    pub fn add(&mut self, rule: Rule) -> Result<()> {
        if rule.id() != 0 && self.rules.iter().any(|r| r.id() == rule.id()) {
            return Err(Error::DuplicateRuleId { id: rule.id() });
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Number of rules, chain links not counted.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the group holds no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterate the rules in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Remove the rule with `id`, returning whether one was removed.
    pub fn delete_by_id(&mut self, id: u32) -> bool {
        self.delete_by_range(id, id) > 0
    }

    /// Remove every rule whose id falls in `from..=to`, returning the count.
    pub fn delete_by_range(&mut self, from: u32, to: u32) -> usize {
        let before = self.rules.len();
        self.rules
            .retain(|r| r.id() == 0 || r.id() < from || r.id() > to);
        before - self.rules.len()
    }

    /// Remove every rule whose message contains `fragment`.
    pub fn delete_by_msg(&mut self, fragment: &str) -> usize {
        if fragment.is_empty() {
            return 0;
        }
        let before = self.rules.len();
        self.rules.retain(|r| !r.msg_raw().contains(fragment));
        before - self.rules.len()
    }

    /// Remove every rule carrying `tag`.
    pub fn delete_by_tag(&mut self, tag: &str) -> usize {
        let before = self.rules.len();
        self.rules.retain(|r| !r.tags().iter().any(|t| t == tag));
        before - self.rules.len()
    }

    fn disabled_for(rule: &Rule, tx: &Transaction) -> bool {
        if rule.id() != 0
            && tx
                .removed_rules
                .iter()
                .any(|(from, to)| (*from..=*to).contains(&rule.id()))
        {
            return true;
        }
        if tx
            .removed_rule_msgs
            .iter()
            .any(|m| !m.is_empty() && rule.msg_raw().contains(m.as_str()))
        {
            return true;
        }
        tx.removed_rule_tags
            .iter()
            .any(|t| rule.tags().iter().any(|tag| tag == t))
    }

    /// Run one phase over `tx`. Returns whether `tx` is now interrupted.
    pub(crate) fn eval(&self, phase: Phase, tx: &mut Transaction) -> bool {
        trace!(phase = phase.number(), rules = self.rules.len(), "phase start");
        tx.last_phase = Some(phase);
        tx.transformation_cache.clear();
        let started = Instant::now();

        for rule in &self.rules {
            if tx.interruption.is_some() && phase != Phase::Logging {
                break;
            }
            if !rule.runs_in(phase) {
                continue;
            }
            if Self::disabled_for(rule, tx) {
                debug!(rule_id = rule.id(), "rule disabled for this transaction");
                continue;
            }
            if let Some(marker) = &tx.skip_after {
                if rule.marker_name() == Some(marker.as_str()) {
                    trace!(marker = marker.as_str(), "skipAfter marker reached");
                    tx.skip_after = None;
                }
                continue;
            }
            if tx.skip > 0 {
                tx.skip -= 1;
                continue;
            }
            if phase != Phase::Logging {
                match tx.allow_type {
                    AllowType::All | AllowType::Phase => break,
                    AllowType::Request if phase.is_request_phase() => break,
                    _ => {}
                }
            }
            tx.variables_mut().clear_matched_vars();
            rule.evaluate(phase, tx);
            tx.capture = false;
        }

        if tx.allow_type == AllowType::Phase {
            tx.allow_type = AllowType::Unset;
        }
        if tx.allow_type == AllowType::Request && phase >= Phase::RequestBody {
            tx.allow_type = AllowType::Unset;
        }
        // skip and skipAfter never carry over into the next phase
        if let Some(marker) = tx.skip_after.take() {
            debug!(marker = marker.as_str(), "skipAfter marker not reached in phase");
        }
        tx.skip = 0;
        tx.stopwatch.record(phase, started.elapsed());
        tx.interruption.is_some()
    }
}
