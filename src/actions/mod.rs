//! Rule actions.
//!
//! Actions come in five types. Metadata actions are folded into the rule at
//! build time and never evaluated. Flow actions steer the rule-group
//! scheduler. Non-disruptive actions mutate transaction state on a match.
//! Disruptive actions raise an interruption or set the allow marker, and only
//! run while the rule engine is fully on. Data actions feed the disruptive
//! ones.

mod ctl;
mod setvar;

pub use ctl::{Ctl, TargetException, TargetFilter};
pub use setvar::SetVar;

use crate::engine::interruption::Interruption;
use crate::engine::phase::Phase;
use crate::engine::rule::Rule;
use crate::engine::severity::Severity;
use crate::engine::{AllowType, Transaction};
use crate::error::{Error, Result};
use crate::macros::Macro;
use crate::variables::VariableKind;

/// Status used by `deny` and `drop` when the rule carries no `status`.
pub(crate) const DEFAULT_DENY_STATUS: u16 = 503;

/// Classification of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Folded into the rule at build time.
    Metadata,
    /// Steers the scheduler; runs even in detection-only mode.
    Flow,
    /// Mutates transaction state when the rule matches.
    NonDisruptive,
    /// Raises an interruption or sets the allow marker.
    Disruptive,
    /// Supplies data to disruptive actions.
    Data,
}

/// A single parsed action.
#[derive(Debug, Clone)]
pub enum Action {
    /// `id:n`
    Id(u32),
    /// `phase:n`
    Phase(Phase),
    /// `rev:s`
    Rev(String),
    /// `ver:s`
    Ver(String),
    /// `severity:n|name`
    Severity(Severity),
    /// `msg:s` (may contain macros)
    Msg(String),
    /// `logdata:s` (may contain macros)
    LogData(String),
    /// `tag:s`
    Tag(String),
    /// `maturity:n`
    Maturity(u8),
    /// `accuracy:n`
    Accuracy(u8),

    /// `chain`
    Chain,
    /// `skip:n`
    Skip(u32),
    /// `skipAfter:marker`
    SkipAfter(String),

    /// `capture`
    Capture,
    /// `log`
    Log,
    /// `nolog`
    NoLog,
    /// `auditlog`
    AuditLog,
    /// `noauditlog`
    NoAuditLog,
    /// `multiMatch`
    MultiMatch,
    /// `t:name`
    Transform(String),
    /// `ctl:option=value`
    Ctl(Ctl),
    /// `setvar:TX.key=value`
    SetVar(SetVar),
    /// `setenv:name=value`
    SetEnv {
        /// Environment entry name.
        name: String,
        /// Value template.
        value: Macro,
    },
    /// `initcol:col=key`; accepted, persistent collections are external.
    InitCol {
        /// Collection name.
        collection: String,
        /// Key template.
        key: Macro,
    },
    /// `expirevar:col.key=seconds`; accepted, persistent collections are
    /// external.
    ExpireVar {
        /// Collection name.
        collection: String,
        /// Entry key.
        key: String,
        /// Lifetime in seconds.
        seconds: u64,
    },
    /// `append:s`; content injection is not performed.
    Append(Macro),
    /// `prepend:s`; content injection is not performed.
    Prepend(Macro),
    /// `exec:path`; external scripts are not executed.
    Exec(String),

    /// `allow`, `allow:phase`, `allow:request`
    Allow(AllowType),
    /// `deny`
    Deny,
    /// `drop`
    Drop,
    /// `pass`
    Pass,
    /// `block` (stands in for the default disruptive action)
    Block,
    /// `redirect:url`
    Redirect(Macro),

    /// `status:n`
    Status(u16),
}

impl Action {
    /// The action's type.
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Id(_)
            | Action::Phase(_)
            | Action::Rev(_)
            | Action::Ver(_)
            | Action::Severity(_)
            | Action::Msg(_)
            | Action::LogData(_)
            | Action::Tag(_)
            | Action::Maturity(_)
            | Action::Accuracy(_) => ActionKind::Metadata,
            Action::Chain | Action::Skip(_) | Action::SkipAfter(_) => ActionKind::Flow,
            Action::Capture
            | Action::Log
            | Action::NoLog
            | Action::AuditLog
            | Action::NoAuditLog
            | Action::MultiMatch
            | Action::Transform(_)
            | Action::Ctl(_)
            | Action::SetVar(_)
            | Action::SetEnv { .. }
            | Action::InitCol { .. }
            | Action::ExpireVar { .. }
            | Action::Append(_)
            | Action::Prepend(_)
            | Action::Exec(_) => ActionKind::NonDisruptive,
            Action::Allow(_)
            | Action::Deny
            | Action::Drop
            | Action::Pass
            | Action::Block
            | Action::Redirect(_) => ActionKind::Disruptive,
            Action::Status(_) => ActionKind::Data,
        }
    }

    /// Run the action against the transaction.
    ///
    /// Metadata actions and build-time flags are no-ops here; they were
    /// consumed when the rule was assembled.
    pub(crate) fn evaluate(&self, rule: &Rule, tx: &mut Transaction) {
        match self {
            Action::Ctl(ctl) => ctl.apply(tx),
            Action::SetVar(setvar) => setvar.apply(tx),
            Action::SetEnv { name, value } => {
                let value = value.expand(tx.variables());
                if let Some(map) = tx.variables_mut().map_mut(VariableKind::Env) {
                    map.set(&name.to_ascii_lowercase(), &value);
                }
            }
            Action::InitCol { collection, .. } => {
                tracing::debug!(
                    collection = collection.as_str(),
                    "persistent collections are external, initcol ignored"
                );
            }
            Action::ExpireVar { collection, key, .. } => {
                tracing::debug!(
                    collection = collection.as_str(),
                    key = key.as_str(),
                    "persistent collections are external, expirevar ignored"
                );
            }
            Action::Append(_) | Action::Prepend(_) => {
                tracing::warn!(rule_id = rule.id(), "content injection is disabled, ignoring");
            }
            Action::Exec(path) => {
                tracing::warn!(script = path.as_str(), "exec is disabled, ignoring");
            }
            Action::Skip(n) => tx.skip = *n,
            Action::SkipAfter(marker) => tx.skip_after = Some(marker.clone()),
            Action::Allow(kind) => tx.allow_type = *kind,
            Action::Deny | Action::Block | Action::Drop | Action::Redirect(_) => {
                if let Some(interruption) = self.interruption_for(rule, tx) {
                    tx.interrupt(interruption);
                }
            }
            Action::Pass => {}
            _ => {}
        }
    }

    /// The interruption this action would raise, without raising it.
    ///
    /// Detection-only mode uses this to record what an enforcing engine
    /// would have done.
    pub(crate) fn interruption_for(&self, rule: &Rule, tx: &Transaction) -> Option<Interruption> {
        match self {
            Action::Deny | Action::Block => {
                let status = rule.status().unwrap_or(DEFAULT_DENY_STATUS);
                Some(Interruption::deny(status, rule.id()))
            }
            Action::Drop => {
                let status = rule.status().unwrap_or(DEFAULT_DENY_STATUS);
                Some(Interruption::drop(status, rule.id()))
            }
            Action::Redirect(url) => {
                let target = url.expand(tx.variables());
                let status = match rule.status() {
                    Some(s) if (300..400).contains(&s) => s,
                    _ => 302,
                };
                Some(Interruption::redirect(status, rule.id(), target))
            }
            _ => None,
        }
    }
}

fn numeric<T: std::str::FromStr>(action: &str, argument: &str) -> Result<T> {
    argument.parse::<T>().map_err(|_| {
        Error::action_argument(action, format!("expected a number, got {argument:?}"))
    })
}

/// Build an action from its name and raw argument.
///
/// All validation happens here so that nothing fails later during
/// evaluation.
pub fn create_action(name: &str, argument: &str) -> Result<Action> {
    match name.to_ascii_lowercase().as_str() {
        "id" => Ok(Action::Id(numeric::<u32>("id", argument)?)),
        "phase" => {
            let phase = match argument.to_ascii_lowercase().as_str() {
                "request" => Phase::RequestBody,
                "response" => Phase::ResponseBody,
                "logging" => Phase::Logging,
                other => Phase::from_number(numeric::<u8>("phase", other)?).ok_or_else(|| {
                    Error::action_argument("phase", format!("expected 1..5, got {argument:?}"))
                })?,
            };
            Ok(Action::Phase(phase))
        }
        "rev" => Ok(Action::Rev(argument.to_string())),
        "ver" => Ok(Action::Ver(argument.to_string())),
        "severity" => Ok(Action::Severity(Severity::parse(argument)?)),
        "msg" => Ok(Action::Msg(argument.to_string())),
        "logdata" => Ok(Action::LogData(argument.to_string())),
        "tag" => Ok(Action::Tag(argument.to_string())),
        "maturity" => Ok(Action::Maturity(numeric::<u8>("maturity", argument)?)),
        "accuracy" => Ok(Action::Accuracy(numeric::<u8>("accuracy", argument)?)),
        "chain" => Ok(Action::Chain),
        "skip" => {
            let n = numeric::<u32>("skip", argument)?;
            if n == 0 {
                return Err(Error::action_argument("skip", "skip count must be positive"));
            }
            Ok(Action::Skip(n))
        }
        "skipafter" => {
            if argument.is_empty() {
                return Err(Error::action_argument("skipAfter", "marker name is empty"));
            }
            Ok(Action::SkipAfter(argument.to_string()))
        }
        "capture" => Ok(Action::Capture),
        "log" => Ok(Action::Log),
        "nolog" => Ok(Action::NoLog),
        "auditlog" => Ok(Action::AuditLog),
        "noauditlog" => Ok(Action::NoAuditLog),
        "multimatch" => Ok(Action::MultiMatch),
        "t" => {
            // resolve now so unknown names fail at load time
            crate::transformations::create_transformation(argument)?;
            Ok(Action::Transform(argument.to_string()))
        }
        "ctl" => Ok(Action::Ctl(Ctl::parse(argument)?)),
        "setvar" => Ok(Action::SetVar(SetVar::parse(argument)?)),
        "setenv" => {
            let (name, value) = match argument.split_once('=') {
                Some((name, value)) => (name.trim(), value),
                None => (argument.trim(), "1"),
            };
            if name.is_empty() {
                return Err(Error::action_argument("setenv", "name is empty"));
            }
            Ok(Action::SetEnv {
                name: name.to_string(),
                value: Macro::compile(value)?,
            })
        }
        "initcol" => {
            let (collection, key) = argument.split_once('=').ok_or_else(|| {
                Error::action_argument("initcol", format!("expected col=key, got {argument:?}"))
            })?;
            Ok(Action::InitCol {
                collection: collection.trim().to_string(),
                key: Macro::compile(key)?,
            })
        }
        "expirevar" => {
            let (target, seconds) = argument.split_once('=').ok_or_else(|| {
                Error::action_argument(
                    "expirevar",
                    format!("expected col.key=seconds, got {argument:?}"),
                )
            })?;
            let (collection, key) = target.split_once('.').ok_or_else(|| {
                Error::action_argument(
                    "expirevar",
                    format!("expected col.key=seconds, got {argument:?}"),
                )
            })?;
            Ok(Action::ExpireVar {
                collection: collection.trim().to_string(),
                key: key.trim().to_string(),
                seconds: numeric::<u64>("expirevar", seconds.trim())?,
            })
        }
        "append" => Ok(Action::Append(Macro::compile(argument)?)),
        "prepend" => Ok(Action::Prepend(Macro::compile(argument)?)),
        "exec" => {
            if argument.is_empty() {
                return Err(Error::action_argument("exec", "script path is empty"));
            }
            Ok(Action::Exec(argument.to_string()))
        }
        "allow" => {
            let allow = match argument.to_ascii_lowercase().as_str() {
                "" => AllowType::All,
                "phase" => AllowType::Phase,
                "request" => AllowType::Request,
                other => {
                    return Err(Error::action_argument(
                        "allow",
                        format!("expected phase or request, got {other:?}"),
                    ))
                }
            };
            Ok(Action::Allow(allow))
        }
        "deny" => Ok(Action::Deny),
        "drop" => Ok(Action::Drop),
        "pass" => Ok(Action::Pass),
        "block" => Ok(Action::Block),
        "redirect" => {
            if argument.is_empty() {
                return Err(Error::action_argument("redirect", "target is empty"));
            }
            Ok(Action::Redirect(Macro::compile(argument)?))
        }
        "status" => {
            let status = numeric::<u16>("status", argument)?;
            if !(100..=999).contains(&status) {
                return Err(Error::action_argument(
                    "status",
                    format!("status {status} out of range"),
                ));
            }
            Ok(Action::Status(status))
        }
        other => Err(Error::UnknownAction {
            name: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RuleGroup, Waf, WafConfig};

    fn tx() -> Transaction {
        Waf::new(WafConfig::default(), RuleGroup::new()).new_transaction()
    }

    #[test]
    fn factory_resolves_names() {
        assert!(matches!(create_action("id", "942100").unwrap(), Action::Id(942100)));
        assert!(matches!(
            create_action("phase", "request").unwrap(),
            Action::Phase(Phase::RequestBody)
        ));
        assert!(matches!(
            create_action("severity", "CRITICAL").unwrap(),
            Action::Severity(Severity::Critical)
        ));
        assert!(matches!(create_action("DENY", "").unwrap(), Action::Deny));
        assert!(matches!(
            create_action("allow", "request").unwrap(),
            Action::Allow(AllowType::Request)
        ));
        assert!(create_action("jump", "").is_err());
    }

    #[test]
    fn factory_validates_arguments() {
        assert!(create_action("id", "abc").is_err());
        assert!(create_action("phase", "6").is_err());
        assert!(create_action("skip", "0").is_err());
        assert!(create_action("status", "99").is_err());
        assert!(create_action("allow", "never").is_err());
        assert!(create_action("t", "noSuchTransform").is_err());
        assert!(create_action("t", "lowercase").is_ok());
    }

    #[test]
    fn kinds() {
        assert_eq!(create_action("msg", "x").unwrap().kind(), ActionKind::Metadata);
        assert_eq!(create_action("skip", "2").unwrap().kind(), ActionKind::Flow);
        assert_eq!(
            create_action("setvar", "TX.a=1").unwrap().kind(),
            ActionKind::NonDisruptive
        );
        assert_eq!(create_action("deny", "").unwrap().kind(), ActionKind::Disruptive);
        assert_eq!(create_action("status", "403").unwrap().kind(), ActionKind::Data);
    }

    #[test]
    fn flow_actions_steer_the_scheduler() {
        let mut tx = tx();
        let rule = Rule::new();
        create_action("skip", "3").unwrap().evaluate(&rule, &mut tx);
        assert_eq!(tx.skip, 3);
        create_action("skipAfter", "END").unwrap().evaluate(&rule, &mut tx);
        assert_eq!(tx.skip_after.as_deref(), Some("END"));
    }

    #[test]
    fn deny_uses_rule_status_or_default() {
        let mut tx = tx();
        let rule = Rule::new();
        create_action("deny", "").unwrap().evaluate(&rule, &mut tx);
        let interruption = tx.interruption().cloned().unwrap();
        assert_eq!(interruption.status, DEFAULT_DENY_STATUS);

        let mut tx = self::tx();
        let mut rule = Rule::new();
        rule.add_action("id", "7").unwrap();
        rule.add_action("status", "403").unwrap();
        create_action("deny", "").unwrap().evaluate(&rule, &mut tx);
        let interruption = tx.interruption().cloned().unwrap();
        assert_eq!(interruption.status, 403);
        assert_eq!(interruption.rule_id, 7);
    }

    #[test]
    fn first_interruption_wins() {
        let mut tx = tx();
        let rule = Rule::new();
        create_action("deny", "").unwrap().evaluate(&rule, &mut tx);
        create_action("redirect", "/login").unwrap().evaluate(&rule, &mut tx);
        let interruption = tx.interruption().unwrap();
        assert_eq!(interruption.status, DEFAULT_DENY_STATUS);
    }

    #[test]
    fn redirect_status_range() {
        let mut tx = tx();
        let mut rule = Rule::new();
        rule.add_action("status", "307").unwrap();
        create_action("redirect", "/away").unwrap().evaluate(&rule, &mut tx);
        let interruption = tx.interruption().cloned().unwrap();
        assert_eq!(interruption.status, 307);
        assert_eq!(interruption.data, "/away");

        // a non-3xx status falls back to 302
        let mut tx = self::tx();
        let mut rule = Rule::new();
        rule.add_action("status", "403").unwrap();
        create_action("redirect", "/away").unwrap().evaluate(&rule, &mut tx);
        assert_eq!(tx.interruption().unwrap().status, 302);
    }
}
