//! The `ctl` action: per-transaction configuration changes.

use crate::audit::AuditParts;
use crate::engine::phase::Phase;
use crate::engine::{AuditEngineStatus, RuleEngineStatus, Transaction};
use crate::error::{Error, Result};
use crate::variables::VariableKind;

/// Which rules a dynamic target removal applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetFilter {
    /// Rules with this id.
    ById(u32),
    /// Rules whose message contains this string.
    ByMsg(String),
    /// Rules carrying this tag.
    ByTag(String),
}

/// A target removed from matching rules for the rest of the transaction.
///
/// An empty key removes the whole selector for that variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetException {
    /// Rule filter.
    pub filter: TargetFilter,
    /// Variable the exception applies to.
    pub variable: VariableKind,
    /// Lower-cased key, empty for the whole selector.
    pub key: String,
}

impl TargetException {
    /// Whether the exception applies to a selector on `kind`. An exception
    /// on a union kind also covers the maps it concatenates.
    pub fn covers(&self, kind: VariableKind) -> bool {
        if self.variable == kind {
            return true;
        }
        match self.variable {
            VariableKind::Args => matches!(
                kind,
                VariableKind::ArgsGet | VariableKind::ArgsPost | VariableKind::ArgsPath
            ),
            VariableKind::ArgsNames => matches!(
                kind,
                VariableKind::ArgsGetNames | VariableKind::ArgsPostNames
            ),
            _ => false,
        }
    }
}

/// A parsed `ctl` operand. Validation happens here, at rule-load time;
/// [`Ctl::apply`] cannot fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Ctl {
    /// `ctl:auditEngine=...`
    AuditEngine(AuditEngineStatus),
    /// `ctl:auditLogParts=...`
    AuditLogParts(AuditParts),
    /// `ctl:debugLogLevel=0..9`
    DebugLogLevel(u8),
    /// `ctl:forceRequestBodyVariable=on|off`
    ForceRequestBodyVariable(bool),
    /// `ctl:forceResponseBodyVariable=on|off`
    ForceResponseBodyVariable(bool),
    /// `ctl:requestBodyAccess=on|off`
    RequestBodyAccess(bool),
    /// `ctl:requestBodyLimit=n`
    RequestBodyLimit(u64),
    /// `ctl:requestBodyProcessor=NAME`
    RequestBodyProcessor(String),
    /// `ctl:responseBodyAccess=on|off`
    ResponseBodyAccess(bool),
    /// `ctl:responseBodyLimit=n`
    ResponseBodyLimit(u64),
    /// `ctl:responseBodyProcessor=NAME`
    ResponseBodyProcessor(String),
    /// `ctl:ruleEngine=on|off|detectionOnly`
    RuleEngine(RuleEngineStatus),
    /// `ctl:ruleRemoveById=n` or `ctl:ruleRemoveById=a-b`
    RuleRemoveById {
        /// First id, inclusive.
        from: u32,
        /// Last id, inclusive.
        to: u32,
    },
    /// `ctl:ruleRemoveByMsg=...`
    RuleRemoveByMsg(String),
    /// `ctl:ruleRemoveByTag=...`
    RuleRemoveByTag(String),
    /// `ctl:ruleRemoveTargetById=n;VAR:key`
    RuleRemoveTarget(TargetException),
    /// `ctl:hashEngine=on|off`; accepted for compatibility, no effect.
    HashEngine(bool),
    /// `ctl:hashEnforcement=on|off`; accepted for compatibility, no effect.
    HashEnforcement(bool),
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" => Ok(true),
        "off" | "false" => Ok(false),
        _ => Err(Error::action_argument(
            "ctl",
            format!("{name} expects on or off, got {value:?}"),
        )),
    }
}

fn parse_limit(name: &str, value: &str) -> Result<u64> {
    value.parse::<u64>().map_err(|_| {
        Error::action_argument("ctl", format!("{name} expects a byte count, got {value:?}"))
    })
}

/// Parse `"5"` into `(5, 5)` or `"3-9"` into `(3, 9)`. Reversed ranges and
/// non-numeric bounds are configuration errors.
pub(crate) fn parse_id_range(value: &str) -> Result<(u32, u32)> {
    let parse_one = |s: &str| {
        s.trim().parse::<u32>().map_err(|_| {
            Error::action_argument("ctl", format!("invalid rule id {s:?}"))
        })
    };
    match value.split_once('-') {
        Some((a, b)) => {
            let from = parse_one(a)?;
            let to = parse_one(b)?;
            if from > to {
                return Err(Error::action_argument(
                    "ctl",
                    format!("reversed id range {value:?}"),
                ));
            }
            Ok((from, to))
        }
        None => {
            let id = parse_one(value)?;
            Ok((id, id))
        }
    }
}

/// Split the `value;VAR:key` form of the rule-remove-target variants.
fn parse_target(name: &str, value: &str) -> Result<(String, VariableKind, String)> {
    let (selector_value, target) = value.split_once(';').ok_or_else(|| {
        Error::action_argument("ctl", format!("{name} expects value;VAR:key, got {value:?}"))
    })?;
    let (var, key) = match target.split_once(':') {
        Some((var, key)) => (var, key),
        None => (target, ""),
    };
    let variable = VariableKind::parse(var.trim())?;
    Ok((
        selector_value.trim().to_string(),
        variable,
        key.trim().to_ascii_lowercase(),
    ))
}

impl Ctl {
    /// Parse a `ctl` operand of the form `name=value[;VAR:key]`.
    pub fn parse(operand: &str) -> Result<Ctl> {
        let (name, value) = operand.split_once('=').ok_or_else(|| {
            Error::action_argument("ctl", format!("expected name=value, got {operand:?}"))
        })?;
        let name = name.trim();
        let value = value.trim();
        match name.to_ascii_lowercase().as_str() {
            "auditengine" => Ok(Ctl::AuditEngine(AuditEngineStatus::parse(value)?)),
            "auditlogparts" => Ok(Ctl::AuditLogParts(AuditParts::parse(value)?)),
            "debugloglevel" => {
                let level = value.parse::<u8>().ok().filter(|l| *l <= 9).ok_or_else(|| {
                    Error::action_argument(
                        "ctl",
                        format!("debugLogLevel expects 0..9, got {value:?}"),
                    )
                })?;
                Ok(Ctl::DebugLogLevel(level))
            }
            "forcerequestbodyvariable" => {
                Ok(Ctl::ForceRequestBodyVariable(parse_bool(name, value)?))
            }
            "forceresponsebodyvariable" => {
                Ok(Ctl::ForceResponseBodyVariable(parse_bool(name, value)?))
            }
            "requestbodyaccess" => Ok(Ctl::RequestBodyAccess(parse_bool(name, value)?)),
            "requestbodylimit" => Ok(Ctl::RequestBodyLimit(parse_limit(name, value)?)),
            "requestbodyprocessor" => {
                Ok(Ctl::RequestBodyProcessor(value.to_ascii_uppercase()))
            }
            "responsebodyaccess" => Ok(Ctl::ResponseBodyAccess(parse_bool(name, value)?)),
            "responsebodylimit" => Ok(Ctl::ResponseBodyLimit(parse_limit(name, value)?)),
            "responsebodyprocessor" => {
                Ok(Ctl::ResponseBodyProcessor(value.to_ascii_uppercase()))
            }
            "ruleengine" => Ok(Ctl::RuleEngine(RuleEngineStatus::parse(value)?)),
            "ruleremovebyid" => {
                let (from, to) = parse_id_range(value)?;
                Ok(Ctl::RuleRemoveById { from, to })
            }
            "ruleremovebymsg" => Ok(Ctl::RuleRemoveByMsg(value.to_string())),
            "ruleremovebytag" => Ok(Ctl::RuleRemoveByTag(value.to_string())),
            "ruleremovetargetbyid" => {
                let (id, variable, key) = parse_target(name, value)?;
                let id = id.parse::<u32>().map_err(|_| {
                    Error::action_argument("ctl", format!("invalid rule id {id:?}"))
                })?;
                Ok(Ctl::RuleRemoveTarget(TargetException {
                    filter: TargetFilter::ById(id),
                    variable,
                    key,
                }))
            }
            "ruleremovetargetbymsg" => {
                let (msg, variable, key) = parse_target(name, value)?;
                Ok(Ctl::RuleRemoveTarget(TargetException {
                    filter: TargetFilter::ByMsg(msg),
                    variable,
                    key,
                }))
            }
            "ruleremovetargetbytag" => {
                let (tag, variable, key) = parse_target(name, value)?;
                Ok(Ctl::RuleRemoveTarget(TargetException {
                    filter: TargetFilter::ByTag(tag),
                    variable,
                    key,
                }))
            }
            "hashengine" => Ok(Ctl::HashEngine(parse_bool(name, value)?)),
            "hashenforcement" => Ok(Ctl::HashEnforcement(parse_bool(name, value)?)),
            _ => Err(Error::action_argument(
                "ctl",
                format!("unknown ctl option {name:?}"),
            )),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Ctl::AuditEngine(_) => "auditEngine",
            Ctl::AuditLogParts(_) => "auditLogParts",
            Ctl::DebugLogLevel(_) => "debugLogLevel",
            Ctl::ForceRequestBodyVariable(_) => "forceRequestBodyVariable",
            Ctl::ForceResponseBodyVariable(_) => "forceResponseBodyVariable",
            Ctl::RequestBodyAccess(_) => "requestBodyAccess",
            Ctl::RequestBodyLimit(_) => "requestBodyLimit",
            Ctl::RequestBodyProcessor(_) => "requestBodyProcessor",
            Ctl::ResponseBodyAccess(_) => "responseBodyAccess",
            Ctl::ResponseBodyLimit(_) => "responseBodyLimit",
            Ctl::ResponseBodyProcessor(_) => "responseBodyProcessor",
            Ctl::RuleEngine(_) => "ruleEngine",
            Ctl::RuleRemoveById { .. } => "ruleRemoveById",
            Ctl::RuleRemoveByMsg(_) => "ruleRemoveByMsg",
            Ctl::RuleRemoveByTag(_) => "ruleRemoveByTag",
            Ctl::RuleRemoveTarget(_) => "ruleRemoveTarget",
            Ctl::HashEngine(_) => "hashEngine",
            Ctl::HashEnforcement(_) => "hashEnforcement",
        }
    }

    /// Request-side body knobs are frozen once the request-headers phase is
    /// over, response-side ones once the response-headers phase is over.
    fn frozen(&self, tx: &Transaction) -> bool {
        let Some(phase) = tx.last_phase else {
            return false;
        };
        match self {
            Ctl::ForceRequestBodyVariable(_)
            | Ctl::RequestBodyAccess(_)
            | Ctl::RequestBodyLimit(_)
            | Ctl::RequestBodyProcessor(_) => phase > Phase::RequestHeaders,
            Ctl::ForceResponseBodyVariable(_)
            | Ctl::ResponseBodyAccess(_)
            | Ctl::ResponseBodyLimit(_)
            | Ctl::ResponseBodyProcessor(_) => phase > Phase::ResponseHeaders,
            _ => false,
        }
    }

    /// Apply the change to the transaction.
    pub(crate) fn apply(&self, tx: &mut Transaction) {
        if self.frozen(tx) {
            tracing::warn!(
                ctl = self.name(),
                phase = tx.last_phase.map(|p| p.number()),
                "body configuration change after its phase, ignoring"
            );
            return;
        }
        match self {
            Ctl::AuditEngine(status) => tx.audit_engine = *status,
            Ctl::AuditLogParts(parts) => tx.audit_parts = parts.clone(),
            Ctl::DebugLogLevel(level) => tx.debug_log_level = *level,
            Ctl::ForceRequestBodyVariable(on) => tx.force_request_body_variable = *on,
            Ctl::ForceResponseBodyVariable(on) => tx.force_response_body_variable = *on,
            Ctl::RequestBodyAccess(on) => tx.request_body_access = *on,
            Ctl::RequestBodyLimit(limit) => tx.request_body_limit = *limit,
            Ctl::RequestBodyProcessor(name) => {
                tx.variables_mut()
                    .set_single(VariableKind::ReqbodyProcessor, name.clone());
            }
            Ctl::ResponseBodyAccess(on) => tx.response_body_access = *on,
            Ctl::ResponseBodyLimit(limit) => tx.response_body_limit = *limit,
            Ctl::ResponseBodyProcessor(name) => {
                tx.variables_mut()
                    .set_single(VariableKind::ResbodyProcessor, name.clone());
            }
            Ctl::RuleEngine(status) => tx.rule_engine = *status,
            Ctl::RuleRemoveById { from, to } => tx.removed_rules.push((*from, *to)),
            Ctl::RuleRemoveByMsg(msg) => tx.removed_rule_msgs.push(msg.clone()),
            Ctl::RuleRemoveByTag(tag) => tx.removed_rule_tags.push(tag.clone()),
            Ctl::RuleRemoveTarget(exception) => tx.removed_targets.push(exception.clone()),
            Ctl::HashEngine(_) | Ctl::HashEnforcement(_) => {
                tracing::debug!(ctl = self.name(), "accepted without effect");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RuleGroup, Waf, WafConfig};

    #[test]
    fn parses_engine_switches() {
        assert_eq!(
            Ctl::parse("ruleEngine=off").unwrap(),
            Ctl::RuleEngine(RuleEngineStatus::Off)
        );
        assert_eq!(
            Ctl::parse("ruleEngine=DetectionOnly").unwrap(),
            Ctl::RuleEngine(RuleEngineStatus::DetectionOnly)
        );
        assert_eq!(
            Ctl::parse("auditEngine=RelevantOnly").unwrap(),
            Ctl::AuditEngine(AuditEngineStatus::RelevantOnly)
        );
    }

    #[test]
    fn parses_id_ranges() {
        assert_eq!(parse_id_range("5").unwrap(), (5, 5));
        assert_eq!(parse_id_range("100-200").unwrap(), (100, 200));
        assert!(parse_id_range("200-100").is_err());
        assert!(parse_id_range("abc").is_err());
        assert_eq!(
            Ctl::parse("ruleRemoveById=941000-942999").unwrap(),
            Ctl::RuleRemoveById { from: 941000, to: 942999 }
        );
    }

    #[test]
    fn parses_target_removal() {
        let ctl = Ctl::parse("ruleRemoveTargetById=942100;ARGS:Password").unwrap();
        match ctl {
            Ctl::RuleRemoveTarget(e) => {
                assert_eq!(e.filter, TargetFilter::ById(942100));
                assert_eq!(e.variable, VariableKind::Args);
                assert_eq!(e.key, "password");
            }
            other => panic!("unexpected parse: {other:?}"),
        }
        let ctl = Ctl::parse("ruleRemoveTargetByTag=attack-sqli;REQUEST_COOKIES").unwrap();
        match ctl {
            Ctl::RuleRemoveTarget(e) => {
                assert_eq!(e.filter, TargetFilter::ByTag("attack-sqli".to_string()));
                assert_eq!(e.variable, VariableKind::RequestCookies);
                assert_eq!(e.key, "");
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn union_exception_covers_component_maps() {
        let ctl = Ctl::parse("ruleRemoveTargetById=1;ARGS:q").unwrap();
        match ctl {
            Ctl::RuleRemoveTarget(e) => {
                assert!(e.covers(VariableKind::Args));
                assert!(e.covers(VariableKind::ArgsGet));
                assert!(e.covers(VariableKind::ArgsPost));
                assert!(!e.covers(VariableKind::RequestCookies));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_operands() {
        assert!(Ctl::parse("ruleEngine").is_err());
        assert!(Ctl::parse("ruleEngine=sideways").is_err());
        assert!(Ctl::parse("noSuchOption=1").is_err());
        assert!(Ctl::parse("debugLogLevel=12").is_err());
        assert!(Ctl::parse("requestBodyLimit=big").is_err());
        assert!(Ctl::parse("ruleRemoveTargetById=12").is_err());
    }

    #[test]
    fn applies_to_transaction() {
        let waf = Waf::new(WafConfig::default(), RuleGroup::new());
        let mut tx = waf.new_transaction();
        Ctl::parse("ruleEngine=detectionOnly").unwrap().apply(&mut tx);
        assert_eq!(tx.rule_engine, RuleEngineStatus::DetectionOnly);
        Ctl::parse("requestBodyLimit=1024").unwrap().apply(&mut tx);
        assert_eq!(tx.request_body_limit, 1024);
        Ctl::parse("ruleRemoveById=100-200").unwrap().apply(&mut tx);
        assert_eq!(tx.removed_rules, vec![(100, 200)]);
    }

    #[test]
    fn body_knobs_freeze_after_their_phase() {
        let waf = Waf::new(WafConfig::default(), RuleGroup::new());
        let mut tx = waf.new_transaction();
        tx.last_phase = Some(Phase::RequestBody);
        let before = tx.request_body_limit;
        Ctl::parse("requestBodyLimit=7").unwrap().apply(&mut tx);
        assert_eq!(tx.request_body_limit, before);
        // response side still open during phase 2
        Ctl::parse("responseBodyLimit=7").unwrap().apply(&mut tx);
        assert_eq!(tx.response_body_limit, 7);
        // engine switches are never frozen
        Ctl::parse("ruleEngine=off").unwrap().apply(&mut tx);
        assert_eq!(tx.rule_engine, RuleEngineStatus::Off);
    }
}
