//! Variable kinds, storage, and resolution.
//!
//! Rules and expansion templates address transaction data through variable
//! kinds. Keyed kinds are backed by insertion-ordered multi-maps; scalar
//! kinds by plain strings; a handful of kinds are computed views over the
//! backing storage.

mod kind;
mod map;
mod store;

pub use kind::{Shape, VariableKind};
pub use map::VarMap;
pub use store::TransactionVariables;

use regex::Regex;

/// One resolved value produced by variable resolution or a rule match.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchData {
    /// The kind the value came from.
    pub variable: VariableKind,
    /// Key within the kind, empty for scalars and name views.
    pub key: String,
    /// The resolved (or matched) value.
    pub value: String,
    /// Expanded rule message, filled when the value matched a rule.
    pub message: String,
    /// Expanded rule log data, filled when the value matched a rule.
    pub data: String,
    /// Position in the chain that produced the match, 0 for the parent.
    pub chain_level: usize,
}

impl Default for MatchData {
    fn default() -> Self {
        Self {
            variable: VariableKind::Unknown,
            key: String::new(),
            value: String::new(),
            message: String::new(),
            data: String::new(),
            chain_level: 0,
        }
    }
}

impl MatchData {
    /// Full display name, `KIND:key` for keyed data and `KIND` otherwise.
    pub fn full_name(&self) -> String {
        if self.key.is_empty() {
            self.variable.name().to_string()
        } else {
            format!("{}:{}", self.variable.name(), self.key)
        }
    }
}

/// Key selector attached to a variable in a rule target or macro.
#[derive(Debug, Clone)]
pub enum SelectorKey {
    /// Select every entry of the kind.
    All,
    /// Select entries under one key, compared per the map's case policy.
    Str(String),
    /// Select entries whose key matches a regex.
    Rx(Regex),
}

impl SelectorKey {
    /// Build from a raw key string. Keys wrapped in `/` compile as regex.
    pub fn parse(key: &str) -> crate::error::Result<SelectorKey> {
        if key.is_empty() {
            return Ok(SelectorKey::All);
        }
        if let Some(pattern) = key
            .strip_prefix('/')
            .and_then(|rest| rest.strip_suffix('/'))
        {
            let re = Regex::new(&pattern.to_ascii_lowercase()).map_err(|source| {
                crate::error::Error::RegexCompile {
                    pattern: pattern.to_string(),
                    source,
                }
            })?;
            return Ok(SelectorKey::Rx(re));
        }
        Ok(SelectorKey::Str(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_formats() {
        let md = MatchData {
            variable: VariableKind::ArgsGet,
            key: "q".to_string(),
            value: "v".to_string(),
            ..MatchData::default()
        };
        assert_eq!(md.full_name(), "ARGS_GET:q");

        let md = MatchData {
            variable: VariableKind::RequestMethod,
            value: "GET".to_string(),
            ..MatchData::default()
        };
        assert_eq!(md.full_name(), "REQUEST_METHOD");
    }

    #[test]
    fn selector_key_parse() {
        assert!(matches!(SelectorKey::parse("").unwrap(), SelectorKey::All));
        assert!(matches!(
            SelectorKey::parse("user").unwrap(),
            SelectorKey::Str(_)
        ));
        assert!(matches!(
            SelectorKey::parse("/^x-/").unwrap(),
            SelectorKey::Rx(_)
        ));
        assert!(SelectorKey::parse("/([/").is_err());
    }
}
