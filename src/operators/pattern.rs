//! Pattern operators: regular expressions, multi-pattern sets and REST
//! path templates.

use super::traits::Operator;
use crate::engine::Transaction;
use crate::error::{Error, Result};
use crate::variables::VariableKind;
use aho_corasick::{AhoCorasick, MatchKind};
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;

/// Regular expression operator.
///
/// When the rule captures, groups 0 (the full match) through 9 land in
/// the capture slots.
pub struct Rx {
    regex: Regex,
}

impl Rx {
    /// Compile the pattern. Bad syntax is a rule-load error, never a
    /// runtime one.
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|source| Error::RegexCompile {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { regex })
    }
}

impl Operator for Rx {
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool {
        if !tx.capturing() {
            return self.regex.is_match(value);
        }
        match self.regex.captures(value) {
            Some(caps) => {
                for (i, group) in caps.iter().enumerate().take(10) {
                    if let Some(m) = group {
                        tx.capture_field(i, m.as_str());
                    }
                }
                true
            }
            None => false,
        }
    }

    fn name(&self) -> &'static str {
        "rx"
    }
}

/// Multi-pattern operator backed by an Aho-Corasick automaton.
///
/// Matching is ASCII-case-insensitive and leftmost-longest. When the rule
/// captures, each hit fills the next capture slot and the scan stops after
/// ten.
pub struct Pm {
    automaton: AhoCorasick,
}

impl Pm {
    /// Build from whitespace-separated patterns.
    pub fn new(patterns: &str) -> Result<Self> {
        let patterns: Vec<&str> = patterns.split_whitespace().collect();
        Self::from_patterns(&patterns)
    }

    /// Build from a pattern file, one pattern per line.
    pub fn from_file(path: &str, search_paths: &[PathBuf]) -> Result<Self> {
        let lines = super::read_list_file(path, search_paths)?;
        let patterns: Vec<&str> = lines.iter().map(String::as_str).collect();
        Self::from_patterns(&patterns)
    }

    /// Build from a named dataset.
    pub fn from_dataset(name: &str, datasets: &HashMap<String, Vec<String>>) -> Result<Self> {
        let set = datasets
            .get(name)
            .filter(|set| !set.is_empty())
            .ok_or_else(|| Error::DatasetNotFound {
                name: name.to_string(),
            })?;
        let patterns: Vec<&str> = set.iter().map(String::as_str).collect();
        Self::from_patterns(&patterns)
    }

    fn from_patterns(patterns: &[&str]) -> Result<Self> {
        if patterns.is_empty() {
            return Err(Error::PatternSet {
                message: "empty pattern list".to_string(),
            });
        }
        let automaton = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(patterns)
            .map_err(|e| Error::PatternSet {
                message: e.to_string(),
            })?;
        Ok(Self { automaton })
    }
}

impl Operator for Pm {
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool {
        if !tx.capturing() {
            return self.automaton.is_match(value);
        }
        let mut hits = 0;
        for m in self.automaton.find_iter(value) {
            tx.capture_field(hits, &value[m.start()..m.end()]);
            hits += 1;
            if hits == 10 {
                return true;
            }
        }
        hits > 0
    }

    fn name(&self) -> &'static str {
        "pm"
    }
}

/// Matches a URL path against a `/resource/{id}` style template and
/// publishes each captured segment as a path argument.
pub struct Restpath {
    regex: Regex,
}

impl Restpath {
    /// Compile a path template into a regex with one named group per
    /// `{token}`.
    pub fn new(template: &str) -> Result<Self> {
        let mut pattern = String::with_capacity(template.len() + 16);
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            let close = rest[open..]
                .find('}')
                .map(|at| open + at)
                .ok_or_else(|| Error::operator_argument("restpath", "unterminated path token"))?;
            let name = &rest[open + 1..close];
            if name.is_empty()
                || !name
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_')
            {
                return Err(Error::operator_argument("restpath", "invalid path token name"));
            }
            pattern.push_str(&regex::escape(&rest[..open]));
            pattern.push_str("(?P<");
            pattern.push_str(name);
            pattern.push_str(">[^?/]+)");
            rest = &rest[close + 1..];
        }
        pattern.push_str(&regex::escape(rest));
        let regex = Regex::new(&pattern).map_err(|source| Error::RegexCompile {
            pattern,
            source,
        })?;
        Ok(Self { regex })
    }
}

impl Operator for Restpath {
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool {
        let caps = match self.regex.captures(value) {
            Some(caps) => caps,
            None => return false,
        };
        let pairs: Vec<(String, String)> = self
            .regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                caps.name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();
        let variables = tx.variables_mut();
        for (name, segment) in pairs {
            if let Some(map) = variables.map_mut(VariableKind::ArgsPath) {
                map.set(&name, &segment);
            }
        }
        true
    }

    fn name(&self) -> &'static str {
        "restpath"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RuleGroup, Waf, WafConfig};

    fn test_tx() -> Transaction {
        Waf::new(WafConfig::default(), RuleGroup::new()).new_transaction()
    }

    #[test]
    fn rx_matches_and_captures() {
        let op = Rx::new(r"user=(\w+)").unwrap();
        let mut tx = test_tx();
        assert!(op.evaluate(&mut tx, "user=john"));
        assert!(!op.evaluate(&mut tx, "name=john"));

        tx.capture = true;
        assert!(op.evaluate(&mut tx, "user=john"));
        let vars = tx.variables();
        let tx_map = vars.map(VariableKind::Tx).unwrap();
        assert_eq!(tx_map.get_first("0"), Some("user=john"));
        assert_eq!(tx_map.get_first("1"), Some("john"));
    }

    #[test]
    fn rx_rejects_bad_pattern_at_build() {
        assert!(Rx::new("(unclosed").is_err());
    }

    #[test]
    fn pm_is_case_insensitive_leftmost_longest() {
        let op = Pm::new("root admin administrator").unwrap();
        let mut tx = test_tx();
        assert!(op.evaluate(&mut tx, "the ADMINISTRATOR logged in"));
        assert!(!op.evaluate(&mut tx, "guest"));

        tx.capture = true;
        assert!(op.evaluate(&mut tx, "Administrator"));
        // Leftmost-longest picks the whole word over the "admin" prefix.
        let vars = tx.variables();
        assert_eq!(
            vars.map(VariableKind::Tx).unwrap().get_first("0"),
            Some("Administrator")
        );
    }

    #[test]
    fn pm_from_dataset() {
        let mut datasets = HashMap::new();
        datasets.insert("bad".to_string(), vec!["evil".to_string()]);
        let op = Pm::from_dataset("bad", &datasets).unwrap();
        let mut tx = test_tx();
        assert!(op.evaluate(&mut tx, "some evil here"));
        assert!(Pm::from_dataset("missing", &datasets).is_err());
    }

    #[test]
    fn restpath_extracts_named_segments() {
        let op = Restpath::new("/users/{id}/posts/{post_id}").unwrap();
        let mut tx = test_tx();
        assert!(op.evaluate(&mut tx, "/users/42/posts/7"));
        let vars = tx.variables();
        let path = vars.map(VariableKind::ArgsPath).unwrap();
        assert_eq!(path.get_first("id"), Some("42"));
        assert_eq!(path.get_first("post_id"), Some("7"));

        assert!(!op.evaluate(&mut tx, "/users/42"));
    }

    #[test]
    fn restpath_rejects_bad_template() {
        assert!(Restpath::new("/users/{id").is_err());
        assert!(Restpath::new("/users/{bad name}").is_err());
    }
}
