//! Ordered multi-map backing keyed variable kinds.

use regex::Regex;

use super::{MatchData, VariableKind};

#[derive(Debug, Clone)]
struct MapEntry {
    /// Key as received, original case. Reported in match output.
    key: String,
    /// Lookup key, lower-cased unless the map is case-sensitive.
    key_l: String,
    value: String,
}

/// An insertion-ordered multi-map of string keys to string values.
///
/// Duplicate keys are allowed and preserved in order. Key lookup is
/// case-insensitive by default; argument maps can be switched to
/// case-sensitive lookup at build time.
#[derive(Debug, Clone)]
pub struct VarMap {
    kind: VariableKind,
    case_sensitive: bool,
    entries: Vec<MapEntry>,
}

impl VarMap {
    /// Create an empty map for the given kind.
    pub fn new(kind: VariableKind) -> Self {
        Self {
            kind,
            case_sensitive: false,
            entries: Vec::new(),
        }
    }

    /// Create an empty map with case-sensitive key lookup.
    pub fn new_case_sensitive(kind: VariableKind) -> Self {
        Self {
            kind,
            case_sensitive: true,
            entries: Vec::new(),
        }
    }

    /// The kind this map backs.
    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    fn lookup_key(&self, key: &str) -> String {
        if self.case_sensitive {
            key.to_string()
        } else {
            key.to_ascii_lowercase()
        }
    }

    /// Append a key/value pair, keeping any existing pairs under the key.
    pub fn add(&mut self, key: &str, value: &str) {
        let key_l = self.lookup_key(key);
        self.entries.push(MapEntry {
            key: key.to_string(),
            key_l,
            value: value.to_string(),
        });
    }

    /// Append a key/value pair only when the key is not present yet.
    pub fn add_unique(&mut self, key: &str, value: &str) {
        let key_l = self.lookup_key(key);
        if self.entries.iter().any(|e| e.key_l == key_l) {
            return;
        }
        self.entries.push(MapEntry {
            key: key.to_string(),
            key_l,
            value: value.to_string(),
        });
    }

    /// Replace the value under a key. The first occurrence keeps its
    /// position, later duplicates are removed. Absent keys are appended.
    pub fn set(&mut self, key: &str, value: &str) {
        let key_l = self.lookup_key(key);
        let mut found = false;
        self.entries.retain_mut(|e| {
            if e.key_l != key_l {
                return true;
            }
            if found {
                return false;
            }
            found = true;
            e.key = key.to_string();
            e.value = value.to_string();
            true
        });
        if !found {
            self.entries.push(MapEntry {
                key: key.to_string(),
                key_l,
                value: value.to_string(),
            });
        }
    }

    /// Remove every pair under the key.
    pub fn remove(&mut self, key: &str) {
        let key_l = self.lookup_key(key);
        self.entries.retain(|e| e.key_l != key_l);
    }

    /// All values stored under a key, in insertion order.
    pub fn get(&self, key: &str) -> Vec<&str> {
        let key_l = self.lookup_key(key);
        self.entries
            .iter()
            .filter(|e| e.key_l == key_l)
            .map(|e| e.value.as_str())
            .collect()
    }

    /// First value stored under a key.
    pub fn get_first(&self, key: &str) -> Option<&str> {
        let key_l = self.lookup_key(key);
        self.entries
            .iter()
            .find(|e| e.key_l == key_l)
            .map(|e| e.value.as_str())
    }

    /// Every pair as match data, in insertion order.
    pub fn find_all(&self) -> Vec<MatchData> {
        self.entries
            .iter()
            .map(|e| MatchData {
                variable: self.kind,
                key: e.key.clone(),
                value: e.value.clone(),
                ..MatchData::default()
            })
            .collect()
    }

    /// Pairs whose key equals the selector key.
    pub fn find_string(&self, key: &str) -> Vec<MatchData> {
        let key_l = self.lookup_key(key);
        self.entries
            .iter()
            .filter(|e| e.key_l == key_l)
            .map(|e| MatchData {
                variable: self.kind,
                key: e.key.clone(),
                value: e.value.clone(),
                ..MatchData::default()
            })
            .collect()
    }

    /// Pairs whose lookup key matches the regex.
    pub fn find_regex(&self, re: &Regex) -> Vec<MatchData> {
        self.entries
            .iter()
            .filter(|e| re.is_match(&e.key_l))
            .map(|e| MatchData {
                variable: self.kind,
                key: e.key.clone(),
                value: e.value.clone(),
                ..MatchData::default()
            })
            .collect()
    }

    /// Key names of every pair, original case, in insertion order.
    pub(crate) fn key_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    /// Sum of value byte lengths.
    pub(crate) fn values_size(&self) -> u64 {
        self.entries.iter().map(|e| e.value.len() as u64).sum()
    }

    /// Sum of values parsed as integers, ignoring unparsable ones.
    pub(crate) fn values_numeric_sum(&self) -> u64 {
        self.entries
            .iter()
            .filter_map(|e| e.value.parse::<u64>().ok())
            .sum()
    }

    /// Number of stored pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all pairs, keeping allocated capacity.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> VarMap {
        VarMap::new(VariableKind::ArgsGet)
    }

    #[test]
    fn preserves_insertion_order_with_duplicates() {
        let mut m = map();
        m.add("a", "1");
        m.add("b", "2");
        m.add("a", "3");
        let all = m.find_all();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].value, "1");
        assert_eq!(all[1].value, "2");
        assert_eq!(all[2].value, "3");
        assert_eq!(m.get("a"), vec!["1", "3"]);
    }

    #[test]
    fn lookup_is_case_insensitive_by_default() {
        let mut m = VarMap::new(VariableKind::RequestHeaders);
        m.add("Content-Type", "text/html");
        assert_eq!(m.get_first("content-type"), Some("text/html"));
        let found = m.find_string("CONTENT-TYPE");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, "Content-Type");
    }

    #[test]
    fn case_sensitive_lookup() {
        let mut m = VarMap::new_case_sensitive(VariableKind::ArgsGet);
        m.add("Token", "x");
        assert!(m.get("token").is_empty());
        assert_eq!(m.get_first("Token"), Some("x"));
    }

    #[test]
    fn set_replaces_in_place() {
        let mut m = map();
        m.add("a", "1");
        m.add("b", "2");
        m.add("a", "3");
        m.set("a", "9");
        let all = m.find_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].key, "a");
        assert_eq!(all[0].value, "9");
        assert_eq!(all[1].key, "b");
    }

    #[test]
    fn add_unique_skips_existing() {
        let mut m = map();
        m.add_unique("a", "1");
        m.add_unique("A", "2");
        assert_eq!(m.len(), 1);
        assert_eq!(m.get_first("a"), Some("1"));
    }

    #[test]
    fn regex_find_matches_lowered_keys() {
        let mut m = VarMap::new(VariableKind::RequestHeaders);
        m.add("X-Forwarded-For", "1.2.3.4");
        m.add("Host", "example.com");
        let re = Regex::new("^x-").unwrap();
        let found = m.find_regex(&re);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, "X-Forwarded-For");
    }

    #[test]
    fn remove_and_sizes() {
        let mut m = map();
        m.add("a", "12");
        m.add("b", "345");
        assert_eq!(m.values_size(), 5);
        m.remove("a");
        assert_eq!(m.len(), 1);
        assert_eq!(m.values_size(), 3);
    }

    #[test]
    fn numeric_sum_skips_unparsable() {
        let mut m = VarMap::new(VariableKind::FilesSizes);
        m.add("f1", "100");
        m.add("f2", "abc");
        m.add("f3", "20");
        assert_eq!(m.values_numeric_sum(), 120);
    }
}
