//! Per-transaction variable storage and resolution.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Datelike, Local, Timelike};
use tracing::{error, warn};

use super::{MatchData, SelectorKey, Shape, VarMap, VariableKind};

/// All variable state owned by one transaction.
///
/// Scalar kinds live in a kind-indexed table, keyed kinds in one map each.
/// Views (`ARGS`, `*_NAMES`, the size aggregates) are computed on demand
/// from the backing maps and never stored.
#[derive(Debug)]
pub struct TransactionVariables {
    singles: HashMap<VariableKind, String>,
    maps: HashMap<VariableKind, VarMap>,
    argument_limit: usize,
    created: Instant,
}

const MAP_KINDS: [VariableKind; 24] = [
    VariableKind::ArgsGet,
    VariableKind::ArgsPath,
    VariableKind::ArgsPost,
    VariableKind::Env,
    VariableKind::Files,
    VariableKind::FilesNames,
    VariableKind::FilesSizes,
    VariableKind::FilesTmpContent,
    VariableKind::FilesTmpNames,
    VariableKind::Geo,
    VariableKind::Json,
    VariableKind::MatchedVars,
    VariableKind::MatchedVarsNames,
    VariableKind::MultipartFilename,
    VariableKind::MultipartName,
    VariableKind::MultipartPartHeaders,
    VariableKind::RequestCookies,
    VariableKind::RequestHeaders,
    VariableKind::ResponseArgs,
    VariableKind::ResponseHeaders,
    VariableKind::ResponseXml,
    VariableKind::Rule,
    VariableKind::Tx,
    VariableKind::Xml,
];

#[cfg(feature = "case-sensitive-args-keys")]
fn is_args_map(kind: VariableKind) -> bool {
    matches!(
        kind,
        VariableKind::ArgsGet | VariableKind::ArgsPost | VariableKind::ArgsPath
    )
}

impl TransactionVariables {
    /// Create empty storage. `argument_limit` caps the entry count of each
    /// argument map; writes beyond it are dropped with a warning.
    pub fn new(argument_limit: usize) -> Self {
        let mut maps = HashMap::with_capacity(MAP_KINDS.len());
        for kind in MAP_KINDS {
            #[cfg(feature = "case-sensitive-args-keys")]
            let map = if is_args_map(kind) {
                VarMap::new_case_sensitive(kind)
            } else {
                VarMap::new(kind)
            };
            #[cfg(not(feature = "case-sensitive-args-keys"))]
            let map = VarMap::new(kind);
            maps.insert(kind, map);
        }
        Self {
            singles: HashMap::new(),
            maps,
            argument_limit,
            created: Instant::now(),
        }
    }

    /// Drop all stored data, keeping map allocations for reuse.
    pub fn reset(&mut self) {
        self.singles.clear();
        for map in self.maps.values_mut() {
            map.clear();
        }
        self.created = Instant::now();
    }

    /// Value of a scalar kind, empty string when unset.
    pub fn single(&self, kind: VariableKind) -> &str {
        self.singles.get(&kind).map(String::as_str).unwrap_or("")
    }

    /// Set a scalar kind. Writes to keyed kinds are logged and dropped.
    pub fn set_single(&mut self, kind: VariableKind, value: impl Into<String>) {
        match kind.shape() {
            Shape::Single | Shape::Time => {
                self.singles.insert(kind, value.into());
            }
            _ => error!(variable = kind.name(), "scalar write to keyed variable"),
        }
    }

    /// The backing map of a keyed kind.
    pub fn map(&self, kind: VariableKind) -> Option<&VarMap> {
        self.maps.get(&kind)
    }

    /// Mutable backing map of a keyed kind. Logs and returns `None` for
    /// kinds without storage (scalars and computed views).
    pub fn map_mut(&mut self, kind: VariableKind) -> Option<&mut VarMap> {
        let map = self.maps.get_mut(&kind);
        if map.is_none() {
            error!(variable = kind.name(), "keyed write to unkeyed variable");
        }
        map
    }

    fn add_argument(&mut self, kind: VariableKind, key: &str, value: &str) {
        let limit = self.argument_limit;
        if let Some(map) = self.maps.get_mut(&kind) {
            if map.len() >= limit {
                warn!(
                    variable = kind.name(),
                    limit, "argument limit exceeded, dropping argument"
                );
                return;
            }
            map.add(key, value);
        }
    }

    /// Add a query-string argument, subject to the argument limit.
    pub fn add_get_argument(&mut self, key: &str, value: &str) {
        self.add_argument(VariableKind::ArgsGet, key, value);
    }

    /// Add a body argument, subject to the argument limit.
    pub fn add_post_argument(&mut self, key: &str, value: &str) {
        self.add_argument(VariableKind::ArgsPost, key, value);
    }

    /// Add a path argument, subject to the argument limit.
    pub fn add_path_argument(&mut self, key: &str, value: &str) {
        self.add_argument(VariableKind::ArgsPath, key, value);
    }

    /// Fill the clock kinds from a wall-clock timestamp.
    pub fn populate_clock(&mut self, now: DateTime<Local>) {
        self.singles
            .insert(VariableKind::Time, now.format("%H:%M:%S").to_string());
        self.singles
            .insert(VariableKind::TimeDay, now.day().to_string());
        self.singles
            .insert(VariableKind::TimeEpoch, now.timestamp().to_string());
        self.singles
            .insert(VariableKind::TimeHour, now.hour().to_string());
        self.singles
            .insert(VariableKind::TimeMin, now.minute().to_string());
        self.singles
            .insert(VariableKind::TimeMon, now.month().to_string());
        self.singles
            .insert(VariableKind::TimeSec, now.second().to_string());
        self.singles.insert(
            VariableKind::TimeWday,
            now.weekday().num_days_from_sunday().to_string(),
        );
        self.singles
            .insert(VariableKind::TimeYear, now.year().to_string());
    }

    /// Milliseconds elapsed since this storage was (re)created.
    fn duration_millis(&self) -> u128 {
        self.created.elapsed().as_millis()
    }

    fn names_backing(kind: VariableKind) -> &'static [VariableKind] {
        match kind {
            VariableKind::ArgsNames => &[
                VariableKind::ArgsGet,
                VariableKind::ArgsPost,
                VariableKind::ArgsPath,
            ],
            VariableKind::ArgsGetNames => &[VariableKind::ArgsGet],
            VariableKind::ArgsPostNames => &[VariableKind::ArgsPost],
            VariableKind::RequestHeadersNames => &[VariableKind::RequestHeaders],
            VariableKind::ResponseHeadersNames => &[VariableKind::ResponseHeaders],
            VariableKind::RequestCookiesNames => &[VariableKind::RequestCookies],
            _ => &[],
        }
    }

    fn find_single(&self, kind: VariableKind, key: &SelectorKey, value: String) -> Vec<MatchData> {
        if !matches!(key, SelectorKey::All) {
            error!(variable = kind.name(), "key selector on unkeyed variable");
            return Vec::new();
        }
        vec![MatchData {
            variable: kind,
            value,
            ..MatchData::default()
        }]
    }

    /// Resolve a kind against a key selector.
    ///
    /// Scalars yield exactly one entry (possibly empty); keyed kinds yield
    /// one entry per selected pair in insertion order. A key selector on a
    /// scalar is a logged error yielding nothing.
    pub fn find(&self, kind: VariableKind, key: &SelectorKey) -> Vec<MatchData> {
        match kind.shape() {
            Shape::Single | Shape::Time => {
                let value = if kind == VariableKind::Duration {
                    self.duration_millis().to_string()
                } else {
                    self.single(kind).to_string()
                };
                self.find_single(kind, key, value)
            }
            Shape::Size => {
                let size = match kind {
                    VariableKind::ArgsCombinedSize => [
                        VariableKind::ArgsGet,
                        VariableKind::ArgsPost,
                        VariableKind::ArgsPath,
                    ]
                    .iter()
                    .filter_map(|k| self.maps.get(k))
                    .map(VarMap::values_size)
                    .sum::<u64>(),
                    _ => self
                        .maps
                        .get(&VariableKind::FilesSizes)
                        .map(VarMap::values_numeric_sum)
                        .unwrap_or(0),
                };
                self.find_single(kind, key, size.to_string())
            }
            Shape::Map => {
                let Some(map) = self.maps.get(&kind) else {
                    return Vec::new();
                };
                match key {
                    SelectorKey::All => map.find_all(),
                    SelectorKey::Str(k) => map.find_string(k),
                    SelectorKey::Rx(re) => map.find_regex(re),
                }
            }
            Shape::KeyedView => {
                let mut out = Vec::new();
                for backing in Self::names_backing(kind) {
                    let Some(map) = self.maps.get(backing) else {
                        continue;
                    };
                    for name in map.key_names() {
                        let selected = match key {
                            SelectorKey::All => true,
                            SelectorKey::Str(k) => name.eq_ignore_ascii_case(k),
                            SelectorKey::Rx(re) => re.is_match(&name.to_ascii_lowercase()),
                        };
                        if selected {
                            out.push(MatchData {
                                variable: kind,
                                value: name.to_string(),
                                ..MatchData::default()
                            });
                        }
                    }
                }
                out
            }
            Shape::ConcatKeyed => {
                let mut out = Vec::new();
                for backing in [
                    VariableKind::ArgsGet,
                    VariableKind::ArgsPost,
                    VariableKind::ArgsPath,
                ] {
                    for mut md in self.find(backing, key) {
                        md.variable = kind;
                        out.push(md);
                    }
                }
                out
            }
        }
    }

    /// First resolved value for a kind/key pair, empty when nothing
    /// resolves. Used by expansion templates.
    pub fn first_value(&self, kind: VariableKind, key: &str) -> String {
        let selector = if key.is_empty() {
            SelectorKey::All
        } else {
            SelectorKey::Str(key.to_string())
        };
        self.find(kind, &selector)
            .into_iter()
            .next()
            .map(|md| md.value)
            .unwrap_or_default()
    }

    /// Record an operator match in the matched-variable kinds.
    pub fn match_variable(&mut self, md: &MatchData) {
        let name = md.full_name();
        let name_l = if md.key.is_empty() {
            name.clone()
        } else {
            format!("{}:{}", md.variable.name(), md.key.to_ascii_lowercase())
        };
        self.singles
            .insert(VariableKind::MatchedVar, md.value.clone());
        self.singles.insert(VariableKind::MatchedVarName, name);
        if let Some(vars) = self.maps.get_mut(&VariableKind::MatchedVars) {
            vars.set(&name_l, &md.value);
        }
        if let Some(names) = self.maps.get_mut(&VariableKind::MatchedVarsNames) {
            names.add_unique(&name_l, &md.full_name());
        }
    }

    /// Clear the matched-variable kinds. Done before each rule runs.
    pub fn clear_matched_vars(&mut self) {
        if let Some(vars) = self.maps.get_mut(&VariableKind::MatchedVars) {
            vars.clear();
        }
        if let Some(names) = self.maps.get_mut(&VariableKind::MatchedVarsNames) {
            names.clear();
        }
    }

    /// Write a capture slot (`TX:0` through `TX:9`).
    pub fn capture_field(&mut self, index: usize, value: &str) {
        if index > 9 {
            return;
        }
        if let Some(tx) = self.maps.get_mut(&VariableKind::Tx) {
            tx.set(&index.to_string(), value);
        }
    }

    /// Blank all ten capture slots.
    pub fn reset_capture_slots(&mut self) {
        if let Some(tx) = self.maps.get_mut(&VariableKind::Tx) {
            for i in 0..10 {
                tx.set(&i.to_string(), "");
            }
        }
    }
}
