//! Per-transaction transformation result cache.

use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::variables::VariableKind;

struct SetRegistry {
    next: usize,
    ids: HashMap<(usize, String), usize>,
}

/// Process-wide registry of transformation set identities.
///
/// A set id names an ordered list of transformations. Appending a
/// transformation to a known set yields a stable id, so rules sharing a
/// pipeline prefix share cache entries. Ids are handed out monotonically;
/// the empty set is id zero.
static SET_REGISTRY: Lazy<Mutex<SetRegistry>> = Lazy::new(|| {
    Mutex::new(SetRegistry {
        next: 1,
        ids: HashMap::new(),
    })
});

/// Id of the set formed by appending `name` to the set `parent`.
pub(crate) fn set_id_for(parent: usize, name: &str) -> usize {
    let mut registry = SET_REGISTRY
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let key = (parent, name.to_string());
    if let Some(id) = registry.ids.get(&key) {
        return *id;
    }
    let id = registry.next;
    registry.next += 1;
    registry.ids.insert(key, id);
    id
}

/// Cache key: which value (kind, iteration index, map key) transformed by
/// which pipeline (set id).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    pub variable: VariableKind,
    pub index: usize,
    pub key: String,
    pub set_id: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub value: String,
    pub errors: Vec<String>,
}

/// Transformation results memoized within a single phase.
///
/// `TX`-sourced values and multi-match pipelines are never cached; the
/// owning transaction clears the cache at the start of every phase.
#[derive(Debug, Default)]
pub(crate) struct TransformationCache {
    entries: HashMap<CacheKey, CacheEntry>,
}

impl TransformationCache {
    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: CacheKey, value: String, errors: Vec<String>) {
        self.entries.insert(key, CacheEntry { value, errors });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
