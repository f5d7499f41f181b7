//! # Module cache (C5)
//!
//! Process-wide, contract-address-keyed store of validated, link-resolved
//! WASM modules. Readers never block each other; insertion is idempotent
//! under concurrent invocations targeting the same key via entry-style
//! insert-if-absent, matching the design's "safe for concurrent readers,
//! single writer per key" contract.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use wasmi::Module;

/// A cached module plus the `keccak256(code)` it was compiled from, so
/// callers can detect staleness after a code upgrade without re-hashing.
#[derive(Clone)]
pub struct CachedModule {
    /// The validated, link-resolved module template. Instantiating it per
    /// invocation gives each frame a private memory view over shared,
    /// immutable code — cloning a `wasmi::Module` is a cheap `Arc` bump.
    pub module: Module,
    /// `keccak256` of the bytecode this module was compiled from.
    pub code_hash: crate::domain::value_objects::Hash,
}

/// Concurrent, contract-address-keyed module store.
#[derive(Default)]
pub struct ModuleCache {
    inner: RwLock<HashMap<String, Arc<CachedModule>>>,
}

impl ModuleCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a cheap clone of the cached entry for `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CachedModule>> {
        self.inner.read().expect("module cache poisoned").get(name).cloned()
    }

    /// Inserts `entry` under `name` if no entry exists yet, returning the
    /// entry now on record (either the one just inserted, or a concurrent
    /// writer's, whichever landed first).
    pub fn get_or_insert_with(&self, name: &str, make: impl FnOnce() -> CachedModule) -> Arc<CachedModule> {
        if let Some(existing) = self.get(name) {
            return existing;
        }
        let mut guard = self.inner.write().expect("module cache poisoned");
        guard
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(make()))
            .clone()
    }

    /// Evicts the entry for `name`, invoked on self-destruct and on code
    /// upgrade.
    pub fn delete(&self, name: &str) {
        self.inner.write().expect("module cache poisoned").remove(name);
    }

    /// True when `name` currently has a cached entry.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().expect("module cache poisoned").contains_key(name)
    }

    /// Number of cached entries, for diagnostics and tests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().expect("module cache poisoned").len()
    }

    /// True when the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Hash;

    fn trivial_module() -> Module {
        // The smallest valid WASM module: magic + version, no sections.
        let wat = wasmi::Engine::default();
        Module::new(&wat, &b"\0asm\x01\0\0\0"[..]).expect("trivial module parses")
    }

    #[test]
    fn insert_then_get_round_trips() {
        let cache = ModuleCache::new();
        assert!(cache.get("0xabc").is_none());
        let inserted = cache.get_or_insert_with("0xabc", || CachedModule {
            module: trivial_module(),
            code_hash: Hash::ZERO,
        });
        assert!(cache.contains("0xabc"));
        let fetched = cache.get("0xabc").unwrap();
        assert_eq!(Arc::as_ptr(&inserted), Arc::as_ptr(&fetched));
    }

    #[test]
    fn insert_is_idempotent_per_key() {
        let cache = ModuleCache::new();
        let first = cache.get_or_insert_with("k", || CachedModule {
            module: trivial_module(),
            code_hash: Hash::ZERO,
        });
        let second = cache.get_or_insert_with("k", || CachedModule {
            module: trivial_module(),
            code_hash: Hash::new([1u8; 32]),
        });
        assert_eq!(Arc::as_ptr(&first), Arc::as_ptr(&second));
        assert_eq!(cache.get("k").unwrap().code_hash, Hash::ZERO);
    }

    #[test]
    fn delete_evicts() {
        let cache = ModuleCache::new();
        cache.get_or_insert_with("k", || CachedModule {
            module: trivial_module(),
            code_hash: Hash::ZERO,
        });
        cache.delete("k");
        assert!(!cache.contains("k"));
    }
}
