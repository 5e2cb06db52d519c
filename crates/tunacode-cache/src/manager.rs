// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::metadata::CacheMetadata;
use crate::strategies::CacheStrategy;

struct Entry {
    value: Box<dyn Any + Send + Sync>,
    metadata: Option<CacheMetadata>,
}

/// A single named cache: a key/value store plus the strategy that decides
/// when a stored value has gone stale.
///
/// Values are stored type-erased (`dyn Any`) since different caches hold
/// different value types — callers retrieve with `get::<T>`, which returns
/// `None` both on a miss and on a type mismatch.
pub struct Cache {
    strategy: Box<dyn CacheStrategy>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Cache {
    pub fn new(strategy: Box<dyn CacheStrategy>) -> Self {
        Self { strategy, entries: Mutex::new(HashMap::new()) }
    }

    /// Returns a clone of the cached value for `key` if present and still
    /// valid under this cache's strategy. A stale entry is removed.
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock().unwrap();
        let valid = entries.get(key).map(|e| self.strategy.is_valid(e.metadata.as_ref()))?;
        if !valid {
            entries.remove(key);
            return None;
        }
        entries.get(key).and_then(|e| e.value.downcast_ref::<T>()).cloned()
    }

    /// Stores `value` under `key`, replacing any existing entry and its
    /// metadata. Call `set_metadata` afterwards if the strategy needs it.
    pub fn set<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.into(), Entry { value: Box::new(value), metadata: None });
    }

    /// Attaches metadata to an already-`set` entry. A no-op if the key
    /// isn't present.
    pub fn set_metadata(&self, key: &str, metadata: CacheMetadata) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(key) {
            entry.metadata = Some(metadata);
        }
    }

    /// Removes `key`, returning whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.lock().unwrap().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registry of named caches, one per typed accessor module. Mirrors the
/// singleton `CacheManager` the typed accessors register themselves
/// against at import time.
#[derive(Default)]
pub struct CacheManager {
    caches: Mutex<HashMap<String, &'static Cache>>,
}

impl CacheManager {
    fn new() -> Self {
        Self { caches: Mutex::new(HashMap::new()) }
    }

    pub fn global() -> &'static CacheManager {
        static INSTANCE: OnceLock<CacheManager> = OnceLock::new();
        INSTANCE.get_or_init(CacheManager::new)
    }

    /// Registers a cache under `name`, leaking it for the process lifetime
    /// (caches live exactly as long as the process, mirroring the
    /// module-level singletons the typed accessors register once at
    /// startup).
    pub fn register(&self, name: &str, strategy: Box<dyn CacheStrategy>) -> &'static Cache {
        let mut caches = self.caches.lock().unwrap();
        if let Some(existing) = caches.get(name) {
            return existing;
        }
        let cache: &'static Cache = Box::leak(Box::new(Cache::new(strategy)));
        caches.insert(name.to_string(), cache);
        cache
    }

    pub fn get(&self, name: &str) -> Option<&'static Cache> {
        self.caches.lock().unwrap().get(name).copied()
    }

    pub fn clear_all(&self) {
        for cache in self.caches.lock().unwrap().values() {
            cache.clear();
        }
    }
}

/// Convenience wrapper over `CacheManager::global().register(..)`, matching
/// the module-level `register_cache` free function each typed accessor
/// calls once at load time.
pub fn register_cache(name: &str, strategy: Box<dyn CacheStrategy>) -> &'static Cache {
    CacheManager::global().register(name, strategy)
}

/// Convenience wrapper over `CacheManager::global().get(..)`. Panics if
/// `name` was never registered — a programmer error, since accessor
/// modules always register their cache before use.
pub fn get_cache(name: &str) -> &'static Cache {
    CacheManager::global()
        .get(name)
        .unwrap_or_else(|| panic!("cache '{name}' was never registered"))
}
