// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use crate::metadata::{stat_mtime_ns, CacheMetadata};

/// Decides whether a cached value is still usable. Consulted on every
/// `Cache::get` before the stored value is returned.
pub trait CacheStrategy: Send + Sync {
    fn is_valid(&self, metadata: Option<&CacheMetadata>) -> bool;
}

/// Never expires on its own; callers invalidate explicitly via `delete`.
/// The right choice for values with no on-disk source to drift from
/// (registries loaded once, settings derived purely from config).
pub struct ManualStrategy;

impl CacheStrategy for ManualStrategy {
    fn is_valid(&self, _metadata: Option<&CacheMetadata>) -> bool {
        true
    }
}

/// Valid only while a tracked file's mtime matches what was recorded when
/// the value was cached. A missing entry's metadata (`None`) is always
/// invalid — a value stamped by this strategy must carry mtime metadata.
pub struct MtimeStrategy;

impl CacheStrategy for MtimeStrategy {
    fn is_valid(&self, metadata: Option<&CacheMetadata>) -> bool {
        match metadata {
            Some(CacheMetadata::Mtime(m)) => stat_mtime_ns(&m.path) == m.mtime_ns,
            None => false,
        }
    }
}
