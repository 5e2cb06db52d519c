// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Mtime-invalidated cache for per-tool system-prompt assets loaded from
//! disk. A tool may legitimately have no prompt asset at all, so `None` is
//! cached as a real value (a sentinel slot) rather than treated as a miss —
//! callers need to distinguish "not yet looked up" from "looked up, found
//! nothing".

use std::path::Path;

use crate::manager::{get_cache, register_cache};
use crate::metadata::{CacheMetadata, MtimeMetadata};
use crate::strategies::MtimeStrategy;

pub const PROMPT_CACHE_NAME: &str = "tunacode.prompts";

#[derive(Clone)]
struct Slot(Option<String>);

fn cache() -> &'static crate::manager::Cache {
    register_cache(PROMPT_CACHE_NAME, Box::new(MtimeStrategy));
    get_cache(PROMPT_CACHE_NAME)
}

/// Returns `(found, prompt)`. `found` is `false` only when no lookup has
/// been cached yet (or the cached one went stale); `prompt` is `None` when
/// a lookup was cached but the tool genuinely has no prompt asset.
pub fn try_get_prompt(tool_name: &str) -> (bool, Option<String>) {
    match cache().get::<Slot>(tool_name) {
        Some(Slot(prompt)) => (true, prompt),
        None => (false, None),
    }
}

pub fn set_prompt(tool_name: &str, prompt: Option<String>, file_path: &Path) {
    let cache = cache();
    cache.set(tool_name.to_string(), Slot(prompt));
    cache.set_metadata(tool_name, CacheMetadata::Mtime(MtimeMetadata::capture(file_path)));
}

pub fn clear_prompt_cache() {
    cache().clear();
}
