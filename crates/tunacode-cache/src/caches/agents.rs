// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Version-aware cache for constructed per-model agents. An agent is
//! expensive to build (system prompt assembly, tool schema collection) but
//! must be rebuilt whenever its inputs change; callers pass the version
//! they'd expect a fresh build to carry and a mismatch is treated as a
//! miss.

use crate::manager::{get_cache, register_cache};
use crate::strategies::ManualStrategy;

pub const AGENT_CACHE_NAME: &str = "tunacode.agents";

#[derive(Clone)]
struct Versioned<T> {
    agent: T,
    version: u64,
}

fn cache() -> &'static crate::manager::Cache {
    register_cache(AGENT_CACHE_NAME, Box::new(ManualStrategy));
    get_cache(AGENT_CACHE_NAME)
}

/// Returns the cached agent for `model` if present and its stored version
/// matches `expected_version`. A version mismatch evicts the stale entry
/// and returns `None` rather than silently serving an outdated agent.
pub fn get_agent<T: Clone + Send + Sync + 'static>(model: &str, expected_version: u64) -> Option<T> {
    let cache = cache();
    match cache.get::<Versioned<T>>(model) {
        Some(v) if v.version == expected_version => Some(v.agent),
        Some(_) => {
            cache.delete(model);
            None
        }
        None => None,
    }
}

pub fn set_agent<T: Clone + Send + Sync + 'static>(model: &str, agent: T, version: u64) {
    cache().set(model.to_string(), Versioned { agent, version });
}

pub fn invalidate_agent(model: &str) -> bool {
    cache().delete(model)
}

pub fn clear_agents() {
    cache().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests share the process-global cache singleton, so each uses a
    // distinct key instead of clearing the cache (which would race with
    // other tests running concurrently in the same binary).

    #[test]
    fn miss_when_never_set() {
        assert_eq!(get_agent::<String>("gpt-test-miss", 1), None);
    }

    #[test]
    fn hit_when_version_matches() {
        set_agent("gpt-test-hit", "built-agent".to_string(), 3);
        assert_eq!(get_agent::<String>("gpt-test-hit", 3), Some("built-agent".to_string()));
    }

    #[test]
    fn miss_and_evicts_on_version_mismatch() {
        set_agent("gpt-test-stale", "old-agent".to_string(), 1);
        assert_eq!(get_agent::<String>("gpt-test-stale", 2), None);
        // eviction means even the original version no longer hits
        assert_eq!(get_agent::<String>("gpt-test-stale", 1), None);
    }

    #[test]
    fn invalidate_removes_entry() {
        set_agent("gpt-test-inv", "a".to_string(), 1);
        assert!(invalidate_agent("gpt-test-inv"));
        assert_eq!(get_agent::<String>("gpt-test-inv", 1), None);
        assert!(!invalidate_agent("gpt-test-inv"));
    }
}
