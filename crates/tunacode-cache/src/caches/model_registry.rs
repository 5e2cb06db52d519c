// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Manual-strategy single-slot cache for the loaded model registry (the
//! catalog of known provider/model pairs and their capabilities). Nothing
//! on disk backs its staleness — it's loaded once per process and cleared
//! explicitly when the caller knows the catalog changed (e.g. after a
//! config reload).

use crate::manager::{get_cache, register_cache};
use crate::strategies::ManualStrategy;

pub const MODEL_REGISTRY_CACHE_NAME: &str = "tunacode.model_registry";
const REGISTRY_KEY: &str = "registry";

fn cache() -> &'static crate::manager::Cache {
    register_cache(MODEL_REGISTRY_CACHE_NAME, Box::new(ManualStrategy));
    get_cache(MODEL_REGISTRY_CACHE_NAME)
}

pub fn get_model_registry<T: Clone + Send + Sync + 'static>() -> Option<T> {
    cache().get::<T>(REGISTRY_KEY)
}

pub fn set_model_registry<T: Send + Sync + 'static>(registry: T) {
    cache().set(REGISTRY_KEY, registry);
}

pub fn clear_model_registry_cache() {
    cache().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    // Both cases share the single process-global registry slot, so they
    // run as one test rather than two that could race on the same key.
    #[test]
    fn set_get_and_clear_roundtrip() {
        set_model_registry(vec!["openai:gpt-5".to_string(), "anthropic:opus".to_string()]);
        assert_eq!(
            get_model_registry::<Vec<String>>(),
            Some(vec!["openai:gpt-5".to_string(), "anthropic:opus".to_string()])
        );

        clear_model_registry_cache();
        assert_eq!(get_model_registry::<Vec<String>>(), None);
    }
}
