// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Mtime-invalidated cache for per-root ignore-pattern state (the compiled
//! form of a project's `.gitignore`). Keyed by the resolved project root;
//! invalidated whenever that root's `.gitignore` mtime changes.

use std::path::Path;

use crate::manager::{get_cache, register_cache};
use crate::metadata::{CacheMetadata, MtimeMetadata};
use crate::strategies::MtimeStrategy;

pub const IGNORE_MANAGER_CACHE_NAME: &str = "tunacode.ignore_manager";

fn cache() -> &'static crate::manager::Cache {
    register_cache(IGNORE_MANAGER_CACHE_NAME, Box::new(MtimeStrategy));
    get_cache(IGNORE_MANAGER_CACHE_NAME)
}

fn key(root: &Path) -> String {
    root.to_string_lossy().into_owned()
}

/// Returns the cached ignore-manager value for `root`, or `None` if absent
/// or if `gitignore_path`'s mtime has moved on since it was cached.
pub fn get_ignore_manager<T: Clone + Send + Sync + 'static>(root: &Path) -> Option<T> {
    cache().get::<T>(&key(root))
}

pub fn set_ignore_manager<T: Send + Sync + 'static>(root: &Path, value: T, gitignore_path: &Path) {
    let cache = cache();
    let k = key(root);
    cache.set(k.clone(), value);
    cache.set_metadata(&k, CacheMetadata::Mtime(MtimeMetadata::capture(gitignore_path)));
}

pub fn invalidate_ignore_manager(root: &Path) -> bool {
    cache().delete(&key(root))
}

pub fn clear_ignore_manager_cache() {
    cache().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_for_unknown_root() {
        assert_eq!(
            get_ignore_manager::<Vec<String>>(Path::new("/tmp/tunacode_ignore_test_unknown_root")),
            None
        );
    }

    #[test]
    fn hit_while_gitignore_unchanged() {
        let dir = std::env::temp_dir().join(format!("tunacode_ignore_test_hit_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let gitignore = dir.join(".gitignore");
        std::fs::write(&gitignore, "target/\n").unwrap();

        set_ignore_manager(&dir, vec!["target/".to_string()], &gitignore);
        assert_eq!(get_ignore_manager::<Vec<String>>(&dir), Some(vec!["target/".to_string()]));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stale_after_gitignore_touched() {
        let dir = std::env::temp_dir().join(format!("tunacode_ignore_test_stale_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let gitignore = dir.join(".gitignore");
        std::fs::write(&gitignore, "target/\n").unwrap();

        set_ignore_manager(&dir, vec!["target/".to_string()], &gitignore);

        // simulate a later edit by rewriting with different content, which
        // updates the mtime on virtually every filesystem with second (or
        // finer) resolution
        std::thread::sleep(std::time::Duration::from_millis(10));
        std::fs::write(&gitignore, "target/\nnode_modules/\n").unwrap();

        assert_eq!(get_ignore_manager::<Vec<String>>(&dir), None);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn invalidate_removes_entry() {
        let dir = std::env::temp_dir().join(format!("tunacode_ignore_test_inv_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let gitignore = dir.join(".gitignore");
        std::fs::write(&gitignore, "x\n").unwrap();

        set_ignore_manager(&dir, vec!["x".to_string()], &gitignore);
        assert!(invalidate_ignore_manager(&dir));
        assert_eq!(get_ignore_manager::<Vec<String>>(&dir), None);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
