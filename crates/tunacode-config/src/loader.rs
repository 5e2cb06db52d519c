// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::Config;

/// Fatal configuration error: the file exists but cannot be parsed, or the
/// directory it lives in cannot be created. Never silently falls back to
/// defaults — only a *missing* file gets defaults.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config at {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("config at {path} is not valid JSON: {source}")]
    Parse { path: PathBuf, #[source] source: serde_json::Error },
    #[error("writing default config to {path}: {source}")]
    Write { path: PathBuf, #[source] source: std::io::Error },
    #[error("could not determine a config directory for this platform")]
    NoConfigDir,
}

/// The single recognized config file path: `$XDG_CONFIG_HOME/tunacode.json`
/// (or the platform equivalent via the `dirs` crate).
pub fn config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|d| d.join("tunacode.json"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Load configuration from the single JSON config file.
///
/// - Missing file: write `Config::default()` as pretty JSON, then return it.
/// - Malformed JSON: fatal `ConfigError::Parse`, never silently defaulted.
/// - Present and valid: parsed as-is, unknown keys preserved in `extra`.
pub fn load() -> Result<Config, ConfigError> {
    load_from(&config_path()?)
}

/// Load (or bootstrap) configuration at an explicit path. Exposed separately
/// so tests and `--config` style overrides don't depend on the real home
/// directory.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        debug!(path = %path.display(), "config file missing, writing defaults");
        let defaults = Config::default();
        write_to(path, &defaults)?;
        return Ok(defaults);
    }

    debug!(path = %path.display(), "loading config");
    let text = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    serde_json::from_str(&text)
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

fn write_to(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })?;
    }
    let text = serde_json::to_string_pretty(config).expect("Config serializes infallibly");
    std::fs::write(path, text).map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_writes_and_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tunacode.json");
        assert!(!path.exists());
        let cfg = load_from(&path).unwrap();
        assert_eq!(cfg.settings.max_iterations, 20);
        assert!(path.exists(), "defaults should be persisted");
    }

    #[test]
    fn invalid_json_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tunacode.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn valid_file_round_trips_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tunacode.json");
        std::fs::write(
            &path,
            r#"{"default_model":"anthropic:claude-opus","mystery_field":42}"#,
        )
        .unwrap();
        let cfg = load_from(&path).unwrap();
        assert_eq!(cfg.default_model.as_deref(), Some("anthropic:claude-opus"));
        assert_eq!(cfg.extra.get("mystery_field").unwrap(), 42);
    }
}
