// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_max_retries() -> u32 {
    3
}

fn default_max_iterations() -> u32 {
    20
}

fn default_true() -> bool {
    true
}

fn default_context_window_size() -> u32 {
    8000
}

fn default_max_command_output() -> u32 {
    100_000
}

fn default_lsp_timeout() -> u32 {
    5000
}

/// Root configuration object. Round-trips through JSON losslessly: any key
/// this schema does not recognize is preserved in `extra` and re-emitted on
/// save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    #[serde(default)]
    pub env: EnvConfig,

    #[serde(default)]
    pub settings: Settings,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_model: None,
            env: EnvConfig::default(),
            settings: Settings::default(),
            extra: Map::new(),
        }
    }
}

/// Credentials. Keys match the environment variable names an operator would
/// otherwise export by hand, so a config file doubles as a portable env
/// bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvConfig {
    #[serde(rename = "ANTHROPIC_API_KEY", default, skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,
    #[serde(rename = "OPENAI_API_KEY", default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(rename = "GEMINI_API_KEY", default, skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    #[serde(rename = "OPENROUTER_API_KEY", default, skip_serializing_if = "Option::is_none")]
    pub openrouter_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_true")]
    pub fallback_response: bool,
    #[serde(default = "default_true")]
    pub enable_streaming: bool,
    #[serde(default = "default_context_window_size")]
    pub context_window_size: u32,
    /// `null` means "use the model's advertised completion cap".
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_max_command_output")]
    pub max_command_output: u32,
    #[serde(default)]
    pub ripgrep: Map<String, Value>,
    #[serde(default)]
    pub lsp: LspSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            max_iterations: default_max_iterations(),
            fallback_response: true,
            enable_streaming: true,
            context_window_size: default_context_window_size(),
            max_tokens: None,
            ripgrep: Map::new(),
            lsp: LspSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_lsp_timeout")]
    pub timeout: u32,
}

impl Default for LspSettings {
    fn default() -> Self {
        Self { enabled: false, timeout: default_lsp_timeout() }
    }
}

/// Feature flags read from `TUNACODE_FF_<FLAG>` environment variables.
/// Unset ⇒ the flag defaults to `false`; any of `1`, `true`, `yes`, `on`
/// (case-insensitive) turns it on.
#[derive(Debug, Clone, Default)]
pub struct FeatureFlags {
    flags: std::collections::HashSet<String>,
}

impl FeatureFlags {
    const PREFIX: &'static str = "TUNACODE_FF_";

    /// Scan the process environment for `TUNACODE_FF_*` variables.
    pub fn from_env() -> Self {
        let mut flags = std::collections::HashSet::new();
        for (key, value) in std::env::vars() {
            if let Some(name) = key.strip_prefix(Self::PREFIX) {
                if is_truthy(&value) {
                    flags.insert(name.to_string());
                }
            }
        }
        Self { flags }
    }

    pub fn is_enabled(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
