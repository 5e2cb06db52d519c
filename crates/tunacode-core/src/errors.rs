// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Error kinds for the orchestrator core. Each maps to one of the
//! contractual error kinds: `ConfigurationError` lives in `tunacode-config`;
//! the rest are defined here since they arise inside message handling, tool
//! dispatch, and the iteration loop.

use thiserror::Error;

/// Malformed or unrecognised tool-call arguments. Recoverable: the
/// Dispatcher turns this into a `ToolReturnPart` so the model can retry —
/// it never aborts the loop.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("tool arguments are neither a JSON object nor a JSON-encoded string: {0}")]
    NotJsonObject(String),
    #[error("failed to parse tool arguments as JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

/// A tool body failed. Recoverable like [`ValidationError`] — wrapped into a
/// `ToolReturnPart` by the Dispatcher, never propagated.
#[derive(Debug, Error)]
pub enum ToolExecutionError {
    #[error("tool '{tool_name}' failed: {message}")]
    Failed { tool_name: String, message: String },
    #[error("tool '{tool_name}' timed out after {secs}s")]
    Timeout { tool_name: String, secs: u64 },
}

/// The user pressed ESC/Ctrl+C mid-request.
#[derive(Debug, Error)]
#[error("operation cancelled by user")]
pub struct UserAbortError;

/// A history or registry invariant was violated (e.g. a `ToolCallPart`
/// missing `args` at dispatch time, or a duplicate `tool_call_id`
/// registration with a conflicting name). The Sanitizer attempts repair;
/// if repair fails this surfaces to the user and aborts the current
/// request, not the process.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("tool call '{0}' is missing its arguments at dispatch time")]
    MissingArgsAtDispatch(String),
    #[error("tool call '{tool_call_id}' re-registered with conflicting name: had '{existing_name}', got '{new_name}'")]
    ConflictingRegistration {
        tool_call_id: String,
        existing_name: String,
        new_name: String,
    },
    #[error("sanitizer repair failed to restore invariant M1 after {attempts} attempts")]
    RepairFailed { attempts: usize },
}

/// The underlying model SDK failed (401, 429, 5xx, network error). Bubbles
/// to the REPL with a plain message; the loop does not retry indefinitely.
#[derive(Debug, Error)]
pub enum ChatProviderError {
    #[error("model provider error: {0}")]
    Provider(#[from] anyhow::Error),
}
