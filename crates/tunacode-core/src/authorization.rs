// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Rule-ordered confirmation policy (§4.E) plus the bounded preview
//! producer that keeps the confirmation UI responsive on large payloads.

use std::collections::HashSet;

use serde_json::Value;

const READ_ONLY_TOOLS: &[&str] = &["read_file", "grep", "list_dir", "glob"];

/// The outcome of consulting the policy for one tool call. `ApproveSilent`
/// runs immediately with no UI involvement; `ApproveConfirmed` still runs,
/// but only after the confirmation UI has returned an affirmative response;
/// `Reject` never runs; `Defer` means "this rule has no opinion, ask the
/// next one".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    ApproveSilent,
    ApproveConfirmed,
    Reject,
    Defer,
}

/// The state an `AuthorizationRule` consults. Distinct from the
/// orchestrator's `Runtime`/`Conversation` sub-states — this is only the
/// slice of session state the policy needs.
#[derive(Debug, Default, Clone)]
pub struct AuthorizationState {
    pub yolo: bool,
    pub tool_ignore: HashSet<String>,
    /// Tool names an active template whitelists for silent approval.
    pub template_whitelist: HashSet<String>,
}

impl AuthorizationState {
    /// Applies `skip_future=true` from a confirmation response: the tool is
    /// silently approved for the rest of the session.
    pub fn remember_always_approve(&mut self, tool_name: &str) {
        self.tool_ignore.insert(tool_name.to_string());
    }
}

pub trait AuthorizationRule: Send + Sync {
    fn decide(&self, tool_name: &str, args: &Value, state: &AuthorizationState) -> Decision;
}

pub struct ReadOnlyRule;

impl AuthorizationRule for ReadOnlyRule {
    fn decide(&self, tool_name: &str, _args: &Value, _state: &AuthorizationState) -> Decision {
        if READ_ONLY_TOOLS.contains(&tool_name) {
            Decision::ApproveSilent
        } else {
            Decision::Defer
        }
    }
}

pub struct YoloRule;

impl AuthorizationRule for YoloRule {
    fn decide(&self, _tool_name: &str, _args: &Value, state: &AuthorizationState) -> Decision {
        if state.yolo {
            Decision::ApproveSilent
        } else {
            Decision::Defer
        }
    }
}

pub struct IgnoreListRule;

impl AuthorizationRule for IgnoreListRule {
    fn decide(&self, tool_name: &str, _args: &Value, state: &AuthorizationState) -> Decision {
        if state.tool_ignore.contains(tool_name) {
            Decision::ApproveSilent
        } else {
            Decision::Defer
        }
    }
}

pub struct TemplateRule;

impl AuthorizationRule for TemplateRule {
    fn decide(&self, tool_name: &str, _args: &Value, state: &AuthorizationState) -> Decision {
        if state.template_whitelist.contains(tool_name) {
            Decision::ApproveSilent
        } else {
            Decision::Defer
        }
    }
}

pub struct DefaultConfirmRule;

impl AuthorizationRule for DefaultConfirmRule {
    fn decide(&self, _tool_name: &str, _args: &Value, _state: &AuthorizationState) -> Decision {
        Decision::ApproveConfirmed
    }
}

/// An ordered list of rules. `decide` returns the first non-`Defer`
/// outcome; `DefaultConfirmRule` is always appended last by
/// [`AuthorizationPolicy::default`] so the chain always terminates.
pub struct AuthorizationPolicy {
    rules: Vec<Box<dyn AuthorizationRule>>,
}

impl Default for AuthorizationPolicy {
    fn default() -> Self {
        Self {
            rules: vec![
                Box::new(ReadOnlyRule),
                Box::new(YoloRule),
                Box::new(IgnoreListRule),
                Box::new(TemplateRule),
                Box::new(DefaultConfirmRule),
            ],
        }
    }
}

impl AuthorizationPolicy {
    pub fn decide(&self, tool_name: &str, args: &Value, state: &AuthorizationState) -> Decision {
        for rule in &self.rules {
            match rule.decide(tool_name, args, state) {
                Decision::Defer => continue,
                decision => return decision,
            }
        }
        Decision::ApproveConfirmed
    }
}

// ─── Bounded preview producer ──────────────────────────────────────────────

pub const MAX_PREVIEW_LINES: usize = 200;
pub const MAX_CALLBACK_CONTENT: usize = 4_000;
pub const TRUNCATION_NOTICE: &str = "\n[... preview truncated ...]";

/// A rendered confirmation preview, always within the bounds above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub content: String,
    pub truncated: bool,
}

/// Builds the confirmation preview for `write_file`/`update_file` (and, by
/// extension, any tool whose args carry a `content` field worth previewing).
/// Clamping is an invariant, not a hint — a 10MB payload must never reach
/// the UI unbounded.
pub struct ConfirmationRequestFactory;

impl ConfirmationRequestFactory {
    pub fn create(tool_name: &str, args: &Value) -> Preview {
        let raw = args
            .get("content")
            .and_then(|v| v.as_str())
            .or_else(|| args.get("new_str").and_then(|v| v.as_str()))
            .unwrap_or("");

        let line_clamped: String = {
            let lines: Vec<&str> = raw.lines().collect();
            if lines.len() > MAX_PREVIEW_LINES {
                lines[..MAX_PREVIEW_LINES].join("\n")
            } else {
                raw.to_string()
            }
        };

        let was_line_clamped = raw.lines().count() > MAX_PREVIEW_LINES;
        let was_char_clamped = line_clamped.len() > MAX_CALLBACK_CONTENT;

        let content = if was_char_clamped {
            let cut = line_clamped
                .char_indices()
                .take_while(|(i, _)| *i < MAX_CALLBACK_CONTENT)
                .last()
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(0);
            line_clamped[..cut].to_string()
        } else {
            line_clamped
        };

        let truncated = was_line_clamped || was_char_clamped;
        let content = if truncated { format!("{content}{TRUNCATION_NOTICE}") } else { content };

        let _ = tool_name; // reserved for tool-specific preview framing
        Preview { content, truncated }
    }
}
