// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The state facade: conversation history, task context, per-run runtime
//! counters, and usage/cost tracking, each as an independent sub-state. A
//! [`State`] is the unit of a session — `reset_session` discards one
//! wholesale and starts a fresh one, it is never mutated field-by-field
//! back to defaults.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::adapter::{estimate_tokens, get_content};
use crate::message::Message;

/// Conversation history and token accounting. Grounded on the teacher's
/// `Session`, adapted to the canonical message model.
#[derive(Debug, Default, Clone)]
pub struct Conversation {
    pub messages: Vec<Message>,
    pub total_tokens: usize,
    pub max_tokens: usize,
    /// Absolute paths pulled into context via `@file` references.
    pub files_in_context: HashSet<String>,
}

impl Conversation {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens, ..Default::default() }
    }

    pub fn push(&mut self, message: Message) {
        self.total_tokens += estimate_tokens(&get_content(&message));
        self.messages.push(message);
    }

    pub fn push_many(&mut self, messages: impl IntoIterator<Item = Message>) {
        for m in messages {
            self.push(m);
        }
    }

    pub fn context_fraction(&self) -> f32 {
        if self.max_tokens == 0 {
            0.0
        } else {
            self.total_tokens as f32 / self.max_tokens as f32
        }
    }

    pub fn is_near_limit(&self, threshold: f32) -> bool {
        self.context_fraction() >= threshold
    }

    pub fn recalculate_tokens(&mut self) {
        self.total_tokens = self.messages.iter().map(|m| estimate_tokens(&get_content(m))).sum();
    }

    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.recalculate_tokens();
    }
}

/// The user's original request, kept verbatim for the no-progress alert and
/// the iteration-limit fallback synthesis.
#[derive(Debug, Default, Clone)]
pub struct Task {
    pub original_query: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: Value,
    pub status: ToolCallStatus,
    pub result: Option<String>,
    pub error: Option<String>,
}

/// Tracks tool-call lifecycle by `tool_call_id`. Distinct from
/// [`tunacode_tools::ToolRegistry`], which maps tool *names* to
/// implementations — this maps call *instances* to their outcome.
/// Re-registering an id overwrites the prior record (last-wins).
#[derive(Debug, Default)]
pub struct ToolCallRegistry {
    calls: HashMap<String, ToolCallRecord>,
    /// Preserves registration order for `to_legacy_records`-style dumps.
    order: Vec<String>,
}

impl ToolCallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, tool_call_id: impl Into<String>, tool_name: impl Into<String>, args: Value) {
        let id = tool_call_id.into();
        if !self.calls.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.calls.insert(
            id.clone(),
            ToolCallRecord {
                tool_call_id: id,
                tool_name: tool_name.into(),
                args,
                status: ToolCallStatus::Pending,
                result: None,
                error: None,
            },
        );
    }

    pub fn start(&mut self, tool_call_id: &str) {
        if let Some(call) = self.calls.get_mut(tool_call_id) {
            call.status = ToolCallStatus::Running;
        }
    }

    pub fn complete(&mut self, tool_call_id: &str, result: impl Into<String>) {
        if let Some(call) = self.calls.get_mut(tool_call_id) {
            call.status = ToolCallStatus::Completed;
            call.result = Some(result.into());
        }
    }

    pub fn fail(&mut self, tool_call_id: &str, error: impl Into<String>) {
        if let Some(call) = self.calls.get_mut(tool_call_id) {
            call.status = ToolCallStatus::Failed;
            call.error = Some(error.into());
        }
    }

    pub fn cancel(&mut self, tool_call_id: &str, reason: impl Into<String>) {
        if let Some(call) = self.calls.get_mut(tool_call_id) {
            call.status = ToolCallStatus::Cancelled;
            call.error = Some(reason.into());
        }
    }

    pub fn get(&self, tool_call_id: &str) -> Option<&ToolCallRecord> {
        self.calls.get(tool_call_id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn in_registration_order(&self) -> Vec<&ToolCallRecord> {
        self.order.iter().filter_map(|id| self.calls.get(id)).collect()
    }
}

/// Per-run counters and flags. Reset at the start of every `run`
/// invocation; never carried across sessions.
#[derive(Debug, Default)]
pub struct Runtime {
    pub current_iteration: usize,
    pub request_id: String,
    pub consecutive_empty_responses: usize,
    pub batch_counter: usize,
    pub tool_registry: ToolCallRegistry,
    pub operation_cancelled: bool,
    pub is_streaming_active: bool,
}

/// Per-million-token pricing for one model, in USD.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelPricing {
    pub input: f64,
    pub cached_input: f64,
    pub output: f64,
}

const TOKENS_PER_MILLION: f64 = 1_000_000.0;

impl ModelPricing {
    pub fn cost(&self, input_tokens: u64, cached_tokens: u64, output_tokens: u64) -> f64 {
        let input_cost = (input_tokens as f64 * self.input) / TOKENS_PER_MILLION;
        let cached_cost = (cached_tokens as f64 * self.cached_input) / TOKENS_PER_MILLION;
        let output_cost = (output_tokens as f64 * self.output) / TOKENS_PER_MILLION;
        input_cost + cached_cost + output_cost
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UsageMetrics {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
    pub cost: f64,
}

impl UsageMetrics {
    pub fn accumulate(&mut self, other: &UsageMetrics) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.cached_tokens += other.cached_tokens;
        self.cost += other.cost;
    }

    pub fn from_call(pricing: &ModelPricing, prompt_tokens: u64, completion_tokens: u64, cached_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            cached_tokens,
            cost: pricing.cost(prompt_tokens, cached_tokens, completion_tokens),
        }
    }
}

#[derive(Debug, Default)]
pub struct Usage {
    pub last_call_usage: UsageMetrics,
    pub session_total_usage: UsageMetrics,
}

impl Usage {
    pub fn record(&mut self, metrics: UsageMetrics) {
        self.session_total_usage.accumulate(&metrics);
        self.last_call_usage = metrics;
    }
}

/// Upper bound on nested agent-task recursion (e.g. a `submit`-gated
/// sub-task spawning its own agent loop). Prevents runaway self-delegation.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 8;

/// Cached agent version, so a config/prompt change invalidates the right
/// cache entry in `tunacode_cache::caches::agents` rather than relying on
/// process restart.
pub type ModelName = String;

/// The top-level session state. Each `State` owns one session id; starting
/// a new session means building a fresh `State`, never mutating an old one
/// back to its defaults (that would leak stale `tool_registry` entries and
/// an inconsistent `session_id`).
pub struct State {
    pub session_id: String,
    pub conversation: Conversation,
    pub task: Task,
    pub runtime: Runtime,
    pub usage: Usage,
    pub agent_versions: HashMap<ModelName, u64>,
    pub recursion_depth: usize,
    pub max_recursion_depth: usize,
}

impl State {
    pub fn new(session_id: impl Into<String>, max_tokens: usize) -> Self {
        Self {
            session_id: session_id.into(),
            conversation: Conversation::new(max_tokens),
            task: Task::default(),
            runtime: Runtime::default(),
            usage: Usage::default(),
            agent_versions: HashMap::new(),
            recursion_depth: 0,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }

    /// Bumps the agent-version for `model`, invalidating any previously
    /// cached agent instance the next time `get_agent` is consulted with
    /// this new expectation.
    pub fn bump_agent_version(&mut self, model: &str) -> u64 {
        let version = self.agent_versions.entry(model.to_string()).or_insert(0);
        *version += 1;
        *version
    }

    pub fn agent_version(&self, model: &str) -> u64 {
        self.agent_versions.get(model).copied().unwrap_or(0)
    }

    /// Discards this session wholesale and starts a fresh one with
    /// `session_id`, keeping only the conversation's token budget. Every
    /// other sub-state (conversation history, task, runtime counters,
    /// usage, agent versions, recursion depth) goes back to its default —
    /// this is never done field-by-field, since that risks leaking stale
    /// `tool_registry` entries into the new session.
    pub fn reset_session(&mut self, session_id: impl Into<String>) {
        let max_tokens = self.conversation.max_tokens;
        *self = Self::new(session_id, max_tokens);
    }
}
