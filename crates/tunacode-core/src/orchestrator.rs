// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The top-level loop for one user request (§4.F): runs the agent node by
//! node, dispatches its tool calls, watches for stalls and silence, and
//! always leaves the user with a final response even when the iteration
//! cap is hit.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tracing::warn;

use tunacode_model::{CompletionRequest, ModelProvider, ResponseEvent};
use tunacode_tools::ToolRegistry;

use crate::adapter::from_canonical_list;
use crate::authorization::{AuthorizationPolicy, AuthorizationState};
use crate::dispatcher::{self, ConfirmationChannel};
use crate::errors::ChatProviderError;
use crate::message::{Message, Part, Role};
use crate::sanitizer::repair_dangling_calls;
use crate::state::{ModelPricing, State, UsageMetrics};

const MAX_ORIGINAL_QUERY_PREVIEW: usize = 200;
const NO_PROGRESS_THRESHOLD: usize = 3;
const EMPTY_RESPONSE_LIMIT: usize = 3;

#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseState {
    pub has_user_response: bool,
    pub has_final_synthesis: bool,
    pub task_completed: bool,
    pub awaiting_user_guidance: bool,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_iterations: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { max_iterations: 20 }
    }
}

fn truncate_preview(text: &str) -> &str {
    match text.char_indices().nth(MAX_ORIGINAL_QUERY_PREVIEW) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

fn no_progress_alert(original_query: &str, last_productive: usize, current: usize, max: usize) -> String {
    format!(
        "ALERT: No tools executed for {NO_PROGRESS_THRESHOLD} iterations. Last productive \
         iteration: {last_productive}. Current iteration: {current}/{max}. Task: {}.",
        truncate_preview(original_query)
    )
}

fn clarification_message(original_query: &str, current: usize) -> String {
    format!(
        "I need clarification to continue. Original request: {}. Progress: reached iteration \
         {current} with {EMPTY_RESPONSE_LIMIT} consecutive empty model responses.",
        truncate_preview(original_query)
    )
}

fn iteration_limit_message(max_iterations: usize, tools_used: &[String]) -> String {
    let summary = if tools_used.is_empty() {
        "no tools were used".to_string()
    } else {
        format!("tools used: {}", tools_used.join(", "))
    };
    format!("I've reached the iteration limit ({max_iterations}). Progress summary: {summary}.")
}

/// Pulls `@path` references out of `input`, recording any path that exists
/// on disk into `files_in_context`. The referenced content itself is read
/// by `read_file`, not inlined here — this only tracks what the user
/// pointed at.
fn expand_file_references(input: &str, files_in_context: &mut std::collections::HashSet<String>) {
    for token in input.split_whitespace() {
        if let Some(path) = token.strip_prefix('@') {
            let trimmed = path.trim_end_matches(|c: char| c.is_ascii_punctuation() && c != '/' && c != '.');
            if Path::new(trimmed).exists() {
                files_in_context.insert(trimmed.to_string());
            }
        }
    }
}

fn to_model_schemas(schemas: Vec<tunacode_tools::ToolSchema>) -> Vec<tunacode_model::ToolSchema> {
    schemas
        .into_iter()
        .map(|s| tunacode_model::ToolSchema { name: s.name, description: s.description, parameters: s.parameters })
        .collect()
}

struct NodeOutcome {
    message: Message,
    usage: Option<UsageMetrics>,
}

/// Runs one model turn over `history` and folds the streamed events into a
/// single canonical assistant message (text, thought, and/or tool calls).
async fn run_node(
    provider: &dyn ModelProvider,
    history: &[Message],
    tool_schemas: Vec<tunacode_tools::ToolSchema>,
    pricing: &ModelPricing,
) -> anyhow::Result<NodeOutcome> {
    let request = CompletionRequest {
        messages: from_canonical_list(history),
        tools: to_model_schemas(tool_schemas),
        stream: false,
    };

    let mut stream = provider.complete(request).await?;
    let mut text = String::new();
    let mut thinking = String::new();
    let mut tool_calls: Vec<(u32, String, String, String)> = Vec::new();
    let mut usage = None;

    while let Some(event) = stream.next().await {
        match event? {
            ResponseEvent::TextDelta(delta) => text.push_str(&delta),
            ResponseEvent::ThinkingDelta(delta) => thinking.push_str(&delta),
            ResponseEvent::ToolCall { index, id, name, arguments } => {
                match tool_calls.iter_mut().find(|(i, ..)| *i == index) {
                    Some(existing) => existing.3.push_str(&arguments),
                    None => tool_calls.push((index, id, name, arguments)),
                }
            }
            ResponseEvent::Usage { input_tokens, output_tokens, cache_read_tokens, .. } => {
                usage = Some(UsageMetrics::from_call(
                    pricing,
                    input_tokens as u64,
                    output_tokens as u64,
                    cache_read_tokens as u64,
                ));
            }
            ResponseEvent::Done => {}
            ResponseEvent::Error(message) => warn!(%message, "model reported a recoverable error"),
        }
    }

    let mut parts = Vec::new();
    if !thinking.is_empty() {
        parts.push(Part::Thought { content: thinking });
    }
    if !text.is_empty() {
        parts.push(Part::Text { content: text });
    }
    for (_, tool_call_id, tool_name, raw_args) in tool_calls {
        let args: Value = serde_json::from_str(&raw_args).unwrap_or(Value::String(raw_args));
        parts.push(Part::ToolCall { tool_call_id, tool_name, args });
    }

    Ok(NodeOutcome { message: Message { role: Role::Assistant, parts }, usage })
}

/// Looks up the cached provider for `model`; on a miss, builds one via
/// `build`, caches it, and bumps `state`'s version for this model so the
/// bump is visible to the next lookup.
pub fn get_or_build_agent(
    state: &mut State,
    model: &str,
    build: impl FnOnce() -> Arc<dyn ModelProvider>,
) -> Arc<dyn ModelProvider> {
    let expected = state.agent_version(model);
    if let Some(agent) = tunacode_cache::caches::agents::get_agent::<Arc<dyn ModelProvider>>(model, expected) {
        return agent;
    }
    let agent = build();
    let version = state.bump_agent_version(model);
    tunacode_cache::caches::agents::set_agent(model, agent.clone(), version);
    agent
}

/// Runs one user request to completion (or to the iteration cap, or to
/// cancellation). `model` identifies the cache key for the agent in use;
/// `provider` is the already-resolved instance (see `get_or_build_agent`).
#[allow(clippy::too_many_arguments)]
pub async fn run_request(
    state: &mut State,
    model: &str,
    provider: &dyn ModelProvider,
    tools: &ToolRegistry,
    policy: &AuthorizationPolicy,
    auth_state: &mut AuthorizationState,
    confirm: &dyn ConfirmationChannel,
    cancelled: &Arc<AtomicBool>,
    pricing: &ModelPricing,
    config: &OrchestratorConfig,
    user_input: &str,
) -> ResponseState {
    state.task.original_query = user_input.to_string();
    expand_file_references(user_input, &mut state.conversation.files_in_context);
    state.conversation.push(Message::user(user_input));

    let mut response_state = ResponseState::default();
    let mut consecutive_no_progress = 0usize;
    let mut last_productive_iteration = 0usize;
    state.runtime.current_iteration = 0;

    while state.runtime.current_iteration < config.max_iterations && !response_state.task_completed {
        state.runtime.current_iteration += 1;

        if cancelled.load(Ordering::SeqCst) {
            state.runtime.operation_cancelled = true;
            repair_dangling_calls(&mut state.conversation.messages);
            tunacode_cache::caches::agents::invalidate_agent(model);
            return response_state;
        }

        let outcome = match run_node(provider, &state.conversation.messages, tools.schemas(), pricing).await {
            Ok(outcome) => outcome,
            Err(error) => {
                let error = ChatProviderError::Provider(error);
                warn!(%error, "model call failed; aborting request");
                state
                    .conversation
                    .push(Message::assistant_text(format!("model request failed: {error}")));
                return response_state;
            }
        };

        if let Some(usage) = outcome.usage {
            state.usage.record(usage);
        }

        let has_text = outcome.message.parts.iter().any(|p| matches!(p, Part::Text { content } if !content.is_empty()));
        let has_tool_calls = outcome.message.parts.iter().any(|p| matches!(p, Part::ToolCall { .. }));

        state.conversation.push(outcome.message.clone());
        if has_text {
            response_state.has_user_response = true;
        }

        if !has_text && !has_tool_calls {
            state.runtime.consecutive_empty_responses += 1;
            if state.runtime.consecutive_empty_responses >= EMPTY_RESPONSE_LIMIT {
                let message = clarification_message(&state.task.original_query, state.runtime.current_iteration);
                state.conversation.push(Message::user(message));
                response_state.awaiting_user_guidance = true;
                state.runtime.consecutive_empty_responses = 0;
            }
            consecutive_no_progress += 1;
        } else {
            state.runtime.consecutive_empty_responses = 0;
        }

        if has_tool_calls {
            let dispatch = dispatcher::dispatch_node(
                &outcome.message.parts,
                tools,
                policy,
                auth_state,
                &mut state.runtime.tool_registry,
                confirm,
                cancelled,
            )
            .await;

            state.conversation.push_many(dispatch.returns);

            if dispatch.cancelled {
                state.runtime.operation_cancelled = true;
                repair_dangling_calls(&mut state.conversation.messages);
                tunacode_cache::caches::agents::invalidate_agent(model);
                return response_state;
            }

            if dispatch.task_completed {
                response_state.task_completed = true;
            }
            consecutive_no_progress = 0;
            last_productive_iteration = state.runtime.current_iteration;
        } else if has_text {
            consecutive_no_progress = 0;
            last_productive_iteration = state.runtime.current_iteration;
        }

        if consecutive_no_progress >= NO_PROGRESS_THRESHOLD {
            let alert = no_progress_alert(
                &state.task.original_query,
                last_productive_iteration,
                state.runtime.current_iteration,
                config.max_iterations,
            );
            state.conversation.push(Message::user(alert));
            response_state.awaiting_user_guidance = true;
            consecutive_no_progress = 0;
        }
    }

    if !response_state.task_completed && state.runtime.current_iteration >= config.max_iterations {
        let tools_used: Vec<String> = state
            .runtime
            .tool_registry
            .in_registration_order()
            .iter()
            .map(|record| record.tool_name.clone())
            .collect();
        let fallback = iteration_limit_message(config.max_iterations, &tools_used);
        state.conversation.push(Message::assistant_text(fallback));
        response_state.has_final_synthesis = true;
    }

    response_state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::AutoApprove;
    use tunacode_model::ScriptedMockProvider;
    use tunacode_tools::SubmitTool;

    fn registry_with_submit() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(SubmitTool);
        r
    }

    fn no_pricing() -> ModelPricing {
        ModelPricing::default()
    }

    #[tokio::test]
    async fn submit_ends_the_loop_and_marks_task_completed() {
        let mut state = State::new("s1", 100_000);
        let provider = ScriptedMockProvider::tool_then_text("call-1", "submit", r#"{"result":"42"}"#, "ignored");
        let tools = registry_with_submit();
        let policy = AuthorizationPolicy::default();
        let mut auth_state = AuthorizationState::default();
        let cancelled = Arc::new(AtomicBool::new(false));
        let config = OrchestratorConfig { max_iterations: 10 };

        let response = run_request(
            &mut state, "mock:model", &provider, &tools, &policy, &mut auth_state, &AutoApprove, &cancelled,
            &no_pricing(), &config, "what is the answer?",
        )
        .await;

        assert!(response.task_completed);
        assert!(state
            .conversation
            .messages
            .iter()
            .any(|m| m.tool_return_ids().contains(&"call-1")));
    }

    #[tokio::test]
    async fn iteration_cap_produces_fallback_message() {
        let mut state = State::new("s1", 100_000);
        let provider = ScriptedMockProvider::always_text("still working on it");
        let tools = registry_with_submit();
        let policy = AuthorizationPolicy::default();
        let mut auth_state = AuthorizationState::default();
        let cancelled = Arc::new(AtomicBool::new(false));
        let config = OrchestratorConfig { max_iterations: 3 };

        let response = run_request(
            &mut state, "mock:model", &provider, &tools, &policy, &mut auth_state, &AutoApprove, &cancelled,
            &no_pricing(), &config, "do the thing",
        )
        .await;

        assert!(!response.task_completed);
        assert!(response.has_final_synthesis);
        let last = state.conversation.messages.last().unwrap();
        assert!(last.content().starts_with("I've reached the iteration limit (3)."));
    }

    #[tokio::test]
    async fn cancellation_marks_state_and_repairs_history() {
        let mut state = State::new("s1", 100_000);
        let provider = ScriptedMockProvider::tool_then_text("call-1", "submit", r#"{"result":"x"}"#, "ignored");
        let tools = registry_with_submit();
        let policy = AuthorizationPolicy::default();
        let mut auth_state = AuthorizationState::default();
        let cancelled = Arc::new(AtomicBool::new(true));
        let config = OrchestratorConfig { max_iterations: 10 };

        tunacode_cache::caches::agents::set_agent("mock:cancel-model", Arc::new(ScriptedMockProvider::always_text("x")) as Arc<dyn ModelProvider>, 1);

        run_request(
            &mut state, "mock:cancel-model", &provider, &tools, &policy, &mut auth_state, &AutoApprove, &cancelled,
            &no_pricing(), &config, "do the thing",
        )
        .await;

        assert!(state.runtime.operation_cancelled);
        assert!(tunacode_cache::caches::agents::get_agent::<Arc<dyn ModelProvider>>("mock:cancel-model", 1).is_none());
    }

    #[test]
    fn no_progress_alert_preserves_placeholders() {
        let alert = no_progress_alert("do a thing", 2, 5, 20);
        assert!(alert.starts_with("ALERT: No tools executed for 3 iterations."));
        assert!(alert.contains("Last productive iteration: 2."));
        assert!(alert.contains("Current iteration: 5/20."));
        assert!(alert.contains("Task: do a thing."));
    }

    #[test]
    fn iteration_limit_message_lists_tools_used() {
        let msg = iteration_limit_message(3, &["read_file".to_string(), "grep".to_string()]);
        assert!(msg.starts_with("I've reached the iteration limit (3)."));
        assert!(msg.contains("read_file, grep"));
    }

    #[test]
    fn expand_file_references_only_tracks_existing_paths() {
        let mut files = std::collections::HashSet::new();
        expand_file_references("look at @Cargo.toml and @does/not/exist.rs", &mut files);
        assert!(files.contains("Cargo.toml"));
        assert!(!files.iter().any(|f| f.contains("does/not/exist")));
    }
}
