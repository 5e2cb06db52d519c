// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Consumes one response node's tool-call parts: normalizes args, consults
//! the authorization policy, batches contiguous read-only calls for
//! parallel execution, and produces a `ToolReturnPart` for every call that
//! ran.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use tunacode_tools::{ToolCall as ExecToolCall, ToolRegistry};

use crate::authorization::{AuthorizationPolicy, AuthorizationState, ConfirmationRequestFactory, Decision, Preview};
use crate::errors::ValidationError;
use crate::message::{Message, Part};
use crate::state::ToolCallRegistry;

const READ_ONLY_TOOLS: &[&str] = &["read_file", "grep", "list_dir", "glob"];

pub fn is_read_only(tool_name: &str) -> bool {
    READ_ONLY_TOOLS.contains(&tool_name)
}

/// Accepts a JSON object or a JSON-encoded string carrying an object.
/// Fails loud on anything else — malformed JSON will not become valid by
/// retrying. One special case: if the string is an object followed by
/// trailing "extra data" (a model emitting two concatenated JSON objects),
/// the first object is recovered and used, with a warning.
pub fn normalize_args(args: &Value) -> Result<Value, ValidationError> {
    match args {
        Value::Object(_) => Ok(args.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(v) if v.is_object() => Ok(v),
            Ok(v) => Err(ValidationError::NotJsonObject(v.to_string())),
            Err(_) => {
                let mut stream = serde_json::Deserializer::from_str(s).into_iter::<Value>();
                match stream.next() {
                    Some(Ok(first)) if first.is_object() => {
                        warn!(raw = %s, "tool args contained concatenated JSON objects; using the first");
                        Ok(first)
                    }
                    _ => Err(ValidationError::MalformedJson(
                        serde_json::from_str::<Value>(s).unwrap_err(),
                    )),
                }
            }
        },
        other => Err(ValidationError::NotJsonObject(other.to_string())),
    }
}

/// Responds to confirmation requests raised by [`Decision::ApproveConfirmed`].
/// Left abstract here — concrete UIs (TUI, headless `--auto-approve`) supply
/// the implementation.
#[async_trait]
pub trait ConfirmationChannel: Send + Sync {
    async fn confirm(&self, tool_name: &str, preview: &Preview) -> ConfirmationResponse;
}

#[derive(Debug, Clone, Copy)]
pub struct ConfirmationResponse {
    pub approved: bool,
    pub skip_future: bool,
}

/// Auto-approves everything without prompting — the `run --auto-approve`
/// headless path.
pub struct AutoApprove;

#[async_trait]
impl ConfirmationChannel for AutoApprove {
    async fn confirm(&self, _tool_name: &str, _preview: &Preview) -> ConfirmationResponse {
        ConfirmationResponse { approved: true, skip_future: false }
    }
}

pub struct DispatchOutcome {
    /// `ToolReturnPart` messages, in the same order as the calls they answer.
    pub returns: Vec<Message>,
    /// Set when a `submit` call was dispatched in this node.
    pub task_completed: bool,
    /// Set when dispatch stopped early because `cancelled` tripped mid-node.
    /// Already-started batch siblings are allowed to finish; no new call is
    /// started afterwards.
    pub cancelled: bool,
}

struct PendingCall {
    tool_call_id: String,
    tool_name: String,
    args: Value,
}

/// Dispatches every `ToolCallPart` in `parts`, in order. Contiguous
/// read-only calls (`read_file`, `grep`, `list_dir`, `glob`) run as one
/// parallel batch; any other tool flushes the pending batch first, then
/// runs alone.
pub async fn dispatch_node(
    parts: &[Part],
    tools: &ToolRegistry,
    policy: &AuthorizationPolicy,
    auth_state: &mut AuthorizationState,
    registry: &mut ToolCallRegistry,
    confirm: &dyn ConfirmationChannel,
    cancelled: &Arc<AtomicBool>,
) -> DispatchOutcome {
    let mut returns = Vec::new();
    let mut task_completed = false;
    let mut batch: Vec<PendingCall> = Vec::new();

    macro_rules! flush_batch {
        () => {
            if !batch.is_empty() {
                let drained: Vec<PendingCall> = batch.drain(..).collect();
                let results = run_batch(&drained, tools).await;
                returns.extend(results);
            }
        };
    }

    for part in parts {
        let Part::ToolCall { tool_call_id, tool_name, args } = part else { continue };

        if cancelled.load(Ordering::SeqCst) {
            flush_batch!();
            return DispatchOutcome { returns, task_completed, cancelled: true };
        }

        let normalized = match normalize_args(args) {
            Ok(v) => v,
            Err(e) => {
                flush_batch!();
                registry.record(tool_call_id.clone(), tool_name.clone(), args.clone());
                registry.fail(tool_call_id, e.to_string());
                returns.push(Message::tool_return(tool_call_id.clone(), tool_name.clone(), format!("validation error: {e}")));
                continue;
            }
        };

        registry.record(tool_call_id.clone(), tool_name.clone(), normalized.clone());

        let decision = policy.decide(tool_name, &normalized, auth_state);
        let approved = match decision {
            Decision::Reject => {
                flush_batch!();
                registry.fail(tool_call_id, "rejected by policy".to_string());
                returns.push(Message::tool_return(tool_call_id.clone(), tool_name.clone(), "rejected: not authorized"));
                continue;
            }
            Decision::ApproveSilent => true,
            Decision::ApproveConfirmed | Decision::Defer => {
                flush_batch!();
                let preview = ConfirmationRequestFactory::create(tool_name, &normalized);
                let response = confirm.confirm(tool_name, &preview).await;
                if response.skip_future {
                    auth_state.remember_always_approve(tool_name);
                }
                response.approved
            }
        };

        if !approved {
            registry.fail(tool_call_id, "declined by user".to_string());
            returns.push(Message::tool_return(tool_call_id.clone(), tool_name.clone(), "declined by user"));
            continue;
        }

        if tool_name == "submit" {
            flush_batch!();
            let call = ExecToolCall { id: tool_call_id.clone(), name: tool_name.clone(), args: normalized };
            debug!(tool = %tool_name, "dispatching submit");
            let output = tools.execute(&call).await;
            registry.complete(tool_call_id, output.content.clone());
            returns.push(Message::tool_return(tool_call_id.clone(), tool_name.clone(), output.content));
            task_completed = true;
            continue;
        }

        if is_read_only(tool_name) {
            batch.push(PendingCall {
                tool_call_id: tool_call_id.clone(),
                tool_name: tool_name.clone(),
                args: normalized,
            });
        } else {
            flush_batch!();
            let call = ExecToolCall { id: tool_call_id.clone(), name: tool_name.clone(), args: normalized };
            debug!(tool = %tool_name, "dispatching write/execute tool");
            let output = tools.execute(&call).await;
            if output.is_error {
                registry.fail(tool_call_id, output.content.clone());
            } else {
                registry.complete(tool_call_id, output.content.clone());
            }
            returns.push(Message::tool_return(tool_call_id.clone(), tool_name.clone(), output.content));
        }
    }

    flush_batch!();
    DispatchOutcome { returns, task_completed, cancelled: false }
}

/// Runs a contiguous batch of read-only calls as sibling tasks under one
/// scope, preserving request order in the returned messages (not
/// completion order).
async fn run_batch(batch: &[PendingCall], tools: &ToolRegistry) -> Vec<Message> {
    let futures = batch.iter().map(|pc| {
        let call = ExecToolCall { id: pc.tool_call_id.clone(), name: pc.tool_name.clone(), args: pc.args.clone() };
        tools.execute(&call)
    });
    let outputs = futures::future::join_all(futures).await;
    batch
        .iter()
        .zip(outputs)
        .map(|(pc, output)| Message::tool_return(pc.tool_call_id.clone(), pc.tool_name.clone(), output.content))
        .collect()
}
