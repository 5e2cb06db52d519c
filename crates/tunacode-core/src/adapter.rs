// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The sole place that touches provider-specific message objects
//! ([`tunacode_model::Message`]). Converts between the wire format and the
//! canonical [`crate::message::Message`]/[`crate::message::Part`] model.

use serde_json::Value;
use tunacode_model::{FunctionCall, MessageContent, Role as WireRole};

use crate::message::{Message, Part, Role};

fn role_to_wire(role: Role) -> WireRole {
    match role {
        Role::System => WireRole::System,
        Role::User => WireRole::User,
        Role::Assistant => WireRole::Assistant,
        Role::Tool => WireRole::Tool,
    }
}

fn role_from_wire(role: WireRole) -> Role {
    match role {
        WireRole::System => Role::System,
        WireRole::User => Role::User,
        WireRole::Assistant => Role::Assistant,
        WireRole::Tool => Role::Tool,
    }
}

/// Converts one wire message into its canonical form. A wire message
/// carries exactly one content variant, so the result always has exactly
/// one part.
pub fn to_canonical(message: &tunacode_model::Message) -> Message {
    to_canonical_with_name(message, "")
}

fn to_canonical_with_name(message: &tunacode_model::Message, tool_name_hint: &str) -> Message {
    let role = role_from_wire(message.role);
    let part = match &message.content {
        MessageContent::Text(text) => match role {
            Role::System => Part::SystemPrompt { content: text.clone() },
            Role::User => Part::UserPrompt { content: text.clone() },
            _ => Part::Text { content: text.clone() },
        },
        MessageContent::ToolCall { tool_call_id, function } => {
            let args: Value = serde_json::from_str(&function.arguments)
                .unwrap_or_else(|_| Value::String(function.arguments.clone()));
            Part::ToolCall { tool_call_id: tool_call_id.clone(), tool_name: function.name.clone(), args }
        }
        MessageContent::ToolResult { tool_call_id, content } => Part::ToolReturn {
            tool_call_id: tool_call_id.clone(),
            tool_name: tool_name_hint.to_string(),
            content: content.clone(),
        },
    };
    Message { role, parts: vec![part] }
}

/// Converts a wire message back from its canonical form. Only the first
/// part is used — multi-part canonical messages must go through
/// [`from_canonical_list`], which expands them into one wire message per
/// part.
pub fn from_canonical(message: &Message) -> tunacode_model::Message {
    let role = role_to_wire(message.role);
    let content = match message.parts.first() {
        Some(Part::SystemPrompt { content }) | Some(Part::UserPrompt { content }) | Some(Part::Text { content }) => {
            MessageContent::Text(content.clone())
        }
        Some(Part::Thought { content }) => MessageContent::Text(content.clone()),
        Some(Part::RetryPrompt { content }) => MessageContent::Text(content.clone()),
        Some(Part::ToolCall { tool_call_id, tool_name, args }) => MessageContent::ToolCall {
            tool_call_id: tool_call_id.clone(),
            function: FunctionCall { name: tool_name.clone(), arguments: args.to_string() },
        },
        Some(Part::ToolReturn { tool_call_id, content, .. }) => {
            MessageContent::ToolResult { tool_call_id: tool_call_id.clone(), content: content.clone() }
        }
        None => MessageContent::Text(String::new()),
    };
    tunacode_model::Message { role, content }
}

/// Converts a wire history into canonical form, preserving order and count.
/// Unlike [`to_canonical`], tool-return parts are backfilled with the
/// `tool_name` recovered from their matching preceding tool call.
pub fn to_canonical_list(messages: &[tunacode_model::Message]) -> Vec<Message> {
    let mut tool_names: std::collections::HashMap<String, String> = std::collections::HashMap::new();
    let mut out = Vec::with_capacity(messages.len());
    for m in messages {
        if let MessageContent::ToolCall { tool_call_id, function } = &m.content {
            tool_names.insert(tool_call_id.clone(), function.name.clone());
        }
        let hint = if let MessageContent::ToolResult { tool_call_id, .. } = &m.content {
            tool_names.get(tool_call_id).map(String::as_str).unwrap_or("")
        } else {
            ""
        };
        out.push(to_canonical_with_name(m, hint));
    }
    out
}

/// Expands a canonical history back into wire messages, one per part.
/// Preserves order; message count may grow when a canonical message
/// carries multiple parts (e.g. several tool calls from one response
/// node).
pub fn from_canonical_list(messages: &[Message]) -> Vec<tunacode_model::Message> {
    let mut out = Vec::new();
    for m in messages {
        if m.parts.len() <= 1 {
            out.push(from_canonical(m));
            continue;
        }
        for part in &m.parts {
            let single = Message { role: m.role, parts: vec![part.clone()] };
            out.push(from_canonical(&single));
        }
    }
    out
}

/// Concatenation of text-bearing parts, skipping thoughts.
pub fn get_content(message: &Message) -> String {
    message.content()
}

/// `ToolCallPart.tool_call_id`s in a message, in order (M2: derived from
/// parts only).
pub fn get_tool_call_ids(message: &Message) -> Vec<&str> {
    message.tool_call_ids()
}

pub fn get_tool_return_ids(message: &Message) -> Vec<&str> {
    message.tool_return_ids()
}

/// Every `ToolCallPart` across `messages` with no subsequent matching
/// `ToolReturnPart`, as `(message_index, tool_call_id, tool_name)`.
pub fn find_dangling_tool_calls(messages: &[Message]) -> Vec<(usize, String, String)> {
    let mut dangling = Vec::new();
    for (i, m) in messages.iter().enumerate() {
        for part in &m.parts {
            if let Part::ToolCall { tool_call_id, tool_name, .. } = part {
                let has_return = messages[i..]
                    .iter()
                    .flat_map(|later| later.parts.iter())
                    .any(|p| matches!(p, Part::ToolReturn { tool_call_id: id, .. } if id == tool_call_id));
                if !has_return {
                    dangling.push((i, tool_call_id.clone(), tool_name.clone()));
                }
            }
        }
    }
    dangling
}

/// Heuristic token estimate: `len(text) / 4`, floored to at least 1 for
/// any non-empty text. No tokenizer, O(1).
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        0
    } else {
        (text.len() / 4).max(1)
    }
}
