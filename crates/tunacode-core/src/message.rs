// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The canonical message/part model (§3). This is the only internal
//! representation of conversation history — provider-specific shapes are
//! confined to the adapter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A typed fragment of a message. Order within a message is significant —
/// a single assistant message may carry a `ThoughtPart` followed by a
/// `TextPart` followed by one or more `ToolCallPart`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Part {
    SystemPrompt { content: String },
    UserPrompt { content: String },
    /// Assistant prose, user-visible.
    Text { content: String },
    /// Hidden reasoning; excluded from user-visible output.
    Thought { content: String },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: Value,
    },
    ToolReturn {
        tool_call_id: String,
        tool_name: String,
        content: String,
    },
    /// Model-driven retry request.
    RetryPrompt { content: String },
}

impl Part {
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Part::ToolCall { tool_call_id, .. } | Part::ToolReturn { tool_call_id, .. } => {
                Some(tool_call_id)
            }
            _ => None,
        }
    }

    /// Whether this part contributes to `get_content` (text-bearing and
    /// user-visible — thoughts are excluded by definition).
    pub fn is_visible_text(&self) -> bool {
        matches!(self, Part::SystemPrompt { .. } | Part::UserPrompt { .. } | Part::Text { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Part::SystemPrompt { content }
            | Part::UserPrompt { content }
            | Part::Text { content }
            | Part::Thought { content }
            | Part::RetryPrompt { content } => Some(content),
            Part::ToolReturn { content, .. } => Some(content),
            Part::ToolCall { .. } => None,
        }
    }
}

/// A conversation entry: a role plus an ordered sequence of parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, parts: vec![Part::SystemPrompt { content: content.into() }] }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, parts: vec![Part::UserPrompt { content: content.into() }] }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, parts: vec![Part::Text { content: content.into() }] }
    }

    pub fn assistant_tool_calls(calls: Vec<(String, String, Value)>) -> Self {
        Self {
            role: Role::Assistant,
            parts: calls
                .into_iter()
                .map(|(tool_call_id, tool_name, args)| Part::ToolCall { tool_call_id, tool_name, args })
                .collect(),
        }
    }

    pub fn tool_return(tool_call_id: impl Into<String>, tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            parts: vec![Part::ToolReturn {
                tool_call_id: tool_call_id.into(),
                tool_name: tool_name.into(),
                content: content.into(),
            }],
        }
    }

    /// Every `ToolCallPart.tool_call_id` this message carries, in order (M2:
    /// derived purely from parts, never a secondary collection).
    pub fn tool_call_ids(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolCall { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_return_ids(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolReturn { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Concatenation of text-bearing parts, skipping thoughts.
    pub fn content(&self) -> String {
        self.parts
            .iter()
            .filter(|p| p.is_visible_text())
            .filter_map(|p| p.text())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_message_has_user_prompt_part() {
        let m = Message::user("hello");
        assert_eq!(m.content(), "hello");
        assert_eq!(m.role, Role::User);
    }

    #[test]
    fn tool_call_ids_derived_from_parts_only() {
        let m = Message::assistant_tool_calls(vec![
            ("a".into(), "read_file".into(), json!({"path": "x"})),
            ("b".into(), "grep".into(), json!({"pattern": "y"})),
        ]);
        assert_eq!(m.tool_call_ids(), vec!["a", "b"]);
    }

    #[test]
    fn tool_return_ids_derived_from_parts() {
        let m = Message::tool_return("a", "read_file", "contents");
        assert_eq!(m.tool_return_ids(), vec!["a"]);
        assert_eq!(m.tool_call_ids(), Vec::<&str>::new());
    }

    #[test]
    fn content_skips_thought_parts() {
        let m = Message {
            role: Role::Assistant,
            parts: vec![
                Part::Thought { content: "internal reasoning".into() },
                Part::Text { content: "visible answer".into() },
            ],
        };
        assert_eq!(m.content(), "visible answer");
    }

    #[test]
    fn content_concatenates_multiple_text_parts_in_order() {
        let m = Message {
            role: Role::Assistant,
            parts: vec![
                Part::Text { content: "first ".into() },
                Part::Text { content: "second".into() },
            ],
        };
        assert_eq!(m.content(), "first second");
    }

    #[test]
    fn message_serialises_and_deserialises() {
        let m = Message::tool_return("id1", "grep", "no matches");
        let json = serde_json::to_string(&m).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tool_return_ids(), vec!["id1"]);
    }
}
