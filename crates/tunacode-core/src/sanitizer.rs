// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Prunes, filters, and repairs message history so it satisfies invariant
//! M1 (every tool call has exactly one matching tool return) and stays
//! within size constraints. `sanitize(sanitize(h)) == sanitize(h)` — the
//! cleanup loop runs to a fixed point, so running it twice is a no-op.

use tunacode_model::ModelProvider;

use crate::adapter::{estimate_tokens, find_dangling_tool_calls, get_content};
use crate::message::{Message, Part, Role};

const ABORTED_PLACEHOLDER: &str = "<aborted>";
const PRUNED_PLACEHOLDER: &str = "[older tool output pruned to save context]";

/// Prefix marking an assistant text part as a compaction checkpoint. A
/// checkpoint message is never itself prunable — `filter_compacted` keeps
/// it as the new prefix of the history.
pub const SUMMARY_CHECKPOINT_PREFIX: &str = "\u{0}tunacode-summary-checkpoint\u{0}";

/// Appends a synthetic `ToolReturnPart(id, "<aborted>")` immediately after
/// the message containing every tool call with no subsequent matching
/// return. Runs until idempotent — a second pass over an already-repaired
/// history finds nothing to do.
pub fn repair_dangling_calls(messages: &mut Vec<Message>) {
    loop {
        let dangling = find_dangling_tool_calls(messages);
        if dangling.is_empty() {
            return;
        }
        // Insert from the back so earlier indices stay valid as we go.
        for (index, tool_call_id, tool_name) in dangling.into_iter().rev() {
            let synthetic = Message::tool_return(tool_call_id, tool_name, ABORTED_PLACEHOLDER);
            messages.insert(index + 1, synthetic);
        }
    }
}

/// Replaces the content of `ToolReturnPart`s older than the most recent
/// `keep_recent` with a short placeholder. Returns the number of tokens
/// reclaimed (heuristic, via [`estimate_tokens`]).
pub fn prune_old_tool_outputs(messages: &mut [Message], keep_recent: usize) -> usize {
    let return_indices: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.parts.iter().any(|p| matches!(p, Part::ToolReturn { .. })))
        .map(|(i, _)| i)
        .collect();

    if return_indices.len() <= keep_recent {
        return 0;
    }

    let prunable = &return_indices[..return_indices.len() - keep_recent];
    let mut reclaimed = 0usize;
    for &i in prunable {
        for part in &mut messages[i].parts {
            if let Part::ToolReturn { content, .. } = part {
                if content != PRUNED_PLACEHOLDER {
                    reclaimed += estimate_tokens(content);
                    *content = PRUNED_PLACEHOLDER.to_string();
                }
            }
        }
    }
    reclaimed
}

fn is_summary_checkpoint(message: &Message) -> bool {
    message.role == Role::Assistant
        && message
            .parts
            .iter()
            .any(|p| matches!(p, Part::Text { content } if content.starts_with(SUMMARY_CHECKPOINT_PREFIX)))
}

/// Scans backwards for the most recent summary checkpoint; if found,
/// discards everything before it, keeping the checkpoint as the new
/// prefix. A no-op if no checkpoint exists.
pub fn filter_compacted(messages: &mut Vec<Message>) {
    if let Some(pos) = messages.iter().rposition(is_summary_checkpoint) {
        messages.drain(0..pos);
    }
}

/// True when the token estimate of `messages` exceeds `limit`.
pub fn should_compact(messages: &[Message], limit: usize) -> bool {
    let total: usize = messages.iter().map(|m| estimate_tokens(&get_content(m))).sum();
    total > limit
}

/// Summarises `messages` via one external model call and returns the
/// resulting checkpoint message. Callers insert it as the new history
/// prefix (typically after `filter_compacted`/truncation).
pub async fn generate_summary(
    messages: &[Message],
    provider: &dyn ModelProvider,
) -> anyhow::Result<Message> {
    let transcript = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| format!("{:?}: {}", m.role, get_content(m)))
        .collect::<Vec<_>>()
        .join("\n\n");

    let prompt = format!(
        "Summarise the following conversation history in a concise, information-dense way. \
         Preserve file names, decisions, and technical details that matter for future work.\n\n---\n\n{transcript}"
    );

    let request = tunacode_model::CompletionRequest {
        messages: vec![tunacode_model::Message::user(prompt)],
        tools: vec![],
        stream: false,
    };

    let mut stream = provider.complete(request).await?;
    let mut summary = String::new();
    use futures::StreamExt;
    while let Some(event) = stream.next().await {
        if let tunacode_model::ResponseEvent::TextDelta(delta) = event? {
            summary.push_str(&delta);
        }
    }

    Ok(Message::assistant_text(format!("{SUMMARY_CHECKPOINT_PREFIX}{summary}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tunacode_model::ScriptedMockProvider;

    #[test]
    fn repair_inserts_aborted_return_for_dangling_call() {
        let mut messages = vec![Message::assistant_tool_calls(vec![(
            "a".into(),
            "read_file".into(),
            json!({}),
        )])];
        repair_dangling_calls(&mut messages);
        assert_eq!(messages.len(), 2);
        match &messages[1].parts[0] {
            Part::ToolReturn { tool_call_id, content, .. } => {
                assert_eq!(tool_call_id, "a");
                assert_eq!(content, "<aborted>");
            }
            other => panic!("expected ToolReturn, got {other:?}"),
        }
    }

    #[test]
    fn repair_is_idempotent() {
        let mut messages = vec![Message::assistant_tool_calls(vec![(
            "a".into(),
            "read_file".into(),
            json!({}),
        )])];
        repair_dangling_calls(&mut messages);
        let once = messages.clone();
        repair_dangling_calls(&mut messages);
        assert_eq!(messages.len(), once.len());
    }

    #[test]
    fn repair_leaves_paired_calls_untouched() {
        let mut messages = vec![
            Message::assistant_tool_calls(vec![("a".into(), "read_file".into(), json!({}))]),
            Message::tool_return("a", "read_file", "contents"),
        ];
        let before = messages.len();
        repair_dangling_calls(&mut messages);
        assert_eq!(messages.len(), before);
    }

    #[test]
    fn prune_keeps_recent_and_replaces_older() {
        let mut messages = vec![
            Message::tool_return("a", "grep", "aaaaaaaaaaaaaaaaaaaa"),
            Message::tool_return("b", "grep", "bbbbbbbbbbbbbbbbbbbb"),
            Message::tool_return("c", "grep", "cccccccccccccccccccc"),
        ];
        let reclaimed = prune_old_tool_outputs(&mut messages, 1);
        assert!(reclaimed > 0);
        assert!(matches!(&messages[0].parts[0], Part::ToolReturn { content, .. } if content == PRUNED_PLACEHOLDER));
        assert!(matches!(&messages[1].parts[0], Part::ToolReturn { content, .. } if content == PRUNED_PLACEHOLDER));
        assert!(matches!(&messages[2].parts[0], Part::ToolReturn { content, .. } if content == "cccccccccccccccccccc"));
    }

    #[test]
    fn prune_no_op_when_within_budget() {
        let mut messages = vec![Message::tool_return("a", "grep", "x")];
        assert_eq!(prune_old_tool_outputs(&mut messages, 5), 0);
    }

    #[test]
    fn filter_compacted_drops_everything_before_checkpoint() {
        let mut messages = vec![
            Message::user("first"),
            Message::assistant_text(format!("{SUMMARY_CHECKPOINT_PREFIX}summary text")),
            Message::user("after checkpoint"),
        ];
        filter_compacted(&mut messages);
        assert_eq!(messages.len(), 2);
        assert!(is_summary_checkpoint(&messages[0]));
    }

    #[test]
    fn filter_compacted_is_noop_without_checkpoint() {
        let mut messages = vec![Message::user("a"), Message::user("b")];
        let before = messages.len();
        filter_compacted(&mut messages);
        assert_eq!(messages.len(), before);
    }

    #[test]
    fn should_compact_true_when_over_limit() {
        let messages = vec![Message::user("a".repeat(1000))];
        assert!(should_compact(&messages, 10));
        assert!(!should_compact(&messages, 10_000));
    }

    #[tokio::test]
    async fn generate_summary_produces_checkpoint_message() {
        let provider = ScriptedMockProvider::always_text("a dense summary");
        let messages = vec![Message::user("do something"), Message::assistant_text("done")];
        let summary = generate_summary(&messages, &provider).await.unwrap();
        assert!(is_summary_checkpoint(&summary));
        assert!(get_content(&summary).contains("a dense summary"));
    }
}
