// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Edits an existing file by replacing one exact occurrence of `old_str` with
/// `new_str`. Requires `old_str` to be unique in the file so the edit target
/// is unambiguous.
pub struct UpdateFileTool;

#[async_trait]
impl Tool for UpdateFileTool {
    fn name(&self) -> &str {
        "update_file"
    }

    fn description(&self) -> &str {
        "Replaces one exact occurrence of old_str with new_str in an existing file. \
         old_str must match the file's literal text exactly (no L{n}: line-number \
         prefix) and must be unique — if it is not unique or not found, the edit is \
         rejected with no changes made. Use read_file first to get exact text."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file to edit"
                },
                "old_str": {
                    "type": "string",
                    "description": "Exact text to find; must appear exactly once in the file"
                },
                "new_str": {
                    "type": "string",
                    "description": "Replacement text"
                }
            },
            "required": ["path", "old_str", "new_str"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'path'"),
        };
        let old_str = match call.args.get("old_str").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'old_str'"),
        };
        let new_str = match call.args.get("new_str").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'new_str'"),
        };

        debug!(path = %path, "update_file tool");

        let original = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };

        let occurrences = original.matches(old_str.as_str()).count();
        if occurrences == 0 {
            return ToolOutput::err(&call.id, "old_str not found in file; no changes made");
        }
        if occurrences > 1 {
            return ToolOutput::err(
                &call.id,
                format!(
                    "old_str matches {occurrences} locations; must be unique. \
                     Include more surrounding context and try again. No changes made."
                ),
            );
        }

        let updated = original.replacen(old_str.as_str(), &new_str, 1);
        match tokio::fs::write(&path, &updated).await {
            Ok(_) => ToolOutput::ok(&call.id, format!("updated {path}")),
            Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{Tool, ToolCall};

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall { id: "u1".into(), name: "update_file".into(), args }
    }

    fn tmp_file(content: &str) -> String {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        let path = format!("/tmp/tunacode_update_file_test_{}_{n}.txt", std::process::id());
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn replaces_unique_match() {
        let path = tmp_file("hello world\n");
        let t = UpdateFileTool;
        let out = t
            .execute(&call(json!({"path": path, "old_str": "world", "new_str": "rust"})))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello rust\n");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn rejects_ambiguous_match() {
        let path = tmp_file("foo\nfoo\n");
        let t = UpdateFileTool;
        let out = t.execute(&call(json!({"path": path, "old_str": "foo", "new_str": "bar"}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("must be unique"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "foo\nfoo\n");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn rejects_missing_match() {
        let path = tmp_file("hello world\n");
        let t = UpdateFileTool;
        let out = t
            .execute(&call(json!({"path": path, "old_str": "nonexistent", "new_str": "x"})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("not found"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_file_is_error() {
        let t = UpdateFileTool;
        let out = t
            .execute(&call(json!({
                "path": "/tmp/tunacode_no_such_update_file.txt",
                "old_str": "a",
                "new_str": "b"
            })))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("read error"));
    }

    #[tokio::test]
    async fn missing_required_param_is_error() {
        let t = UpdateFileTool;
        let out = t.execute(&call(json!({"path": "/tmp/x"}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("missing required parameter"));
    }
}
