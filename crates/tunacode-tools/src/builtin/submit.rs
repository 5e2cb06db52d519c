// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Pseudo-tool the model calls to signal that the current task is complete.
///
/// `submit` has no side effects of its own: the orchestrator recognizes a
/// call to this tool as a completion signal and ends the iteration loop
/// after recording its `result` as the final answer. It is never batched
/// with other tool calls.
pub struct SubmitTool;

#[async_trait]
impl Tool for SubmitTool {
    fn name(&self) -> &str {
        "submit"
    }

    fn description(&self) -> &str {
        "Call this when the task is complete, to return the final result to the user. \
         This ends the current run — do not call any other tool afterward."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "result": {
                    "type": "string",
                    "description": "The final answer or summary to show the user"
                }
            },
            "required": ["result"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match call.args.get("result").and_then(|v| v.as_str()) {
            Some(r) => ToolOutput::ok(&call.id, r.to_string()),
            None => ToolOutput::err(&call.id, "missing required parameter 'result'"),
        }
    }
}
