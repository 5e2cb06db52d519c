// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Builds the system prompt for a request: a fixed base, the project root
//! (if known), the registered tool names, and any user-supplied append text
//! or full override.

use std::path::Path;

use tunacode_tools::ToolRegistry;

const BASE_PROMPT: &str = "You are TunaCode, a terminal-based coding assistant. \
Use the available tools to inspect and modify the project. Call `submit` once \
the task is complete, with the final answer as its `result` argument.";

#[derive(Debug, Default)]
pub struct PromptContext<'a> {
    pub project_root: Option<&'a Path>,
    /// Appended verbatim after the base prompt and tool list.
    pub append: Option<&'a str>,
    /// Replaces the entire generated prompt when set.
    pub override_prompt: Option<&'a str>,
}

pub fn system_prompt(tools: &ToolRegistry, context: &PromptContext) -> String {
    if let Some(override_prompt) = context.override_prompt {
        return override_prompt.to_string();
    }

    let mut sections = vec![BASE_PROMPT.to_string()];

    if let Some(root) = context.project_root {
        sections.push(format!("Project root: {}", root.display()));
    }

    let mut names = tools.names();
    names.sort();
    if !names.is_empty() {
        sections.push(format!("Available tools: {}", names.join(", ")));
    }

    if let Some(append) = context.append {
        sections.push(append.to_string());
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunacode_tools::{GrepTool, SubmitTool};

    #[test]
    fn base_prompt_present_without_context() {
        let tools = ToolRegistry::new();
        let prompt = system_prompt(&tools, &PromptContext::default());
        assert!(prompt.starts_with("You are TunaCode"));
    }

    #[test]
    fn lists_registered_tool_names_sorted() {
        let mut tools = ToolRegistry::new();
        tools.register(SubmitTool);
        tools.register(GrepTool);
        let prompt = system_prompt(&tools, &PromptContext::default());
        assert!(prompt.contains("Available tools: grep, submit"));
    }

    #[test]
    fn override_prompt_replaces_everything() {
        let tools = ToolRegistry::new();
        let context = PromptContext { override_prompt: Some("custom prompt"), ..Default::default() };
        assert_eq!(system_prompt(&tools, &context), "custom prompt");
    }

    #[test]
    fn project_root_and_append_are_included() {
        let tools = ToolRegistry::new();
        let root = Path::new("/workspace/project");
        let context = PromptContext { project_root: Some(root), append: Some("Be terse."), ..Default::default() };
        let prompt = system_prompt(&tools, &context);
        assert!(prompt.contains("/workspace/project"));
        assert!(prompt.ends_with("Be terse."));
    }
}
