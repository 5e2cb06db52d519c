// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod mock;
mod provider;
mod types;

pub use mock::{MockProvider, ScriptedMockProvider};
pub use provider::{ModelProvider, ResponseStream};
pub use types::{
    CompletionRequest, FunctionCall, Message, MessageContent, ResponseEvent, Role, ToolSchema, Usage,
};
