// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

/// Per-tool approval policy, as declared by the tool itself via
/// [`crate::Tool::default_policy`].
///
/// This is only a tool's *default* stance; the authorization engine that
/// decides whether a given call actually runs lives above this crate and
/// may override it (e.g. a read-only session downgrading `Auto` to `Deny`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalPolicy {
    /// Always run without asking
    Auto,
    /// Ask user before each invocation
    Ask,
    /// Never run; return an error
    Deny,
}
