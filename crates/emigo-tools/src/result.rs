// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Standard result strings shared by every tool.
//!
//! The worker keys its termination logic off these exact strings, so they
//! are constants rather than formatting conventions.

/// Leading line of every successful tool result.
pub const TOOL_RESULT_SUCCESS: &str = "Tool executed successfully.";

/// Prefix for captured command output inside a successful result.
pub const TOOL_RESULT_OUTPUT_PREFIX: &str = "Tool output:\n";

/// Sentinel returned when the user denies a tool invocation.
pub const TOOL_DENIED: &str = "The user denied this operation.";

/// Prefix for every tool error; the worker ends the interaction when a tool
/// result starts with it.
pub const TOOL_ERROR_PREFIX: &str = "[Tool Error] ";

/// Sentinel returned by `attempt_completion`; ends the interaction.
pub const COMPLETION_SIGNALLED: &str = "COMPLETION_SIGNALLED";

pub fn format_ok(content: impl AsRef<str>) -> String {
    format!("{TOOL_RESULT_SUCCESS}\n{}", content.as_ref())
}

pub fn format_err(message: impl AsRef<str>) -> String {
    format!("{TOOL_ERROR_PREFIX}{}", message.as_ref())
}
