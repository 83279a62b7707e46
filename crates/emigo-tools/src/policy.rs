// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
/// Per-tool approval policy.  Carried by each tool next to its schema so
/// dispatch code never hardcodes tool names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalPolicy {
    /// Always run without asking.
    Auto,
    /// Ask the user before each invocation.
    Ask,
}
