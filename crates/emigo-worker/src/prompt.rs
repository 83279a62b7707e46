// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Prompt assembly: system prompt, environment-details injection, and
//! history truncation.

use emigo_config::AgentConfig;
use emigo_model::{Message, ToolSchema};

/// Base system prompt.  Placeholders are substituted at build time; the
/// tool schemas are appended as JSON so the model sees the same contract
/// the structured tool-call channel enforces.
const SYSTEM_PROMPT_TEMPLATE: &str = "\
You are Emigo, an expert software engineering agent working inside the \
user's editor.

You operate on one project at a time.

# Environment
- Project directory: {session_dir}
- Operating system: {os_name}
- Default shell: {shell}
- Home directory: {homedir}

# Working rules
- Accomplish the user's task step by step, using one or more tool calls per \
turn. Tool results and a fresh snapshot of the project context arrive \
before your next turn.
- File paths in tool parameters are relative to the project directory.
- Read a file with read_file before editing it with replace_in_file; your \
SEARCH text must reflect the file as shown in the context snapshot.
- When the task is complete, call attempt_completion with a summary of the \
result. Do not end a task without calling it.

# Tools
The following tools are available, described as JSON schemas:

{tool_schemas}
";

/// Substitute the template placeholders and render the tool schemas.
pub fn build_system_prompt(session_dir: &str, tools: &[ToolSchema]) -> String {
    let schemas: Vec<serde_json::Value> = tools
        .iter()
        .map(|t| {
            serde_json::json!({
                "name": t.name,
                "description": t.description,
                "parameters": t.parameters,
            })
        })
        .collect();
    let schema_json =
        serde_json::to_string_pretty(&schemas).unwrap_or_else(|_| "[]".to_string());
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string());
    let homedir = dirs::home_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "~".to_string());

    SYSTEM_PROMPT_TEMPLATE
        .replace("{session_dir}", session_dir)
        .replace("{os_name}", std::env::consts::OS)
        .replace("{shell}", &shell)
        .replace("{homedir}", &homedir)
        .replace("{tool_schemas}", &schema_json)
}

/// Truncate history for one prompt: the first user message is always kept;
/// the rest is accumulated newest-first while the token budget holds, with
/// a floor of `min_history_messages` retained regardless of size.  Token
/// counts use the 4-bytes-per-token approximation.
pub fn truncate_history(history: &[Message], cfg: &AgentConfig) -> Vec<Message> {
    let Some(first_user_idx) = history
        .iter()
        .position(|m| matches!(m, Message::User { .. }))
    else {
        return history.to_vec();
    };

    let mut total = history[first_user_idx].approx_tokens();
    let mut kept_rev: Vec<Message> = Vec::new();
    for (i, m) in history.iter().enumerate().rev() {
        if i == first_user_idx {
            continue;
        }
        let t = m.approx_tokens();
        if kept_rev.len() < cfg.min_history_messages || total + t <= cfg.max_history_tokens {
            total += t;
            kept_rev.push(m.clone());
        } else {
            break;
        }
    }

    let mut out = Vec::with_capacity(kept_rev.len() + 1);
    out.push(history[first_user_idx].clone());
    out.extend(kept_rev.into_iter().rev());
    out
}

/// Compose the full message list for one LLM call.
///
/// Environment details are appended to the trailing user or tool message so
/// they sit next to the text the model is responding to; when the history
/// tail is an assistant message they go into a trailing system message
/// instead.  They are never persisted to history.
pub fn prepare_messages(
    system_prompt: &str,
    history: &[Message],
    env_details: &str,
    cfg: &AgentConfig,
) -> Vec<Message> {
    let mut messages = vec![Message::system(system_prompt)];
    messages.extend(truncate_history(history, cfg));

    match messages.last_mut() {
        Some(m @ (Message::User { .. } | Message::Tool { .. })) => {
            if let Some(text) = m.text_mut() {
                text.push_str("\n\n");
                text.push_str(env_details);
            }
        }
        _ => messages.push(Message::system(env_details.to_string())),
    }
    messages
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
