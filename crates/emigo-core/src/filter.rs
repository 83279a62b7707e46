// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use regex::Regex;
use std::sync::OnceLock;

use emigo_model::Message;

fn env_details_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<environment_details>.*?</environment_details>\s*").expect("static regex")
    })
}

fn mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@(\S+)").expect("static regex"))
}

/// Remove `<environment_details>…</environment_details>` blocks.
///
/// The model occasionally echoes its own context back; that text must never
/// reach the persisted history or the editor.
pub fn strip_environment_details(text: &str) -> String {
    env_details_regex().replace_all(text, "\n").into_owned()
}

/// Strip environment-details blocks from every text-bearing message.
/// Applied to a worker's `final_history` before it replaces the session's.
pub fn filter_history(history: Vec<Message>) -> Vec<Message> {
    history
        .into_iter()
        .map(|mut m| {
            if let Some(text) = m.text_mut() {
                if text.contains("<environment_details>") {
                    *text = strip_environment_details(text);
                }
            }
            m
        })
        .collect()
}

/// Extract `@file` mentions from a prompt.  Trailing punctuation that tends
/// to stick to the mention in prose is stripped.
pub fn extract_mentions(prompt: &str) -> Vec<String> {
    mention_regex()
        .captures_iter(prompt)
        .map(|c| {
            c[1].trim_end_matches(['.', ',', ';', ':', '!', '?'])
                .to_string()
        })
        .filter(|m| !m.is_empty())
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
