// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! SEARCH/REPLACE editing with sequential fuzzy line matching.
//!
//! Exact matching fails on trivial formatting drift (editor auto-indent,
//! trailing whitespace), so lines are compared whitespace-stripped at a
//! similarity threshold.  Matched file lines are marked used so two blocks
//! can never claim overlapping regions, and the resulting line ranges are
//! applied by the editor bottom-up in one call.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use similar::{ChangeTag, TextDiff};
use tracing::debug;

use emigo_frontend::Region;

use crate::result::{format_err, format_ok};
use crate::tool::{require_str, Tool, ToolContext};

const SEARCH_MARKER: &str = "<<<<<<< SEARCH\n";
const DIVIDER_MARKER: &str = "\n=======\n";
const REPLACE_MARKER: &str = "\n>>>>>>> REPLACE";

/// Minimum per-line similarity for a fuzzy match to be accepted.
const FUZZY_THRESHOLD: f64 = 0.85;

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse every SEARCH/REPLACE block out of `diff`, in order.
pub(crate) fn parse_blocks(diff: &str) -> Result<Vec<(String, String)>, String> {
    let pattern = Regex::new(
        r"(?s)<<<<<<< SEARCH\n(.*?)\n=======\n(.*?)\n>>>>>>> REPLACE",
    )
    .expect("static regex");

    let mut blocks = Vec::new();
    for caps in pattern.captures_iter(diff) {
        let search = caps[1].to_string();
        let replace = caps[2].to_string();
        for text in [&search, &replace] {
            if text.contains(SEARCH_MARKER)
                || text.contains(DIVIDER_MARKER)
                || text.contains(REPLACE_MARKER)
            {
                return Err(
                    "Detected malformed or nested SEARCH/REPLACE markers within a block's content."
                        .to_string(),
                );
            }
        }
        blocks.push((search, replace));
    }

    if blocks.is_empty() {
        if diff.contains("```") && !diff.contains(SEARCH_MARKER) {
            return Err(
                "Diff content seems to be a markdown code block, not a SEARCH/REPLACE block."
                    .to_string(),
            );
        }
        return Err("No valid SEARCH/REPLACE blocks found in the provided diff.".to_string());
    }
    Ok(blocks)
}

// ── Matching ──────────────────────────────────────────────────────────────────

/// Similarity of two lines after stripping surrounding whitespace:
/// character-level diff ratio (2×matches / total).  Both blank → 1.0,
/// exactly one blank → 0.0.
pub(crate) fn line_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim();
    let b = b.trim();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let total = a.len() + b.len();
    let diff = TextDiff::from_chars(a, b);
    let matching: usize = diff
        .iter_all_changes()
        .filter(|c| c.tag() == ChangeTag::Equal)
        .map(|c| c.value().len())
        .sum();
    (matching * 2) as f64 / total as f64
}

fn split_keep_ends(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, b) in s.bytes().enumerate() {
        if b == b'\n' {
            out.push(&s[start..=i]);
            start = i + 1;
        }
    }
    if start < s.len() {
        out.push(&s[start..]);
    }
    out
}

/// Locate every block in `content` sequentially and produce the replacement
/// plan.  Returns the plan plus one error message per block that failed.
///
/// Line ranges are 1-based with an exclusive end; consumed file lines are
/// tracked so blocks never overlap: a second block searching for identical
/// text is forced past the region the first one claimed.
pub(crate) fn build_plan(
    content: &str,
    blocks: &[(String, String)],
    threshold: f64,
) -> (Vec<Region>, Vec<String>) {
    let file_lines = split_keep_ends(content);
    let mut plan: Vec<Region> = Vec::new();
    let mut errors: Vec<String> = Vec::new();
    let mut used: std::collections::HashSet<usize> = std::collections::HashSet::new();

    for (block_index, (search_text, replace_text)) in blocks.iter().enumerate() {
        let n = block_index + 1;
        if search_text.trim().is_empty() {
            errors.push(format!(
                "Block {n}: SEARCH block is empty or contains only whitespace."
            ));
            continue;
        }
        let search_lines: Vec<&str> = search_text.lines().collect();

        let mut matched = false;
        for start in 0..file_lines.len() {
            if used.contains(&start) {
                continue;
            }
            if line_similarity(search_lines[0], file_lines[start]) < threshold {
                continue;
            }
            // First line accepted; extend sequentially.
            let mut all_matched = true;
            for (k, search_line) in search_lines.iter().enumerate().skip(1) {
                let idx = start + k;
                if idx >= file_lines.len()
                    || used.contains(&idx)
                    || line_similarity(search_line, file_lines[idx]) < threshold
                {
                    all_matched = false;
                    break;
                }
            }
            if !all_matched {
                continue;
            }

            let len = search_lines.len();
            // Whole-line regions: the replacement must stay newline-terminated
            // unless it deletes the lines outright.
            let mut replacement = replace_text.clone();
            if !replacement.is_empty() && !replacement.ends_with('\n') {
                replacement.push('\n');
            }
            plan.push((start + 1, start + len + 1, replacement));
            for i in start..start + len {
                used.insert(i);
            }
            debug!(block = n, start = start + 1, end = start + len, "sequential match");
            matched = true;
            break;
        }

        if !matched {
            errors.push(format!(
                "Block {n}: Could not find a sequential match for the SEARCH text.\n\
                 SEARCH block:\n```\n{search_text}\n```"
            ));
        }
    }

    (plan, errors)
}

// ── Tool ──────────────────────────────────────────────────────────────────────

pub struct ReplaceInFileTool;

#[async_trait]
impl Tool for ReplaceInFileTool {
    fn name(&self) -> &str {
        "replace_in_file"
    }

    fn description(&self) -> &str {
        "Replace sections of a file using SEARCH/REPLACE blocks.\n\
         \n\
         Format (repeat for multiple edits):\n\
         <<<<<<< SEARCH\n\
         exact lines to find\n\
         =======\n\
         replacement lines\n\
         >>>>>>> REPLACE\n\
         \n\
         Rules:\n\
         - SEARCH text is matched line-by-line; small whitespace drift is\n\
           tolerated, content differences are not.\n\
         - Blocks are applied in order and may not overlap.\n\
         - The file must already be in the chat context (use read_file first)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Session-relative path of the file to edit"
                },
                "diff": {
                    "type": "string",
                    "description": "One or more SEARCH/REPLACE blocks"
                }
            },
            "required": ["path", "diff"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: &Value) -> String {
        let rel_path = match require_str(params, "path", self.name()) {
            Ok(p) => p.to_string(),
            Err(e) => return format_err(e),
        };
        let diff = match require_str(params, "diff", self.name()) {
            Ok(d) => d.to_string(),
            Err(e) => return format_err(e),
        };

        let mut session = ctx.session.lock().await;
        let rel = match session.resolve_rel(&rel_path) {
            Ok(r) => r,
            Err(e) => return format_err(e.to_string()),
        };
        let abs = session.root().join(&rel);
        if !abs.is_file() {
            return format_err(format!(
                "File not found: {rel}. Please ensure it's added to the chat first."
            ));
        }

        // The cache is authoritative within a turn: matching runs against
        // the same text the model saw in its environment details.
        let content = match session.cached_content(&rel) {
            Some(c) => c,
            None => {
                return format_err(format!(
                    "Could not get content for file: {rel}. It might not exist or be readable."
                ))
            }
        };

        let blocks = match parse_blocks(&diff) {
            Ok(b) => b,
            Err(e) => return format_err(e),
        };

        let (plan, errors) = build_plan(&content, &blocks, FUZZY_THRESHOLD);
        if !errors.is_empty() {
            let header = format!(
                "Failed to apply replacements to '{rel}' due to {} error(s):\n",
                errors.len()
            );
            let footer = "\nPlease use read_file to get the exact current content and try again \
                          with updated SEARCH blocks.";
            return format_err(format!("{header}{}{footer}", errors.join("\n\n")));
        }

        debug!(file = %rel, regions = plan.len(), "requesting editor replacement");
        match ctx.frontend.replace_regions(&abs, &plan).await {
            Ok(()) => {
                // Pick up the editor's on-disk result (it may differ from a
                // naive splice if the editor reformatted on save).
                session.invalidate_cache(Some(&rel));
                session.update_cache(&rel, None);
                format_ok(format!(
                    "File '{rel}' modified successfully by applying {} block(s).",
                    plan.len()
                ))
            }
            Err(e) => {
                session.invalidate_cache(Some(&rel));
                format_err(format!("Error applying replacements in editor: {e}"))
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
